//! Metadata command - legacy key/value lines per variant

use super::Project;
use anyhow::Result;

pub fn run(project: &Project, module: Option<&str>) -> Result<()> {
    let context = project.build()?;

    for variant in context.graph.live_variants() {
        if module.is_some_and(|m| m != variant.module) {
            continue;
        }
        let name = variant.display_name();
        let Some(lines) = context.metadata.get(&name).filter(|l| !l.is_empty()) else {
            continue;
        };
        println!("{}", name);
        for (key, value) in lines {
            println!("  {} := {}", key, value);
        }
    }
    Ok(())
}
