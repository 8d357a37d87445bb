//! Variants command - list modules and the variants they were split into

use super::Project;
use anyhow::{bail, Result};

pub fn run(project: &Project, module: Option<&str>) -> Result<()> {
    let context = project.build()?;
    let graph = &context.graph;

    let modules: Vec<&str> = match module {
        Some(name) if !graph.contains_module(name) => bail!("Module not found: {}", name),
        Some(name) => vec![name],
        None => graph.module_names().collect(),
    };

    for name in modules {
        println!("{}", name);
        for variant in graph.variants_of(name) {
            let subdir = variant.subdir();
            if subdir.is_empty() {
                println!("  (unsplit)");
            } else {
                println!("  {}", subdir);
            }
        }
    }
    Ok(())
}
