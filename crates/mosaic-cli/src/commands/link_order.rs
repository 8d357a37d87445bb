//! Link-order command - static libraries of one variant in link order

use super::Project;
use anyhow::{Context, Result};

pub fn run(project: &Project, module: &str, variant: &str, all: bool) -> Result<()> {
    let context = project.build()?;
    let graph = &context.graph;

    let found = graph.find_variant(module, variant)?;
    let order = graph
        .static_link_order(found.id())
        .with_context(|| format!("Failed to order the static libraries of {}", found.display_name()))?;

    let ids = if all { order.all } else { order.declared };
    for id in ids {
        if let Some(dep) = graph.variant(id) {
            println!("{}", dep.display_name());
        }
    }
    Ok(())
}
