//! Build command - resolve the variant graph and generate actions

use super::Project;
use anyhow::{Context, Result};

/// Run the build command
pub fn run(project: &Project, json: bool, actions: bool) -> Result<()> {
    let context = project.build()?;
    let stats = &context.stats;

    if actions {
        let text = serde_json::to_string_pretty(&context.actions)
            .context("Failed to serialize actions")?;
        println!("{}", text);
    } else if json {
        println!(
            "{}",
            serde_json::json!({
                "success": true,
                "modules": stats.total_modules,
                "variants": stats.total_variants,
                "passes": context.report.passes_run,
                "actions": stats.actions,
                "fingerprint": context.fingerprint,
                "total_time": stats.total_time.as_secs_f64(),
                "pipeline_time": stats.pipeline_time.as_secs_f64(),
                "action_time": stats.action_time.as_secs_f64(),
            })
        );
    } else {
        println!("Build succeeded in {:.2}s", stats.total_time.as_secs_f64());
        println!("  Modules:     {}", stats.total_modules);
        println!("  Variants:    {}", stats.total_variants);
        println!("  Passes:      {}", stats.passes_run);
        println!("  Actions:     {}", stats.actions);
        println!("  Fingerprint: {}", context.fingerprint);
    }

    Ok(())
}
