//! Architecture variants

use crate::pipeline::BottomUpContext;
use crate::properties::TargetInfo;

pub const ARCH_AXIS: &str = "arch";

/// Split every buildable module into one variant per configured target
pub fn arch_mutator(ctx: &mut BottomUpContext<'_>) {
    if !ctx.kind().is_buildable() {
        return;
    }

    let config = ctx.config();
    if config.targets.is_empty() {
        ctx.module_error("no target architectures configured");
        return;
    }

    let os = if config.device { "android" } else { "linux_glibc" };
    let names: Vec<String> = config
        .targets
        .iter()
        .map(|arch| arch.variation_name(config.device))
        .collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();

    let clones = ctx.create_variations(&names);
    for (clone, arch) in clones.iter_mut().zip(&config.targets) {
        clone.props.target = Some(TargetInfo {
            os: os.to_string(),
            arch: arch.arch_type.clone(),
            arch_variant: arch.variant.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Arch, BuildConfig};
    use crate::graph::VariantGraph;
    use crate::module::{ModuleDecl, ModuleKind};
    use crate::pipeline::{Epoch, Pipeline};

    fn run(config: &BuildConfig) -> VariantGraph {
        let mut graph = VariantGraph::from_modules([
            ModuleDecl::library("libc"),
            ModuleDecl::new("cc_defaults", ModuleKind::Defaults),
        ])
        .unwrap();
        let mut pipeline = Pipeline::new();
        pipeline.register_bottom_up(Epoch::PreDeps, ARCH_AXIS, arch_mutator);
        pipeline.run(&mut graph, config).unwrap();
        graph
    }

    #[test]
    fn test_one_variant_per_target() {
        let config = BuildConfig {
            targets: vec![
                Arch::new("arm64", Some("armv8-a")),
                Arch::new("arm", Some("armv7-a-neon")),
            ],
            ..Default::default()
        };
        let graph = run(&config);

        let subdirs: Vec<String> = graph.variants_of("libc").map(|v| v.subdir()).collect();
        assert_eq!(
            subdirs,
            vec!["android_arm64_armv8-a", "android_arm_armv7-a-neon"]
        );
        let arm = graph
            .find_variant("libc", "android_arm_armv7-a-neon")
            .unwrap();
        assert_eq!(arm.props.target.as_ref().unwrap().arch, "arm");
    }

    #[test]
    fn test_host_build() {
        let config = BuildConfig {
            device: false,
            targets: vec![Arch::new("x86_64", None)],
            ..Default::default()
        };
        let graph = run(&config);
        let libc = graph.find_variant("libc", "linux_glibc_x86_64").unwrap();
        assert_eq!(libc.props.target.as_ref().unwrap().os, "linux_glibc");
    }

    #[test]
    fn test_defaults_not_split() {
        let graph = run(&BuildConfig::default());
        assert!(graph.find_variant("cc_defaults", "").is_ok());
    }
}
