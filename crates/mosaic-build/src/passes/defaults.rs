//! Defaults merging and flag validation

use crate::graph::VariantGraph;
use crate::module::ModuleKind;
use crate::pipeline::BottomUpContext;
use crate::properties::{check_bad_compiler_flags, Capability, LtoMode, ModuleProperties};
use std::collections::HashSet;

pub const DEFAULTS_PASS: &str = "defaults";

/// Merge declared defaults modules into the module and validate its cflags
///
/// Defaults are applied in declaration order, nested defaults before the
/// defaults that list them. Sources and flags from defaults come before the
/// module's own; LTO mode and feature requests are only inherited when the
/// module leaves them unset.
pub fn defaults_mutator(ctx: &mut BottomUpContext<'_>) {
    if ctx.kind() != ModuleKind::Defaults && !ctx.props().defaults.is_empty() {
        let names = ctx.props().defaults.clone();
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        for name in &names {
            if let Err(message) = collect_defaults(ctx.graph(), name, &mut visited, &mut chain) {
                ctx.property_error("defaults", message);
            }
        }
        merge(ctx.props_mut(), &chain);
    }

    for message in check_bad_compiler_flags(&ctx.props().flags.cflags) {
        ctx.property_error("cflags", message);
    }
}

fn collect_defaults<'g>(
    graph: &'g VariantGraph,
    name: &str,
    visited: &mut HashSet<String>,
    chain: &mut Vec<&'g ModuleProperties>,
) -> Result<(), String> {
    if !visited.insert(name.to_string()) {
        return Ok(());
    }

    let variant = graph
        .variants_of(name)
        .next()
        .ok_or_else(|| format!("unknown defaults module '{}'", name))?;
    if variant.kind != ModuleKind::Defaults {
        return Err(format!(
            "'{}' is a {} module, not a defaults module",
            name, variant.kind
        ));
    }

    for nested in &variant.props.defaults {
        collect_defaults(graph, nested, visited, chain)?;
    }
    chain.push(&variant.props);
    Ok(())
}

fn merge(props: &mut ModuleProperties, chain: &[&ModuleProperties]) {
    let mut srcs = Vec::new();
    let mut cflags = Vec::new();
    let mut ldflags = Vec::new();

    for defaults in chain {
        srcs.extend(defaults.srcs.iter().cloned());
        cflags.extend(defaults.flags.cflags.iter().cloned());
        ldflags.extend(defaults.flags.ldflags.iter().cloned());

        if let (Capability::Present(own), Capability::Present(inherited)) =
            (&mut props.lto, &defaults.lto)
        {
            if *own == LtoMode::Unset {
                *own = *inherited;
            }
        }

        for (feature, state) in &defaults.features {
            let Capability::Present(inherited) = state else {
                continue;
            };
            if let Some(own) = props.feature_mut(feature) {
                if own.requested.is_none() {
                    own.requested = inherited.requested;
                }
            }
        }

        props.vendor_available |= defaults.vendor_available;
        if props.sdk_version.is_none() {
            props.sdk_version = defaults.sdk_version.clone();
        }
    }

    srcs.append(&mut props.srcs);
    cflags.append(&mut props.flags.cflags);
    ldflags.append(&mut props.flags.ldflags);
    props.srcs = srcs;
    props.flags.cflags = cflags;
    props.flags.ldflags = ldflags;
}
