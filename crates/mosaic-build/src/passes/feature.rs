//! Propagated build features
//!
//! A feature F (for example pagerando) changes how code is compiled and has to
//! be present in every static archive linked into an F-enabled binary or
//! shared library. Three passes implement it:
//!
//! - `F_begin` decides per variant whether F is requested, applying the global
//!   toggle and the feature's restrictions (device only, supported arches, not
//!   for SDK builds), and adds the runtime library edge. Static variants the
//!   module does not decide on stay undecided unless the toggle is on.
//! - `F_deps` walks the static dependencies of every F-enabled variant and
//!   marks them as required by a dependent.
//! - `F` reconfigures enabled variants (full LTO, flags, pinned F axis) and
//!   splits marked ones into a `base` variant that keeps the original behavior
//!   and an F variant that is built with F and never installed. Static
//!   variants nobody marked are settled to off.

use crate::config::FeatureSettings;
use crate::graph::{Variant, LINK_AXIS};
use crate::module::ModuleKind;
use crate::passes::link::{SHARED_VARIATION, STATIC_VARIATION};
use crate::pipeline::{BottomUpContext, Epoch, Pipeline, TopDownContext};
use crate::properties::{Capability, FeatureState, LtoMode, ModuleProperties};
use crate::tag::DependencyTag;

/// Value of the feature axis on the variant that keeps the original behavior
pub const BASE_VARIATION: &str = "base";

/// Register the three passes and the metadata hook of feature `name`
pub fn register(pipeline: &mut Pipeline, name: &str) {
    let feature = name.to_string();
    pipeline
        .register_bottom_up(Epoch::PreDeps, &format!("{}_begin", name), move |ctx| {
            begin_mutator(ctx, &feature)
        })
        .parallel();

    let feature = name.to_string();
    pipeline
        .register_top_down(Epoch::PostDeps, &format!("{}_deps", name), move |ctx| {
            deps_mutator(ctx, &feature)
        })
        .parallel();

    let feature = name.to_string();
    pipeline
        .register_bottom_up(Epoch::PostDeps, name, move |ctx| {
            feature_mutator(ctx, &feature)
        })
        .parallel();

    let feature = name.to_string();
    pipeline.register_metadata_hook(move |variant: &Variant| metadata(variant, &feature));
}

fn link_type(variant: &Variant) -> Option<&str> {
    variant.variations.get(LINK_AXIS)
}

fn begin_mutator(ctx: &mut BottomUpContext<'_>, feature: &str) {
    let Some(settings) = ctx.config().feature(feature) else {
        return;
    };
    if ctx.kind() == ModuleKind::Object {
        ctx.props_mut()
            .features
            .insert(feature.to_string(), Capability::NotApplicable);
        return;
    }
    if !ctx.kind().is_buildable() {
        return;
    }

    let device = ctx.config().device;
    let link = link_type(ctx.variant()).map(str::to_string);
    let arch = ctx
        .props()
        .target
        .as_ref()
        .map(|t| t.arch.clone())
        .unwrap_or_default();
    let uses_sdk = ctx.props().uses_sdk();
    let library_name = format!("{}{}", ctx.module_name(), ctx.config().shlib_suffix);

    let Some(state) = ctx.props_mut().feature_mut(feature) else {
        return;
    };

    if settings.device_only && !device {
        state.requested = Some(false);
    }
    if !settings.supports_arch(&arch) {
        state.requested = Some(false);
    }
    // SDK builds cannot link against the platform's runtime library
    if uses_sdk {
        state.requested = Some(false);
    }

    // Undecided static variants are settled by their dependents in the F pass
    if state.requested.is_none() {
        match (settings.enabled, link.as_deref()) {
            (true, Some(SHARED_VARIATION)) => state.requested = Some(true),
            (true, Some(STATIC_VARIATION)) => state.required_by_dependent = true,
            (false, Some(STATIC_VARIATION)) | (true, _) => {}
            (false, _) => state.requested = Some(false),
        }
    }

    if !state.enabled() {
        return;
    }
    state.index = settings.indices.get(&library_name).copied();

    if let Some(runtime) = &settings.runtime_library {
        if runtime.as_str() != ctx.module_name() {
            ctx.add_dependency(DependencyTag::SharedLib, runtime);
        }
    }
}

fn deps_mutator(ctx: &mut TopDownContext<'_>, feature: &str) {
    let Some(settings) = ctx.config().feature(feature) else {
        return;
    };
    if !ctx.props().feature_enabled(feature) {
        return;
    }

    let mut marked = Vec::new();
    ctx.walk_deps(&settings.propagate, |dep| {
        let refused = matches!(
            dep.props.feature(feature),
            Some(Capability::Present(FeatureState {
                requested: Some(false),
                ..
            }))
        );
        if !refused && link_type(dep) == Some(STATIC_VARIATION) {
            marked.push(dep.id());
        }
        true
    });

    for target in marked {
        let feature = feature.to_string();
        ctx.update(target, move |props| {
            if let Some(state) = props.feature_mut(&feature) {
                state.required_by_dependent = true;
            }
        });
    }
}

fn feature_mutator(ctx: &mut BottomUpContext<'_>, feature: &str) {
    let Some(settings) = ctx.config().feature(feature) else {
        return;
    };
    let Some(Capability::Present(state)) = ctx.props().feature(feature).cloned() else {
        return;
    };

    if state.enabled() {
        ctx.set_dependency_variation(feature, feature);
        if settings.requires_lto {
            match ctx.props().lto.clone() {
                Capability::NotApplicable => {
                    ctx.property_error(
                        "lto",
                        format!("{} requires LTO, which this module cannot use", feature),
                    );
                    return;
                }
                Capability::Present(LtoMode::Never) => {
                    ctx.property_error(
                        "lto",
                        format!("{} requires full LTO but lto is 'never'", feature),
                    );
                    return;
                }
                Capability::Present(_) => ctx.props_mut().lto = Capability::Present(LtoMode::Full),
            }
        }
        apply_flags(ctx.props_mut(), settings, &state);
        let name = ctx.variant().display_name();
        ctx.record(name);
        return;
    }

    if !state.required_by_dependent {
        if state.requested.is_none() && link_type(ctx.variant()) == Some(STATIC_VARIATION) {
            if let Some(state) = ctx.props_mut().feature_mut(feature) {
                state.requested = Some(false);
            }
        }
        return;
    }

    let variant = ctx.variant();
    if variant.variations.contains_axis(feature)
        || variant.dependency_variations.contains_axis(feature)
    {
        return;
    }

    if settings.requires_lto {
        match ctx.props().lto.clone() {
            Capability::NotApplicable => {
                ctx.property_error(
                    "lto",
                    format!("required to support {} by a dependent, but cannot use LTO", feature),
                );
                return;
            }
            Capability::Present(LtoMode::Never) => {
                ctx.property_error(
                    "lto",
                    format!(
                        "required to support {} by a dependent, but lto is 'never'",
                        feature
                    ),
                );
                return;
            }
            Capability::Present(_) => {}
        }
    }

    let clones = ctx.create_variations(&[BASE_VARIATION, feature]);
    if clones.len() != 2 {
        return;
    }

    if let Some(base) = clones[0].props.feature_mut(feature) {
        base.requested = Some(false);
    }

    let enabled = &mut clones[1];
    if let Some(state) = enabled.props.feature_mut(feature) {
        state.requested = Some(true);
    }
    enabled.props.installable = false;
    if settings.requires_lto {
        enabled.props.lto = Capability::Present(LtoMode::Full);
    }
    apply_flags(&mut enabled.props, settings, &state);
    let name = enabled.display_name();
    ctx.record(name);
}

fn apply_flags(props: &mut ModuleProperties, settings: &FeatureSettings, state: &FeatureState) {
    props.flags.cflags.extend(settings.cflags.iter().cloned());
    props.flags.ldflags.extend(settings.ldflags.iter().cloned());
    if let Some(flag) = state.index.and_then(|i| settings.index_flag_for(i)) {
        props.flags.ldflags.push(flag);
    }
}

/// `LOCAL_<F> := true|false`; nothing while the request is undecided
fn metadata(variant: &Variant, feature: &str) -> Vec<(String, String)> {
    if variant.kind == ModuleKind::Defaults {
        return Vec::new();
    }
    let key = format!("LOCAL_{}", feature.to_uppercase());
    let value = match variant.props.feature(feature) {
        None | Some(Capability::NotApplicable) => false,
        Some(Capability::Present(state)) => match state.requested {
            None => return Vec::new(),
            Some(requested) => requested,
        },
    };
    vec![(key, value.to_string())]
}
