//! Link-type variants of libraries

use crate::graph::LINK_AXIS;
use crate::module::{Dependency, ModuleKind};
use crate::pipeline::BottomUpContext;
use crate::tag::DependencyTag;

pub const LINK_PASS: &str = LINK_AXIS;
pub const STATIC_VARIATION: &str = "static";
pub const SHARED_VARIATION: &str = "shared";

/// Split libraries by link type
///
/// A library that builds both ways gets `static` and `shared` variants, and the
/// shared one reuses the objects of its static sibling.
pub fn link_mutator(ctx: &mut BottomUpContext<'_>) {
    match ctx.kind() {
        ModuleKind::Library => {
            let name = ctx.module_name().to_string();
            let clones = ctx.create_variations(&[STATIC_VARIATION, SHARED_VARIATION]);
            if let Some(shared) = clones.get_mut(1) {
                shared.deps.push(
                    Dependency::new(DependencyTag::ReusedObject, name)
                        .pinned(LINK_AXIS, STATIC_VARIATION),
                );
            }
        }
        ModuleKind::StaticLibrary => {
            ctx.create_variations(&[STATIC_VARIATION]);
        }
        ModuleKind::SharedLibrary => {
            ctx.create_variations(&[SHARED_VARIATION]);
        }
        ModuleKind::Binary | ModuleKind::Object | ModuleKind::Defaults => {}
    }
}
