//! Built-in passes
//!
//! | epoch     | pass        | direction | effect                                     |
//! |-----------|-------------|-----------|--------------------------------------------|
//! | pre-arch  | `defaults`  | bottom-up | merge defaults modules, check flags        |
//! | pre-deps  | `arch`      | bottom-up | one variant per configured target          |
//! | pre-deps  | `image`     | bottom-up | `core`, plus `vendor` when available       |
//! | pre-deps  | `link`      | bottom-up | `static` / `shared` library variants       |
//! | pre-deps  | `F_begin`   | bottom-up | decide feature F per variant               |
//! | post-deps | `F_deps`    | top-down  | mark static deps of F-enabled variants     |
//! | post-deps | `F`         | bottom-up | reconfigure or split on F                  |

pub mod arch;
pub mod defaults;
pub mod feature;
pub mod image;
pub mod link;

use crate::config::BuildConfig;
use crate::pipeline::{Epoch, Pipeline};

/// Names the built-in passes (and the axes they split on) reserve
pub const RESERVED_NAMES: [&str; 4] = [
    defaults::DEFAULTS_PASS,
    arch::ARCH_AXIS,
    image::IMAGE_AXIS,
    link::LINK_PASS,
];

/// Register every built-in pass, plus the passes of each configured feature
pub fn register_builtin(pipeline: &mut Pipeline, config: &BuildConfig) {
    pipeline
        .register_bottom_up(Epoch::PreArch, defaults::DEFAULTS_PASS, defaults::defaults_mutator)
        .parallel();
    pipeline
        .register_bottom_up(Epoch::PreDeps, arch::ARCH_AXIS, arch::arch_mutator)
        .parallel();
    pipeline
        .register_bottom_up(Epoch::PreDeps, image::IMAGE_AXIS, image::image_mutator)
        .parallel();
    pipeline
        .register_bottom_up(Epoch::PreDeps, link::LINK_PASS, link::link_mutator)
        .parallel();

    for name in config.features.keys() {
        feature::register(pipeline, name);
    }
}
