//! Image variants: the core system image and the vendor image

use crate::pipeline::BottomUpContext;

pub const IMAGE_AXIS: &str = "image";
pub const CORE_IMAGE: &str = "core";
pub const VENDOR_IMAGE: &str = "vendor";

/// Split buildable modules into `core`, plus `vendor` for vendor-available ones
///
/// The vendor variant additionally compiles `vendor_srcs`.
pub fn image_mutator(ctx: &mut BottomUpContext<'_>) {
    if !ctx.kind().is_buildable() {
        return;
    }

    if !ctx.props().vendor_available {
        ctx.create_variations(&[CORE_IMAGE]);
        return;
    }

    let clones = ctx.create_variations(&[CORE_IMAGE, VENDOR_IMAGE]);
    if let Some(vendor) = clones.get_mut(1) {
        let extra = vendor.props.vendor_srcs.clone();
        vendor.props.srcs.extend(extra);
    }
}
