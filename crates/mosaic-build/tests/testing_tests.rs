//! Test lookup helpers

use mosaic_build::testing::TestContext;
use mosaic_build::{ModuleDecl, ModuleKind};
use pretty_assertions::assert_eq;

const CORE: &str = "android_arm64_armv8-a_core";

fn context() -> TestContext {
    TestContext::new(vec![
        ModuleDecl::binary("bin")
            .srcs(["main.c"])
            .static_libs(["liba", "libb"]),
        ModuleDecl::new("liba", ModuleKind::StaticLibrary)
            .srcs(["a.c"])
            .static_libs(["libb"]),
        ModuleDecl::new("libb", ModuleKind::StaticLibrary).srcs(["b.c"]),
    ])
}

#[test]
fn test_lookups_find_actions() {
    let ctx = context();
    let bin = ctx.module_for_tests("bin", CORE);

    assert_eq!(bin.rule("ld").module, "bin");
    assert_eq!(bin.description("cc main.c").rule, "cc");
    assert_eq!(bin.output("bin").rule, "ld");
    assert_eq!(bin.declared_link_order(), vec!["liba", "libb"]);
    assert_eq!(bin.full_link_order(), vec!["liba", "libb"]);

    let liba = ctx.module_for_tests("liba", &format!("{}_static", CORE));
    assert_eq!(liba.rule("ar").outputs.len(), 1);
    assert!(liba.actions.iter().all(|a| a.module == "liba"));
}

#[test]
#[should_panic(expected = "modules are:")]
fn test_unknown_variant_lists_modules() {
    context().module_for_tests("bin", "android_arm64_armv8-a_vendor");
}

#[test]
#[should_panic(expected = "bin(android_arm64_armv8-a_core)")]
fn test_unknown_module_lists_modules() {
    context().module_for_tests("libmissing", CORE);
}

#[test]
#[should_panic(expected = "available: [cc, ld]")]
fn test_unknown_rule_lists_rules() {
    let ctx = context();
    ctx.module_for_tests("bin", CORE).rule("javac");
}

#[test]
#[should_panic(expected = "description 'cc other.c'")]
fn test_unknown_description() {
    let ctx = context();
    ctx.module_for_tests("bin", CORE).description("cc other.c");
}

#[test]
#[should_panic(expected = "output 'bin.so'")]
fn test_unknown_output() {
    let ctx = context();
    ctx.module_for_tests("bin", CORE).output("bin.so");
}

#[test]
#[should_panic(expected = "build failed")]
fn test_failed_build_panics() {
    TestContext::new(vec![ModuleDecl::binary("bin").static_libs(["libmissing"])]);
}
