//! Build System Integration for Engine Artifacts
//!
//! Decides which specialized engine artifacts are compiled into the crate.
//! Every artifact exposes the identical engine surface; they differ only in
//! the build id the dispatcher knows them by and in the vector instructions
//! their kernels are compiled with.
//!
//! # Emitted configuration
//!
//! - `archmux_artifact_sse2`: the 128-bit SSE2 artifact is compiled in
//! - `archmux_artifact_avx2`: the 256-bit AVX2 artifact is compiled in
//! - `ARCHMUX_BUILD_TARGET`: `<arch>-<os>` string reported by diagnostics
//!
//! The portable baseline artifact is always compiled and has no cfg.
//!
//! Setting `ARCHMUX_OMIT_ARTIFACTS=avx2,sse2` (any subset) at build time leaves
//! the named artifacts out; the dispatcher then sees them as missing and falls
//! through to the next tier.

use std::env;

/// Specialized artifacts and the target architectures they can be built for.
const SPECIALIZED_ARTIFACTS: &[(&str, &[&str])] = &[
    ("sse2", &["x86_64"]),
    ("avx2", &["x86_64"]),
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=ARCHMUX_OMIT_ARTIFACTS");

    for (name, _) in SPECIALIZED_ARTIFACTS {
        println!("cargo:rustc-check-cfg=cfg(archmux_artifact_{})", name);
    }

    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let omitted = omitted_artifacts();

    configure_artifacts(&target_arch, &omitted);

    println!("cargo:rustc-env=ARCHMUX_BUILD_TARGET={}-{}", target_arch, target_os);
}

/// Parse the comma separated `ARCHMUX_OMIT_ARTIFACTS` list.
fn omitted_artifacts() -> Vec<String> {
    env::var("ARCHMUX_OMIT_ARTIFACTS")
        .map(|value| {
            value
                .split(',')
                .map(|name| name.trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Emit one cfg per specialized artifact that can be built for this target.
fn configure_artifacts(target_arch: &str, omitted: &[String]) {
    for (name, arches) in SPECIALIZED_ARTIFACTS {
        if !arches.contains(&target_arch) {
            continue;
        }
        if omitted.iter().any(|o| o == name) {
            println!("cargo:warning=archmux: omitting {} artifact at build time", name);
            continue;
        }
        println!("cargo:rustc-cfg=archmux_artifact_{}", name);
    }
}
