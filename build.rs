//! Build script for simbind test fixtures
//!
//! Compiles the stub simulator module in `test/fixtures/stub_sim.c` into a
//! set of shared objects with the host C compiler. The `native_module`
//! integration tests load them through `SIMBIND_STUB_DIR`; when no compiler
//! is available the variable is left unset and those tests skip themselves.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const STUB_SOURCE: &str = "test/fixtures/stub_sim.c";

/// (output library name, extra compiler flags)
const STUB_VARIANTS: &[(&str, &[&str])] = &[
    ("libstub_sim_0.so", &["-DSTUB_ID=0"]),
    ("libstub_sim_1.so", &["-DSTUB_ID=1"]),
    ("libstub_sim_2.so", &["-DSTUB_ID=2"]),
    ("libstub_sim_3.so", &["-DSTUB_ID=3"]),
    ("libstub_no_poke.so", &["-DSTUB_OMIT_POKE"]),
    ("libstub_init_fails.so", &["-DSTUB_INIT_FAILS"]),
    ("libstub_abi_v1.so", &["-DSTUB_ABI_VERSION=1"]),
    ("libstub_abi_v99.so", &["-DSTUB_ABI_VERSION=99"]),
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={}", STUB_SOURCE);
    println!("cargo:rerun-if-env-changed=CC");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let host = env::var("HOST").unwrap_or_default();
    let target = env::var("TARGET").unwrap_or_default();
    if target_os != "linux" || host != target {
        println!(
            "cargo:warning=skipping stub simulator modules for target {}",
            target
        );
        return;
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    match build_stubs(&out_dir) {
        Ok(()) => println!("cargo:rustc-env=SIMBIND_STUB_DIR={}", out_dir.display()),
        Err(e) => println!(
            "cargo:warning=stub simulator modules not built ({}); native module tests will skip",
            e
        ),
    }
}

fn build_stubs(out_dir: &Path) -> Result<(), String> {
    let compiler = cc::Build::new()
        .cargo_metadata(false)
        .pic(true)
        .opt_level(1)
        .try_get_compiler()
        .map_err(|e| format!("no C compiler: {}", e))?;

    for (name, flags) in STUB_VARIANTS {
        let output = out_dir.join(name);
        let status = Command::new(compiler.path())
            .args(compiler.args())
            .args(["-shared", "-fPIC", "-o"])
            .arg(&output)
            .args(*flags)
            .arg(STUB_SOURCE)
            .status()
            .map_err(|e| format!("failed to run {}: {}", compiler.path().display(), e))?;
        if !status.success() {
            return Err(format!("compiling {} failed with {}", name, status));
        }
    }
    Ok(())
}
