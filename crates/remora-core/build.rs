//! Build script for remora-core
//!
//! Checks system requirements before compilation:
//! - Minimum Rust version
//! - Whether the target has a process/memory backend
//!
//! ## Requirements
//!
//! - **Rust**: 1.74.0 or newer (`io::Error::other`)
//! - **Linux**: `/proc` mounted, `ptrace` permitted for launched children
//! - **Windows**: Win32 process and virtual memory APIs
//! - **macOS**: `task_for_pid` (requires sudo or the debugger entitlement for foreign tasks)

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    match rustc_version::version() {
        Ok(rustc_version) => {
            let min_rust_version = rustc_version::Version::new(1, 74, 0);

            if rustc_version < min_rust_version {
                panic!("remora-core requires Rust {min_rust_version} or newer, found {rustc_version}");
            }
        }
        // Some build environments hide the compiler version
        Err(_) => println!("cargo:warning=could not verify Rust version"),
    }

    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if !matches!(target_os.as_str(), "linux" | "windows" | "macos") {
        println!("cargo:warning=remora-core has no process backend for target os '{target_os}'");
    }

    let pointer_width = std::env::var("CARGO_CFG_TARGET_POINTER_WIDTH").unwrap_or_default();
    if pointer_width != "64" {
        println!("cargo:warning=remora-core is only tested on 64-bit targets (found {pointer_width}-bit)");
    }
}
