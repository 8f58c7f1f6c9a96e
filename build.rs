//! Build script for mdmkv.
//!
//! No code generation: record layouts live in `src/schema/` and payloads are
//! decoded at runtime with the `plist` crate.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
}
