// Packagers stamp kiosk images with KIOSK_BUILD_VERSION; `--version` falls
// back to the crate version otherwise.
const VERSION_VAR: &str = "KIOSK_BUILD_VERSION";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed={VERSION_VAR}");

    let version = match std::env::var(VERSION_VAR) {
        Ok(stamp) if !stamp.trim().is_empty() => stamp.trim().to_owned(),
        _ => env!("CARGO_PKG_VERSION").to_owned(),
    };

    println!("cargo:rustc-env={VERSION_VAR}={version}");
}
