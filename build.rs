use std::env;

fn main() {
    println!("cargo:rustc-check-cfg=cfg(firmware_log)");

    // Host builds only compile the hardware-independent library for unit tests
    let bare_metal = env::var("CARGO_CFG_TARGET_OS").map(|os| os == "none").unwrap_or(false);
    if !bare_metal {
        return;
    }

    // Set linker flags for all binaries
    println!("cargo:rustc-link-arg-bins=--nmagic");

    // Main linker script, memory.x is provided by embassy-stm32's `memory-x` feature
    println!("cargo:rustc-link-arg-bins=-Tlink.x");

    // Only link defmt and enable library logging if the feature is enabled
    if env::var_os("CARGO_FEATURE_DEFMT").is_some() {
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
        println!("cargo:rustc-cfg=firmware_log");
    }
}
