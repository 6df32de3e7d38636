// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Build script for the PLM SSIT firmware.

use std::env;

/// Platforms which can be selected with `--cfg platform="..."`.
const PLATFORMS: [&str; 1] = ["versal"];

fn main() {
    println!(
        "cargo::rustc-check-cfg=cfg(platform, values(\"{}\"))",
        PLATFORMS.join("\", \""),
    );
    println!("cargo:rerun-if-env-changed=LOG_LEVEL");

    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none") {
        let platform = env::var("CARGO_CFG_PLATFORM").expect("Missing platform name");
        assert!(
            PLATFORMS.contains(&platform.as_str()),
            "Unexpected platform name {platform:?}. Supported platforms: {PLATFORMS:?}"
        );
    }
}
