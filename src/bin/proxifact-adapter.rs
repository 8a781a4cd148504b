// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stand-alone adapter process.
//!
//! Reads `PROXIFACT_CONFIG_FILE`, or `/etc/proxifact/config.toml` when it is
//! unset, with `PROXIFACT_*` environment variables layered on top.

use std::env;
use std::error::Error;
use std::path::Path;

use proxifact::{Proxifact, error_fmt, info_fmt};

const DEFAULT_CONFIG_FILE: &str = "/etc/proxifact/config.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let path = match env::var("PROXIFACT_CONFIG_FILE") {
        Ok(path) => path,
        Err(_) => {
            if !Path::new(DEFAULT_CONFIG_FILE).exists() {
                eprintln!(
                    "No PROXIFACT_CONFIG_FILE set and {DEFAULT_CONFIG_FILE} does not exist"
                );
                return Err(Box::from("no configuration file found"));
            }
            DEFAULT_CONFIG_FILE.to_string()
        }
    };

    let proxifact = match Proxifact::loader()
        .with_config_file(&path)
        .with_env_vars()
        .build()
        .await
    {
        Ok(proxifact) => proxifact,
        Err(e) => {
            eprintln!("Failed to build adapter from {path}: {e}");
            return Err(e.into());
        }
    };

    info_fmt!("Proxifact", "Configuration loaded from {}", path);

    match proxifact.start().await {
        Ok(()) => {
            info_fmt!("Proxifact", "Adapter stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error_fmt!("Proxifact", "Adapter failed: {}", e);
            Err(e.into())
        }
    }
}
