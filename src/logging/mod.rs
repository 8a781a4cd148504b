// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging setup.
//!
//! All code logs through the `log` facade, usually via the `*_fmt!` macros.
//! Output goes either to `env_logger` or, when structured logging is
//! configured, through `slog_stdlog` into an `slog` drain (terminal or JSON).

pub mod config;
pub mod structured;
#[cfg(test)]
pub mod test_logger;
pub mod wrapper;

#[cfg(test)]
mod tests;

use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use once_cell::sync::OnceCell;
use slog_scope::GlobalLoggerGuard;

use self::config::LoggingConfig;

static INIT: Once = Once::new();
static USING_STRUCTURED: AtomicBool = AtomicBool::new(false);
static GLOBAL_GUARD: OnceCell<GlobalLoggerGuard> = OnceCell::new();

/// Initialize plain `env_logger` output at `level` (`info` when `None`).
///
/// `RUST_LOG` still takes precedence.  Only the first initialization in a
/// process has any effect.
pub fn init(level: Option<LevelFilter>) {
    INIT.call_once(|| {
        let level = level.unwrap_or(LevelFilter::Info);
        let env = env_logger::Env::default()
            .filter_or("RUST_LOG", level.as_str().to_ascii_lowercase());

        // a logger installed by the host application wins
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .format_target(true)
            .try_init();

        log::info!("Logging initialized at level: {}", log::max_level());
    });
}

/// Initialize logging from `config`, falling back to [`init`] when
/// structured output is disabled.
pub fn init_with_config(level: LevelFilter, config: &LoggingConfig) {
    if !config.structured {
        init(Some(level));
        return;
    }

    INIT.call_once(|| {
        let logger = structured::create_logger(&config.to_logger_config());
        let _ = GLOBAL_GUARD.set(slog_scope::set_global_logger(logger));

        match slog_stdlog::init_with_level(to_log_level(level)) {
            Ok(()) => {
                log::set_max_level(level);
                USING_STRUCTURED.store(true, Ordering::SeqCst);
                log::info!(
                    "Structured logging initialized at level {} ({:?})",
                    level,
                    config.format
                );
            }
            Err(e) => eprintln!("structured logging unavailable: {e}"),
        }
    });
}

/// Whether records are currently routed into `slog`.
pub fn is_structured() -> bool {
    USING_STRUCTURED.load(Ordering::SeqCst)
}

fn to_log_level(level: LevelFilter) -> log::Level {
    level.to_level().unwrap_or(log::Level::Error)
}
