// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests {
    use log::LevelFilter;

    use crate::logging::config::LoggingConfig;
    use crate::logging::structured::{LogFormat, LoggerConfig, create_logger};
    use crate::logging::{init, init_with_config, is_structured, test_logger};

    #[test]
    fn test_logging_config_defaults() {
        let config: LoggingConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config, LoggingConfig::default());
        assert!(!config.structured);
        assert_eq!(config.format, LogFormat::Terminal);
        assert_eq!(config.level, "info");
        assert!(config.include_location);
        assert!(config.include_thread_id);
    }

    #[test]
    fn test_level_filter() {
        let mut config = LoggingConfig::default();
        for (name, expected) in [
            ("trace", LevelFilter::Trace),
            ("DEBUG", LevelFilter::Debug),
            ("warn", LevelFilter::Warn),
            ("error", LevelFilter::Error),
            ("off", LevelFilter::Off),
            ("loud", LevelFilter::Info),
        ] {
            config.level = name.to_string();
            assert_eq!(config.level_filter(), expected, "level {name}");
        }
    }

    #[test]
    fn test_to_logger_config() {
        let config: LoggingConfig = serde_json::from_value(serde_json::json!({
            "structured": true,
            "format": "json",
            "level": "warn",
            "include_location": false,
            "static_fields": { "service": "proxifact", "env": "test" }
        }))
        .unwrap();

        let logger_config = config.to_logger_config();
        assert_eq!(logger_config.format, LogFormat::Json);
        assert_eq!(logger_config.level, slog::Level::Warning);
        assert!(!logger_config.include_location);
        assert!(logger_config.include_thread_id);
        assert_eq!(
            logger_config.static_fields,
            vec![
                ("env".to_string(), "test".to_string()),
                ("service".to_string(), "proxifact".to_string()),
            ]
        );
    }

    #[test]
    fn test_create_loggers() {
        test_logger::init_test_logger();

        for format in [LogFormat::Terminal, LogFormat::Json] {
            let logger = create_logger(&LoggerConfig {
                format,
                level: slog::Level::Critical,
                static_fields: vec![("component".to_string(), "tests".to_string())],
                ..LoggerConfig::default()
            });
            slog::debug!(logger, "filtered out");
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        init(Some(LevelFilter::Info));
        init(Some(LevelFilter::Trace));
        init_with_config(LevelFilter::Debug, &LoggingConfig::default());

        let structured = LoggingConfig {
            structured: true,
            ..LoggingConfig::default()
        };
        init_with_config(LevelFilter::Debug, &structured);

        // the first call decided the backend
        assert!(!is_structured());
        crate::info_fmt!("LoggingTests", "still logging after {} inits", 4);
    }
}
