//! 日志系统
//!
//! 提供基于 tracing 的日志系统，支持：
//! - 可配置的日志级别（`RUST_LOG` 优先）
//! - 多种日志格式（JSON、Pretty、Compact）
//! - 多个输出目标同时生效（stdout、stderr、文件）

use crate::api::error::ConfigError;
use crate::config::settings::LoggingConfig;
use crate::Result;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    registry::Registry,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 初始化日志系统
///
/// 每个输出目标各自一个 layer，可以同时输出到 stdout、stderr 和多个文件。
///
/// # 示例
///
/// ```no_run
/// use detectforge::config::settings::LoggingConfig;
/// use detectforge::utils::logging::init_logging;
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: "json".to_string(),
///     output: vec!["stdout".to_string(), "logs/app.log".to_string()],
/// };
///
/// init_logging(&config).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            EnvFilter::try_new(&config.level)
                .unwrap_or_else(|_| {
                    // 注意：这里不能使用 tracing::warn!，因为日志系统还没初始化
                    eprintln!(
                        "Warning: Invalid log level '{}', using 'info' as default",
                        config.level
                    );
                    EnvFilter::new("info")
                })
        });

    let layers = build_layers(config)?;

    Registry::default()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| ConfigError::Invalid(format!("Failed to initialize logging: {}", e)))?;

    tracing::info!(
        level = %config.level,
        format = %config.format,
        output = ?config.output,
        "Logging initialized"
    );

    Ok(())
}

/// 为每个输出目标构建 layer
pub fn build_layers(config: &LoggingConfig) -> Result<Vec<BoxedLayer>> {
    // 如果没有指定输出，默认使用 stdout
    let outputs: Vec<&str> = if config.output.is_empty() {
        vec!["stdout"]
    } else {
        config.output.iter().map(String::as_str).collect()
    };

    outputs
        .into_iter()
        .map(|target| -> Result<BoxedLayer> {
            match target {
                "stdout" => Ok(make_layer(&config.format, std::io::stdout, true)),
                "stderr" => Ok(make_layer(&config.format, std::io::stderr, true)),
                file_path => {
                    let file = open_log_file(Path::new(file_path))?;
                    Ok(make_layer(&config.format, Mutex::new(file), false))
                }
            }
        })
        .collect()
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::Invalid(format!("Failed to create log directory: {}", e))
        })?;
    }

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            ConfigError::Invalid(format!("Failed to open log file {}: {}", path.display(), e)).into()
        })
}

fn make_layer<W>(format: &str, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    match format.to_lowercase().as_str() {
        "json" => {
            fmt::layer()
                .with_writer(writer)
                .json()
                .with_target(true)
                .with_level(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .boxed()
        }
        "pretty" | "human" => {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .pretty()
                .with_target(true)
                .with_level(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .boxed()
        }
        // 默认使用 compact 格式
        _ => {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .compact()
                .with_target(true)
                .with_level(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_every_output_gets_a_layer() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("logs").join("app.log");
        let second = temp_dir.path().join("audit.log");
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "compact".to_string(),
            output: vec![
                "stderr".to_string(),
                first.display().to_string(),
                second.display().to_string(),
            ],
        };

        let layers = build_layers(&config).unwrap();
        assert_eq!(layers.len(), 3);

        let subscriber = Registry::default().with(layers);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(checkpoint = "best_1.pt", "Activated model");
        });

        for path in [&first, &second] {
            let content = std::fs::read_to_string(path).unwrap();
            assert!(content.contains("Activated model"));
            assert!(content.contains("best_1.pt"));
        }
    }

    #[test]
    fn test_json_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.log");
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "json".to_string(),
            output: vec![path.display().to_string()],
        };

        let subscriber = Registry::default().with(build_layers(&config).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("Registry query failed");
        });

        let line = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["level"], "WARN");
    }

    #[test]
    fn test_empty_output_defaults_to_stdout() {
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: vec![],
        };
        assert_eq!(build_layers(&config).unwrap().len(), 1);
    }
}
