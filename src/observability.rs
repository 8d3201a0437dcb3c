use discount_common::config::{DiscountConfig, LogConfig};
use std::fs;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::error::Result;

const LOG_FILE_NAME: &str = "discountd.log";

/// Guard for observability resources (non-blocking log writer)
#[derive(Default)]
pub struct ObservabilityGuard {
    _log_guard: Option<WorkerGuard>,
}

/// Initialize logging for the long-running service based on configuration
pub fn init_observability(config: &DiscountConfig) -> Result<ObservabilityGuard> {
    let mut guard = ObservabilityGuard::default();

    if config.is_console_logging() {
        init_subscriber_with_writer(std::io::stdout, true, config);
    } else {
        let log_config = &config.observability.log;
        fs::create_dir_all(&log_config.path)?;
        let (non_blocking, worker_guard) =
            build_file_writer(log_config, config.should_rotate_logs())?;
        guard._log_guard = Some(worker_guard);

        init_subscriber_with_writer(non_blocking, false, config);
    }

    Ok(guard)
}

/// 一次性命令的日志只写 stderr，stdout 留给命令输出
pub fn init_command_logging(config: &DiscountConfig) {
    tracing_subscriber::registry()
        .with(create_env_filter(config, false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
}

/// Create an EnvFilter from config, with RUST_LOG taking precedence
fn create_env_filter(config: &DiscountConfig, announce: bool) -> EnvFilter {
    let directive = config.get_filter_level();
    if announce {
        println!("Using log filter: {directive}");
    }

    EnvFilter::try_new(&directive).unwrap_or_else(|_| {
        eprintln!(
            "Failed to parse filter directive: {}. Falling back to default: info",
            directive
        );
        EnvFilter::new("info")
    })
}

fn init_subscriber_with_writer<W>(writer: W, use_ansi: bool, config: &DiscountConfig)
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(use_ansi)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(create_env_filter(config, true))
        .with(fmt_layer)
        .try_init()
        .ok();
}

fn build_file_writer(log_config: &LogConfig, rotate: bool) -> Result<(NonBlocking, WorkerGuard)> {
    println!("日志写入模式: 文件");
    println!("  - 路径: {}", log_config.path);
    println!("  - 轮转: {}", if rotate { "开启（按天）" } else { "关闭" });

    if rotate {
        let file_appender = tracing_appender::rolling::daily(&log_config.path, LOG_FILE_NAME);
        Ok(tracing_appender::non_blocking(file_appender))
    } else {
        let log_file_path = std::path::Path::new(&log_config.path).join(LOG_FILE_NAME);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path)?;
        Ok(tracing_appender::non_blocking(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_writer_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_config = LogConfig {
            output: "file".to_string(),
            rotate: false,
            path: dir.path().display().to_string(),
        };

        let (_writer, _guard) = build_file_writer(&log_config, false).unwrap();
        assert!(dir.path().join(LOG_FILE_NAME).exists());
    }
}
