use crate::util::config::LoggingConfig;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::fmt::format::Format;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// 初始化日志：控制台 + 按天滚动的文件
///
/// 返回的 guard 需要持有到进程退出，否则缓冲中的日志会丢失。
pub fn log_init_with_config(
    file_prefix: &str,
    config: &LoggingConfig,
) -> anyhow::Result<Option<WorkerGuard>> {
    let level_filter = parse_level(&config.level).unwrap_or(LevelFilter::INFO);
    let filter_expression = build_env_filter_expression(level_filter, &config.overrides);
    let use_json = config.structured.unwrap_or(false);

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.push(stdout_layer(use_json, make_filter(&filter_expression, level_filter)));

    let mut guard = None;
    let mut log_dir = None;
    if config.file.enabled {
        let dir = resolve_log_dir(&config.file.directory);
        std::fs::create_dir_all(&dir)?;

        let file_appender = daily(&dir, format!("{}.log", file_prefix));
        let (no_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        let filter = make_filter(&filter_expression, level_filter);
        let file_layer = if use_json {
            layer()
                .json()
                .with_target(false)
                .with_ansi(false)
                .with_writer(no_blocking)
                .with_filter(filter)
                .boxed()
        } else {
            layer()
                .event_format(file_format())
                .with_ansi(false)
                .with_writer(no_blocking)
                .with_filter(filter)
                .boxed()
        };
        layers.push(file_layer);
        guard = Some(file_guard);
        log_dir = Some(dir);
    }

    Registry::default().with(layers).try_init()?;

    match &log_dir {
        Some(dir) => {
            tracing::info!(
                event = "log.init",
                level = %config.level,
                console = true,
                file = true,
                directory = %dir.display(),
                rotation = "daily",
                structured = use_json
            );
            if let Some(retention) = config.file.retention_days {
                tracing::info!(event = "log.retention", days = retention);
            }
        }
        None => {
            tracing::info!(event = "log.init", level = %config.level, console = true, file = false, structured = use_json);
        }
    }

    Ok(guard)
}

fn stdout_layer(use_json: bool, filter: EnvFilter) -> BoxedLayer {
    if use_json {
        layer()
            .json()
            .with_target(false)
            .with_writer(io::stdout)
            .with_filter(filter)
            .boxed()
    } else {
        let console_format = Format::default()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false);
        layer()
            .event_format(console_format)
            .with_writer(io::stdout)
            .with_filter(filter)
            .boxed()
    }
}

fn file_format() -> Format {
    Format::default()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
}

fn make_filter(expression: &str, fallback: LevelFilter) -> EnvFilter {
    EnvFilter::try_new(expression).unwrap_or_else(|_| EnvFilter::new(level_filter_to_str(fallback)))
}

/// 相对路径基于工作目录；在 bin 目录下运行时使用上级目录
fn resolve_log_dir(directory: &str) -> PathBuf {
    let path = Path::new(directory);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if current_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
        if let Some(parent) = current_dir.parent() {
            return parent.join(directory);
        }
    }
    current_dir.join(directory)
}

/// 删除超过保留天数的日志文件，只处理带有给定前缀的文件
pub fn cleanup_old_logs(log_dir: &Path, file_prefix: &str, retention_days: u32) -> anyhow::Result<usize> {
    if !log_dir.exists() {
        tracing::debug!(event = "log.cleanup_skipped", directory = %log_dir.display());
        return Ok(0);
    }

    let cutoff_time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs()
        .saturating_sub(retention_days as u64 * 24 * 60 * 60);

    let mut deleted_count = 0;
    let mut error_count = 0;

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("");

        if !file_name.starts_with(file_prefix) {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        let check_time = metadata
            .modified()
            .or_else(|_| metadata.created())
            .unwrap_or_else(|_| std::time::SystemTime::now());
        let Ok(file_time) = check_time.duration_since(std::time::UNIX_EPOCH) else {
            continue;
        };

        if file_time.as_secs() < cutoff_time {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    deleted_count += 1;
                    tracing::debug!(event = "log.cleanup_removed", file = %path.display());
                }
                Err(e) => {
                    error_count += 1;
                    tracing::warn!(event = "log.cleanup_failed", file = %path.display(), error = %e);
                }
            }
        }
    }

    if deleted_count > 0 || error_count > 0 {
        tracing::info!(
            event = "log.cleanup",
            retention_days,
            deleted = deleted_count,
            failed = error_count
        );
    }

    Ok(deleted_count)
}

fn build_env_filter_expression(
    default_level: LevelFilter,
    overrides: &HashMap<String, String>,
) -> String {
    let mut directives = vec![level_filter_to_str(default_level).to_string()];

    // 依赖库的连接日志默认压到 warn
    directives.push("sqlx=warn".to_string());
    directives.push("hyper=warn".to_string());
    directives.push("reqwest=warn".to_string());

    let mut targets: Vec<_> = overrides.iter().collect();
    targets.sort();
    for (target, level_str) in targets {
        if let Some(level) = parse_level(level_str) {
            directives.push(format!(
                "{}={}",
                normalize_directive_target(target),
                level_filter_to_str(level)
            ));
        }
    }

    directives.join(",")
}

fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.to_lowercase().as_str() {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        "error" => Some(LevelFilter::ERROR),
        _ => None,
    }
}

fn level_filter_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::OFF => "off",
        LevelFilter::ERROR => "error",
        LevelFilter::WARN => "warn",
        LevelFilter::INFO => "info",
        LevelFilter::DEBUG => "debug",
        _ => "trace",
    }
}

/// `insight.batch` 写法映射为 `user_insight::insight::batch`，
/// `target:xxx` 原样使用
fn normalize_directive_target(target: &str) -> String {
    if let Some(raw) = target.strip_prefix("target:") {
        raw.to_string()
    } else if target.contains("::") {
        target.to_string()
    } else {
        let path = target.replace('.', "::");
        format!("user_insight::{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_expression_with_overrides() {
        let overrides = HashMap::from([
            ("insight.batch".to_string(), "debug".to_string()),
            ("target:sqlx".to_string(), "ERROR".to_string()),
            ("outputs".to_string(), "noisy".to_string()),
        ]);
        let expr = build_env_filter_expression(LevelFilter::INFO, &overrides);
        assert!(expr.starts_with("info,"));
        assert!(expr.contains("user_insight::insight::batch=debug"));
        assert!(expr.contains("sqlx=error"));
        assert!(!expr.contains("outputs"));
        assert!(EnvFilter::try_new(&expr).is_ok());
    }

    #[test]
    fn test_cleanup_only_touches_prefixed_files() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("user-insight.log.2026-01-01"), "old").unwrap();
        std::fs::write(dir.path().join("results.csv"), "keep").unwrap();

        // 保留0天：所有带前缀的文件都过期
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let deleted = cleanup_old_logs(dir.path(), "user-insight", 0).unwrap();
        assert_eq!(deleted, 1);
        assert!(dir.path().join("results.csv").exists());
    }
}
