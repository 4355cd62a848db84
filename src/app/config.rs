//! 启动配置管理
//! 负责 .env、配置文件加载、模板生成和日志初始化

use crate::util::config::{Config, ConfigLoader, OverrideReport};
use crate::util::log::{cleanup_old_logs, log_init_with_config};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const LOG_FILE_PREFIX: &str = "user-insight";

/// 加载完成的配置及加载过程中的记录
///
/// 加载时日志系统尚未就绪，相关事件在 [`LoadedConfig::log_summary`] 中补记。
pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    pub dotenv: Option<PathBuf>,
    pub overrides: OverrideReport,
}

impl LoadedConfig {
    /// 日志初始化后调用
    pub fn log_summary(&self) {
        info!(event = "config.loaded", path = %self.path.display());
        if let Some(dotenv) = &self.dotenv {
            info!(event = "config.dotenv_loaded", path = %dotenv.display());
        }
        self.overrides.log();
    }
}

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 加载 .env 和配置文件，应用环境变量覆盖并验证
    ///
    /// 配置文件不存在时写入模板并返回错误。
    pub fn load() -> Result<LoadedConfig> {
        // .env 不存在是正常情况
        let dotenv = dotenvy::dotenv().ok();

        let config_path = ConfigLoader::find_config_file_path(CONFIG_FILE_NAME);
        if !config_path.exists() {
            Self::write_template(&config_path)?;
            return Err(anyhow!(
                "配置文件不存在，已生成模板: {}，请填写后重新运行",
                config_path.display()
            ));
        }

        let (config, overrides) = ConfigLoader::load_with_env_overrides(&config_path)
            .map_err(|e| anyhow!("配置加载失败 {}: {:#}", config_path.display(), e))?;

        Ok(LoadedConfig {
            config,
            path: config_path,
            dotenv,
            overrides,
        })
    }

    fn write_template(path: &Path) -> Result<()> {
        let template = Config::default();
        template.write_yaml_to_path(path)?;
        eprintln!("[warn] 配置文件不存在，已生成模板: {}", path.display());
        Ok(())
    }

    /// 初始化日志系统，并按保留天数清理旧日志
    pub fn initialize_logging(config: &Config) -> Result<Option<WorkerGuard>> {
        let guard = log_init_with_config(LOG_FILE_PREFIX, &config.logging)?;

        if let (true, Some(retention_days)) =
            (config.logging.file.enabled, config.logging.file.retention_days)
        {
            let log_path = Path::new(&config.logging.file.directory);
            if let Err(e) = cleanup_old_logs(log_path, LOG_FILE_PREFIX, retention_days) {
                warn!(event = "log.cleanup_failed", error = %e);
            }
        }

        Ok(guard)
    }
}
