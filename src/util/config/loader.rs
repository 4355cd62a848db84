//! 配置加载和管理模块
//! 处理配置文件的读取、环境变量覆盖、验证和模板生成

use super::types::*;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// 配置加载器
pub struct ConfigLoader;

/// 环境变量覆盖结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideReport {
    /// 生效的变量名，按应用顺序
    pub applied: Vec<&'static str>,
    /// 无法解析而被忽略的变量及其原值
    pub invalid: Vec<(&'static str, String)>,
}

impl OverrideReport {
    /// 输出覆盖日志，需在日志系统初始化后调用
    pub fn log(&self) {
        for key in &self.applied {
            tracing::info!(event = "config.override", key = *key);
        }
        for (key, value) in &self.invalid {
            tracing::warn!(event = "config.override_invalid", key = *key, value = %value);
        }
    }
}

impl ConfigLoader {
    /// 从YAML文件读取配置
    pub fn read_yaml(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config = serde_yaml::from_str(&config_str)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        Ok(config)
    }

    /// 从进程环境变量应用覆盖
    pub fn apply_env_overrides(config: Config) -> (Config, OverrideReport) {
        Self::apply_overrides_with(config, |key| std::env::var(key).ok())
    }

    /// 按给定的查找函数应用覆盖，空值忽略
    ///
    /// 加载配置时日志尚未初始化，覆盖情况记录在 [`OverrideReport`] 中由调用方稍后输出。
    pub fn apply_overrides_with<F>(mut config: Config, lookup: F) -> (Config, OverrideReport)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut report = OverrideReport::default();
        let mut get = |key: &'static str| {
            let value = lookup(key).filter(|value| !value.trim().is_empty());
            if value.is_some() {
                report.applied.push(key);
            }
            value
        };

        if let Some(key) = get("OPENAI_API_KEY") {
            config.llm.api_key = key;
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Some(model) = get("INSIGHT_MODEL") {
            config.llm.model = model;
        }
        let concurrency = get("INSIGHT_MAX_CONCURRENCY");
        if let Some(url) = get("RECORDS_DATABASE_URL") {
            config.records.database_url = url;
        }
        if let Some(host) = get("PINECONE_INDEX_HOST") {
            config.pinecone.index_host = host;
            config.pinecone.enabled = true;
        }
        if let Some(namespace) = get("PINECONE_NAMESPACE") {
            config.pinecone.namespace = namespace;
        }
        if let Some(key) = get("PINECONE_API_KEY") {
            config.pinecone.api_key = key;
        }
        if let Some(token) = get("MIXPANEL_TOKEN") {
            config.mixpanel.token = token;
            config.mixpanel.enabled = true;
        }
        if let Some(account) = get("MIXPANEL_SERVICE_ACCOUNT") {
            config.mixpanel.service_account = Some(account);
        }
        if let Some(secret) = get("MIXPANEL_SERVICE_SECRET") {
            config.mixpanel.service_secret = Some(secret);
        }
        if let Some(level) = get("LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }

        if let Some(value) = concurrency {
            match value.parse::<usize>() {
                Ok(n) => config.insight.max_concurrency = n,
                Err(_) => {
                    report.applied.retain(|key| *key != "INSIGHT_MAX_CONCURRENCY");
                    report.invalid.push(("INSIGHT_MAX_CONCURRENCY", value));
                }
            }
        }

        (config, report)
    }

    /// 读取文件并应用环境变量覆盖，最后验证
    pub fn load_with_env_overrides(path: impl AsRef<Path>) -> Result<(Config, OverrideReport)> {
        let base_config = Self::read_yaml(path)?;
        let (config, report) = Self::apply_env_overrides(base_config);
        Self::validate_config(&config)?;
        Ok((config, report))
    }

    /// 验证配置的有效性
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.insight.max_concurrency == 0 {
            return Err(anyhow!("insight.max_concurrency 必须大于0"));
        }
        if config.insight.task_timeout_secs == 0 {
            return Err(anyhow!("insight.task_timeout_secs 必须大于0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(anyhow!("无效的日志级别: {}", config.logging.level));
        }

        if config.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.model 不能为空"));
        }
        Url::parse(&config.llm.base_url)
            .with_context(|| format!("无效的 llm.base_url: {}", config.llm.base_url))?;

        if config.pinecone.enabled && config.pinecone.index_host.trim().is_empty() {
            return Err(anyhow!("已启用向量检索但 pinecone.index_host 为空"));
        }
        if config.mixpanel.enabled && config.mixpanel.token.trim().is_empty() {
            return Err(anyhow!("已启用画像上传但 mixpanel.token 为空"));
        }

        Ok(())
    }

    /// 查找配置文件：`./config/`、上级目录的 `config/`、当前目录
    pub fn find_config_file_path(filename: &str) -> PathBuf {
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let config_in_current = current_dir.join("config").join(filename);
        if config_in_current.exists() {
            return config_in_current;
        }

        if let Some(parent) = current_dir.parent() {
            let config_in_parent = parent.join("config").join(filename);
            if config_in_parent.exists() {
                return config_in_parent;
            }
        }

        current_dir.join(filename)
    }
}

/// 配置写入器
pub struct ConfigWriter;

impl ConfigWriter {
    /// 写入YAML，必要时创建父目录
    pub fn write_yaml_with_dir(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_yaml::to_string(config)?;
        fs::write(path, content).with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
insight:
  max_concurrency: 8
llm:
  model: gpt-4o-mini
"#,
        )
        .unwrap();
        assert_eq!(config.insight.max_concurrency, 8);
        assert_eq!(config.insight.task_timeout_secs, 120);
        assert_eq!(config.insight.premium_plan, "pro");
        assert_eq!(config.insight.min_task_count, 1);
        assert!(config.insight.is_continue);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.paths.results_csv, "./results/results.csv");
        assert!(ConfigLoader::validate_config(&config).is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-live"),
            ("INSIGHT_MAX_CONCURRENCY", "16"),
            ("MIXPANEL_TOKEN", "mp-token"),
            ("PINECONE_INDEX_HOST", ""),
        ]);
        let (config, report) = ConfigLoader::apply_overrides_with(Config::default(), |key| {
            env.get(key).map(|v| v.to_string())
        });
        assert_eq!(config.llm.api_key, "sk-live");
        assert_eq!(config.insight.max_concurrency, 16);
        assert!(config.mixpanel.enabled);
        assert_eq!(config.mixpanel.token, "mp-token");
        assert!(!config.pinecone.enabled);
        assert_eq!(
            report.applied,
            vec!["OPENAI_API_KEY", "INSIGHT_MAX_CONCURRENCY", "MIXPANEL_TOKEN"]
        );
        assert!(report.invalid.is_empty());
    }

    #[test]
    fn test_invalid_concurrency_override_is_ignored() {
        let (config, report) = ConfigLoader::apply_overrides_with(Config::default(), |key| {
            (key == "INSIGHT_MAX_CONCURRENCY").then(|| "many".to_string())
        });
        assert_eq!(config.insight.max_concurrency, 100);
        // 日志初始化后才输出，因此先记录下来
        assert!(report.applied.is_empty());
        assert_eq!(
            report.invalid,
            vec![("INSIGHT_MAX_CONCURRENCY", "many".to_string())]
        );
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.insight.max_concurrency = 0;
        assert!(ConfigLoader::validate_config(&config).is_err());

        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(ConfigLoader::validate_config(&config).is_err());

        let mut config = Config::default();
        config.mixpanel.enabled = true;
        assert!(ConfigLoader::validate_config(&config).is_err());
    }

    #[test]
    fn test_template_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config").join("config.yaml");
        ConfigWriter::write_yaml_with_dir(&Config::default(), &path).unwrap();

        let loaded = ConfigLoader::read_yaml(&path).unwrap();
        assert_eq!(loaded.insight.max_concurrency, 100);
        assert_eq!(loaded.records.task_type, "communication");
        assert!(ConfigLoader::validate_config(&loaded).is_ok());
    }
}
