//! 配置结构定义模块

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub insight: InsightConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub records: RecordsConfig,
    #[serde(default)]
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub mixpanel: MixpanelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 批处理与富化策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    /// 同时处理的最大用户数
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// 单用户处理截止时间（秒）
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// 启动时加载已有结果快照，实现增量续跑
    #[serde(default = "default_true")]
    pub is_continue: bool,
    /// 无视活动数量总是重新处理的套餐
    #[serde(default = "default_premium_plan")]
    pub premium_plan: String,
    /// 非高级用户需要的最少活动记录数
    #[serde(default = "default_min_task_count")]
    pub min_task_count: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            task_timeout_secs: default_task_timeout_secs(),
            is_continue: true,
            premium_plan: default_premium_plan(),
            min_task_count: default_min_task_count(),
        }
    }
}

/// 本地文件路径
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_results_csv")]
    pub results_csv: String,
    #[serde(default = "default_analytics_users_csv")]
    pub analytics_users_csv: String,
    #[serde(default = "default_process_users_csv")]
    pub process_users_csv: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            results_csv: default_results_csv(),
            analytics_users_csv: default_analytics_users_csv(),
            process_users_csv: default_process_users_csv(),
        }
    }
}

/// 文本生成后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// 请求 JSON 对象格式的回复
    #[serde(default)]
    pub json_response: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout_secs(),
            json_response: false,
        }
    }
}

/// 结构化记录库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    #[serde(default = "default_records_database_url")]
    pub database_url: String,
    /// 参与画像的活动类型
    #[serde(default = "default_task_type")]
    pub task_type: String,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            database_url: default_records_database_url(),
            task_type: default_task_type(),
        }
    }
}

/// 向量检索（文件摘要）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PineconeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub index_host: String,
    #[serde(default = "default_pinecone_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            index_host: String::new(),
            namespace: default_pinecone_namespace(),
            api_key: String::new(),
            top_k: default_top_k(),
            dimension: default_dimension(),
        }
    }
}

/// 画像平台上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixpanelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mixpanel_api_host")]
    pub api_host: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub service_account: Option<String>,
    #[serde(default)]
    pub service_secret: Option<String>,
}

impl Default for MixpanelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_host: default_mixpanel_api_host(),
            token: String::new(),
            service_account: None,
            service_secret: None,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: LogFileConfig,
    /// 是否输出JSON结构化日志
    #[serde(default)]
    pub structured: Option<bool>,
    /// 按模块覆盖日志级别，例如 `insight::batch: debug`
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: LogFileConfig::default(),
            structured: None,
            overrides: HashMap::new(),
        }
    }
}

/// 日志文件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileConfig {
    pub enabled: bool,
    pub directory: String,
    pub retention_days: Option<u32>,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "logs".to_string(),
            retention_days: Some(7),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_concurrency() -> usize {
    100
}

fn default_task_timeout_secs() -> u64 {
    120
}

fn default_premium_plan() -> String {
    "pro".to_string()
}

fn default_min_task_count() -> usize {
    1
}

fn default_results_csv() -> String {
    "./results/results.csv".to_string()
}

fn default_analytics_users_csv() -> String {
    "./sources/mixpanel/users.csv".to_string()
}

fn default_process_users_csv() -> String {
    "./sources/big_query/users.csv".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4.1".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    90
}

fn default_records_database_url() -> String {
    "sqlite:./sources/records.db".to_string()
}

fn default_task_type() -> String {
    "communication".to_string()
}

fn default_pinecone_namespace() -> String {
    "documents".to_string()
}

fn default_top_k() -> usize {
    10
}

fn default_dimension() -> usize {
    1536
}

fn default_mixpanel_api_host() -> String {
    "https://api.mixpanel.com".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
