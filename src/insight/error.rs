use thiserror::Error;

/// 单用户富化过程中的错误分类
///
/// 所有变体都在驱动器边界内被记录并吞掉，不会中断批处理。
#[derive(Debug, Error)]
pub enum InsightError {
    /// 用户不在结构化记录库中，静默跳过
    #[error("user {0} not found in record source")]
    NotFound(String),

    /// 数据获取或模型调用失败
    #[error("backend call failed: {0:#}")]
    Backend(#[from] anyhow::Error),

    /// 模型返回内容无法解析为预测结构
    #[error("failed to decode model answer: {source}")]
    Decode {
        content: String,
        #[source]
        source: serde_json::Error,
    },

    /// 可选子步骤失败（例如头像描述），调用方以空值继续
    #[error("optional step {step} failed: {reason}")]
    PartialData { step: &'static str, reason: String },

    /// 快照读写失败
    #[error("snapshot io failed: {0}")]
    Io(#[from] std::io::Error),

    /// 单用户处理超过截止时间
    #[error("user {user_id} exceeded deadline of {secs}s")]
    Timeout { user_id: String, secs: u64 },
}

impl InsightError {
    /// 日志中使用的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            InsightError::NotFound(_) => "not_found",
            InsightError::Backend(_) => "backend",
            InsightError::Decode { .. } => "decode",
            InsightError::PartialData { .. } => "partial_data",
            InsightError::Io(_) => "io",
            InsightError::Timeout { .. } => "timeout",
        }
    }
}

pub type InsightResult<T> = std::result::Result<T, InsightError>;
