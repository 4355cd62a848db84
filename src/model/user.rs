//! 用户聚合数据模型
//! 每次富化调用由输入层组装，生命周期仅限单个用户的处理过程

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// 未知或缺失套餐时的默认值
pub const DEFAULT_PLAN: &str = "free";

/// 分析平台导出中表示缺失值的占位符
pub const UNDEFINED_PLACEHOLDER: &str = "undefined";

/// 结构化记录库中的用户行
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserModel {
    pub user_id: String,         // 用户ID (字符串形式)
    pub user_id_int: i64,        // 用户ID (数值形式，用于向量检索)
    pub email: String,           // 邮箱
    pub status: String,          // 账户状态
    pub given_name: String,      // 名
    pub family_name: String,     // 姓
    pub image_url: String,       // 头像地址
    pub output_language: String, // 输出语言偏好
    pub full_name: String,       // 全名
    pub update_at: Option<NaiveDateTime>,
}

/// 分析平台用户画像（来自导出的CSV）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsUser {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub last_seen: String,
    pub country_code: String,
    pub region: String,
    pub city: String,
    pub is_education: String,
    pub plan: String,
}

/// 任务元数据（任务表中的JSON字段）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMeta {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub file_ids: Vec<i64>,
}

/// 用户活动记录
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskModel {
    pub task_id: String,
    pub task_type: String,
    pub task_meta: Option<TaskMeta>,
}

impl TaskModel {
    /// 任务中用户输入的提示词，缺失时为空串
    pub fn prompt(&self) -> &str {
        self.task_meta
            .as_ref()
            .map(|meta| meta.prompt.as_str())
            .unwrap_or("")
    }
}

/// 用户上传的文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileModel {
    pub file_name: String,
    pub file_path: String,
    pub md5: String,
}

/// 单个用户的完整输入聚合
///
/// `user_model` 为空表示用户在结构化记录库中不存在，富化不得继续。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserAggregate {
    pub user_id: String,
    pub user_id_int: i64,
    pub email: String,
    pub is_guest_mode: bool,
    pub last_task_date: Option<NaiveDateTime>,
    /// 头像描述，由图像理解模型在预测前填充
    pub avatar_info: String,

    pub analytics_user: Option<AnalyticsUser>,
    pub user_model: Option<UserModel>,
    pub tasks: Vec<TaskModel>,
    pub files: Vec<FileModel>,
    pub summaries: Vec<String>,
}

impl UserAggregate {
    /// 当前套餐；分析平台中缺失或为 "undefined" 时视为免费用户
    pub fn plan(&self) -> String {
        match &self.analytics_user {
            Some(user) if !user.plan.is_empty() && user.plan != UNDEFINED_PLACEHOLDER => {
                user.plan.clone()
            }
            _ => DEFAULT_PLAN.to_string(),
        }
    }

    /// 最近一次活动时间，格式为 `YYYY-MM-DDTHH:MM:SS[.fraction]`，无记录时为空串
    pub fn last_task_time(&self) -> String {
        self.last_task_date
            .map(format_task_time)
            .unwrap_or_default()
    }

    /// guest标记的字符串形式，与快照文件保持一致
    pub fn guest_mode_flag(&self) -> String {
        bool_flag(self.is_guest_mode)
    }
}

/// 小数秒去掉末尾的0（`.250` 写作 `.25`），整秒时不带小数部分，与历史快照一致
pub fn format_task_time(time: NaiveDateTime) -> String {
    let mut text = time.format("%Y-%m-%dT%H:%M:%S").to_string();
    let nanos = time.nanosecond();
    if nanos != 0 {
        let fraction = format!("{nanos:09}");
        text.push('.');
        text.push_str(fraction.trim_end_matches('0'));
    }
    text
}

pub fn bool_flag(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}
