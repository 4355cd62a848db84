//! 用户数据输入层
//!
//! 驱动器只依赖 [`UserSource`]；[`Inputs`] 把结构化记录、向量摘要和分析平台导出
//! 组装成单个用户的 [`UserAggregate`]。

pub mod analytics_users;
pub mod pinecone;
pub mod sqlite;
pub mod user_ids;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::model::{AnalyticsUser, FileModel, TaskModel, UserAggregate, UserModel};

/// 用户活动查询结果，`tasks` 按创建时间倒序
#[derive(Debug, Clone, Default)]
pub struct TaskHistory {
    /// 最新一条有效活动的创建时间
    pub last_task_date: Option<NaiveDateTime>,
    pub tasks: Vec<TaskModel>,
}

/// 结构化记录库
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// 按用户ID查询，不存在时返回 `None`
    async fn get_user(&self, user_id: &str) -> Result<Option<UserModel>>;

    /// 按用户ID查询指定类型的活动记录，最新的在前
    async fn get_tasks(&self, user_id: &str) -> Result<TaskHistory>;

    /// 按邮箱查询上传文件，最新的在前
    async fn get_files(&self, email: &str) -> Result<Vec<FileModel>>;
}

/// 向量库中的文件摘要
#[async_trait]
pub trait SummarySource: Send + Sync {
    async fn search_user_summary(&self, user_id_int: i64) -> Result<Vec<String>>;
}

/// 驱动器使用的用户聚合来源
#[async_trait]
pub trait UserSource: Send + Sync {
    /// `Ok(None)` 表示用户不在结构化记录库中
    async fn get(&self, user_id: &str) -> Result<Option<UserAggregate>>;
}

pub struct Inputs {
    records: Arc<dyn RecordSource>,
    summaries: Option<Arc<dyn SummarySource>>,
    analytics_users: HashMap<String, AnalyticsUser>,
}

impl Inputs {
    pub fn new(records: Arc<dyn RecordSource>) -> Self {
        Self {
            records,
            summaries: None,
            analytics_users: HashMap::new(),
        }
    }

    pub fn with_summaries(mut self, summaries: Arc<dyn SummarySource>) -> Self {
        self.summaries = Some(summaries);
        self
    }

    pub fn with_analytics_users(mut self, users: HashMap<String, AnalyticsUser>) -> Self {
        self.analytics_users = users;
        self
    }

    pub fn analytics_user_count(&self) -> usize {
        self.analytics_users.len()
    }
}

#[async_trait]
impl UserSource for Inputs {
    async fn get(&self, user_id: &str) -> Result<Option<UserAggregate>> {
        // 分析平台中找不到的用户视为访客
        let analytics_user = self.analytics_users.get(user_id).cloned();
        let is_guest_mode = analytics_user.is_none();

        let Some(user_model) = self.records.get_user(user_id).await? else {
            return Ok(None);
        };

        let history = self.records.get_tasks(user_id).await.unwrap_or_else(|e| {
            warn!(event = "inputs.tasks_failed", user_id = %user_id, error = %e);
            TaskHistory::default()
        });

        let files = if user_model.email.is_empty() {
            Vec::new()
        } else {
            self.records
                .get_files(&user_model.email)
                .await
                .unwrap_or_else(|e| {
                    warn!(event = "inputs.files_failed", user_id = %user_id, error = %e);
                    Vec::new()
                })
        };

        let summaries = match &self.summaries {
            Some(source) if user_model.user_id_int != 0 => source
                .search_user_summary(user_model.user_id_int)
                .await
                .unwrap_or_else(|e| {
                    warn!(event = "inputs.summary_failed", user_id = %user_id, error = %e);
                    Vec::new()
                }),
            _ => Vec::new(),
        };

        Ok(Some(UserAggregate {
            user_id: user_id.to_string(),
            user_id_int: user_model.user_id_int,
            email: user_model.email.clone(),
            is_guest_mode,
            last_task_date: history.last_task_date,
            avatar_info: String::new(),
            analytics_user,
            user_model: Some(user_model),
            tasks: history.tasks,
            files,
            summaries,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct StaticRecords;

    #[async_trait]
    impl RecordSource for StaticRecords {
        async fn get_user(&self, user_id: &str) -> Result<Option<UserModel>> {
            Ok((user_id == "7").then(|| UserModel {
                user_id: "7".to_string(),
                user_id_int: 7,
                email: "ada@example.com".to_string(),
                ..Default::default()
            }))
        }

        async fn get_tasks(&self, _user_id: &str) -> Result<TaskHistory> {
            Err(anyhow!("tasks table unavailable"))
        }

        async fn get_files(&self, email: &str) -> Result<Vec<FileModel>> {
            Ok(vec![FileModel {
                file_name: format!("{email}.pdf"),
                ..Default::default()
            }])
        }
    }

    struct Summaries;

    #[async_trait]
    impl SummarySource for Summaries {
        async fn search_user_summary(&self, user_id_int: i64) -> Result<Vec<String>> {
            Ok(vec![format!("summary for {user_id_int}")])
        }
    }

    #[tokio::test]
    async fn test_missing_user_is_none() {
        let inputs = Inputs::new(Arc::new(StaticRecords));
        assert!(inputs.get("8").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_aggregate_assembly() {
        let analytics = HashMap::from([(
            "7".to_string(),
            AnalyticsUser {
                user_id: "7".to_string(),
                plan: "pro".to_string(),
                ..Default::default()
            },
        )]);
        let inputs = Inputs::new(Arc::new(StaticRecords))
            .with_summaries(Arc::new(Summaries))
            .with_analytics_users(analytics);

        let user = inputs.get("7").await.unwrap().unwrap();
        assert!(!user.is_guest_mode);
        assert_eq!(user.plan(), "pro");
        assert_eq!(user.email, "ada@example.com");
        // 活动查询失败按空处理
        assert!(user.tasks.is_empty());
        assert!(user.last_task_date.is_none());
        assert_eq!(user.files[0].file_name, "ada@example.com.pdf");
        assert_eq!(user.summaries, vec!["summary for 7".to_string()]);
    }

    #[tokio::test]
    async fn test_user_without_analytics_profile_is_guest() {
        let inputs = Inputs::new(Arc::new(StaticRecords));
        let user = inputs.get("7").await.unwrap().unwrap();
        assert!(user.is_guest_mode);
        assert_eq!(user.plan(), "free");
        assert!(user.summaries.is_empty());
    }
}
