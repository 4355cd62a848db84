//! 结构化记录库（SQLite）
//!
//! 表结构：
//! - `users(id, email, status, given_name, family_name, image_url, output_language, full_name, updated_at)`
//! - `tasks(id, user_id, task_type, created_at, task_meta)`，`task_meta` 为JSON文本
//! - `files(user_id, filename, filepath, md5, created_at)`

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use super::{RecordSource, TaskHistory};
use crate::model::{FileModel, TaskMeta, TaskModel, UserModel};

pub struct SqliteRecordSource {
    pool: SqlitePool,
    task_type: String,
}

impl SqliteRecordSource {
    /// 只读打开记录库
    pub async fn connect(database_url: &str, task_type: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("无效的数据库地址: {database_url}"))?
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("连接记录库失败: {database_url}"))?;

        sqlx::query("SELECT 1").fetch_one(&pool).await?;
        info!(event = "records.connected", url = %database_url, task_type = %task_type);

        Ok(Self::from_pool(pool, task_type))
    }

    pub fn from_pool(pool: SqlitePool, task_type: &str) -> Self {
        Self {
            pool,
            task_type: task_type.to_string(),
        }
    }
}

#[async_trait]
impl RecordSource for SqliteRecordSource {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserModel>> {
        // 记录库中的ID为整数，非数字ID不可能命中
        let Ok(id) = user_id.trim().parse::<i64>() else {
            debug!(event = "records.user_id_not_numeric", user_id = %user_id);
            return Ok(None);
        };

        let row = sqlx::query(
            r#"
            SELECT id, email, status, given_name, family_name, image_url,
                   output_language, full_name, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("查询用户失败: {user_id}"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: i64 = row.try_get("id")?;
        let text = |column: &str| -> Result<String> {
            Ok(row.try_get::<Option<String>, _>(column)?.unwrap_or_default())
        };

        Ok(Some(UserModel {
            user_id: id.to_string(),
            user_id_int: id,
            email: text("email")?,
            status: text("status")?,
            given_name: text("given_name")?,
            family_name: text("family_name")?,
            image_url: text("image_url")?,
            output_language: text("output_language")?,
            full_name: text("full_name")?,
            update_at: parse_datetime(&text("updated_at")?),
        }))
    }

    async fn get_tasks(&self, user_id: &str) -> Result<TaskHistory> {
        let Ok(id) = user_id.trim().parse::<i64>() else {
            return Ok(TaskHistory::default());
        };

        let rows = sqlx::query(
            r#"
            SELECT id, task_type, created_at, task_meta
            FROM tasks
            WHERE task_type = ? AND user_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(self.task_type.as_str())
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("查询活动记录失败: {user_id}"))?;

        let mut history = TaskHistory::default();
        for row in rows {
            let Some(meta_text) = row.try_get::<Option<String>, _>("task_meta")? else {
                continue;
            };

            if history.last_task_date.is_none() {
                let created_at: Option<String> = row.try_get("created_at")?;
                history.last_task_date = created_at.as_deref().and_then(parse_datetime);
            }

            let task_id: i64 = row.try_get("id")?;
            let task_meta = serde_json::from_str::<TaskMeta>(&meta_text).unwrap_or_else(|e| {
                debug!(event = "records.task_meta_invalid", task_id, error = %e);
                TaskMeta::default()
            });

            history.tasks.push(TaskModel {
                task_id: task_id.to_string(),
                task_type: row.try_get::<Option<String>, _>("task_type")?.unwrap_or_default(),
                task_meta: Some(task_meta),
            });
        }

        Ok(history)
    }

    async fn get_files(&self, email: &str) -> Result<Vec<FileModel>> {
        if email.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT f.filename, f.filepath, f.md5
            FROM files AS f
            JOIN users AS u ON f.user_id = u.id
            WHERE u.email = ?
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("查询上传文件失败: {email}"))?;

        rows.into_iter()
            .map(|row| {
                Ok(FileModel {
                    file_name: row.try_get::<Option<String>, _>("filename")?.unwrap_or_default(),
                    file_path: row.try_get::<Option<String>, _>("filepath")?.unwrap_or_default(),
                    md5: row.try_get::<Option<String>, _>("md5")?.unwrap_or_default(),
                })
            })
            .collect()
    }
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}
