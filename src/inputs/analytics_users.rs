//! 分析平台用户导出（CSV）
//!
//! 列顺序：`user_id,name,email,last_seen,country_code,region,city,is_education,plan`

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::model::user::UNDEFINED_PLACEHOLDER;
use crate::model::AnalyticsUser;

/// 加载分析平台用户，按 user_id 索引
///
/// 文件不存在时返回空表（所有用户都会被视为访客）。
pub fn load_analytics_users(path: impl AsRef<Path>) -> Result<HashMap<String, AnalyticsUser>> {
    let path = path.as_ref();
    if !path.exists() {
        warn!(event = "analytics_users.missing", path = %path.display());
        return Ok(HashMap::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("打开分析平台用户文件失败: {}", path.display()))?;

    let mut users = HashMap::new();
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(event = "analytics_users.bad_row", line = line + 2, error = %e);
                continue;
            }
        };

        let field = |index: usize| record.get(index).unwrap_or("").to_string();
        let user = AnalyticsUser {
            user_id: field(0),
            name: field(1),
            email: field(2),
            last_seen: field(3),
            country_code: field(4),
            region: field(5),
            city: field(6),
            is_education: field(7),
            plan: field(8),
        };
        if user.email == UNDEFINED_PLACEHOLDER {
            continue;
        }

        users.insert(user.user_id.clone(), user);
    }

    info!(event = "analytics_users.loaded", count = users.len(), path = %path.display());
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_analytics_users() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.csv");
        std::fs::write(
            &path,
            "user_id,name,email,last_seen,country_code,region,city,is_education,plan\n\
             1,Ada,ada@example.com,2025-03-01,GB,England,London,true,pro\n\
             2,Ghost,undefined,2025-03-01,US,,,false,free\n\
             3,\"Lin, Wei\",lin@example.com,2025-02-11,TW,Taipei,Taipei,false,undefined\n\
             4,Short,short@example.com\n",
        )
        .unwrap();

        let users = load_analytics_users(&path).unwrap();
        assert_eq!(users.len(), 3);
        assert!(!users.contains_key("2"));
        assert_eq!(users["1"].plan, "pro");
        assert_eq!(users["3"].name, "Lin, Wei");
        assert_eq!(users["3"].plan, "undefined");
        assert_eq!(users["4"].plan, "");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let users = load_analytics_users(dir.path().join("absent.csv")).unwrap();
        assert!(users.is_empty());
    }
}
