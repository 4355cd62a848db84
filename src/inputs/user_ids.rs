//! 待处理用户ID列表（CSV第一列，首行为表头）

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// 读取用户ID，去掉空值和重复值，保持文件中的先后顺序
pub fn load_user_ids(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("打开用户列表失败: {}", path.display()))?;

    let mut seen = HashSet::new();
    let mut user_ids = Vec::new();
    let mut duplicates = 0usize;
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(event = "user_ids.bad_row", error = %e);
                continue;
            }
        };
        let Some(user_id) = record.get(0).map(str::trim).filter(|id| !id.is_empty()) else {
            continue;
        };
        if seen.insert(user_id.to_string()) {
            user_ids.push(user_id.to_string());
        } else {
            duplicates += 1;
        }
    }

    info!(
        event = "user_ids.loaded",
        path = %path.display(),
        count = user_ids.len(),
        duplicates
    );
    Ok(user_ids)
}
