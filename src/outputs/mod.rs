//! 富化结果存储
//!
//! [`ResultStore`] 是批处理中唯一的共享可变状态：一张按 user_id 索引的表，
//! 所有读写经过同一把读写锁。生命周期为 构造 → load → 批处理 → save。

pub mod csv_snapshot;
pub mod mixpanel;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::insight::error::InsightResult;
use crate::model::EnrichmentResult;
use csv_snapshot::CsvSnapshot;

/// 批处理结束后接收全部结果的外部写入端
#[async_trait]
pub trait ResultSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn save(&self, results: &[EnrichmentResult]) -> Result<()>;
}

pub struct ResultStore {
    results: RwLock<HashMap<String, EnrichmentResult>>,
    snapshot: CsvSnapshot,
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl ResultStore {
    pub fn new(snapshot: CsvSnapshot) -> Self {
        Self {
            results: RwLock::new(HashMap::new()),
            snapshot,
            sinks: Vec::new(),
        }
    }

    /// 注册外部写入端，`save` 和 `upload` 时调用
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// 从快照恢复，替换当前表内容；快照不存在时表为空
    pub async fn load(&self) -> InsightResult<usize> {
        let loaded = self.snapshot.load().await?;
        let mut table = HashMap::with_capacity(loaded.len());
        for result in loaded {
            table.insert(result.user_id.clone(), result);
        }
        let count = table.len();
        *self.results.write() = table;

        info!(event = "results.loaded", count, path = %self.snapshot.path().display());
        Ok(count)
    }

    pub fn get(&self, user_id: &str) -> Option<EnrichmentResult> {
        self.results.read().get(user_id).cloned()
    }

    /// 按 user_id 插入或整体替换
    pub fn upsert(&self, result: EnrichmentResult) {
        self.results.write().insert(result.user_id.clone(), result);
    }

    /// 全部结果，顺序不固定
    pub fn results(&self) -> Vec<EnrichmentResult> {
        self.results.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.read().is_empty()
    }

    /// 全量覆盖写入快照，然后调用已注册的写入端
    ///
    /// 表为空时不写入，避免覆盖上一次的快照。写入端失败只记录日志。
    pub async fn save(&self) -> InsightResult<usize> {
        let results = self.results();
        if results.is_empty() {
            info!(event = "results.save_skipped", reason = "empty");
            return Ok(0);
        }

        self.snapshot.write(&results).await?;
        self.drive_sinks(&results).await;

        info!(event = "results.saved", count = results.len(), sinks = self.sinks.len());
        Ok(results.len())
    }

    /// 只推送到外部写入端，不改动快照
    pub async fn upload(&self) -> usize {
        let results = self.results();
        self.drive_sinks(&results).await;
        results.len()
    }

    async fn drive_sinks(&self, results: &[EnrichmentResult]) {
        for sink in &self.sinks {
            if let Err(e) = sink.save(results).await {
                error!(event = "results.sink_failed", sink = sink.name(), error = %e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ResultSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn save(&self, results: &[EnrichmentResult]) -> Result<()> {
            self.batches.lock().push(results.len());
            Ok(())
        }
    }

    fn result(user_id: &str, occupation: &str) -> EnrichmentResult {
        EnrichmentResult {
            user_id: user_id.to_string(),
            occupation: occupation.to_string(),
            is_guest_mode: "false".to_string(),
            plan: "free".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_key() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(CsvSnapshot::new(dir.path().join("results.csv")));

        store.upsert(result("1", "Teacher"));
        store.upsert(result("2", "Nurse"));
        store.upsert(result("1", "Principal"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("1").unwrap().occupation, "Principal");
        assert!(store.get("3").is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("results.csv");
        let sink = Arc::new(RecordingSink::default());
        let store = ResultStore::new(CsvSnapshot::new(&path)).with_sink(sink.clone());

        store.upsert(result("1", "Teacher"));
        store.upsert(result("2", "Nurse"));
        assert_eq!(store.save().await.unwrap(), 2);
        assert_eq!(*sink.batches.lock(), vec![2]);

        let reloaded = ResultStore::new(CsvSnapshot::new(&path));
        assert_eq!(reloaded.load().await.unwrap(), 2);
        assert_eq!(reloaded.get("2").unwrap(), result("2", "Nurse"));
    }

    #[tokio::test]
    async fn test_empty_save_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");

        let store = ResultStore::new(CsvSnapshot::new(&path));
        store.upsert(result("1", "Teacher"));
        store.save().await.unwrap();

        let empty = ResultStore::new(CsvSnapshot::new(&path));
        assert_eq!(empty.save().await.unwrap(), 0);

        let reloaded = ResultStore::new(CsvSnapshot::new(&path));
        assert_eq!(reloaded.load().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upload_does_not_touch_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        let sink = Arc::new(RecordingSink::default());
        let store = ResultStore::new(CsvSnapshot::new(&path)).with_sink(sink.clone());
        store.upsert(result("9", "Designer"));

        assert_eq!(store.upload().await, 1);
        assert_eq!(*sink.batches.lock(), vec![1]);
        assert!(!path.exists());
    }
}
