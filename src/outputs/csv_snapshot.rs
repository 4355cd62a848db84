//! 结果快照（CSV）
//!
//! 固定表头，列顺序见 [`SNAPSHOT_HEADERS`]。空邮箱写为 `-`，读取时还原为空串。

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::insight::error::InsightResult;
use crate::model::{EnrichmentResult, SNAPSHOT_HEADERS};

const EMPTY_EMAIL: &str = "-";

pub struct CsvSnapshot {
    path: PathBuf,
}

impl CsvSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取快照；文件不存在视为全新开始，无法解析的行跳过
    pub async fn load(&self) -> InsightResult<Vec<EnrichmentResult>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(event = "snapshot.missing", path = %self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes.as_slice());

        let mut results = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(event = "snapshot.bad_row", line = line + 2, error = %e);
                    continue;
                }
            };
            let mut result = EnrichmentResult::from_record(record.iter());
            if result.user_id.is_empty() {
                continue;
            }
            if result.email == EMPTY_EMAIL {
                result.email.clear();
            }
            results.push(result);
        }
        Ok(results)
    }

    /// 全量覆盖写入：先写临时文件再改名，写入中断不会留下半个快照
    pub async fn write(&self, results: &[EnrichmentResult]) -> InsightResult<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(SNAPSHOT_HEADERS).map_err(io::Error::from)?;
        for result in results {
            let mut record = result.to_record();
            if record[1].is_empty() {
                record[1] = EMPTY_EMAIL;
            }
            writer.write_record(record).map_err(io::Error::from)?;
        }
        let buffer = writer
            .into_inner()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp_path = self.path.with_extension("csv.tmp");
        tokio::fs::write(&tmp_path, &buffer).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!(event = "snapshot.written", path = %self.path.display(), count = results.len());
        Ok(())
    }
}
