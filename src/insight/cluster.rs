//! 职业/行业归类
//!
//! 对结果表中已有的自由文本职业和行业，请模型映射到固定分类后写回。

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{InsightError, InsightResult};
use super::predict::decode_answer;
use super::prompts::{cluster_prompt, USER_CLUSTER_SYSTEM_PROMPT};
use super::UserInsights;
use crate::llm::MessageContent;
use crate::model::EnrichmentResult;

#[derive(Debug, Clone, Deserialize)]
pub struct UserCluster {
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub industry: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterReport {
    pub total: usize,
    pub clustered: usize,
    /// 职业和行业都为空，无需归类
    pub skipped: usize,
    pub failed: usize,
}

enum ClusterOutcome {
    Clustered,
    Skipped,
    Failed,
}

impl UserInsights {
    /// 归类全部已有结果并保存；单个用户失败时保留原值
    pub async fn cluster(self: &Arc<Self>) -> ClusterReport {
        let results = self.output.results();
        let mut report = ClusterReport {
            total: results.len(),
            ..Default::default()
        };
        if results.is_empty() {
            info!(event = "cluster.empty");
            return report;
        }

        let concurrency = self.options.max_concurrency.max(1);
        let timeout = self.options.task_timeout;
        info!(event = "cluster.start", total = results.len(), concurrency);

        let outcomes: Vec<ClusterOutcome> = stream::iter(results)
            .map(|result| {
                let insights = Arc::clone(self);
                async move {
                    if result.occupation.is_empty() && result.industry.is_empty() {
                        return ClusterOutcome::Skipped;
                    }
                    let user_id = result.user_id.clone();
                    match tokio::time::timeout(timeout, insights.cluster_one(result)).await {
                        Ok(Ok(updated)) => {
                            info!(
                                event = "cluster.user",
                                user_id = %updated.user_id,
                                occupation = %updated.occupation,
                                industry = %updated.industry
                            );
                            insights.output.upsert(updated);
                            ClusterOutcome::Clustered
                        }
                        Ok(Err(e)) => {
                            warn!(event = "cluster.user_failed", user_id = %user_id, kind = e.kind(), error = %e);
                            ClusterOutcome::Failed
                        }
                        Err(_) => {
                            let err = InsightError::Timeout {
                                user_id: user_id.clone(),
                                secs: timeout.as_secs(),
                            };
                            warn!(event = "cluster.user_failed", user_id = %user_id, kind = err.kind(), error = %err);
                            ClusterOutcome::Failed
                        }
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                ClusterOutcome::Clustered => report.clustered += 1,
                ClusterOutcome::Skipped => report.skipped += 1,
                ClusterOutcome::Failed => report.failed += 1,
            }
        }
        info!(
            event = "cluster.finished",
            total = report.total,
            clustered = report.clustered,
            skipped = report.skipped,
            failed = report.failed
        );

        if let Err(e) = self.save().await {
            warn!(event = "cluster.save_failed", error = %e);
        }
        report
    }

    async fn cluster_one(&self, mut result: EnrichmentResult) -> InsightResult<EnrichmentResult> {
        let messages = [
            MessageContent::system(USER_CLUSTER_SYSTEM_PROMPT),
            MessageContent::human(cluster_prompt(&result.occupation, &result.industry)),
        ];
        let content = self.model.generate_content(&messages).await?;
        let cluster: UserCluster = decode_answer(&content)?;

        result.occupation = cluster.occupation;
        result.industry = cluster.industry;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::tests::MemorySource;
    use crate::insight::InsightOptions;
    use crate::llm::TextGenerator;
    use crate::outputs::csv_snapshot::CsvSnapshot;
    use crate::outputs::ResultStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// 职业里含 "Engineer" 归到技术类，"???" 返回非法JSON
    struct Classifier;

    #[async_trait]
    impl TextGenerator for Classifier {
        async fn generate_content(&self, messages: &[MessageContent]) -> anyhow::Result<String> {
            let prompt = messages[1].text();
            if prompt.contains("???") {
                return Ok("not json".to_string());
            }
            if prompt.contains("Engineer") {
                Ok(r#"{"occupation":"Tech Engineer","industry":"Technology & Software"}"#.to_string())
            } else {
                Ok(r#"{"occupation":"Other","industry":"Other"}"#.to_string())
            }
        }

        fn model_name(&self) -> &str {
            "classifier"
        }
    }

    fn stored(user_id: &str, occupation: &str, industry: &str) -> EnrichmentResult {
        EnrichmentResult {
            user_id: user_id.to_string(),
            occupation: occupation.to_string(),
            industry: industry.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cluster_results() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ResultStore::new(CsvSnapshot::new(dir.path().join("results.csv"))));
        store.upsert(stored("1", "Backend Engineer", "fintech"));
        store.upsert(stored("2", "Barista", "coffee"));
        store.upsert(stored("3", "???", "???"));
        store.upsert(stored("4", "", ""));

        let insights = Arc::new(UserInsights::new(
            Arc::new(MemorySource::default()),
            store.clone(),
            Arc::new(Classifier),
            InsightOptions::default(),
        ));

        let report = insights.cluster().await;
        assert_eq!(
            report,
            ClusterReport {
                total: 4,
                clustered: 2,
                skipped: 1,
                failed: 1
            }
        );
        assert_eq!(store.get("1").unwrap().occupation, "Tech Engineer");
        assert_eq!(store.get("1").unwrap().industry, "Technology & Software");
        assert_eq!(store.get("2").unwrap().industry, "Other");
        assert_eq!(store.get("3").unwrap().occupation, "???");
        assert!(dir.path().join("results.csv").exists());
    }
}
