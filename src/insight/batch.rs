//! 批量调度
//!
//! 固定数量的 worker 从同一个队列取用户ID，每个用户独立限时；
//! 全部 worker 退出后写入一次快照。

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use super::error::InsightError;
use super::{RunOutcome, UserInsights};
use crate::inputs::user_ids::load_user_ids;

/// 批处理统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub enriched: usize,
    pub refreshed: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub panicked: usize,
}

impl BatchReport {
    pub fn record(&mut self, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Enriched => self.enriched += 1,
            RunOutcome::Refreshed => self.refreshed += 1,
            RunOutcome::Skipped => self.skipped += 1,
            RunOutcome::NotFound => self.not_found += 1,
            RunOutcome::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &BatchReport) {
        self.enriched += other.enriched;
        self.refreshed += other.refreshed;
        self.skipped += other.skipped;
        self.not_found += other.not_found;
        self.failed += other.failed;
        self.timed_out += other.timed_out;
        self.panicked += other.panicked;
    }

    /// 已有结论（含超时和异常）的用户数
    pub fn finished(&self) -> usize {
        self.enriched
            + self.refreshed
            + self.skipped
            + self.not_found
            + self.failed
            + self.timed_out
            + self.panicked
    }
}

impl UserInsights {
    /// 并发处理一批用户，全部结束后保存
    pub async fn run_batch(self: &Arc<Self>, user_ids: Vec<String>) -> BatchReport {
        let mut report = BatchReport {
            total: user_ids.len(),
            ..Default::default()
        };
        if user_ids.is_empty() {
            info!(event = "batch.empty");
            return report;
        }

        let workers = self.options.max_concurrency.max(1).min(user_ids.len());
        info!(
            event = "batch.start",
            total = user_ids.len(),
            workers,
            timeout_secs = self.options.task_timeout.as_secs()
        );
        let started = Instant::now();

        // 队列一次性装满后关闭发送端，worker 取空即退出
        let (sender, receiver) = mpsc::channel::<String>(user_ids.len());
        for user_id in user_ids {
            if sender.try_send(user_id).is_err() {
                error!(event = "batch.enqueue_failed");
            }
        }
        drop(sender);
        let receiver = Arc::new(Mutex::new(receiver));

        let handles: Vec<_> = (0..workers)
            .map(|worker_id| {
                let insights = Arc::clone(self);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move { insights.worker_loop(worker_id, receiver).await })
            })
            .collect();

        for handle in handles {
            match handle.await {
                Ok(worker_report) => report.merge(&worker_report),
                Err(e) => error!(event = "batch.worker_crashed", error = %e),
            }
        }

        info!(
            event = "batch.finished",
            total = report.total,
            enriched = report.enriched,
            refreshed = report.refreshed,
            skipped = report.skipped,
            not_found = report.not_found,
            failed = report.failed,
            timed_out = report.timed_out,
            panicked = report.panicked,
            elapsed_ms = started.elapsed().as_millis() as u64
        );

        if let Err(e) = self.save().await {
            error!(event = "batch.save_failed", error = %e);
        }

        report
    }

    async fn worker_loop(
        self: Arc<Self>,
        worker_id: usize,
        receiver: Arc<Mutex<mpsc::Receiver<String>>>,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let timeout = self.options.task_timeout;

        loop {
            let next = receiver.lock().await.recv().await;
            let Some(user_id) = next else {
                break;
            };

            // 单独的任务承载每个用户：超时取消只影响该用户，panic 不会带走 worker
            let insights = Arc::clone(&self);
            let job_user_id = user_id.clone();
            let job = tokio::spawn(async move {
                tokio::time::timeout(timeout, insights.run(&job_user_id)).await
            });

            match job.await {
                Ok(Ok(outcome)) => report.record(outcome),
                Ok(Err(_elapsed)) => {
                    let err = InsightError::Timeout {
                        user_id: user_id.clone(),
                        secs: timeout.as_secs(),
                    };
                    warn!(event = "batch.user_timeout", worker_id, user_id = %user_id, error = %err);
                    report.timed_out += 1;
                }
                Err(e) => {
                    error!(event = "batch.user_panicked", worker_id, user_id = %user_id, error = %e);
                    report.panicked += 1;
                }
            }
        }

        report
    }

    /// 从待处理列表文件读取全部用户并执行
    pub async fn run_all(self: &Arc<Self>, user_ids_path: &Path) -> anyhow::Result<BatchReport> {
        let user_ids = load_user_ids(user_ids_path)?;
        Ok(self.run_batch(user_ids).await)
    }
}
