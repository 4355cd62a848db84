//! 用户画像富化驱动
//!
//! 单用户流程：读取已有结果 → 组装用户数据 → 判断是否跳过 → 调用模型 →
//! 按置信度抽取字段 → 写回结果表。所有单用户错误在这里记录并吞掉，不会中断批处理。

pub mod batch;
pub mod cluster;
pub mod error;
pub mod extract;
pub mod predict;
pub mod prompts;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::inputs::UserSource;
use crate::llm::TextGenerator;
use crate::model::{EnrichmentResult, UserAggregate, UserPredictOutput};
use crate::outputs::ResultStore;
use crate::util::config::InsightConfig;
use error::{InsightError, InsightResult};
use extract::extract_high_confidence_value;

pub use batch::BatchReport;

/// 单用户处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 调用模型并写入新结果
    Enriched,
    /// 跳过模型调用，只刷新已有结果的访客标记、邮箱和套餐
    Refreshed,
    /// 跳过且没有已有结果，不写入
    Skipped,
    /// 用户不在结构化记录库中
    NotFound,
    /// 数据获取、模型调用或解析失败
    Failed,
}

/// 批处理与跳过策略参数
#[derive(Debug, Clone)]
pub struct InsightOptions {
    pub max_concurrency: usize,
    pub task_timeout: Duration,
    pub premium_plan: String,
    pub min_task_count: usize,
}

impl Default for InsightOptions {
    fn default() -> Self {
        Self::from(&InsightConfig::default())
    }
}

impl From<&InsightConfig> for InsightOptions {
    fn from(config: &InsightConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            task_timeout: Duration::from_secs(config.task_timeout_secs),
            premium_plan: config.premium_plan.clone(),
            min_task_count: config.min_task_count,
        }
    }
}

pub struct UserInsights {
    input: Arc<dyn UserSource>,
    output: Arc<ResultStore>,
    model: Arc<dyn TextGenerator>,
    options: InsightOptions,
    count: AtomicU32,
}

impl UserInsights {
    pub fn new(
        input: Arc<dyn UserSource>,
        output: Arc<ResultStore>,
        model: Arc<dyn TextGenerator>,
        options: InsightOptions,
    ) -> Self {
        Self {
            input,
            output,
            model,
            options,
            count: AtomicU32::new(0),
        }
    }

    pub fn output(&self) -> &Arc<ResultStore> {
        &self.output
    }

    /// 已处理（找到用户）的数量
    pub fn processed(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// 处理单个用户，结果写入结果表
    pub async fn run(&self, user_id: &str) -> RunOutcome {
        match self.try_run(user_id).await {
            Ok(outcome) => outcome,
            Err(InsightError::NotFound(_)) => {
                debug!(event = "insight.user_not_found", user_id = %user_id);
                RunOutcome::NotFound
            }
            Err(e) => {
                warn!(event = "insight.user_failed", user_id = %user_id, kind = e.kind(), error = %e);
                RunOutcome::Failed
            }
        }
    }

    async fn try_run(&self, user_id: &str) -> InsightResult<RunOutcome> {
        let local = self.output.get(user_id);

        let mut user = self
            .input
            .get(user_id)
            .await?
            .filter(|user| user.user_model.is_some())
            .ok_or_else(|| InsightError::NotFound(user_id.to_string()))?;

        let is_skip = self.is_skip(&user);
        info!(
            event = "insight.user",
            index = self.count.fetch_add(1, Ordering::Relaxed) + 1,
            is_skip,
            user_id = %user.user_id,
            email = %user.email,
            is_guest = user.is_guest_mode,
            task_count = user.tasks.len(),
            plan = %user.plan(),
            last_task_time = %user.last_task_time()
        );

        if is_skip {
            // 访客状态和套餐可能在两次运行之间变化，以最新数据为准
            return Ok(match local {
                Some(mut local) => {
                    local.is_guest_mode = user.guest_mode_flag();
                    local.email = user.email.clone();
                    local.plan = user.plan();
                    self.output.upsert(local);
                    RunOutcome::Refreshed
                }
                None => RunOutcome::Skipped,
            });
        }

        let predict = predict::predict(self.model.as_ref(), &mut user).await?;

        let mut result = format_output(&predict);
        result.user_id = user.user_id.clone();
        result.email = user.email.clone();
        result.is_guest_mode = user.guest_mode_flag();
        result.last_task_time = user.last_task_time();
        result.plan = user.plan();

        self.output.upsert(result);
        Ok(RunOutcome::Enriched)
    }

    /// 跳过判断：无记录库资料的用户总是跳过；高级套餐总是处理；
    /// 其余用户活动记录不足时跳过
    pub fn is_skip(&self, user: &UserAggregate) -> bool {
        if user.user_model.is_none() {
            return true;
        }
        if user.plan() == self.options.premium_plan {
            return false;
        }
        user.tasks.len() < self.options.min_task_count
    }

    /// 写入快照并驱动外部写入端
    pub async fn save(&self) -> InsightResult<usize> {
        info!(event = "insight.save", processed = self.processed(), stored = self.output.len());
        self.output.save().await
    }
}

/// 模型预测 → 结果字段
pub fn format_output(predict: &UserPredictOutput) -> EnrichmentResult {
    let mut result = EnrichmentResult {
        is_student: extract_high_confidence_value(predict.is_student.as_ref()),
        ..Default::default()
    };

    if let Some(student_info) = &predict.student_info {
        result.school = extract_high_confidence_value(student_info.school.as_ref());
        result.major = extract_high_confidence_value(student_info.major.as_ref());
        result.degree_level = extract_high_confidence_value(student_info.degree_level.as_ref());
    }

    result.occupation = extract_high_confidence_value(predict.occupation.as_ref());
    result.industry = extract_high_confidence_value(predict.industry.as_ref());
    result.primary_language = normalize_primary_language(&extract_high_confidence_value(
        predict.primary_language.as_ref(),
    ));
    result.gender = extract_high_confidence_value(predict.gender.as_ref()).to_lowercase();

    result
}

/// 中文语种归并
///
/// 规则按顺序依次应用，后面的规则可以覆盖前面的结果。
pub fn normalize_primary_language(language: &str) -> String {
    let mut normalized = language.to_string();
    if normalized.contains("Cantonese") {
        normalized = "Cantonese".to_string();
    }
    if normalized.contains("Traditional") || normalized.contains("zh-TW") {
        normalized = "Traditional Chinese".to_string();
    }
    if normalized.contains("Mandarin") || normalized == "Chinese" || normalized.contains("zh-CN") {
        normalized = "Simplified Chinese".to_string();
    }
    normalized
}
