//! 用户画像批量富化
//!
//! 从结构化记录库、行为分析导出和向量摘要汇总用户数据，
//! 交给大模型推断职业、行业、语言等属性，按置信度筛选后写入结果快照。

pub mod app;
pub mod build_info;
pub mod inputs;
pub mod insight;
pub mod llm;
pub mod model;
pub mod outputs;
pub mod util;

pub use insight::{BatchReport, RunOutcome, UserInsights};
pub use outputs::ResultStore;
pub use util::config::Config;
