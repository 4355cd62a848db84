//! 模型输出的候选值结构
//!
//! 生成模型对每个属性返回一组按优先级排列的候选项，`value` 与 `confidence`
//! 的类型在实际输出中并不稳定（数字、数字字符串、布尔、null 都会出现），
//! 因此统一解析为 [`CandidateValue`] 再按固定规则转换。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 候选项中的动态类型字段
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidateValue {
    #[default]
    Null,
    Boolean(bool),
    Number(serde_json::Number),
    Text(String),
    /// 数组/对象等非标量，按JSON文本渲染
    Other(Value),
}

impl CandidateValue {
    /// 作为置信度解析：数字直接使用，字符串尝试解析为浮点，其余类型无法解析
    pub fn as_confidence(&self) -> Option<f64> {
        match self {
            CandidateValue::Number(number) => number.as_f64(),
            CandidateValue::Text(text) => text.parse::<f64>().ok(),
            CandidateValue::Boolean(_) | CandidateValue::Null | CandidateValue::Other(_) => None,
        }
    }

    /// 渲染为文本：布尔为 "true"/"false"，浮点使用最短表示，null 视为未知（空串）
    pub fn render(&self) -> String {
        match self {
            CandidateValue::Null => String::new(),
            CandidateValue::Boolean(value) => value.to_string(),
            CandidateValue::Number(number) => {
                if let Some(value) = number.as_i64() {
                    value.to_string()
                } else if let Some(value) = number.as_u64() {
                    value.to_string()
                } else {
                    number.as_f64().map(|v| v.to_string()).unwrap_or_default()
                }
            }
            CandidateValue::Text(text) => text.clone(),
            CandidateValue::Other(value) => value.to_string(),
        }
    }
}

impl From<&str> for CandidateValue {
    fn from(value: &str) -> Self {
        CandidateValue::Text(value.to_string())
    }
}

impl From<f64> for CandidateValue {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(CandidateValue::Number)
            .unwrap_or(CandidateValue::Null)
    }
}

impl From<bool> for CandidateValue {
    fn from(value: bool) -> Self {
        CandidateValue::Boolean(value)
    }
}

/// 单个候选项
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub value: CandidateValue,
    #[serde(default)]
    pub confidence: CandidateValue,
    #[serde(default, alias = "justification", deserialize_with = "lenient_string")]
    pub evidence: String,
}

impl Candidate {
    pub fn new(value: impl Into<CandidateValue>, confidence: impl Into<CandidateValue>) -> Self {
        Self {
            value: value.into(),
            confidence: confidence.into(),
            evidence: String::new(),
        }
    }
}

/// 单个属性的候选集合，顺序即优先级
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candidates {
    /// 模型可能给出 `"candidates": null`，按空列表处理
    #[serde(default, deserialize_with = "null_as_empty")]
    pub candidates: Vec<Option<Candidate>>,
}

impl Candidates {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates: candidates.into_iter().map(Some).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudentInfo {
    #[serde(default)]
    pub school: Option<Candidates>,
    #[serde(default, alias = "Major")]
    pub major: Option<Candidates>,
    #[serde(default)]
    pub degree_level: Option<Candidates>,
}

/// 生成模型返回的完整画像预测
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPredictOutput {
    #[serde(default)]
    pub student_info: Option<StudentInfo>,
    #[serde(default)]
    pub is_student: Option<Candidates>,
    #[serde(default)]
    pub occupation: Option<Candidates>,
    #[serde(default)]
    pub industry: Option<Candidates>,
    #[serde(default)]
    pub primary_language: Option<Candidates>,
    #[serde(default)]
    pub gender: Option<Candidates>,
    /// 目前下游未使用
    #[serde(default)]
    pub satisfaction: Option<Candidates>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    })
}
