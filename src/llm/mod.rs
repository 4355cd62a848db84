//! 文本生成后端抽象
//!
//! 消息由有序的角色段组成，每段可包含文本或图片引用。

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;

pub use openai::OpenAiModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    Human,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    ImageUrl(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageContent {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl MessageContent {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    /// 图片在前、文字说明在后的用户消息
    pub fn human_with_image(image_url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            parts: vec![
                ContentPart::ImageUrl(image_url.into()),
                ContentPart::Text(text.into()),
            ],
        }
    }

    /// 消息中的全部文本段拼接
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::ImageUrl(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 文本生成后端
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 提交消息并返回第一条候选回复的文本
    async fn generate_content(&self, messages: &[MessageContent]) -> Result<String>;

    /// 模型名称，用于日志
    fn model_name(&self) -> &str;
}
