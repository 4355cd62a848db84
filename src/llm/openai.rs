//! OpenAI 兼容的 chat completions 客户端

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ContentPart, MessageContent, TextGenerator};
use crate::util::config::LlmConfig;
use crate::util::http_client::HttpClient;

pub struct OpenAiModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    json_response: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiModel {
    pub fn new(config: &LlmConfig, http_client: &HttpClient) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(anyhow!("缺少 LLM API Key，请设置 llm.api_key 或 OPENAI_API_KEY"));
        }
        Ok(Self {
            client: http_client.reqwest_client().clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            json_response: config.json_response,
        })
    }

    /// 将角色段转换为 chat completions 的消息格式
    ///
    /// 纯文本消息使用字符串 content，包含图片时使用多段 content。
    pub fn encode_message(message: &MessageContent) -> Value {
        let has_image = message
            .parts
            .iter()
            .any(|part| matches!(part, ContentPart::ImageUrl(_)));

        if !has_image {
            return json!({ "role": message.role.as_str(), "content": message.text() });
        }

        let parts: Vec<Value> = message
            .parts
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => json!({ "type": "text", "text": text }),
                ContentPart::ImageUrl(url) => {
                    json!({ "type": "image_url", "image_url": { "url": url } })
                }
            })
            .collect();
        json!({ "role": message.role.as_str(), "content": parts })
    }

    fn build_request<'a>(&'a self, messages: &[MessageContent]) -> ChatRequest<'a> {
        // 仅在包含 system 指令时要求 JSON 输出，图片描述等自由文本请求不加约束
        let wants_json = self.json_response
            && messages
                .iter()
                .any(|m| m.role == super::Role::System);
        ChatRequest {
            model: &self.model,
            messages: messages.iter().map(Self::encode_message).collect(),
            response_format: wants_json.then(|| json!({ "type": "json_object" })),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiModel {
    async fn generate_content(&self, messages: &[MessageContent]) -> Result<String> {
        let request = self.build_request(messages);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("LLM请求发送失败")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM返回错误状态 {}: {}", status, truncate(&body, 512)));
        }

        let reply: ChatResponse = response.json().await.context("LLM响应解析失败")?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("LLM响应中没有可用的候选回复"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_text_message() {
        let encoded = OpenAiModel::encode_message(&MessageContent::system("be precise"));
        assert_eq!(encoded["role"], "system");
        assert_eq!(encoded["content"], "be precise");
    }

    #[test]
    fn test_encode_image_message() {
        let encoded = OpenAiModel::encode_message(&MessageContent::human_with_image(
            "https://cdn.example.com/a.png",
            "describe it",
        ));
        assert_eq!(encoded["role"], "user");
        assert_eq!(encoded["content"][0]["type"], "image_url");
        assert_eq!(
            encoded["content"][0]["image_url"]["url"],
            "https://cdn.example.com/a.png"
        );
        assert_eq!(encoded["content"][1]["text"], "describe it");
    }

    #[test]
    fn test_json_mode_only_with_system_prompt() {
        let config = LlmConfig {
            api_key: "sk-test".to_string(),
            json_response: true,
            ..LlmConfig::default()
        };
        let model = OpenAiModel::new(&config, &HttpClient::default_client().unwrap()).unwrap();

        let request = model.build_request(&[MessageContent::system("s"), MessageContent::human("u")]);
        assert!(request.response_format.is_some());

        let request = model.build_request(&[MessageContent::human_with_image("u", "t")]);
        assert!(request.response_format.is_none());
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let config = LlmConfig::default();
        assert!(OpenAiModel::new(&config, &HttpClient::default_client().unwrap()).is_err());
    }
}
