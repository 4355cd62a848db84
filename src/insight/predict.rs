//! 模型调用：头像描述 + 画像预测

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::{InsightError, InsightResult};
use super::prompts::{gen_prompt_for_user, USER_AVATAR_PROMPT, USER_INSIGHT_SYSTEM_PROMPT};
use crate::llm::{MessageContent, TextGenerator};
use crate::model::{UserAggregate, UserPredictOutput};

/// 头像图片转文字描述，失败时调用方以空描述继续
pub async fn image_to_text(
    model: &dyn TextGenerator,
    prompt: &str,
    image_url: &str,
) -> InsightResult<String> {
    if image_url.is_empty() {
        return Err(InsightError::PartialData {
            step: "avatar_caption",
            reason: "image_url empty".to_string(),
        });
    }

    model
        .generate_content(&[MessageContent::human_with_image(image_url, prompt)])
        .await
        .map_err(|e| InsightError::PartialData {
            step: "avatar_caption",
            reason: format!("{e:#}"),
        })
}

/// 对单个用户发起画像预测
///
/// 有头像时先填充 `avatar_info`，再用系统指令 + 用户描述请求模型并解析JSON。
pub async fn predict(
    model: &dyn TextGenerator,
    user: &mut UserAggregate,
) -> InsightResult<UserPredictOutput> {
    let image_url = user
        .user_model
        .as_ref()
        .map(|m| m.image_url.clone())
        .unwrap_or_default();
    if !image_url.is_empty() {
        match image_to_text(model, USER_AVATAR_PROMPT, &image_url).await {
            Ok(caption) => user.avatar_info = caption,
            Err(e) => warn!(event = "insight.avatar_caption_failed", user_id = %user.user_id, error = %e),
        }
    }

    let prompt = gen_prompt_for_user(user);
    let messages = [
        MessageContent::system(USER_INSIGHT_SYSTEM_PROMPT),
        MessageContent::human(prompt),
    ];
    let content = model.generate_content(&messages).await?;
    debug!(event = "insight.predict_reply", user_id = %user.user_id, model = model.model_name(), len = content.len());

    decode_answer(&content)
}

/// 解析模型回复，兼容 ```json 代码块包裹的输出
pub fn decode_answer<T: DeserializeOwned>(content: &str) -> InsightResult<T> {
    serde_json::from_str(strip_code_fence(content)).map_err(|source| InsightError::Decode {
        content: content.to_string(),
        source,
    })
}

pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 去掉语言标记所在的首行
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::model::UserModel;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// 记录请求，头像请求返回固定描述或错误
    struct ScriptedModel {
        caption: Option<&'static str>,
        answer: &'static str,
        calls: Mutex<Vec<Vec<MessageContent>>>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedModel {
        async fn generate_content(&self, messages: &[MessageContent]) -> Result<String> {
            self.calls.lock().push(messages.to_vec());
            if messages.iter().any(|m| m.role == Role::System) {
                Ok(self.answer.to_string())
            } else {
                self.caption
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("vision model unavailable"))
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn user_with_avatar(url: &str) -> UserAggregate {
        UserAggregate {
            user_id: "5".to_string(),
            user_model: Some(UserModel {
                image_url: url.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[]\n```\n"), "[]");
    }

    #[tokio::test]
    async fn test_predict_with_caption() {
        let model = ScriptedModel {
            caption: Some("a person wearing a graduation gown"),
            answer: r#"```json
{"occupation":{"candidates":[{"value":"Student","confidence":"0.8"}]}}
```"#,
            calls: Mutex::new(Vec::new()),
        };
        let mut user = user_with_avatar("https://cdn.example.com/a.png");

        let output = predict(&model, &mut user).await.unwrap();
        assert!(output.occupation.is_some());
        assert_eq!(user.avatar_info, "a person wearing a graduation gown");

        let calls = model.calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls[1][1].text().contains("a person wearing a graduation gown"));
    }

    #[tokio::test]
    async fn test_caption_failure_is_not_fatal() {
        let model = ScriptedModel {
            caption: None,
            answer: "{}",
            calls: Mutex::new(Vec::new()),
        };
        let mut user = user_with_avatar("https://cdn.example.com/a.png");
        assert!(predict(&model, &mut user).await.is_ok());
        assert_eq!(user.avatar_info, "");
    }

    #[tokio::test]
    async fn test_no_avatar_skips_caption_call() {
        let model = ScriptedModel {
            caption: Some("unused"),
            answer: "{}",
            calls: Mutex::new(Vec::new()),
        };
        let mut user = user_with_avatar("");
        predict(&model, &mut user).await.unwrap();
        assert_eq!(model.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_answer() {
        let model = ScriptedModel {
            caption: None,
            answer: "I think this user is a teacher.",
            calls: Mutex::new(Vec::new()),
        };
        let mut user = user_with_avatar("");
        let err = predict(&model, &mut user).await.unwrap_err();
        assert_eq!(err.kind(), "decode");
    }
}
