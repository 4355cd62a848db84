//! 画像平台上传（Mixpanel engage / profile-set）
//!
//! 按 user_id 覆盖写入预测属性，重复上传结果相同；单个用户失败记录日志后继续。

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

use super::ResultSink;
use crate::model::EnrichmentResult;
use crate::util::config::MixpanelConfig;
use crate::util::http_client::HttpClient;

const UNKNOWN: &str = "unknown";
/// 历史快照中表示空值的写法
const LEGACY_NIL: &str = "<nil>";
const UPLOAD_CONCURRENCY: usize = 8;

pub struct MixpanelUploader {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    service_account: Option<(String, String)>,
}

impl MixpanelUploader {
    pub fn new(config: &MixpanelConfig, http_client: &HttpClient) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(anyhow!("mixpanel.token 为空"));
        }
        let service_account = match (&config.service_account, &config.service_secret) {
            (Some(account), Some(secret)) => Some((account.clone(), secret.clone())),
            _ => None,
        };
        Ok(Self {
            client: http_client.reqwest_client().clone(),
            endpoint: format!("{}/engage?verbose=1", config.api_host.trim_end_matches('/')),
            token: config.token.clone(),
            service_account,
        })
    }

    /// profile-set 请求体
    pub fn build_payload(&self, result: &EnrichmentResult) -> Value {
        json!([{
            "$token": self.token,
            "$distinct_id": result.user_id,
            "$set": profile_properties(result),
        }])
    }

    async fn people_set(&self, result: &EnrichmentResult) -> Result<()> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Accept", "text/plain")
            .json(&self.build_payload(result));
        if let Some((account, secret)) = &self.service_account {
            request = request.basic_auth(account, Some(secret));
        }

        let response = request.send().await.context("画像上传请求失败")?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!("画像上传返回错误状态 {}: {}", status, body));
        }

        // verbose 模式返回 {"status":1,"error":null}
        match serde_json::from_str::<Value>(&body) {
            Ok(reply) if reply["status"] == 1 => Ok(()),
            Ok(reply) => Err(anyhow!("画像上传被拒绝: {}", reply["error"])),
            Err(_) if body.trim() == "1" => Ok(()),
            Err(_) => Err(anyhow!("画像上传响应无法识别: {}", body)),
        }
    }
}

#[async_trait]
impl ResultSink for MixpanelUploader {
    fn name(&self) -> &'static str {
        "mixpanel"
    }

    async fn save(&self, results: &[EnrichmentResult]) -> Result<()> {
        let uploads: Vec<_> = results
            .iter()
            .enumerate()
            .map(|(index, result)| async move {
                match self.people_set(result).await {
                    Ok(()) => {
                        debug!(
                            event = "mixpanel.profile_set",
                            index,
                            user_id = %result.user_id,
                            is_student = %result.is_student
                        );
                        true
                    }
                    Err(e) => {
                        error!(event = "mixpanel.profile_set_failed", user_id = %result.user_id, error = %e);
                        false
                    }
                }
            })
            .collect();
        let outcomes: Vec<bool> = stream::iter(uploads)
            .buffer_unordered(UPLOAD_CONCURRENCY)
            .collect()
            .await;

        let uploaded = outcomes.iter().filter(|ok| **ok).count();
        info!(
            event = "mixpanel.upload_finished",
            total = results.len(),
            uploaded,
            failed = results.len() - uploaded
        );
        Ok(())
    }
}

/// 上传的预测属性：统一小写，空值写为 "unknown"
pub fn profile_properties(result: &EnrichmentResult) -> Map<String, Value> {
    let fields = [
        ("predict_school", &result.school),
        ("predict_major", &result.major),
        ("predict_degree_level", &result.degree_level),
        ("predict_occupation", &result.occupation),
        ("predict_industry", &result.industry),
        ("predict_primary_language", &result.primary_language),
        ("predict_gender", &result.gender),
    ];
    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::String(property_value(value))))
        .collect()
}

fn property_value(value: &str) -> String {
    if value.is_empty() || value == LEGACY_NIL {
        UNKNOWN.to_string()
    } else {
        value.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_properties() {
        let result = EnrichmentResult {
            user_id: "31".to_string(),
            school: "MIT".to_string(),
            major: "<nil>".to_string(),
            occupation: "Data Analyst".to_string(),
            primary_language: "Simplified Chinese".to_string(),
            gender: "female".to_string(),
            ..Default::default()
        };
        let props = profile_properties(&result);
        assert_eq!(props.len(), 7);
        assert_eq!(props["predict_school"], "mit");
        assert_eq!(props["predict_major"], "unknown");
        assert_eq!(props["predict_degree_level"], "unknown");
        assert_eq!(props["predict_occupation"], "data analyst");
        assert_eq!(props["predict_industry"], "unknown");
        assert_eq!(props["predict_primary_language"], "simplified chinese");
        assert_eq!(props["predict_gender"], "female");
    }

    #[test]
    fn test_payload_shape() {
        let config = MixpanelConfig {
            enabled: true,
            token: "tok".to_string(),
            ..MixpanelConfig::default()
        };
        let uploader = MixpanelUploader::new(&config, &HttpClient::default_client().unwrap()).unwrap();
        assert_eq!(uploader.endpoint, "https://api.mixpanel.com/engage?verbose=1");

        let payload = uploader.build_payload(&EnrichmentResult {
            user_id: "31".to_string(),
            ..Default::default()
        });
        assert_eq!(payload[0]["$token"], "tok");
        assert_eq!(payload[0]["$distinct_id"], "31");
        assert_eq!(payload[0]["$set"]["predict_gender"], "unknown");
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let config = MixpanelConfig::default();
        assert!(MixpanelUploader::new(&config, &HttpClient::default_client().unwrap()).is_err());
    }
}
