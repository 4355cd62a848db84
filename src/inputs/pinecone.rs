//! 向量库文件摘要检索（Pinecone records search API）

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::SummarySource;
use crate::util::config::PineconeConfig;
use crate::util::http_client::HttpClient;

const API_VERSION: &str = "2025-04";

pub struct PineconeSummarySource {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    top_k: usize,
    dimension: usize,
}

impl PineconeSummarySource {
    pub fn new(config: &PineconeConfig, http_client: &HttpClient) -> Result<Self> {
        let host = config.index_host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(anyhow!("pinecone.index_host 为空"));
        }
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };

        Ok(Self {
            client: http_client.reqwest_client().clone(),
            endpoint: format!(
                "{}/records/namespaces/{}/search",
                host,
                urlencoding::encode(&config.namespace)
            ),
            api_key: config.api_key.clone(),
            top_k: config.top_k,
            dimension: config.dimension,
        })
    }

    /// 只检索该用户的摘要文档；查询向量全零，结果仅由过滤条件决定
    pub fn build_query(&self, user_id_int: i64) -> Value {
        json!({
            "query": {
                "top_k": self.top_k,
                "filter": {
                    "user_id": { "$eq": user_id_int },
                    "is_summary": { "$eq": 1 }
                },
                "vector": { "values": vec![0.0f32; self.dimension] },
                "inputs": { "text": "" }
            },
            "fields": ["text"]
        })
    }
}

#[async_trait]
impl SummarySource for PineconeSummarySource {
    async fn search_user_summary(&self, user_id_int: i64) -> Result<Vec<String>> {
        if user_id_int == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&self.build_query(user_id_int))
            .send()
            .await
            .context("向量检索请求失败")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("向量检索返回错误状态 {}: {}", status, body));
        }

        let body: Value = response.json().await.context("向量检索响应解析失败")?;
        Ok(parse_hits(&body))
    }
}

/// 提取 `result.hits[].fields.text`，缺少文本的命中被忽略
pub fn parse_hits(body: &Value) -> Vec<String> {
    body.pointer("/result/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.pointer("/fields/text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
