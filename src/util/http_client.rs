//! HTTP客户端模块
//!
//! 模型后端、向量检索和画像上传共用同一个连接池。

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

/// HTTP客户端配置
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// 请求超时时间（秒），需覆盖单次模型调用
    pub timeout_secs: u64,
    /// 连接超时时间（秒）
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    /// TCP keepalive时间（秒）
    pub tcp_keepalive_secs: u64,
    /// 连接池空闲超时（秒）
    pub pool_idle_timeout_secs: u64,
    /// 每个主机的最大空闲连接数，与批处理并发数对齐
    pub pool_max_idle_per_host: usize,
    pub https_proxy: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 90,
            connect_timeout_secs: 15,
            user_agent: format!("user-insight/{}", env!("CARGO_PKG_VERSION")),
            tcp_keepalive_secs: 60,
            pool_idle_timeout_secs: 90,
            pool_max_idle_per_host: 100,
            https_proxy: None,
        }
    }
}

impl HttpClientConfig {
    /// 从环境变量加载代理配置
    pub fn with_env_proxy(mut self) -> Self {
        if let Ok(proxy_url) = std::env::var("HTTPS_PROXY") {
            self.https_proxy = Some(proxy_url);
        }
        self
    }
}

/// HTTP客户端包装器
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Self::build_reqwest_client(&config)?;
        Ok(Self { client, config })
    }

    /// 创建默认HTTP客户端
    pub fn default_client() -> Result<Self> {
        Self::new(HttpClientConfig::default().with_env_proxy())
    }

    fn build_reqwest_client(config: &HttpClientConfig) -> Result<Client> {
        let mut client_builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(&config.user_agent)
            .tcp_keepalive(Duration::from_secs(config.tcp_keepalive_secs))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host);

        if let Some(proxy_url) = &config.https_proxy {
            match reqwest::Proxy::https(proxy_url) {
                Ok(proxy) => {
                    info!(event = "http_client.proxy", proxy = %proxy_url);
                    client_builder = client_builder.proxy(proxy);
                }
                Err(e) => warn!(event = "http_client.proxy_invalid", proxy = %proxy_url, error = %e),
            }
        }

        client_builder.build().context("构建HTTP客户端失败")
    }

    /// 底层reqwest客户端
    pub fn reqwest_client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .finish()
    }
}
