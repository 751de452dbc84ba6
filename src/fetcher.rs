//! 资源获取
//!
//! 支持 `http(s)://`、`file://` 以及本地路径。

use crate::config::AppConfig;
use crate::error::{AggregatorError, Result};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;

/// 单次获取失败
#[derive(Debug, Clone, PartialEq)]
pub struct FetchError {
    pub reason: String,
    /// 网络错误、5xx 可以重试；4xx、本地文件错误不重试
    pub retryable: bool,
}

impl FetchError {
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), retryable: false }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), retryable: true }
    }
}

/// 资源获取 trait
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        locator: &str,
    ) -> impl Future<Output = std::result::Result<Vec<u8>, FetchError>> + Send;
}

pub struct ResourceFetcher {
    client: Client,
    retry_count: u32,
    backoff: Duration,
}

/// 单次 HTTP 请求的超时
///
/// 资源预算按尝试次数平分，这样一次卡住的请求超时后仍有机会重试。
pub(crate) fn request_timeout(config: &AppConfig) -> Duration {
    let budget = Duration::from_secs(config.resource_timeout_secs.max(1));
    let attempts = config.retry_count.saturating_add(1);
    (budget / attempts).max(Duration::from_secs(1))
}

impl ResourceFetcher {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout(config))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AggregatorError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            retry_count: config.retry_count,
            backoff: Duration::from_millis(500),
        })
    }

    async fn fetch_http(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let mut retries = 0;

        loop {
            let err = match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => {
                    match response.bytes().await {
                        Ok(bytes) => return Ok(bytes.to_vec()),
                        Err(e) => FetchError::transient(format!("读取响应失败: {}", e)),
                    }
                }
                // 4xx 不重试
                Ok(response) if response.status().is_client_error() => {
                    return Err(FetchError::permanent(format!("HTTP {}", response.status())));
                }
                Ok(response) => FetchError::transient(format!("HTTP {}", response.status())),
                Err(e) => FetchError::transient(format!("请求失败: {}", e)),
            };

            if retries >= self.retry_count {
                return Err(err);
            }
            retries += 1;
            log::warn!("[fetch] {} 第 {} 次重试: {}", url, retries, err.reason);

            // 指数退避
            let delay = self.backoff * 2u32.pow(retries.min(4));
            tokio::time::sleep(delay).await;
        }
    }

    async fn fetch_file(&self, path: &str) -> std::result::Result<Vec<u8>, FetchError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| FetchError::permanent(format!("读取文件失败 {}: {}", path, e)))
    }
}

impl Fetcher for ResourceFetcher {
    async fn fetch(&self, locator: &str) -> std::result::Result<Vec<u8>, FetchError> {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            self.fetch_http(locator).await
        } else {
            let path = locator.strip_prefix("file://").unwrap_or(locator);
            self.fetch_file(path).await
        }
    }
}
