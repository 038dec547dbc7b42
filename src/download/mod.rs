pub mod assemble;
pub mod batch;
pub mod descriptor;
pub mod episode;
pub mod layout;
pub mod plan;
pub mod segment;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use url::Url;

use crate::error::TransportError;

/// Substitution point for the 1-based segment index in templates.
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// Something that can fetch the body behind a URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Bytes, TransportError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Outcome of a single request attempt.
#[derive(Debug)]
pub enum Attempt {
    NotFound,
    Failed(String),
}

/// Runs `attempt` until it succeeds, reports not-found, or the policy's
/// attempt budget is spent. Sleeps `policy.delay` between attempts.
pub async fn with_retry<F, Fut>(
    policy: &RetryPolicy,
    url: &Url,
    mut attempt: F,
) -> Result<Bytes, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Bytes, Attempt>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut number = 1;

    loop {
        match attempt().await {
            Ok(bytes) => return Ok(bytes),
            Err(Attempt::NotFound) => {
                return Err(TransportError::NotFound { url: url.clone() });
            }
            Err(Attempt::Failed(reason)) if number >= max_attempts => {
                return Err(TransportError::Transient {
                    url: url.clone(),
                    attempts: number,
                    reason,
                });
            }
            Err(Attempt::Failed(reason)) => {
                tracing::warn!(%url, attempt = number, "Request failed, retrying: {}", reason);
                tokio::time::sleep(policy.delay).await;
                number += 1;
            }
        }
    }
}

pub struct DownloadClient {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl DownloadClient {
    pub fn new(
        user_agent: &str,
        policy: RetryPolicy,
        timeout: Option<Duration>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.connect_timeout(timeout).timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self { client, policy })
    }

    async fn attempt(&self, url: &Url) -> Result<Bytes, Attempt> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|err| Attempt::Failed(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Attempt::NotFound);
        }
        if !status.is_success() {
            return Err(Attempt::Failed(format!("HTTP {}", status)));
        }

        response
            .bytes()
            .await
            .map_err(|err| Attempt::Failed(format!("Error reading response: {}", err)))
    }
}

#[async_trait]
impl Fetch for DownloadClient {
    async fn fetch(&self, url: &Url) -> Result<Bytes, TransportError> {
        tracing::debug!(%url, "GET");
        with_retry(&self.policy, url, || self.attempt(url)).await
    }
}
