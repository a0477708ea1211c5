use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use localai_core::ChatRequest;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::error::{LLMError, Result};
use crate::openai_compat::{build_chat_body, ModelsResponse};
use crate::stream::ByteStream;
use crate::transport::ChatTransport;

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const MODELS_PATH: &str = "/v1/models";

/// HTTP transport for the LocalAI+ gateway.
///
/// Transient failures (connect errors, 5xx, 408, 429) are retried before the
/// body is handed out. The first retry waits one second.
pub struct GatewayTransport {
    client: ClientWithMiddleware,
    base_url: String,
    max_retries: u32,
}

impl GatewayTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_max_retries(base_url, localai_core::config::DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(base_url: impl Into<String>, max_retries: u32) -> Self {
        Self {
            client: build_retry_client(Client::new(), max_retries),
            base_url: normalize_base_url(&base_url.into()),
            max_retries,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn authorize(builder: RequestBuilder, api_key: Option<&str>) -> RequestBuilder {
        match api_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }
}

fn build_retry_client(client: Client, max_retries: u32) -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_secs(1), Duration::from_secs(4))
        .build_with_max_retries(max_retries);

    ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

/// Trim trailing slashes and a trailing `/v1`; endpoint paths carry it.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/v1")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

#[async_trait]
impl ChatTransport for GatewayTransport {
    async fn open_stream(
        &self,
        request: &ChatRequest,
        api_key: Option<&str>,
    ) -> Result<ByteStream> {
        let url = format!("{}{}", self.base_url, CHAT_COMPLETIONS_PATH);
        let body = build_chat_body(request);

        log::debug!(
            "POST {} model={} messages={}",
            url,
            request.model,
            request.messages.len()
        );

        let builder = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&body);
        let response = Self::authorize(builder, api_key).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log::warn!("Gateway returned HTTP {} for {}", status, url);
            return Err(LLMError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| LLMError::Stream(e.to_string())));

        Ok(Box::pin(stream))
    }

    async fn list_models(&self, api_key: Option<&str>) -> Result<Vec<String>> {
        let url = format!("{}{}", self.base_url, MODELS_PATH);
        log::debug!("GET {}", url);

        let response = Self::authorize(self.client.get(&url), api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let text = response.text().await?;
        let models: ModelsResponse = serde_json::from_str(&text)?;
        Ok(models.into_ids())
    }
}
