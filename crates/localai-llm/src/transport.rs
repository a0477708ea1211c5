use async_trait::async_trait;
use localai_core::ChatRequest;

use crate::error::Result;
use crate::stream::ByteStream;

/// Issues chat-completion requests and hands back the raw streaming body.
///
/// Implementations own retry policy; once a body is returned it is consumed
/// exactly once and never replayed.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open a streaming completion. Non-success statuses are errors.
    async fn open_stream(&self, request: &ChatRequest, api_key: Option<&str>)
        -> Result<ByteStream>;

    /// List model ids served by the gateway.
    async fn list_models(&self, _api_key: Option<&str>) -> Result<Vec<String>> {
        Ok(vec![])
    }
}
