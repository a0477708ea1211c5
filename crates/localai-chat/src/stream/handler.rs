use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use localai_core::{ToolCall, UsageAccumulator};
use localai_llm::{EventStream, LLMError, StreamEvent};

use crate::error::ChatError;
use crate::tool_calls::ToolCallAccumulator;

/// A stream that reached `[DONE]`.
///
/// `accumulator` is still open: the caller finalizes it once the turn is
/// committed, so a turn that fails afterwards leaves the session total alone.
pub struct StreamHandlingOutput {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub accumulator: UsageAccumulator,
}

pub enum StreamOutcome {
    Completed(StreamHandlingOutput),
    Cancelled,
}

/// Pull events until `[DONE]`, cancellation or failure.
///
/// Each delta is forwarded to `on_chunk` and fed to `accumulator`. Only a
/// `[DONE]` exit hands the accumulator back; every other exit drops it
/// without touching the session total.
pub async fn consume_event_stream(
    mut events: EventStream,
    mut accumulator: UsageAccumulator,
    on_chunk: Option<&(dyn Fn(&str) + Send + Sync)>,
    cancel_token: &CancellationToken,
    request_id: &str,
) -> Result<StreamOutcome, ChatError> {
    let mut content = String::new();
    let mut tool_calls = ToolCallAccumulator::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log::debug!("[{}] Stream cancelled after {} chars", request_id, content.len());
                return Ok(StreamOutcome::Cancelled);
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(StreamEvent::TextDelta(text))) => {
                accumulator.on_delta(&text);
                content.push_str(&text);
                if let Some(sink) = on_chunk {
                    sink(&text);
                }
            }
            Some(Ok(StreamEvent::ToolCall(delta))) => {
                log::debug!("[{}] Received tool call part #{}", request_id, delta.index);
                tool_calls.update(delta);
            }
            Some(Ok(StreamEvent::ServerError(message))) => {
                log::warn!("[{}] Gateway reported error: {}", request_id, message);
                return Err(LLMError::ServerReported(message).into());
            }
            Some(Ok(StreamEvent::End)) => {
                log::debug!("[{}] Stream completed", request_id);
                return Ok(StreamOutcome::Completed(StreamHandlingOutput {
                    content,
                    tool_calls: tool_calls.finalize(),
                    accumulator,
                }));
            }
            Some(Err(error)) => {
                log::warn!("[{}] Stream error: {}", request_id, error);
                return Err(error.into());
            }
            None => {
                log::warn!(
                    "[{}] Stream closed without [DONE] after {} chars",
                    request_id,
                    content.len()
                );
                return Err(ChatError::IncompleteStream { partial: content });
            }
        }
    }
}
