//! localai-llm - streaming transport and decoder for the LocalAI+ gateway
//!
//! The gateway speaks the OpenAI chat-completions dialect over
//! server-sent events. [`decoder::StreamDecoder`] turns raw body bytes into
//! [`StreamEvent`]s; [`ChatTransport`] abstracts the HTTP side so the chat
//! controller can be driven by fakes in tests.

pub mod decoder;
pub mod error;
pub mod openai_compat;
pub mod providers;
pub mod stream;
pub mod transport;

pub use decoder::{StreamDecoder, StreamEvent, ToolCallDelta};
pub use error::{FailureKind, LLMError, Result};
pub use providers::GatewayTransport;
pub use stream::{decode_stream, ByteStream, EventStream};
pub use transport::ChatTransport;
