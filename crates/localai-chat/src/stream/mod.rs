pub mod handler;

pub use handler::{consume_event_stream, StreamHandlingOutput, StreamOutcome};
