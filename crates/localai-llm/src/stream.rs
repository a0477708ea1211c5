//! Byte stream -> [`StreamEvent`] adapter.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::decoder::{StreamDecoder, StreamEvent};
use crate::error::Result;

/// Raw response body, one network read per item.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Decoded events. Single pass; ends after [`StreamEvent::End`], after the
/// first error, or when the body closes.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

struct DecodeState {
    source: ByteStream,
    decoder: StreamDecoder,
    pending: VecDeque<StreamEvent>,
    source_closed: bool,
}

/// Decode a body into events. The source is polled at most once per
/// consumer poll, and never again once `[DONE]` has been seen.
pub fn decode_stream(source: ByteStream) -> EventStream {
    let state = DecodeState {
        source,
        decoder: StreamDecoder::new(),
        pending: VecDeque::new(),
        source_closed: false,
    };

    let events = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }

            if state.source_closed || state.decoder.is_finished() {
                return None;
            }

            match state.source.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    state.pending.extend(events);
                }
                Some(Err(err)) => {
                    state.source_closed = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.source_closed = true;
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                }
            }
        }
    });

    Box::pin(events)
}
