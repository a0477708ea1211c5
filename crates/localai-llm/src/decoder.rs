//! Incremental decoder for `data: <json>` chat-completion streams.
//!
//! Network chunks do not line up with records: one chunk may carry several
//! records, or end halfway through one (or halfway through a UTF-8 character).
//! [`StreamDecoder`] keeps the unterminated tail in `residual` and only decodes
//! complete `\n`-terminated lines.

use bytes::BytesMut;
use serde::Deserialize;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

const LOG_PAYLOAD_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental assistant text. Never empty.
    TextDelta(String),
    /// Fragment of a tool call; fragments sharing an `index` belong together.
    ToolCall(ToolCallDelta),
    /// The gateway aborted generation and said why.
    ServerError(String),
    /// `data: [DONE]` was seen. Always the last event.
    End,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

// --- wire shapes ---

#[derive(Debug, Deserialize)]
struct StreamRecord {
    choices: Option<Vec<RecordChoice>>,
    error: Option<RecordError>,
}

#[derive(Debug, Deserialize)]
struct RecordChoice {
    delta: Option<RecordDelta>,
}

#[derive(Debug, Deserialize)]
struct RecordDelta {
    content: Option<String>,
    tool_calls: Option<Vec<RecordToolCall>>,
}

#[derive(Debug, Deserialize)]
struct RecordToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<RecordFunction>,
}

#[derive(Debug, Deserialize)]
struct RecordFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordError {
    message: Option<String>,
}

#[derive(Debug, Default)]
pub struct StreamDecoder {
    residual: BytesMut,
    /// Leading bytes of `residual` already known to hold no `\n`.
    scanned: usize,
    finished: bool,
    malformed: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` has been decoded. Nothing further should be read.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes of an incomplete record carried to the next read.
    pub fn residual_len(&self) -> usize {
        self.residual.len()
    }

    /// Records skipped because they could not be decoded.
    pub fn malformed_records(&self) -> usize {
        self.malformed
    }

    /// Feed one network chunk and return the events of every record it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.residual.extend_from_slice(chunk);

        while let Some(offset) = self.residual[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            let line = self.residual.split_to(pos + 1);
            self.scanned = 0;
            self.decode_line(&line[..pos], &mut events);

            if self.finished {
                self.residual.clear();
                break;
            }
        }
        self.scanned = self.residual.len();

        events
    }

    /// The transport closed. Decode an unterminated trailing record, if any.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.scanned = 0;
        if self.finished || self.residual.is_empty() {
            self.residual.clear();
            return events;
        }

        let line = self.residual.split();
        self.decode_line(&line, &mut events);
        events
    }

    fn decode_line(&mut self, line: &[u8], events: &mut Vec<StreamEvent>) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(e) => {
                self.malformed += 1;
                log::warn!("Skipping stream record with invalid UTF-8: {}", e);
                return;
            }
        };

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };

        if payload.trim() == DONE_SENTINEL {
            self.finished = true;
            events.push(StreamEvent::End);
            return;
        }

        let record: StreamRecord = match serde_json::from_str(payload) {
            Ok(record) => record,
            Err(e) => {
                self.skip_malformed(payload, &e.to_string());
                return;
            }
        };

        if let Some(error) = record.error {
            let message = error
                .message
                .unwrap_or_else(|| "unknown server error".to_string());
            events.push(StreamEvent::ServerError(message));
            return;
        }

        let Some(choices) = record.choices else {
            self.skip_malformed(payload, "missing `choices`");
            return;
        };

        let Some(delta) = choices.into_iter().next().and_then(|c| c.delta) else {
            return;
        };

        if let Some(content) = delta.content {
            if !content.is_empty() {
                events.push(StreamEvent::TextDelta(content));
            }
        }

        for call in delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = match call.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            events.push(StreamEvent::ToolCall(ToolCallDelta {
                index: call.index,
                id: call.id,
                name,
                arguments,
            }));
        }
    }

    fn skip_malformed(&mut self, payload: &str, reason: &str) {
        self.malformed += 1;
        let preview: String = payload.chars().take(LOG_PAYLOAD_CHARS).collect();
        log::warn!("Skipping malformed stream record ({}): {}", reason, preview);
    }
}
