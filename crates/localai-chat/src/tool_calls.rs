use std::collections::BTreeMap;

use localai_core::{FunctionCall, ToolCall};
use localai_llm::ToolCallDelta;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Merges streamed tool-call fragments by their `index`.
#[derive(Debug, Default, Clone)]
pub struct ToolCallAccumulator {
    parts: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, delta: ToolCallDelta) {
        let part = self.parts.entry(delta.index).or_default();

        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            part.id = id;
        }
        if let Some(name) = delta.name.filter(|name| !name.is_empty()) {
            part.name = name;
        }
        if let Some(arguments) = delta.arguments {
            part.arguments.push_str(&arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Completed calls in index order, exactly as the backend sent them.
    /// A call missing its id or name is kept and logged.
    pub fn finalize(self) -> Vec<ToolCall> {
        self.parts
            .into_iter()
            .map(|(index, part)| {
                if part.id.is_empty() || part.name.is_empty() {
                    log::warn!(
                        "Tool call #{} is incomplete (id {:?}, name {:?})",
                        index,
                        part.id,
                        part.name
                    );
                }
                ToolCall {
                    id: part.id,
                    tool_type: "function".to_string(),
                    function: FunctionCall {
                        name: part.name,
                        arguments: part.arguments,
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: args.map(str::to_string),
        }
    }

    #[test]
    fn merges_argument_fragments_by_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.update(delta(0, Some("call_1"), Some("search"), Some("{\"q\":")));
        acc.update(delta(1, Some("call_2"), Some("fetch"), Some("{}")));
        acc.update(delta(0, None, None, Some("\"rust\"}")));

        let calls = acc.finalize();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.name, "search");
        assert_eq!(calls[0].function.arguments, r#"{"q":"rust"}"#);
        assert_eq!(calls[1].function.name, "fetch");
        assert_eq!(calls[1].tool_type, "function");
    }

    #[test]
    fn unnamed_call_is_kept_verbatim() {
        let mut acc = ToolCallAccumulator::new();
        acc.update(delta(0, Some("call_x"), None, Some("{}")));
        assert!(!acc.is_empty());

        let calls = acc.finalize();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_x");
        assert_eq!(calls[0].function.name, "");
        assert_eq!(calls[0].function.arguments, "{}");
    }

    #[test]
    fn missing_id_stays_empty() {
        let mut acc = ToolCallAccumulator::new();
        acc.update(delta(0, None, Some("lookup"), None));

        let calls = acc.finalize();
        assert_eq!(calls[0].id, "");
        assert_eq!(calls[0].function.name, "lookup");
        assert_eq!(calls[0].function.arguments, "");
    }

    #[test]
    fn partial_calls_at_separate_indexes_are_both_kept() {
        let mut acc = ToolCallAccumulator::new();
        acc.update(delta(0, None, Some("lookup"), None));
        acc.update(delta(1, Some("call_x"), None, Some(r#"{"a":1}"#)));

        let calls = acc.finalize();
        assert_eq!(calls.len(), 2);
        assert_eq!((calls[0].id.as_str(), calls[0].function.name.as_str()), ("", "lookup"));
        assert_eq!((calls[1].id.as_str(), calls[1].function.name.as_str()), ("call_x", ""));
        assert_eq!(calls[1].function.arguments, r#"{"a":1}"#);
    }
}
