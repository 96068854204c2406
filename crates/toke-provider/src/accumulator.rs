//! Rebuilds a complete response from streamed deltas.
//!
//! [`StreamAccumulator`] turns chunks into [`ProviderEvent`]s and keeps the
//! joined content, one [`ToolCallAccumulator`] per call, the latest usage
//! and the latest finish reason until the stream ends.

use std::collections::HashMap;

use crate::types::{FinishReason, ProviderEvent, ProviderResponse, TokenUsage, ToolCall};
use crate::wire::{ChatChunk, ChunkToolCall};

/// Id for a call the server streamed without one: `call_` and 8 hex digits.
pub fn generate_tool_call_id() -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{}", &simple[..8])
}

/// Arguments of one tool call, appended as deltas arrive.
///
/// Only moves forward: once finished, further fragments are refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
    finished: bool,
}

impl ToolCallAccumulator {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: String::new(),
            finished: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns `false` if the call is already sealed.
    pub fn append(&mut self, fragment: &str) -> bool {
        if self.finished {
            return false;
        }
        self.arguments.push_str(fragment);
        true
    }

    /// Seal the call. Returns `None` when it was already sealed.
    pub fn finish(&mut self) -> Option<ToolCall> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(self.to_tool_call())
    }

    pub fn to_tool_call(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            input: self.arguments.clone(),
            finished: self.finished,
        }
    }
}

pub struct StreamAccumulator {
    content: String,
    calls: Vec<ToolCallAccumulator>,
    by_index: HashMap<u32, usize>,
    /// Most recent call opened by id, for servers that key calls by id.
    current: Option<usize>,
    usage: TokenUsage,
    finish_reason: Option<String>,
    map_finish: fn(&str) -> FinishReason,
    default_finish: FinishReason,
    closed: bool,
    seen_chunk: bool,
}

impl StreamAccumulator {
    pub fn new(map_finish: fn(&str) -> FinishReason, default_finish: FinishReason) -> Self {
        Self {
            content: String::new(),
            calls: Vec::new(),
            by_index: HashMap::new(),
            current: None,
            usage: TokenUsage::default(),
            finish_reason: None,
            map_finish,
            default_finish,
            closed: false,
            seen_chunk: false,
        }
    }

    pub fn openai() -> Self {
        Self::new(FinishReason::from_openai, FinishReason::Unknown)
    }

    pub fn glm() -> Self {
        Self::new(FinishReason::from_glm, FinishReason::EndTurn)
    }

    /// Whether any chunk has been applied.
    pub const fn has_output(&self) -> bool {
        self.seen_chunk
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tool_calls(&self) -> &[ToolCallAccumulator] {
        &self.calls
    }

    pub fn apply_chunk(&mut self, chunk: &ChatChunk) -> Vec<ProviderEvent> {
        self.seen_chunk = true;
        if let Some(usage) = chunk.usage {
            self.usage = usage.into();
        }
        let mut events = Vec::new();
        let Some(choice) = chunk.choices.first() else {
            return events;
        };

        if let Some(text) = choice.delta.content.as_deref() {
            events.extend(self.content_delta(text));
        }
        // Nothing opens once the stream has closed.
        if !self.closed {
            for (position, call) in choice.delta.tool_calls.iter().enumerate() {
                let index = call
                    .index
                    .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX));
                events.extend(self.tool_delta_indexed(index, call));
            }
            for call in &choice.tool_calls {
                events.extend(self.tool_delta_by_id(call));
            }
        }
        if let Some(reason) = choice.finish_reason.as_deref().filter(|r| !r.is_empty()) {
            self.finish_reason = Some(reason.to_string());
            events.extend(self.close());
        }
        events
    }

    /// Append text to the content block. Text after the stream closed is dropped.
    pub fn content_delta(&mut self, text: &str) -> Vec<ProviderEvent> {
        if text.is_empty() || self.closed {
            return Vec::new();
        }
        let mut events = Vec::with_capacity(2);
        if self.content.is_empty() {
            events.push(ProviderEvent::ContentStart);
        }
        self.content.push_str(text);
        events.push(ProviderEvent::ContentDelta {
            content: text.to_string(),
        });
        events
    }

    /// OpenAI keying: a new index opens a call, a known index appends.
    fn tool_delta_indexed(&mut self, index: u32, call: &ChunkToolCall) -> Vec<ProviderEvent> {
        let fragment = call.function.arguments.as_deref().unwrap_or_default();
        if let Some(&slot) = self.by_index.get(&index) {
            return self.append_to(slot, call.function.name.as_deref(), fragment);
        }
        let slot = self.open(call.id.as_deref(), call.function.name.as_deref());
        self.by_index.insert(index, slot);
        let mut events = vec![self.start_event(slot)];
        events.extend(self.append_to(slot, None, fragment));
        events
    }

    /// GLM keying: a different id opens a call and seals the previous one.
    fn tool_delta_by_id(&mut self, call: &ChunkToolCall) -> Vec<ProviderEvent> {
        let fragment = call.function.arguments.as_deref().unwrap_or_default();
        let id = call.id.as_deref().filter(|id| !id.is_empty());
        let same_call = self
            .current
            .filter(|&slot| id.is_none_or(|id| self.calls[slot].id == id));
        if let Some(slot) = same_call {
            return self.append_to(slot, call.function.name.as_deref(), fragment);
        }

        let mut events = Vec::new();
        if let Some(previous) = self.current.take() {
            if let Some(sealed) = self.calls[previous].finish() {
                events.push(ProviderEvent::ToolUseStop { tool_call: sealed });
            }
        }
        let slot = self.open(id, call.function.name.as_deref());
        self.current = Some(slot);
        events.push(self.start_event(slot));
        events.extend(self.append_to(slot, None, fragment));
        events
    }

    fn open(&mut self, id: Option<&str>, name: Option<&str>) -> usize {
        let id = id
            .filter(|id| !id.is_empty())
            .map_or_else(generate_tool_call_id, str::to_string);
        self.calls
            .push(ToolCallAccumulator::new(id, name.unwrap_or_default()));
        self.calls.len() - 1
    }

    fn start_event(&self, slot: usize) -> ProviderEvent {
        ProviderEvent::ToolUseStart {
            tool_call: self.calls[slot].to_tool_call(),
        }
    }

    fn append_to(&mut self, slot: usize, name: Option<&str>, fragment: &str) -> Vec<ProviderEvent> {
        let acc = &mut self.calls[slot];
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            if acc.name.is_empty() && !acc.finished {
                acc.name = name.to_string();
            }
        }
        if fragment.is_empty() || !acc.append(fragment) {
            return Vec::new();
        }
        vec![ProviderEvent::ToolUseDelta {
            id: acc.id.clone(),
            arguments: fragment.to_string(),
        }]
    }

    /// Seal open calls and the content block. Runs once.
    fn close(&mut self) -> Vec<ProviderEvent> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        self.current = None;
        let mut events: Vec<_> = self
            .calls
            .iter_mut()
            .filter_map(ToolCallAccumulator::finish)
            .map(|tool_call| ProviderEvent::ToolUseStop { tool_call })
            .collect();
        if !self.content.is_empty() {
            events.push(ProviderEvent::ContentStop);
        }
        events
    }

    /// Close anything still open and emit `Complete`.
    pub fn finish(mut self) -> Vec<ProviderEvent> {
        let mut events = self.close();
        let finish_reason = self
            .finish_reason
            .as_deref()
            .map_or(self.default_finish, self.map_finish);
        let response = ProviderResponse::new(
            self.content,
            self.calls.iter().map(ToolCallAccumulator::to_tool_call).collect(),
            self.usage,
            finish_reason,
        );
        events.push(ProviderEvent::Complete { response });
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(json: serde_json::Value) -> ChatChunk {
        serde_json::from_value(json).unwrap()
    }

    fn delta_call(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> ChatChunk {
        chunk(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [{
                "index": index,
                "id": id,
                "function": {"name": name, "arguments": args},
            }]}}]
        }))
    }

    #[test]
    fn interleaved_calls_accumulate_in_arrival_order() {
        let mut acc = StreamAccumulator::openai();
        let mut events = Vec::new();
        events.extend(acc.apply_chunk(&delta_call(0, Some("a"), Some("read"), "{\"p")));
        events.extend(acc.apply_chunk(&delta_call(1, Some("b"), Some("grep"), "")));
        events.extend(acc.apply_chunk(&delta_call(2, Some("c"), Some("ls"), "{}")));
        events.extend(acc.apply_chunk(&delta_call(1, None, None, "{\"q\":")));
        events.extend(acc.apply_chunk(&delta_call(0, None, None, "\":1}")));
        events.extend(acc.apply_chunk(&delta_call(1, None, None, "2}")));

        let starts = events
            .iter()
            .filter(|e| matches!(e, ProviderEvent::ToolUseStart { .. }))
            .count();
        assert_eq!(starts, 3);
        let args: Vec<_> = acc.tool_calls().iter().map(|c| c.arguments()).collect();
        assert_eq!(args, ["{\"p\":1}", "{\"q\":2}", "{}"]);

        let done = acc.finish();
        let ProviderEvent::Complete { response } = done.last().unwrap() else {
            panic!("expected Complete, got {done:?}");
        };
        assert_eq!(response.finish_reason, FinishReason::ToolUse);
        assert!(response.tool_calls.iter().all(|c| c.finished));
        assert_eq!(response.tool_calls[1].name, "grep");
    }

    #[test]
    fn sealed_calls_refuse_fragments() {
        let mut acc = StreamAccumulator::openai();
        acc.apply_chunk(&delta_call(0, Some("a"), Some("read"), "{}"));
        let stop = acc.apply_chunk(&chunk(
            serde_json::json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
        ));
        assert!(matches!(&stop[0], ProviderEvent::ToolUseStop { tool_call } if tool_call.finished));

        assert!(acc.apply_chunk(&delta_call(0, None, None, "junk")).is_empty());
        assert_eq!(acc.tool_calls()[0].arguments(), "{}");
        assert!(acc.tool_calls()[0].is_finished());
    }

    #[test]
    fn text_after_finish_is_dropped() {
        let mut acc = StreamAccumulator::openai();
        let opened = acc.content_delta("Done.");
        assert_eq!(opened[0], ProviderEvent::ContentStart);
        let stop = acc.apply_chunk(&chunk(
            serde_json::json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
        ));
        assert_eq!(stop, [ProviderEvent::ContentStop]);

        let late = acc.apply_chunk(&chunk(
            serde_json::json!({"choices": [{"delta": {"content": " extra"}}]}),
        ));
        assert!(late.is_empty());
        assert_eq!(acc.content(), "Done.");

        let done = acc.finish();
        assert_eq!(done.len(), 1);
        assert!(matches!(
            &done[0],
            ProviderEvent::Complete { response } if response.content == "Done."
        ));
    }

    #[test]
    fn calls_keyed_by_id_seal_on_change() {
        let mut acc = StreamAccumulator::glm();
        let by_id = |id: &str, args: &str| {
            chunk(serde_json::json!({
                "choices": [{"delta": {}, "tool_calls": [{
                    "id": id,
                    "function": {"name": "bash", "arguments": args},
                }]}]
            }))
        };
        let first = acc.apply_chunk(&by_id("x1", "{\"cmd\""));
        assert!(matches!(&first[0], ProviderEvent::ToolUseStart { tool_call } if tool_call.id == "x1"));
        acc.apply_chunk(&by_id("x1", ":\"ls\"}"));
        let switch = acc.apply_chunk(&by_id("x2", "{}"));
        assert!(
            matches!(&switch[0], ProviderEvent::ToolUseStop { tool_call } if tool_call.id == "x1" && tool_call.input == "{\"cmd\":\"ls\"}")
        );
        assert!(matches!(&switch[1], ProviderEvent::ToolUseStart { tool_call } if tool_call.id == "x2"));
        assert_eq!(acc.tool_calls().len(), 2);
    }

    #[test]
    fn missing_ids_are_generated() {
        let mut acc = StreamAccumulator::openai();
        acc.apply_chunk(&delta_call(0, None, Some("ls"), "{}"));
        let id = acc.tool_calls()[0].id();
        assert!(id.starts_with("call_"));
        assert_eq!(id.len(), 13);
        assert!(id[5..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn finish_reason_defaults_per_vocabulary() {
        let mut openai = StreamAccumulator::openai();
        openai.content_delta("hi");
        let events = openai.finish();
        assert_eq!(events[0], ProviderEvent::ContentStop);
        assert!(matches!(
            &events[1],
            ProviderEvent::Complete { response } if response.finish_reason == FinishReason::Unknown
        ));

        let glm = StreamAccumulator::glm();
        assert!(matches!(
            glm.finish().last(),
            Some(ProviderEvent::Complete { response }) if response.finish_reason == FinishReason::EndTurn
        ));
    }
}
