//! Client wire frames.
//!
//! Event-stream mode sends one event per delta (`id` = chunk index, `data` =
//! JSON `{id, delta, finish_reason?, tool_calls?}`) and ends with a `[DONE]`
//! event. Chunked mode sends one JSON line per delta carrying the growing
//! answer in `text`, and simply closes the body at the end.

use ragrelay_core::provider::ToolCallDelta;
use serde::Serialize;

/// Data of the terminal event-stream event.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    EventStream,
    Chunked,
}

impl WireMode {
    pub fn content_type(&self) -> &'static str {
        match self {
            WireMode::EventStream => "text/event-stream",
            WireMode::Chunked => "application/octet-stream",
        }
    }
}

/// One unit written to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Event { id: String, data: String },
    /// A JSON line without its trailing newline.
    Line(String),
}

impl WireFrame {
    pub fn is_done(&self) -> bool {
        matches!(self, WireFrame::Event { data, .. } if data == DONE_SENTINEL)
    }
}

#[derive(Serialize)]
struct EventPayload<'a> {
    id: &'a str,
    delta: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<&'a str>,
    #[serde(skip_serializing_if = "no_tool_calls")]
    tool_calls: &'a [ToolCallDelta],
}

fn no_tool_calls(calls: &&[ToolCallDelta]) -> bool {
    calls.is_empty()
}

#[derive(Serialize)]
struct LinePayload<'a> {
    id: &'a str,
    #[serde(rename = "conversationId")]
    conversation_id: &'a str,
    text: &'a str,
    delta: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<&'a str>,
}

/// Encodes deltas of one turn into frames of the chosen mode.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    mode: WireMode,
    message_id: String,
    conversation_id: String,
    text: String,
}

impl FrameEncoder {
    pub fn new(mode: WireMode, message_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            mode,
            message_id: message_id.into(),
            conversation_id: conversation_id.into(),
            text: String::new(),
        }
    }

    pub fn mode(&self) -> WireMode {
        self.mode
    }

    pub fn chunk(
        &mut self,
        index: u64,
        delta: &str,
        finish_reason: Option<&str>,
        tool_calls: &[ToolCallDelta],
    ) -> WireFrame {
        match self.mode {
            WireMode::EventStream => {
                let payload = EventPayload {
                    id: &self.message_id,
                    delta,
                    finish_reason,
                    tool_calls,
                };
                WireFrame::Event {
                    id: index.to_string(),
                    data: serde_json::to_string(&payload).unwrap_or_default(),
                }
            }
            WireMode::Chunked => {
                self.text.push_str(delta);
                let payload = LinePayload {
                    id: &self.message_id,
                    conversation_id: &self.conversation_id,
                    text: &self.text,
                    delta,
                    finish_reason,
                };
                WireFrame::Line(serde_json::to_string(&payload).unwrap_or_default())
            }
        }
    }

    /// The terminal frame, if the mode has one.
    pub fn done(&self, index: u64) -> Option<WireFrame> {
        match self.mode {
            WireMode::EventStream => Some(WireFrame::Event {
                id: index.to_string(),
                data: DONE_SENTINEL.into(),
            }),
            WireMode::Chunked => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn data(frame: &WireFrame) -> Value {
        match frame {
            WireFrame::Event { data, .. } | WireFrame::Line(data) => serde_json::from_str(data).unwrap(),
        }
    }

    #[test]
    fn event_stream_frames() {
        let mut enc = FrameEncoder::new(WireMode::EventStream, "m1", "c1");
        let frame = enc.chunk(1, "Hel", None, &[]);
        assert!(matches!(&frame, WireFrame::Event { id, .. } if id == "1"));
        assert_eq!(data(&frame), json!({"id": "m1", "delta": "Hel"}));

        let frame = enc.chunk(2, "", Some("stop"), &[]);
        assert_eq!(data(&frame)["finish_reason"], "stop");

        let done = enc.done(3).unwrap();
        assert!(done.is_done());
    }

    #[test]
    fn chunked_lines_accumulate_text() {
        let mut enc = FrameEncoder::new(WireMode::Chunked, "m1", "c1");
        enc.chunk(1, "You have ", None, &[]);
        let frame = enc.chunk(2, "30 days.", Some("stop"), &[]);
        assert_eq!(
            data(&frame),
            json!({"id": "m1", "conversationId": "c1", "text": "You have 30 days.", "delta": "30 days.", "finish_reason": "stop"})
        );
        assert!(enc.done(3).is_none());
    }

    #[test]
    fn tool_call_deltas_are_forwarded() {
        let mut enc = FrameEncoder::new(WireMode::EventStream, "m1", "c1");
        let delta = ToolCallDelta {
            index: 0,
            id: Some("call_1".into()),
            name: Some("kb_search".into()),
            arguments: Some("{".into()),
        };
        let frame = enc.chunk(1, "", None, std::slice::from_ref(&delta));
        assert_eq!(data(&frame)["tool_calls"][0]["name"], "kb_search");
    }
}
