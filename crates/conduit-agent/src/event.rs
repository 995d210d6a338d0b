//! NDJSON event framing for agent subprocess output.
//!
//! Every backend that speaks the `stream-json` family of protocols (Claude
//! Code, Codex) emits one JSON object per line on stdout. [`parse_stream`]
//! turns the accumulated raw text into a coherent plain-text transcript and
//! pulls out the session id the backend assigned, if any.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A single NDJSON line from an agent subprocess.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Backend startup/handshake line, usually carrying the session id.
    System {
        /// The session id the backend assigned, if this is the init event.
        session_id: Option<String>,
        /// Free-form subtype (e.g. `"init"`).
        #[serde(default)]
        subtype: Option<String>,
    },
    /// A message produced by the agent.
    Assistant {
        /// The message content blocks.
        message: Message,
    },
    /// A message representing tool results fed back to the agent.
    User {
        /// The message content blocks.
        message: Message,
    },
    /// Final result line, emitted once the agent finishes a turn.
    Result {
        /// Whether the agent reported an error.
        #[serde(default)]
        is_error: bool,
        /// The final textual result, if any.
        #[serde(default)]
        result: Option<String>,
        /// The session id, echoed again at the end by some backends.
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Anything this framing doesn't recognize. Kept rather than rejected so
    /// that a backend upgrade doesn't break the whole stream.
    #[serde(other)]
    Unknown,
}

/// The `message` payload of an [`AgentEvent::Assistant`] or
/// [`AgentEvent::User`] event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Content blocks that make up the message.
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// A single content block within a message.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },
    /// A tool invocation the agent requested.
    ToolUse {
        /// Tool name.
        #[serde(default)]
        name: Option<String>,
        /// Tool input, left as raw JSON since each tool has its own shape.
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
    /// The result of a tool invocation, fed back to the agent.
    ToolResult {
        /// The tool's output content, when textual.
        #[serde(default)]
        content: Option<serde_json::Value>,
    },
    /// Any other block type.
    #[serde(other)]
    Unknown,
}

/// Parse one NDJSON line into an [`AgentEvent`], or `None` if it's blank or
/// not valid JSON for this framing. Used by the drive loop to handle each
/// line as it arrives rather than waiting for the whole stream.
#[must_use]
pub fn parse_line(line: &str) -> Option<AgentEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}

/// One fully-assembled unit of agent output, ready to forward and persist
/// as a single replay-log entry.
///
/// Coalescing exists because the wire protocol splits a single logical
/// message or tool call across several NDJSON lines (a `tool_use` block and
/// its `tool_result` arrive as separate events); a replay log built from raw
/// frames would force every reader to redo this reassembly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoalescedRecord {
    /// One or more consecutive assistant text blocks, merged into a single
    /// message.
    AgentMessageComplete {
        /// The merged text.
        text: String,
    },
    /// A tool invocation paired with the result fed back to the agent.
    ToolCallComplete {
        /// Tool name, if the backend reported one.
        name: Option<String>,
        /// Tool input.
        input: Option<serde_json::Value>,
        /// Tool output.
        output: Option<serde_json::Value>,
    },
}

struct PendingCall {
    name: Option<String>,
    input: Option<serde_json::Value>,
}

/// Incrementally coalesces a sequence of [`AgentEvent`]s into
/// [`CoalescedRecord`]s as they arrive, so the caller can persist and
/// forward each record the moment it's complete rather than waiting for the
/// whole turn.
///
/// Consecutive assistant text blocks accumulate into one pending message,
/// flushed into an `AgentMessageComplete` as soon as a `tool_use` block or
/// the end of the stream interrupts the run. Tool calls are matched to
/// their result in emission order (the wire protocol carries no call id),
/// so `push` must be called in the order the agent produced events.
#[derive(Default)]
pub struct Coalescer {
    message: Option<String>,
    pending_calls: VecDeque<PendingCall>,
}

impl Coalescer {
    /// A coalescer with nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one parsed event, returning any records it completes and the
    /// session id, if this event carried one.
    pub fn push(&mut self, event: &AgentEvent) -> (Vec<CoalescedRecord>, Option<String>) {
        let mut records = Vec::new();
        let mut session_id = None;
        match event {
            AgentEvent::System { session_id: Some(id), .. } | AgentEvent::Result { session_id: Some(id), .. } => {
                session_id = Some(id.clone());
            }
            AgentEvent::Assistant { message } => {
                for block in &message.content {
                    match block {
                        ContentBlock::Text { text } => {
                            self.message.get_or_insert_with(String::new).push_str(text);
                        }
                        ContentBlock::ToolUse { name, input } => {
                            if let Some(text) = self.message.take() {
                                records.push(CoalescedRecord::AgentMessageComplete { text });
                            }
                            self.pending_calls.push_back(PendingCall { name: name.clone(), input: input.clone() });
                        }
                        ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
                    }
                }
            }
            AgentEvent::User { message } => {
                for block in &message.content {
                    if let ContentBlock::ToolResult { content } = block {
                        if let Some(call) = self.pending_calls.pop_front() {
                            records.push(CoalescedRecord::ToolCallComplete {
                                name: call.name,
                                input: call.input,
                                output: content.clone(),
                            });
                        }
                    }
                }
            }
            _ => {}
        }
        (records, session_id)
    }

    /// Flush whatever message is still pending (call once at stream end; a
    /// turn that ends mid-message still owes a record for it).
    pub fn finish(&mut self) -> Vec<CoalescedRecord> {
        self.message.take().map_or_else(Vec::new, |text| vec![CoalescedRecord::AgentMessageComplete { text }])
    }
}

/// Parse a full accumulated stdout buffer (one JSON object per line) into a
/// plain-text transcript and the session id, if the backend reported one.
///
/// Lines that fail to parse as [`AgentEvent`] are skipped; a backend that
/// emits the occasional non-JSON diagnostic line on stdout shouldn't bring
/// down the whole parse.
#[must_use]
pub fn parse_stream(data: &str) -> (String, Option<String>) {
    let mut transcript = String::new();
    let mut session_id = None;

    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<AgentEvent>(line) else {
            continue;
        };
        match event {
            AgentEvent::System { session_id: Some(id), .. } => session_id = Some(id),
            AgentEvent::Assistant { message } | AgentEvent::User { message } => {
                for block in message.content {
                    if let ContentBlock::Text { text } = block {
                        if !transcript.is_empty() {
                            transcript.push('\n');
                        }
                        transcript.push_str(&text);
                    }
                }
            }
            AgentEvent::Result { session_id: Some(id), .. } => session_id = Some(id),
            _ => {}
        }
    }

    (transcript, session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_system_event_session_id() {
        let line = r#"{"type":"system","subtype":"init","session_id":"abc-123"}"#;
        let (_, session_id) = parse_stream(line);
        assert_eq!(session_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn accumulates_assistant_text_blocks() {
        let data = [
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hello"}]}}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"world"}]}}"#,
        ]
        .join("\n");
        let (transcript, _) = parse_stream(&data);
        assert_eq!(transcript, "hello\nworld");
    }

    #[test]
    fn ignores_tool_use_blocks_in_transcript() {
        let data = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"bash","input":{}}]}}"#;
        let (transcript, _) = parse_stream(data);
        assert!(transcript.is_empty());
    }

    #[test]
    fn skips_unparseable_lines() {
        let data = "not json at all\n{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"ok\"}]}}";
        let (transcript, _) = parse_stream(data);
        assert_eq!(transcript, "ok");
    }

    #[test]
    fn unknown_event_type_does_not_panic() {
        let data = r#"{"type":"totally_new_event_kind","foo":"bar"}"#;
        let (transcript, session_id) = parse_stream(data);
        assert!(transcript.is_empty());
        assert!(session_id.is_none());
    }

    #[test]
    fn result_event_carries_session_id() {
        let data = r#"{"type":"result","is_error":false,"result":"done","session_id":"xyz"}"#;
        let (_, session_id) = parse_stream(data);
        assert_eq!(session_id.as_deref(), Some("xyz"));
    }

    #[test]
    fn parse_line_skips_blank_lines() {
        assert!(parse_line("   ").is_none());
    }

    #[test]
    fn parse_line_skips_invalid_json() {
        assert!(parse_line("not json").is_none());
    }

    #[test]
    fn coalescer_merges_consecutive_text_blocks_into_one_message() {
        let mut coalescer = Coalescer::new();
        let a = parse_line(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hel"}]}}"#).expect("parses");
        let b = parse_line(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"lo"}]}}"#).expect("parses");
        assert!(coalescer.push(&a).0.is_empty());
        assert!(coalescer.push(&b).0.is_empty());
        let records = coalescer.finish();
        assert_eq!(records.len(), 1);
        assert!(matches!(&records[0], CoalescedRecord::AgentMessageComplete { text } if text == "hello"));
    }

    #[test]
    fn coalescer_pairs_tool_use_with_its_result() {
        let mut coalescer = Coalescer::new();
        let call = parse_line(r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"bash","input":{"cmd":"ls"}}]}}"#)
            .expect("parses");
        let result = parse_line(r#"{"type":"user","message":{"content":[{"type":"tool_result","content":"ok"}]}}"#).expect("parses");
        assert!(coalescer.push(&call).0.is_empty());
        let (records, _) = coalescer.push(&result);
        assert_eq!(records.len(), 1);
        match &records[0] {
            CoalescedRecord::ToolCallComplete { name, output, .. } => {
                assert_eq!(name.as_deref(), Some("bash"));
                assert_eq!(output.as_ref().and_then(|v| v.as_str()), Some("ok"));
            }
            other => panic!("expected a tool call record, got {other:?}"),
        }
    }

    #[test]
    fn coalescer_flushes_a_tool_use_before_starting_a_pending_message() {
        let mut coalescer = Coalescer::new();
        let text = parse_line(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"running it"}]}}"#).expect("parses");
        let call = parse_line(r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"bash","input":null}]}}"#)
            .expect("parses");
        assert!(coalescer.push(&text).0.is_empty());
        let (records, _) = coalescer.push(&call);
        assert_eq!(records.len(), 1);
        assert!(matches!(&records[0], CoalescedRecord::AgentMessageComplete { text } if text == "running it"));
    }

    #[test]
    fn coalescer_finish_is_empty_with_nothing_pending() {
        let mut coalescer = Coalescer::new();
        assert!(coalescer.finish().is_empty());
    }
}
