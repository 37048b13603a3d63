//! # Frame Decoder
//!
//! Turns a `RawFrame` into a `DecodedEvent` and renders events back into the
//! same wire shape for downstream subscribers.

use std::fmt::Write as _;

use super::scanner::RawFrame;

/// Field marker for the event kind.
pub const EVENT_FIELD: &str = "event:";
/// Field marker for one payload line.
pub const DATA_FIELD: &str = "data:";

/// One event decoded from the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    kind: String,
    payload: String,
}

impl DecodedEvent {
    /// Builds an event directly; mostly useful in tests.
    pub fn new(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// The event kind. Empty when the frame had no `event:` line.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The payload, multi-line payloads joined with `\n`.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Renders `event: <kind>\ndata: <payload>\n\n`.
    ///
    /// Each payload line gets its own `data:` field so a joined multi-line
    /// payload decodes to the same value on the other side.
    pub fn to_wire(&self) -> String {
        let mut out = String::with_capacity(self.kind.len() + self.payload.len() + 16);
        let _ = writeln!(out, "event: {}", self.kind);
        for line in self.payload.split('\n') {
            let _ = writeln!(out, "data: {line}");
        }
        out.push('\n');
        out
    }
}

/// Decodes one frame.
///
/// The kind is trimmed; payload lines only lose the one space after `data:`.
/// Returns `None` when the payload is empty after joining: there is nothing to
/// broadcast. Unknown fields are skipped.
pub fn decode(frame: RawFrame) -> Option<DecodedEvent> {
    let mut kind = String::new();
    let mut data: Vec<String> = Vec::new();

    for line in frame.into_lines() {
        if let Some(rest) = line.strip_prefix(EVENT_FIELD) {
            kind = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix(DATA_FIELD) {
            // Payload lines are kept verbatim apart from the single separator space.
            data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
    }

    let payload = data.join("\n");
    if payload.is_empty() {
        return None;
    }

    Some(DecodedEvent { kind, payload })
}
