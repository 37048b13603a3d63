//! # Event-Stream Framing
//!
//! The upstream speaks the `text/event-stream` convention:
//! - `event: <kind>` names the event
//! - `data: <line>` carries one payload line (repeatable)
//! - an empty line closes the frame
//! - anything else (`:` comments, `id:`, `retry:`) is ignored
//!
//! `scanner` turns bytes into `RawFrame`s, `decoder` turns a `RawFrame` into a
//! `DecodedEvent`.

mod decoder;
mod scanner;

pub use decoder::{decode, DecodedEvent, DATA_FIELD, EVENT_FIELD};
pub use scanner::{FrameScanner, RawFrame, LINE_BUFFER_CAPACITY, MAX_LINE_LENGTH};
