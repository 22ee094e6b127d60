//! Detector Events
//!
//! Decoding of the upstream camera service's server-sent event stream.
//!
//! - **Decoder**: splits raw stream bytes into lines and parses `data:`
//!   lines into schema-less [`Event`] documents
//! - **Detection**: narrows an event to a typed [`DetectionRecord`] when it
//!   describes a recognized person worth persisting

mod decoder;
mod detection;

pub use decoder::{decode_line, DecodedLine, Event, LineBuffer, DEFAULT_MAX_LINE};
pub use detection::{DetectionRecord, DETECTION_TYPE, UNKNOWN_NAME};
