//! Linehook - LINE Messaging API webhook receiver.
//!
//! This library provides the modules behind the `linehook-web` binary:
//! - `web`: HTTP routes and `X-Line-Signature` verification
//! - `event`: decoding of webhook event batches
//! - `content`: download and storage of message content
//!
//! ## Architecture
//!
//! ```text
//! POST / → verify signature → decode events → fetch content per event → 200 OK
//! ```

pub mod config;
pub mod content;
pub mod event;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use content::{process_events, ContentFetcher, ContentOutcome, EventOutcome};
pub use event::{decode_events, DecodeError, Event, EventBatch, Message};
pub use web::{router, verify_line_signature, AppState};
