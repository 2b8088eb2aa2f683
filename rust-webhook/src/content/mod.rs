//! Message content retrieval.
//!
//! For every event in a batch, decides whether there is platform-hosted
//! content to download and, if so, fetches it from the content API and
//! writes it to disk. Failures are reported per event and never abort the
//! rest of the batch.
//!
//! ## Processing Flow
//!
//! ```text
//! Events → plan_batch() → ContentFetcher → ContentWriter → EventOutcome
//! ```

pub mod fetcher;
pub mod store;

use std::collections::HashSet;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::event::{Event, Message};

pub use fetcher::ContentFetcher;
pub use store::{ContentWriter, StoredContent};

/// Why fetching or storing content failed.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("message id {0:?} cannot be used as a file name")]
    InvalidMessageId(String),

    #[error("content API base URL cannot take path segments")]
    InvalidBaseUrl,

    #[error("content request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("content API returned status {0}")]
    Status(u16),

    #[error("timed out writing {}", .0.display())]
    WriteTimeout(PathBuf),

    #[error("failed to write content: {0}")]
    Io(#[from] std::io::Error),
}

/// Why an event needed no download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The event has no message
    NoMessage,
    /// The message has no ID to download by
    MissingMessageId,
    /// Text, location, sticker and other kinds without binary content
    NoContent,
    /// The media is hosted outside the platform
    ExternalProvider,
    /// An earlier event in the same batch has the same message ID
    DuplicateMessage,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoMessage => "no_message",
            SkipReason::MissingMessageId => "missing_message_id",
            SkipReason::NoContent => "no_content",
            SkipReason::ExternalProvider => "external_provider",
            SkipReason::DuplicateMessage => "duplicate_message",
        }
    }
}

/// What happened to one event's content.
#[derive(Debug)]
pub enum ContentOutcome {
    Stored(StoredContent),
    Skipped(SkipReason),
    Failed(ContentError),
}

/// Result of processing one event, in batch order.
#[derive(Debug)]
pub struct EventOutcome {
    /// Position of the event in the batch
    pub index: usize,
    pub webhook_event_id: String,
    pub message_id: Option<String>,
    pub outcome: ContentOutcome,
}

impl EventOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ContentOutcome::Failed(_))
    }
}

/// A message whose content should be downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentTarget<'a> {
    pub message_id: &'a str,
    /// Original name for file messages, used to pick an extension
    pub file_name: Option<&'a str>,
}

/// Decide whether an event references downloadable content.
pub fn content_target(event: &Event) -> Result<ContentTarget<'_>, SkipReason> {
    let message = event.message.as_ref().ok_or(SkipReason::NoMessage)?;

    let message_id = message.id();
    if message_id.is_empty() {
        return Err(SkipReason::MissingMessageId);
    }

    match message {
        Message::File { file_name, .. } => Ok(ContentTarget {
            message_id,
            file_name: Some(file_name.as_str()).filter(|name| !name.is_empty()),
        }),
        Message::Image { .. } | Message::Video { .. } | Message::Audio { .. } => {
            match message.content_source() {
                Some(provider) if !provider.is_line_hosted() => Err(SkipReason::ExternalProvider),
                _ => Ok(ContentTarget {
                    message_id,
                    file_name: None,
                }),
            }
        }
        _ => Err(SkipReason::NoContent),
    }
}

/// Plan every event in a batch.
///
/// Each message ID is downloaded at most once; later events carrying the
/// same ID are skipped.
pub fn plan_batch(events: &[Event]) -> Vec<Result<ContentTarget<'_>, SkipReason>> {
    let mut seen = HashSet::new();

    events
        .iter()
        .map(|event| {
            let target = content_target(event)?;
            if seen.insert(target.message_id) {
                Ok(target)
            } else {
                Err(SkipReason::DuplicateMessage)
            }
        })
        .collect()
}

/// Process every event's content concurrently.
///
/// Outcomes come back in the same order as `events`.
pub async fn process_events(fetcher: &ContentFetcher, events: &[Event]) -> Vec<EventOutcome> {
    let futures: Vec<_> = events
        .iter()
        .zip(plan_batch(events))
        .enumerate()
        .map(|(index, (event, plan))| fetcher.handle_event(index, event, plan))
        .collect();

    let outcomes = futures::future::join_all(futures).await;

    let stored = outcomes
        .iter()
        .filter(|o| matches!(o.outcome, ContentOutcome::Stored(_)))
        .count();
    let failed = outcomes.iter().filter(|o| o.is_failure()).count();

    info!(
        event_count = events.len(),
        stored = stored,
        failed = failed,
        skipped = events.len() - stored - failed,
        "content_processing_complete"
    );

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(json: &str) -> Event {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_content_target_media() {
        let image = event(r#"{"type":"message","message":{"type":"image","id":"1"}}"#);
        assert_eq!(
            content_target(&image),
            Ok(ContentTarget {
                message_id: "1",
                file_name: None,
            })
        );

        let audio = event(
            r#"{"type":"message","message":{"type":"audio","id":"2","contentProvider":{"type":"line"}}}"#,
        );
        assert_eq!(content_target(&audio).unwrap().message_id, "2");
    }

    #[test]
    fn test_content_target_file() {
        let file = event(
            r#"{"type":"message","message":{"type":"file","id":"3","fileName":"notes.txt","fileSize":12}}"#,
        );
        assert_eq!(
            content_target(&file),
            Ok(ContentTarget {
                message_id: "3",
                file_name: Some("notes.txt"),
            })
        );
    }

    #[test]
    fn test_content_target_skips() {
        let follow = event(r#"{"type":"follow"}"#);
        assert_eq!(content_target(&follow), Err(SkipReason::NoMessage));

        let text = event(r#"{"type":"message","message":{"type":"text","id":"4","text":"hi"}}"#);
        assert_eq!(content_target(&text), Err(SkipReason::NoContent));

        let sticker = event(r#"{"type":"message","message":{"type":"sticker","id":"5"}}"#);
        assert_eq!(content_target(&sticker), Err(SkipReason::NoContent));

        let no_id = event(r#"{"type":"message","message":{"type":"image"}}"#);
        assert_eq!(content_target(&no_id), Err(SkipReason::MissingMessageId));

        let external = event(
            r#"{"type":"message","message":{"type":"video","id":"6",
                "contentProvider":{"type":"external","originalContentUrl":"https://example.com/v.mp4"}}}"#,
        );
        assert_eq!(content_target(&external), Err(SkipReason::ExternalProvider));
    }

    #[test]
    fn test_plan_batch_skips_repeated_message_id() {
        let events = vec![
            event(r#"{"type":"message","message":{"type":"image","id":"10"}}"#),
            event(r#"{"type":"message","message":{"type":"text","id":"10","text":"hi"}}"#),
            event(r#"{"type":"message","message":{"type":"image","id":"10"}}"#),
            event(r#"{"type":"message","message":{"type":"audio","id":"11"}}"#),
        ];

        let plans = plan_batch(&events);

        assert_eq!(plans.len(), 4);
        assert_eq!(plans[0].map(|t| t.message_id), Ok("10"));
        assert_eq!(plans[1], Err(SkipReason::NoContent));
        assert_eq!(plans[2], Err(SkipReason::DuplicateMessage));
        assert_eq!(plans[3].map(|t| t.message_id), Ok("11"));
    }
}
