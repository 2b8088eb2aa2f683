//! Content API client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client};
use tracing::{error, info, warn};
use url::Url;

use super::store::{extension_for_content_type, extension_from_file_name, is_safe_message_id};
use super::{
    ContentError, ContentOutcome, ContentTarget, ContentWriter, EventOutcome, SkipReason,
    StoredContent,
};
use crate::event::Event;
use crate::Config;

/// Downloads message content and writes it under the content directory.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct ContentFetcher {
    client: Client,
    base_url: Url,
    access_token: Arc<str>,
    content_dir: PathBuf,
    fetch_timeout: Duration,
    write_timeout: Duration,
}

impl ContentFetcher {
    /// Create a fetcher from the application configuration.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder().pool_max_idle_per_host(16).build()?;

        Ok(Self {
            client,
            base_url: config.content_api_base.clone(),
            access_token: Arc::from(config.access_token.as_str()),
            content_dir: config.content_dir.clone(),
            fetch_timeout: config.content_fetch_timeout(),
            write_timeout: config.content_write_timeout(),
        })
    }

    /// `{base}/v2/bot/message/{id}/content`
    pub fn content_url(&self, message_id: &str) -> Result<Url, ContentError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ContentError::InvalidBaseUrl)?
            .pop_if_empty()
            .extend(["v2", "bot", "message", message_id, "content"]);
        Ok(url)
    }

    /// Download one message's content and write it to disk.
    ///
    /// The file is named after the message ID. The extension comes from
    /// `file_name` when given, otherwise from the response `Content-Type`.
    pub async fn fetch_message_content(
        &self,
        message_id: &str,
        file_name: Option<&str>,
    ) -> Result<StoredContent, ContentError> {
        if !is_safe_message_id(message_id) {
            return Err(ContentError::InvalidMessageId(message_id.to_string()));
        }

        let url = self.content_url(message_id)?;

        info!(
            message_id = message_id,
            url = %url,
            timeout_seconds = self.fetch_timeout.as_secs_f64(),
            "content_fetch_starting"
        );

        let mut response = self
            .client
            .get(url)
            .bearer_auth(&*self.access_token)
            .timeout(self.fetch_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let extension = file_name
            .and_then(extension_from_file_name)
            .unwrap_or_else(|| extension_for_content_type(content_type.as_deref()).to_string());

        let mut writer = ContentWriter::create(
            &self.content_dir,
            &format!("{}.{}", message_id, extension),
            self.write_timeout,
        )
        .await?;

        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    writer.abort().await;
                    return Err(e.into());
                }
            };

            if let Err(e) = writer.write_chunk(&chunk).await {
                writer.abort().await;
                return Err(e);
            }
        }

        let stored = writer.finish(content_type).await?;

        info!(
            message_id = message_id,
            status_code = status.as_u16(),
            bytes = stored.bytes,
            path = %stored.path.display(),
            "content_fetch_complete"
        );

        Ok(stored)
    }

    /// Process one event according to its plan: skip it, or download and
    /// store its content.
    pub async fn handle_event(
        &self,
        index: usize,
        event: &Event,
        plan: Result<ContentTarget<'_>, SkipReason>,
    ) -> EventOutcome {
        info!(
            index = index,
            event_type = %event.event_type,
            message_type = event.message.as_ref().map(|m| m.kind()).unwrap_or(""),
            webhook_event_id = %event.webhook_event_id,
            is_redelivery = event.delivery_context.is_redelivery,
            "line_event_received"
        );

        let outcome = match plan {
            Err(reason) => {
                info!(index = index, reason = reason.as_str(), "content_fetch_skipped");
                ContentOutcome::Skipped(reason)
            }
            Ok(target) => {
                match self
                    .fetch_message_content(target.message_id, target.file_name)
                    .await
                {
                    Ok(stored) => ContentOutcome::Stored(stored),
                    Err(e) => {
                        log_fetch_error(target.message_id, &e);
                        ContentOutcome::Failed(e)
                    }
                }
            }
        };

        EventOutcome {
            index,
            webhook_event_id: event.webhook_event_id.clone(),
            message_id: event.message_id().map(str::to_string),
            outcome,
        }
    }
}

fn log_fetch_error(message_id: &str, e: &ContentError) {
    match e {
        ContentError::Request(err) if err.is_timeout() => {
            error!(message_id = message_id, error = %e, "content_fetch_timeout");
        }
        ContentError::Request(_) => {
            error!(message_id = message_id, error = %e, "content_fetch_request_error");
        }
        ContentError::Status(status) => {
            warn!(message_id = message_id, status_code = status, "content_fetch_bad_status");
        }
        ContentError::WriteTimeout(_) | ContentError::Io(_) => {
            error!(message_id = message_id, error = %e, "content_store_error");
        }
        ContentError::InvalidMessageId(_) | ContentError::InvalidBaseUrl => {
            warn!(message_id = message_id, error = %e, "content_fetch_rejected");
        }
    }
}
