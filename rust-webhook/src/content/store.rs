//! Writing downloaded message content to disk.
//!
//! Content is streamed into `<name>.<n>.part` and renamed once complete, so
//! a file with the final name is never half written and two writers never
//! share a temporary file. Every filesystem call is bounded by the
//! configured write timeout.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::ContentError;

static PART_SEQ: AtomicU64 = AtomicU64::new(0);

/// A message's content after it has been written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredContent {
    pub path: PathBuf,
    pub bytes: u64,
    pub content_type: Option<String>,
}

/// Whether a message ID is safe to use as a file name.
///
/// LINE message IDs are numeric strings; anything containing path
/// separators or dots is rejected.
pub fn is_safe_message_id(message_id: &str) -> bool {
    !message_id.is_empty()
        && message_id.len() <= 64
        && message_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Pick a file extension from a `Content-Type` header value.
pub fn extension_for_content_type(content_type: Option<&str>) -> &'static str {
    let mime = content_type
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match mime.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "audio/m4a" | "audio/x-m4a" | "audio/mp4" | "audio/aac" => "m4a",
        "audio/mpeg" => "mp3",
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        "application/zip" => "zip",
        _ => "bin",
    }
}

/// Extension of a user-supplied file name, if it is short and alphanumeric.
pub fn extension_from_file_name(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
}

/// Streams one piece of content into a temporary file.
pub struct ContentWriter {
    file: File,
    part_path: PathBuf,
    final_path: PathBuf,
    bytes: u64,
    timeout: Duration,
}

impl ContentWriter {
    /// Create `dir/<file_name>.<n>.part`, creating `dir` if needed.
    pub async fn create(
        dir: &Path,
        file_name: &str,
        timeout: Duration,
    ) -> Result<Self, ContentError> {
        let seq = PART_SEQ.fetch_add(1, Ordering::Relaxed);
        let final_path = dir.join(file_name);
        let part_path = dir.join(format!("{}.{}.part", file_name, seq));

        bounded(timeout, &part_path, fs::create_dir_all(dir)).await?;
        let file = bounded(timeout, &part_path, File::create(&part_path)).await?;

        Ok(Self {
            file,
            part_path,
            final_path,
            bytes: 0,
            timeout,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ContentError> {
        bounded(self.timeout, &self.part_path, self.file.write_all(chunk)).await?;
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    /// Flush the temporary file and move it to its final name.
    pub async fn finish(
        mut self,
        content_type: Option<String>,
    ) -> Result<StoredContent, ContentError> {
        let result = async {
            bounded(self.timeout, &self.part_path, self.file.flush()).await?;
            bounded(self.timeout, &self.part_path, self.file.sync_all()).await?;
            bounded(
                self.timeout,
                &self.final_path,
                fs::rename(&self.part_path, &self.final_path),
            )
            .await
        }
        .await;

        if let Err(e) = result {
            self.abort().await;
            return Err(e);
        }

        info!(
            path = %self.final_path.display(),
            bytes = self.bytes,
            "content_file_written"
        );

        Ok(StoredContent {
            path: self.final_path,
            bytes: self.bytes,
            content_type,
        })
    }

    /// Discard the temporary file.
    pub async fn abort(self) {
        let Self {
            file,
            part_path,
            timeout,
            ..
        } = self;
        drop(file);

        if let Err(e) = bounded(timeout, &part_path, fs::remove_file(&part_path)).await {
            warn!(
                path = %part_path.display(),
                error = %e,
                "content_part_cleanup_failed"
            );
        }
    }
}

/// Run a filesystem operation under a timeout.
async fn bounded<T, F>(timeout: Duration, path: &Path, op: F) -> Result<T, ContentError>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result.map_err(ContentError::Io),
        Err(_) => Err(ContentError::WriteTimeout(path.to_path_buf())),
    }
}
