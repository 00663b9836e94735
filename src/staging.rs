//! Staging directory for exported documents awaiting transmission.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::Stream;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::export::ExportedDocument;
use crate::Result;

pub const DEFAULT_STAGING_DIR: &str = "temp";
pub const DEFAULT_FILE_PREFIX: &str = "generated-report";

/// Owns the staging directory. Only transient exports may live there: the
/// janitor deletes whatever it finds.
#[derive(Debug, Clone)]
pub struct TempFileStore {
    dir: PathBuf,
    prefix: String,
}

impl TempFileStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the staging directory if it does not exist.
    pub async fn ensure_directory(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Write `document` under a fresh, time-based name.
    pub async fn write(&self, document: &ExportedDocument) -> Result<StagedFile> {
        let path = self.dir.join(self.file_name(document.created_at));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        // Guard first: a failed write still removes the partial file.
        let mut staged = StagedFile {
            path,
            created_at: document.created_at,
            len: 0,
            armed: true,
        };
        file.write_all(&document.bytes).await?;
        file.flush().await?;
        staged.len = document.bytes.len() as u64;

        debug!(path = %staged.path.display(), bytes = staged.len, "document staged");
        Ok(staged)
    }

    /// Best-effort removal. Failures are logged and left to the janitor.
    pub async fn delete(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => true,
            Err(err) => report_delete_failure(path, err),
        }
    }

    fn file_name(&self, created_at: SystemTime) -> String {
        let millis = created_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}-{}-{}.pdf", self.prefix, millis, &suffix[..12])
    }
}

fn report_delete_failure(path: &Path, err: io::Error) -> bool {
    if err.kind() == io::ErrorKind::NotFound {
        return true;
    }
    warn!(
        path = %path.display(),
        error = %err,
        "failed to delete staged file; janitor will reclaim it"
    );
    false
}

/// A document on disk. Deleted when dropped unless already removed.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    created_at: SystemTime,
    len: u64,
    armed: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Delete now instead of on drop.
    pub async fn remove(mut self) -> bool {
        self.armed = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => true,
            Err(err) => report_delete_failure(&self.path, err),
        }
    }

    /// Stream the file's contents; the file is deleted once the stream ends
    /// or is dropped.
    pub async fn into_stream(self) -> Result<StagedStream> {
        let file = File::open(&self.path).await?;
        Ok(StagedStream {
            inner: ReaderStream::new(file),
            staged: Some(self),
            sent: 0,
        })
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "staged file removed"),
            Err(err) => {
                report_delete_failure(&self.path, err);
            }
        }
    }
}

/// Response body backed by a [`StagedFile`].
#[derive(Debug)]
pub struct StagedStream {
    inner: ReaderStream<File>,
    staged: Option<StagedFile>,
    sent: u64,
}

impl Stream for StagedStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                if let Some(staged) = this.staged.take() {
                    debug!(path = %staged.path.display(), bytes = this.sent, "staged file transmitted");
                }
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::TempDir;

    fn document(bytes: &[u8]) -> ExportedDocument {
        ExportedDocument {
            bytes: bytes.to_vec(),
            created_at: SystemTime::now(),
        }
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|it| it.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn ensure_directory_is_idempotent() {
        let root = TempDir::new().unwrap();
        let store = TempFileStore::new(root.path().join("nested/temp"), "report");
        store.ensure_directory().await.unwrap();
        store.ensure_directory().await.unwrap();
        assert!(store.dir().is_dir());
    }

    #[tokio::test]
    async fn write_stages_bytes_under_prefixed_name() {
        let root = TempDir::new().unwrap();
        let store = TempFileStore::new(root.path(), DEFAULT_FILE_PREFIX);

        let staged = store.write(&document(b"%PDF-1.7 test")).await.unwrap();
        let name = staged.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("generated-report-"), "unexpected name {name}");
        assert!(name.ends_with(".pdf"));
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"%PDF-1.7 test");
        assert_eq!(staged.len(), 13);

        drop(staged);
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn names_do_not_collide_within_one_millisecond() {
        let root = TempDir::new().unwrap();
        let store = TempFileStore::new(root.path(), "report");
        let doc = document(b"%PDF-");

        let a = store.write(&doc).await.unwrap();
        let b = store.write(&doc).await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn write_into_missing_directory_fails_with_io() {
        let root = TempDir::new().unwrap();
        let store = TempFileStore::new(root.path().join("missing"), "report");

        let err = store.write(&document(b"%PDF-")).await.unwrap_err();
        assert!(matches!(err, crate::RenderError::Io(_)));
    }

    #[tokio::test]
    async fn stream_deletes_file_after_last_chunk() {
        let root = TempDir::new().unwrap();
        let store = TempFileStore::new(root.path(), "report");
        let staged = store.write(&document(b"%PDF-1.7 body")).await.unwrap();
        let path = staged.path().to_path_buf();

        let mut stream = staged.into_stream().await.unwrap();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, b"%PDF-1.7 body");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn abandoned_stream_still_deletes_file() {
        let root = TempDir::new().unwrap();
        let store = TempFileStore::new(root.path(), "report");
        let staged = store.write(&document(b"%PDF-1.7")).await.unwrap();
        let path = staged.path().to_path_buf();

        let stream = staged.into_stream().await.unwrap();
        drop(stream);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn delete_tolerates_missing_files() {
        let root = TempDir::new().unwrap();
        let store = TempFileStore::new(root.path(), "report");
        assert!(store.delete(&root.path().join("gone.pdf")).await);

        let staged = store.write(&document(b"%PDF-")).await.unwrap();
        assert!(staged.remove().await);
        assert_eq!(entries(root.path()), 0);
    }
}
