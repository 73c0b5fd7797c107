//! Filesystem-backed attachment storage.
//!
//! Each blob is written to `<dir>/<ulid>`, named by the token as it appears
//! in JSON. The same directory is served read-only under `/attachments`, so
//! a token doubles as the fetch path.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use threadline_core::AttachmentToken;
use threadline_messaging::{Attachment, AttachmentError, AttachmentResolver, AttachmentUpload};
use tracing::{debug, instrument};

/// Attachment resolver writing blobs to a local directory.
pub struct FsAttachmentStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl FsAttachmentStore {
    /// Creates a store rooted at `dir`, rejecting uploads over `max_bytes`.
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    /// Directory blobs are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the blob behind `token`.
    pub fn path_for(&self, token: AttachmentToken) -> PathBuf {
        self.dir.join(token.as_ulid().to_string())
    }
}

#[async_trait]
impl AttachmentResolver for FsAttachmentStore {
    #[instrument(
        skip(self, upload),
        fields(file_name = %upload.file_name, size = upload.data.len())
    )]
    async fn store(
        &self,
        upload: AttachmentUpload,
    ) -> threadline_core::Result<Attachment, AttachmentError> {
        if upload.data.len() > self.max_bytes {
            return Err(AttachmentError::TooLarge {
                size: upload.data.len(),
                limit: self.max_bytes,
            }
            .into());
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AttachmentError::WriteFailed {
                reason: format!("create {}: {e}", self.dir.display()),
            })?;

        let token = AttachmentToken::new();
        let path = self.path_for(token);
        tokio::fs::write(&path, &upload.data)
            .await
            .map_err(|e| AttachmentError::WriteFailed {
                reason: format!("write {}: {e}", path.display()),
            })?;

        debug!(%token, "stored attachment");
        Ok(Attachment {
            token,
            display_name: upload.file_name,
            media_type: upload.media_type,
        })
    }

    #[instrument(skip(self))]
    async fn discard(
        &self,
        token: AttachmentToken,
    ) -> threadline_core::Result<(), AttachmentError> {
        let path = self.path_for(token);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("discarded attachment");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AttachmentError::RemoveFailed {
                reason: format!("remove {}: {e}", path.display()),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(data: &[u8]) -> AttachmentUpload {
        AttachmentUpload {
            file_name: "notes.txt".to_string(),
            media_type: "text/plain".to_string(),
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn stores_blob_under_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsAttachmentStore::new(dir.path().join("blobs"), 64);

        let attachment = store.store(upload(b"hello")).await.expect("store");
        assert_eq!(attachment.display_name, "notes.txt");
        assert_eq!(attachment.media_type, "text/plain");

        let written = tokio::fs::read(store.path_for(attachment.token))
            .await
            .expect("read back");
        assert_eq!(written, b"hello");
    }

    #[tokio::test]
    async fn rejects_oversized_blob_without_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsAttachmentStore::new(dir.path(), 4);

        let err = store.store(upload(b"too large")).await.unwrap_err();
        assert!(err.to_string().contains("exceeds"));

        let mut entries = tokio::fs::read_dir(dir.path()).await.expect("read dir");
        assert!(entries.next_entry().await.expect("entry").is_none());
    }

    #[tokio::test]
    async fn discard_removes_blob_and_tolerates_unknown_tokens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsAttachmentStore::new(dir.path(), 64);

        let attachment = store.store(upload(b"draft")).await.expect("store");
        store.discard(attachment.token).await.expect("discard");
        assert!(!store.path_for(attachment.token).exists());

        store.discard(AttachmentToken::new()).await.expect("unknown token");
    }
}
