use std::{
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Largest accepted upload, in bytes.
pub const MAX_FILE_SIZE: usize = 10 << 20;

const ALLOWED_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("file size exceeds maximum limit of 10MB")]
    TooLarge { size: usize },

    #[error("invalid file type. Only JPG, JPEG, PNG, GIF, and WEBP are allowed")]
    UnsupportedType(String),

    #[error("image storage failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to record stored image: {0}")]
    Commit(#[source] anyhow::Error),
}

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Where a saved image lives: `path` for deletion, `url` for clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub path: String,
    pub url: String,
}

/// Product images on local disk, served under a public URL prefix.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    public_url: String,
}

/// Lowercased extension including the dot, e.g. `.png`.
fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the upload directory if it is missing.
    pub async fn init_dir(&self) -> Result<(), ImageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        info!(dir = %self.dir.display(), "upload directory ready");
        Ok(())
    }

    /// Size and extension checks. The content itself is not inspected.
    pub fn validate(&self, file: &UploadedFile) -> Result<(), ImageError> {
        if file.size() > MAX_FILE_SIZE {
            return Err(ImageError::TooLarge { size: file.size() });
        }
        match extension(&file.file_name) {
            Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
            other => Err(ImageError::UnsupportedType(other.unwrap_or_default())),
        }
    }

    /// Validates and writes the file as `<uuid>_<unix-seconds><ext>`.
    pub async fn save(&self, file: &UploadedFile) -> Result<StoredImage, ImageError> {
        self.validate(file)?;

        let ext = extension(&file.file_name).unwrap_or_default();
        let filename = format!(
            "{}_{}{}",
            Uuid::new_v4(),
            OffsetDateTime::now_utc().unix_timestamp(),
            ext
        );
        let path = self.dir.join(&filename);

        if let Err(e) = tokio::fs::write(&path, &file.data).await {
            // Do not leave a truncated file behind.
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(cleanup) if cleanup.kind() == ErrorKind::NotFound => {}
                Err(cleanup) => {
                    warn!(error = %cleanup, path = %path.display(), "failed to clean up partial upload")
                }
            }
            return Err(e.into());
        }

        info!(path = %path.display(), size = file.size(), "image stored");
        Ok(StoredImage {
            path: path.to_string_lossy().into_owned(),
            url: format!("{}/{}", self.public_url, filename),
        })
    }

    /// Removes a stored image. Empty paths and missing files are not errors.
    pub async fn delete(&self, path: &str) -> Result<(), ImageError> {
        if path.is_empty() {
            return Ok(());
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path, "image deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`ImageStore::delete`], but only logs failures.
    pub async fn delete_best_effort(&self, path: &str) {
        if let Err(e) = self.delete(path).await {
            warn!(error = %e, path, "failed to delete image; file orphaned");
        }
    }

    /// Saves `file`, runs `commit` with the new location, then drops the old
    /// file.
    ///
    /// If `commit` fails the new file is removed and the old one is left in
    /// place. Failure to remove the old file is logged, not returned.
    pub async fn replace<F, Fut, T>(
        &self,
        file: &UploadedFile,
        old_path: Option<&str>,
        commit: F,
    ) -> Result<(StoredImage, T), ImageError>
    where
        F: FnOnce(StoredImage) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let stored = self.save(file).await?;

        let committed = match commit(stored.clone()).await {
            Ok(value) => value,
            Err(e) => {
                self.delete_best_effort(&stored.path).await;
                return Err(ImageError::Commit(e));
            }
        };

        if let Some(old) = old_path.filter(|p| !p.is_empty() && *p != stored.path) {
            self.delete_best_effort(old).await;
        }
        Ok((stored, committed))
    }
}
