//! Blob storage for indicator photos.
//!
//! Blobs are addressed by a relative path such as `slip/<md5>.jpg`. The HTTP layer
//! only sees the `BlobStore` trait; `LocalBlobStore` keeps the files under a
//! directory that `main.rs` also serves read-only at `/files`.

use log::warn;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use crate::error::ApiError;

/// URL prefix under which `LocalBlobStore` files are served.
pub const FILES_MOUNT: &str = "/files";

pub trait BlobStore: Send + Sync {
    /// Stores `bytes` at `path`, replacing any previous blob, and returns its public URL.
    fn put(&self, path: &str, bytes: &[u8]) -> Result<String, ApiError>;

    fn url(&self, path: &str) -> Result<String, ApiError>;

    /// Removes the blob. Deleting a missing blob succeeds.
    fn delete(&self, path: &str) -> Result<(), ApiError>;
}

/// Rejects absolute paths and any path that climbs out of the store.
fn checked_relative(path: &str) -> Result<&Path, ApiError> {
    let candidate = Path::new(path);
    let safe = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(candidate)
    } else {
        Err(ApiError::Validation(format!("invalid blob path '{}'", path)))
    }
}

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base: String,
}

impl LocalBlobStore {
    /// Creates the root directory if needed. `public_url` is the externally visible
    /// base of the service, e.g. `http://127.0.0.1:8080`.
    pub fn new(root: impl Into<PathBuf>, public_url: &str) -> Result<Self, ApiError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(LocalBlobStore {
            root,
            public_base: format!("{}{}", public_url.trim_end_matches('/'), FILES_MOUNT),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BlobStore for LocalBlobStore {
    fn put(&self, path: &str, bytes: &[u8]) -> Result<String, ApiError> {
        let target = self.root.join(checked_relative(path)?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(&target)?);
        writer.write_all(bytes)?;
        writer.flush()?;
        self.url(path)
    }

    fn url(&self, path: &str) -> Result<String, ApiError> {
        checked_relative(path)?;
        Ok(format!("{}/{}", self.public_base, path))
    }

    fn delete(&self, path: &str) -> Result<(), ApiError> {
        let target = self.root.join(checked_relative(path)?);
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Blob {} was already gone", path);
                Ok(())
            }
            Err(e) => Err(ApiError::External(format!(
                "could not delete blob {}: {}",
                path, e
            ))),
        }
    }
}
