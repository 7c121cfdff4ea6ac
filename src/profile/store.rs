//! On-disk profile storage.
//!
//! Layout: `<dir>/index.json` holds the ordered `{url, displayName}`
//! summaries, `<dir>/<uid>.json` holds each profile.
//!
//! Every single file write goes through a temporary sibling and a rename,
//! so readers never see a half-written file. A profile write and the index
//! update that follows it are still two separate steps: a crash between
//! them leaves a profile file without an index entry (or, on delete, an
//! entry without a file).

use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::model::{IndexEntry, Profile};

pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} does not contain valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub struct ProfileStore {
    dir: PathBuf,
    /// Serialises read-modify-write cycles on the index.
    index_lock: Mutex<()>,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    pub fn profile_path(&self, uid: &str) -> PathBuf {
        self.dir.join(format!("{}.json", uid))
    }

    /// Creates the directory and an empty index if they are missing. An
    /// existing index is left untouched.
    pub async fn ensure_index_exists(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;

        let path = self.index_path();
        let created = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        match created {
            Ok(mut file) => {
                file.write_all(b"[]").await.map_err(io_error(&path))?;
                file.flush().await.map_err(io_error(&path))?;
                tracing::info!(path = %path.display(), "Created empty profile index");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    /// Raw bytes of the index, creating it first if needed.
    pub async fn read_index_raw(&self) -> Result<Vec<u8>, StoreError> {
        self.ensure_index_exists().await?;
        let path = self.index_path();
        tokio::fs::read(&path).await.map_err(io_error(&path))
    }

    pub async fn read_index(&self) -> Result<Vec<IndexEntry>, StoreError> {
        let raw = self.read_index_raw().await?;
        serde_json::from_slice(&raw).map_err(|source| StoreError::Corrupt {
            path: self.index_path(),
            source,
        })
    }

    pub async fn write_index(&self, entries: &[IndexEntry]) -> Result<(), StoreError> {
        self.write_json(&self.index_path(), "profile index", &entries).await
    }

    pub async fn write_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        self.write_json(&self.profile_path(&profile.uid), "profile", profile).await
    }

    /// Raw bytes of a profile, `None` if it does not exist.
    pub async fn read_profile_raw(&self, uid: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.profile_path(uid);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    pub async fn read_profile(&self, uid: &str) -> Result<Option<Profile>, StoreError> {
        let Some(raw) = self.read_profile_raw(uid).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: self.profile_path(uid),
                source,
            })
    }

    /// Adds `entry` to the index, replacing an entry with the same url in
    /// place.
    pub async fn upsert_index_entry(&self, entry: IndexEntry) -> Result<(), StoreError> {
        let _guard = self.index_lock.lock().await;

        let mut index = self.read_index().await?;
        match index.iter_mut().find(|e| e.url == entry.url) {
            Some(existing) => *existing = entry,
            None => index.push(entry),
        }
        self.write_index(&index).await
    }

    /// Removes the profile file and its index entry. A missing file is not
    /// an error.
    pub async fn delete_profile(&self, uid: &str) -> Result<(), StoreError> {
        let path = self.profile_path(uid);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::info!(uid, "Deleted profile file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(uid, "Profile file already absent");
            }
            Err(e) => return Err(io_error(&path)(e)),
        }

        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await?;
        let before = index.len();
        index.retain(|e| e.url != uid);
        if index.len() != before {
            self.write_index(&index).await?;
        }
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(
        &self,
        path: &Path,
        what: &'static str,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Encode { what, source })?;
        write_atomic(path, &bytes).await
    }
}

/// Writes `bytes` to a temporary sibling of `path`, then renames it over
/// `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_error(parent))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    tokio::fs::write(&tmp, bytes).await.map_err(io_error(&tmp))?;
    tokio::fs::rename(&tmp, path).await.map_err(io_error(path))
}
