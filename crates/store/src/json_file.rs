//! A [`ConfigStore`] backed by a single JSON document.
//!
//! Every commit applies the batch to a copy of the current state, writes the
//! whole document to a sibling temporary file, syncs it and renames it over
//! the original. A crash mid-write leaves the previous document intact, and a
//! failed write leaves the in-memory state untouched.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mediation::{Batch, ConfigState, ConfigStore, StoreError, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// On-disk format version. Bumped on incompatible layout changes.
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    format: u32,
    saved_at: Timestamp,
    config: ConfigState,
}

#[derive(Debug, Serialize)]
struct DocumentRef<'a> {
    format: u32,
    saved_at: Timestamp,
    config: &'a ConfigState,
}

/// Stores the whole configuration in one JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<ConfigState>,
}

impl JsonFileStore {
    /// Opens the document at `path`. A missing file is an empty
    /// configuration; the file is created on the first commit.
    #[tracing::instrument(skip_all)]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => decode(&path, &bytes)?,
            Err(err) if err.kind() == IoErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No configuration document yet; starting empty");
                ConfigState::default()
            }
            Err(err) => return Err(unavailable(&path, "read", &err)),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "config.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn persist(&self, state: &ConfigState) -> Result<(), StoreError> {
        let document = DocumentRef {
            format: FORMAT_VERSION,
            saved_at: Timestamp::now(),
            config: state,
        };
        let bytes = serde_json::to_vec_pretty(&document).map_err(|err| StoreError::Corrupt {
            message: format!("failed to encode configuration: {err}"),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| unavailable(parent, "create directory", &err))?;
        }

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|err| unavailable(&temp, "create", &err))?;
        file.write_all(&bytes)
            .await
            .map_err(|err| unavailable(&temp, "write", &err))?;
        file.sync_all()
            .await
            .map_err(|err| unavailable(&temp, "sync", &err))?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|err| unavailable(&self.path, "replace", &err))?;
        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "Configuration document written");
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn load(&self) -> Result<ConfigState, StoreError> {
        Ok(self.state.lock().await.clone())
    }

    async fn commit(&self, batch: &Batch) -> Result<(), StoreError> {
        let mut current = self.state.lock().await;
        let mut next = current.clone();
        next.apply(batch);
        self.persist(&next).await?;
        *current = next;
        Ok(())
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<ConfigState, StoreError> {
    let document: Document = serde_json::from_slice(bytes).map_err(|err| StoreError::Corrupt {
        message: format!("{}: {err}", path.display()),
    })?;
    if document.format != FORMAT_VERSION {
        return Err(StoreError::Corrupt {
            message: format!(
                "{}: unsupported format version {} (expected {FORMAT_VERSION})",
                path.display(),
                document.format
            ),
        });
    }
    tracing::debug!(path = %path.display(), saved_at = %document.saved_at, "Configuration document read");
    Ok(document.config)
}

fn unavailable(path: &Path, action: &str, err: &std::io::Error) -> StoreError {
    StoreError::Unavailable {
        message: format!("failed to {action} {}: {err}", path.display()),
    }
}
