//! Loads object manifests from disk into the store.
//!
//! A `.json` file holds one object or an array of objects. A `.toml` file
//! holds one object, or an `objects` array of tables. Files are read in name
//! order; other extensions are skipped.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use vela_core::{CoreError, ObjectKey};
use vela_storage::{ObjectStore, StorageError};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid object in {path}: {source}")]
    InvalidObject {
        path: PathBuf,
        #[source]
        source: CoreError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ManifestError {
    fn parse(path: &Path, message: impl ToString) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// Counts of objects written by [`apply_manifests`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestSummary {
    pub files: usize,
    pub created: usize,
    pub updated: usize,
}

/// Parses the objects held by one manifest file.
pub fn load_manifest_file(path: &Path) -> Result<Vec<Value>, ManifestError> {
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let objects = match extension(path) {
        Some("json") => {
            let document: Value =
                serde_json::from_str(&text).map_err(|e| ManifestError::parse(path, e))?;
            match document {
                Value::Array(items) => items,
                other => vec![other],
            }
        }
        Some("toml") => {
            let mut document: Value =
                toml::from_str(&text).map_err(|e| ManifestError::parse(path, e))?;
            match document.get_mut("objects").map(Value::take) {
                Some(Value::Array(items)) => items,
                Some(_) => return Err(ManifestError::parse(path, "`objects` must be an array")),
                None => vec![document],
            }
        }
        _ => Vec::new(),
    };

    for object in &objects {
        ObjectKey::from_value(object).map_err(|source| ManifestError::InvalidObject {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(objects)
}

/// Lists the manifest files of `dir` in name order.
pub fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>, ManifestError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ManifestError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| ManifestError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_file() && matches!(extension(&path), Some("json" | "toml")) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Creates every manifest object, updating those that already exist.
pub async fn apply_manifests(
    store: &dyn ObjectStore,
    dirs: &[PathBuf],
) -> Result<ManifestSummary, ManifestError> {
    let mut summary = ManifestSummary::default();
    for dir in dirs {
        for path in manifest_files(dir)? {
            for object in load_manifest_file(&path)? {
                match store.create(&object).await {
                    Ok(stored) => {
                        debug!(key = %stored.key, "Created object from manifest");
                        summary.created += 1;
                    }
                    Err(e) if e.is_already_exists() => {
                        let stored = store.update(&object, None).await?;
                        debug!(key = %stored.key, "Updated object from manifest");
                        summary.updated += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            summary.files += 1;
        }
        info!(dir = %dir.display(), "Loaded manifests");
    }
    Ok(summary)
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}
