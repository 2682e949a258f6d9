//! Annotations and images attached to a check run.
//!
//! Each `*.json` file below a configured directory holds one record. The
//! directories are re-read for every report so files produced by the running
//! command show up in later updates.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum AttachmentError {
    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes every `*.json` file below `dir`, visiting entries in file name
/// order. A missing directory, or a path that is not a directory, yields an
/// empty list.
pub fn load_json_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, AttachmentError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| AttachmentError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }

        let content = fs::read(path).map_err(|source| AttachmentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let record = serde_json::from_slice(&content).map_err(|source| AttachmentError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Like [`load_json_dir`] for an optional directory.
pub fn load_optional_dir<T: DeserializeOwned>(
    dir: Option<&Path>,
) -> Result<Vec<T>, AttachmentError> {
    match dir {
        Some(dir) => load_json_dir(dir),
        None => Ok(Vec::new()),
    }
}
