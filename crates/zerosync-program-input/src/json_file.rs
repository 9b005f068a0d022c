//! JSON file helpers shared by the input preparers.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::InputError;

/// Read and parse a JSON file
pub fn read_json(path: &Path) -> Result<Value, InputError> {
    let file = fs::File::open(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| InputError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize `value` and replace `path` with it
///
/// The record is written to a sibling temporary file first and renamed over the
/// target, so readers never observe a partially written file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), InputError> {
    let bytes = serde_json::to_vec(value).map_err(|source| InputError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| InputError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let tmp_path = temporary_sibling(path);
    fs::write(&tmp_path, &bytes).map_err(|source| InputError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    if let Err(source) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(InputError::Io {
            path: path.to_path_buf(),
            source,
        });
    }

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Hidden file next to `path` that receives content before it replaces `path`
pub fn temporary_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.tmp"))
}
