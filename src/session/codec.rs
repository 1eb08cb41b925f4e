//! Portable session strings.
//!
//! A linked device's credentials are whatever files the protocol client left
//! in its auth directory (for the SQLite store: the database plus any WAL
//! side files). To hand them to a user as a single pasteable value they are
//! packed as:
//!
//! ```text
//! base64( JSON { "<file name>": "<base64 file bytes>", ... } )
//! ```
//!
//! Only regular files directly inside the directory are included; keys are
//! sorted so that the same directory always yields the same string.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CodecError;

/// Pack every regular file directly under `dir` into a session string.
pub fn encode_auth_dir(dir: &Path) -> Result<String, CodecError> {
    let read_err = |path: &Path, e: std::io::Error| CodecError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let mut files = BTreeMap::new();
    for entry in fs::read_dir(dir).map_err(|e| read_err(dir, e))? {
        let entry = entry.map_err(|e| read_err(dir, e))?;
        let path = entry.path();

        let file_type = entry.file_type().map_err(|e| read_err(&path, e))?;
        if !file_type.is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            // Non UTF-8 names can't be JSON keys
            continue;
        };

        let bytes = fs::read(&path).map_err(|e| read_err(&path, e))?;
        files.insert(name, STANDARD.encode(bytes));
    }

    let json = serde_json::to_vec(&files).map_err(|e| CodecError::Json(e.to_string()))?;
    Ok(STANDARD.encode(json))
}

/// Unpack a session string into file names and contents.
pub fn decode_session_string(session: &str) -> Result<BTreeMap<String, Vec<u8>>, CodecError> {
    let json = STANDARD
        .decode(session.trim())
        .map_err(|e| CodecError::Base64(e.to_string()))?;

    let encoded: BTreeMap<String, String> =
        serde_json::from_slice(&json).map_err(|e| CodecError::Json(e.to_string()))?;

    encoded
        .into_iter()
        .map(|(name, content)| {
            if !is_safe_file_name(&name) {
                return Err(CodecError::UnsafeName(name));
            }
            let bytes = STANDARD
                .decode(content)
                .map_err(|e| CodecError::Base64(format!("{}: {}", name, e)))?;
            Ok((name, bytes))
        })
        .collect()
}

/// Write the files of a session string into `dir`, creating it if needed.
///
/// Returns the written paths in name order.
pub fn restore_auth_dir(session: &str, dir: &Path) -> Result<Vec<PathBuf>, CodecError> {
    let files = decode_session_string(session)?;

    let write_err = |path: &Path, e: std::io::Error| CodecError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    fs::create_dir_all(dir).map_err(|e| write_err(dir, e))?;

    let mut written = Vec::with_capacity(files.len());
    for (name, bytes) in files {
        let path = dir.join(name);
        fs::write(&path, bytes).map_err(|e| write_err(&path, e))?;
        written.push(path);
    }

    Ok(written)
}

fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}
