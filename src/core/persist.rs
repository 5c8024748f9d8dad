//! Whole-file JSON persistence
//!
//! Reads are forgiving: a missing, unreadable or malformed file yields `None`
//! and a warning. Writes go to a temporary file in the target directory and
//! are renamed into place, so readers never see a half-written document.
//! The file work runs on the blocking pool.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;

use super::error::{GuardError, GuardResult};

/// Read a JSON document, or `None` if absent or unusable
pub async fn read_json_document(path: &Path) -> Option<Value> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("[Persist] Failed to read {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => {
            tracing::warn!("[Persist] Ignoring {}: not a JSON object", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("[Persist] Ignoring malformed {}: {}", path.display(), e);
            None
        }
    }
}

/// Render a document the way it is stored on disk (2-space indent)
pub fn render_json<T: Serialize>(document: &T) -> GuardResult<String> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// Atomically replace `path` with the JSON rendering of `document`
pub async fn write_json_document<T: Serialize>(path: &Path, document: &T) -> GuardResult<()> {
    let rendered = render_json(document)?;
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_rendered(&target, &rendered))
        .await
        .map_err(|e| GuardError::other(format!("write task for {} failed: {}", path.display(), e)))?
}

fn write_rendered(path: &Path, rendered: &str) -> GuardResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| GuardError::InvalidConfig(format!("{} has no parent", path.display())))?;

    std::fs::create_dir_all(dir).map_err(|e| GuardError::config_write(path, e))?;

    let mut file = NamedTempFile::new_in(dir).map_err(|e| GuardError::config_write(path, e))?;
    file.write_all(rendered.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| GuardError::config_write(path, e))?;
    file.persist(path)
        .map_err(|e| GuardError::config_write(path, e.error))?;

    tracing::debug!("[Persist] Wrote {}", path.display());
    Ok(())
}
