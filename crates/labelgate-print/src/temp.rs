// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Working directory for temporary print artifacts.
//
// Uploads, downloaded PDFs and spooled label files all land here.  Every file
// name carries a millisecond timestamp and a random suffix so concurrent
// requests never collide.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use labelgate_core::error::{LabelgateError, Result};

/// Owner of the temp artifact directory.
#[derive(Debug, Clone)]
pub struct TempStore {
    dir: PathBuf,
}

impl TempStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            LabelgateError::Resource(format!("create temp dir {}: {e}", self.dir.display()))
        })
    }

    /// A fresh, unused path inside the directory.  Nothing is created.
    pub fn artifact_path(&self, prefix: &str, extension: &str) -> PathBuf {
        let suffix = Uuid::new_v4().simple().to_string();
        self.dir.join(format!(
            "{prefix}-{}-{}.{extension}",
            Utc::now().timestamp_millis(),
            &suffix[..8]
        ))
    }

    /// Write `bytes` to a new artifact and return its path.
    pub async fn write(&self, prefix: &str, extension: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.ensure_dir().await?;
        let path = self.artifact_path(prefix, extension);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            LabelgateError::Resource(format!("write {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "temp artifact written");
        Ok(path)
    }
}

/// Delete an artifact, tolerating one that is already gone.
///
/// Cleanup never fails a job, so errors are only logged.
pub async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "temp artifact removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove temp artifact"),
    }
}
