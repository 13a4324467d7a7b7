// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution and `config.json` persistence.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use labelgate_core::config::AgentConfig;
use labelgate_core::error::Result;

const CONFIG_FILE: &str = "config.json";

/// The application data directory (`$XDG_DATA_HOME/labelgate`, else
/// `~/.local/share/labelgate`).
pub fn data_dir() -> PathBuf {
    dirs_fallback().join("labelgate")
}

fn dirs_fallback() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    if let Ok(appdata) = std::env::var("APPDATA") {
        return PathBuf::from(appdata);
    }
    std::env::temp_dir()
}

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    data_dir().join(CONFIG_FILE)
}

/// Load the config file at `path`, falling back to defaults when it is
/// missing or unreadable.  Environment overrides are not applied here.
pub fn load_config(path: &Path) -> AgentConfig {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no config file, using defaults");
            return AgentConfig::default();
        }
    };
    match serde_json::from_str(&data) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config file is invalid, using defaults");
            AgentConfig::default()
        }
    }
}

/// Write `config` to `path` as pretty JSON, creating parent directories.
pub fn persist_config(path: &Path, config: &AgentConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}
