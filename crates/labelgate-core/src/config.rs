// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Agent configuration.
//
// Every timing knob of the dispatch loop lives here instead of in the code
// that uses it.  Durations are stored as plain integers so the JSON file stays
// readable; accessors hand out `Duration`s.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable overriding the default raw TCP port.
pub const ENV_RAW_PORT: &str = "PRINTER_RAW_PORT";

/// Environment variable naming the default raw printer address.
pub const ENV_PRINTER_IP: &str = "PRINTER_IP";

/// Environment variable overriding the working temp directory.
pub const ENV_TEMP_DIR: &str = "LABELGATE_TEMP_DIR";

/// Top-level agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Raw printer used when a caller gives no IP.
    pub default_printer_ip: Option<Ipv4Addr>,
    /// Working directory for temporary artifacts (defaults to the OS temp dir).
    pub temp_dir: Option<PathBuf>,
    /// Largest accepted local upload.
    pub max_upload_bytes: u64,
    pub dispatch: DispatchConfig,
    pub tracker: TrackerConfig,
    pub download: DownloadConfig,
    pub janitor: JanitorConfig,
    pub transport: TransportConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_printer_ip: None,
            temp_dir: None,
            max_upload_bytes: 10 * 1024 * 1024,
            dispatch: DispatchConfig::default(),
            tracker: TrackerConfig::default(),
            download: DownloadConfig::default(),
            janitor: JanitorConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup.  Unparseable values are
    /// ignored and the configured value is kept.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup(ENV_RAW_PORT).and_then(|v| v.trim().parse::<u16>().ok())
            && port != 0
        {
            self.transport.raw_port = port;
        }
        if let Some(ip) = lookup(ENV_PRINTER_IP).and_then(|v| v.trim().parse::<Ipv4Addr>().ok()) {
            self.default_printer_ip = Some(ip);
        }
        if let Some(dir) = lookup(ENV_TEMP_DIR).filter(|v| !v.trim().is_empty()) {
            self.temp_dir = Some(PathBuf::from(dir));
        }
    }

    /// Resolved working directory for temporary artifacts.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("labelgate-jobs"))
    }
}

/// How the dispatch loop treats a busy target at the head of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeadOfLine {
    /// Only the head job is examined; a busy head holds back every job
    /// behind it, whatever its target.
    #[default]
    Strict,
    /// Look past busy heads for the first job whose target is idle and that
    /// has no earlier queued job for the same target.
    SkipBusy,
}

/// Retry delays applied while a head job waits for its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffProfile {
    /// Busy longer than this counts as stalled.
    pub stall_after_secs: u64,
    /// Delay before re-checking a stalled target.
    pub stalled_retry_ms: u64,
    /// Delay before re-checking a normally busy target.
    pub busy_retry_ms: u64,
}

impl BackoffProfile {
    /// Delay to wait given how long the target has been busy.
    pub fn delay_for(&self, busy_for: Duration) -> Duration {
        if busy_for > Duration::from_secs(self.stall_after_secs) {
            Duration::from_millis(self.stalled_retry_ms)
        } else {
            Duration::from_millis(self.busy_retry_ms)
        }
    }
}

/// Dispatch queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Deadline for file, URL, raw and spooled-markup jobs.
    pub job_deadline_secs: u64,
    /// Deadline for spooled PDF jobs.
    pub pdf_job_deadline_secs: u64,
    pub standard_backoff: BackoffProfile,
    pub pdf_backoff: BackoffProfile,
    /// Delay before retrying a job whose transport reported a busy target.
    pub busy_race_retry_ms: u64,
    pub head_of_line: HeadOfLine,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            job_deadline_secs: 120,
            pdf_job_deadline_secs: 180,
            standard_backoff: BackoffProfile {
                stall_after_secs: 30,
                stalled_retry_ms: 5_000,
                busy_retry_ms: 2_000,
            },
            pdf_backoff: BackoffProfile {
                stall_after_secs: 60,
                stalled_retry_ms: 10_000,
                busy_retry_ms: 3_000,
            },
            busy_race_retry_ms: 3_000,
            head_of_line: HeadOfLine::Strict,
        }
    }
}

impl DispatchConfig {
    pub fn deadline(&self, spooled_pdf: bool) -> Duration {
        Duration::from_secs(if spooled_pdf {
            self.pdf_job_deadline_secs
        } else {
            self.job_deadline_secs
        })
    }

    pub fn backoff(&self, spooled_pdf: bool) -> &BackoffProfile {
        if spooled_pdf {
            &self.pdf_backoff
        } else {
            &self.standard_backoff
        }
    }

    pub fn busy_race_retry(&self) -> Duration {
        Duration::from_millis(self.busy_race_retry_ms)
    }
}

/// Staleness sweep settings for the target tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub sweep_interval_secs: u64,
    /// A target busy longer than this is forced back to idle.
    pub stale_after_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            stale_after_secs: 300,
        }
    }
}

impl TrackerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Remote document download limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub max_bytes: u64,
    pub timeout_secs: u64,
    pub max_concurrent: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 15 * 1024 * 1024,
            timeout_secs: 30,
            max_concurrent: 2,
        }
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Temporary-artifact janitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    pub interval_secs: u64,
    pub max_age_secs: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            max_age_secs: 3600,
        }
    }
}

impl JanitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// Transport strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Port used for raw jobs that do not name one (JetDirect).
    pub raw_port: u16,
    /// Connect, write and close timeout for raw sockets.
    pub socket_timeout_secs: u64,
    /// Execution timeout for spooling label markup.
    pub spool_zpl_timeout_secs: u64,
    /// Execution timeout for spooling a PDF.
    pub spool_pdf_timeout_secs: u64,
    /// SumatraPDF executable used for driver printing on Windows.
    pub sumatra_path: Option<PathBuf>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            raw_port: 9100,
            socket_timeout_secs: 30,
            spool_zpl_timeout_secs: 30,
            spool_pdf_timeout_secs: 60,
            sumatra_path: None,
        }
    }
}

impl TransportConfig {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    pub fn spool_timeout(&self, pdf: bool) -> Duration {
        Duration::from_secs(if pdf {
            self.spool_pdf_timeout_secs
        } else {
            self.spool_zpl_timeout_secs
        })
    }
}
