// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Labelgate print agent.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a printing destination for busy tracking.
///
/// A driver name, a dotted-quad IP address, or a spool identifier.  Keys are
/// compared by exact string equality; no case folding or trimming happens
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetKey(String);

impl TargetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<Ipv4Addr> for TargetKey {
    fn from(ip: Ipv4Addr) -> Self {
        Self(ip.to_string())
    }
}

/// A spooled destination: an OS printer queue name and/or a network share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoolTarget {
    pub printer_name: Option<String>,
    pub share_path: Option<String>,
}

impl SpoolTarget {
    /// Tracking key: the printer name when present, else the share path.
    pub fn key(&self) -> Option<TargetKey> {
        self.printer_name
            .as_deref()
            .or(self.share_path.as_deref())
            .map(TargetKey::new)
    }
}

/// Bytes destined for a raw socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPayload {
    /// Label markup held in memory.
    Zpl(Vec<u8>),
    /// A document already written to disk (e.g. a downloaded PDF).
    File(PathBuf),
}

/// Output channel used to deliver a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrintMode {
    /// Locally installed printer driver.
    Local,
    /// Raw TCP socket.
    Ip,
    /// Label markup through the OS spooler or a share.
    Shared,
    /// PDF through the OS spooler or a share.
    PdfShared,
}

impl PrintMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Ip => "ip",
            Self::Shared => "shared",
            Self::PdfShared => "pdf-shared",
        }
    }
}

impl std::fmt::Display for PrintMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a queued job asks for.  Each variant maps to exactly one transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// A file handed to the local printer driver.
    LocalFile {
        path: PathBuf,
        printer_name: Option<String>,
    },
    /// Bytes pushed straight to a network printer.
    RemoteIp {
        ip: Ipv4Addr,
        port: Option<u16>,
        payload: RawPayload,
    },
    /// Label markup submitted through the OS spooler or a share.
    SpooledZpl { target: SpoolTarget, zpl: String },
    /// A PDF submitted through the OS spooler or a share.
    SpooledPdf { target: SpoolTarget, file_path: PathBuf },
}

impl JobKind {
    /// Key used for busy tracking.
    ///
    /// `PrintService` names the printer of a local job before enqueueing it.
    /// An unnamed one is tracked under the empty key.
    pub fn target_key(&self) -> TargetKey {
        match self {
            Self::LocalFile { printer_name, .. } => {
                TargetKey::new(printer_name.clone().unwrap_or_default())
            }
            Self::RemoteIp { ip, .. } => TargetKey::from(*ip),
            Self::SpooledZpl { target, .. } | Self::SpooledPdf { target, .. } => {
                target.key().unwrap_or_else(|| TargetKey::new(""))
            }
        }
    }

    pub fn mode(&self) -> PrintMode {
        match self {
            Self::LocalFile { .. } => PrintMode::Local,
            Self::RemoteIp { .. } => PrintMode::Ip,
            Self::SpooledZpl { .. } => PrintMode::Shared,
            Self::SpooledPdf { .. } => PrintMode::PdfShared,
        }
    }

    /// Spooled PDFs get longer deadlines and slower backoff.
    pub fn is_spooled_pdf(&self) -> bool {
        matches!(self, Self::SpooledPdf { .. })
    }

    /// Temporary file this job owns and must remove when it is finished.
    pub fn artifact(&self) -> Option<&Path> {
        match self {
            Self::LocalFile { path, .. } => Some(path),
            Self::RemoteIp {
                payload: RawPayload::File(path),
                ..
            } => Some(path),
            Self::RemoteIp { .. } | Self::SpooledZpl { .. } => None,
            Self::SpooledPdf { file_path, .. } => Some(file_path),
        }
    }
}

/// Successful completion of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub success: bool,
    pub message: String,
    pub job_id: JobId,
    pub target: String,
    pub mode: PrintMode,
}

/// How a transport call ended, as recorded into target history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
    /// Back to idle without recording success or failure.
    Released,
}

/// History carried by an idle target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleHistory {
    pub last_job_id: Option<JobId>,
    pub last_job_duration_ms: Option<u64>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// A target currently running a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyInfo {
    pub job_id: JobId,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: u64,
}

/// Descriptive view of one target.  Exactly one variant is ever reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TargetSnapshot {
    /// Never seen by this process.
    Unknown,
    Idle(IdleHistory),
    Busy(BusyInfo),
}

impl TargetSnapshot {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Idle(_) => "idle",
            Self::Busy(_) => "busy",
        }
    }
}

/// A printer reported by the OS enumeration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterInfo {
    pub name: String,
    pub display_name: String,
}

impl PrinterInfo {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
        }
    }
}

/// Result of a bare TCP connect probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityReport {
    pub success: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}
