// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Labelgate.
//
// Every error is local to the job that produced it.  The boundary layer maps
// an error to a response through `ErrorClass`, so the taxonomy here mirrors
// the classes a caller needs to tell apart: bad input, a busy target, a
// timeout, a transport failure, and a local resource problem.

use thiserror::Error;

/// Top-level error type for all Labelgate operations.
#[derive(Debug, Error)]
pub enum LabelgateError {
    // -- Caller errors --
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("printer busy: {0}")]
    TargetBusy(String),

    // -- Delivery errors --
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("no printer found: {0}")]
    NoPrinterFound(String),

    // -- Local resources --
    #[error("resource error: {0}")]
    Resource(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),

    #[error("dispatch queue is shut down")]
    QueueClosed,
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LabelgateError>;

/// Coarse classification of an error for the boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input, never enqueued.
    Validation,
    /// Target is processing another job; the caller should try later.
    ConflictBusy,
    /// A download, transport call or job deadline ran out.
    Timeout,
    /// The printer, driver or remote origin refused or failed.
    Transport,
    /// Disk or artifact problem local to this host.
    Resource,
    /// Anything else.
    Internal,
}

impl ErrorClass {
    /// HTTP status a web front end would answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::ConflictBusy => 409,
            Self::Timeout => 504,
            Self::Transport => 502,
            Self::Resource | Self::Internal => 500,
        }
    }
}

impl LabelgateError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Validation,
            Self::TargetBusy(_) => ErrorClass::ConflictBusy,
            Self::Timeout(_) => ErrorClass::Timeout,
            Self::Transport(_) | Self::Download(_) | Self::NoPrinterFound(_) => {
                ErrorClass::Transport
            }
            Self::Resource(_) => ErrorClass::Resource,
            Self::Io(io_err) => match io_err.kind() {
                std::io::ErrorKind::TimedOut => ErrorClass::Timeout,
                std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe => ErrorClass::Transport,
                _ => ErrorClass::Resource,
            },
            Self::Serialization(_) | Self::Bridge(_) | Self::QueueClosed => ErrorClass::Internal,
        }
    }

    /// Whether the dispatch queue should put the job back and try again.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::TargetBusy(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_maps_to_conflict() {
        let err = LabelgateError::TargetBusy("10.0.0.5".into());
        assert_eq!(err.class(), ErrorClass::ConflictBusy);
        assert_eq!(err.class().http_status(), 409);
        assert!(err.is_busy());
    }

    #[test]
    fn download_status_is_transport_failure() {
        let err = LabelgateError::Download("HTTP status 404".into());
        assert_eq!(err.class(), ErrorClass::Transport);
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn io_timeout_is_timeout() {
        let err = LabelgateError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert_eq!(err.class(), ErrorClass::Timeout);
    }

    #[test]
    fn missing_file_is_resource() {
        let err = LabelgateError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.class(), ErrorClass::Resource);
        assert!(!err.is_busy());
    }

    #[test]
    fn validation_is_bad_request() {
        let err = LabelgateError::Validation("port out of range".into());
        assert_eq!(err.class().http_status(), 400);
    }

    #[test]
    fn bridge_and_queue_failures_are_internal() {
        for err in [
            LabelgateError::Bridge("spawn failed".into()),
            LabelgateError::QueueClosed,
        ] {
            assert_eq!(err.class(), ErrorClass::Internal);
            assert_eq!(err.class().http_status(), 500);
        }
    }
}
