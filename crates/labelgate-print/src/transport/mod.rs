// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transport strategies: the three ways a job reaches paper.
//
// Every strategy takes a `Delivery` and either returns a `Receipt` or the
// error that stopped it.  None of them retries, and none of them swallows an
// error; retrying a busy target is the dispatch queue's business.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use labelgate_core::error::Result;
use labelgate_core::types::{JobId, JobKind, RawPayload, SpoolTarget};

pub mod local;
pub mod raw;
pub mod spool;

pub use local::{LocalDriverTransport, pick_label_printer};
pub use raw::RawSocketTransport;
pub use spool::SpoolTransport;

/// Where a delivery goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// An installed printer driver; `None` lets the transport pick one.
    Driver(Option<String>),
    /// A raw TCP endpoint; `None` uses the configured raw port.
    Socket { ip: Ipv4Addr, port: Option<u16> },
    /// An OS queue or network share.
    Spool(SpoolTarget),
}

/// What is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Printer-native bytes held in memory (label markup).
    Bytes(Vec<u8>),
    /// A document on disk, owned by the job.
    File(PathBuf),
}

/// One transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub job_id: JobId,
    pub target: Target,
    pub artifact: Artifact,
}

impl Delivery {
    /// Build the delivery for a queued job.
    pub fn for_job(job_id: JobId, kind: JobKind) -> Self {
        let (target, artifact) = match kind {
            JobKind::LocalFile { path, printer_name } => {
                (Target::Driver(printer_name), Artifact::File(path))
            }
            JobKind::RemoteIp { ip, port, payload } => {
                let artifact = match payload {
                    RawPayload::Zpl(bytes) => Artifact::Bytes(bytes),
                    RawPayload::File(path) => Artifact::File(path),
                };
                (Target::Socket { ip, port }, artifact)
            }
            JobKind::SpooledZpl { target, zpl } => {
                (Target::Spool(target), Artifact::Bytes(zpl.into_bytes()))
            }
            JobKind::SpooledPdf { target, file_path } => {
                (Target::Spool(target), Artifact::File(file_path))
            }
        };
        Self {
            job_id,
            target,
            artifact,
        }
    }
}

/// Proof that a transport accepted a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Opaque identifier (the job id unless the transport has a better one).
    pub reference: String,
    /// Resolved destination name, e.g. the printer a heuristic picked.
    pub target: String,
}

/// A delivery strategy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn submit(&self, delivery: Delivery) -> Result<Receipt>;
}

/// The strategy set the dispatch queue routes to.
#[derive(Clone)]
pub struct Transports {
    pub local: Arc<dyn Transport>,
    pub raw: Arc<dyn Transport>,
    pub spool: Arc<dyn Transport>,
}

impl Transports {
    /// Strategy responsible for `kind`.
    pub fn route(&self, kind: &JobKind) -> &Arc<dyn Transport> {
        match kind {
            JobKind::LocalFile { .. } => &self.local,
            JobKind::RemoteIp { .. } => &self.raw,
            JobKind::SpooledZpl { .. } | JobKind::SpooledPdf { .. } => &self.spool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spooled_zpl_becomes_bytes() {
        let target = SpoolTarget {
            printer_name: Some("Zebra".into()),
            share_path: None,
        };
        let delivery = Delivery::for_job(
            JobId::new(),
            JobKind::SpooledZpl {
                target: target.clone(),
                zpl: "^XA^XZ".into(),
            },
        );
        assert_eq!(delivery.target, Target::Spool(target));
        assert_eq!(delivery.artifact, Artifact::Bytes(b"^XA^XZ".to_vec()));
    }

    #[test]
    fn downloaded_pdf_for_ip_stays_on_disk() {
        let delivery = Delivery::for_job(
            JobId::new(),
            JobKind::RemoteIp {
                ip: Ipv4Addr::new(10, 0, 0, 5),
                port: Some(6101),
                payload: RawPayload::File(PathBuf::from("/tmp/doc.pdf")),
            },
        );
        assert_eq!(
            delivery.target,
            Target::Socket {
                ip: Ipv4Addr::new(10, 0, 0, 5),
                port: Some(6101)
            }
        );
        assert_eq!(delivery.artifact, Artifact::File(PathBuf::from("/tmp/doc.pdf")));
    }
}
