// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print service: the one object a front end talks to.
//
// Created once at startup and passed around by reference.  Every entry point
// validates its input before anything is written, downloaded or queued, so a
// validation error never leaves work behind.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use labelgate_bridge::PlatformBridge;
use labelgate_core::config::AgentConfig;
use labelgate_core::error::{LabelgateError, Result};
use labelgate_core::types::{
    ConnectivityReport, JobKind, JobResult, PrinterInfo, RawPayload, SpoolTarget, TargetKey,
    TargetSnapshot,
};

use crate::connectivity;
use crate::dispatch::DispatchQueue;
use crate::downloader::{Downloader, parse_url};
use crate::maintenance::Maintenance;
use crate::temp::TempStore;
use crate::tracker::{SharedTracker, match_printer};
use crate::transport::{
    LocalDriverTransport, RawSocketTransport, SpoolTransport, Transports, pick_label_printer,
};

/// Leading bytes of every PDF file.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Timeout for the connectivity probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// What to push to a raw printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpPayload {
    /// Label markup.
    Zpl(String),
    /// A remote PDF, downloaded first.
    Url(String),
    /// Printer-native bytes supplied by the caller.
    Bytes(Vec<u8>),
}

/// Facade over the dispatch queue, tracker, downloader and transports.
pub struct PrintService {
    config: AgentConfig,
    bridge: Arc<dyn PlatformBridge>,
    tracker: SharedTracker,
    queue: DispatchQueue,
    downloader: Downloader,
    temp: TempStore,
}

impl PrintService {
    /// Build the service with the real transports.  Must be called inside a
    /// Tokio runtime: the dispatch task is spawned here.
    pub fn new(config: AgentConfig, bridge: Arc<dyn PlatformBridge>) -> Result<Self> {
        let temp = TempStore::new(config.temp_dir());
        let transports = Transports {
            local: Arc::new(LocalDriverTransport::new(Arc::clone(&bridge))),
            raw: Arc::new(RawSocketTransport::new(
                config.transport.raw_port,
                config.transport.socket_timeout(),
            )),
            spool: Arc::new(SpoolTransport::new(
                Arc::clone(&bridge),
                temp.clone(),
                config.transport.spool_timeout(false),
                config.transport.spool_timeout(true),
            )),
        };
        Self::with_transports(config, bridge, transports)
    }

    /// Build the service around an explicit transport set.
    pub fn with_transports(
        config: AgentConfig,
        bridge: Arc<dyn PlatformBridge>,
        transports: Transports,
    ) -> Result<Self> {
        let temp = TempStore::new(config.temp_dir());
        let downloader = Downloader::new(temp.clone(), &config.download)?;
        let tracker = SharedTracker::new();
        let queue = DispatchQueue::spawn(config.dispatch.clone(), tracker.clone(), transports);

        info!(
            platform = bridge.platform_name(),
            temp_dir = %temp.dir().display(),
            raw_port = config.transport.raw_port,
            "print service ready"
        );

        Ok(Self {
            config,
            bridge,
            tracker,
            queue,
            downloader,
            temp,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    pub fn tracker(&self) -> &SharedTracker {
        &self.tracker
    }

    // -- Submission --

    /// Print an uploaded PDF on a local driver.
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn submit_local_job(
        &self,
        bytes: &[u8],
        printer_name: Option<String>,
    ) -> Result<JobResult> {
        if bytes.is_empty() {
            return Err(LabelgateError::Validation("no file uploaded".into()));
        }
        if bytes.len() as u64 > self.config.max_upload_bytes {
            return Err(LabelgateError::Validation(format!(
                "upload of {} bytes exceeds the {} byte limit",
                bytes.len(),
                self.config.max_upload_bytes
            )));
        }
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(LabelgateError::Validation("only PDF files are accepted".into()));
        }

        let printer = self.local_printer(printer_name).await?;
        let path = self.temp.write("print-job", "pdf", bytes).await?;
        self.queue
            .submit(JobKind::LocalFile {
                path,
                printer_name: Some(printer),
            })
            .await
    }

    /// Download a PDF and print it on a local driver.
    #[instrument(skip(self))]
    pub async fn submit_url_job(&self, url: &str, printer_name: Option<String>) -> Result<JobResult> {
        parse_url(url)?;
        let printer = self.local_printer(printer_name).await?;
        let path = self.downloader.download(url).await?;
        self.queue
            .submit(JobKind::LocalFile {
                path,
                printer_name: Some(printer),
            })
            .await
    }

    /// Push bytes to a raw network printer.  `ip` falls back to the
    /// configured default printer.
    #[instrument(skip(self, payload))]
    pub async fn submit_ip_job(
        &self,
        ip: Option<&str>,
        port: Option<u16>,
        payload: IpPayload,
    ) -> Result<JobResult> {
        let ip = self.target_ip(ip)?;
        validate_port(port)?;

        let payload = match payload {
            IpPayload::Zpl(zpl) => {
                if zpl.trim().is_empty() {
                    return Err(LabelgateError::Validation("zpl is required".into()));
                }
                RawPayload::Zpl(zpl.into_bytes())
            }
            IpPayload::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(LabelgateError::Validation("payload is empty".into()));
                }
                RawPayload::Zpl(bytes)
            }
            IpPayload::Url(url) => {
                parse_url(&url)?;
                RawPayload::File(self.downloader.download(&url).await?)
            }
        };

        self.queue
            .submit(JobKind::RemoteIp { ip, port, payload })
            .await
    }

    /// Spool label markup to an OS queue or share.
    #[instrument(skip(self, zpl), fields(zpl_len = zpl.len()))]
    pub async fn submit_shared_zpl_job(
        &self,
        zpl: &str,
        printer_name: Option<String>,
        share_path: Option<String>,
    ) -> Result<JobResult> {
        if zpl.trim().is_empty() {
            return Err(LabelgateError::Validation("zpl is required".into()));
        }
        let target = spool_target(printer_name, share_path)?;
        self.queue
            .submit(JobKind::SpooledZpl {
                target,
                zpl: zpl.to_string(),
            })
            .await
    }

    /// Download a PDF and spool it to an OS queue or share.
    #[instrument(skip(self))]
    pub async fn submit_shared_pdf_job(
        &self,
        url: &str,
        printer_name: Option<String>,
        share_path: Option<String>,
    ) -> Result<JobResult> {
        let target = spool_target(printer_name, share_path)?;
        parse_url(url)?;
        let file_path = self.downloader.download(url).await?;
        self.queue
            .submit(JobKind::SpooledPdf { target, file_path })
            .await
    }

    // -- State --

    pub fn state(&self, key: &str) -> TargetSnapshot {
        self.tracker.with(|t| t.snapshot(&TargetKey::new(key)))
    }

    pub fn all_states(&self) -> BTreeMap<TargetKey, TargetSnapshot> {
        self.tracker.with(|t| t.snapshots())
    }

    /// Like `state`, but a key the tracker has never seen is looked up among
    /// the installed printers and, if one matches, registered as idle under
    /// the key as given.
    #[instrument(skip(self))]
    pub async fn resolve_state(&self, key: &str) -> Result<TargetSnapshot> {
        let snapshot = self.state(key);
        if snapshot != TargetSnapshot::Unknown {
            return Ok(snapshot);
        }

        let printers = self.bridge.list_printers().await?;
        match match_printer(key, &printers) {
            Some(printer) => {
                debug!(key, printer = %printer.name, "seeding tracker from enumeration");
                Ok(self.tracker.with(|t| t.seed_idle(&TargetKey::new(key))))
            }
            None => Ok(TargetSnapshot::Unknown),
        }
    }

    /// Fail fast with `TargetBusy` if `key` is running a job.
    pub fn ensure_idle(&self, key: &str) -> Result<()> {
        match self.state(key) {
            TargetSnapshot::Busy(info) => Err(LabelgateError::TargetBusy(format!(
                "{key} is printing job {} ({}s)",
                info.job_id, info.elapsed_secs
            ))),
            _ => Ok(()),
        }
    }

    // -- Diagnostics --

    /// TCP reachability of a raw printer, without sending anything.
    pub async fn check_connectivity(
        &self,
        ip: Option<&str>,
        port: Option<u16>,
    ) -> Result<ConnectivityReport> {
        let ip = self.target_ip(ip)?;
        validate_port(port)?;
        let port = port.unwrap_or(self.config.transport.raw_port);
        Ok(connectivity::check_connectivity(ip, port, PROBE_TIMEOUT).await)
    }

    pub async fn printers(&self) -> Result<Vec<PrinterInfo>> {
        self.bridge.list_printers().await
    }

    /// The printer local jobs without an explicit name would go to.
    pub async fn find_label_printer(&self) -> Result<Option<PrinterInfo>> {
        let printers = self.bridge.list_printers().await?;
        Ok(pick_label_printer(&printers).cloned())
    }

    /// Name local jobs are tracked and printed under: the explicit printer,
    /// else the label-printer heuristic over the installed printers.
    async fn local_printer(&self, printer_name: Option<String>) -> Result<String> {
        if let Some(name) = non_blank(printer_name) {
            return Ok(name);
        }
        let printer = self.find_label_printer().await?.ok_or_else(|| {
            LabelgateError::NoPrinterFound("no printers are installed on this host".into())
        })?;
        debug!(printer = %printer.name, "local job routed to detected printer");
        Ok(printer.name)
    }

    /// Start the janitor and the staleness sweep.
    pub fn start_maintenance(&self) -> Maintenance {
        Maintenance::start(
            self.temp.dir().to_path_buf(),
            &self.config.janitor,
            self.tracker.clone(),
            &self.config.tracker,
        )
    }

    fn target_ip(&self, ip: Option<&str>) -> Result<Ipv4Addr> {
        match ip.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => parse_ip(raw),
            None => self.config.default_printer_ip.ok_or_else(|| {
                LabelgateError::Validation("no printer IP given and no default configured".into())
            }),
        }
    }
}

/// Parse a dotted-quad IPv4 address.
pub fn parse_ip(raw: &str) -> Result<Ipv4Addr> {
    raw.parse::<Ipv4Addr>()
        .map_err(|_| LabelgateError::Validation(format!("invalid IP address {raw:?}")))
}

fn validate_port(port: Option<u16>) -> Result<()> {
    match port {
        Some(0) => Err(LabelgateError::Validation("port must be 1-65535".into())),
        _ => Ok(()),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn spool_target(printer_name: Option<String>, share_path: Option<String>) -> Result<SpoolTarget> {
    let target = SpoolTarget {
        printer_name: non_blank(printer_name),
        share_path: non_blank(share_path),
    };
    if target.key().is_none() {
        return Err(LabelgateError::Validation(
            "a printer name or share path is required".into(),
        ));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBridge, FakeTransport, serve_once};
    use labelgate_bridge::Platform;
    use labelgate_core::error::ErrorClass;
    use labelgate_core::types::{JobId, PrintMode};
    use std::path::Path;

    struct Harness {
        service: PrintService,
        transport: Arc<FakeTransport>,
        _dir: tempfile::TempDir,
    }

    fn harness(printers: &[&str]) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AgentConfig {
            temp_dir: Some(dir.path().join("jobs")),
            default_printer_ip: Some(Ipv4Addr::new(192, 168, 1, 50)),
            ..AgentConfig::default()
        };
        let transport = Arc::new(FakeTransport::new(vec![]));
        let transports = Transports {
            local: transport.clone(),
            raw: transport.clone(),
            spool: transport.clone(),
        };
        let bridge = Arc::new(FakeBridge::new(Platform::Posix, printers));
        let service =
            PrintService::with_transports(config, bridge, transports).expect("service");
        Harness {
            service,
            transport,
            _dir: dir,
        }
    }

    fn temp_is_empty(service: &PrintService) -> bool {
        let dir: &Path = service.temp.dir();
        std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[tokio::test]
    async fn local_upload_rejects_non_pdf_before_queueing() {
        let h = harness(&[]);
        let err = h
            .service
            .submit_local_job(b"GIF89a", None)
            .await
            .expect_err("not a pdf");
        assert_eq!(err.class(), ErrorClass::Validation);
        assert!(h.transport.calls().is_empty());
        assert!(temp_is_empty(&h.service));
    }

    #[tokio::test]
    async fn local_upload_rejects_oversized_files() {
        let h = harness(&[]);
        let mut bytes = b"%PDF-1.4".to_vec();
        bytes.resize(10 * 1024 * 1024 + 1, b' ');
        let err = h
            .service
            .submit_local_job(&bytes, None)
            .await
            .expect_err("too big");
        assert_eq!(err.class().http_status(), 400);
    }

    #[tokio::test]
    async fn local_upload_prints_and_cleans_up() {
        let h = harness(&[]);
        let result = h
            .service
            .submit_local_job(b"%PDF-1.4 label", Some("Zebra".into()))
            .await
            .expect("printed");
        assert!(result.success);
        assert_eq!(result.mode, PrintMode::Local);
        assert_eq!(h.transport.calls(), vec![result.job_id]);
        assert!(temp_is_empty(&h.service));
        assert_eq!(h.service.state("Zebra").status(), "idle");
    }

    #[tokio::test]
    async fn unnamed_local_job_is_tracked_under_detected_printer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AgentConfig {
            temp_dir: Some(dir.path().join("jobs")),
            ..AgentConfig::default()
        };
        let bridge = Arc::new(FakeBridge::new(
            Platform::Posix,
            &["Office Laser", "ZDesigner GK420t"],
        ));
        let service = PrintService::new(config, bridge).expect("service");

        let result = service
            .submit_local_job(b"%PDF-1.4 label", None)
            .await
            .expect("printed");
        assert_eq!(result.target, "ZDesigner GK420t");
        assert_eq!(service.state(&result.target).status(), "idle");
        assert!(
            service
                .all_states()
                .keys()
                .all(|key| !key.as_str().is_empty())
        );
    }

    #[tokio::test]
    async fn unnamed_local_job_without_printers_is_rejected_early() {
        let h = harness(&[]);
        let err = h
            .service
            .submit_local_job(b"%PDF-1.4 label", None)
            .await
            .expect_err("no printers");
        assert!(matches!(err, LabelgateError::NoPrinterFound(_)));
        assert!(h.transport.calls().is_empty());
        assert!(temp_is_empty(&h.service));
    }

    #[tokio::test]
    async fn ip_job_validates_address_and_port() {
        let h = harness(&[]);
        let err = h
            .service
            .submit_ip_job(Some("999.1.1.1"), None, IpPayload::Zpl("^XA^XZ".into()))
            .await
            .expect_err("bad ip");
        assert!(matches!(err, LabelgateError::Validation(_)));

        let err = h
            .service
            .submit_ip_job(Some("10.0.0.5"), Some(0), IpPayload::Zpl("^XA^XZ".into()))
            .await
            .expect_err("bad port");
        assert!(matches!(err, LabelgateError::Validation(_)));

        let err = h
            .service
            .submit_ip_job(Some("10.0.0.5"), None, IpPayload::Zpl("   ".into()))
            .await
            .expect_err("empty zpl");
        assert!(matches!(err, LabelgateError::Validation(_)));
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn ip_job_falls_back_to_default_printer() {
        let h = harness(&[]);
        let result = h
            .service
            .submit_ip_job(None, None, IpPayload::Zpl("^XA^XZ".into()))
            .await
            .expect("printed");
        assert_eq!(result.mode, PrintMode::Ip);
        assert_eq!(h.service.state("192.168.1.50").status(), "idle");
    }

    #[tokio::test(start_paused = true)]
    async fn busy_ip_target_queues_instead_of_rejecting() {
        let h = harness(&[]);
        let key = TargetKey::new("10.0.0.5");
        h.service.tracker().with(|t| t.mark_busy(&key, JobId::new()));
        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(
            h.service.ensure_idle("10.0.0.5").expect_err("busy").class(),
            ErrorClass::ConflictBusy
        );

        let service = Arc::new(h.service);
        let submitter = Arc::clone(&service);
        let pending = tokio::spawn(async move {
            submitter
                .submit_ip_job(Some("10.0.0.5"), None, IpPayload::Zpl("^XA^XZ".into()))
                .await
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!pending.is_finished());
        assert!(h.transport.calls().is_empty());

        service
            .tracker()
            .with(|t| t.mark_idle(&key, &labelgate_core::types::JobOutcome::Succeeded));
        let result = pending.await.expect("join").expect("printed");
        assert!(result.success);
    }

    #[tokio::test]
    async fn url_job_404_leaves_no_file() {
        let h = harness(&[]);
        let base = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
        )
        .await;

        let err = h
            .service
            .submit_url_job(&format!("{base}/doc.pdf"), Some("Zebra".into()))
            .await
            .expect_err("404");
        assert!(err.to_string().contains("404"));
        assert!(h.transport.calls().is_empty());
        assert!(temp_is_empty(&h.service));
    }

    #[tokio::test]
    async fn shared_jobs_need_a_destination() {
        let h = harness(&[]);
        let err = h
            .service
            .submit_shared_zpl_job("^XA^XZ", None, Some(" ".into()))
            .await
            .expect_err("no target");
        assert!(matches!(err, LabelgateError::Validation(_)));

        let err = h
            .service
            .submit_shared_pdf_job("https://example.com/doc.pdf", None, None)
            .await
            .expect_err("no target");
        assert!(matches!(err, LabelgateError::Validation(_)));
    }

    #[tokio::test]
    async fn shared_zpl_is_tracked_by_printer_name() {
        let h = harness(&[]);
        let result = h
            .service
            .submit_shared_zpl_job("^XA^XZ", Some("ZDesigner".into()), None)
            .await
            .expect("spooled");
        assert_eq!(result.mode, PrintMode::Shared);
        assert!(h.service.all_states().contains_key(&TargetKey::new("ZDesigner")));
    }

    #[tokio::test]
    async fn resolve_state_seeds_matching_printers() {
        let h = harness(&["ZDesigner Zebra GK420t", "Office Laser"]);

        let snapshot = h.service.resolve_state("zebra").await.expect("resolve");
        assert_eq!(snapshot.status(), "idle");
        assert_eq!(h.service.state("zebra").status(), "idle");

        let snapshot = h.service.resolve_state("Brother").await.expect("resolve");
        assert_eq!(snapshot, TargetSnapshot::Unknown);
        assert_eq!(h.service.state("Brother"), TargetSnapshot::Unknown);
    }

    #[tokio::test]
    async fn label_printer_lookup_uses_heuristic() {
        let h = harness(&["Office Laser", "ZDesigner GK420t"]);
        let printer = h.service.find_label_printer().await.expect("lookup");
        assert_eq!(printer.map(|p| p.name), Some("ZDesigner GK420t".to_string()));
        assert_eq!(h.service.printers().await.expect("list").len(), 2);
    }
}
