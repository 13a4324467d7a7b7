// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spooled/shared transport: submit through the host print subsystem.
//
// Windows copies label markup byte-for-byte onto a printer share
// (`copy /B`) and prints PDFs through the shell `PrintTo` verb.  POSIX hosts
// go through CUPS `lp`, with `-o raw` so label markup is not filtered.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use labelgate_bridge::{CommandSpec, Platform, PlatformBridge};
use labelgate_core::error::{LabelgateError, Result};
use labelgate_core::types::SpoolTarget;

use super::{Artifact, Delivery, Receipt, Target, Transport};
use crate::temp::{TempStore, remove_artifact};

/// Spooler messages that mean "try again later" rather than "broken".
const BUSY_MARKERS: [&str; 4] = [
    "busy",
    "in use",
    "being used by another process",
    "printer is not ready",
];

/// Build the OS command that spools `file` to `target`.
pub fn spool_command(
    platform: Platform,
    target: &SpoolTarget,
    file: &Path,
    pdf: bool,
) -> Result<CommandSpec> {
    let printer = target.printer_name.as_deref().filter(|s| !s.trim().is_empty());
    let share = target.share_path.as_deref().filter(|s| !s.trim().is_empty());
    let file = file.display().to_string();

    match platform {
        Platform::Windows if pdf => {
            let destination = printer.or(share).ok_or_else(no_destination)?;
            let script = format!(
                "Start-Process -FilePath '{}' -Verb PrintTo -ArgumentList '\"{}\"' -WindowStyle Hidden -Wait",
                ps_quote(&file),
                ps_quote(destination)
            );
            Ok(CommandSpec::new("powershell")
                .arg("-NoProfile")
                .arg("-NonInteractive")
                .arg("-Command")
                .arg(script))
        }
        Platform::Windows => {
            let destination = match (share, printer) {
                (Some(share), _) => share.to_string(),
                (None, Some(printer)) => format!(r"\\localhost\{printer}"),
                (None, None) => return Err(no_destination()),
            };
            Ok(CommandSpec::new("cmd")
                .arg("/C")
                .arg("copy")
                .arg("/B")
                .arg(file)
                .arg(destination))
        }
        Platform::Posix => {
            let queue = printer.or(share).ok_or_else(no_destination)?;
            let mut cmd = CommandSpec::new("lp").arg("-d").arg(queue);
            if !pdf {
                cmd = cmd.arg("-o").arg("raw");
            }
            Ok(cmd.arg(file))
        }
    }
}

fn no_destination() -> LabelgateError {
    LabelgateError::Validation("a printer name or share path is required".into())
}

/// Escape for a single-quoted PowerShell string.
fn ps_quote(s: &str) -> String {
    s.replace('\'', "''")
}

/// Turn spooler "busy" failures into `TargetBusy` so the job is retried.
fn classify_spool_error(err: LabelgateError, destination: &str) -> LabelgateError {
    match err {
        LabelgateError::Transport(message) => {
            let lower = message.to_lowercase();
            if BUSY_MARKERS.iter().any(|m| lower.contains(m)) {
                LabelgateError::TargetBusy(format!("{destination}: {message}"))
            } else {
                LabelgateError::Transport(message)
            }
        }
        other => other,
    }
}

/// Spools label markup and PDFs through the host print subsystem.
pub struct SpoolTransport {
    bridge: Arc<dyn PlatformBridge>,
    temp: TempStore,
    zpl_timeout: Duration,
    pdf_timeout: Duration,
}

impl SpoolTransport {
    pub fn new(
        bridge: Arc<dyn PlatformBridge>,
        temp: TempStore,
        zpl_timeout: Duration,
        pdf_timeout: Duration,
    ) -> Self {
        Self {
            bridge,
            temp,
            zpl_timeout,
            pdf_timeout,
        }
    }
}

#[async_trait]
impl Transport for SpoolTransport {
    fn name(&self) -> &'static str {
        "spool"
    }

    async fn submit(&self, delivery: Delivery) -> Result<Receipt> {
        let Target::Spool(target) = delivery.target else {
            return Err(LabelgateError::Validation(
                "spool transport got a non-spool target".into(),
            ));
        };
        let destination = target
            .printer_name
            .clone()
            .or_else(|| target.share_path.clone())
            .unwrap_or_default();

        let (file, pdf): (PathBuf, bool) = match delivery.artifact {
            Artifact::Bytes(bytes) => (self.temp.write("zpl-job", "zpl", &bytes).await?, false),
            Artifact::File(path) => (path, true),
        };

        let result = match spool_command(self.bridge.platform(), &target, &file, pdf) {
            Ok(cmd) => {
                let timeout = if pdf { self.pdf_timeout } else { self.zpl_timeout };
                debug!(job_id = %delivery.job_id, command = %cmd, "spooling");
                self.bridge
                    .run(&cmd, timeout)
                    .await
                    .map(|_| ())
                    .map_err(|e| classify_spool_error(e, &destination))
            }
            Err(e) => Err(e),
        };

        // A busy PDF is kept for the retry; everything else is finished with.
        let keep = pdf && matches!(&result, Err(e) if e.is_busy());
        if !keep {
            remove_artifact(&file).await;
        }

        match result {
            Ok(()) => {
                info!(job_id = %delivery.job_id, target = %destination, pdf, "spooled");
                Ok(Receipt {
                    reference: delivery.job_id.to_string(),
                    target: destination,
                })
            }
            Err(e) => {
                warn!(job_id = %delivery.job_id, target = %destination, error = %e, "spool failed");
                Err(e)
            }
        }
    }
}
