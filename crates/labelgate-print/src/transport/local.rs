// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local-driver transport: hand a file to an installed printer driver.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use labelgate_bridge::{DriverPrintOptions, PlatformBridge};
use labelgate_core::error::{LabelgateError, Result};
use labelgate_core::types::PrinterInfo;

use super::{Artifact, Delivery, Receipt, Target, Transport};
use crate::temp::remove_artifact;

/// Substrings that mark a printer as a label printer, strongest first.
const LABEL_HINTS: [&str; 4] = ["zebra", "zdesigner", "label", "zpl"];

/// Pick the most likely label printer from an enumeration.
///
/// Hints are tried in order against the name and display name
/// (case-insensitive); the first enumerated printer is the last resort.
pub fn pick_label_printer(printers: &[PrinterInfo]) -> Option<&PrinterInfo> {
    LABEL_HINTS
        .iter()
        .find_map(|hint| {
            printers.iter().find(|p| {
                p.name.to_lowercase().contains(hint)
                    || p.display_name.to_lowercase().contains(hint)
            })
        })
        .or_else(|| printers.first())
}

/// Prints documents through the host's printer drivers.
pub struct LocalDriverTransport {
    bridge: Arc<dyn PlatformBridge>,
    options: DriverPrintOptions,
}

impl LocalDriverTransport {
    pub fn new(bridge: Arc<dyn PlatformBridge>) -> Self {
        Self {
            bridge,
            options: DriverPrintOptions::default(),
        }
    }

    async fn resolve_printer(&self, requested: Option<String>) -> Result<String> {
        if let Some(name) = requested.filter(|n| !n.trim().is_empty()) {
            return Ok(name);
        }
        let printers = self.bridge.list_printers().await?;
        pick_label_printer(&printers)
            .map(|p| p.name.clone())
            .ok_or_else(|| {
                LabelgateError::NoPrinterFound("no printers are installed on this host".into())
            })
    }
}

#[async_trait]
impl Transport for LocalDriverTransport {
    fn name(&self) -> &'static str {
        "local-driver"
    }

    async fn submit(&self, delivery: Delivery) -> Result<Receipt> {
        let Artifact::File(path) = delivery.artifact else {
            return Err(LabelgateError::Validation(
                "driver printing needs a file".into(),
            ));
        };
        let Target::Driver(requested) = delivery.target else {
            remove_artifact(&path).await;
            return Err(LabelgateError::Validation(
                "local driver transport got a non-driver target".into(),
            ));
        };

        let result = match self.resolve_printer(requested).await {
            Ok(printer) => self
                .bridge
                .print_file(&path, &printer, &self.options)
                .await
                .map(|()| printer),
            Err(e) => Err(e),
        };

        // The source file goes away whatever happened.
        remove_artifact(&path).await;

        match result {
            Ok(printer) => {
                info!(job_id = %delivery.job_id, printer = %printer, "printed via local driver");
                Ok(Receipt {
                    reference: delivery.job_id.to_string(),
                    target: printer,
                })
            }
            Err(e) => {
                warn!(job_id = %delivery.job_id, error = %e, "local driver print failed");
                Err(e)
            }
        }
    }
}
