// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Labelgate: Job dispatch, printer state tracking and delivery.
//
// Jobs enter through `PrintService`, wait in the single `DispatchQueue`, and
// leave through one of three transports: a local printer driver, a raw TCP
// socket, or the host spooler.  `TargetTracker` keeps per-printer busy/idle
// state so jobs for the same printer never overlap.

pub mod connectivity;
pub mod dispatch;
pub mod downloader;
pub mod janitor;
pub mod maintenance;
pub mod service;
pub mod temp;
pub mod tracker;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{DispatchQueue, JobTicket};
pub use downloader::Downloader;
pub use janitor::{SweepReport, sweep_once};
pub use maintenance::Maintenance;
pub use service::{IpPayload, PrintService};
pub use temp::TempStore;
pub use tracker::{SharedTracker, TargetTracker};
pub use transport::{Delivery, Receipt, Transport, Transports};
