// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Labelgate: Host OS bridge abstractions.
//
// The dispatch core never calls the operating system directly.  Printer
// enumeration, "print this file on that driver" and shell command execution
// all go through the traits in `traits`, so the core can be driven by fakes
// in tests and by `SystemBridge` in production.

use std::path::PathBuf;
use std::sync::Arc;

pub mod system;
pub mod traits;

pub use system::SystemBridge;
pub use traits::{
    CommandOutput, CommandRunner, CommandSpec, DriverPrint, DriverPrintOptions, Platform,
    PlatformBridge, PrinterEnumerator,
};

/// Bridge implementation for the operating system we are running on.
pub fn platform_bridge(sumatra_path: Option<PathBuf>) -> Arc<dyn PlatformBridge> {
    Arc::new(SystemBridge::new(Platform::current(), sumatra_path))
}
