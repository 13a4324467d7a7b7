// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for the OS facilities the print core
// depends on.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use labelgate_core::error::Result;
use labelgate_core::types::PrinterInfo;

/// Host print subsystem flavour.  Decides how spool commands are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Windows print spooler, UNC shares, PowerShell.
    Windows,
    /// CUPS / lp on Linux and macOS.
    Posix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }
}

/// Unified bridge grouping every OS capability the core needs.
pub trait PlatformBridge: PrinterEnumerator + DriverPrint + CommandRunner {
    /// Human-readable platform name.
    fn platform_name(&self) -> &str;

    fn platform(&self) -> Platform;
}

/// List the printers installed on this host.
#[async_trait]
pub trait PrinterEnumerator: Send + Sync {
    async fn list_printers(&self) -> Result<Vec<PrinterInfo>>;
}

/// Options passed to the driver print call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverPrintOptions {
    /// Print at 100% instead of fitting to the page.
    pub no_scale: bool,
    /// Never show a dialog.
    pub silent: bool,
}

impl Default for DriverPrintOptions {
    fn default() -> Self {
        Self {
            no_scale: true,
            silent: true,
        }
    }
}

/// Hand a document to an installed printer driver.
#[async_trait]
pub trait DriverPrint: Send + Sync {
    async fn print_file(
        &self,
        path: &Path,
        printer_name: &str,
        options: &DriverPrintOptions,
    ) -> Result<()>;
}

/// A program invocation, kept as argv so nothing passes through a shell
/// parser unless the program itself is a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured output of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run external commands.
///
/// Implementations must fail with `LabelgateError::Timeout` when the command
/// outlives `timeout`, and with `LabelgateError::Transport` on a non-zero
/// exit status (carrying stderr in the message).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &CommandSpec, timeout: Duration) -> Result<CommandOutput>;
}
