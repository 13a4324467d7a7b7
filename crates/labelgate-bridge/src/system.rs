// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge backed by the real operating system.
//
// Windows: printers come from PowerShell `Get-Printer`, driver printing goes
// through SumatraPDF (`-print-to`, `-print-settings noscale`, `-silent`).
// POSIX: printers come from `lpstat -e`, driver printing is `lp -d`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use labelgate_core::error::{LabelgateError, Result};
use labelgate_core::types::PrinterInfo;

use crate::traits::{
    CommandOutput, CommandRunner, CommandSpec, DriverPrint, DriverPrintOptions, Platform,
    PlatformBridge, PrinterEnumerator,
};

/// Timeout for printer enumeration and driver print calls.
const OS_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Executable used when no SumatraPDF path is configured.
const DEFAULT_SUMATRA: &str = "SumatraPDF.exe";

/// PowerShell pipeline listing printers as JSON.
const GET_PRINTER_SCRIPT: &str =
    "Get-Printer | Select-Object Name,ShareName | ConvertTo-Json -Compress";

/// OS-backed implementation of every bridge trait.
pub struct SystemBridge {
    platform: Platform,
    sumatra_path: Option<PathBuf>,
}

impl SystemBridge {
    pub fn new(platform: Platform, sumatra_path: Option<PathBuf>) -> Self {
        Self {
            platform,
            sumatra_path,
        }
    }

    /// Command that prints `path` on `printer_name` through the driver.
    pub fn driver_print_command(
        &self,
        path: &Path,
        printer_name: &str,
        options: &DriverPrintOptions,
    ) -> CommandSpec {
        let file = path.display().to_string();
        match self.platform {
            Platform::Windows => {
                let exe = self
                    .sumatra_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| DEFAULT_SUMATRA.to_string());
                let mut cmd = CommandSpec::new(exe).arg("-print-to").arg(printer_name);
                if options.no_scale {
                    cmd = cmd.arg("-print-settings").arg("noscale");
                }
                if options.silent {
                    cmd = cmd.arg("-silent");
                }
                cmd.arg(file)
            }
            Platform::Posix => {
                let mut cmd = CommandSpec::new("lp").arg("-d").arg(printer_name);
                if options.no_scale {
                    cmd = cmd.arg("-o").arg("print-scaling=none");
                }
                cmd.arg(file)
            }
        }
    }

    fn list_command(&self) -> CommandSpec {
        match self.platform {
            Platform::Windows => CommandSpec::new("powershell")
                .arg("-NoProfile")
                .arg("-NonInteractive")
                .arg("-Command")
                .arg(GET_PRINTER_SCRIPT),
            Platform::Posix => CommandSpec::new("lpstat").arg("-e"),
        }
    }
}

impl PlatformBridge for SystemBridge {
    fn platform_name(&self) -> &str {
        match self.platform {
            Platform::Windows => "Windows spooler",
            Platform::Posix => "CUPS",
        }
    }

    fn platform(&self) -> Platform {
        self.platform
    }
}

#[async_trait]
impl PrinterEnumerator for SystemBridge {
    async fn list_printers(&self) -> Result<Vec<PrinterInfo>> {
        let output = self
            .run(&self.list_command(), OS_CALL_TIMEOUT)
            .await
            .map_err(|e| LabelgateError::Bridge(format!("printer enumeration: {e}")))?;

        let printers = match self.platform {
            Platform::Windows => parse_get_printer_json(&output.stdout)?,
            Platform::Posix => parse_lpstat_destinations(&output.stdout),
        };
        debug!(count = printers.len(), "enumerated printers");
        Ok(printers)
    }
}

#[async_trait]
impl DriverPrint for SystemBridge {
    async fn print_file(
        &self,
        path: &Path,
        printer_name: &str,
        options: &DriverPrintOptions,
    ) -> Result<()> {
        let cmd = self.driver_print_command(path, printer_name, options);
        self.run(&cmd, OS_CALL_TIMEOUT).await?;
        info!(printer = printer_name, file = %path.display(), "document handed to driver");
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for SystemBridge {
    async fn run(&self, command: &CommandSpec, timeout: Duration) -> Result<CommandOutput> {
        debug!(command = %command, timeout_secs = timeout.as_secs(), "running command");

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LabelgateError::Bridge(format!("spawn {}: {e}", command.program)))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                LabelgateError::Timeout(format!(
                    "`{}` did not finish within {}s",
                    command.program,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| LabelgateError::Bridge(format!("wait {}: {e}", command.program)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let detail = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            warn!(command = %command.program, status = %output.status, "command failed");
            return Err(LabelgateError::Transport(format!(
                "`{}` exited with {}: {}",
                command.program, output.status, detail
            )));
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Parse `lpstat -e` output: one destination name per line.
pub fn parse_lpstat_destinations(stdout: &str) -> Vec<PrinterInfo> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PrinterInfo::named)
        .collect()
}

/// Parse `Get-Printer | ConvertTo-Json` output.  PowerShell emits a bare
/// object for a single printer and an array otherwise.
pub fn parse_get_printer_json(stdout: &str) -> Result<Vec<PrinterInfo>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(trimmed)?;
    let entries = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("Name")?.as_str()?.to_string();
            let display_name = entry
                .get("ShareName")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| name.clone());
            Some(PrinterInfo { name, display_name })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lpstat_lines_become_printers() {
        let printers = parse_lpstat_destinations("Zebra_ZD420\n\nOffice_Laser\n");
        assert_eq!(printers.len(), 2);
        assert_eq!(printers[0].name, "Zebra_ZD420");
        assert_eq!(printers[1].display_name, "Office_Laser");
    }

    #[test]
    fn get_printer_single_object() {
        let json = r#"{"Name":"ZDesigner GK420t","ShareName":"zebra"}"#;
        let printers = parse_get_printer_json(json).expect("parse");
        assert_eq!(printers.len(), 1);
        assert_eq!(printers[0].name, "ZDesigner GK420t");
        assert_eq!(printers[0].display_name, "zebra");
    }

    #[test]
    fn get_printer_array_without_share() {
        let json = r#"[{"Name":"Microsoft Print to PDF","ShareName":null},{"Name":"Zebra"}]"#;
        let printers = parse_get_printer_json(json).expect("parse");
        assert_eq!(printers.len(), 2);
        assert_eq!(printers[0].display_name, "Microsoft Print to PDF");
    }

    #[test]
    fn empty_enumeration_is_not_an_error() {
        assert!(parse_get_printer_json("  ").expect("parse").is_empty());
    }

    #[test]
    fn sumatra_command_carries_noscale_and_silent() {
        let bridge = SystemBridge::new(Platform::Windows, None);
        let cmd = bridge.driver_print_command(
            Path::new("C:\\tmp\\job.pdf"),
            "Zebra",
            &DriverPrintOptions::default(),
        );
        assert_eq!(cmd.program, DEFAULT_SUMATRA);
        assert!(cmd.args.contains(&"noscale".to_string()));
        assert!(cmd.args.contains(&"-silent".to_string()));
        assert_eq!(cmd.args.last().map(String::as_str), Some("C:\\tmp\\job.pdf"));
    }

    #[test]
    fn lp_command_targets_named_queue() {
        let bridge = SystemBridge::new(Platform::Posix, None);
        let cmd = bridge.driver_print_command(
            Path::new("/tmp/job.pdf"),
            "Zebra_ZD420",
            &DriverPrintOptions::default(),
        );
        assert_eq!(cmd.to_string(), "lp -d Zebra_ZD420 -o print-scaling=none /tmp/job.pdf");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_transport_error() {
        let bridge = SystemBridge::new(Platform::Posix, None);
        let cmd = CommandSpec::new("sh").arg("-c").arg("echo jammed >&2; exit 3");
        let err = bridge
            .run(&cmd, Duration::from_secs(5))
            .await
            .expect_err("should fail");
        assert!(matches!(err, LabelgateError::Transport(_)));
        assert!(err.to_string().contains("jammed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let bridge = SystemBridge::new(Platform::Posix, None);
        let cmd = CommandSpec::new("sleep").arg("5");
        let err = bridge
            .run(&cmd, Duration::from_millis(100))
            .await
            .expect_err("should time out");
        assert!(matches!(err, LabelgateError::Timeout(_)));
    }
}
