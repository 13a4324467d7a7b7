// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Labelgate: print agent for label printers.
//
// Entry point.  Initialises logging, loads configuration, builds the print
// service and runs one command against it.  Results are printed as JSON.

mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use labelgate_bridge::platform_bridge;
use labelgate_core::config::AgentConfig;
use labelgate_core::error::{LabelgateError, Result};
use labelgate_print::{IpPayload, PrintService};

/// Labelgate command line
#[derive(Parser, Debug)]
#[command(name = "labelgate", version, about = "Serialized print-job dispatch for label printers.")]
struct Cli {
    /// Path to config.json (defaults to the data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List printers installed on this host
    Printers,
    /// Print a local PDF through a printer driver
    PrintFile {
        path: PathBuf,
        #[arg(long)]
        printer: Option<String>,
    },
    /// Download a PDF and print it (driver, or raw TCP with --ip)
    PrintUrl {
        url: String,
        #[arg(long)]
        printer: Option<String>,
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print label markup over raw TCP or through the spooler
    PrintZpl {
        /// Markup to print; read from --file when omitted
        zpl: Option<String>,
        #[arg(long, conflicts_with = "zpl")]
        file: Option<PathBuf>,
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long, conflicts_with = "ip")]
        printer: Option<String>,
        #[arg(long, conflicts_with = "ip")]
        share: Option<String>,
    },
    /// Download a PDF and spool it to a printer queue or share
    PrintPdfShared {
        url: String,
        #[arg(long)]
        printer: Option<String>,
        #[arg(long)]
        share: Option<String>,
    },
    /// Probe TCP reachability of a raw printer
    Check {
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show tracked printer state
    Status {
        /// One printer key; all known targets when omitted
        key: Option<String>,
        /// Look unknown keys up among the installed printers
        #[arg(long)]
        resolve: bool,
    },
    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(settings::default_config_path);
    let mut config = settings::load_config(&config_path);
    config.apply_env();

    tracing::info!(config = %config_path.display(), "Labelgate starting");

    match run(cli.command, config, config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let class = e.class();
            tracing::error!(error = %e, class = ?class, "command failed");
            eprintln!(
                "{}",
                json!({
                    "success": false,
                    "error": e.to_string(),
                    "class": format!("{class:?}"),
                    "status": class.http_status(),
                })
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: AgentConfig, config_path: PathBuf) -> Result<()> {
    if let Command::Config { save } = command {
        if save {
            settings::persist_config(&config_path, &config)?;
            tracing::info!(path = %config_path.display(), "config saved");
        }
        return emit(&config);
    }

    let bridge = platform_bridge(config.transport.sumatra_path.clone());
    let service = PrintService::new(config, bridge)?;
    let maintenance = service.start_maintenance();

    let outcome = execute(&service, command).await;
    maintenance.stop().await;
    outcome
}

async fn execute(service: &PrintService, command: Command) -> Result<()> {
    match command {
        Command::Printers => emit(&service.printers().await?),
        Command::PrintFile { path, printer } => {
            let bytes = tokio::fs::read(&path).await.map_err(|e| {
                LabelgateError::Validation(format!("cannot read {}: {e}", path.display()))
            })?;
            emit(&service.submit_local_job(&bytes, printer).await?)
        }
        Command::PrintUrl {
            url,
            printer,
            ip,
            port,
        } => {
            let result = match ip {
                Some(ip) => {
                    service
                        .submit_ip_job(Some(&ip), port, IpPayload::Url(url))
                        .await?
                }
                None => service.submit_url_job(&url, printer).await?,
            };
            emit(&result)
        }
        Command::PrintZpl {
            zpl,
            file,
            ip,
            port,
            printer,
            share,
        } => {
            let zpl = match (zpl, file) {
                (Some(zpl), _) => zpl,
                (None, Some(path)) => tokio::fs::read_to_string(&path).await.map_err(|e| {
                    LabelgateError::Validation(format!("cannot read {}: {e}", path.display()))
                })?,
                (None, None) => {
                    return Err(LabelgateError::Validation(
                        "give the markup inline or with --file".into(),
                    ));
                }
            };
            let spooled = printer.is_some() || share.is_some();
            let result = if spooled {
                service.submit_shared_zpl_job(&zpl, printer, share).await?
            } else {
                service
                    .submit_ip_job(ip.as_deref(), port, IpPayload::Zpl(zpl))
                    .await?
            };
            emit(&result)
        }
        Command::PrintPdfShared {
            url,
            printer,
            share,
        } => emit(&service.submit_shared_pdf_job(&url, printer, share).await?),
        Command::Check { ip, port } => {
            let report = service.check_connectivity(ip.as_deref(), port).await?;
            let key = ip
                .or_else(|| service.config().default_printer_ip.map(|ip| ip.to_string()))
                .unwrap_or_default();
            emit(&json!({ "check": report, "state": service.state(&key) }))
        }
        Command::Status { key, resolve } => match key {
            Some(key) => {
                let state = if resolve {
                    service.resolve_state(&key).await?
                } else {
                    service.state(&key)
                };
                emit(&json!({ "key": key, "state": state }))
            }
            None => emit(&service.all_states()),
        },
        Command::Config { .. } => emit(service.config()),
    }
}

fn emit<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zpl_to_ip_parses() {
        let cli = Cli::try_parse_from([
            "labelgate",
            "print-zpl",
            "^XA^XZ",
            "--ip",
            "10.0.0.5",
            "--port",
            "9100",
        ])
        .expect("parse");
        match cli.command {
            Command::PrintZpl { zpl, ip, port, .. } => {
                assert_eq!(zpl.as_deref(), Some("^XA^XZ"));
                assert_eq!(ip.as_deref(), Some("10.0.0.5"));
                assert_eq!(port, Some(9100));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn ip_and_printer_conflict() {
        let err = Cli::try_parse_from([
            "labelgate",
            "print-zpl",
            "^XA^XZ",
            "--ip",
            "10.0.0.5",
            "--printer",
            "Zebra",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn status_accepts_optional_key() {
        let cli = Cli::try_parse_from(["labelgate", "status", "--resolve", "zebra"]).expect("parse");
        assert!(matches!(
            cli.command,
            Command::Status { key: Some(ref k), resolve: true } if k == "zebra"
        ));
    }
}
