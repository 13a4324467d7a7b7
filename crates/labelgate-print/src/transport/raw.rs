// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP transport (JetDirect, port 9100).
//
// Open a socket and dump bytes.  The printer must understand the payload
// natively (ZPL for label printers).  After the write half is shut down the
// job is only done once the printer closes its side.  Connect, write and the
// wait for close all share one timeout, so an unreachable printer fails
// within it.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use labelgate_core::error::{LabelgateError, Result};

use super::{Artifact, Delivery, Receipt, Target, Transport};

const CHUNK_SIZE: usize = 8192;

/// Pushes printer-native bytes to `ip:port`.
pub struct RawSocketTransport {
    default_port: u16,
    timeout: Duration,
}

impl RawSocketTransport {
    pub fn new(default_port: u16, timeout: Duration) -> Self {
        Self {
            default_port,
            timeout,
        }
    }
}

#[async_trait]
impl Transport for RawSocketTransport {
    fn name(&self) -> &'static str {
        "raw-socket"
    }

    async fn submit(&self, delivery: Delivery) -> Result<Receipt> {
        let Target::Socket { ip, port } = delivery.target else {
            return Err(LabelgateError::Validation(
                "raw socket transport got a non-socket target".into(),
            ));
        };
        let addr = SocketAddr::from((ip, port.unwrap_or(self.default_port)));

        let bytes = match delivery.artifact {
            Artifact::Bytes(bytes) => bytes,
            Artifact::File(path) => tokio::fs::read(&path).await.map_err(|e| {
                LabelgateError::Resource(format!("read {}: {e}", path.display()))
            })?,
        };

        tokio::time::timeout(self.timeout, send_raw(addr, &bytes))
            .await
            .map_err(|_| {
                LabelgateError::Timeout(format!(
                    "raw TCP to {addr} did not complete within {}s",
                    self.timeout.as_secs()
                ))
            })??;

        info!(job_id = %delivery.job_id, addr = %addr, bytes = bytes.len(), "raw print job sent");
        Ok(Receipt {
            reference: delivery.job_id.to_string(),
            target: addr.to_string(),
        })
    }
}

/// Connect, write `bytes` in chunks, shut down the write half and wait for
/// the printer to close the connection.
async fn send_raw(addr: SocketAddr, bytes: &[u8]) -> Result<()> {
    debug!(addr = %addr, total = bytes.len(), "connecting via raw TCP");

    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| LabelgateError::Transport(format!("raw TCP connect to {addr}: {e}")))?;

    let mut sent = 0usize;
    for chunk in bytes.chunks(CHUNK_SIZE) {
        stream.write_all(chunk).await.map_err(|e| {
            LabelgateError::Transport(format!("raw TCP send to {addr} failed at byte {sent}: {e}"))
        })?;
        sent += chunk.len();
        debug!(sent, total = bytes.len(), "raw TCP progress");
    }

    stream
        .flush()
        .await
        .map_err(|e| LabelgateError::Transport(format!("raw TCP flush: {e}")))?;
    stream
        .shutdown()
        .await
        .map_err(|e| LabelgateError::Transport(format!("raw TCP shutdown: {e}")))?;

    // Anything the printer sends back is discarded.
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await.map_err(|e| {
            LabelgateError::Transport(format!("raw TCP to {addr} closed abnormally: {e}"))
        })?;
        if n == 0 {
            break;
        }
    }
    debug!(addr = %addr, "printer closed raw TCP connection");
    Ok(())
}
