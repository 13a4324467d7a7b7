// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TCP reachability probe for raw printers.  Opens and closes a connection
// without sending anything, which is enough to tell "refused" from
// "unreachable" from "fine".

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use labelgate_core::types::ConnectivityReport;

/// Connect to `ip:port` and report latency or the failure reason.
pub async fn check_connectivity(ip: Ipv4Addr, port: u16, timeout: Duration) -> ConnectivityReport {
    let addr = SocketAddr::from((ip, port));
    let start = Instant::now();
    let result = tokio::time::timeout(timeout, TcpStream::connect(addr)).await;
    let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let error = match result {
        Ok(Ok(_stream)) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some(format!("timed out after {}ms", timeout.as_millis())),
    };
    debug!(addr = %addr, latency_ms, ?error, "connectivity probe");

    ConnectivityReport {
        success: error.is_none(),
        latency_ms,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn listening_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let report = check_connectivity(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2)).await;
        assert!(report.success);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn closed_port_reports_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("addr").port()
        };

        let report = check_connectivity(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2)).await;
        assert!(!report.success);
        assert!(report.error.is_some());
    }
}
