// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Test doubles for the OS bridge and the transports.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use labelgate_bridge::{
    CommandOutput, CommandRunner, CommandSpec, DriverPrint, DriverPrintOptions, Platform,
    PlatformBridge, PrinterEnumerator,
};
use labelgate_core::error::{LabelgateError, Result};
use labelgate_core::types::{JobId, PrinterInfo};

use crate::transport::{Delivery, Receipt, Transport};

/// Bridge with a fixed printer list that records every call.
pub struct FakeBridge {
    pub platform: Platform,
    pub printers: Vec<PrinterInfo>,
    pub printed: Mutex<Vec<(PathBuf, String)>>,
    pub commands: Mutex<Vec<CommandSpec>>,
    /// Scripted results for `run`, consumed in order; empty means success.
    pub command_results: Mutex<VecDeque<Result<CommandOutput>>>,
    pub print_error: Option<String>,
}

impl FakeBridge {
    pub fn new(platform: Platform, printers: &[&str]) -> Self {
        Self {
            platform,
            printers: printers.iter().map(|p| PrinterInfo::named(*p)).collect(),
            printed: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            command_results: Mutex::new(VecDeque::new()),
            print_error: None,
        }
    }

    pub fn push_command_result(&self, result: Result<CommandOutput>) {
        self.command_results
            .lock()
            .expect("lock")
            .push_back(result);
    }

    pub fn commands(&self) -> Vec<CommandSpec> {
        self.commands.lock().expect("lock").clone()
    }

    pub fn printed(&self) -> Vec<(PathBuf, String)> {
        self.printed.lock().expect("lock").clone()
    }
}

impl PlatformBridge for FakeBridge {
    fn platform_name(&self) -> &str {
        "fake"
    }

    fn platform(&self) -> Platform {
        self.platform
    }
}

#[async_trait]
impl PrinterEnumerator for FakeBridge {
    async fn list_printers(&self) -> Result<Vec<PrinterInfo>> {
        Ok(self.printers.clone())
    }
}

#[async_trait]
impl DriverPrint for FakeBridge {
    async fn print_file(
        &self,
        path: &Path,
        printer_name: &str,
        _options: &DriverPrintOptions,
    ) -> Result<()> {
        self.printed
            .lock()
            .expect("lock")
            .push((path.to_path_buf(), printer_name.to_string()));
        match &self.print_error {
            Some(message) => Err(LabelgateError::Transport(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeBridge {
    async fn run(&self, command: &CommandSpec, _timeout: Duration) -> Result<CommandOutput> {
        self.commands.lock().expect("lock").push(command.clone());
        self.command_results
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Ok(CommandOutput::default()))
    }
}

/// What a scripted transport call does.
pub enum Step {
    Succeed,
    Fail(LabelgateError),
    /// Sleep, then succeed.
    Delay(Duration),
}

/// Transport that follows a script and records when each call starts and
/// ends.
pub struct FakeTransport {
    steps: Mutex<VecDeque<Step>>,
    events: Mutex<Vec<(JobId, &'static str)>>,
}

impl FakeTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Job ids in the order their calls started.
    pub fn calls(&self) -> Vec<JobId> {
        self.events
            .lock()
            .expect("lock")
            .iter()
            .filter(|(_, event)| *event == "start")
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn events(&self) -> Vec<(JobId, &'static str)> {
        self.events.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn submit(&self, delivery: Delivery) -> Result<Receipt> {
        self.events
            .lock()
            .expect("lock")
            .push((delivery.job_id, "start"));
        let step = self
            .steps
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Step::Succeed);
        let result = match step {
            Step::Succeed => Ok(()),
            Step::Fail(err) => Err(err),
            Step::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        };
        self.events
            .lock()
            .expect("lock")
            .push((delivery.job_id, "end"));
        result.map(|()| Receipt {
            reference: delivery.job_id.to_string(),
            target: "fake".into(),
        })
    }
}

/// Serve one canned HTTP response on a local port and return the base URL.
pub async fn serve_once(response: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.expect("read");
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let _ = socket.write_all(&response).await;
        let _ = socket.shutdown().await;
    });
    format!("http://{addr}")
}
