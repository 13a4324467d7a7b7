// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Background maintenance: the temp-file janitor and the tracker staleness
// sweep.  Each runs in its own task until `Maintenance::stop` signals it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use labelgate_core::config::{JanitorConfig, TrackerConfig};

use crate::janitor::sweep_once;
use crate::tracker::SharedTracker;

/// One running background loop.
struct LoopHandle {
    name: &'static str,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Handle to the running maintenance loops.
pub struct Maintenance {
    loops: Vec<LoopHandle>,
}

impl Maintenance {
    /// Start both loops on the current runtime.
    pub fn start(
        temp_dir: PathBuf,
        janitor: &JanitorConfig,
        tracker: SharedTracker,
        staleness: &TrackerConfig,
    ) -> Self {
        let max_age = janitor.max_age();
        let janitor_loop = spawn_loop("janitor", janitor.interval(), move || {
            let dir = temp_dir.clone();
            async move {
                sweep_once(&dir, max_age).await;
            }
        });

        let stale_after = staleness.stale_after();
        let staleness_loop = spawn_loop("staleness", staleness.sweep_interval(), move || {
            let tracker = tracker.clone();
            async move {
                let released = tracker.with(|t| t.release_stale(stale_after));
                if released.is_empty() {
                    debug!("no stale targets");
                }
            }
        });

        info!("maintenance loops started");
        Self {
            loops: vec![janitor_loop, staleness_loop],
        }
    }

    /// Signal every loop and wait for it to exit.
    pub async fn stop(self) {
        for handle in self.loops {
            handle.shutdown.notify_one();
            if let Err(e) = handle.task.await {
                warn!(task = handle.name, error = %e, "maintenance loop ended abnormally");
            }
        }
        info!("maintenance loops stopped");
    }
}

/// Run `tick` every `period` (first run after one period) until notified.
fn spawn_loop<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> LoopHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    let period = period.max(Duration::from_millis(1));

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = signal.notified() => {
                    debug!(task = name, "maintenance loop received shutdown signal");
                    break;
                }
                _ = interval.tick() => tick().await,
            }
        }
    });

    LoopHandle {
        name,
        shutdown,
        task,
    }
}
