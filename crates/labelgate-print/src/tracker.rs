// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-target busy/idle tracking.
//
// A target goes Busy immediately before a transport call starts and back to
// Idle right after it returns, whatever the outcome.  The only other way out
// of Busy is the staleness sweep, which recovers targets whose transport
// call never came back.  Idle history (last success, last failure, last
// duration) survives every transition.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use labelgate_core::types::{
    BusyInfo, IdleHistory, JobId, JobOutcome, PrinterInfo, TargetKey, TargetSnapshot,
};

/// Internal state of one known target.
#[derive(Debug, Clone)]
enum TargetState {
    Idle(IdleHistory),
    Busy {
        job_id: JobId,
        started_at: DateTime<Utc>,
        started: Instant,
        /// History from before this job, restored on release.
        history: IdleHistory,
    },
}

/// Busy/idle registry for every target this process has touched.
#[derive(Debug, Default)]
pub struct TargetTracker {
    targets: HashMap<TargetKey, TargetState>,
}

impl TargetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self, key: &TargetKey) -> bool {
        matches!(self.targets.get(key), Some(TargetState::Busy { .. }))
    }

    /// How long the target has been busy, or `None` if it is not.
    pub fn busy_for(&self, key: &TargetKey) -> Option<Duration> {
        match self.targets.get(key) {
            Some(TargetState::Busy { started, .. }) => Some(started.elapsed()),
            _ => None,
        }
    }

    /// Record that `job_id` has started on `key`.
    pub fn mark_busy(&mut self, key: &TargetKey, job_id: JobId) {
        let history = match self.targets.remove(key) {
            Some(TargetState::Idle(history)) => history,
            Some(TargetState::Busy {
                job_id: previous,
                history,
                ..
            }) => {
                warn!(target = %key, previous = %previous, job_id = %job_id, "target was already busy, overwriting");
                history
            }
            None => IdleHistory::default(),
        };

        self.targets.insert(
            key.clone(),
            TargetState::Busy {
                job_id,
                started_at: Utc::now(),
                started: Instant::now(),
                history,
            },
        );
        debug!(target = %key, job_id = %job_id, "target busy");
    }

    /// Return `key` to idle and fold `outcome` into its history.
    ///
    /// A success updates `last_success_at` and leaves the failure fields
    /// untouched; a failure updates `last_failure_at`/`last_error` and leaves
    /// `last_success_at` untouched.  `Released` records nothing.
    pub fn mark_idle(&mut self, key: &TargetKey, outcome: &JobOutcome) {
        let now = Utc::now();
        let mut history = match self.targets.remove(key) {
            Some(TargetState::Busy {
                job_id,
                started,
                mut history,
                ..
            }) => {
                if !matches!(outcome, JobOutcome::Released) {
                    history.last_job_id = Some(job_id);
                    history.last_job_duration_ms =
                        Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
                }
                history
            }
            Some(TargetState::Idle(history)) => {
                debug!(target = %key, "mark_idle on a target that was not busy");
                history
            }
            None => IdleHistory::default(),
        };

        match outcome {
            JobOutcome::Succeeded => history.last_success_at = Some(now),
            JobOutcome::Failed(error) => {
                history.last_failure_at = Some(now);
                history.last_error = Some(error.clone());
            }
            JobOutcome::Released => {}
        }

        debug!(target = %key, ?outcome, "target idle");
        self.targets.insert(key.clone(), TargetState::Idle(history));
    }

    /// Descriptive view of one target.
    pub fn snapshot(&self, key: &TargetKey) -> TargetSnapshot {
        match self.targets.get(key) {
            None => TargetSnapshot::Unknown,
            Some(TargetState::Idle(history)) => TargetSnapshot::Idle(history.clone()),
            Some(TargetState::Busy {
                job_id,
                started_at,
                started,
                ..
            }) => TargetSnapshot::Busy(BusyInfo {
                job_id: *job_id,
                started_at: *started_at,
                elapsed_secs: started.elapsed().as_secs(),
            }),
        }
    }

    /// Snapshots of every known target, ordered by key.
    pub fn snapshots(&self) -> BTreeMap<TargetKey, TargetSnapshot> {
        self.targets
            .keys()
            .map(|key| (key.clone(), self.snapshot(key)))
            .collect()
    }

    /// Register `key` as idle if it has never been seen.  Known targets are
    /// left as they are.
    pub fn seed_idle(&mut self, key: &TargetKey) -> TargetSnapshot {
        self.targets
            .entry(key.clone())
            .or_insert_with(|| TargetState::Idle(IdleHistory::default()));
        self.snapshot(key)
    }

    /// Force every target busy for longer than `threshold` back to idle.
    ///
    /// This is stuck-lock recovery, not a completion: no success or failure
    /// is recorded.  Returns the keys that were released.
    pub fn release_stale(&mut self, threshold: Duration) -> Vec<TargetKey> {
        let stale: Vec<TargetKey> = self
            .targets
            .iter()
            .filter_map(|(key, state)| match state {
                TargetState::Busy { started, .. } if started.elapsed() > threshold => {
                    Some(key.clone())
                }
                _ => None,
            })
            .collect();

        for key in &stale {
            if let Some(TargetState::Busy {
                job_id,
                started,
                history,
                ..
            }) = self.targets.remove(key)
            {
                warn!(
                    target = %key,
                    job_id = %job_id,
                    busy_secs = started.elapsed().as_secs(),
                    "releasing stale busy target"
                );
                self.targets.insert(key.clone(), TargetState::Idle(history));
            }
        }

        if !stale.is_empty() {
            info!(count = stale.len(), "staleness sweep released targets");
        }
        stale
    }
}

/// Tracker shared between the dispatch task, the service and the sweep.
#[derive(Debug, Clone, Default)]
pub struct SharedTracker(Arc<Mutex<TargetTracker>>);

impl SharedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the tracker locked.  A poisoned lock is taken over
    /// rather than propagated.
    pub fn with<R>(&self, f: impl FnOnce(&mut TargetTracker) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// Find the enumerated printer `key` refers to: exact name or display name
/// first, then a case-insensitive substring match in either direction.
pub fn match_printer<'a>(key: &str, printers: &'a [PrinterInfo]) -> Option<&'a PrinterInfo> {
    if let Some(exact) = printers
        .iter()
        .find(|p| p.name == key || p.display_name == key)
    {
        return Some(exact);
    }

    let needle = key.to_lowercase();
    if needle.is_empty() {
        return None;
    }
    printers.iter().find(|p| {
        let name = p.name.to_lowercase();
        let display = p.display_name.to_lowercase();
        name.contains(&needle)
            || display.contains(&needle)
            || (!name.is_empty() && needle.contains(&name))
    })
}
