// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dispatch queue: one serialized drain for every kind of print job.
//
// Callers submit through a cloneable `DispatchQueue` handle and get back a
// `JobTicket` future.  A single Tokio task owns the pending jobs, so at most
// one transport call is in flight in the whole process and there is exactly
// one drain, never two.  A job whose target is busy waits with backoff while
// the task keeps accepting submissions.
//
// Deadlines belong to the ticket: when one expires the caller gets a
// `Timeout`, and the task drops the job the next time it looks at the queue.
// A transport call that is already running is not cancelled.

use std::collections::{HashSet, VecDeque};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use labelgate_core::config::{DispatchConfig, HeadOfLine};
use labelgate_core::error::{LabelgateError, Result};
use labelgate_core::types::{JobId, JobKind, JobOutcome, JobResult, TargetKey};

use crate::temp::remove_artifact;
use crate::tracker::SharedTracker;
use crate::transport::{Delivery, Transports};

/// A job waiting in the queue.
struct QueuedJob {
    job_id: JobId,
    kind: JobKind,
    deadline: Instant,
    /// Set after a busy race; the job is not retried before this instant.
    not_before: Option<Instant>,
    respond_to: oneshot::Sender<Result<JobResult>>,
}

impl QueuedJob {
    /// Expired, or nobody is waiting for the answer any more.
    fn is_dead(&self, now: Instant) -> bool {
        now >= self.deadline || self.respond_to.is_closed()
    }
}

#[derive(Debug, Default)]
struct QueueStats {
    pending: AtomicUsize,
    draining: AtomicBool,
}

/// Handle to the dispatch task.  Cheap to clone; the task stops once every
/// handle is dropped and the queue has drained.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
    stats: Arc<QueueStats>,
    config: Arc<DispatchConfig>,
}

impl DispatchQueue {
    /// Start the dispatch task on the current runtime.
    pub fn spawn(config: DispatchConfig, tracker: SharedTracker, transports: Transports) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(QueueStats::default());

        let dispatcher = Dispatcher {
            rx,
            open: true,
            queue: VecDeque::new(),
            tracker,
            transports,
            config: config.clone(),
            stats: stats.clone(),
        };
        tokio::spawn(dispatcher.run());

        Self {
            tx,
            stats,
            config: Arc::new(config),
        }
    }

    /// Enqueue a job.  The returned ticket resolves with the job's result or
    /// fails with `Timeout` once the job's deadline has passed.
    pub fn submit(&self, kind: JobKind) -> JobTicket {
        let job_id = JobId::new();
        let target = kind.target_key();
        let timeout = self.config.deadline(kind.is_spooled_pdf());
        let deadline = Instant::now() + timeout;
        let (respond_to, rx) = oneshot::channel();

        self.stats.pending.fetch_add(1, Ordering::SeqCst);
        let job = QueuedJob {
            job_id,
            kind,
            deadline,
            not_before: None,
            respond_to,
        };

        if let Err(mpsc::error::SendError(job)) = self.tx.send(job) {
            self.stats.pending.fetch_sub(1, Ordering::SeqCst);
            warn!(job_id = %job_id, "dispatch task is gone, rejecting job");
            if let Some(path) = job.kind.artifact()
                && let Err(e) = std::fs::remove_file(path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(
                    job_id = %job_id,
                    path = %path.display(),
                    error = %e,
                    "could not remove artifact of rejected job"
                );
            }
            let _ = job.respond_to.send(Err(LabelgateError::QueueClosed));
        } else {
            debug!(job_id = %job_id, target = %target, "job queued");
        }

        JobTicket {
            job_id,
            target,
            timeout,
            deadline,
            rx,
        }
    }

    /// Jobs queued and not yet started.
    pub fn pending(&self) -> usize {
        self.stats.pending.load(Ordering::SeqCst)
    }

    /// Whether the task is working through a non-empty queue.
    pub fn is_draining(&self) -> bool {
        self.stats.draining.load(Ordering::SeqCst)
    }
}

/// The caller's side of a submitted job.  Await it for the result.
pub struct JobTicket {
    job_id: JobId,
    target: TargetKey,
    timeout: Duration,
    deadline: Instant,
    rx: oneshot::Receiver<Result<JobResult>>,
}

impl JobTicket {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn target(&self) -> &TargetKey {
        &self.target
    }

    /// Wait for the job, up to its deadline.
    pub async fn wait(self) -> Result<JobResult> {
        match tokio::time::timeout_at(self.deadline, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LabelgateError::QueueClosed),
            Err(_) => {
                warn!(job_id = %self.job_id, target = %self.target, "job deadline passed");
                Err(LabelgateError::Timeout(format!(
                    "job {} for {} did not complete within {}s",
                    self.job_id,
                    self.target,
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

impl IntoFuture for JobTicket {
    type Output = Result<JobResult>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<JobResult>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

/// What the loop should do next.
enum Next {
    Run(usize),
    Wait(Duration),
}

/// State owned by the dispatch task.
struct Dispatcher {
    rx: mpsc::UnboundedReceiver<QueuedJob>,
    /// False once every handle is dropped.
    open: bool,
    queue: VecDeque<QueuedJob>,
    tracker: SharedTracker,
    transports: Transports,
    config: DispatchConfig,
    stats: Arc<QueueStats>,
}

impl Dispatcher {
    async fn run(mut self) {
        info!(head_of_line = ?self.config.head_of_line, "dispatch loop started");

        loop {
            self.absorb();
            self.drop_dead().await;

            if self.queue.is_empty() {
                self.stats.draining.store(false, Ordering::SeqCst);
                if !self.open {
                    break;
                }
                match self.rx.recv().await {
                    Some(job) => self.queue.push_back(job),
                    None => self.open = false,
                }
                continue;
            }

            self.stats.draining.store(true, Ordering::SeqCst);
            match self.next_ready(Instant::now()) {
                Next::Run(index) => {
                    if let Some(job) = self.queue.remove(index) {
                        self.stats.pending.fetch_sub(1, Ordering::SeqCst);
                        self.execute(job).await;
                    }
                }
                Next::Wait(delay) => self.wait(delay).await,
            }
        }

        info!("dispatch loop stopped");
    }

    /// Move everything already submitted into the queue.
    fn absorb(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(job) => self.queue.push_back(job),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.open = false;
                    break;
                }
            }
        }
    }

    /// Remove expired and abandoned jobs, cleaning up what they own.
    async fn drop_dead(&mut self) {
        let now = Instant::now();
        if !self.queue.iter().any(|job| job.is_dead(now)) {
            return;
        }

        let (dead, live): (Vec<QueuedJob>, Vec<QueuedJob>) =
            self.queue.drain(..).partition(|job| job.is_dead(now));
        self.queue = live.into();

        for job in dead {
            self.stats.pending.fetch_sub(1, Ordering::SeqCst);
            warn!(job_id = %job.job_id, target = %job.kind.target_key(), "dropping expired job");
            if let Some(path) = job.kind.artifact() {
                remove_artifact(path).await;
            }
            let _ = job.respond_to.send(Err(LabelgateError::Timeout(format!(
                "job {} expired in the queue",
                job.job_id
            ))));
        }
    }

    /// Pick the job to run now, or how long to wait before looking again.
    ///
    /// Strict: only the head is considered.  SkipBusy: the first job whose
    /// target is ready and has no earlier job still waiting for it.
    fn next_ready(&self, now: Instant) -> Next {
        let strict = self.config.head_of_line == HeadOfLine::Strict;
        let mut blocked: HashSet<TargetKey> = HashSet::new();
        let mut wait: Option<Duration> = None;

        self.tracker.with(|tracker| {
            for (index, job) in self.queue.iter().enumerate() {
                let key = job.kind.target_key();
                if blocked.contains(&key) {
                    continue;
                }

                let delay = match job.not_before.filter(|at| *at > now) {
                    Some(at) => Some(at - now),
                    None => tracker.busy_for(&key).map(|busy| {
                        let delay = self
                            .config
                            .backoff(job.kind.is_spooled_pdf())
                            .delay_for(busy);
                        debug!(
                            job_id = %job.job_id,
                            target = %key,
                            busy_secs = busy.as_secs(),
                            retry_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "target busy, backing off"
                        );
                        delay
                    }),
                };

                match delay {
                    None => return Next::Run(index),
                    Some(delay) => {
                        wait = Some(wait.map_or(delay, |w| w.min(delay)));
                        if strict {
                            break;
                        }
                        blocked.insert(key);
                    }
                }
            }
            Next::Wait(wait.unwrap_or_else(|| self.config.busy_race_retry()))
        })
    }

    /// Sleep for `delay` while still accepting submissions.  Under SkipBusy a
    /// new job cuts the wait short, since it may be for an idle target.
    async fn wait(&mut self, delay: Duration) {
        let until = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(until) => return,
                job = self.rx.recv(), if self.open => match job {
                    Some(job) => {
                        self.queue.push_back(job);
                        if self.config.head_of_line == HeadOfLine::SkipBusy {
                            return;
                        }
                    }
                    None => self.open = false,
                },
            }
        }
    }

    /// Run one job through its transport and settle it.
    async fn execute(&mut self, mut job: QueuedJob) {
        let key = job.kind.target_key();
        let mode = job.kind.mode();
        let transport = self.transports.route(&job.kind).clone();

        self.tracker.with(|t| t.mark_busy(&key, job.job_id));
        info!(job_id = %job.job_id, target = %key, mode = %mode, transport = transport.name(), "dispatching job");

        let result = transport
            .submit(Delivery::for_job(job.job_id, job.kind.clone()))
            .await;

        match result {
            Ok(receipt) => {
                self.tracker.with(|t| t.mark_idle(&key, &JobOutcome::Succeeded));
                if let Some(path) = job.kind.artifact() {
                    remove_artifact(path).await;
                }
                info!(job_id = %job.job_id, target = %receipt.target, "job printed");
                let result = JobResult {
                    success: true,
                    message: format!("sent to {} via {}", receipt.target, transport.name()),
                    job_id: job.job_id,
                    target: receipt.target,
                    mode,
                };
                if job.respond_to.send(Ok(result)).is_err() {
                    debug!(job_id = %job.job_id, "caller stopped waiting before completion");
                }
            }
            Err(e) if e.is_busy() => {
                // Someone else got to the printer first.  Not a failure.
                self.tracker.with(|t| t.mark_idle(&key, &JobOutcome::Released));
                warn!(job_id = %job.job_id, target = %key, error = %e, "target busy at delivery, requeueing");
                job.not_before = Some(Instant::now() + self.config.busy_race_retry());
                self.stats.pending.fetch_add(1, Ordering::SeqCst);
                self.queue.push_front(job);
            }
            Err(e) => {
                self.tracker
                    .with(|t| t.mark_idle(&key, &JobOutcome::Failed(e.to_string())));
                if let Some(path) = job.kind.artifact() {
                    remove_artifact(path).await;
                }
                warn!(job_id = %job.job_id, target = %key, error = %e, "job failed");
                let _ = job.respond_to.send(Err(e));
            }
        }
    }
}
