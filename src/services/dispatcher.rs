//! Job queue and dispatcher.
//!
//! All queue, in-flight and lease state lives behind a single mutex. Every
//! event (enqueue, claim, complete, fail, cancel) is one critical section, and
//! the status store writes for the requests it touches happen inside it, so a
//! poll never observes a job state that the dispatcher has not committed.
//! Nothing awaits while the lock is held.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::models::fingerprint::ContentHash;
use crate::models::medicine::IdentificationResult;
use crate::models::scan::{FailureKind, ScanFailure, ScanRecord, ScanRequest, ScanStatus};
use crate::services::cache::ResultCache;
use crate::services::status_store::{StatusError, StatusStore};

/// Upper bound on any lease, so expiry instants never overflow.
pub const MAX_LEASE_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub max_queue_depth: usize,
    pub lease_timeout: Duration,
    pub retry_limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseId(u64);

impl std::fmt::Display for LeaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lease-{}", self.0)
    }
}

/// Time-bounded claim of a job by one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerLease {
    pub id: LeaseId,
    pub fingerprint: ContentHash,
    pub worker_id: usize,
    /// 1-based attempt number for this job.
    pub attempt: u32,
    pub expires_at: Instant,
}

/// A leased job handed to a worker.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub lease: WorkerLease,
    pub image: Arc<[u8]>,
}

/// How an accepted submission was admitted.
#[derive(Debug, Clone)]
pub enum Admission {
    /// Result was already cached; the request is `Done`.
    Cached(Arc<IdentificationResult>),
    /// Attached as a waiter to an in-flight job with the same fingerprint.
    Joined,
    /// A new job was queued behind `ahead` others.
    Queued { ahead: usize },
}

/// Result of reporting a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// The lease was no longer active; the report was ignored.
    Stale,
    /// The job went back to the front of the queue.
    Retrying { next_attempt: u32 },
    /// The job had no waiters left and was dropped.
    Abandoned,
    /// Retries exhausted; every waiter is now `Failed`.
    Failed { attempts: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub queue_depth: usize,
    pub in_flight: usize,
    pub leased: usize,
}

struct Job {
    image: Arc<[u8]>,
    waiters: Vec<Uuid>,
    attempts: u32,
    lease: Option<WorkerLease>,
}

#[derive(Default)]
struct DispatchState {
    pending: VecDeque<ContentHash>,
    jobs: HashMap<ContentHash, Job>,
    next_lease: u64,
}

impl DispatchState {
    fn active_job(&mut self, lease: &WorkerLease) -> Option<&mut Job> {
        self.jobs
            .get_mut(&lease.fingerprint)
            .filter(|job| job.lease.as_ref().map(|l| l.id) == Some(lease.id))
    }

    fn stats(&self) -> DispatchStats {
        DispatchStats {
            queue_depth: self.pending.len(),
            in_flight: self.jobs.len(),
            leased: self.jobs.values().filter(|j| j.lease.is_some()).count(),
        }
    }
}

pub struct Dispatcher {
    state: Mutex<DispatchState>,
    cache: ResultCache,
    store: Arc<StatusStore>,
    config: DispatchConfig,
    wake: Notify,
}

impl Dispatcher {
    pub fn new(mut config: DispatchConfig, cache: ResultCache, store: Arc<StatusStore>) -> Self {
        config.lease_timeout = config.lease_timeout.min(MAX_LEASE_TIMEOUT);
        Self {
            state: Mutex::new(DispatchState::default()),
            cache,
            store,
            config,
            wake: Notify::new(),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Admit a validated request.
    ///
    /// The request is persisted only when it is admitted; an `Overloaded`
    /// rejection leaves no trace in the status store.
    pub fn enqueue(
        &self,
        request: ScanRequest,
        image: Arc<[u8]>,
    ) -> Result<Admission, DispatchError> {
        let fingerprint = request.fingerprint;
        let request_id = request.request_id;
        let mut state = self.state.lock();

        if let Some(result) = self.cache.get(&fingerprint) {
            self.store.insert(request)?;
            self.store
                .set_status(&request_id, ScanStatus::Done, Some(result.clone()), None)?;
            metrics::counter!("scan_cache_hits_total").increment(1);
            tracing::info!(
                request_id = %request_id,
                fingerprint = %fingerprint.short(),
                "Cache hit, request completed without inference"
            );
            return Ok(Admission::Cached(result));
        }

        if let Some(job) = state.jobs.get_mut(&fingerprint) {
            self.store.insert(request)?;
            job.waiters.push(request_id);
            if job.lease.is_some() {
                self.store
                    .set_status(&request_id, ScanStatus::Running, None, None)?;
            }
            tracing::info!(
                request_id = %request_id,
                fingerprint = %fingerprint.short(),
                waiters = job.waiters.len(),
                "Joined in-flight job"
            );
            return Ok(Admission::Joined);
        }

        let depth = state.pending.len();
        if depth >= self.config.max_queue_depth {
            metrics::counter!("scan_rejected_overloaded_total").increment(1);
            tracing::warn!(request_id = %request_id, depth, "Queue full, rejecting submission");
            return Err(DispatchError::Overloaded { depth });
        }

        self.store.insert(request)?;
        state.jobs.insert(
            fingerprint,
            Job {
                image,
                waiters: vec![request_id],
                attempts: 0,
                lease: None,
            },
        );
        state.pending.push_back(fingerprint);
        metrics::gauge!("scan_queue_depth").set(state.pending.len() as f64);
        drop(state);

        self.wake.notify_one();
        tracing::info!(
            request_id = %request_id,
            fingerprint = %fingerprint.short(),
            ahead = depth,
            "Job queued"
        );
        Ok(Admission::Queued { ahead: depth })
    }

    /// Wait until a job is available and lease it to `worker_id`.
    pub async fn claim(&self, worker_id: usize) -> Assignment {
        loop {
            if let Some(assignment) = self.try_claim(worker_id) {
                return assignment;
            }
            self.wake.notified().await;
        }
    }

    /// Lease the oldest pending job, if any.
    pub fn try_claim(&self, worker_id: usize) -> Option<Assignment> {
        let mut state = self.state.lock();
        while let Some(fingerprint) = state.pending.pop_front() {
            let lease_id = LeaseId(state.next_lease);
            let Some(job) = state.jobs.get_mut(&fingerprint) else {
                continue;
            };

            job.attempts += 1;
            let lease = WorkerLease {
                id: lease_id,
                fingerprint,
                worker_id,
                attempt: job.attempts,
                expires_at: Instant::now() + self.config.lease_timeout,
            };
            job.lease = Some(lease.clone());
            for waiter in &job.waiters {
                self.advance(waiter, ScanStatus::Running, None, None);
            }
            let image = job.image.clone();

            state.next_lease += 1;
            let more = !state.pending.is_empty();
            metrics::gauge!("scan_queue_depth").set(state.pending.len() as f64);
            drop(state);

            // Chain the wakeup so another idle worker picks up the rest.
            if more {
                self.wake.notify_one();
            }
            tracing::debug!(
                worker_id,
                lease_id = %lease.id,
                fingerprint = %fingerprint.short(),
                attempt = lease.attempt,
                "Job leased"
            );
            return Some(Assignment { lease, image });
        }
        None
    }

    /// Record a successful identification. Returns `false` for stale leases.
    pub fn complete(&self, lease: &WorkerLease, result: IdentificationResult) -> bool {
        let mut state = self.state.lock();
        if state.active_job(lease).is_none() {
            tracing::debug!(lease_id = %lease.id, "Ignoring completion for inactive lease");
            return false;
        }
        let Some(job) = state.jobs.remove(&lease.fingerprint) else {
            return false;
        };

        let cached = self.cache.put(lease.fingerprint, Arc::new(result));
        for waiter in &job.waiters {
            self.advance(waiter, ScanStatus::Done, Some(cached.clone()), None);
        }
        metrics::counter!("scan_jobs_completed").increment(1);
        tracing::info!(
            lease_id = %lease.id,
            fingerprint = %lease.fingerprint.short(),
            medicine = %cached.name,
            confidence = cached.confidence,
            waiters = job.waiters.len(),
            "Job completed"
        );
        true
    }

    /// Record a failed attempt and either requeue or fail the job.
    pub fn fail(&self, lease: &WorkerLease, kind: FailureKind, message: &str) -> FailOutcome {
        let mut state = self.state.lock();
        let retry_limit = self.config.retry_limit;
        let Some(job) = state.active_job(lease) else {
            tracing::debug!(lease_id = %lease.id, "Ignoring failure for inactive lease");
            return FailOutcome::Stale;
        };
        job.lease = None;
        let attempts = job.attempts;

        if job.waiters.is_empty() {
            state.jobs.remove(&lease.fingerprint);
            tracing::info!(fingerprint = %lease.fingerprint.short(), "No waiters left, dropping failed job");
            return FailOutcome::Abandoned;
        }

        if attempts > retry_limit {
            let waiters = state
                .jobs
                .remove(&lease.fingerprint)
                .map(|j| j.waiters)
                .unwrap_or_default();
            let failure = ScanFailure {
                kind,
                message: format!("Identification failed after {} attempts: {}", attempts, message),
                attempts,
            };
            for waiter in &waiters {
                self.advance(waiter, ScanStatus::Failed, None, Some(failure.clone()));
            }
            metrics::counter!("scan_jobs_failed").increment(1);
            tracing::warn!(
                fingerprint = %lease.fingerprint.short(),
                attempts,
                kind = %kind,
                error = message,
                "Job failed after max retries"
            );
            return FailOutcome::Failed { attempts };
        }

        state.pending.push_front(lease.fingerprint);
        metrics::gauge!("scan_queue_depth").set(state.pending.len() as f64);
        drop(state);

        self.wake.notify_one();
        metrics::counter!("scan_job_retries_total").increment(1);
        tracing::info!(
            fingerprint = %lease.fingerprint.short(),
            attempt = attempts,
            kind = %kind,
            error = message,
            "Job re-queued for retry"
        );
        FailOutcome::Retrying {
            next_attempt: attempts + 1,
        }
    }

    /// Fail every lease that expired at or before `now`.
    pub fn reap_expired(&self, now: Instant) -> usize {
        let expired: Vec<WorkerLease> = {
            let state = self.state.lock();
            state
                .jobs
                .values()
                .filter_map(|job| job.lease.as_ref())
                .filter(|lease| lease.expires_at <= now)
                .cloned()
                .collect()
        };

        expired
            .iter()
            .filter(|lease| {
                tracing::warn!(
                    lease_id = %lease.id,
                    worker_id = lease.worker_id,
                    fingerprint = %lease.fingerprint.short(),
                    "Lease expired"
                );
                self.fail(lease, FailureKind::LeaseTimeout, "worker lease expired") != FailOutcome::Stale
            })
            .count()
    }

    /// Cancel a request.
    ///
    /// A pending request leaves the queue (its job too, if nobody else waits
    /// on it). A running request only stops waiting; the computation still
    /// finishes and populates the cache.
    pub fn cancel(&self, request_id: &Uuid) -> Result<ScanRecord, DispatchError> {
        let mut state = self.state.lock();
        let record = self
            .store
            .get(request_id)
            .ok_or(StatusError::NotFound(*request_id))?;
        if record.status().is_terminal() {
            return Ok(record);
        }

        let fingerprint = record.request.fingerprint;
        let mut dequeued = false;
        if let Some(job) = state.jobs.get_mut(&fingerprint) {
            job.waiters.retain(|w| w != request_id);
            if job.waiters.is_empty() && job.lease.is_none() {
                state.jobs.remove(&fingerprint);
                state.pending.retain(|f| *f != fingerprint);
                dequeued = true;
            }
        }
        self.store
            .set_status(request_id, ScanStatus::Cancelled, None, None)?;
        metrics::gauge!("scan_queue_depth").set(state.pending.len() as f64);

        tracing::info!(
            request_id = %request_id,
            was = %record.status(),
            dequeued,
            "Scan cancelled"
        );
        self.store
            .get(request_id)
            .ok_or_else(|| StatusError::NotFound(*request_id).into())
    }

    pub fn stats(&self) -> DispatchStats {
        self.state.lock().stats()
    }

    /// Status writes for waiters; a waiter that was cancelled meanwhile is
    /// already terminal and simply skipped.
    fn advance(
        &self,
        request_id: &Uuid,
        status: ScanStatus,
        result: Option<Arc<IdentificationResult>>,
        failure: Option<ScanFailure>,
    ) {
        if let Err(e) = self.store.set_status(request_id, status, result, failure) {
            tracing::trace!(request_id = %request_id, error = %e, "Skipped status update");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Queue is full ({depth} pending jobs), retry later")]
    Overloaded { depth: usize },

    #[error(transparent)]
    Status(#[from] StatusError),
}
