//! Job lifecycle and share adjudication.
//!
//! # Architecture
//!
//! The manager is the single authority over which jobs exist and which are
//! still submittable. All of its state lives behind one mutex: the current
//! job, the valid-job map, and each job's submission set. Template
//! processing and share adjudication both take that lock for their full
//! critical section, so a share can never be judged against a job that a
//! new-block transition is concurrently evicting, and hit evaluation never
//! runs for a job that has already been retired.
//!
//! Lifecycle notifications leave through a broadcast channel after the lock
//! is released. Subscribers are fixed by construction: every connection
//! session (which pushes `mining.notify` lines) and the pool orchestrator
//! (which submits blocks and persists supplementary proofs). Slow
//! subscribers lag and re-sync; they never block adjudication.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::candidate::MiningCandidate;
use crate::counter::{ExtraNonceCounter, JobCounter, NONCE_BYTES};
use crate::error::Result;
use crate::job::{Job, Submission};
use crate::pow::{self, HitProvider};
use crate::share::{
    AcceptedShare, RejectedShare, ShareErrorKind, ShareOutcome, ShareSubmit, SuperSharePolicy,
};
use crate::tracing::prelude::*;
use crate::u256::U256;

/// Buffered events per subscriber before it starts lagging.
const EVENT_BUFFER: usize = 256;

/// Lifecycle events fanned out to sessions and the orchestrator.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A genuinely new block: all prior jobs were just retired.
    NewBlock(Arc<Job>),
    /// The current block's work was refreshed; prior jobs stay valid.
    UpdatedBlock(Arc<Job>),
    /// A submission was adjudicated.
    Share(ShareOutcome),
}

struct State {
    current: Option<Arc<Job>>,
    valid: HashMap<String, Arc<Job>>,
}

/// Owner of the current job, the valid-job set, and share adjudication.
pub struct JobManager {
    state: Mutex<State>,
    job_ids: JobCounter,
    extra_nonces: ExtraNonceCounter,
    pool_target: U256,
    reduced_share_messages: bool,
    pow: Arc<dyn HitProvider>,
    super_shares: Arc<dyn SuperSharePolicy>,
    events: broadcast::Sender<JobEvent>,
}

impl JobManager {
    pub fn new(
        pool_target: U256,
        extra_nonce1_size: usize,
        reduced_share_messages: bool,
        pow: Arc<dyn HitProvider>,
        super_shares: Arc<dyn SuperSharePolicy>,
    ) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Ok(Self {
            state: Mutex::new(State {
                current: None,
                valid: HashMap::new(),
            }),
            job_ids: JobCounter::new(),
            extra_nonces: ExtraNonceCounter::new(extra_nonce1_size)?,
            pool_target,
            reduced_share_messages,
            pow,
            super_shares,
            events,
        })
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Allocate a nonce prefix for a subscribing connection.
    pub fn extra_nonce1(&self) -> Vec<u8> {
        self.extra_nonces.next()
    }

    /// Nonce bytes a miner must supply per submission.
    pub fn extra_nonce2_size(&self) -> usize {
        self.extra_nonces.extra_nonce2_size()
    }

    /// The job most recently announced, if any.
    pub fn current_job(&self) -> Option<Arc<Job>> {
        self.state.lock().current.clone()
    }

    /// Decide whether `candidate` starts a new block and rotate jobs if so.
    ///
    /// A candidate with the current job's message is the same work and a
    /// no-op. A different message at a lower height is out-of-order news
    /// and also a no-op. Anything else retires every valid job, installs a
    /// fresh one, and announces `NewBlock`.
    pub fn process_template(&self, candidate: MiningCandidate, used_collateral: bool) -> bool {
        let mut state = self.state.lock();
        if let Some(current) = &state.current {
            if candidate.msg == current.candidate.msg {
                return false;
            }
            if candidate.height < current.candidate.height {
                debug!(
                    height = candidate.height,
                    current_height = current.candidate.height,
                    "ignoring out-of-order candidate"
                );
                return false;
            }
        }

        let job = self.build_job(candidate, used_collateral);
        state.valid.clear();
        state.valid.insert(job.job_id.clone(), job.clone());
        state.current = Some(job.clone());
        drop(state);

        info!(
            job_id = %job.job_id,
            height = job.candidate.height,
            "new block, prior jobs retired"
        );
        self.send(JobEvent::NewBlock(job));
        true
    }

    /// Install a refreshed job for the same block without retiring others.
    ///
    /// Used when the block's transaction commitment changes but the height
    /// does not; shares against earlier refreshes remain valid.
    pub fn update_current_job(
        &self,
        candidate: MiningCandidate,
        used_collateral: bool,
    ) -> Arc<Job> {
        let job = self.build_job(candidate, used_collateral);
        let mut state = self.state.lock();
        state.valid.insert(job.job_id.clone(), job.clone());
        state.current = Some(job.clone());
        drop(state);

        debug!(job_id = %job.job_id, height = job.candidate.height, "current job refreshed");
        self.send(JobEvent::UpdatedBlock(job.clone()));
        job
    }

    /// Adjudicate a submission and announce the outcome.
    ///
    /// Checks run cheapest-first so malformed, stale, and duplicate
    /// submissions never pay for a hit evaluation.
    pub fn process_share(
        &self,
        submit: ShareSubmit,
    ) -> std::result::Result<AcceptedShare, ShareErrorKind> {
        let result = self.adjudicate(&submit);
        match &result {
            Ok(share) => {
                if share.is_block {
                    info!(
                        job_id = %share.job.job_id,
                        height = share.job.candidate.height,
                        peer = %share.peer,
                        worker = %share.worker,
                        "block solution accepted"
                    );
                } else {
                    debug!(
                        job_id = %share.job.job_id,
                        peer = %share.peer,
                        worker = %share.worker,
                        "share accepted"
                    );
                }
                self.send(JobEvent::Share(ShareOutcome::Accepted(share.clone())));
            }
            Err(kind) => {
                debug!(
                    job_id = %submit.job_id,
                    peer = %submit.peer,
                    worker = %submit.worker,
                    error_id = kind.id(),
                    "share rejected: {kind}"
                );
                self.send(JobEvent::Share(ShareOutcome::Rejected(RejectedShare {
                    kind: *kind,
                    job_id: submit.job_id.clone(),
                    peer: submit.peer,
                    worker: submit.worker.clone(),
                })));
            }
        }
        result
    }

    fn adjudicate(
        &self,
        submit: &ShareSubmit,
    ) -> std::result::Result<AcceptedShare, ShareErrorKind> {
        let state = self.state.lock();

        if submit.extra_nonce2.len() != self.extra_nonces.extra_nonce2_size() {
            return Err(ShareErrorKind::BadExtraNonceSize);
        }

        let job = state
            .valid
            .get(&submit.job_id)
            .cloned()
            .ok_or(ShareErrorKind::StaleJob)?;

        let mut nonce = Vec::with_capacity(NONCE_BYTES);
        nonce.extend_from_slice(&submit.extra_nonce1);
        nonce.extend_from_slice(&submit.extra_nonce2);
        if nonce.len() != NONCE_BYTES {
            return Err(ShareErrorKind::BadNonceSize);
        }

        let recorded = job.register_submission(Submission {
            extra_nonce1: submit.extra_nonce1.clone(),
            extra_nonce2: submit.extra_nonce2.clone(),
            time: submit.time.clone(),
            nonce: nonce.clone(),
        });
        if !recorded {
            return Err(ShareErrorKind::DuplicateShare);
        }

        let n = pow::memory_size(job.candidate.height);
        let hit = self
            .pow
            .hit(&job.candidate.msg, &nonce, job.candidate.height, n);

        if job.candidate.network_target >= hit {
            let is_super_share = self.super_shares.is_super_share(&hit, &job);
            return Ok(AcceptedShare {
                block_hash: hit.to_be_bytes().to_vec(),
                is_block: true,
                is_super_share,
                nonce,
                difficulty: submit.difficulty,
                peer: submit.peer,
                worker: submit.worker.clone(),
                job,
            });
        }
        if job.pool_target <= hit {
            return Err(ShareErrorKind::LowDifficulty);
        }
        let is_super_share = self.super_shares.is_super_share(&hit, &job);
        Ok(AcceptedShare {
            block_hash: Vec::new(),
            is_block: false,
            is_super_share,
            nonce,
            difficulty: submit.difficulty,
            peer: submit.peer,
            worker: submit.worker.clone(),
            job,
        })
    }

    fn build_job(&self, candidate: MiningCandidate, used_collateral: bool) -> Arc<Job> {
        Arc::new(Job::new(
            self.job_ids.next_id(),
            candidate,
            self.pool_target,
            used_collateral,
            self.reduced_share_messages,
        ))
    }

    fn send(&self, event: JobEvent) {
        if self.events.send(event).is_err() {
            trace!("no event subscribers");
        }
    }
}
