//! Pool jobs: candidates wrapped with an id, a pool target, and submission
//! bookkeeping.
//!
//! A `Job` never changes after construction except for its set of accepted
//! submissions, which exists purely for duplicate detection. The wire
//! parameters miners receive are derived once and cached for the job's
//! lifetime.

use std::collections::HashSet;
use std::sync::OnceLock;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::candidate::MiningCandidate;
use crate::u256::U256;

/// The tuple that identifies one submission for duplicate detection.
///
/// Equality on this tuple is the only thing the dedup set cares about; it
/// does not imply the submission was a valid share.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Submission {
    pub extra_nonce1: Vec<u8>,
    pub extra_nonce2: Vec<u8>,
    pub time: String,
    pub nonce: Vec<u8>,
}

/// One unit of miner-facing work.
#[derive(Debug)]
pub struct Job {
    /// Pool-assigned id, unique for the process lifetime.
    pub job_id: String,
    /// The candidate this job was built from.
    pub candidate: MiningCandidate,
    /// Difficulty threshold a submission must beat to count as a share.
    pub pool_target: U256,
    /// Whether the candidate was fetched through the collateral path.
    pub used_collateral: bool,
    reduced_share_messages: bool,
    submissions: Mutex<HashSet<Submission>>,
    params: OnceLock<Vec<Value>>,
}

impl Job {
    pub fn new(
        job_id: String,
        candidate: MiningCandidate,
        pool_target: U256,
        used_collateral: bool,
        reduced_share_messages: bool,
    ) -> Self {
        Self {
            job_id,
            candidate,
            pool_target,
            used_collateral,
            reduced_share_messages,
            submissions: Mutex::new(HashSet::new()),
            params: OnceLock::new(),
        }
    }

    /// Record a submission, returning false if its tuple was already seen.
    pub fn register_submission(&self, submission: Submission) -> bool {
        self.submissions.lock().insert(submission)
    }

    /// The `mining.notify` parameter array for this job.
    ///
    /// Computed on first use and never again: `[jobId, height, hex(msg), "",
    /// "", hex(version), poolTarget, "", true]`. With reduced share messages
    /// configured, the pool-target field carries `poolTarget / 1000` to keep
    /// announcement lines short.
    pub fn job_params(&self) -> &[Value] {
        self.params.get_or_init(|| {
            let target = if self.reduced_share_messages {
                self.pool_target / 1000u64
            } else {
                self.pool_target
            };
            vec![
                json!(self.job_id),
                json!(self.candidate.height),
                json!(hex::encode(&self.candidate.msg)),
                json!(""),
                json!(""),
                json!(format!("{:x}", self.candidate.version)),
                json!(target.to_string()),
                json!(""),
                json!(true),
            ]
        })
    }
}
