//! Share submissions and their adjudication outcomes.
//!
//! The session layer decodes a `mining.submit` request into a
//! [`ShareSubmit`] and hands it to the job manager, which answers with an
//! [`AcceptedShare`] or a [`ShareErrorKind`]. The same outcome also travels
//! to event subscribers, so both carry enough context for logging and for
//! the orchestrator's side effects without another lookup.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

use crate::job::Job;
use crate::u256::U256;

/// A decoded `mining.submit`, plus the submitting connection's identity.
#[derive(Debug, Clone)]
pub struct ShareSubmit {
    pub job_id: String,
    /// Difficulty the share is claimed at. Sessions always submit at 1.
    pub difficulty: U256,
    /// Pool-assigned nonce prefix of the submitting connection.
    pub extra_nonce1: Vec<u8>,
    /// Miner-chosen nonce segment.
    pub extra_nonce2: Vec<u8>,
    /// Time string, echoed into duplicate detection but otherwise opaque.
    pub time: String,
    pub peer: SocketAddr,
    pub worker: String,
}

/// Why a submission was rejected.
///
/// The display strings are part of the wire protocol; miners match on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShareErrorKind {
    #[error("incorrect size of extraNonce2")]
    BadExtraNonceSize,
    #[error("solution was for old block")]
    StaleJob,
    #[error("incorrect size of nonce")]
    BadNonceSize,
    #[error("duplicate share")]
    DuplicateShare,
    #[error("Low difficulty share")]
    LowDifficulty,
}

impl ShareErrorKind {
    /// Stratum error id reported to the miner.
    pub fn id(&self) -> u32 {
        match self {
            ShareErrorKind::BadExtraNonceSize | ShareErrorKind::BadNonceSize => 20,
            ShareErrorKind::StaleJob => 21,
            ShareErrorKind::DuplicateShare => 22,
            ShareErrorKind::LowDifficulty => 32,
        }
    }

    /// The full `"<id>: <message>"` string sent in submit error responses.
    pub fn wire_message(&self) -> String {
        format!("{}: {}", self.id(), self)
    }
}

/// A submission that cleared the pool target (and possibly the network
/// target).
#[derive(Debug, Clone)]
pub struct AcceptedShare {
    /// The job the share was adjudicated against.
    pub job: Arc<Job>,
    /// Full 8-byte nonce, `extraNonce1 ‖ extraNonce2`.
    pub nonce: Vec<u8>,
    /// Big-endian hit bytes when `is_block`, empty otherwise.
    pub block_hash: Vec<u8>,
    /// The hit also cleared the network target: this is a full solution.
    pub is_block: bool,
    /// The hit cleared the supplementary-proof threshold.
    pub is_super_share: bool,
    pub difficulty: U256,
    pub peer: SocketAddr,
    pub worker: String,
}

/// A submission that was turned away, with the taxonomy kind.
#[derive(Debug, Clone)]
pub struct RejectedShare {
    pub kind: ShareErrorKind,
    pub job_id: String,
    pub peer: SocketAddr,
    pub worker: String,
}

/// Adjudication result as carried by share events.
#[derive(Debug, Clone)]
pub enum ShareOutcome {
    Accepted(AcceptedShare),
    Rejected(RejectedShare),
}

/// Supplementary-proof classification.
///
/// The threshold and scheme live outside this server; the default policy
/// classifies nothing. The hit and job are all an external policy needs.
pub trait SuperSharePolicy: Send + Sync {
    fn is_super_share(&self, hit: &U256, job: &Job) -> bool;
}

/// Policy that never classifies a share as a super share.
pub struct NoSuperShares;

impl SuperSharePolicy for NoSuperShares {
    fn is_super_share(&self, _hit: &U256, _job: &Job) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ShareErrorKind::BadExtraNonceSize, "20: incorrect size of extraNonce2")]
    #[test_case(ShareErrorKind::StaleJob, "21: solution was for old block")]
    #[test_case(ShareErrorKind::BadNonceSize, "20: incorrect size of nonce")]
    #[test_case(ShareErrorKind::DuplicateShare, "22: duplicate share")]
    #[test_case(ShareErrorKind::LowDifficulty, "32: Low difficulty share")]
    fn test_wire_messages(kind: ShareErrorKind, expected: &str) {
        assert_eq!(kind.wire_message(), expected);
    }

    #[test]
    fn test_size_errors_share_an_id() {
        assert_eq!(ShareErrorKind::BadExtraNonceSize.id(), 20);
        assert_eq!(ShareErrorKind::BadNonceSize.id(), 20);
    }
}
