//! Upstream mining candidates.
//!
//! A candidate is the node's snapshot of mineable work: the header
//! commitment to prove, the height it sits at, and the network target a
//! full solution must clear. Candidates are immutable once parsed; the job
//! layer wraps them without copying or revalidating.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::u256::U256;

/// One unit of work as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningCandidate {
    /// Block header commitment to be proven.
    pub msg: Vec<u8>,
    /// Block height the candidate builds at.
    pub height: u64,
    /// Block/protocol version, taken from node info rather than the
    /// candidate object itself.
    pub version: i32,
    /// Network acceptance threshold: a hit at or below this is a block.
    pub network_target: U256,
    /// Reward destination for a found block.
    pub payout_key: Option<String>,
    /// Collateral-mode proof, opaque here.
    pub proof: Option<String>,
    /// Collateral-mode transaction id, opaque here.
    pub tx_id: Option<String>,
}

impl MiningCandidate {
    /// Parse a `/mining/candidate` response object.
    ///
    /// Manual field-by-field parsing keeps the error messages specific, and
    /// lets `b` arrive as either a (possibly >64-bit) JSON number or a
    /// string.
    pub fn from_json(value: &Value, version: i32) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Protocol("candidate is not an object".into()))?;

        let msg_hex = obj
            .get("msg")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("candidate msg missing or not a string".into()))?;
        let msg = hex::decode(msg_hex)
            .map_err(|e| Error::Protocol(format!("candidate msg hex: {e}")))?;

        let height = obj
            .get("h")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::Protocol("candidate h missing or not an integer".into()))?;

        let network_target = obj
            .get("b")
            .and_then(U256::from_json)
            .ok_or_else(|| Error::Protocol("candidate b missing or not an integer".into()))?;

        let payout_key = obj.get("pk").and_then(Value::as_str).map(str::to_owned);
        let proof = obj.get("proof").and_then(Value::as_str).map(str::to_owned);
        let tx_id = obj.get("txId").and_then(Value::as_str).map(str::to_owned);

        Ok(Self {
            msg,
            height,
            version,
            network_target,
            payout_key,
            proof,
            tx_id,
        })
    }
}
