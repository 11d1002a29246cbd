//! Stratum wire messages.
//!
//! Stratum has no formal specification. This follows the JSON-RPC dialect
//! spoken by Ergo miners: one JSON object per line, requests carrying a
//! `method` and positional `params`, responses echoing the request id with
//! both `result` and `error` slots present. Server-initiated announcements
//! are requests with a `null` id that never receive a reply.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const METHOD_SUBSCRIBE: &str = "mining.subscribe";
pub const METHOD_AUTHORIZE: &str = "mining.authorize";
pub const METHOD_SUBMIT: &str = "mining.submit";
pub const METHOD_NOTIFY: &str = "mining.notify";
pub const METHOD_SET_DIFFICULTY: &str = "mining.set_difficulty";

/// A single line of Stratum traffic, either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request {
        #[serde(default)]
        id: Option<Value>,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Response {
        id: Value,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<Value>,
    },
}

impl JsonRpcMessage {
    pub fn response(id: Value, result: Value) -> Self {
        Self::Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error_response(id: Value, message: &str) -> Self {
        Self::Response {
            id,
            result: None,
            error: Some(Value::String(message.to_string())),
        }
    }

    pub fn notification(method: &str, params: Vec<Value>) -> Self {
        Self::Request {
            id: None,
            method: method.to_string(),
            params: Value::Array(params),
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } => Some(method),
            Self::Response { .. } => None,
        }
    }
}

/// `mining.set_difficulty` announcement.
///
/// The advertised difficulty is fixed at 1.0; share acceptance is really
/// governed by the pool target baked into job params.
pub fn set_difficulty() -> JsonRpcMessage {
    JsonRpcMessage::notification(METHOD_SET_DIFFICULTY, vec![json!(1.0)])
}

/// `mining.notify` announcement carrying a job's prebuilt params.
pub fn notify(job_params: &[Value]) -> JsonRpcMessage {
    JsonRpcMessage::notification(METHOD_NOTIFY, job_params.to_vec())
}

/// `mining.subscribe` result: notification bindings, the connection's
/// nonce prefix, and how many nonce bytes the miner must roll itself.
pub fn subscribe_result(
    subscription_id: &str,
    extra_nonce1: &str,
    extra_nonce2_size: usize,
) -> Value {
    json!([
        [
            [METHOD_SET_DIFFICULTY, subscription_id],
            [METHOD_NOTIFY, subscription_id],
        ],
        extra_nonce1,
        extra_nonce2_size,
    ])
}

/// Positional params of a `mining.submit` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitParams {
    pub worker: String,
    pub job_id: String,
    pub extra_nonce2: Vec<u8>,
    pub time: String,
}

impl SubmitParams {
    pub fn from_stratum_params(params: &Value) -> Result<Self, String> {
        let params = params.as_array().ok_or("params must be an array")?;
        if params.len() < 4 {
            return Err(format!("expected 4 submit params, got {}", params.len()));
        }
        let worker = params[0]
            .as_str()
            .ok_or("worker name must be a string")?
            .to_string();
        let job_id = params[1]
            .as_str()
            .ok_or("job id must be a string")?
            .to_string();
        let extra_nonce2 = params[2].as_str().ok_or("extraNonce2 must be a string")?;
        let extra_nonce2 =
            hex::decode(extra_nonce2).map_err(|e| format!("extraNonce2 is not valid hex: {e}"))?;
        let time = params[3]
            .as_str()
            .ok_or("time must be a string")?
            .to_string();
        Ok(Self {
            worker,
            job_id,
            extra_nonce2,
            time,
        })
    }
}
