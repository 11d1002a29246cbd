//! Upstream node HTTP client.
//!
//! The pool talks to a single Ergo node over its REST API: `info` for
//! protocol parameters and chain difficulty, `mining/candidate` (or
//! `mining/candidateWithTxs` in collateral mode) for work, and
//! `mining/solution` to claim a block. The orchestrator consumes this
//! through the [`NodeClient`] trait so tests can substitute a stub node.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::candidate::MiningCandidate;
use crate::error::{Error, Result};
use crate::tracing::prelude::*;
use crate::u256::U256;

/// Fixed group element the node expects in pool solution submissions.
const SOLUTION_W: &str = "02a7955281885bf0f0ca4a48678848cad8dc5b328ce8bc1d4481d041c98e891ff3";

const API_KEY_HEADER: &str = "api_key";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub protocol_version: i32,
    pub chain_difficulty: U256,
}

#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Whether the node answers at all.
    async fn is_online(&self) -> bool;

    /// Protocol parameters and current chain difficulty.
    async fn info(&self) -> Result<NodeInfo>;

    /// Fetch a mining candidate, optionally posting a collateral
    /// transaction alongside the request.
    async fn mining_candidate(
        &self,
        protocol_version: i32,
        collateral_payload: Option<&str>,
    ) -> Result<MiningCandidate>;

    /// Submit a full solution nonce. Returns whether the node took it.
    async fn submit_solution(&self, nonce: &[u8], payout_key: &str) -> Result<bool>;
}

#[derive(Debug)]
pub struct HttpNodeClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpNodeClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        if !base_url.ends_with('/') {
            return Err(Error::Config(format!(
                "node api url must end with a slash: {base_url}"
            )));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("ergopool/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.to_string(),
            api_key,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_key(self.http.get(self.url(path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_key(self.http.post(self.url(path)))
    }

    fn with_key(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn is_online(&self) -> bool {
        match self.get("info").send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "node unreachable");
                false
            }
        }
    }

    async fn info(&self) -> Result<NodeInfo> {
        let value: Value = self
            .get("info")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_info(&value)
    }

    async fn mining_candidate(
        &self,
        protocol_version: i32,
        collateral_payload: Option<&str>,
    ) -> Result<MiningCandidate> {
        let response = match collateral_payload {
            // The payload is already a JSON transaction; the endpoint
            // wants it wrapped in a one-element array.
            Some(payload) => {
                self.post("mining/candidateWithTxs")
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(format!("[{payload}]"))
                    .send()
                    .await?
            }
            None => self.get("mining/candidate").send().await?,
        };
        let value: Value = response.error_for_status()?.json().await?;
        MiningCandidate::from_json(&value, protocol_version)
    }

    async fn submit_solution(&self, nonce: &[u8], payout_key: &str) -> Result<bool> {
        let response = self
            .post("mining/solution")
            .json(&solution_body(nonce, payout_key))
            .send()
            .await?;
        let accepted = response.status().is_success();
        if !accepted {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(%status, response = %text, "node rejected solution");
        }
        Ok(accepted)
    }
}

fn parse_info(value: &Value) -> Result<NodeInfo> {
    let protocol_version = value
        .pointer("/parameters/blockVersion")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Protocol("info response missing parameters.blockVersion".into()))?
        as i32;
    let chain_difficulty = value
        .get("difficulty")
        .and_then(U256::from_json)
        .ok_or_else(|| Error::Protocol("info response missing difficulty".into()))?;
    Ok(NodeInfo {
        protocol_version,
        chain_difficulty,
    })
}

fn solution_body(nonce: &[u8], payout_key: &str) -> Value {
    json!({
        "pk": payout_key,
        "w": SOLUTION_W,
        "n": hex::encode(nonce),
        "d": 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info() {
        let value: Value = serde_json::from_str(
            r#"{"parameters": {"blockVersion": 3}, "difficulty": 74828412409843066196069914}"#,
        )
        .unwrap();
        let info = parse_info(&value).unwrap();
        assert_eq!(info.protocol_version, 3);
        assert_eq!(
            info.chain_difficulty,
            "74828412409843066196069914".parse::<U256>().unwrap()
        );
    }

    #[test]
    fn test_parse_info_requires_difficulty() {
        let value = json!({"parameters": {"blockVersion": 3}});
        assert!(parse_info(&value).is_err());
    }

    #[test]
    fn test_base_url_must_end_with_slash() {
        let err = HttpNodeClient::new("http://127.0.0.1:9052", None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_url_join() {
        let client = HttpNodeClient::new("http://127.0.0.1:9052/", None).unwrap();
        assert_eq!(
            client.url("mining/candidate"),
            "http://127.0.0.1:9052/mining/candidate"
        );
    }

    #[test]
    fn test_solution_body_shape() {
        let body = solution_body(&[0xb2, 0xa5, 0x00, 0x20, 0x00, 0x04, 0xaf, 0x01], "02cc");
        assert_eq!(
            body,
            json!({
                "pk": "02cc",
                "w": SOLUTION_W,
                "n": "b2a500200004af01",
                "d": 0,
            })
        );
    }
}
