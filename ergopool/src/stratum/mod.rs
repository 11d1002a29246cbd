//! Stratum server for Ergo miners.
//!
//! # Protocol Overview
//!
//! Stratum is a line-delimited JSON-RPC dialect. Miners send three request
//! kinds:
//!
//! - `mining.subscribe`: allocate a nonce prefix and start receiving work
//! - `mining.authorize`: register a worker name (always granted)
//! - `mining.submit`: claim a proof-of-work solution for a job
//!
//! The server pushes two notification kinds, both with a `null` id:
//!
//! - `mining.set_difficulty`: advertised once after subscribe
//! - `mining.notify`: announce the current job's wire parameters
//!
//! # Architecture
//!
//! [`StratumServer`] owns the listener and a subscription-id counter. Each
//! accepted connection becomes one [`Session`] task holding the framed
//! socket and the connection's nonce prefix. Sessions receive job
//! lifecycle events over a broadcast channel and translate them into
//! `mining.notify` pushes; inbound submissions go straight to the job
//! manager for adjudication.
//!
//! Message shapes live in [`protocol`]; they are plain `serde_json`
//! values since half the protocol is positional arrays.

pub mod protocol;
pub mod server;
pub mod session;

pub use protocol::{JsonRpcMessage, SubmitParams};
pub use server::StratumServer;
pub use session::Session;
