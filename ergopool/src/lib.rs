//! Stratum mining pool server for Ergo.
//!
//! The crate is a library plus the `ergopoold` daemon. The module split
//! follows the runtime layout: [`stratum`] owns miner connections,
//! [`job_manager`] owns job state and share adjudication, and [`pool`]
//! bridges both to the upstream node through [`node`].

pub mod candidate;
pub mod config;
pub mod counter;
pub mod error;
pub mod job;
pub mod job_manager;
pub mod node;
pub mod pool;
pub mod pow;
pub mod share;
pub mod stratum;
pub mod tracing;
pub mod u256;

pub use error::{Error, Result};
