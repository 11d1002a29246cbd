//! Per-connection Stratum session.
//!
//! Each accepted socket gets one session task. The task owns the framed
//! stream, the connection's nonce prefix, and the subscription id; it
//! multiplexes three inputs with `select!`: inbound request lines, job
//! lifecycle events to fan out as `mining.notify`, and shutdown. A
//! connection that sends nothing before the first-message timeout is
//! closed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;

use crate::job_manager::{JobEvent, JobManager};
use crate::share::{ShareErrorKind, ShareSubmit};
use crate::stratum::protocol::{self, JsonRpcMessage, SubmitParams};
use crate::tracing::prelude::*;
use crate::u256::U256;

/// Longest inbound line accepted before the connection is dropped.
const MAX_LINE_LENGTH: usize = 16 * 1024;

type Lines = Framed<TcpStream, LinesCodec>;

pub struct Session {
    peer: SocketAddr,
    subscription_id: String,
    manager: Arc<JobManager>,
    first_message_timeout: Duration,
    extra_nonce1: Option<Vec<u8>>,
    authorized_worker: Option<String>,
}

impl Session {
    pub fn new(
        peer: SocketAddr,
        subscription_id: String,
        manager: Arc<JobManager>,
        first_message_timeout: Duration,
    ) -> Self {
        Self {
            peer,
            subscription_id,
            manager,
            first_message_timeout,
            extra_nonce1: None,
            authorized_worker: None,
        }
    }

    /// Drive the connection until the peer goes away or shutdown begins.
    pub async fn run(
        mut self,
        stream: TcpStream,
        mut events: broadcast::Receiver<JobEvent>,
        shutdown: CancellationToken,
    ) {
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        debug!(peer = %self.peer, "connection open");

        let idle = tokio::time::sleep(self.first_message_timeout);
        tokio::pin!(idle);
        let mut saw_message = false;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = &mut idle, if !saw_message => {
                    info!(peer = %self.peer, "no request before the connection timeout, closing");
                    break;
                }
                event = events.recv() => match event {
                    Ok(JobEvent::NewBlock(job)) | Ok(JobEvent::UpdatedBlock(job)) => {
                        if self.extra_nonce1.is_some()
                            && !self.send(&mut framed, protocol::notify(job.job_params())).await
                        {
                            break;
                        }
                    }
                    Ok(JobEvent::Share(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(peer = %self.peer, skipped, "session lagged behind job events");
                        if self.extra_nonce1.is_some() {
                            if let Some(job) = self.manager.current_job() {
                                if !self.send(&mut framed, protocol::notify(job.job_params())).await {
                                    break;
                                }
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                line = framed.next() => match line {
                    Some(Ok(line)) => {
                        saw_message = true;
                        if !self.handle_line(&mut framed, &line).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(peer = %self.peer, error = %e, "dropping connection");
                        break;
                    }
                    None => break,
                },
            }
        }
        debug!(peer = %self.peer, "connection closed");
    }

    /// Returns false when the connection should be torn down.
    async fn handle_line(&mut self, framed: &mut Lines, line: &str) -> bool {
        let msg: JsonRpcMessage = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "unparseable line ignored");
                return true;
            }
        };
        let (id, method, params) = match msg {
            JsonRpcMessage::Request { id, method, params } => (id, method, params),
            JsonRpcMessage::Response { .. } => {
                debug!(peer = %self.peer, "ignoring response from peer");
                return true;
            }
        };
        let id = id.unwrap_or(Value::Null);
        match method.as_str() {
            protocol::METHOD_SUBSCRIBE => self.on_subscribe(framed, id).await,
            protocol::METHOD_AUTHORIZE => self.on_authorize(framed, id, &params).await,
            protocol::METHOD_SUBMIT => self.on_submit(framed, id, &params).await,
            other => {
                warn!(peer = %self.peer, method = other, "unknown method ignored");
                true
            }
        }
    }

    async fn on_subscribe(&mut self, framed: &mut Lines, id: Value) -> bool {
        // Every subscribe gets a fresh prefix, including re-subscribes.
        let extra_nonce1 = self.manager.extra_nonce1();
        self.extra_nonce1 = Some(extra_nonce1.clone());

        let result = protocol::subscribe_result(
            &self.subscription_id,
            &hex::encode(&extra_nonce1),
            self.manager.extra_nonce2_size(),
        );
        info!(
            peer = %self.peer,
            extra_nonce1 = %hex::encode(&extra_nonce1),
            "miner subscribed"
        );

        if !self.send(framed, JsonRpcMessage::response(id, result)).await {
            return false;
        }
        if !self.send(framed, protocol::set_difficulty()).await {
            return false;
        }
        if let Some(job) = self.manager.current_job() {
            return self.send(framed, protocol::notify(job.job_params())).await;
        }
        true
    }

    async fn on_authorize(&mut self, framed: &mut Lines, id: Value, params: &Value) -> bool {
        let worker = params
            .get(0)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        info!(peer = %self.peer, worker = %worker, "worker authorized");
        self.authorized_worker = Some(worker);
        self.send(framed, JsonRpcMessage::response(id, json!(true)))
            .await
    }

    async fn on_submit(&mut self, framed: &mut Lines, id: Value, params: &Value) -> bool {
        let Some(extra_nonce1) = self.extra_nonce1.clone() else {
            return self
                .send(
                    framed,
                    JsonRpcMessage::error_response(id, "25: not subscribed"),
                )
                .await;
        };
        let submit = match SubmitParams::from_stratum_params(params) {
            Ok(submit) => submit,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "malformed submit dropped");
                return true;
            }
        };
        if self.authorized_worker.is_none() {
            debug!(peer = %self.peer, worker = %submit.worker, "submit before authorize");
        }

        let outcome = self.manager.process_share(ShareSubmit {
            job_id: submit.job_id,
            difficulty: U256::from(1u64),
            extra_nonce1,
            extra_nonce2: submit.extra_nonce2,
            time: submit.time,
            peer: self.peer,
            worker: submit.worker,
        });
        match outcome {
            Ok(_) => {
                self.send(framed, JsonRpcMessage::response(id, json!(true)))
                    .await
            }
            // A stale submission still gets a positive reply, plus a fresh
            // notify so the miner abandons the old block.
            Err(ShareErrorKind::StaleJob) => {
                if !self
                    .send(framed, JsonRpcMessage::response(id, json!(true)))
                    .await
                {
                    return false;
                }
                match self.manager.current_job() {
                    Some(job) => self.send(framed, protocol::notify(job.job_params())).await,
                    None => true,
                }
            }
            Err(kind) => {
                self.send(
                    framed,
                    JsonRpcMessage::error_response(id, &kind.wire_message()),
                )
                .await
            }
        }
    }

    async fn send(&self, framed: &mut Lines, msg: JsonRpcMessage) -> bool {
        let line = match serde_json::to_string(&msg) {
            Ok(line) => line,
            Err(e) => {
                error!(peer = %self.peer, error = %e, "failed to encode message");
                return false;
            }
        };
        trace!(peer = %self.peer, line = %line, "send");
        if let Err(e) = framed.send(line).await {
            debug!(peer = %self.peer, error = %e, "send failed, closing");
            return false;
        }
        true
    }
}
