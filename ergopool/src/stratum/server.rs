//! Stratum TCP listener.
//!
//! Accepts miner connections and hands each one to a [`Session`] task with
//! its own job-event subscription. The listener itself holds no protocol
//! state; everything per-connection lives in the session, everything shared
//! lives in the [`JobManager`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::counter::SubscriptionIdCounter;
use crate::error::Result;
use crate::job_manager::JobManager;
use crate::stratum::session::Session;
use crate::tracing::prelude::*;

pub struct StratumServer {
    listener: TcpListener,
    manager: Arc<JobManager>,
    subscription_ids: SubscriptionIdCounter,
    connection_timeout: Duration,
}

impl StratumServer {
    pub async fn bind(
        listen: SocketAddr,
        connection_timeout: Duration,
        manager: Arc<JobManager>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(listen).await?;
        info!(addr = %listener.local_addr()?, "stratum server listening");
        Ok(Self {
            listener,
            manager,
            subscription_ids: SubscriptionIdCounter::new(),
            connection_timeout,
        })
    }

    /// The bound address, useful when listening on an ephemeral port.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown, then drain open sessions.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let sessions = TaskTracker::new();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let session = Session::new(
                            peer,
                            self.subscription_ids.next_id(),
                            self.manager.clone(),
                            self.connection_timeout,
                        );
                        let events = self.manager.subscribe();
                        sessions.spawn(session.run(stream, events, shutdown.clone()));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                },
            }
        }
        sessions.close();
        sessions.wait().await;
        info!("stratum server stopped");
        Ok(())
    }
}
