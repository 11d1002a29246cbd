//! Pool orchestrator.
//!
//! # Architecture
//!
//! One task bridges the job manager to the upstream node. On startup it
//! verifies the node is reachable, learns the protocol version and chain
//! difficulty, and installs an initial job. From then on it polls for a
//! fresh candidate on a fixed interval and reacts to share events:
//! accepted blocks are submitted upstream (followed by an immediate
//! re-poll, since the solved block may already have advanced the chain)
//! and super shares are persisted through the [`SuperShareStore`].
//!
//! A failed poll leaves the previous job valid and is retried on the next
//! tick. A failed super-share persist is fatal: losing those proofs would
//! corrupt downstream payout accounting, so the orchestrator reports the
//! error and the process exits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::candidate::MiningCandidate;
use crate::error::{Error, Result};
use crate::job_manager::{JobEvent, JobManager};
use crate::node::NodeClient;
use crate::share::{AcceptedShare, ShareOutcome};
use crate::tracing::prelude::*;

/// A collateral transaction prepared by an external retriever.
#[derive(Debug, Clone)]
pub struct Collateral {
    pub payout_key: String,
    /// JSON transaction posted alongside the candidate request.
    pub payload: String,
    pub extra: String,
}

/// Source of collateral transactions for collateral-backed mining.
#[async_trait]
pub trait CollateralSource: Send + Sync {
    async fn collateral(&self) -> Result<Collateral>;
}

/// Proof material persisted for a super share.
#[derive(Debug, Clone)]
pub struct SuperShareProof {
    pub height: u64,
    pub nonce: Vec<u8>,
    pub msg: Vec<u8>,
}

/// Side store for super-share proofs, keyed by height.
#[async_trait]
pub trait SuperShareStore: Send + Sync {
    /// Returns whether the write stuck.
    async fn persist(&self, height: u64, score: u64, proof: &SuperShareProof) -> bool;
}

/// Store used when no super-share scheme is configured.
pub struct NullSuperShareStore;

#[async_trait]
impl SuperShareStore for NullSuperShareStore {
    async fn persist(&self, height: u64, _score: u64, _proof: &SuperShareProof) -> bool {
        trace!(height, "no super-share store configured");
        true
    }
}

pub struct Pool {
    node: Arc<dyn NodeClient>,
    manager: Arc<JobManager>,
    collateral: Option<Arc<dyn CollateralSource>>,
    super_shares: Arc<dyn SuperShareStore>,
    poll_interval: Duration,
    difficulty_multiplier: u64,
    protocol_version: i32,
    /// Payout key of the most recent candidate, kept as a fallback for
    /// block submission when a later candidate omits it.
    payout_key: Option<String>,
}

impl Pool {
    pub fn new(
        node: Arc<dyn NodeClient>,
        manager: Arc<JobManager>,
        collateral: Option<Arc<dyn CollateralSource>>,
        super_shares: Arc<dyn SuperShareStore>,
        poll_interval: Duration,
        difficulty_multiplier: u64,
    ) -> Self {
        Self {
            node,
            manager,
            collateral,
            super_shares,
            poll_interval,
            difficulty_multiplier,
            protocol_version: 1,
            payout_key: None,
        }
    }

    /// Poll the node and react to share events until shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        // Subscribe before installing the first job so no event is missed.
        let mut events = self.manager.subscribe();
        self.start().await?;

        let mut ticks = tokio::time::interval(self.poll_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticks.tick() => {
                    if let Err(e) = self.refresh_template().await {
                        warn!(error = %e, "candidate poll failed");
                    }
                }
                event = events.recv() => match event {
                    Ok(JobEvent::Share(ShareOutcome::Accepted(share))) => {
                        self.handle_accepted(share).await?;
                    }
                    Ok(JobEvent::Share(ShareOutcome::Rejected(_))) => {}
                    Ok(JobEvent::NewBlock(_)) | Ok(JobEvent::UpdatedBlock(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "orchestrator lagged behind share events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        info!("pool orchestrator stopped");
        Ok(())
    }

    /// Startup handshake: reachability, chain parameters, initial job.
    ///
    /// An offline node is fatal here; once running, per-tick failures are
    /// only logged.
    async fn start(&mut self) -> Result<()> {
        if !self.node.is_online().await {
            return Err(Error::Pool("upstream node is offline".into()));
        }
        let info = self.node.info().await?;
        self.protocol_version = info.protocol_version;
        info!(
            protocol_version = info.protocol_version,
            chain_difficulty = %(info.chain_difficulty * self.difficulty_multiplier),
            "connected to upstream node"
        );
        self.refresh_template().await
    }

    async fn refresh_template(&mut self) -> Result<()> {
        let (candidate, used_collateral) = self.fetch_candidate().await?;
        if let Some(pk) = &candidate.payout_key {
            self.payout_key = Some(pk.clone());
        }
        self.manager.process_template(candidate, used_collateral);
        Ok(())
    }

    async fn fetch_candidate(&self) -> Result<(MiningCandidate, bool)> {
        if let Some(source) = &self.collateral {
            match self.fetch_with_collateral(source.as_ref()).await {
                Ok(candidate) => return Ok((candidate, true)),
                Err(e) => {
                    warn!(error = %e, "collateral fetch failed, falling back to solo candidate");
                }
            }
        }
        let candidate = self
            .node
            .mining_candidate(self.protocol_version, None)
            .await?;
        Ok((candidate, false))
    }

    async fn fetch_with_collateral(
        &self,
        source: &dyn CollateralSource,
    ) -> Result<MiningCandidate> {
        let collateral = source.collateral().await?;
        let mut candidate = self
            .node
            .mining_candidate(self.protocol_version, Some(&collateral.payload))
            .await?;
        if candidate.payout_key.is_none() {
            candidate.payout_key = Some(collateral.payout_key);
        }
        Ok(candidate)
    }

    async fn handle_accepted(&mut self, share: AcceptedShare) -> Result<()> {
        if share.is_block {
            self.submit_block(&share).await;
        }
        if share.is_super_share {
            let proof = SuperShareProof {
                height: share.job.candidate.height,
                nonce: share.nonce.clone(),
                msg: share.job.candidate.msg.clone(),
            };
            let score = share.difficulty.saturating_to_u64();
            if !self.super_shares.persist(proof.height, score, &proof).await {
                error!(height = proof.height, "super-share persistence failed");
                return Err(Error::Pool("super-share persistence failed".into()));
            }
        }
        Ok(())
    }

    async fn submit_block(&mut self, share: &AcceptedShare) {
        let payout_key = share
            .job
            .candidate
            .payout_key
            .clone()
            .or_else(|| self.payout_key.clone());
        let Some(payout_key) = payout_key else {
            error!("found a block but no payout key is known, not submitting");
            return;
        };

        match self.node.submit_solution(&share.nonce, &payout_key).await {
            Ok(true) => {
                info!(
                    height = share.job.candidate.height,
                    nonce = %hex::encode(&share.nonce),
                    "block accepted by node"
                );
            }
            Ok(false) => {
                warn!(height = share.job.candidate.height, "block rejected by node");
            }
            Err(e) => {
                error!(error = %e, "block submission failed");
            }
        }
        if let Err(e) = self.refresh_template().await {
            warn!(error = %e, "post-block candidate poll failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use crate::job::Job;
    use crate::node::NodeInfo;
    use crate::pow::HitProvider;
    use crate::share::{NoSuperShares, ShareSubmit, SuperSharePolicy};
    use crate::u256::U256;

    struct StubNode {
        online: bool,
        fetches: AtomicUsize,
        collateral_fetches: AtomicUsize,
        submissions: Mutex<Vec<(Vec<u8>, String)>>,
    }

    impl StubNode {
        fn new(online: bool) -> Arc<Self> {
            Arc::new(Self {
                online,
                fetches: AtomicUsize::new(0),
                collateral_fetches: AtomicUsize::new(0),
                submissions: Mutex::new(Vec::new()),
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NodeClient for StubNode {
        async fn is_online(&self) -> bool {
            self.online
        }

        async fn info(&self) -> Result<NodeInfo> {
            Ok(NodeInfo {
                protocol_version: 2,
                chain_difficulty: U256::from(1_000u64),
            })
        }

        async fn mining_candidate(
            &self,
            protocol_version: i32,
            collateral_payload: Option<&str>,
        ) -> Result<MiningCandidate> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if collateral_payload.is_some() {
                self.collateral_fetches.fetch_add(1, Ordering::SeqCst);
            }
            Ok(MiningCandidate {
                msg: b"stub-msg".to_vec(),
                height: 700_000,
                version: protocol_version,
                network_target: U256::from(100u64),
                payout_key: Some("02node".into()),
                proof: None,
                tx_id: None,
            })
        }

        async fn submit_solution(&self, nonce: &[u8], payout_key: &str) -> Result<bool> {
            self.submissions
                .lock()
                .push((nonce.to_vec(), payout_key.to_string()));
            Ok(true)
        }
    }

    struct GoodCollateral;

    #[async_trait]
    impl CollateralSource for GoodCollateral {
        async fn collateral(&self) -> Result<Collateral> {
            Ok(Collateral {
                payout_key: "02coll".into(),
                payload: r#"{"tx": 1}"#.into(),
                extra: String::new(),
            })
        }
    }

    struct BrokenCollateral;

    #[async_trait]
    impl CollateralSource for BrokenCollateral {
        async fn collateral(&self) -> Result<Collateral> {
            Err(Error::Pool("retriever down".into()))
        }
    }

    struct RecordingStore {
        persisted: Mutex<Vec<(u64, u64)>>,
        succeed: bool,
    }

    impl RecordingStore {
        fn new(succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                persisted: Mutex::new(Vec::new()),
                succeed,
            })
        }
    }

    #[async_trait]
    impl SuperShareStore for RecordingStore {
        async fn persist(&self, height: u64, score: u64, _proof: &SuperShareProof) -> bool {
            self.persisted.lock().push((height, score));
            self.succeed
        }
    }

    struct FixedHit(u64);

    impl HitProvider for FixedHit {
        fn hit(&self, _msg: &[u8], _nonce: &[u8], _height: u64, _n: u64) -> U256 {
            U256::from(self.0)
        }
    }

    struct AlwaysSuper;

    impl SuperSharePolicy for AlwaysSuper {
        fn is_super_share(&self, _hit: &U256, _job: &Job) -> bool {
            true
        }
    }

    fn manager(hit: u64, super_shares: bool) -> Arc<JobManager> {
        let policy: Arc<dyn SuperSharePolicy> = if super_shares {
            Arc::new(AlwaysSuper)
        } else {
            Arc::new(NoSuperShares)
        };
        Arc::new(
            JobManager::new(
                U256::from(10_000u64),
                4,
                false,
                Arc::new(FixedHit(hit)),
                policy,
            )
            .unwrap(),
        )
    }

    fn pool(
        node: Arc<StubNode>,
        manager: Arc<JobManager>,
        collateral: Option<Arc<dyn CollateralSource>>,
        store: Arc<dyn SuperShareStore>,
    ) -> Pool {
        Pool::new(node, manager, collateral, store, Duration::from_secs(60), 256)
    }

    fn submit_to(manager: &JobManager) -> ShareSubmit {
        ShareSubmit {
            job_id: manager.current_job().unwrap().job_id.clone(),
            difficulty: U256::from(1u64),
            extra_nonce1: vec![1, 2, 3, 4],
            extra_nonce2: vec![5; manager.extra_nonce2_size()],
            time: "t0".into(),
            peer: "10.0.0.1:40000".parse().unwrap(),
            worker: "w".into(),
        }
    }

    async fn wait_until(mut probe: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !probe() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_start_requires_an_online_node() {
        let manager = manager(5_000, false);
        let mut pool = pool(StubNode::new(false), manager, None, Arc::new(NullSuperShareStore));

        let err = pool.start().await.unwrap_err();
        assert!(matches!(err, Error::Pool(_)));
    }

    #[tokio::test]
    async fn test_start_installs_an_initial_job() {
        let node = StubNode::new(true);
        let manager = manager(5_000, false);
        let mut pool = pool(node.clone(), manager.clone(), None, Arc::new(NullSuperShareStore));

        pool.start().await.unwrap();

        let job = manager.current_job().unwrap();
        assert_eq!(job.candidate.height, 700_000);
        assert_eq!(job.candidate.version, 2);
        assert!(!job.used_collateral);
        assert_eq!(node.fetches(), 1);
    }

    #[tokio::test]
    async fn test_collateral_candidate_marks_the_job() {
        let node = StubNode::new(true);
        let manager = manager(5_000, false);
        let mut pool = pool(
            node.clone(),
            manager.clone(),
            Some(Arc::new(GoodCollateral)),
            Arc::new(NullSuperShareStore),
        );

        pool.start().await.unwrap();

        assert!(manager.current_job().unwrap().used_collateral);
        assert_eq!(node.collateral_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collateral_failure_falls_back_to_solo() {
        let node = StubNode::new(true);
        let manager = manager(5_000, false);
        let mut pool = pool(
            node.clone(),
            manager.clone(),
            Some(Arc::new(BrokenCollateral)),
            Arc::new(NullSuperShareStore),
        );

        pool.start().await.unwrap();

        assert!(!manager.current_job().unwrap().used_collateral);
        assert_eq!(node.collateral_fetches.load(Ordering::SeqCst), 0);
        assert_eq!(node.fetches(), 1);
    }

    #[tokio::test]
    async fn test_block_is_submitted_and_template_refetched() {
        let node = StubNode::new(true);
        let manager = manager(50, false);
        let mut pool = pool(node.clone(), manager.clone(), None, Arc::new(NullSuperShareStore));
        pool.start().await.unwrap();

        let share = manager.process_share(submit_to(&manager)).unwrap();
        assert!(share.is_block);
        pool.handle_accepted(share).await.unwrap();

        let submissions = node.submissions.lock();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].0.len(), 8);
        assert_eq!(submissions[0].1, "02node");
        drop(submissions);
        assert_eq!(node.fetches(), 2);
    }

    #[tokio::test]
    async fn test_super_share_is_persisted_with_its_score() {
        let node = StubNode::new(true);
        let manager = manager(5_000, true);
        let store = RecordingStore::new(true);
        let mut pool = pool(node, manager.clone(), None, store.clone());
        pool.start().await.unwrap();

        let share = manager.process_share(submit_to(&manager)).unwrap();
        assert!(share.is_super_share);
        pool.handle_accepted(share).await.unwrap();

        assert_eq!(store.persisted.lock().as_slice(), &[(700_000, 1)]);
    }

    #[tokio::test]
    async fn test_super_share_persist_failure_is_fatal() {
        let node = StubNode::new(true);
        let manager = manager(5_000, true);
        let store = RecordingStore::new(false);
        let mut pool = pool(node, manager.clone(), None, store.clone());
        pool.start().await.unwrap();

        let share = manager.process_share(submit_to(&manager)).unwrap();
        let err = pool.handle_accepted(share).await.unwrap_err();

        assert!(matches!(err, Error::Pool(_)));
        assert_eq!(store.persisted.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_run_reacts_to_share_events() {
        let node = StubNode::new(true);
        let manager = manager(5_000, true);
        let store = RecordingStore::new(true);
        let pool = pool(node, manager.clone(), None, store.clone());
        let shutdown = CancellationToken::new();
        let orchestrator = tokio::spawn(pool.run(shutdown.clone()));

        wait_until(|| manager.current_job().is_some()).await;
        manager.process_share(submit_to(&manager)).unwrap();
        wait_until(|| !store.persisted.lock().is_empty()).await;

        shutdown.cancel();
        orchestrator.await.unwrap().unwrap();
    }
}
