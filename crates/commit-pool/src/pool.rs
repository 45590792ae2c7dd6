//! Pool core: the three commit indices and single-commit admission

use crate::{
    api::{BftApiRef, ChainApiRef, CommitStoreRef, NetworkSinkRef},
    crypto::verify_certificate_signature,
    error::{CommitPoolError, PoolResult},
    index::CommitIndex,
    metrics::CommitPoolMetrics,
    types::{Certificate, ChainId, Height, SingleCommit},
    COMMIT_RANGE_STORED,
};
use prometheus::Registry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Configuration for the commit pool
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitPoolConfig {
    /// Network identifier used for signature domain separation
    pub chain_id: ChainId,
    /// Interval of the pruning & gossip job; one tick per block time
    pub block_time: Duration,
}

impl Default for CommitPoolConfig {
    fn default() -> Self {
        Self {
            chain_id: ChainId::default(),
            block_time: Duration::from_secs(10),
        }
    }
}

impl CommitPoolConfig {
    /// Load configuration overrides from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("COMMIT_POOL_BLOCK_TIME_MS") {
            if let Ok(ms) = val.parse() {
                config.block_time = Duration::from_millis(ms);
            }
        }
        config
    }
}

/// The three disjoint commit indices.
///
/// A `(height, validator_address)` pair lives in at most one index at any
/// time: `local` for commits this node generated, `non_gossiped` for
/// received commits not yet broadcast, `gossiped` for commits already
/// broadcast but still needed for aggregation.
#[derive(Clone, Debug, Default)]
pub(crate) struct PoolState {
    pub(crate) local: CommitIndex,
    pub(crate) non_gossiped: CommitIndex,
    pub(crate) gossiped: CommitIndex,
}

impl PoolState {
    pub(crate) fn is_known(&self, commit: &SingleCommit) -> bool {
        self.local.exists(commit) || self.non_gossiped.exists(commit) || self.gossiped.exists(commit)
    }

    pub(crate) fn get_commits_by_height(&self, height: Height) -> Vec<SingleCommit> {
        let mut commits = self.local.get_by_height(height);
        commits.extend(self.non_gossiped.get_by_height(height));
        commits.extend(self.gossiped.get_by_height(height));
        commits
    }

    pub(crate) fn get_all_commits(&self) -> Vec<SingleCommit> {
        let mut heights: BTreeSet<Height> = BTreeSet::new();
        for index in [&self.local, &self.non_gossiped, &self.gossiped] {
            heights.extend(index.heights());
        }
        let mut commits = Vec::new();
        for height in heights {
            commits.extend(self.get_commits_by_height(height));
        }
        commits
    }
}

/// The commit pool.
///
/// Owns the three indices behind a single lock; every public method
/// serialises on that lock so a gossip tick is atomic with respect to all
/// other pool operations.
pub struct CommitPool {
    pub(crate) config: CommitPoolConfig,
    pub(crate) bft: BftApiRef,
    pub(crate) chain: ChainApiRef,
    pub(crate) network: NetworkSinkRef,
    db: Option<CommitStoreRef>,
    pub(crate) metrics: Option<CommitPoolMetrics>,
    pub(crate) state: Mutex<PoolState>,
}

impl CommitPool {
    /// Create a new commit pool
    pub fn new(
        config: CommitPoolConfig,
        bft: BftApiRef,
        chain: ChainApiRef,
        network: NetworkSinkRef,
        db: Option<CommitStoreRef>,
    ) -> Self {
        Self {
            config,
            bft,
            chain,
            network,
            db,
            metrics: None,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Register pool metrics
    pub fn with_metrics(mut self, registry: &Registry) -> Self {
        self.metrics = Some(CommitPoolMetrics::new(registry));
        self
    }

    /// The pool configuration
    pub fn config(&self) -> &CommitPoolConfig {
        &self.config
    }

    /// The reserved persistence seam, if one was wired in
    pub fn store(&self) -> Option<&CommitStoreRef> {
        self.db.as_ref()
    }

    /// Insert a commit into the pool.
    ///
    /// Locally generated commits go to the `local` index, received ones to
    /// `non_gossiped`; promotion into `gossiped` is the gossip job's
    /// responsibility. Inserting an already-known commit is a no-op.
    pub async fn add_commit(&self, commit: SingleCommit, local: bool) {
        let mut state = self.state.lock().await;
        if state.is_known(&commit) {
            debug!(
                height = commit.height,
                validator = %commit.validator_address,
                "ignoring duplicate commit"
            );
            return;
        }
        debug!(
            height = commit.height,
            validator = %commit.validator_address,
            local,
            "commit added to pool"
        );
        if local {
            state.local.add(commit);
        } else {
            state.non_gossiped.add(commit);
        }
        if let Some(metrics) = &self.metrics {
            metrics.commits_added.inc();
        }
    }

    /// True if the commit is present in any index
    pub async fn is_known(&self, commit: &SingleCommit) -> bool {
        self.state.lock().await.is_known(commit)
    }

    /// All commits at a height: local, then non-gossiped, then gossiped
    pub async fn get_commits_by_height(&self, height: Height) -> Vec<SingleCommit> {
        self.state.lock().await.get_commits_by_height(height)
    }

    /// All commits across the three indices, ascending by height
    pub async fn get_all_commits(&self) -> Vec<SingleCommit> {
        self.state.lock().await.get_all_commits()
    }

    /// Validate a single commit received from a peer.
    ///
    /// `Ok(false)` is the normal rejection path (unknown block, duplicate,
    /// stale, out of window); errors mark peer-attributable faults the
    /// transport layer may score on.
    pub async fn validate_commit(&self, commit: &SingleCommit) -> PoolResult<bool> {
        // Block binding
        let header = match self.chain.get_block_header_by_height(commit.height).await? {
            Some(header) => header,
            None => return Ok(false),
        };
        if header.id != commit.block_id {
            return Ok(false);
        }

        // Already known commits are accepted silently
        if self.is_known(commit).await {
            return Ok(false);
        }

        // Commits at or below the removal height are no longer useful
        let removal_height = self.max_removal_height().await?;
        if commit.height <= removal_height {
            return Ok(false);
        }

        // Admissibility window, with an escape hatch for commits directly
        // preceding a validator set change
        let heights = self.bft.get_bft_heights().await?;
        let in_range = commit.height >= heights.max_height_certified.saturating_sub(COMMIT_RANGE_STORED)
            && commit.height <= heights.max_height_precommitted;
        if !in_range && !self.bft.exist_bft_parameters(commit.height + 1).await? {
            return Ok(false);
        }

        // Validator membership at the commit's height
        let parameters = match self.bft.get_bft_parameters(commit.height).await {
            Ok(parameters) => parameters,
            Err(CommitPoolError::BftParameterNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if !parameters
            .validators
            .iter()
            .any(|validator| validator.address == commit.validator_address)
        {
            return Err(CommitPoolError::ValidatorNotActive(
                commit.validator_address,
                commit.height,
            ));
        }

        let keys = self
            .bft
            .get_validator(&commit.validator_address, commit.height)
            .await?;

        let certificate = Certificate::from_block_header(&header);
        if !verify_certificate_signature(
            &keys.bls_key,
            &self.config.chain_id,
            &certificate,
            &commit.certificate_signature,
        ) {
            return Err(CommitPoolError::InvalidSignature(commit.height));
        }

        Ok(true)
    }

    /// Height at or below which commits are no longer useful: the height
    /// certified by the aggregate commit of the finalized block.
    pub(crate) async fn max_removal_height(&self) -> PoolResult<Height> {
        let finalized = self.chain.finalized_height().await?;
        let header = self
            .chain
            .get_block_header_by_height(finalized)
            .await?
            .ok_or(CommitPoolError::HeaderNotFound(finalized))?;
        Ok(header.aggregate_commit.height)
    }

    #[cfg(test)]
    pub(crate) async fn with_state<R>(&self, f: impl FnOnce(&mut PoolState) -> R) -> R {
        let mut state = self.state.lock().await;
        f(&mut state)
    }
}
