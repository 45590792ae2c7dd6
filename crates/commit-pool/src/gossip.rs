//! Periodic pruning & gossip job
//!
//! Once per block time the job computes the removal height, evicts stale
//! commits, re-checks admissibility of everything not yet broadcast,
//! promotes the survivors and broadcasts a bounded batch. A failed tick
//! leaves the pool untouched; the next tick rebuilds everything from
//! scratch.

use crate::{
    codec::{encode_commits_packet, encode_single_commit},
    error::PoolResult,
    index::CommitIndex,
    pool::{CommitPool, PoolState},
    types::{CommitKey, CommitSort, Height, SingleCommit, SingleCommitsNetworkPacket},
    COMMIT_RANGE_STORED, NETWORK_EVENT_COMMIT_MESSAGES,
};
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{sleep, Instant},
};
use tracing::{debug, info, warn};

impl CommitPool {
    /// Run one pruning & gossip tick.
    ///
    /// All mutations are staged in a scratch copy of the indices and only
    /// committed once every fallible step has succeeded; the broadcast is
    /// the final, fire-and-forget action.
    pub async fn run_gossip_tick(&self) -> PoolResult<()> {
        let mut state = self.state.lock().await;

        let removal_height = self.max_removal_height().await?;
        let heights = self.bft.get_bft_heights().await?;

        let mut scratch = state.clone();
        let mut evicted = 0;
        evicted += scratch.local.delete_at_or_below(removal_height);
        evicted += scratch.non_gossiped.delete_at_or_below(removal_height);
        evicted += scratch.gossiped.delete_at_or_below(removal_height);

        // Parameter evolution can retroactively invalidate pooled commits;
        // drop the ones that no longer pass the admissibility window
        let min_in_range = heights
            .max_height_certified
            .saturating_sub(COMMIT_RANGE_STORED);
        for commit in scratch.non_gossiped.all(CommitSort::Asc) {
            let in_range = commit.height >= min_in_range
                && commit.height <= heights.max_height_precommitted;
            if in_range || self.bft.exist_bft_parameters(commit.height + 1).await? {
                continue;
            }
            debug!(
                height = commit.height,
                validator = %commit.validator_address,
                "dropping commit that left the admissibility window"
            );
            scratch.non_gossiped.delete_single(&commit);
            evicted += 1;
        }

        let current_validators = self.bft.get_current_validators().await?;
        let max_selected = 2 * current_validators.len();
        let selected = select_gossip_batch(&scratch, heights.max_height_precommitted, max_selected);

        // Surviving commits become gossiped whether or not they made the
        // batch; the next tick must not re-broadcast them
        for commit in scratch.local.all(CommitSort::Asc) {
            scratch.gossiped.add(commit);
        }
        scratch.local = CommitIndex::new();
        for commit in scratch.non_gossiped.all(CommitSort::Asc) {
            scratch.gossiped.add(commit);
        }
        scratch.non_gossiped = CommitIndex::new();

        *state = scratch;

        debug!(
            removal_height,
            evicted,
            selected = selected.len(),
            "gossip tick selected commits"
        );

        let packet = SingleCommitsNetworkPacket {
            commits: selected.iter().map(encode_single_commit).collect(),
        };
        let payload = Bytes::from(encode_commits_packet(&packet));
        if let Err(e) = self
            .network
            .broadcast(NETWORK_EVENT_COMMIT_MESSAGES, payload)
            .await
        {
            warn!(error = %e, "failed to broadcast commit messages");
        }

        if let Some(metrics) = &self.metrics {
            metrics.commits_evicted.inc_by(evicted as f64);
            metrics.commits_gossiped.inc_by(selected.len() as f64);
            metrics.gossip_batch_size.set(selected.len() as f64);
            metrics.gossip_ticks.inc();
        }

        Ok(())
    }
}

/// Choose the commits to broadcast this tick, newest state first capped at
/// twice the current validator count.
///
/// Order of precedence: commits far enough behind the precommitted height
/// that lagging peers still need them, then locally generated commits, then
/// freshly received ones.
fn select_gossip_batch(
    state: &PoolState,
    max_height_precommitted: Height,
    cap: usize,
) -> Vec<SingleCommit> {
    let mut selected = Vec::new();
    let mut seen: HashSet<CommitKey> = HashSet::new();
    let catch_up_bound = max_height_precommitted.saturating_sub(COMMIT_RANGE_STORED);

    for commit in state.get_all_commits() {
        if selected.len() >= cap {
            break;
        }
        if commit.height < catch_up_bound && seen.insert(commit.key()) {
            selected.push(commit);
        }
    }
    for commit in state.local.all(CommitSort::Dsc) {
        if selected.len() >= cap {
            break;
        }
        if seen.insert(commit.key()) {
            selected.push(commit);
        }
    }
    for commit in state.non_gossiped.all(CommitSort::Dsc) {
        if selected.len() >= cap {
            break;
        }
        if seen.insert(commit.key()) {
            selected.push(commit);
        }
    }
    selected
}

/// Periodic task driving [`CommitPool::run_gossip_tick`] once per block time
pub struct GossipJob {
    pool: Arc<CommitPool>,
    rx_shutdown: watch::Receiver<()>,
}

impl GossipJob {
    /// Create a new gossip job
    pub fn new(pool: Arc<CommitPool>, rx_shutdown: watch::Receiver<()>) -> Self {
        Self { pool, rx_shutdown }
    }

    /// Spawn the job task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let block_time = self.pool.config().block_time;
        info!(?block_time, "commit gossip job started");

        let timer = sleep(block_time);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                () = &mut timer => {
                    if let Err(e) = self.pool.run_gossip_tick().await {
                        warn!(error = %e, "gossip tick failed, retrying next block time");
                    }
                    timer.as_mut().reset(Instant::now() + block_time);
                }

                _ = self.rx_shutdown.changed() => {
                    info!("commit gossip job shutting down");
                    break;
                }
            }
        }
    }
}
