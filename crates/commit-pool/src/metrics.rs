//! Metrics for the commit pool

use prometheus::{Counter, Gauge, Registry};

/// Metrics exported by the commit pool
#[derive(Clone, Debug)]
pub struct CommitPoolMetrics {
    /// Number of commits accepted into the pool
    pub commits_added: Counter,
    /// Number of commits evicted by the pruning job
    pub commits_evicted: Counter,
    /// Number of commits broadcast to peers
    pub commits_gossiped: Counter,
    /// Number of completed gossip ticks
    pub gossip_ticks: Counter,
    /// Size of the last broadcast batch
    pub gossip_batch_size: Gauge,
    /// Number of aggregate commits produced
    pub aggregate_commits_created: Counter,
}

impl CommitPoolMetrics {
    /// Create and register the pool metrics
    pub fn new(registry: &Registry) -> Self {
        let commits_added = Counter::new(
            "commit_pool_commits_added_total",
            "Total number of commits accepted into the pool"
        ).unwrap();

        let commits_evicted = Counter::new(
            "commit_pool_commits_evicted_total",
            "Total number of commits evicted by the pruning job"
        ).unwrap();

        let commits_gossiped = Counter::new(
            "commit_pool_commits_gossiped_total",
            "Total number of commits broadcast to peers"
        ).unwrap();

        let gossip_ticks = Counter::new(
            "commit_pool_gossip_ticks_total",
            "Total number of completed gossip ticks"
        ).unwrap();

        let gossip_batch_size = Gauge::new(
            "commit_pool_gossip_batch_size",
            "Number of commits in the last broadcast batch"
        ).unwrap();

        let aggregate_commits_created = Counter::new(
            "commit_pool_aggregate_commits_created_total",
            "Total number of aggregate commits produced"
        ).unwrap();

        registry.register(Box::new(commits_added.clone())).unwrap();
        registry.register(Box::new(commits_evicted.clone())).unwrap();
        registry.register(Box::new(commits_gossiped.clone())).unwrap();
        registry.register(Box::new(gossip_ticks.clone())).unwrap();
        registry.register(Box::new(gossip_batch_size.clone())).unwrap();
        registry.register(Box::new(aggregate_commits_created.clone())).unwrap();

        Self {
            commits_added,
            commits_evicted,
            commits_gossiped,
            gossip_ticks,
            gossip_batch_size,
            aggregate_commits_created,
        }
    }
}
