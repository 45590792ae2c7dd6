//! Capability interfaces the pool consumes
//!
//! The pool is polymorphic over any implementation of these traits, which
//! keeps the BFT engine, the chain and the transport swappable (and lets
//! tests inject doubles).

use crate::{
    error::PoolResult,
    types::{Address, BftHeights, BftParameters, BlockHeader, Height, Validator, ValidatorKeys},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Read-only view of the BFT engine's computed state
#[async_trait]
pub trait BftApi: Send + Sync {
    /// Current certified / precommitted heights
    async fn get_bft_heights(&self) -> PoolResult<BftHeights>;

    /// Parameters in force at the given height
    async fn get_bft_parameters(&self, height: Height) -> PoolResult<BftParameters>;

    /// First height >= `height` at which parameters change.
    /// Errors with `BftParameterNotFound` when there is none.
    async fn get_next_height_bft_parameters(&self, height: Height) -> PoolResult<Height>;

    /// Whether a parameter change is recorded exactly at the given height
    async fn exist_bft_parameters(&self, height: Height) -> PoolResult<bool>;

    /// Resolve one validator's keys at a height
    async fn get_validator(&self, address: &Address, height: Height) -> PoolResult<ValidatorKeys>;

    /// The validator set for the currently generated block
    async fn get_current_validators(&self) -> PoolResult<Vec<Validator>>;
}

/// Read-only view of the canonical chain
#[async_trait]
pub trait ChainApi: Send + Sync {
    /// Height of the finalized tip
    async fn finalized_height(&self) -> PoolResult<Height>;

    /// Canonical block header at a height, if one exists
    async fn get_block_header_by_height(&self, height: Height) -> PoolResult<Option<BlockHeader>>;
}

/// Write-only broadcast transport
#[async_trait]
pub trait NetworkSink: Send + Sync {
    /// Publish one event to all peers
    async fn broadcast(&self, event: &'static str, payload: Bytes) -> PoolResult<()>;
}

/// Reserved persistence seam. Commits are recoverable from peers, so the
/// pool never reads or writes this itself; it is wired through the
/// constructor for deployments that want warm restarts.
#[async_trait]
pub trait CommitStore: Send + Sync {
    /// Persist an encoded commit
    async fn put(&self, key: &[u8], value: &[u8]) -> PoolResult<()>;

    /// Load an encoded commit
    async fn get(&self, key: &[u8]) -> PoolResult<Option<Vec<u8>>>;
}

/// Shared handle to a BFT oracle
pub type BftApiRef = Arc<dyn BftApi>;

/// Shared handle to a chain view
pub type ChainApiRef = Arc<dyn ChainApi>;

/// Shared handle to a broadcast transport
pub type NetworkSinkRef = Arc<dyn NetworkSink>;

/// Shared handle to a commit store
pub type CommitStoreRef = Arc<dyn CommitStore>;
