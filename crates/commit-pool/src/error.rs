//! Error types for the commit pool

use crate::types::{Address, Height};
use thiserror::Error;

/// Result type for commit pool operations
pub type PoolResult<T> = Result<T, CommitPoolError>;

/// Errors that can occur in the commit pool
#[derive(Debug, Error)]
pub enum CommitPoolError {
    /// Peer-supplied commit was signed by a validator outside the active set
    #[error("validator {0} is not active at height {1}")]
    ValidatorNotActive(Address, Height),

    /// BLS verification of a commit's certificate signature failed
    #[error("invalid certificate signature for commit at height {0}")]
    InvalidSignature(Height),

    /// Aggregation was requested for an empty set of single commits
    #[error("cannot aggregate an empty set of single commits")]
    NoSingleCommit,

    /// Aggregation could not resolve a BLS key for a contributing validator
    #[error("no BLS key for validator {0}")]
    NoBlsKeyForValidator(Address),

    /// The BFT oracle has no parameter change at or after the given height
    #[error("no BFT parameters found from height {0}")]
    BftParameterNotFound(Height),

    /// A required block header is missing from the chain
    #[error("block header at height {0} was not found")]
    HeaderNotFound(Height),

    /// Network communication error
    #[error("network error: {0}")]
    Network(String),

    /// Message encoding/decoding error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Storage backend error
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
