//! Core types for the commit pool

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A block height
pub type Height = u64;

/// BFT voting weight
pub type Weight = u64;

/// A validator BLS public key
pub type PublicKey = fastcrypto::bls12381::BLS12381PublicKey;

/// A BLS signature over a certificate
pub type Signature = fastcrypto::bls12381::BLS12381Signature;

/// An aggregated BLS signature
pub type AggregateSignature = fastcrypto::bls12381::BLS12381AggregateSignature;

/// Uniqueness key of a single commit within the pool
pub type CommitKey = (Height, Address);

/// A block identifier
#[derive(Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub [u8; 32]);

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", base64::encode(self.0))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let encoded = base64::encode(self.0);
        let display_str = encoded.get(0..16).unwrap_or(&encoded);
        write!(f, "{}", display_str)
    }
}

/// A 32-byte hash (state root, validators hash)
#[derive(Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash32(pub [u8; 32]);

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", base64::encode(self.0))
    }
}

/// A 20-byte validator address
#[derive(Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", base64::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", base64::encode(self.0))
    }
}

/// The network identifier used for signature domain separation
#[derive(Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
pub struct ChainId(pub [u8; 32]);

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", base64::encode(self.0))
    }
}

/// One validator's attestation over a block certificate
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SingleCommit {
    /// ID of the block being attested
    pub block_id: BlockId,
    /// Height of the block being attested
    pub height: Height,
    /// Address of the attesting validator
    pub validator_address: Address,
    /// BLS signature over the certificate derived from the block header
    pub certificate_signature: Signature,
}

impl SingleCommit {
    /// Uniqueness key within the pool
    pub fn key(&self) -> CommitKey {
        (self.height, self.validator_address)
    }
}

/// The canonical signing payload derived from a block header
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Certificate {
    /// ID of the block this certificate is derived from
    pub block_id: BlockId,
    /// Height of the block
    pub height: Height,
    /// Timestamp of the block
    pub timestamp: u64,
    /// State root of the block
    pub state_root: Hash32,
    /// Hash of the validator set expected for the next block
    pub validators_hash: Hash32,
}

impl Certificate {
    /// Project the certificate fields out of a block header
    pub fn from_block_header(header: &BlockHeader) -> Self {
        Self {
            block_id: header.id,
            height: header.height,
            timestamp: header.timestamp,
            state_root: header.state_root,
            validators_hash: header.validators_hash,
        }
    }
}

/// A BLS aggregation of single commits at one height
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateCommit {
    /// Height the aggregated commits attest to
    pub height: Height,
    /// Bitmap over the height's validator set, ordered by BLS key
    pub aggregation_bits: Vec<u8>,
    /// Aggregated BLS signature, empty for the sentinel
    pub certificate_signature: Vec<u8>,
}

impl AggregateCommit {
    /// The sentinel aggregate carrying no signatures
    pub fn sentinel(height: Height) -> Self {
        Self {
            height,
            aggregation_bits: Vec::new(),
            certificate_signature: Vec::new(),
        }
    }

    /// True if this is the "no aggregate" sentinel
    pub fn is_sentinel(&self) -> bool {
        self.aggregation_bits.is_empty() && self.certificate_signature.is_empty()
    }
}

/// A validator entry from the BFT parameters at some height
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Validator {
    /// Validator address
    pub address: Address,
    /// Voting weight
    pub bft_weight: Weight,
    /// BLS public key
    pub bls_key: PublicKey,
}

/// BFT parameters in force at a height
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BftParameters {
    /// Active validators, in the oracle's order
    pub validators: Vec<Validator>,
    /// Minimum summed weight for a valid aggregate commit
    pub certificate_threshold: Weight,
}

/// The BFT engine's computed heights
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BftHeights {
    /// Highest height with a valid aggregate commit on chain
    pub max_height_certified: Height,
    /// Highest height the local BFT engine has precommitted
    pub max_height_precommitted: Height,
}

/// A single validator's keys as resolved by the BFT oracle
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidatorKeys {
    /// BLS public key
    pub bls_key: PublicKey,
}

/// The view of a chain block header the pool consumes
#[derive(Builder, Clone, Debug, Serialize, Deserialize, PartialEq)]
#[builder(pattern = "owned")]
pub struct BlockHeader {
    /// Block ID
    pub id: BlockId,
    /// Block height
    pub height: Height,
    /// Block timestamp
    #[builder(default)]
    pub timestamp: u64,
    /// State root after executing the block
    #[builder(default)]
    pub state_root: Hash32,
    /// Hash of the validator set for the next block
    #[builder(default)]
    pub validators_hash: Hash32,
    /// Address of the block generator
    #[builder(default)]
    pub generator_address: Address,
    /// Aggregate commit carried by the block
    #[builder(default)]
    pub aggregate_commit: AggregateCommit,
}

/// Outbound gossip payload: canonical encodings of single commits
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SingleCommitsNetworkPacket {
    /// Encoded single commits
    pub commits: Vec<Vec<u8>>,
}

/// Iteration order over a commit index
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitSort {
    /// Ascending by height
    Asc,
    /// Descending by height
    Dsc,
}
