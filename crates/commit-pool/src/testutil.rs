//! Test doubles shared by the in-crate test modules

use crate::{
    api::{BftApi, ChainApi, NetworkSink},
    codec::decode_commits_packet,
    error::{CommitPoolError, PoolResult},
    pool::{CommitPool, CommitPoolConfig},
    types::{
        Address, AggregateCommit, BftHeights, BftParameters, BlockHeader, BlockHeaderBuilder,
        BlockId, Height, Signature, SingleCommit, SingleCommitsNetworkPacket, Validator,
        ValidatorKeys,
    },
    NETWORK_EVENT_COMMIT_MESSAGES,
};
use async_trait::async_trait;
use bytes::Bytes;
use fastcrypto::traits::KeyPair;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub(crate) struct MockBft {
    pub(crate) heights: BftHeights,
    /// Parameter change points: height -> parameters valid from there
    pub(crate) parameters: BTreeMap<Height, BftParameters>,
    pub(crate) current_validators: Vec<Validator>,
}

#[async_trait]
impl BftApi for MockBft {
    async fn get_bft_heights(&self) -> PoolResult<BftHeights> {
        Ok(self.heights)
    }

    async fn get_bft_parameters(&self, height: Height) -> PoolResult<BftParameters> {
        self.parameters
            .range(..=height)
            .next_back()
            .map(|(_, params)| params.clone())
            .ok_or(CommitPoolError::BftParameterNotFound(height))
    }

    async fn get_next_height_bft_parameters(&self, height: Height) -> PoolResult<Height> {
        self.parameters
            .range(height..)
            .next()
            .map(|(h, _)| *h)
            .ok_or(CommitPoolError::BftParameterNotFound(height))
    }

    async fn exist_bft_parameters(&self, height: Height) -> PoolResult<bool> {
        Ok(self.parameters.contains_key(&height))
    }

    async fn get_validator(&self, address: &Address, height: Height) -> PoolResult<ValidatorKeys> {
        let params = self.get_bft_parameters(height).await?;
        params
            .validators
            .iter()
            .find(|v| v.address == *address)
            .map(|v| ValidatorKeys {
                bls_key: v.bls_key.clone(),
            })
            .ok_or(CommitPoolError::ValidatorNotActive(*address, height))
    }

    async fn get_current_validators(&self) -> PoolResult<Vec<Validator>> {
        Ok(self.current_validators.clone())
    }
}

pub(crate) struct MockChain {
    pub(crate) finalized: Height,
    pub(crate) headers: BTreeMap<Height, BlockHeader>,
}

#[async_trait]
impl ChainApi for MockChain {
    async fn finalized_height(&self) -> PoolResult<Height> {
        Ok(self.finalized)
    }

    async fn get_block_header_by_height(&self, height: Height) -> PoolResult<Option<BlockHeader>> {
        Ok(self.headers.get(&height).cloned())
    }
}

pub(crate) struct MockNetwork {
    pub(crate) sent: Mutex<Vec<Bytes>>,
    pub(crate) fail: bool,
}

#[async_trait]
impl NetworkSink for MockNetwork {
    async fn broadcast(&self, event: &'static str, payload: Bytes) -> PoolResult<()> {
        assert_eq!(event, NETWORK_EVENT_COMMIT_MESSAGES);
        if self.fail {
            return Err(CommitPoolError::Network("peer hangup".to_string()));
        }
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }
}

pub(crate) fn make_validators(count: usize) -> Vec<Validator> {
    (0..count)
        .map(|i| Validator {
            address: Address([i as u8; 20]),
            bft_weight: 100,
            bls_key: fastcrypto::bls12381::BLS12381KeyPair::generate(&mut rand::thread_rng())
                .public()
                .clone(),
        })
        .collect()
}

pub(crate) fn params_at(
    change_heights: &[Height],
    validators: &[Validator],
) -> BTreeMap<Height, BftParameters> {
    change_heights
        .iter()
        .map(|height| {
            (
                *height,
                BftParameters {
                    validators: validators.to_vec(),
                    certificate_threshold: 300,
                },
            )
        })
        .collect()
}

pub(crate) fn header_with_aggregate(height: Height, aggregate_height: Height) -> BlockHeader {
    BlockHeaderBuilder::default()
        .id(BlockId([height as u8; 32]))
        .height(height)
        .aggregate_commit(AggregateCommit::sentinel(aggregate_height))
        .build()
        .unwrap()
}

pub(crate) fn commit(height: Height, addr_byte: u8) -> SingleCommit {
    SingleCommit {
        block_id: BlockId([height as u8; 32]),
        height,
        validator_address: Address([addr_byte; 20]),
        certificate_signature: Signature::default(),
    }
}

pub(crate) struct Fixture {
    pub(crate) pool: Arc<CommitPool>,
    pub(crate) network: Arc<MockNetwork>,
}

pub(crate) fn fixture_with(
    heights: BftHeights,
    finalized: Height,
    removal_height: Height,
    change_heights: &[Height],
    fail_network: bool,
) -> Fixture {
    let validators = make_validators(5);
    let bft = Arc::new(MockBft {
        heights,
        parameters: params_at(change_heights, &validators),
        current_validators: validators,
    });
    let mut headers = BTreeMap::new();
    headers.insert(finalized, header_with_aggregate(finalized, removal_height));
    let chain = Arc::new(MockChain { finalized, headers });
    let network = Arc::new(MockNetwork {
        sent: Mutex::new(Vec::new()),
        fail: fail_network,
    });
    let pool = Arc::new(CommitPool::new(
        CommitPoolConfig::default(),
        bft,
        chain,
        network.clone(),
        None,
    ));
    Fixture { pool, network }
}

pub(crate) fn fixture(heights: BftHeights, finalized: Height, removal_height: Height) -> Fixture {
    fixture_with(heights, finalized, removal_height, &[0], false)
}

pub(crate) fn last_packet(network: &MockNetwork) -> SingleCommitsNetworkPacket {
    let sent = network.sent.lock().unwrap();
    decode_commits_packet(sent.last().expect("no packet sent")).unwrap()
}
