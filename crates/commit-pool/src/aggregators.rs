//! Aggregation of single commits and aggregate commit selection
//!
//! This module turns a bundle of single commits at one height into an
//! aggregate commit, picks the best height the pool can currently certify,
//! and verifies aggregate commits received from elsewhere.

use crate::{
    crypto::{bit_at, create_agg_sig, verify_agg_sig},
    error::{CommitPoolError, PoolResult},
    pool::CommitPool,
    types::{
        Address, AggregateCommit, Certificate, PublicKey, SingleCommit, Validator, Weight,
    },
};
use fastcrypto::traits::ToFromBytes;
use std::collections::{HashMap, HashSet};
use tracing::debug;

fn keys_sorted_by_bls_key(validators: &[Validator]) -> Vec<PublicKey> {
    let mut keys: Vec<PublicKey> = validators.iter().map(|v| v.bls_key.clone()).collect();
    keys.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
    keys
}

impl CommitPool {
    /// Combine single commits at one height into an aggregate commit.
    ///
    /// All commits must be at the same height; the aggregation bitmap spans
    /// the full validator set at that height, not just the signers.
    pub async fn aggregate_single_commits(
        &self,
        commits: &[SingleCommit],
    ) -> PoolResult<AggregateCommit> {
        let first = commits.first().ok_or(CommitPoolError::NoSingleCommit)?;
        let height = first.height;

        let parameters = self.bft.get_bft_parameters(height).await?;
        let keys_by_address: HashMap<Address, PublicKey> = parameters
            .validators
            .iter()
            .map(|v| (v.address, v.bls_key.clone()))
            .collect();

        let mut pairs = Vec::with_capacity(commits.len());
        for commit in commits {
            let key = keys_by_address
                .get(&commit.validator_address)
                .ok_or(CommitPoolError::NoBlsKeyForValidator(commit.validator_address))?;
            pairs.push((key.clone(), commit.certificate_signature.clone()));
        }
        // The aggregation primitive requires lexicographic key order
        pairs.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        let validator_keys = keys_sorted_by_bls_key(&parameters.validators);

        let (aggregation_bits, aggregate) = create_agg_sig(&validator_keys, &pairs)?;
        if let Some(metrics) = &self.metrics {
            metrics.aggregate_commits_created.inc();
        }
        Ok(AggregateCommit {
            height,
            aggregation_bits,
            certificate_signature: aggregate.as_bytes().to_vec(),
        })
    }

    /// Pick the highest height whose pooled commits reach the certificate
    /// threshold and aggregate them.
    ///
    /// Returns the sentinel aggregate at `max_height_certified` when no
    /// height in the admissible range reaches the threshold.
    pub async fn select_aggregate_commit(&self) -> PoolResult<AggregateCommit> {
        let heights = self.bft.get_bft_heights().await?;

        // The admissible ceiling stops right before the next parameter
        // change; no change pending means the precommitted height
        let height_bound = match self
            .bft
            .get_next_height_bft_parameters(heights.max_height_certified + 1)
            .await
        {
            Ok(next_change) => next_change
                .saturating_sub(1)
                .min(heights.max_height_precommitted),
            Err(CommitPoolError::BftParameterNotFound(_)) => heights.max_height_precommitted,
            Err(e) => return Err(e),
        };
        if height_bound <= heights.max_height_certified {
            return Ok(AggregateCommit::sentinel(heights.max_height_certified));
        }

        // Parameters are constant across (max_height_certified, height_bound]
        let parameters = self.bft.get_bft_parameters(height_bound).await?;

        let state = self.state.lock().await;
        let mut height = height_bound;
        while height > heights.max_height_certified {
            let commits = state.get_commits_by_height(height);
            if !commits.is_empty() {
                let addresses: HashSet<Address> =
                    commits.iter().map(|c| c.validator_address).collect();
                let weight: Weight = parameters
                    .validators
                    .iter()
                    .filter(|v| addresses.contains(&v.address))
                    .map(|v| v.bft_weight)
                    .sum();
                if weight >= parameters.certificate_threshold {
                    drop(state);
                    debug!(height, weight, "aggregating single commits");
                    return self.aggregate_single_commits(&commits).await;
                }
            }
            height -= 1;
        }

        Ok(AggregateCommit::sentinel(heights.max_height_certified))
    }

    /// Verify an aggregate commit produced elsewhere.
    ///
    /// All malformed or out-of-range aggregates verify as `false`; errors
    /// are reserved for unavailable collaborators.
    pub async fn verify_aggregate_commit(&self, aggregate: &AggregateCommit) -> PoolResult<bool> {
        if aggregate.certificate_signature.is_empty() || aggregate.aggregation_bits.is_empty() {
            return Ok(false);
        }

        let heights = self.bft.get_bft_heights().await?;
        if aggregate.height <= heights.max_height_certified
            || aggregate.height > heights.max_height_precommitted
        {
            return Ok(false);
        }
        match self
            .bft
            .get_next_height_bft_parameters(heights.max_height_certified + 1)
            .await
        {
            Ok(next_change) => {
                if aggregate.height > next_change.saturating_sub(1) {
                    return Ok(false);
                }
            }
            Err(CommitPoolError::BftParameterNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let header = self
            .chain
            .get_block_header_by_height(aggregate.height)
            .await?
            .ok_or(CommitPoolError::HeaderNotFound(aggregate.height))?;
        let certificate = Certificate::from_block_header(&header);
        let parameters = self.bft.get_bft_parameters(aggregate.height).await?;

        let mut validators: Vec<&Validator> = parameters.validators.iter().collect();
        validators.sort_by(|a, b| a.bls_key.as_bytes().cmp(b.bls_key.as_bytes()));
        if aggregate.aggregation_bits.len() != (validators.len() + 7) / 8 {
            return Ok(false);
        }

        let signed_weight: Weight = validators
            .iter()
            .enumerate()
            .filter(|(index, _)| bit_at(&aggregate.aggregation_bits, *index))
            .map(|(_, v)| v.bft_weight)
            .sum();
        if signed_weight < parameters.certificate_threshold {
            debug!(
                height = aggregate.height,
                signed_weight, "aggregate commit below certificate threshold"
            );
            return Ok(false);
        }

        let keys: Vec<PublicKey> = validators.iter().map(|v| v.bls_key.clone()).collect();
        Ok(verify_agg_sig(
            &keys,
            &aggregate.aggregation_bits,
            &aggregate.certificate_signature,
            &self.config.chain_id,
            &certificate,
        ))
    }
}
