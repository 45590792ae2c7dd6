//! BLS signing, verification and aggregation for certificates

use crate::{
    codec::encode_certificate,
    error::{CommitPoolError, PoolResult},
    types::{AggregateSignature, Certificate, ChainId, PublicKey, Signature},
};
use fastcrypto::{
    bls12381::BLS12381KeyPair,
    traits::{AggregateAuthenticator, Signer, ToFromBytes},
    Verifier,
};

/// Domain separation tag for certificate signatures
pub const MESSAGE_TAG_CERTIFICATE: &[u8] = b"LSK_CE_";

/// The exact byte string a validator signs for a certificate
pub fn certificate_signing_message(chain_id: &ChainId, certificate: &Certificate) -> Vec<u8> {
    let encoded = encode_certificate(certificate);
    let mut message = Vec::with_capacity(MESSAGE_TAG_CERTIFICATE.len() + 32 + encoded.len());
    message.extend_from_slice(MESSAGE_TAG_CERTIFICATE);
    message.extend_from_slice(&chain_id.0);
    message.extend_from_slice(&encoded);
    message
}

/// Sign a certificate with a validator BLS key
pub fn sign_certificate(
    keypair: &BLS12381KeyPair,
    chain_id: &ChainId,
    certificate: &Certificate,
) -> Signature {
    keypair.sign(&certificate_signing_message(chain_id, certificate))
}

/// Verify one validator's certificate signature
pub fn verify_certificate_signature(
    public_key: &PublicKey,
    chain_id: &ChainId,
    certificate: &Certificate,
    signature: &Signature,
) -> bool {
    let message = certificate_signing_message(chain_id, certificate);
    public_key.verify(&message, signature).is_ok()
}

pub(crate) fn bit_at(bits: &[u8], index: usize) -> bool {
    bits[index / 8] & (1 << (index % 8)) != 0
}

fn set_bit(bits: &mut [u8], index: usize) {
    bits[index / 8] |= 1 << (index % 8);
}

/// Aggregate signatures from a subset of a validator set.
///
/// `validator_keys` is the full BLS key set at the height, lexicographically
/// sorted; `pairs` are the contributing `(key, signature)` pairs in the same
/// order. Returns the bitmap over the full set and the aggregated signature.
pub fn create_agg_sig(
    validator_keys: &[PublicKey],
    pairs: &[(PublicKey, Signature)],
) -> PoolResult<(Vec<u8>, AggregateSignature)> {
    let mut bits = vec![0u8; (validator_keys.len() + 7) / 8];
    let mut signatures = Vec::with_capacity(pairs.len());

    for (key, signature) in pairs {
        let index = validator_keys
            .binary_search_by(|candidate| candidate.as_bytes().cmp(key.as_bytes()))
            .map_err(|_| {
                CommitPoolError::Serialization(
                    "signer BLS key is not part of the validator set".to_string(),
                )
            })?;
        set_bit(&mut bits, index);
        signatures.push(signature.clone());
    }

    let aggregate = AggregateSignature::aggregate(&signatures)
        .map_err(|e| CommitPoolError::Serialization(format!("BLS aggregation failed: {}", e)))?;
    Ok((bits, aggregate))
}

/// Verify an aggregated certificate signature against a validator key set.
///
/// `validator_keys` must be lexicographically sorted; `aggregation_bits`
/// selects the signing subset. Any malformed input verifies as `false`.
pub fn verify_agg_sig(
    validator_keys: &[PublicKey],
    aggregation_bits: &[u8],
    signature: &[u8],
    chain_id: &ChainId,
    certificate: &Certificate,
) -> bool {
    if aggregation_bits.len() != (validator_keys.len() + 7) / 8 {
        return false;
    }
    // Bits beyond the validator set must stay clear
    for index in validator_keys.len()..aggregation_bits.len() * 8 {
        if bit_at(aggregation_bits, index) {
            return false;
        }
    }

    let signers: Vec<PublicKey> = validator_keys
        .iter()
        .enumerate()
        .filter(|(index, _)| bit_at(aggregation_bits, *index))
        .map(|(_, key)| key.clone())
        .collect();
    if signers.is_empty() {
        return false;
    }

    let aggregate = match AggregateSignature::from_bytes(signature) {
        Ok(aggregate) => aggregate,
        Err(_) => return false,
    };

    let message = certificate_signing_message(chain_id, certificate);
    aggregate.verify(&signers, &message).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockId, Hash32};
    use fastcrypto::traits::KeyPair;

    fn sample_certificate() -> Certificate {
        Certificate {
            block_id: BlockId([0x42; 32]),
            height: 1020,
            timestamp: 987_654,
            state_root: Hash32([0x10; 32]),
            validators_hash: Hash32([0x20; 32]),
        }
    }

    fn generate_sorted_keypairs(count: usize) -> Vec<BLS12381KeyPair> {
        let mut keypairs: Vec<_> = (0..count)
            .map(|_| BLS12381KeyPair::generate(&mut rand::thread_rng()))
            .collect();
        keypairs.sort_by(|a, b| a.public().as_bytes().cmp(b.public().as_bytes()));
        keypairs
    }

    #[test]
    fn sign_verify_round_trip_and_tampering() {
        let keypair = BLS12381KeyPair::generate(&mut rand::thread_rng());
        let chain_id = ChainId([7; 32]);
        let certificate = sample_certificate();

        let signature = sign_certificate(&keypair, &chain_id, &certificate);
        assert!(verify_certificate_signature(
            keypair.public(),
            &chain_id,
            &certificate,
            &signature
        ));

        let mut tampered = certificate.clone();
        tampered.state_root = Hash32([0x11; 32]);
        assert!(!verify_certificate_signature(
            keypair.public(),
            &chain_id,
            &tampered,
            &signature
        ));

        let other_chain = ChainId([8; 32]);
        assert!(!verify_certificate_signature(
            keypair.public(),
            &other_chain,
            &certificate,
            &signature
        ));
    }

    #[test]
    fn aggregate_round_trip_with_subset() {
        let keypairs = generate_sorted_keypairs(3);
        let chain_id = ChainId([1; 32]);
        let certificate = sample_certificate();

        let keys: Vec<PublicKey> = keypairs.iter().map(|kp| kp.public().clone()).collect();
        // Validators 0 and 2 sign
        let pairs: Vec<(PublicKey, Signature)> = [0usize, 2]
            .iter()
            .map(|i| {
                (
                    keypairs[*i].public().clone(),
                    sign_certificate(&keypairs[*i], &chain_id, &certificate),
                )
            })
            .collect();

        let (bits, aggregate) = create_agg_sig(&keys, &pairs).unwrap();
        assert_eq!(bits, vec![0b0000_0101]);
        assert!(verify_agg_sig(
            &keys,
            &bits,
            aggregate.as_bytes(),
            &chain_id,
            &certificate
        ));

        // Claiming a different signer set must fail
        assert!(!verify_agg_sig(
            &keys,
            &[0b0000_0011],
            aggregate.as_bytes(),
            &chain_id,
            &certificate
        ));

        let mut tampered = certificate;
        tampered.height += 1;
        assert!(!verify_agg_sig(
            &keys,
            &bits,
            aggregate.as_bytes(),
            &chain_id,
            &tampered
        ));
    }

    #[test]
    fn bitmap_layout_is_lsb_first_per_byte() {
        let keypairs = generate_sorted_keypairs(10);
        let chain_id = ChainId([2; 32]);
        let certificate = sample_certificate();

        let keys: Vec<PublicKey> = keypairs.iter().map(|kp| kp.public().clone()).collect();
        let pairs: Vec<(PublicKey, Signature)> = [1usize, 9]
            .iter()
            .map(|i| {
                (
                    keypairs[*i].public().clone(),
                    sign_certificate(&keypairs[*i], &chain_id, &certificate),
                )
            })
            .collect();

        let (bits, _) = create_agg_sig(&keys, &pairs).unwrap();
        assert_eq!(bits, vec![0b0000_0010, 0b0000_0010]);
    }

    #[test]
    fn verify_rejects_malformed_inputs() {
        let keypairs = generate_sorted_keypairs(2);
        let chain_id = ChainId([3; 32]);
        let certificate = sample_certificate();
        let keys: Vec<PublicKey> = keypairs.iter().map(|kp| kp.public().clone()).collect();

        // Wrong bitmap length
        assert!(!verify_agg_sig(&keys, &[0, 0], &[1, 2, 3], &chain_id, &certificate));
        // Empty signer set
        assert!(!verify_agg_sig(&keys, &[0], &[1, 2, 3], &chain_id, &certificate));
        // Bit set beyond the validator set
        assert!(!verify_agg_sig(&keys, &[0b0000_0100], &[1, 2, 3], &chain_id, &certificate));
        // Garbage signature bytes
        assert!(!verify_agg_sig(&keys, &[0b0000_0011], &[1, 2, 3], &chain_id, &certificate));
    }

    #[test]
    fn unknown_signer_key_is_rejected() {
        let keypairs = generate_sorted_keypairs(2);
        let outsider = BLS12381KeyPair::generate(&mut rand::thread_rng());
        let chain_id = ChainId([4; 32]);
        let certificate = sample_certificate();

        let keys: Vec<PublicKey> = keypairs.iter().map(|kp| kp.public().clone()).collect();
        let pairs = vec![(
            outsider.public().clone(),
            sign_certificate(&outsider, &chain_id, &certificate),
        )];
        assert!(create_agg_sig(&keys, &pairs).is_err());
    }
}
