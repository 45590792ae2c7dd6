//! Canonical wire codec for commit pool messages
//!
//! Messages are encoded with a deterministic TLV scheme: one key byte per
//! field (`field_no << 3 | wire_type`), varint-encoded integers and
//! length-prefixed byte strings. Fields are written in ascending field
//! order and all fields are required, so a given value has exactly one
//! encoding. Decoders reject anything else.

use crate::{
    error::{CommitPoolError, PoolResult},
    types::{
        Address, AggregateCommit, BlockId, Certificate, Signature, SingleCommit,
        SingleCommitsNetworkPacket,
    },
};
use fastcrypto::traits::ToFromBytes;

const WIRE_VARINT: u8 = 0;
const WIRE_BYTES: u8 = 2;

fn write_key(buf: &mut Vec<u8>, field: u8, wire: u8) {
    buf.push(field << 3 | wire);
}

fn write_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

fn write_uint(buf: &mut Vec<u8>, field: u8, value: u64) {
    write_key(buf, field, WIRE_VARINT);
    write_uvarint(buf, value);
}

fn write_bytes(buf: &mut Vec<u8>, field: u8, bytes: &[u8]) {
    write_key(buf, field, WIRE_BYTES);
    write_uvarint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Strict reader over a canonical encoding
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn err(what: &str) -> CommitPoolError {
        CommitPoolError::Serialization(what.to_string())
    }

    fn byte(&mut self) -> PoolResult<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| Self::err("unexpected end of input"))?;
        self.pos += 1;
        Ok(b)
    }

    fn expect_key(&mut self, field: u8, wire: u8) -> PoolResult<()> {
        let key = self.byte()?;
        if key != field << 3 | wire {
            return Err(Self::err("unexpected field key"));
        }
        Ok(())
    }

    fn uvarint(&mut self) -> PoolResult<u64> {
        let mut value: u64 = 0;
        for shift in (0..64).step_by(7) {
            let byte = self.byte()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Self::err("varint too long"))
    }

    fn uint_field(&mut self, field: u8) -> PoolResult<u64> {
        self.expect_key(field, WIRE_VARINT)?;
        self.uvarint()
    }

    fn bytes_field(&mut self, field: u8) -> PoolResult<&'a [u8]> {
        self.expect_key(field, WIRE_BYTES)?;
        let len = self.uvarint()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| Self::err("byte field overruns input"))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn fixed_field<const N: usize>(&mut self, field: u8) -> PoolResult<[u8; N]> {
        let bytes = self.bytes_field(field)?;
        bytes
            .try_into()
            .map_err(|_| Self::err("byte field has wrong length"))
    }

    fn finish(&self) -> PoolResult<()> {
        if self.pos != self.buf.len() {
            return Err(Self::err("trailing bytes after message"));
        }
        Ok(())
    }
}

/// Encode the signing payload of a certificate
pub fn encode_certificate(certificate: &Certificate) -> Vec<u8> {
    let mut buf = Vec::new();
    write_bytes(&mut buf, 1, &certificate.block_id.0);
    write_uint(&mut buf, 2, certificate.height);
    write_uint(&mut buf, 3, certificate.timestamp);
    write_bytes(&mut buf, 4, &certificate.state_root.0);
    write_bytes(&mut buf, 5, &certificate.validators_hash.0);
    buf
}

/// Encode a single commit for gossip
pub fn encode_single_commit(commit: &SingleCommit) -> Vec<u8> {
    let mut buf = Vec::new();
    write_bytes(&mut buf, 1, &commit.block_id.0);
    write_uint(&mut buf, 2, commit.height);
    write_bytes(&mut buf, 3, &commit.validator_address.0);
    write_bytes(&mut buf, 4, commit.certificate_signature.as_bytes());
    buf
}

/// Decode a single commit received from a peer
pub fn decode_single_commit(bytes: &[u8]) -> PoolResult<SingleCommit> {
    let mut reader = Reader::new(bytes);
    let block_id = BlockId(reader.fixed_field(1)?);
    let height = reader.uint_field(2)?;
    let validator_address = Address(reader.fixed_field(3)?);
    let signature_bytes = reader.bytes_field(4)?;
    let certificate_signature = Signature::from_bytes(signature_bytes)
        .map_err(|e| CommitPoolError::Serialization(format!("bad BLS signature: {}", e)))?;
    reader.finish()?;
    Ok(SingleCommit {
        block_id,
        height,
        validator_address,
        certificate_signature,
    })
}

/// Encode an aggregate commit
pub fn encode_aggregate_commit(aggregate: &AggregateCommit) -> Vec<u8> {
    let mut buf = Vec::new();
    write_uint(&mut buf, 1, aggregate.height);
    write_bytes(&mut buf, 2, &aggregate.aggregation_bits);
    write_bytes(&mut buf, 3, &aggregate.certificate_signature);
    buf
}

/// Decode an aggregate commit
pub fn decode_aggregate_commit(bytes: &[u8]) -> PoolResult<AggregateCommit> {
    let mut reader = Reader::new(bytes);
    let height = reader.uint_field(1)?;
    let aggregation_bits = reader.bytes_field(2)?.to_vec();
    let certificate_signature = reader.bytes_field(3)?.to_vec();
    reader.finish()?;
    Ok(AggregateCommit {
        height,
        aggregation_bits,
        certificate_signature,
    })
}

/// Encode the gossip packet carrying encoded single commits
pub fn encode_commits_packet(packet: &SingleCommitsNetworkPacket) -> Vec<u8> {
    let mut buf = Vec::new();
    for commit in &packet.commits {
        write_bytes(&mut buf, 1, commit);
    }
    buf
}

/// Decode a gossip packet
pub fn decode_commits_packet(bytes: &[u8]) -> PoolResult<SingleCommitsNetworkPacket> {
    let mut reader = Reader::new(bytes);
    let mut commits = Vec::new();
    while reader.pos < reader.buf.len() {
        commits.push(reader.bytes_field(1)?.to_vec());
    }
    Ok(SingleCommitsNetworkPacket { commits })
}
