//! Hashing for the two ledger chains
//!
//! This module provides:
//! - The vote hash (per-election vote chain)
//! - The block hash and its reusable prefix state for the nonce search
//! - Difficulty checks on hex digests and raw digests
//!
//! All hashes are SHA-256, hex-encoded in lowercase. Fields are concatenated
//! as text in a fixed order, numbers in decimal.

use crate::types::VoteRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// Hash arbitrary bytes using SHA-256, hex-encoded
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// ISO-8601 rendering used inside the vote hash (`2024-03-01T09:30:00.125Z`)
pub fn iso_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Hash a vote over its identity and integrity fields
///
/// `voter_id ‖ candidate_id ‖ election_id ‖ iso(timestamp) ‖ previous_hash ‖ nonce`
pub fn compute_vote_hash(record: &VoteRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.voter_id.as_bytes());
    hasher.update(record.candidate_id.as_bytes());
    hasher.update(record.election_id.as_bytes());
    hasher.update(iso_timestamp(&record.timestamp).as_bytes());
    hasher.update(record.previous_hash.as_bytes());
    hasher.update(record.nonce.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Block hash with the nonce-independent prefix absorbed once
///
/// `index ‖ timestamp_ms ‖ votes_json ‖ previous_hash ‖ nonce`
#[derive(Clone)]
pub struct BlockHasher {
    prefix: Sha256,
}

impl BlockHasher {
    /// Absorb everything except the nonce
    pub fn new(index: u64, timestamp_ms: i64, votes_json: &[u8], previous_hash: &str) -> Self {
        let mut prefix = Sha256::new();
        prefix.update(index.to_string().as_bytes());
        prefix.update(timestamp_ms.to_string().as_bytes());
        prefix.update(votes_json);
        prefix.update(previous_hash.as_bytes());
        Self { prefix }
    }

    /// Raw digest for one nonce
    pub fn digest(&self, nonce: u64) -> [u8; 32] {
        let mut hasher = self.prefix.clone();
        hasher.update(nonce.to_string().as_bytes());
        hasher.finalize().into()
    }

    /// Hex digest for one nonce
    pub fn hash(&self, nonce: u64) -> String {
        hex::encode(self.digest(nonce))
    }
}

/// Count leading zero hex characters of a raw digest
pub fn leading_zero_nibbles(digest: &[u8]) -> u32 {
    let mut count = 0;
    for byte in digest {
        if *byte == 0 {
            count += 2;
            continue;
        }
        if byte >> 4 == 0 {
            count += 1;
        }
        break;
    }
    count
}

/// Check that a hex hash starts with `difficulty` `'0'` characters
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VoteId;
    use chrono::TimeZone;

    fn sample_vote() -> VoteRecord {
        VoteRecord {
            vote_id: VoteId(1),
            voter_id: "voter-1".into(),
            candidate_id: "candidate-1".into(),
            election_id: "election-1".into(),
            constituency: "north".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            previous_hash: "0".into(),
            nonce: 0,
            hash: String::new(),
        }
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_iso_timestamp_millis() {
        let ts = Utc.timestamp_millis_opt(1_709_285_400_125).unwrap();
        assert_eq!(iso_timestamp(&ts), "2024-03-01T09:30:00.125Z");
    }

    #[test]
    fn test_vote_hash_is_concatenation() {
        let vote = sample_vote();
        let expected =
            sha256_hex(b"voter-1candidate-1election-12024-03-01T09:30:00.000Z00");
        assert_eq!(compute_vote_hash(&vote), expected);
    }

    #[test]
    fn test_vote_hash_ignores_constituency_and_id() {
        let vote = sample_vote();
        let mut other = vote.clone();
        other.constituency = "south".into();
        other.vote_id = VoteId(99);
        assert_eq!(compute_vote_hash(&vote), compute_vote_hash(&other));
    }

    #[test]
    fn test_block_hasher_matches_concatenation() {
        let hasher = BlockHasher::new(3, 1_700_000_000_000, b"[]", "abc");
        assert_eq!(hasher.hash(42), sha256_hex(b"31700000000000[]abc42"));
    }

    #[test]
    fn test_leading_zero_nibbles() {
        assert_eq!(leading_zero_nibbles(&[0xff, 0x00]), 0);
        assert_eq!(leading_zero_nibbles(&[0x0f, 0xff]), 1);
        assert_eq!(leading_zero_nibbles(&[0x00, 0x0f]), 3);
        assert_eq!(leading_zero_nibbles(&[0x00, 0x00]), 4);
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("0000ab", 4));
        assert!(meets_difficulty("0000ab", 0));
        assert!(!meets_difficulty("000ab0", 4));
        assert!(!meets_difficulty("00", 3));
    }
}
