//! Vote record validation
//!
//! Structural completeness first, then hash self-consistency, then the
//! vote-chain link field. Nothing here touches ledger state.

use crate::types::VoteRecord;
use crate::{Error, Result};

/// Validate a vote before it may enter the pending pool
pub fn validate_vote(record: &VoteRecord) -> Result<()> {
    let required = [
        ("voter_id", &record.voter_id),
        ("candidate_id", &record.candidate_id),
        ("election_id", &record.election_id),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(Error::Validation(format!(
                "vote {} is missing {}",
                record.vote_id, field
            )));
        }
    }

    let expected = record.compute_hash();
    if expected != record.hash {
        return Err(Error::HashMismatch {
            vote_id: record.vote_id,
            expected,
            actual: record.hash.clone(),
        });
    }

    if record.previous_hash.is_empty() {
        return Err(Error::Validation(format!(
            "vote {} is missing previous_hash",
            record.vote_id
        )));
    }

    Ok(())
}
