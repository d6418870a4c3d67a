//! Pending pool of accepted, unsealed votes
//!
//! Arrival order decides block composition and therefore the block hash,
//! so it is preserved exactly. Every entry carries its arrival sequence,
//! which is also its persistence key.

use crate::types::{VoteId, VoteRecord};
use crate::{Error, Result};
use std::collections::{HashSet, VecDeque};

/// A pooled vote with its arrival sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingVote {
    /// Arrival sequence (monotonic per ledger)
    pub seq: u64,
    /// The vote
    pub vote: VoteRecord,
}

/// Insertion-ordered, duplicate-free vote buffer
#[derive(Debug, Default)]
pub struct PendingPool {
    entries: VecDeque<PendingVote>,
    ids: HashSet<VoteId>,
    next_seq: u64,
}

impl PendingPool {
    /// Empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries (sorted by sequence)
    pub fn from_entries(mut entries: Vec<PendingVote>) -> Self {
        entries.sort_by_key(|e| e.seq);
        let next_seq = entries.last().map(|e| e.seq + 1).unwrap_or(0);
        let ids = entries.iter().map(|e| e.vote.vote_id).collect();
        Self {
            entries: entries.into(),
            ids,
            next_seq,
        }
    }

    /// Number of pooled votes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is pooled
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether a vote ID is pooled
    pub fn contains(&self, vote_id: VoteId) -> bool {
        self.ids.contains(&vote_id)
    }

    /// Sequence the next inserted vote will receive
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Append a vote at the end, returning its arrival sequence
    pub fn insert(&mut self, vote: VoteRecord) -> Result<u64> {
        if !self.ids.insert(vote.vote_id) {
            return Err(Error::DuplicateVote(vote.vote_id));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(PendingVote { seq, vote });
        Ok(seq)
    }

    /// Take every pooled vote, leaving the pool empty
    pub fn drain(&mut self) -> Vec<PendingVote> {
        self.ids.clear();
        self.entries.drain(..).collect()
    }

    /// Put a drained batch back ahead of anything that arrived since
    pub fn restore_front(&mut self, batch: Vec<PendingVote>) {
        for entry in batch.into_iter().rev() {
            self.ids.insert(entry.vote.vote_id);
            self.entries.push_front(entry);
        }
    }

    /// Discard everything and restart sequencing
    pub fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
        self.next_seq = 0;
    }

    /// Pooled votes in arrival order
    pub fn votes(&self) -> impl Iterator<Item = &VoteRecord> {
        self.entries.iter().map(|e| &e.vote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ballot;
    use chrono::Utc;

    fn vote(id: u64, election: &str) -> VoteRecord {
        VoteRecord::new(
            VoteId(id),
            Ballot {
                voter_id: format!("voter-{}", id),
                candidate_id: "candidate-1".into(),
                election_id: election.into(),
                constituency: "north".into(),
            },
            Utc::now(),
            "0",
        )
    }

    #[test]
    fn test_insert_preserves_order() {
        let mut pool = PendingPool::new();
        for id in [3, 1, 2] {
            pool.insert(vote(id, "e")).unwrap();
        }
        let ids: Vec<u64> = pool.votes().map(|v| v.vote_id.0).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_duplicate_rejected_without_effect() {
        let mut pool = PendingPool::new();
        pool.insert(vote(1, "e")).unwrap();
        let err = pool.insert(vote(1, "e")).unwrap_err();
        assert!(matches!(err, Error::DuplicateVote(VoteId(1))));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_drain_empties_pool() {
        let mut pool = PendingPool::new();
        pool.insert(vote(1, "e")).unwrap();
        pool.insert(vote(2, "e")).unwrap();

        let batch = pool.drain();
        assert_eq!(batch.len(), 2);
        assert!(pool.is_empty());
        assert!(!pool.contains(VoteId(1)));

        // Sequence keeps increasing across drains
        assert_eq!(pool.insert(vote(3, "e")).unwrap(), 2);
    }

    #[test]
    fn test_restore_front_keeps_original_order() {
        let mut pool = PendingPool::new();
        pool.insert(vote(1, "e")).unwrap();
        pool.insert(vote(2, "e")).unwrap();
        let batch = pool.drain();

        pool.insert(vote(3, "e")).unwrap();
        pool.restore_front(batch);

        let ids: Vec<u64> = pool.votes().map(|v| v.vote_id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(pool.contains(VoteId(2)));
    }

    #[test]
    fn test_from_entries_resumes_sequence() {
        let entries = vec![
            PendingVote { seq: 7, vote: vote(2, "e") },
            PendingVote { seq: 4, vote: vote(1, "e") },
        ];
        let mut pool = PendingPool::from_entries(entries);
        let ids: Vec<u64> = pool.votes().map(|v| v.vote_id.0).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(pool.next_seq(), 8);
        assert_eq!(pool.insert(vote(3, "e")).unwrap(), 8);
    }
}
