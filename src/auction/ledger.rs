// Sealed bids for one round, and winner resolution.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A single sealed bid. The timestamp is audit-only; it never participates
/// in tie-breaking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub captain_id: String,
    pub amount: u32,
    pub submitted_at: DateTime<Utc>,
}

/// The per-round collection of sealed bids, at most one per captain.
///
/// Entries keep first-submission order; a resubmission before reveal silently
/// replaces the prior amount in place.
#[derive(Debug, Clone, Default)]
pub struct BidLedger {
    bids: Vec<Bid>,
}

impl BidLedger {
    pub fn new() -> Self {
        BidLedger::default()
    }

    /// Record (or overwrite) a captain's bid. Returns the number of distinct
    /// captains with a bid on the ledger afterward.
    pub fn record(&mut self, captain_id: &str, amount: u32) -> usize {
        match self.bids.iter_mut().find(|b| b.captain_id == captain_id) {
            Some(existing) => {
                existing.amount = amount;
                existing.submitted_at = Utc::now();
            }
            None => self.bids.push(Bid {
                captain_id: captain_id.to_string(),
                amount,
                submitted_at: Utc::now(),
            }),
        }
        self.bids.len()
    }

    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }

    pub fn contains(&self, captain_id: &str) -> bool {
        self.bids.iter().any(|b| b.captain_id == captain_id)
    }

    /// All bids in first-submission order.
    pub fn entries(&self) -> &[Bid] {
        &self.bids
    }

    /// Re-key a captain's bid after a reconnect swaps their connection id.
    /// The bid belongs to the captain, not the connection.
    pub fn rename_captain(&mut self, old_id: &str, new_id: &str) {
        if let Some(bid) = self.bids.iter_mut().find(|b| b.captain_id == old_id) {
            bid.captain_id = new_id.to_string();
        }
    }

    /// Resolve the winning bid: the unique maximum, or a uniformly random
    /// choice among the entries tied at the maximum.
    ///
    /// Candidates are ordered by captain id before drawing so a seeded RNG
    /// yields a reproducible winner regardless of submission order.
    pub fn resolve<R: Rng>(&self, rng: &mut R) -> Option<&Bid> {
        let max = self.bids.iter().map(|b| b.amount).max()?;
        let mut tied: Vec<&Bid> = self.bids.iter().filter(|b| b.amount == max).collect();
        if tied.len() == 1 {
            return Some(tied[0]);
        }
        tied.sort_by(|a, b| a.captain_id.cmp(&b.captain_id));
        tied.choose(rng).copied()
    }
}
