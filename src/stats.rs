//! Ownership statistics derived from a resolved token list.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::types::{Address, Token};

/// Number of entries kept in the top-holders ranking.
pub const TOP_HOLDERS_LIMIT: usize = 5;

/// One row of the top-holders ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HolderStanding {
    pub owner: Address,
    /// Resolved tokens held by this owner.
    pub count: u64,
    /// Share of the authoritative total supply, in percent.
    pub percentage: f64,
}

/// Collection-wide ownership statistics.
///
/// Recomputed in full on every scan, never patched incrementally.
/// `total_supply` is the contract-reported value rather than the resolved
/// token count, so percentages stay meaningful when some tokens failed
/// resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub total_supply: u64,
    pub unique_owners: HashSet<Address>,
    pub tokens_per_owner: HashMap<Address, u64>,
    /// Owners ranked descending by count, ties broken by first appearance
    /// in the token list, truncated to [`TOP_HOLDERS_LIMIT`].
    pub top_holders: Vec<HolderStanding>,
}

impl CollectionStats {
    /// `unique_owners / total_supply`, in percent. Zero for an empty
    /// collection.
    pub fn distribution_percentage(&self) -> f64 {
        share(self.unique_owners.len() as u64, self.total_supply)
    }

    /// Average tokens per unique owner, against the authoritative supply.
    pub fn average_per_owner(&self) -> f64 {
        if self.unique_owners.is_empty() {
            0.0
        } else {
            self.total_supply as f64 / self.unique_owners.len() as f64
        }
    }
}

/// Folds a resolved token list into [`CollectionStats`].
///
/// Pure function of its inputs: same tokens and supply always yield the
/// same statistics.
pub fn aggregate(tokens: &[Token], total_supply: u64) -> CollectionStats {
    // First-seen insertion order, kept for the ranking tie-break.
    let mut order: Vec<Address> = Vec::new();
    let mut counts: HashMap<Address, u64> = HashMap::new();

    for token in tokens {
        let entry = counts.entry(token.owner).or_insert(0);
        if *entry == 0 {
            order.push(token.owner);
        }
        *entry += 1;
    }

    let mut top_holders: Vec<HolderStanding> = order
        .iter()
        .map(|owner| HolderStanding {
            owner: *owner,
            count: counts[owner],
            percentage: share(counts[owner], total_supply),
        })
        .collect();
    // Stable sort: equal counts keep first-seen order.
    top_holders.sort_by(|a, b| b.count.cmp(&a.count));
    top_holders.truncate(TOP_HOLDERS_LIMIT);

    CollectionStats {
        total_supply,
        unique_owners: order.iter().copied().collect(),
        tokens_per_owner: counts,
        top_holders,
    }
}

fn share(count: u64, total_supply: u64) -> f64 {
    if total_supply == 0 {
        0.0
    } else {
        count as f64 / total_supply as f64 * 100.0
    }
}
