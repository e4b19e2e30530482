use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of one match record on the ratings service
pub type BattleId = u64;

/// Rating of one participant in a battle
///
/// The service sometimes returns `null` for either value; that is kept as
/// `None` and never coerced to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRating {
    #[serde(rename = "accountId")]
    pub account_id: u64,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub stdev: Option<f64>,
}

/// Ratings for every participant of a battle, in service order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRatings {
    pub id: BattleId,
    #[serde(default)]
    pub players: Vec<PlayerRating>,
}

impl BattleRatings {
    /// True if the service gave no rating for at least one player
    pub fn has_null_rating(&self) -> bool {
        self.players.iter().any(|p| p.rating.is_none())
    }
}

/// Result of fetching a list of battle IDs
///
/// Every requested ID ends up in exactly one of the three lists:
/// - `fetched`: records returned by the service
/// - `skipped`: IDs that make the service fail any request containing them
/// - `missing`: IDs silently left out of a successful response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub fetched: Vec<BattleRatings>,
    pub skipped: Vec<BattleId>,
    pub missing: Vec<BattleId>,
}

impl FetchOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Outcome where every ID was isolated as poisoned
    pub fn skipped(battle_ids: Vec<BattleId>) -> Self {
        Self {
            skipped: battle_ids,
            ..Self::default()
        }
    }

    /// Build the outcome of one successful request
    ///
    /// Requested IDs without a matching record are missing. Counting is done
    /// with multiplicity, so a duplicated ID needs one record per occurrence.
    pub fn from_response(requested: &[BattleId], fetched: Vec<BattleRatings>) -> Self {
        let mut returned: HashMap<BattleId, usize> = HashMap::with_capacity(fetched.len());
        for battle in &fetched {
            *returned.entry(battle.id).or_default() += 1;
        }

        let missing = requested
            .iter()
            .copied()
            .filter(|id| match returned.get_mut(id) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    false
                }
                _ => true,
            })
            .collect();

        Self {
            fetched,
            skipped: Vec::new(),
            missing,
        }
    }

    /// Append `other` after the entries already present
    pub fn extend(&mut self, other: FetchOutcome) {
        self.fetched.extend(other.fetched);
        self.skipped.extend(other.skipped);
        self.missing.extend(other.missing);
    }

    /// Concatenate outcomes in order
    pub fn concat(outcomes: impl IntoIterator<Item = FetchOutcome>) -> Self {
        outcomes.into_iter().fold(Self::empty(), |mut acc, outcome| {
            acc.extend(outcome);
            acc
        })
    }

    /// Number of IDs accounted for across all three lists
    pub fn total(&self) -> usize {
        self.fetched.len() + self.skipped.len() + self.missing.len()
    }

    /// True if the outcome accounts for exactly the requested IDs, counted
    /// with multiplicity
    pub fn accounts_for(&self, requested: &[BattleId]) -> bool {
        if self.total() != requested.len() {
            return false;
        }

        let mut counts: HashMap<BattleId, i64> = HashMap::with_capacity(requested.len());
        for id in requested {
            *counts.entry(*id).or_default() += 1;
        }
        let produced = self
            .fetched
            .iter()
            .map(|b| b.id)
            .chain(self.skipped.iter().copied())
            .chain(self.missing.iter().copied());
        for id in produced {
            *counts.entry(id).or_default() -= 1;
        }

        counts.values().all(|c| *c == 0)
    }

    /// IDs of fetched battles with at least one null rating
    pub fn null_rated(&self) -> Vec<BattleId> {
        self.fetched
            .iter()
            .filter(|b| b.has_null_rating())
            .map(|b| b.id)
            .collect()
    }
}
