// Captain state: identity, color, budget, and roster accounting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::players::Player;

/// Fixed palette cycled through in join order. Colors stay stable for the
/// room's life even across reconnects.
pub const CAPTAIN_COLORS: [&str; 8] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
];

/// A team captain in an auction room.
///
/// `id` is the current connection handle; a reconnect under the same display
/// name replaces it in place, so budget and roster follow the name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Captain {
    pub id: String,
    pub name: String,
    pub color: String,
    pub budget: u32,
    pub remaining_budget: u32,
    pub roster: Vec<Player>,
    pub connected: bool,
}

impl Captain {
    /// Create a fresh captain. `join_index` selects the palette color.
    pub fn new(id: String, name: String, join_index: usize, budget: u32) -> Self {
        Captain {
            id,
            name,
            color: CAPTAIN_COLORS[join_index % CAPTAIN_COLORS.len()].to_string(),
            budget,
            remaining_budget: budget,
            roster: Vec::new(),
            connected: true,
        }
    }

    /// Players held per pool tag.
    pub fn pool_counts(&self) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for player in &self.roster {
            *counts.entry(player.pool.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Total roster slots used (duos occupy 2).
    pub fn total_slots(&self) -> u32 {
        self.roster.iter().map(Player::slots).sum()
    }

    /// Deduct a winning bid and take the won player onto the roster.
    pub fn award(&mut self, player: Player, amount: u32) {
        self.remaining_budget = self.remaining_budget.saturating_sub(amount);
        self.roster.push(player);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::players::DUO_POOL;
    use serde_json::Map;

    fn player(name: &str, pool: &str) -> Player {
        Player {
            id: format!("player-{name}"),
            name: name.into(),
            pool: pool.into(),
            stats: Map::new(),
            revealed_name: None,
        }
    }

    #[test]
    fn palette_cycles_in_join_order() {
        let first = Captain::new("c1".into(), "Ann".into(), 0, 100);
        let ninth = Captain::new("c9".into(), "Ivy".into(), 8, 100);
        assert_eq!(first.color, CAPTAIN_COLORS[0]);
        assert_eq!(ninth.color, CAPTAIN_COLORS[0]);
    }

    #[test]
    fn pool_counts_and_slots() {
        let mut captain = Captain::new("c1".into(), "Ann".into(), 0, 500);
        captain.roster.push(player("a", "A"));
        captain.roster.push(player("b", "A"));
        captain.roster.push(player("d", DUO_POOL));

        let counts = captain.pool_counts();
        assert_eq!(counts.get("A"), Some(&2));
        assert_eq!(counts.get(DUO_POOL), Some(&1));
        assert_eq!(captain.total_slots(), 4);
    }

    #[test]
    fn award_charges_budget_and_extends_roster() {
        let mut captain = Captain::new("c1".into(), "Ann".into(), 0, 500);
        captain.award(player("a", "A"), 120);
        assert_eq!(captain.remaining_budget, 380);
        assert_eq!(captain.budget, 500);
        assert_eq!(captain.roster.len(), 1);
    }

    #[test]
    fn zero_amount_award_charges_nothing() {
        let mut captain = Captain::new("c1".into(), "Ann".into(), 0, 500);
        captain.award(player("a", "A"), 0);
        assert_eq!(captain.remaining_budget, 500);
    }
}
