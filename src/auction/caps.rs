// Roster cap derivation and bid eligibility. Pure functions over the player
// pool and a captain's roster; nothing here touches room state.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::auction::captain::Captain;
use crate::players::Player;

/// Per-pool and team-wide roster caps, derived once at room creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCaps {
    /// Max players per pool per team.
    pub pool_caps: HashMap<String, u32>,
    /// Max total slots per team (duos count 2).
    pub team_cap: u32,
    /// Pool sizes at creation time, kept for "remaining of original" displays.
    pub original_pool_counts: HashMap<String, u32>,
}

/// A captain's usage of a single pool, for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolUsage {
    pub current: u32,
    pub cap: u32,
    pub slots: u32,
}

/// A captain's usage across all pools plus their slot total.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolUsageSummary {
    pub pool_usage: HashMap<String, PoolUsage>,
    pub total_slots: u32,
    pub team_cap: u32,
}

/// Derive room caps from the full player pool and the declared team count.
///
/// Pool cap = ceil(pool size / team count); team cap = ceil(total slots /
/// team count). `team_count == 0` is rejected at the room-creation boundary,
/// never here.
pub fn calculate(players: &[Player], team_count: u32) -> RoomCaps {
    let mut pool_counts: HashMap<String, u32> = HashMap::new();
    let mut total_slots = 0u32;

    for player in players {
        *pool_counts.entry(player.pool.clone()).or_insert(0) += 1;
        total_slots += player.slots();
    }

    let pool_caps = pool_counts
        .iter()
        .map(|(pool, &count)| (pool.clone(), count.div_ceil(team_count)))
        .collect();

    RoomCaps {
        pool_caps,
        team_cap: total_slots.div_ceil(team_count),
        original_pool_counts: pool_counts,
    }
}

/// Whether a captain may bid on `candidate` given their current roster.
///
/// Ineligible if winning would push their pool count past that pool's cap, or
/// their slot total past the team cap. Recomputed fresh at every round start;
/// rosters change between rounds so this is never cached.
pub fn can_captain_bid(captain: &Captain, candidate: &Player, caps: &RoomCaps) -> bool {
    let pool_counts = captain.pool_counts();
    let current_in_pool = pool_counts.get(&candidate.pool).copied().unwrap_or(0);
    let pool_cap = caps.pool_caps.get(&candidate.pool).copied().unwrap_or(0);
    if current_in_pool >= pool_cap {
        return false;
    }

    captain.total_slots() + candidate.slots() <= caps.team_cap
}

/// Count undrafted players per pool, excluding completed indices and the
/// player currently on the block.
pub fn remaining_pool_counts(
    players: &[Player],
    completed: &HashSet<usize>,
    in_flight: Option<usize>,
) -> HashMap<String, u32> {
    let mut remaining = HashMap::new();
    for (index, player) in players.iter().enumerate() {
        if completed.contains(&index) || Some(index) == in_flight {
            continue;
        }
        *remaining.entry(player.pool.clone()).or_insert(0) += 1;
    }
    remaining
}

/// Summarize one captain's pool usage against the room caps.
pub fn captain_usage(captain: &Captain, caps: &RoomCaps) -> PoolUsageSummary {
    let mut pool_usage: HashMap<String, PoolUsage> = caps
        .pool_caps
        .iter()
        .map(|(pool, &cap)| {
            (
                pool.clone(),
                PoolUsage {
                    current: 0,
                    cap,
                    slots: 0,
                },
            )
        })
        .collect();

    let mut total_slots = 0u32;
    for player in &captain.roster {
        if let Some(usage) = pool_usage.get_mut(&player.pool) {
            usage.current += 1;
            usage.slots += player.slots();
            total_slots += player.slots();
        }
    }

    PoolUsageSummary {
        pool_usage,
        total_slots,
        team_cap: caps.team_cap,
    }
}
