// Player pool model and players.json loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

/// Pool tag reserved for two-person entries that occupy two roster slots.
pub const DUO_POOL: &str = "Duos";

#[derive(Debug, Error)]
pub enum PlayerLoadError {
    #[error("player file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse player file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A draftable player (or duo) in a room's pool.
///
/// Immutable once loaded for a room, except `revealed_name`, which is written
/// exactly once when the player is won at settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    /// Pool tag (e.g. "A", "B", "C", or [`DUO_POOL`]).
    pub pool: String,
    /// Arbitrary stat mapping (numeric and nested values).
    pub stats: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revealed_name: Option<String>,
}

impl Player {
    /// Roster slots this player occupies: duos count as 2, everyone else 1.
    pub fn slots(&self) -> u32 {
        if self.pool == DUO_POOL {
            2
        } else {
            1
        }
    }
}

// ---------------------------------------------------------------------------
// players.json shape
// ---------------------------------------------------------------------------

/// Top-level shape of players.json: `{ "pools": { "<tag>": [entries...] } }`.
///
/// A BTreeMap keeps pool iteration (and therefore id assignment) deterministic.
#[derive(Debug, Deserialize)]
struct PlayersFile {
    pools: BTreeMap<String, Vec<RawEntry>>,
}

/// A single pool entry. Regular pools carry `stats` directly; the Duos pool
/// carries a two-element `players` array whose stats get combined.
#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    #[serde(default)]
    stats: Map<String, Value>,
    #[serde(default)]
    players: Vec<RawMember>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    name: String,
    stats: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load the full player pool from a players.json file.
///
/// Duo entries are flattened into single [`Player`]s with combined stats:
/// `combat` takes the higher of the pair, `total`/`ehb`/`ehp` are summed,
/// boss kill counts are summed per boss, and a `players` array preserves the
/// individual members for display.
pub fn load_players(path: &Path) -> Result<Vec<Player>, PlayerLoadError> {
    let text = std::fs::read_to_string(path).map_err(|_| PlayerLoadError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let file: PlayersFile =
        serde_json::from_str(&text).map_err(|source| PlayerLoadError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;

    let mut all = Vec::new();
    let mut next_id = 0usize;

    for (pool_name, entries) in file.pools {
        for entry in entries {
            let (prefix, stats) = if pool_name == DUO_POOL {
                ("duo", combine_duo_stats(&entry.players))
            } else {
                ("player", entry.stats)
            };
            all.push(Player {
                id: format!("{prefix}-{next_id}"),
                name: entry.name,
                pool: pool_name.clone(),
                stats,
                revealed_name: None,
            });
            next_id += 1;
        }
    }

    info!("Loaded {} players from {}", all.len(), path.display());
    Ok(all)
}

/// Combine a duo's member stats into one stat mapping.
fn combine_duo_stats(members: &[RawMember]) -> Map<String, Value> {
    let mut combined = Map::new();

    combined.insert(
        "combat".into(),
        number(fold_stat(members, "combat", f64::max)),
    );
    for key in ["total", "ehb", "ehp"] {
        combined.insert(key.into(), number(fold_stat(members, key, |a, b| a + b)));
    }

    // Per-boss kill sums across both members.
    let mut bosses: BTreeMap<String, f64> = BTreeMap::new();
    for member in members {
        if let Some(Value::Object(member_bosses)) = member.stats.get("bosses") {
            for (boss, kills) in member_bosses {
                *bosses.entry(boss.clone()).or_insert(0.0) += kills.as_f64().unwrap_or(0.0);
            }
        }
    }
    let boss_map: Map<String, Value> = bosses
        .into_iter()
        .map(|(boss, kills)| (boss, number(kills)))
        .collect();
    combined.insert("bosses".into(), Value::Object(boss_map));

    // Keep the individual members for display: name plus their own stats.
    let member_values: Vec<Value> = members
        .iter()
        .map(|m| {
            let mut obj = m.stats.clone();
            obj.insert("name".into(), Value::String(m.name.clone()));
            Value::Object(obj)
        })
        .collect();
    combined.insert("players".into(), Value::Array(member_values));

    combined
}

/// Fold a numeric stat across duo members; missing stats count as 0.
fn fold_stat(members: &[RawMember], key: &str, fold: impl Fn(f64, f64) -> f64) -> f64 {
    members
        .iter()
        .map(|m| m.stats.get(key).and_then(Value::as_f64).unwrap_or(0.0))
        .reduce(fold)
        .unwrap_or(0.0)
}

/// Convert an f64 back to a JSON number, preserving integer representation.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_players_json(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn duo_pool_counts_two_slots() {
        let duo = Player {
            id: "duo-0".into(),
            name: "Pair".into(),
            pool: DUO_POOL.into(),
            stats: Map::new(),
            revealed_name: None,
        };
        let single = Player {
            id: "player-1".into(),
            name: "Solo".into(),
            pool: "A".into(),
            stats: Map::new(),
            revealed_name: None,
        };
        assert_eq!(duo.slots(), 2);
        assert_eq!(single.slots(), 1);
    }

    #[test]
    fn load_single_pools() {
        let path = write_players_json(
            "players_test_singles.json",
            r#"{
                "pools": {
                    "A": [
                        {"name": "Alpha", "stats": {"combat": 126, "total": 2277, "ehb": 900, "ehp": 1200, "bosses": {"zulrah": 2000}}},
                        {"name": "Beta", "stats": {"combat": 110, "total": 1800, "ehb": 100, "ehp": 400, "bosses": {}}}
                    ],
                    "B": [
                        {"name": "Gamma", "stats": {"combat": 100, "total": 1500, "ehb": 50, "ehp": 300, "bosses": {}}}
                    ]
                }
            }"#,
        );

        let players = load_players(&path).unwrap();
        assert_eq!(players.len(), 3);
        assert_eq!(players[0].name, "Alpha");
        assert_eq!(players[0].pool, "A");
        assert_eq!(players[0].id, "player-0");
        assert_eq!(players[2].pool, "B");
        assert_eq!(players[0].stats.get("combat"), Some(&json!(126)));
        assert!(players.iter().all(|p| p.revealed_name.is_none()));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_combines_duo_stats() {
        let path = write_players_json(
            "players_test_duos.json",
            r#"{
                "pools": {
                    "Duos": [
                        {"name": "Twin Peaks", "players": [
                            {"name": "Left", "stats": {"combat": 120, "total": 2000, "ehb": 300, "ehp": 500, "bosses": {"zulrah": 100, "vorkath": 50}}},
                            {"name": "Right", "stats": {"combat": 115, "total": 1900, "ehb": 200, "ehp": 450, "bosses": {"zulrah": 25}}}
                        ]}
                    ]
                }
            }"#,
        );

        let players = load_players(&path).unwrap();
        assert_eq!(players.len(), 1);
        let duo = &players[0];
        assert_eq!(duo.pool, DUO_POOL);
        assert!(duo.id.starts_with("duo-"));
        assert_eq!(duo.stats.get("combat"), Some(&json!(120)));
        assert_eq!(duo.stats.get("total"), Some(&json!(3900)));
        assert_eq!(duo.stats.get("ehb"), Some(&json!(500)));
        assert_eq!(duo.stats.get("ehp"), Some(&json!(950)));

        let bosses = duo.stats.get("bosses").unwrap().as_object().unwrap();
        assert_eq!(bosses.get("zulrah"), Some(&json!(125)));
        assert_eq!(bosses.get("vorkath"), Some(&json!(50)));

        let members = duo.stats.get("players").unwrap().as_array().unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].get("name"), Some(&json!("Left")));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_reports_path() {
        let path = PathBuf::from("/nonexistent/players.json");
        let err = load_players(&path).unwrap_err();
        match err {
            PlayerLoadError::FileNotFound { path } => {
                assert!(path.ends_with("players.json"));
            }
            other => panic!("expected FileNotFound, got: {other}"),
        }
    }

    #[test]
    fn invalid_json_reports_parse_error() {
        let path = write_players_json("players_test_invalid.json", "not json {{{");
        let err = load_players(&path).unwrap_err();
        assert!(matches!(err, PlayerLoadError::ParseError { .. }));
        let _ = std::fs::remove_file(&path);
    }
}
