// Configuration loading and parsing (auction.toml).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    ReadError { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// auction.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level `[auction]` table in auction.toml.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    auction: AuctionConfig,
}

/// Room-creation defaults, used when a create-room request omits a field.
#[derive(Debug, Clone, Deserialize)]
pub struct AuctionConfig {
    /// Number of teams drafting (pool caps are derived from this).
    #[serde(default = "default_team_count")]
    pub team_count: u32,
    /// Starting budget handed to every captain.
    #[serde(default = "default_budget")]
    pub initial_budget: u32,
    /// Advisory round-size setting carried in room snapshots; not enforced.
    #[serde(default = "default_max_players_per_round")]
    pub max_players_per_round: u32,
    /// Where to find the player pool file.
    #[serde(default = "default_players_path")]
    pub players_path: String,
}

fn default_team_count() -> u32 {
    4
}

fn default_budget() -> u32 {
    1000
}

fn default_max_players_per_round() -> u32 {
    4
}

fn default_players_path() -> String {
    "players.json".into()
}

impl Default for AuctionConfig {
    fn default() -> Self {
        AuctionConfig {
            team_count: default_team_count(),
            initial_budget: default_budget(),
            max_players_per_round: default_max_players_per_round(),
            players_path: default_players_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load configuration from `config/auction.toml` relative to `base_dir`.
///
/// The file is optional: a missing file yields the built-in defaults, the
/// same way an absent credentials file would. A present-but-invalid file is
/// an error.
pub fn load_config_from(base_dir: &Path) -> Result<AuctionConfig, ConfigError> {
    let path = base_dir.join("config").join("auction.toml");
    if !path.exists() {
        let config = AuctionConfig::default();
        validate(&config)?;
        return Ok(config);
    }

    let text =
        std::fs::read_to_string(&path).map_err(|_| ConfigError::ReadError { path: path.clone() })?;
    let file: ConfigFile = toml::from_str(&text).map_err(|source| ConfigError::ParseError {
        path: path.clone(),
        source,
    })?;

    validate(&file.auction)?;
    Ok(file.auction)
}

/// Convenience wrapper: loads config relative to the current working directory.
pub fn load_config() -> Result<AuctionConfig, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::ReadError {
        path: PathBuf::from("."),
    })?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &AuctionConfig) -> Result<(), ConfigError> {
    if config.team_count == 0 {
        return Err(ConfigError::ValidationError {
            field: "auction.team_count".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.initial_budget == 0 {
        return Err(ConfigError::ValidationError {
            field: "auction.initial_budget".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.players_path.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "auction.players_path".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
