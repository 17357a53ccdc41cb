// Core-facing boundary types: inbound actions, outbound events, and the
// payload structs they carry. The transport layer (outside this crate) frames
// these; the engine only produces and consumes the typed values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auction::caps::{PoolUsageSummary, RoomCaps};
use crate::auction::captain::Captain;
use crate::auction::ledger::Bid;
use crate::auction::room::{RoomSettings, RoomState};
use crate::players::Player;

/// Connection handle assigned by the transport layer. Stable per connection;
/// a captain's stored id is swapped on reconnect.
pub type ConnId = String;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Room-creation request. Omitted fields fall back to the configured
/// defaults, matching the original create-room endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub team_count: Option<u32>,
    #[serde(default)]
    pub initial_budget: Option<u32>,
    #[serde(default)]
    pub max_players_per_round: Option<u32>,
}

/// An action addressed to a single room. The room code is carried by the
/// registry dispatch, the acting connection by the command envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    JoinAsAuctioneer,
    JoinAsCaptain { name: String },
    StartBidding { player_index: usize },
    SubmitBid { amount: i64 },
    RevealBids,
    ResetBudgets,
    UpdatePlayers { players: Vec<Player> },
    Disconnect,
    CloseRoom,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Who should receive an outbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Everyone in the room.
    Room,
    /// A single connection (private acks, snapshots on join).
    Conn(ConnId),
}

/// An outbound event plus its delivery scope.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub audience: Audience,
    pub event: Event,
}

impl Envelope {
    pub fn broadcast(event: Event) -> Self {
        Envelope {
            audience: Audience::Room,
            event,
        }
    }

    pub fn to_conn(conn: impl Into<ConnId>, event: Event) -> Self {
        Envelope {
            audience: Audience::Conn(conn.into()),
            event,
        }
    }
}

/// Events emitted by a room for the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    /// Full snapshot, sent privately on join.
    RoomState(RoomSnapshot),
    /// The captain set or some captain's fields changed.
    CaptainRosterChanged { captains: Vec<Captain> },
    /// Private join acknowledgment for a captain.
    JoinedRoom { captain: Captain, state: RoomState },
    /// A round opened with a partially-masked player view.
    RoundOpened(RoundOpened),
    /// Private acknowledgment to the bidder.
    BidAcknowledged { amount: u32 },
    /// Broadcast running count of submitted bids.
    BidTally(BidTally),
    /// A round settled: full ledger, winner (or none), updated captains.
    RoundSettled(RoundSettled),
    /// No eligible captains; the player was completed without a round.
    PlayerAutoSkipped {
        player: Player,
        player_index: usize,
        reason: String,
    },
    /// The player list was replaced before the auction began.
    PlayersUpdated { players: Vec<Player> },
    /// The room was closed by the auctioneer.
    RoomClosed { code: String },
}

/// Full room snapshot, the shape sent to a joining connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: String,
    pub captains: Vec<Captain>,
    pub players: Vec<Player>,
    pub state: RoomState,
    /// Index of the player on the block, present while a round is open.
    pub current_player_index: Option<usize>,
    pub completed_players: Vec<usize>,
    pub caps: RoomCaps,
    pub remaining_pool_counts: HashMap<String, u32>,
    pub captain_usage: Vec<CaptainUsage>,
    pub settings: RoomSettings,
}

/// One captain's pool usage, keyed for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptainUsage {
    pub captain_id: ConnId,
    pub usage: PoolUsageSummary,
}

/// A player view with masked stats for the bidding preview.
///
/// Always carries combat level, total level, and every boss-kill stat;
/// exactly one of `ehb`/`ehp` is exposed per round, chosen at random. The
/// `visible_stats` list names what survived masking (boss stats carry a
/// `boss_` prefix, matching the original payload).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPreview {
    pub id: String,
    pub name: String,
    pub pool: String,
    pub stats: Map<String, Value>,
    pub visible_stats: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundOpened {
    pub player: PlayerPreview,
    pub player_index: usize,
    pub eligible_captains: Vec<ConnId>,
    pub skipped_captains: Vec<ConnId>,
    pub caps: RoomCaps,
    pub remaining_pool_counts: HashMap<String, u32>,
    pub captain_usage: Vec<CaptainUsage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidTally {
    pub captain_id: ConnId,
    pub captain_name: String,
    pub total_bids: usize,
    pub total_captains: usize,
}

/// A bid paired with its captain's display fields for the reveal screen.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealedBid {
    pub captain_id: ConnId,
    pub captain_name: String,
    pub captain_color: String,
    pub amount: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSettled {
    /// Every bid from the ledger, not just the winner's.
    pub bids: Vec<RevealedBid>,
    pub winner: Option<RevealedBid>,
    pub captains: Vec<Captain>,
    pub completed_player_index: usize,
    /// The auctioned player, unmasked (revealed name set when won).
    pub player: Player,
}

impl RevealedBid {
    /// Pair a ledger entry with its captain's display fields.
    pub fn from_bid(bid: &Bid, captain: &Captain) -> Self {
        RevealedBid {
            captain_id: bid.captain_id.clone(),
            captain_name: captain.name.clone(),
            captain_color: captain.color.clone(),
            amount: bid.amount,
        }
    }
}
