// The auction room state machine.
//
// One value of [`AuctionRoom`] owns everything about a single room: captains,
// players, caps, the in-flight round, and the macro state. All mutation goes
// through [`AuctionRoom::apply`], which is synchronous and never suspends.
// The per-room worker task in the registry serializes calls to it, so the
// state machine itself stays single-threaded and directly testable.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auction::caps::{self, RoomCaps};
use crate::auction::captain::Captain;
use crate::auction::ledger::BidLedger;
use crate::players::Player;
use crate::protocol::{
    Action, CaptainUsage, ConnId, Envelope, Event, BidTally, PlayerPreview, RevealedBid,
    RoomSnapshot, RoundOpened, RoundSettled,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything that can go wrong while processing a room action.
///
/// Rejections never mutate room state and are reported only to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room not found: {code}")]
    NotFound { code: String },

    #[error("`{action}` requires a role this connection does not hold")]
    Unauthorized { action: String },

    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

// ---------------------------------------------------------------------------
// Room state
// ---------------------------------------------------------------------------

/// Macro state of a room. `Revealing` exists only inside the settlement
/// transition; by the time an action reply is produced the room is back in
/// `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomState {
    Setup,
    Waiting,
    Bidding,
    ReadyToReveal,
    Revealing,
}

/// Room-level settings. `max_players_per_round` is informational only and is
/// never enforced by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub initial_budget: u32,
    pub max_players_per_round: u32,
}

/// One in-flight player auction.
#[derive(Debug)]
struct Round {
    player_index: usize,
    /// Captains allowed to bid, fixed at round start.
    eligible: HashSet<ConnId>,
    /// Captains capped out of this player, fixed at round start.
    skipped: HashSet<ConnId>,
    ledger: BidLedger,
}

impl Round {
    /// Follow a captain through a mid-round reconnect.
    fn rename_captain(&mut self, old_id: &str, new_id: &str) {
        if self.eligible.remove(old_id) {
            self.eligible.insert(new_id.to_string());
        }
        if self.skipped.remove(old_id) {
            self.skipped.insert(new_id.to_string());
        }
        self.ledger.rename_captain(old_id, new_id);
    }
}

// ---------------------------------------------------------------------------
// AuctionRoom
// ---------------------------------------------------------------------------

pub struct AuctionRoom {
    code: String,
    players: Vec<Player>,
    completed: HashSet<usize>,
    round: Option<Round>,
    /// Captains in join order (palette cycling depends on it).
    captains: Vec<Captain>,
    caps: RoomCaps,
    settings: RoomSettings,
    auctioneer: Option<ConnId>,
    state: RoomState,
    rng: StdRng,
    closed: bool,
}

impl AuctionRoom {
    /// Create a room over a fixed player pool. Caps are derived here, once,
    /// and never change for the room's life.
    pub fn new(
        code: String,
        players: Vec<Player>,
        team_count: u32,
        settings: RoomSettings,
        rng: StdRng,
    ) -> Self {
        let caps = caps::calculate(&players, team_count);
        info!(
            code = %code,
            team_count,
            players = players.len(),
            team_cap = caps.team_cap,
            "room created"
        );
        AuctionRoom {
            code,
            players,
            completed: HashSet::new(),
            round: None,
            captains: Vec::new(),
            caps,
            settings,
            auctioneer: None,
            state: RoomState::Setup,
            rng,
            closed: false,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn captains(&self) -> &[Captain] {
        &self.captains
    }

    pub fn caps(&self) -> &RoomCaps {
        &self.caps
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn is_completed(&self, player_index: usize) -> bool {
        self.completed.contains(&player_index)
    }

    /// Set once the auctioneer closes the room; the worker stops afterward.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Process one action from `origin`. Returns the outbound envelopes on
    /// success; on error the room is untouched and only the caller hears
    /// about it.
    pub fn apply(&mut self, origin: &str, action: Action) -> Result<Vec<Envelope>, RoomError> {
        if self.closed {
            return Err(RoomError::InvalidState {
                reason: "room is closed".into(),
            });
        }
        match action {
            Action::JoinAsAuctioneer => self.join_as_auctioneer(origin),
            Action::JoinAsCaptain { name } => self.join_as_captain(origin, name),
            Action::StartBidding { player_index } => self.start_bidding(origin, player_index),
            Action::SubmitBid { amount } => self.submit_bid(origin, amount),
            Action::RevealBids => self.reveal_bids(origin),
            Action::ResetBudgets => self.reset_budgets(origin),
            Action::UpdatePlayers { players } => self.update_players(origin, players),
            Action::Disconnect => self.disconnect(origin),
            Action::CloseRoom => self.close_room(origin),
        }
    }

    // -- joins ---------------------------------------------------------------

    fn join_as_auctioneer(&mut self, origin: &str) -> Result<Vec<Envelope>, RoomError> {
        // A later join takes over the role; there is at most one auctioneer.
        self.auctioneer = Some(origin.to_string());
        if self.state == RoomState::Setup {
            self.state = RoomState::Waiting;
        }
        info!(code = %self.code, conn = origin, "auctioneer joined");
        Ok(vec![Envelope::to_conn(
            origin,
            Event::RoomState(self.snapshot()),
        )])
    }

    fn join_as_captain(&mut self, origin: &str, name: String) -> Result<Vec<Envelope>, RoomError> {
        if name.trim().is_empty() {
            return Err(RoomError::InvalidInput {
                reason: "captain name must not be empty".into(),
            });
        }

        let captain = match self.captains.iter_mut().find(|c| c.name == name) {
            Some(existing) => {
                // Reconnection: the display name inherits the previous
                // captain's budget and roster; the old connection id is dead
                // from this point on.
                let old_id = std::mem::replace(&mut existing.id, origin.to_string());
                existing.connected = true;
                if let Some(round) = &mut self.round {
                    round.rename_captain(&old_id, origin);
                }
                info!(code = %self.code, captain = %name, "captain reconnected");
                existing.clone()
            }
            None => {
                let captain = Captain::new(
                    origin.to_string(),
                    name.clone(),
                    self.captains.len(),
                    self.settings.initial_budget,
                );
                self.captains.push(captain.clone());
                info!(code = %self.code, captain = %name, "captain joined");
                captain
            }
        };

        Ok(vec![
            Envelope::broadcast(Event::CaptainRosterChanged {
                captains: self.captains.clone(),
            }),
            Envelope::to_conn(
                origin,
                Event::JoinedRoom {
                    captain,
                    state: self.state,
                },
            ),
        ])
    }

    // -- round start ---------------------------------------------------------

    fn start_bidding(
        &mut self,
        origin: &str,
        player_index: usize,
    ) -> Result<Vec<Envelope>, RoomError> {
        self.require_auctioneer(origin, "startBidding")?;

        if player_index >= self.players.len() {
            return Err(RoomError::InvalidInput {
                reason: format!("player index {player_index} is out of range"),
            });
        }
        if self.completed.contains(&player_index) {
            return Err(RoomError::InvalidState {
                reason: format!("player {player_index} has already been auctioned"),
            });
        }
        if self.round.is_some() {
            return Err(RoomError::InvalidState {
                reason: "a round is already in progress".into(),
            });
        }

        // Partition captains by fresh eligibility: rosters changed since the
        // last round, so nothing here is ever cached.
        let candidate = &self.players[player_index];
        let mut eligible = Vec::new();
        let mut skipped = Vec::new();
        for captain in &self.captains {
            if caps::can_captain_bid(captain, candidate, &self.caps) {
                eligible.push(captain.id.clone());
            } else {
                skipped.push(captain.id.clone());
            }
        }

        if eligible.is_empty() {
            // Terminal for this player: completed immediately, no round.
            self.completed.insert(player_index);
            info!(
                code = %self.code,
                player_index,
                "player auto-skipped, no eligible captains"
            );
            return Ok(vec![Envelope::broadcast(Event::PlayerAutoSkipped {
                player: self.players[player_index].clone(),
                player_index,
                reason: "No eligible captains (all at capacity limits)".into(),
            })]);
        }

        // Pick which efficiency stat stays visible this round; the other is
        // masked. Combat, total, and every boss stat are always shown.
        let efficiency_key = if self.rng.gen_bool(0.5) { "ehb" } else { "ehp" };
        let preview = build_preview(&self.players[player_index], efficiency_key);

        self.round = Some(Round {
            player_index,
            eligible: eligible.iter().cloned().collect(),
            skipped: skipped.iter().cloned().collect(),
            ledger: BidLedger::new(),
        });
        self.state = RoomState::Bidding;
        info!(
            code = %self.code,
            player_index,
            eligible = eligible.len(),
            skipped = skipped.len(),
            "bidding started"
        );

        Ok(vec![Envelope::broadcast(Event::RoundOpened(RoundOpened {
            player: preview,
            player_index,
            eligible_captains: eligible,
            skipped_captains: skipped,
            caps: self.caps.clone(),
            remaining_pool_counts: caps::remaining_pool_counts(
                &self.players,
                &self.completed,
                Some(player_index),
            ),
            captain_usage: self.usage_snapshot(),
        }))])
    }

    // -- bidding -------------------------------------------------------------

    fn submit_bid(&mut self, origin: &str, amount: i64) -> Result<Vec<Envelope>, RoomError> {
        if self.state != RoomState::Bidding {
            return Err(RoomError::InvalidState {
                reason: "bids are not open".into(),
            });
        }
        let round = self.round.as_mut().ok_or_else(|| RoomError::InvalidState {
            reason: "no round in progress".into(),
        })?;

        // Stale connection ids (replaced by a reconnect) fail this lookup.
        let captain = self
            .captains
            .iter()
            .find(|c| c.id == origin)
            .ok_or_else(|| RoomError::Unauthorized {
                action: "submitBid".into(),
            })?;

        if round.skipped.contains(origin) {
            return Err(RoomError::InvalidState {
                reason: "at capacity limits for this player's pool".into(),
            });
        }
        if !round.eligible.contains(origin) {
            // Joined after the round opened; eligibility is fixed at start.
            return Err(RoomError::InvalidState {
                reason: "not part of this round".into(),
            });
        }
        if amount < 0 {
            return Err(RoomError::InvalidInput {
                reason: "bid amount cannot be negative".into(),
            });
        }
        if amount > i64::from(captain.remaining_budget) {
            return Err(RoomError::InvalidInput {
                reason: "bid exceeds remaining budget".into(),
            });
        }

        let amount = amount as u32;
        let total_bids = round.ledger.record(origin, amount);
        let total_captains = round.eligible.len();
        debug!(
            code = %self.code,
            captain = %captain.name,
            total_bids,
            total_captains,
            "bid recorded"
        );

        let envelopes = vec![
            Envelope::to_conn(origin, Event::BidAcknowledged { amount }),
            Envelope::broadcast(Event::BidTally(BidTally {
                captain_id: origin.to_string(),
                captain_name: captain.name.clone(),
                total_bids,
                total_captains,
            })),
        ];

        if total_bids >= total_captains {
            self.state = RoomState::ReadyToReveal;
            info!(code = %self.code, "all eligible captains have bid");
        }

        Ok(envelopes)
    }

    // -- settlement ----------------------------------------------------------

    fn reveal_bids(&mut self, origin: &str) -> Result<Vec<Envelope>, RoomError> {
        self.require_auctioneer(origin, "revealBids")?;

        let Some(round) = self.round.take() else {
            return Err(RoomError::InvalidState {
                reason: "no round to reveal".into(),
            });
        };
        // Early reveal is allowed: valid from Bidding as well as ReadyToReveal.
        self.state = RoomState::Revealing;
        let player_index = round.player_index;

        let settled = if let Some(winning) = round.ledger.resolve(&mut self.rng).cloned() {
            // Delayed identity disclosure: the revealed name is written
            // exactly once, when the win is finalized.
            let player = &mut self.players[player_index];
            if player.revealed_name.is_none() {
                player.revealed_name = Some(player.name.clone());
            }
            let won_player = player.clone();

            let bids = self.revealed_bids(&round.ledger);
            let winner_entry = bids
                .iter()
                .find(|b| b.captain_id == winning.captain_id)
                .cloned();

            if let Some(captain) = self
                .captains
                .iter_mut()
                .find(|c| c.id == winning.captain_id)
            {
                captain.award(won_player.clone(), winning.amount);
                info!(
                    code = %self.code,
                    player_index,
                    winner = %captain.name,
                    amount = winning.amount,
                    "round settled"
                );
            } else {
                warn!(
                    code = %self.code,
                    captain_id = %winning.captain_id,
                    "winning bid has no matching captain"
                );
            }

            RoundSettled {
                bids,
                winner: winner_entry,
                captains: self.captains.clone(),
                completed_player_index: player_index,
                player: self.players[player_index].clone(),
            }
        } else {
            info!(code = %self.code, player_index, "round settled with no bids");
            RoundSettled {
                bids: Vec::new(),
                winner: None,
                captains: self.captains.clone(),
                completed_player_index: player_index,
                player: self.players[player_index].clone(),
            }
        };

        self.completed.insert(player_index);
        self.state = RoomState::Waiting;

        Ok(vec![Envelope::broadcast(Event::RoundSettled(settled))])
    }

    // -- auxiliary actions ---------------------------------------------------

    fn reset_budgets(&mut self, origin: &str) -> Result<Vec<Envelope>, RoomError> {
        self.require_auctioneer(origin, "resetBudgets")?;
        for captain in &mut self.captains {
            captain.remaining_budget = captain.budget;
        }
        info!(code = %self.code, "budgets reset");
        Ok(vec![Envelope::broadcast(Event::CaptainRosterChanged {
            captains: self.captains.clone(),
        })])
    }

    fn update_players(
        &mut self,
        origin: &str,
        players: Vec<Player>,
    ) -> Result<Vec<Envelope>, RoomError> {
        self.require_auctioneer(origin, "updatePlayers")?;
        let before_first_round = self.round.is_none()
            && self.completed.is_empty()
            && matches!(self.state, RoomState::Setup | RoomState::Waiting);
        if !before_first_round {
            return Err(RoomError::InvalidState {
                reason: "player list can only be replaced before the auction starts".into(),
            });
        }

        // Caps are intentionally left as computed at creation.
        self.players = players;
        info!(code = %self.code, players = self.players.len(), "player list replaced");
        Ok(vec![Envelope::broadcast(Event::PlayersUpdated {
            players: self.players.clone(),
        })])
    }

    fn disconnect(&mut self, origin: &str) -> Result<Vec<Envelope>, RoomError> {
        if self.auctioneer.as_deref() == Some(origin) {
            self.auctioneer = None;
            info!(code = %self.code, "auctioneer disconnected");
            return Ok(vec![]);
        }

        if let Some(captain) = self.captains.iter_mut().find(|c| c.id == origin) {
            captain.connected = false;
            info!(code = %self.code, captain = %captain.name, "captain disconnected");
            return Ok(vec![Envelope::broadcast(Event::CaptainRosterChanged {
                captains: self.captains.clone(),
            })]);
        }

        // Unknown connections come and go; nothing to record.
        Ok(vec![])
    }

    fn close_room(&mut self, origin: &str) -> Result<Vec<Envelope>, RoomError> {
        self.require_auctioneer(origin, "closeRoom")?;
        if self.round.is_some() {
            return Err(RoomError::InvalidState {
                reason: "cannot close the room while a round is open".into(),
            });
        }
        self.closed = true;
        info!(code = %self.code, "room closed");
        Ok(vec![Envelope::broadcast(Event::RoomClosed {
            code: self.code.clone(),
        })])
    }

    // -- helpers -------------------------------------------------------------

    fn require_auctioneer(&self, origin: &str, action: &str) -> Result<(), RoomError> {
        if self.auctioneer.as_deref() == Some(origin) {
            Ok(())
        } else {
            Err(RoomError::Unauthorized {
                action: action.into(),
            })
        }
    }

    fn revealed_bids(&self, ledger: &BidLedger) -> Vec<RevealedBid> {
        ledger
            .entries()
            .iter()
            .filter_map(|bid| {
                let captain = self.captains.iter().find(|c| c.id == bid.captain_id)?;
                Some(RevealedBid::from_bid(bid, captain))
            })
            .collect()
    }

    fn usage_snapshot(&self) -> Vec<CaptainUsage> {
        self.captains
            .iter()
            .map(|captain| CaptainUsage {
                captain_id: captain.id.clone(),
                usage: caps::captain_usage(captain, &self.caps),
            })
            .collect()
    }

    /// Full snapshot of the room, the payload for a joining connection.
    pub fn snapshot(&self) -> RoomSnapshot {
        let mut completed: Vec<usize> = self.completed.iter().copied().collect();
        completed.sort_unstable();
        RoomSnapshot {
            code: self.code.clone(),
            captains: self.captains.clone(),
            players: self.players.clone(),
            state: self.state,
            current_player_index: self.round.as_ref().map(|r| r.player_index),
            completed_players: completed,
            caps: self.caps.clone(),
            remaining_pool_counts: caps::remaining_pool_counts(
                &self.players,
                &self.completed,
                self.round.as_ref().map(|r| r.player_index),
            ),
            captain_usage: self.usage_snapshot(),
            settings: self.settings.clone(),
        }
    }
}

/// Build the partially-masked player view for a round opening.
fn build_preview(player: &Player, efficiency_key: &str) -> PlayerPreview {
    let mut stats = Map::new();
    let mut visible = vec![
        "combat".to_string(),
        "total".to_string(),
        efficiency_key.to_string(),
    ];

    for key in ["combat", "total", efficiency_key] {
        if let Some(value) = player.stats.get(key) {
            stats.insert(key.to_string(), value.clone());
        }
    }

    // Boss kills are always fully visible.
    if let Some(Value::Object(bosses)) = player.stats.get("bosses") {
        visible.extend(bosses.keys().map(|boss| format!("boss_{boss}")));
        stats.insert("bosses".into(), Value::Object(bosses.clone()));
    }

    PlayerPreview {
        id: player.id.clone(),
        name: player.name.clone(),
        pool: player.pool.clone(),
        stats,
        visible_stats: visible,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
