// Process-wide room store: creation, lookup, and the per-room worker tasks.
//
// Every room is owned by exactly one tokio task that drains a bounded command
// queue, so all mutations of a room are serialized while different rooms run
// fully in parallel. The registry itself only guards the code→handle map and
// never holds its lock across an await.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};

use crate::auction::room::{AuctionRoom, RoomError, RoomSettings};
use crate::config::AuctionConfig;
use crate::players::Player;
use crate::protocol::{Action, ConnId, CreateRoomRequest, Envelope};

/// Alphabet for room codes: uppercase letters and digits.
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ROOM_CODE_LEN: usize = 6;

/// Per-room action queue depth. Actions are cheap in-memory transitions, so a
/// small bound is enough; senders briefly back-pressure under burst.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// One queued action for a room worker: who sent it, what it is, and where
/// the private result goes.
struct RoomCommand {
    origin: ConnId,
    action: Action,
    reply: oneshot::Sender<Result<(), RoomError>>,
}

struct RoomHandle {
    commands: mpsc::Sender<RoomCommand>,
}

/// Map from room code to live room, plus the RNG that seeds codes and rooms.
pub struct RoomRegistry {
    config: AuctionConfig,
    rooms: Mutex<HashMap<String, RoomHandle>>,
    rng: Mutex<StdRng>,
}

impl RoomRegistry {
    pub fn new(config: AuctionConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic registry for tests: room codes, masking choices, and
    /// tie-breaks all derive from this seed.
    pub fn with_seed(config: AuctionConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: AuctionConfig, rng: StdRng) -> Self {
        RoomRegistry {
            config,
            rooms: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Create a room over the given player pool and spawn its worker.
    ///
    /// Request fields omitted by the caller fall back to the configured
    /// defaults. Events flow to `events`; the caller (transport layer) fans
    /// them out to connections.
    pub async fn create_room(
        &self,
        request: CreateRoomRequest,
        players: Vec<Player>,
        events: mpsc::Sender<Envelope>,
    ) -> Result<String, RoomError> {
        let team_count = request.team_count.unwrap_or(self.config.team_count);
        if team_count == 0 {
            return Err(RoomError::InvalidInput {
                reason: "team count must be at least 1".into(),
            });
        }
        let initial_budget = request.initial_budget.unwrap_or(self.config.initial_budget);
        if initial_budget == 0 {
            return Err(RoomError::InvalidInput {
                reason: "initial budget must be greater than 0".into(),
            });
        }
        let settings = RoomSettings {
            initial_budget,
            max_players_per_round: request
                .max_players_per_round
                .unwrap_or(self.config.max_players_per_round),
        };

        let room_seed = {
            let mut rng = self.rng.lock().await;
            rng.gen::<u64>()
        };

        let mut rooms = self.rooms.lock().await;
        let code = loop {
            let candidate = {
                let mut rng = self.rng.lock().await;
                generate_room_code(&mut *rng)
            };
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let room = AuctionRoom::new(
            code.clone(),
            players,
            team_count,
            settings,
            StdRng::seed_from_u64(room_seed),
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        tokio::spawn(room_worker(room, command_rx, events));
        rooms.insert(
            code.clone(),
            RoomHandle {
                commands: command_tx,
            },
        );
        info!(code = %code, team_count, "room registered");

        Ok(code)
    }

    /// Route an action to the addressed room and wait for its result.
    ///
    /// The queue order is the serialization: whichever of two racing actions
    /// is enqueued first wins, and the loser sees the post-transition state.
    pub async fn dispatch(
        &self,
        code: &str,
        origin: &str,
        action: Action,
    ) -> Result<(), RoomError> {
        let sender = {
            let rooms = self.rooms.lock().await;
            rooms.get(code).map(|handle| handle.commands.clone())
        }
        .ok_or_else(|| RoomError::NotFound { code: code.into() })?;

        let closing = matches!(action, Action::CloseRoom);
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(RoomCommand {
                origin: origin.to_string(),
                action,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::NotFound { code: code.into() })?;

        let result = reply_rx
            .await
            .map_err(|_| RoomError::NotFound { code: code.into() })?;

        if closing && result.is_ok() {
            self.rooms.lock().await.remove(code);
            info!(code = %code, "room removed from registry");
        }

        result
    }

    /// Whether a room with this code is live.
    pub async fn contains(&self, code: &str) -> bool {
        self.rooms.lock().await.contains_key(code)
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }
}

/// The single logical owner of one room's state. Processes queued actions one
/// at a time; nothing inside a transition ever awaits, so the room never
/// stalls mid-mutation.
async fn room_worker(
    mut room: AuctionRoom,
    mut commands: mpsc::Receiver<RoomCommand>,
    events: mpsc::Sender<Envelope>,
) {
    while let Some(command) = commands.recv().await {
        match room.apply(&command.origin, command.action) {
            Ok(envelopes) => {
                // Reply first: the caller's result does not wait on event
                // consumers.
                let _ = command.reply.send(Ok(()));
                for envelope in envelopes {
                    if events.send(envelope).await.is_err() {
                        warn!(code = %room.code(), "event consumer dropped");
                        break;
                    }
                }
            }
            Err(error) => {
                let _ = command.reply.send(Err(error));
            }
        }
        if room.is_closed() {
            break;
        }
    }
    info!(code = %room.code(), "room worker stopped");
}

fn generate_room_code<R: Rng>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| {
            let index = rng.gen_range(0..ROOM_CODE_ALPHABET.len());
            ROOM_CODE_ALPHABET[index] as char
        })
        .collect()
}
