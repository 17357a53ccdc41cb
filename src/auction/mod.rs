// Auction room engine: caps, captains, sealed bids, and the room state machine.

pub mod caps;
pub mod captain;
pub mod ledger;
pub mod room;

pub use room::{AuctionRoom, RoomError, RoomState};
