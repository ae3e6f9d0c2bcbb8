//! Observable engine output: the public snapshot, lifecycle events, and the
//! narrow broadcast port the transport implements.
//!
//! The snapshot is the only game state clients ever see. The deck, the
//! pending board, and hole cards are structurally absent from these types,
//! so a serialization bug cannot leak them.

use crate::game::deck::Card;
use crate::game::runtime::{Street, TableRuntime};
use crate::game::showdown::ShowdownReveal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatUser {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatView {
    pub seat_no: usize,
    /// None for an empty seat.
    pub user: Option<SeatUser>,
    pub stack: i64,
    pub bet: i64,
    pub has_folded: bool,
    pub is_all_in: bool,
    pub is_dealer: bool,
    pub is_turn: bool,
    pub is_sitting_out: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub hand_id: String,
    pub round: Street,
    pub board: Vec<Card>,
    pub pot_total: i64,
    pub current_bet: i64,
    pub min_raise: i64,
    pub turn_ends_at: Option<i64>,
    pub is_dealing_board: bool,
    pub auto_runout: bool,
}

impl GameView {
    pub fn from_runtime(rt: &TableRuntime) -> Self {
        Self {
            hand_id: rt.hand_id.clone(),
            round: rt.round,
            board: rt.board.clone(),
            pot_total: rt.pot_total,
            current_bet: rt.current_bet,
            min_raise: rt.min_raise,
            turn_ends_at: rt.turn_ends_at,
            is_dealing_board: rt.is_dealing_board,
            auto_runout: rt.auto_runout,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub table_id: String,
    pub name: String,
    pub small_blind: i64,
    pub big_blind: i64,
    pub max_seats: usize,
    pub status: String,
    pub seats: Vec<SeatView>,
    pub game: Option<GameView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandEndReason {
    WinnerByFold,
    Showdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandWinner {
    pub seat_no: usize,
    pub user_id: String,
    pub payout: i64,
}

/// Events fanned out to a table room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TableEvent {
    #[serde(rename = "STATE_SNAPSHOT")]
    #[serde(rename_all = "camelCase")]
    StateSnapshot { state: TableSnapshot },
    #[serde(rename = "HAND_STARTED")]
    #[serde(rename_all = "camelCase")]
    HandStarted { table_id: String, hand_id: String },
    #[serde(rename = "SHOWDOWN_REVEAL")]
    #[serde(rename_all = "camelCase")]
    ShowdownReveal {
        table_id: String,
        hand_id: String,
        reveals: Vec<ShowdownReveal>,
    },
    #[serde(rename = "HAND_ENDED")]
    #[serde(rename_all = "camelCase")]
    HandEnded {
        table_id: String,
        hand_id: String,
        reason: HandEndReason,
        winners: Vec<HandWinner>,
    },
    #[serde(rename = "LEAVE_PENDING")]
    #[serde(rename_all = "camelCase")]
    LeavePending { table_id: String },
    #[serde(rename = "ERROR")]
    #[serde(rename_all = "camelCase")]
    Error { code: String, message: String },
}

/// Hole cards for one player, delivered to their private room only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateCards {
    pub table_id: String,
    pub hand_id: String,
    pub cards: [Card; 2],
}

/// The engine's only view of the transport: one function to reach a table
/// room, one to reach a user's private room. The engine never imports the
/// WebSocket layer.
pub trait Broadcaster: Send + Sync {
    fn table_event(&self, table_id: &str, event: TableEvent);
    fn private_cards(&self, user_id: &str, cards: PrivateCards);
}

/// No-op broadcaster for tests that only exercise state transitions.
pub struct NullBroadcaster;

impl Broadcaster for NullBroadcaster {
    fn table_event(&self, _table_id: &str, _event: TableEvent) {}
    fn private_cards(&self, _user_id: &str, _cards: PrivateCards) {}
}
