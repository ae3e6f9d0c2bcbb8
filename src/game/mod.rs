pub mod betting;
pub mod deck;
pub mod error;
pub mod eval;
pub mod lifecycle;
pub mod runtime;
pub mod showdown;

pub use betting::{ApplyOutcome, PlayerAction};
pub use deck::{Card, Deck};
pub use error::{GameError, GameResult};
pub use eval::{evaluate_seven, HandValue};
pub use lifecycle::{open_hand, HandConfig, HandSeat, OpenedHand};
pub use runtime::{SeatRuntime, Street, TableRuntime};
pub use showdown::{resolve_showdown, ShowdownResult, ShowdownReveal, ShowdownWinner};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the UNIX epoch.
/// Returns 0 on system clock error (should never happen in practice).
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_else(|e| {
            tracing::error!("System clock error: {}", e);
            0
        })
}
