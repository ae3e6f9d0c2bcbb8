//! Typed errors for the hand engine.
//!
//! Every variant maps to a stable wire code via [`GameError::code`]; the
//! gateway forwards that code to the offending socket and nothing else.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    // Validation
    InvalidAmount,
    InvalidRaise,
    RaiseTooSmall { min_to: i64, attempted: i64 },
    CannotCheck { to_call: i64 },
    BuyinTooSmall { min: i64 },
    BuyinTooLarge { max: i64 },
    RebuyExceedsMax { max: i64 },

    // State
    NotYourTurn,
    AlreadyFolded,
    DealingBoard,
    NoHandRunning,
    HandInProgress,

    // Resource
    TableNotFound,
    SeatNotFound,
    SeatTaken { seat_no: usize },
    AlreadySeated,
    NotSeated,
    WalletNotFound,
    InsufficientFunds { required: i64, available: i64 },
    InsufficientStack,
}

impl GameError {
    /// Stable code surfaced in `ERROR` events.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidAmount => "INVALID_AMOUNT",
            GameError::InvalidRaise => "INVALID_RAISE",
            GameError::RaiseTooSmall { .. } => "RAISE_TOO_SMALL",
            GameError::CannotCheck { .. } => "CANNOT_CHECK",
            GameError::BuyinTooSmall { .. } => "BUYIN_TOO_SMALL",
            GameError::BuyinTooLarge { .. } => "BUYIN_TOO_LARGE",
            GameError::RebuyExceedsMax { .. } => "REBUY_EXCEEDS_MAX",
            GameError::NotYourTurn => "NOT_YOUR_TURN",
            GameError::AlreadyFolded => "ALREADY_FOLDED",
            GameError::DealingBoard => "DEALING_BOARD",
            GameError::NoHandRunning => "NO_HAND_RUNNING",
            GameError::HandInProgress => "HAND_IN_PROGRESS",
            GameError::TableNotFound => "TABLE_NOT_FOUND",
            GameError::SeatNotFound => "SEAT_NOT_FOUND",
            GameError::SeatTaken { .. } => "SEAT_TAKEN",
            GameError::AlreadySeated => "ALREADY_SEATED",
            GameError::NotSeated => "NOT_SEATED",
            GameError::WalletNotFound => "WALLET_NOT_FOUND",
            GameError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            GameError::InsufficientStack => "INSUFFICIENT_STACK",
        }
    }
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameError::InvalidAmount => write!(f, "Invalid amount"),
            GameError::InvalidRaise => write!(f, "Invalid raise"),
            GameError::RaiseTooSmall { min_to, attempted } => {
                write!(
                    f,
                    "Raise to {} is too small. Minimum raise target: {}",
                    attempted, min_to
                )
            }
            GameError::CannotCheck { to_call } => {
                write!(f, "Cannot check, must call {} or raise", to_call)
            }
            GameError::BuyinTooSmall { min } => write!(f, "Buy-in below table minimum {}", min),
            GameError::BuyinTooLarge { max } => write!(f, "Buy-in above table maximum {}", max),
            GameError::RebuyExceedsMax { max } => {
                write!(f, "Rebuy would exceed the table maximum of {}", max)
            }
            GameError::NotYourTurn => write!(f, "Not your turn"),
            GameError::AlreadyFolded => write!(f, "You have already folded"),
            GameError::DealingBoard => write!(f, "Board cards are being dealt"),
            GameError::NoHandRunning => write!(f, "No hand is running"),
            GameError::HandInProgress => write!(f, "A hand is in progress"),
            GameError::TableNotFound => write!(f, "Table not found"),
            GameError::SeatNotFound => write!(f, "Seat not found"),
            GameError::SeatTaken { seat_no } => write!(f, "Seat {} is already taken", seat_no),
            GameError::AlreadySeated => write!(f, "You are already seated at this table"),
            GameError::NotSeated => write!(f, "You are not seated at this table"),
            GameError::WalletNotFound => write!(f, "Wallet not found"),
            GameError::InsufficientFunds {
                required,
                available,
            } => write!(
                f,
                "Insufficient funds. Required: {}, Available: {}",
                required, available
            ),
            GameError::InsufficientStack => write!(f, "Insufficient stack"),
        }
    }
}

impl std::error::Error for GameError {}

pub type GameResult<T> = Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GameError::RaiseTooSmall {
            min_to: 100,
            attempted: 50,
        };
        assert_eq!(
            err.to_string(),
            "Raise to 50 is too small. Minimum raise target: 100"
        );
        assert_eq!(err.code(), "RAISE_TOO_SMALL");
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(GameError::NotYourTurn.code(), "NOT_YOUR_TURN");
        assert_eq!(GameError::DealingBoard.code(), "DEALING_BOARD");
        assert_eq!(GameError::NoHandRunning.code(), "NO_HAND_RUNNING");
    }
}
