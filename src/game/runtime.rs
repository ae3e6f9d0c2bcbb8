use crate::game::deck::{Card, Deck};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Street {
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
}

impl Street {
    /// Number of board cards drawn when entering this street.
    pub fn cards_to_deal(self) -> usize {
        match self {
            Street::Flop => 3,
            Street::Turn | Street::River => 1,
            Street::Preflop | Street::Showdown => 0,
        }
    }

    pub fn next(self) -> Street {
        match self {
            Street::Preflop => Street::Flop,
            Street::Flop => Street::Turn,
            Street::Turn => Street::River,
            Street::River | Street::Showdown => Street::Showdown,
        }
    }
}

/// Per-seat state during a hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatRuntime {
    pub seat_no: usize,
    pub user_id: String,
    pub username: String,
    /// Chips behind, not in front of the line.
    pub stack: i64,
    /// Chips committed to the current street only.
    pub bet: i64,
    /// Total chips committed across all streets this hand.
    pub committed: i64,
    pub has_folded: bool,
    pub is_all_in: bool,
    pub is_sitting_out: bool,
    /// Consecutive forced-timeout actions.
    pub timeouts_in_row: u32,
}

impl SeatRuntime {
    pub fn new(seat_no: usize, user_id: String, username: String, stack: i64) -> Self {
        Self {
            seat_no,
            user_id,
            username,
            stack,
            bet: 0,
            committed: 0,
            has_folded: false,
            is_all_in: false,
            is_sitting_out: false,
            timeouts_in_row: 0,
        }
    }

    /// Moves chips over the line, clamped to the stack. Pairs the stack
    /// decrement with equal increments of `bet` and `committed`; the caller
    /// adds the returned amount to the pot.
    pub fn place_bet(&mut self, amount: i64) -> i64 {
        let paid = amount.min(self.stack).max(0);
        self.stack -= paid;
        self.bet += paid;
        self.committed += paid;
        if self.stack == 0 && !self.has_folded {
            self.is_all_in = true;
        }
        paid
    }

    /// Still in contention for the pot.
    pub fn is_contender(&self) -> bool {
        !self.has_folded
    }

    /// Owes decisions: in contention with chips behind. Sitting-out seats
    /// still take the turn but are auto-acted by the engine, so they count
    /// here for turn rotation.
    pub fn can_act(&self) -> bool {
        self.is_contender() && !self.is_all_in && self.stack > 0
    }

    /// Actionable per the turn-clock rules: a live decision the clock should
    /// wait on. Sitting-out seats are excluded — their default action is
    /// forced immediately rather than timed.
    pub fn is_actionable(&self) -> bool {
        self.can_act() && !self.is_sitting_out
    }
}

/// The per-table state of one hand. This blob, serialized to the KV store,
/// is the source of truth for the hand; in-process timers are rebuilt from
/// it after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRuntime {
    pub hand_id: String,
    pub round: Street,
    pub dealer_seat: usize,
    pub current_turn_seat: Option<usize>,
    /// Wall-clock deadline (ms since epoch); None while dealing or in
    /// auto-runout.
    pub turn_ends_at: Option<i64>,
    /// Remaining undealt cards, ordered.
    pub deck: Deck,
    /// Community cards revealed so far (0, 3, 4, or 5).
    pub board: Vec<Card>,
    /// Cards drawn for the upcoming street, not yet revealed.
    pub pending_board: Vec<Card>,
    pub is_dealing_board: bool,
    /// No meaningful betting remains; streets deal themselves.
    pub auto_runout: bool,
    pub pot_total: i64,
    pub current_bet: i64,
    pub min_raise: i64,
    pub last_aggressor_seat: Option<usize>,
    pub acted_this_round: BTreeSet<usize>,
    pub players: BTreeMap<usize, SeatRuntime>,
    // Table config snapshotted at hand start so the engine never re-reads
    // it mid-hand.
    pub small_blind: i64,
    pub big_blind: i64,
    pub max_seats: usize,
}

impl TableRuntime {
    pub fn seat(&self, seat_no: usize) -> Option<&SeatRuntime> {
        self.players.get(&seat_no)
    }

    pub fn seat_mut(&mut self, seat_no: usize) -> Option<&mut SeatRuntime> {
        self.players.get_mut(&seat_no)
    }

    pub fn seat_of_user(&self, user_id: &str) -> Option<&SeatRuntime> {
        self.players.values().find(|s| s.user_id == user_id)
    }

    pub fn contenders(&self) -> impl Iterator<Item = &SeatRuntime> {
        self.players.values().filter(|s| s.is_contender())
    }

    pub fn contender_count(&self) -> usize {
        self.contenders().count()
    }

    /// Next occupied seat clockwise after `seat_no` matching `pred`,
    /// wrapping over the table size. Returns None when nothing matches.
    pub fn next_seat_where<F>(&self, after: usize, mut pred: F) -> Option<usize>
    where
        F: FnMut(&SeatRuntime) -> bool,
    {
        if self.max_seats == 0 {
            return None;
        }
        for offset in 1..=self.max_seats {
            let seat_no = (after - 1 + offset) % self.max_seats + 1;
            if let Some(seat) = self.players.get(&seat_no) {
                if pred(seat) {
                    return Some(seat_no);
                }
            }
        }
        None
    }

    /// Next seat owing a decision, clockwise after `after`. Includes
    /// sitting-out contenders — the engine auto-acts them on arrival.
    pub fn next_acting_seat(&self, after: usize) -> Option<usize> {
        self.next_seat_where(after, |s| s.can_act())
    }

    /// First actor on a postflop street. Ring games open with the first
    /// seat that can act clockwise from the dealer; heads-up the button is
    /// the small blind and leads every postflop street itself.
    pub fn first_to_act_postflop(&self) -> Option<usize> {
        if self.players.len() == crate::config::HEADS_UP_PLAYER_COUNT {
            if let Some(dealer) = self.players.get(&self.dealer_seat) {
                if dealer.can_act() {
                    return Some(self.dealer_seat);
                }
            }
        }
        self.next_acting_seat(self.dealer_seat)
    }

    /// Clockwise distance from the seat at the dealer's left, used for the
    /// odd-chip rule. Wraps over the table size, never a hard-coded constant.
    pub fn distance_from_dealer_left(&self, seat_no: usize) -> usize {
        (seat_no + self.max_seats - self.dealer_seat - 1) % self.max_seats
    }

    /// The current street has no further decisions owed.
    pub fn is_round_settled(&self) -> bool {
        let contenders: Vec<&SeatRuntime> = self.contenders().collect();
        if contenders.len() <= 1 {
            return true;
        }

        // No contender can still act: everyone remaining is all-in.
        if !contenders.iter().any(|s| s.can_act()) {
            return true;
        }

        let all_acted = contenders.iter().all(|s| {
            s.is_all_in || s.stack == 0 || self.acted_this_round.contains(&s.seat_no)
        });

        if self.current_bet == 0 {
            all_acted
        } else {
            all_acted
                && contenders
                    .iter()
                    .all(|s| s.bet == self.current_bet || s.is_all_in || s.stack == 0)
        }
    }

    /// No meaningful betting remains: at least two contenders, at least one
    /// all-in, and at most one who could still act. Guarantees the board is
    /// never auto-dealt while a non-all-in player still owes a decision.
    pub fn should_auto_runout(&self) -> bool {
        let contenders: Vec<&SeatRuntime> = self.contenders().collect();
        contenders.len() >= 2
            && contenders.iter().any(|s| s.is_all_in)
            && contenders.iter().filter(|s| s.can_act()).count() <= 1
    }

    /// If a single contender remains, pays them the pot and ends the hand.
    /// Returns (winner seat, payout).
    pub fn settle_if_single_contender(&mut self) -> Option<(usize, i64)> {
        let winner = {
            let mut it = self.contenders();
            let first = it.next()?.seat_no;
            if it.next().is_some() {
                return None;
            }
            first
        };
        let payout = self.pot_total;
        if let Some(seat) = self.players.get_mut(&winner) {
            seat.stack += payout;
        }
        self.current_turn_seat = None;
        self.turn_ends_at = None;
        Some((winner, payout))
    }

    /// Recomputed pot from committed contributions; must always equal
    /// `pot_total`.
    pub fn committed_total(&self) -> i64 {
        self.players.values().map(|s| s.committed).sum()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    pub(crate) fn seat(seat_no: usize, stack: i64) -> SeatRuntime {
        SeatRuntime::new(
            seat_no,
            format!("user{}", seat_no),
            format!("Player {}", seat_no),
            stack,
        )
    }

    pub(crate) fn runtime_with_seats(seats: Vec<SeatRuntime>) -> TableRuntime {
        let players: BTreeMap<usize, SeatRuntime> =
            seats.into_iter().map(|s| (s.seat_no, s)).collect();
        TableRuntime {
            hand_id: "hand-test".to_string(),
            round: Street::Preflop,
            dealer_seat: 1,
            current_turn_seat: None,
            turn_ends_at: None,
            deck: Deck::new(),
            board: vec![],
            pending_board: vec![],
            is_dealing_board: false,
            auto_runout: false,
            pot_total: 0,
            current_bet: 0,
            min_raise: 10,
            last_aggressor_seat: None,
            acted_this_round: BTreeSet::new(),
            players,
            small_blind: 5,
            big_blind: 10,
            max_seats: 6,
        }
    }
}
