//! The betting state machine: validates and applies player actions, detects
//! settled streets, and drives street transitions.

use crate::game::error::{GameError, GameResult};
use crate::game::runtime::{Street, TableRuntime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerAction {
    Fold,
    Check,
    Call,
    /// Raise *to* the given total street bet, not by an increment.
    Raise(i64),
}

/// What the engine must do after an action has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The street continues; the turn moved to the next seat.
    TurnAdvanced,
    /// The street settled; pending board cards were drawn and the reveal
    /// pacing owns the table until they are out.
    StreetAdvanced { auto_runout: bool },
    /// Everyone else folded; the pot has been paid to the winner's stack.
    WinnerByFold { winner_seat: usize, payout: i64 },
    /// The river settled (or the runout finished); the caller resolves the
    /// showdown with the hole cards it holds.
    ShowdownReached,
}

impl TableRuntime {
    /// Validates and applies one action for the seat that holds the turn,
    /// then runs the post-action transitions. `timeout` marks a
    /// clock-forced action and feeds the away policy.
    pub fn apply_action(
        &mut self,
        seat_no: usize,
        action: PlayerAction,
        timeout: bool,
    ) -> GameResult<ApplyOutcome> {
        if self.is_dealing_board {
            return Err(GameError::DealingBoard);
        }
        let seat = self.seat(seat_no).ok_or(GameError::NotSeated)?;
        if seat.has_folded {
            return Err(GameError::AlreadyFolded);
        }
        if self.current_turn_seat != Some(seat_no) {
            return Err(GameError::NotYourTurn);
        }

        match action {
            PlayerAction::Fold => self.apply_fold(seat_no),
            PlayerAction::Check => self.apply_check(seat_no)?,
            PlayerAction::Call => self.apply_call(seat_no),
            PlayerAction::Raise(raise_to) => self.apply_raise(seat_no, raise_to)?,
        }

        let seat = self.seat_mut(seat_no).expect("seat validated above");
        if timeout {
            seat.timeouts_in_row += 1;
        } else {
            seat.timeouts_in_row = 0;
        }
        self.acted_this_round.insert(seat_no);

        Ok(self.progress())
    }

    fn apply_fold(&mut self, seat_no: usize) {
        let seat = self.seat_mut(seat_no).expect("seat exists");
        seat.has_folded = true;
        seat.is_all_in = false;
    }

    fn apply_check(&mut self, seat_no: usize) -> GameResult<()> {
        let seat = self.seat(seat_no).expect("seat exists");
        let to_call = (self.current_bet - seat.bet).max(0);
        if to_call > 0 {
            return Err(GameError::CannotCheck { to_call });
        }
        Ok(())
    }

    fn apply_call(&mut self, seat_no: usize) {
        let current_bet = self.current_bet;
        let seat = self.seat_mut(seat_no).expect("seat exists");
        let to_call = (current_bet - seat.bet).max(0);
        let paid = seat.place_bet(to_call);
        self.pot_total += paid;
    }

    fn apply_raise(&mut self, seat_no: usize, raise_to: i64) -> GameResult<()> {
        let seat = self.seat(seat_no).expect("seat exists");
        if seat.stack == 0 {
            return Err(GameError::InsufficientStack);
        }
        if raise_to <= 0 {
            return Err(GameError::InvalidAmount);
        }

        // A seat that cannot afford the target is clamped to all-in; that
        // stays a raise only while it still exceeds the table bet.
        let all_in_to = seat.bet + seat.stack;
        let raise_to = raise_to.min(all_in_to);
        if raise_to <= self.current_bet || raise_to <= seat.bet {
            return Err(GameError::InvalidRaise);
        }

        // Minimum full-raise target. A pure all-in below it is a legal short
        // raise (TDA); anything else is rejected.
        let min_to = if self.current_bet == 0 {
            self.min_raise
        } else {
            self.current_bet + self.min_raise
        };
        let is_all_in = raise_to == all_in_to;
        if raise_to < min_to && !is_all_in {
            return Err(GameError::RaiseTooSmall {
                min_to,
                attempted: raise_to,
            });
        }

        let full_raise = raise_to >= min_to;
        let need = raise_to - seat.bet;
        let seat = self.seat_mut(seat_no).expect("seat exists");
        let paid = seat.place_bet(need);
        self.pot_total += paid;

        if full_raise {
            // A full raise re-opens the action for everyone behind.
            self.min_raise = raise_to - self.current_bet;
            self.acted_this_round.clear();
        }
        // A short all-in does not re-open action for seats that already
        // acted: the acted set is left alone.
        self.current_bet = raise_to;
        self.last_aggressor_seat = Some(seat_no);
        Ok(())
    }

    /// Post-action transitions: winner-by-fold, street advance, showdown,
    /// or plain turn rotation. Also used by the engine right after a hand
    /// opens, in case blinds already settled the preflop street.
    pub fn progress(&mut self) -> ApplyOutcome {
        if let Some((winner_seat, payout)) = self.settle_if_single_contender() {
            return ApplyOutcome::WinnerByFold {
                winner_seat,
                payout,
            };
        }

        if self.is_round_settled() {
            return self.advance_street();
        }

        let from = self.current_turn_seat.unwrap_or(self.dealer_seat);
        self.current_turn_seat = self.next_acting_seat(from);
        // The deadline belongs to the engine: it arms the clock with its
        // configured turn time after persisting.
        self.turn_ends_at = None;
        ApplyOutcome::TurnAdvanced
    }

    /// Advances one street: resets per-street betting state, draws the next
    /// board cards into the pending buffer, and flags auto-runout when no
    /// meaningful betting remains. Also called directly by the pacing
    /// orchestrator while the hand runs itself out.
    pub fn advance_street(&mut self) -> ApplyOutcome {
        for seat in self.players.values_mut() {
            seat.bet = 0;
        }
        self.current_bet = 0;
        self.min_raise = self.big_blind;
        self.last_aggressor_seat = None;
        self.acted_this_round.clear();
        self.round = self.round.next();

        if self.round == Street::Showdown {
            self.pot_total = self.committed_total();
            self.current_turn_seat = None;
            self.turn_ends_at = None;
            self.is_dealing_board = false;
            return ApplyOutcome::ShowdownReached;
        }

        let (drawn, rest) = self.deck.draw(self.round.cards_to_deal());
        self.pending_board = drawn;
        self.deck = rest;
        self.is_dealing_board = true;
        self.turn_ends_at = None;
        self.auto_runout = self.should_auto_runout();
        self.current_turn_seat = if self.auto_runout {
            None
        } else {
            self.first_to_act_postflop()
        };
        ApplyOutcome::StreetAdvanced {
            auto_runout: self.auto_runout,
        }
    }

    /// Default action when the turn clock fires: check when checking is
    /// free, fold otherwise.
    pub fn default_action(&self, seat_no: usize) -> PlayerAction {
        let to_call = self
            .seat(seat_no)
            .map(|s| (self.current_bet - s.bet).max(0))
            .unwrap_or(0);
        if to_call == 0 {
            PlayerAction::Check
        } else {
            PlayerAction::Fold
        }
    }
}
