//! The per-table hand engine.
//!
//! One `TableEngine` serves every table of the process. Canonical hand state
//! lives in the KV runtime blob; the relational store carries wallets and
//! seats; the in-memory maps here (serializer locks, timers, strike
//! counters, pending departures, reveal flags) are node-local.
//!
//! Single-writer rule: every mutation of a table's runtime happens under
//! that table's async mutex, so one apply always observes the effects of the
//! previous one. Different tables proceed in parallel.

mod clock;
mod events;
mod pacing;
mod recovery;

pub use clock::{TimerKey, TurnClock};
pub use events::{
    Broadcaster, GameView, HandEndReason, HandWinner, NullBroadcaster, PrivateCards, SeatUser,
    SeatView, TableEvent, TableSnapshot,
};

use crate::config::{TimingConfig, MAX_BUYIN_BB, MIN_BUYIN_BB, MIN_PLAYERS_TO_START};
use crate::db::{tables as table_repo, DbPool};
use crate::game::betting::{ApplyOutcome, PlayerAction};
use crate::game::error::GameError;
use crate::game::lifecycle::{open_hand, HandConfig, HandSeat};
use crate::game::now_ms;
use crate::game::runtime::TableRuntime;
use crate::game::showdown::resolve_showdown;
use crate::kv::KvStore;
use crate::store::{RuntimeStore, StoreError};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug)]
pub enum EngineError {
    Game(GameError),
    Store(StoreError),
    Db(sqlx::Error),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Game(e) => write!(f, "{}", e),
            EngineError::Store(e) => write!(f, "{}", e),
            EngineError::Db(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<GameError> for EngineError {
    fn from(e: GameError) -> Self {
        EngineError::Game(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Db(e)
    }
}

impl EngineError {
    /// Wire code for `ERROR` events. Infrastructure failures collapse to a
    /// single opaque code; their detail stays in the logs.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Game(e) => e.code(),
            EngineError::Store(_) | EngineError::Db(_) => "INTERNAL",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepartureKind {
    /// Voluntary leave deferred past the end of the street or hand.
    Leave,
    /// Away policy: too many consecutive timeouts.
    Kick,
}

#[derive(Debug, Clone)]
struct Departure {
    user_id: String,
    kind: DepartureKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    CashedOut(i64),
    Pending,
}

/// What the caller of the shared progress path still owes the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostAction {
    /// Nothing: the turn clock is armed or the hand is over.
    Idle,
    /// Pending board cards were drawn; a reveal sequence must run.
    RevealPending,
}

enum FlushResult {
    HandEnded { winner_seat: usize, payout: i64 },
    Continue,
}

pub struct TableEngine {
    pool: DbPool,
    store: RuntimeStore,
    broadcaster: Arc<dyn Broadcaster>,
    timing: TimingConfig,
    clock: TurnClock,
    /// Per-table serializer giving single-writer semantics.
    table_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    /// Tables with a reveal sequence in flight; duplicates are dropped.
    revealing: StdMutex<HashSet<String>>,
    /// Consecutive timeout strikes per (table, user).
    strikes: StdMutex<HashMap<(String, String), u32>>,
    /// Users queued for cash-out at the next safe point.
    departures: StdMutex<HashMap<String, Vec<Departure>>>,
    /// Deck RNG; seedable so tests get deterministic shuffles.
    rng: StdMutex<ChaCha20Rng>,
}

impl TableEngine {
    pub fn new(
        pool: DbPool,
        kv: Arc<dyn KvStore>,
        broadcaster: Arc<dyn Broadcaster>,
        timing: TimingConfig,
    ) -> Arc<Self> {
        Self::with_rng(pool, kv, broadcaster, timing, ChaCha20Rng::from_entropy())
    }

    pub fn with_rng(
        pool: DbPool,
        kv: Arc<dyn KvStore>,
        broadcaster: Arc<dyn Broadcaster>,
        timing: TimingConfig,
        rng: ChaCha20Rng,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            store: RuntimeStore::new(kv),
            broadcaster,
            timing,
            clock: TurnClock::new(),
            table_locks: StdMutex::new(HashMap::new()),
            revealing: StdMutex::new(HashSet::new()),
            strikes: StdMutex::new(HashMap::new()),
            departures: StdMutex::new(HashMap::new()),
            rng: StdMutex::new(rng),
        })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub(crate) fn store(&self) -> &RuntimeStore {
        &self.store
    }

    pub(crate) fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn clock(&self) -> &TurnClock {
        &self.clock
    }

    async fn lock_table(&self, table_id: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.table_locks.lock().expect("lock map poisoned");
            locks
                .entry(table_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    // ---- Seating & table membership -------------------------------------

    /// Takes a seat with an atomic wallet debit. Enforces the buy-in bounds
    /// and the one-active-table rule: sitting here cashes the player out of
    /// any other table.
    pub async fn sit(
        self: &Arc<Self>,
        table_id: &str,
        user_id: &str,
        seat_no: usize,
        buy_in: i64,
    ) -> EngineResult<()> {
        let table = table_repo::fetch_table(&self.pool, table_id)
            .await?
            .ok_or(GameError::TableNotFound)?;

        if seat_no < 1 || seat_no > table.max_seats as usize {
            return Err(GameError::SeatNotFound.into());
        }
        let min = table.big_blind * MIN_BUYIN_BB;
        let max = table.big_blind * MAX_BUYIN_BB;
        if buy_in < min {
            return Err(GameError::BuyinTooSmall { min }.into());
        }
        if buy_in > max {
            return Err(GameError::BuyinTooLarge { max }.into());
        }

        // One active table per player: leave everywhere else first.
        let elsewhere = table_repo::seats_for_user(&self.pool, user_id).await?;
        for seat in elsewhere {
            if seat.table_id != table_id {
                if let Err(e) = self.leave(&seat.table_id, user_id).await {
                    tracing::warn!(
                        "Failed to cash user {} out of table {}: {}",
                        user_id,
                        seat.table_id,
                        e
                    );
                }
            }
        }

        table_repo::take_seat(&self.pool, table_id, seat_no, user_id, buy_in).await??;
        tracing::info!(
            "User {} sat at table {} seat {} for {}",
            user_id,
            table_id,
            seat_no,
            buy_in
        );

        self.broadcast_snapshot_fresh(table_id).await?;
        self.try_start_hand(table_id).await?;
        Ok(())
    }

    /// Leaves the table: an immediate cash-out when safe, otherwise deferred
    /// to the next safe point and acknowledged as pending.
    pub async fn leave(self: &Arc<Self>, table_id: &str, user_id: &str) -> EngineResult<LeaveOutcome> {
        let _guard = self.lock_table(table_id).await;

        let rt = self.store.load_runtime(table_id).await?;
        let in_live_hand = rt
            .as_ref()
            .and_then(|rt| rt.seat_of_user(user_id))
            .map(|s| s.is_contender())
            .unwrap_or(false);

        if in_live_hand {
            self.queue_departure(table_id, user_id, DepartureKind::Leave);
            tracing::info!(
                "User {} leave on table {} deferred to next safe point",
                user_id,
                table_id
            );
            return Ok(LeaveOutcome::Pending);
        }

        let cashed = table_repo::release_seat(&self.pool, table_id, user_id).await??;
        self.clear_strikes(table_id, user_id);
        self.broadcast_snapshot(table_id, rt.as_ref()).await?;
        Ok(LeaveOutcome::CashedOut(cashed))
    }

    /// Rebuy, only between hands or after folding; never for a live seat.
    pub async fn rebuy(self: &Arc<Self>, table_id: &str, user_id: &str, amount: i64) -> EngineResult<i64> {
        if amount <= 0 {
            return Err(GameError::InvalidAmount.into());
        }
        let table = table_repo::fetch_table(&self.pool, table_id)
            .await?
            .ok_or(GameError::TableNotFound)?;
        let _guard = self.lock_table(table_id).await;

        let mut rt = self.store.load_runtime(table_id).await?;
        if let Some(rt) = rt.as_ref() {
            if let Some(seat) = rt.seat_of_user(user_id) {
                if seat.is_contender() {
                    return Err(GameError::HandInProgress.into());
                }
            }
        }

        let max_stack = table.big_blind * MAX_BUYIN_BB;
        let new_stack =
            table_repo::rebuy(&self.pool, table_id, user_id, amount, max_stack).await??;

        // A folded seat also carries its runtime stack forward to hand-end
        // persistence, so mirror the top-up there.
        if let Some(rt) = rt.as_mut() {
            let seat_no = rt.seat_of_user(user_id).map(|s| s.seat_no);
            if let Some(seat_no) = seat_no {
                if let Some(seat) = rt.seat_mut(seat_no) {
                    seat.stack += amount;
                }
                self.store.save_runtime(table_id, rt).await?;
            }
        }

        self.broadcast_snapshot(table_id, rt.as_ref()).await?;
        Ok(new_stack)
    }

    pub async fn sit_out(self: &Arc<Self>, table_id: &str, user_id: &str) -> EngineResult<()> {
        self.set_sitting_out(table_id, user_id, true).await
    }

    pub async fn sit_in(self: &Arc<Self>, table_id: &str, user_id: &str) -> EngineResult<()> {
        self.set_sitting_out(table_id, user_id, false).await?;
        self.try_start_hand(table_id).await?;
        Ok(())
    }

    async fn set_sitting_out(
        self: &Arc<Self>,
        table_id: &str,
        user_id: &str,
        sitting_out: bool,
    ) -> EngineResult<()> {
        let _guard = self.lock_table(table_id).await;
        table_repo::set_sitting_out(&self.pool, table_id, user_id, sitting_out).await??;

        let mut rt = self.store.load_runtime(table_id).await?;
        if let Some(rt) = rt.as_mut() {
            let seat_no = rt.seat_of_user(user_id).map(|s| s.seat_no);
            if let Some(seat_no) = seat_no {
                if let Some(seat) = rt.seat_mut(seat_no) {
                    seat.is_sitting_out = sitting_out;
                }
                self.store.save_runtime(table_id, rt).await?;
            }
        }
        self.broadcast_snapshot(table_id, rt.as_ref()).await?;
        Ok(())
    }

    /// Full snapshot plus the caller's private cards when a hand is running
    /// and they are dealt in. Serves `table:join`.
    pub async fn join_view(
        &self,
        table_id: &str,
        user_id: &str,
    ) -> EngineResult<(TableSnapshot, Option<PrivateCards>)> {
        let rt = self.store.load_runtime(table_id).await?;
        let snapshot = self.build_snapshot(table_id, rt.as_ref()).await?;

        let private = match rt.as_ref().and_then(|rt| rt.seat_of_user(user_id)) {
            Some(seat) if seat.is_contender() => {
                let rt = rt.as_ref().expect("seat implies runtime");
                self.store
                    .load_hole_cards(table_id, &rt.hand_id, user_id)
                    .await?
                    .map(|cards| PrivateCards {
                        table_id: table_id.to_string(),
                        hand_id: rt.hand_id.clone(),
                        cards,
                    })
            }
            _ => None,
        };
        Ok((snapshot, private))
    }

    // ---- Hand lifecycle -------------------------------------------------

    /// Starts a hand if none is running and at least two funded seats exist.
    /// Returns whether a hand started. Lock contention and thin tables both
    /// report "not started" rather than failing.
    pub async fn try_start_hand(self: &Arc<Self>, table_id: &str) -> EngineResult<bool> {
        let _guard = self.lock_table(table_id).await;

        if self.store.load_runtime(table_id).await?.is_some() {
            return Ok(false);
        }
        if !self.store.try_lock_hand_start(table_id).await? {
            tracing::debug!("Hand start lock contended on table {}", table_id);
            return Ok(false);
        }

        let result = self.start_hand_locked(table_id).await;
        if let Err(e) = self.store.unlock_hand_start(table_id).await {
            tracing::warn!("Failed to release hand start lock on {}: {}", table_id, e);
        }
        result
    }

    async fn start_hand_locked(self: &Arc<Self>, table_id: &str) -> EngineResult<bool> {
        let table = table_repo::fetch_table(&self.pool, table_id)
            .await?
            .ok_or(GameError::TableNotFound)?;
        let seat_rows = table_repo::seats_for_table(&self.pool, table_id).await?;

        let hand_seats: Vec<HandSeat> = seat_rows
            .iter()
            .filter(|row| row.stack > 0)
            .map(|row| HandSeat {
                seat_no: row.seat_no as usize,
                user_id: row.user_id.clone(),
                username: row.username.clone(),
                stack: row.stack,
                is_sitting_out: row.is_sitting_out,
            })
            .collect();
        if hand_seats.len() < MIN_PLAYERS_TO_START {
            return Ok(false);
        }

        let cfg = HandConfig {
            small_blind: table.small_blind,
            big_blind: table.big_blind,
            max_seats: table.max_seats as usize,
        };
        let prev_dealer = self.store.load_dealer(table_id).await?;
        let turn_ends_at = now_ms() + self.timing.turn_time_ms;

        let opened = {
            let mut rng = self.rng.lock().expect("rng mutex poisoned");
            open_hand(&cfg, &hand_seats, prev_dealer, turn_ends_at, &mut *rng)
        };
        let Some(opened) = opened else {
            return Ok(false);
        };
        let rt = opened.runtime;

        tracing::info!(
            "Starting hand {} on table {}: dealer seat {}, {} players",
            rt.hand_id,
            table_id,
            rt.dealer_seat,
            rt.players.len()
        );

        self.store.save_dealer(table_id, rt.dealer_seat).await?;
        for (seat_no, cards) in &opened.hole_cards {
            let user_id = &rt.seat(*seat_no).expect("dealt seat exists").user_id;
            self.store
                .save_hole_cards(table_id, &rt.hand_id, user_id, cards)
                .await?;
        }

        // Blinds hit the relational seats in the same transaction that marks
        // the table running.
        let stacks: Vec<(usize, i64)> =
            rt.players.values().map(|s| (s.seat_no, s.stack)).collect();
        table_repo::begin_hand_tx(&self.pool, table_id, &stacks).await?;
        self.store.save_runtime(table_id, &rt).await?;

        self.broadcaster.table_event(
            table_id,
            TableEvent::HandStarted {
                table_id: table_id.to_string(),
                hand_id: rt.hand_id.clone(),
            },
        );
        // Private cards go out before the first turn can possibly act.
        for (seat_no, cards) in &opened.hole_cards {
            let user_id = &rt.seat(*seat_no).expect("dealt seat exists").user_id;
            self.broadcaster.private_cards(
                user_id,
                PrivateCards {
                    table_id: table_id.to_string(),
                    hand_id: rt.hand_id.clone(),
                    cards: *cards,
                },
            );
        }

        // Blinds can settle the street outright (short-stack all-ins); the
        // shared progress path covers that and the sitting-out first actor.
        let mut rt = rt;
        let outcome = if rt.is_round_settled() {
            rt.progress()
        } else {
            ApplyOutcome::TurnAdvanced
        };
        let post = self.progress_after_apply(table_id, rt, outcome).await?;
        if post == PostAction::RevealPending {
            self.spawn_reveal(table_id);
        }
        Ok(true)
    }

    // ---- Actions --------------------------------------------------------

    /// Applies a player's own action.
    pub async fn handle_action(
        self: &Arc<Self>,
        table_id: &str,
        user_id: &str,
        action: PlayerAction,
    ) -> EngineResult<()> {
        let _guard = self.lock_table(table_id).await;

        let mut rt = self
            .store
            .load_runtime(table_id)
            .await?
            .ok_or(GameError::NoHandRunning)?;
        let seat_no = rt
            .seat_of_user(user_id)
            .ok_or(GameError::NotSeated)?
            .seat_no;

        let outcome = rt.apply_action(seat_no, action, false)?;
        // Any manual action clears the away strikes.
        self.clear_strikes(table_id, user_id);

        let post = self.progress_after_apply(table_id, rt, outcome).await?;
        if post == PostAction::RevealPending {
            self.spawn_reveal(table_id);
        }
        Ok(())
    }

    /// Fired by the turn clock. Verifies the timer key against the stored
    /// runtime and applies the default action; superseded keys drop silently.
    pub async fn handle_turn_timeout(self: &Arc<Self>, table_id: &str, key: TimerKey) {
        let result = self.handle_turn_timeout_inner(table_id, key).await;
        if let Err(e) = result {
            // Timer errors self-heal: the next action or reschedule rebuilds
            // the clock from the runtime.
            tracing::error!("Turn timeout on table {} failed: {}", table_id, e);
        }
    }

    async fn handle_turn_timeout_inner(
        self: &Arc<Self>,
        table_id: &str,
        key: TimerKey,
    ) -> EngineResult<()> {
        let _guard = self.lock_table(table_id).await;

        let Some(mut rt) = self.store.load_runtime(table_id).await? else {
            return Ok(());
        };
        if rt.hand_id != key.hand_id
            || rt.current_turn_seat != Some(key.seat_no)
            || rt.turn_ends_at != Some(key.ends_at)
        {
            tracing::debug!("Stale turn timer on table {} ignored", table_id);
            return Ok(());
        }

        let Some(seat) = rt.seat(key.seat_no) else {
            return Ok(());
        };
        let user_id = seat.user_id.clone();
        let silent = seat.is_sitting_out;
        let action = rt.default_action(key.seat_no);
        tracing::info!(
            "Turn clock expired on table {}: seat {} auto-{:?}",
            table_id,
            key.seat_no,
            action
        );

        let outcome = rt.apply_action(key.seat_no, action, !silent)?;
        if !silent {
            let strikes = self.bump_strikes(table_id, &user_id);
            if strikes >= self.timing.away_timeouts_in_row {
                tracing::info!(
                    "User {} reached {} timeout strikes on table {}, queueing away kick",
                    user_id,
                    strikes,
                    table_id
                );
                self.queue_departure(table_id, &user_id, DepartureKind::Kick);
            }
        }

        let post = self.progress_after_apply(table_id, rt, outcome).await?;
        if post == PostAction::RevealPending {
            self.spawn_reveal(table_id);
        }
        Ok(())
    }

    // ---- Shared progress path -------------------------------------------
    //
    // Must be called under the table lock. Owns every post-action effect:
    // the sitting-out auto-action chain, persistence, snapshots, the clock,
    // and hand completion.

    async fn progress_after_apply(
        self: &Arc<Self>,
        table_id: &str,
        mut rt: TableRuntime,
        mut outcome: ApplyOutcome,
    ) -> EngineResult<PostAction> {
        loop {
            match outcome {
                ApplyOutcome::TurnAdvanced => {
                    // Departure flushes can leave a settled or contender-less
                    // street behind; re-dispatch instead of arming a clock.
                    if rt.contender_count() <= 1 {
                        if let Some((winner_seat, payout)) = rt.settle_if_single_contender() {
                            outcome = ApplyOutcome::WinnerByFold {
                                winner_seat,
                                payout,
                            };
                            continue;
                        }
                    }
                    if rt.is_round_settled() {
                        outcome = rt.advance_street();
                        continue;
                    }

                    let Some(turn_seat) = rt.current_turn_seat else {
                        tracing::error!(
                            "Table {} has no turn seat on an unsettled street",
                            table_id
                        );
                        self.store.save_runtime(table_id, &rt).await?;
                        return Ok(PostAction::Idle);
                    };

                    // Sitting-out seats act silently and immediately; the
                    // clock never waits on them.
                    let sitting_out = rt
                        .seat(turn_seat)
                        .map(|s| s.is_sitting_out)
                        .unwrap_or(false);
                    if sitting_out {
                        let action = rt.default_action(turn_seat);
                        tracing::debug!(
                            "Auto-acting sitting-out seat {} on table {}: {:?}",
                            turn_seat,
                            table_id,
                            action
                        );
                        outcome = rt.apply_action(turn_seat, action, false)?;
                        continue;
                    }

                    let ends_at = now_ms() + self.timing.turn_time_ms;
                    rt.turn_ends_at = Some(ends_at);
                    let key = TimerKey {
                        hand_id: rt.hand_id.clone(),
                        seat_no: turn_seat,
                        ends_at,
                    };

                    self.store.save_runtime(table_id, &rt).await?;
                    self.persist_stacks_of(table_id, &rt).await?;
                    self.broadcast_snapshot(table_id, Some(&rt)).await?;
                    self.clock.schedule(self.clone(), table_id, key);
                    return Ok(PostAction::Idle);
                }

                ApplyOutcome::StreetAdvanced { .. } => {
                    // The clock is suspended while the board deals.
                    self.clock.cancel(table_id);
                    self.store.save_runtime(table_id, &rt).await?;
                    self.persist_stacks_of(table_id, &rt).await?;
                    self.broadcast_snapshot(table_id, Some(&rt)).await?;
                    return Ok(PostAction::RevealPending);
                }

                ApplyOutcome::WinnerByFold {
                    winner_seat,
                    payout,
                } => {
                    self.finish_fold_win(table_id, rt, winner_seat, payout)
                        .await?;
                    return Ok(PostAction::Idle);
                }

                ApplyOutcome::ShowdownReached => {
                    self.finish_showdown(table_id, rt).await?;
                    return Ok(PostAction::Idle);
                }
            }
        }
    }

    // ---- Hand completion ------------------------------------------------

    async fn finish_fold_win(
        self: &Arc<Self>,
        table_id: &str,
        rt: TableRuntime,
        winner_seat: usize,
        payout: i64,
    ) -> EngineResult<()> {
        tracing::info!(
            "Hand {} on table {} won by fold: seat {} takes {}",
            rt.hand_id,
            table_id,
            winner_seat,
            payout
        );
        let winners = vec![HandWinner {
            seat_no: winner_seat,
            user_id: rt
                .seat(winner_seat)
                .map(|s| s.user_id.clone())
                .unwrap_or_default(),
            payout,
        }];
        self.conclude_hand(table_id, rt, HandEndReason::WinnerByFold, winners)
            .await
    }

    async fn finish_showdown(self: &Arc<Self>, table_id: &str, mut rt: TableRuntime) -> EngineResult<()> {
        let mut hole_cards = BTreeMap::new();
        for seat in rt.contenders() {
            let cards = self
                .store
                .load_hole_cards(table_id, &rt.hand_id, &seat.user_id)
                .await?;
            match cards {
                Some(cards) => {
                    hole_cards.insert(seat.seat_no, cards);
                }
                None => {
                    return Err(EngineError::Store(StoreError::Corrupt(format!(
                        "missing hole cards for seat {} in hand {}",
                        seat.seat_no, rt.hand_id
                    ))));
                }
            }
        }

        let result = resolve_showdown(&rt, &hole_cards);
        for winner in &result.winners {
            if let Some(seat) = rt.seat_mut(winner.seat_no) {
                seat.stack += winner.payout;
            }
        }
        let paid_total: i64 = result.winners.iter().map(|w| w.payout).sum();
        tracing::info!(
            "Hand {} on table {} reached showdown: {} paid across {} winner(s)",
            rt.hand_id,
            table_id,
            paid_total,
            result.winners.len()
        );

        self.broadcaster.table_event(
            table_id,
            TableEvent::ShowdownReveal {
                table_id: table_id.to_string(),
                hand_id: rt.hand_id.clone(),
                reveals: result.reveals.clone(),
            },
        );

        let winners: Vec<HandWinner> = result
            .winners
            .iter()
            .map(|w| HandWinner {
                seat_no: w.seat_no,
                user_id: w.user_id.clone(),
                payout: w.payout,
            })
            .collect();
        self.conclude_hand(table_id, rt, HandEndReason::Showdown, winners)
            .await
    }

    /// Common tail of both hand endings: persist, tear down the runtime,
    /// notify, flush departures, and schedule the next hand after the hold.
    ///
    /// Written as a boxed future (rather than `async fn`) because this
    /// method's call graph loops back into `try_start_hand`, which calls
    /// back into this method; an `async fn` here would give that cycle an
    /// infinitely-recursive opaque type.
    fn conclude_hand<'a>(
        self: &'a Arc<Self>,
        table_id: &'a str,
        rt: TableRuntime,
        reason: HandEndReason,
        winners: Vec<HandWinner>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = EngineResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.clock.cancel(table_id);
            self.persist_stacks_of(table_id, &rt).await?;
            table_repo::end_hand_tx(&self.pool, table_id).await?;
            self.store.save_dealer(table_id, rt.dealer_seat).await?;
            self.store.delete_runtime(table_id).await?;

            self.broadcaster.table_event(
                table_id,
                TableEvent::HandEnded {
                    table_id: table_id.to_string(),
                    hand_id: rt.hand_id.clone(),
                    reason,
                    winners,
                },
            );

            // Hand end is a safe point.
            self.flush_departures(table_id, None).await?;
            self.broadcast_snapshot(table_id, None).await?;

            let hold_ms = match reason {
                HandEndReason::WinnerByFold => self.timing.win_by_fold_hold_ms,
                HandEndReason::Showdown => self.timing.showdown_hold_ms,
            };
            let engine = self.clone();
            let table_id = table_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(hold_ms)).await;
                if let Err(e) = engine.try_start_hand(&table_id).await {
                    tracing::error!("Failed to start next hand on table {}: {}", table_id, e);
                }
            });
            Ok(())
        })
    }

    // ---- Departures (away kicks and deferred leaves) --------------------

    fn queue_departure(&self, table_id: &str, user_id: &str, kind: DepartureKind) {
        let mut departures = self.departures.lock().expect("departures mutex poisoned");
        let queue = departures.entry(table_id.to_string()).or_default();
        if queue.iter().any(|d| d.user_id == user_id) {
            return;
        }
        queue.push(Departure {
            user_id: user_id.to_string(),
            kind,
        });
    }

    /// Cashes out every queued departure. With a live runtime, a departing
    /// contender is folded first — their committed chips stay in the pot —
    /// and the hand ends right here if that leaves one contender.
    async fn flush_departures(
        self: &Arc<Self>,
        table_id: &str,
        mut rt: Option<&mut TableRuntime>,
    ) -> EngineResult<FlushResult> {
        let queued = {
            let mut departures = self.departures.lock().expect("departures mutex poisoned");
            departures.remove(table_id).unwrap_or_default()
        };
        if queued.is_empty() {
            return Ok(FlushResult::Continue);
        }

        let mut any_folded = false;
        let mut requeued = Vec::new();
        for departure in &queued {
            if let Some(rt) = rt.as_deref_mut() {
                let seat_no = rt
                    .seat_of_user(&departure.user_id)
                    .filter(|s| s.is_contender())
                    .map(|s| s.seat_no);
                if let Some(seat_no) = seat_no {
                    // Never fold the last contender out from under the pot;
                    // they collect first and cash out at hand end.
                    if rt.contender_count() <= 1 {
                        requeued.push(departure.clone());
                        continue;
                    }
                    if let Some(seat) = rt.seat_mut(seat_no) {
                        seat.has_folded = true;
                        seat.is_all_in = false;
                        any_folded = true;
                    }
                }
            }

            match table_repo::release_seat(&self.pool, table_id, &departure.user_id).await? {
                Ok(cashed) => {
                    tracing::info!(
                        "Flushed {:?} for user {} on table {}: cashed out {}",
                        departure.kind,
                        departure.user_id,
                        table_id,
                        cashed
                    );
                }
                Err(GameError::NotSeated) => {}
                Err(e) => {
                    tracing::warn!(
                        "Departure cash-out failed for user {} on table {}: {}",
                        departure.user_id,
                        table_id,
                        e
                    );
                }
            }
            self.clear_strikes(table_id, &departure.user_id);
        }

        if !requeued.is_empty() {
            let mut departures = self.departures.lock().expect("departures mutex poisoned");
            departures
                .entry(table_id.to_string())
                .or_default()
                .extend(requeued);
        }

        if let Some(rt) = rt.as_deref_mut() {
            if any_folded {
                if let Some((winner_seat, payout)) = rt.settle_if_single_contender() {
                    return Ok(FlushResult::HandEnded {
                        winner_seat,
                        payout,
                    });
                }
                // Keep the turn on a live seat. During a runout no seat
                // holds the turn, and that must stay true.
                if !rt.auto_runout {
                    let turn_ok = rt
                        .current_turn_seat
                        .and_then(|s| rt.seat(s))
                        .map(|s| s.can_act())
                        .unwrap_or(false);
                    if !turn_ok {
                        rt.current_turn_seat = rt.first_to_act_postflop();
                    }
                }
            }
        }
        Ok(FlushResult::Continue)
    }

    // ---- Strikes --------------------------------------------------------

    fn bump_strikes(&self, table_id: &str, user_id: &str) -> u32 {
        let mut strikes = self.strikes.lock().expect("strikes mutex poisoned");
        let count = strikes
            .entry((table_id.to_string(), user_id.to_string()))
            .or_insert(0);
        *count += 1;
        *count
    }

    fn clear_strikes(&self, table_id: &str, user_id: &str) {
        self.strikes
            .lock()
            .expect("strikes mutex poisoned")
            .remove(&(table_id.to_string(), user_id.to_string()));
    }

    // ---- Snapshots & persistence ----------------------------------------

    async fn persist_stacks_of(&self, table_id: &str, rt: &TableRuntime) -> EngineResult<()> {
        let stacks: Vec<(usize, i64)> =
            rt.players.values().map(|s| (s.seat_no, s.stack)).collect();
        // One retry at the DB boundary; a second failure refuses the action.
        if let Err(first) = table_repo::persist_stacks(&self.pool, table_id, &stacks).await {
            tracing::warn!(
                "persist_stacks failed on table {}, retrying once: {}",
                table_id,
                first
            );
            table_repo::persist_stacks(&self.pool, table_id, &stacks).await?;
        }
        Ok(())
    }

    /// Snapshot of the table as it stands, hand included if one is running.
    pub async fn snapshot(&self, table_id: &str) -> EngineResult<TableSnapshot> {
        let rt = self.store.load_runtime(table_id).await?;
        self.build_snapshot(table_id, rt.as_ref()).await
    }

    pub async fn build_snapshot(
        &self,
        table_id: &str,
        rt: Option<&TableRuntime>,
    ) -> EngineResult<TableSnapshot> {
        let table = table_repo::fetch_table(&self.pool, table_id)
            .await?
            .ok_or(GameError::TableNotFound)?;
        let seat_rows = table_repo::seats_for_table(&self.pool, table_id).await?;

        let seats = (1..=table.max_seats as usize)
            .map(|seat_no| {
                let row = seat_rows.iter().find(|r| r.seat_no as usize == seat_no);
                let live = rt.and_then(|rt| rt.seat(seat_no));
                SeatView {
                    seat_no,
                    user: row.map(|r| SeatUser {
                        user_id: r.user_id.clone(),
                        username: r.username.clone(),
                    }),
                    stack: live
                        .map(|s| s.stack)
                        .or_else(|| row.map(|r| r.stack))
                        .unwrap_or(0),
                    bet: live.map(|s| s.bet).unwrap_or(0),
                    has_folded: live.map(|s| s.has_folded).unwrap_or(false),
                    is_all_in: live.map(|s| s.is_all_in).unwrap_or(false),
                    is_dealer: rt.map(|rt| rt.dealer_seat == seat_no).unwrap_or(false),
                    is_turn: rt
                        .map(|rt| rt.current_turn_seat == Some(seat_no))
                        .unwrap_or(false),
                    is_sitting_out: live
                        .map(|s| s.is_sitting_out)
                        .or_else(|| row.map(|r| r.is_sitting_out))
                        .unwrap_or(false),
                }
            })
            .collect();

        Ok(TableSnapshot {
            table_id: table.id,
            name: table.name,
            small_blind: table.small_blind,
            big_blind: table.big_blind,
            max_seats: table.max_seats as usize,
            status: table.status,
            seats,
            game: rt.map(GameView::from_runtime),
        })
    }

    /// Builds and fans out a snapshot; also refreshes the short-TTL public
    /// state cache (best-effort).
    pub(crate) async fn broadcast_snapshot(
        &self,
        table_id: &str,
        rt: Option<&TableRuntime>,
    ) -> EngineResult<()> {
        let snapshot = self.build_snapshot(table_id, rt).await?;
        if let Ok(json) = serde_json::to_string(&snapshot) {
            self.store.cache_public_state(table_id, &json).await;
        }
        self.broadcaster
            .table_event(table_id, TableEvent::StateSnapshot { state: snapshot });
        Ok(())
    }

    async fn broadcast_snapshot_fresh(&self, table_id: &str) -> EngineResult<()> {
        let rt = self.store.load_runtime(table_id).await?;
        self.broadcast_snapshot(table_id, rt.as_ref()).await
    }
}
