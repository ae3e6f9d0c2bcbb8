//! Hand construction: dealer rotation, blinds, dealing order, first actor.

use crate::game::deck::{Card, Deck};
use crate::game::runtime::{SeatRuntime, Street, TableRuntime};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct HandConfig {
    pub small_blind: i64,
    pub big_blind: i64,
    pub max_seats: usize,
}

/// A funded, occupied seat as read from the seat store.
#[derive(Debug, Clone)]
pub struct HandSeat {
    pub seat_no: usize,
    pub user_id: String,
    pub username: String,
    pub stack: i64,
    pub is_sitting_out: bool,
}

#[derive(Debug)]
pub struct OpenedHand {
    pub runtime: TableRuntime,
    /// Private per-seat hole cards. These never live on the runtime blob;
    /// the caller stores them under per-user keys.
    pub hole_cards: BTreeMap<usize, [Card; 2]>,
    pub small_blind_seat: usize,
    pub big_blind_seat: usize,
}

/// Builds the runtime for a fresh hand, or None when fewer than two funded
/// seats are available. The caller owns every surrounding effect: locks,
/// persistence, broadcasts, and the turn clock.
pub fn open_hand<R: Rng>(
    cfg: &HandConfig,
    seats: &[HandSeat],
    prev_dealer: Option<usize>,
    turn_ends_at: i64,
    rng: &mut R,
) -> Option<OpenedHand> {
    let funded: Vec<&HandSeat> = {
        let mut v: Vec<&HandSeat> = seats.iter().filter(|s| s.stack > 0).collect();
        v.sort_by_key(|s| s.seat_no);
        v
    };
    if funded.len() < 2 {
        return None;
    }

    let occupied: BTreeSet<usize> = funded.iter().map(|s| s.seat_no).collect();
    let dealer_seat = match prev_dealer {
        Some(prev) => next_occupied(&occupied, cfg.max_seats, prev),
        // First hand on a table falls back to the lowest occupied seat.
        None => *occupied.iter().next().expect("funded seats checked above"),
    };

    let mut players: BTreeMap<usize, SeatRuntime> = funded
        .iter()
        .map(|s| {
            let mut seat =
                SeatRuntime::new(s.seat_no, s.user_id.clone(), s.username.clone(), s.stack);
            seat.is_sitting_out = s.is_sitting_out;
            (s.seat_no, seat)
        })
        .collect();

    // Heads-up the dealer is the small blind and acts first preflop; with
    // three or more the blinds sit clockwise after the button.
    let heads_up = players.len() == crate::config::HEADS_UP_PLAYER_COUNT;
    let (sb_seat, bb_seat) = if heads_up {
        (dealer_seat, next_occupied(&occupied, cfg.max_seats, dealer_seat))
    } else {
        let sb = next_occupied(&occupied, cfg.max_seats, dealer_seat);
        (sb, next_occupied(&occupied, cfg.max_seats, sb))
    };

    // Blinds are clamped by stack; a short stack is all-in from the post.
    let mut pot_total = 0;
    pot_total += players
        .get_mut(&sb_seat)
        .expect("sb seat occupied")
        .place_bet(cfg.small_blind);
    pot_total += players
        .get_mut(&bb_seat)
        .expect("bb seat occupied")
        .place_bet(cfg.big_blind);

    let mut deck = Deck::new();
    deck.shuffle(rng);

    // Deal one card at a time, two rounds, starting from the seat after the
    // button, exactly as a live dealer pitches them.
    let mut order: Vec<usize> = Vec::with_capacity(players.len());
    let mut at = dealer_seat;
    for _ in 0..players.len() {
        at = next_occupied(&occupied, cfg.max_seats, at);
        order.push(at);
    }

    let mut hole_cards: BTreeMap<usize, Vec<Card>> = BTreeMap::new();
    for _ in 0..2 {
        for &seat_no in &order {
            let (card, rest) = deck.draw(1);
            deck = rest;
            hole_cards.entry(seat_no).or_default().push(card[0]);
        }
    }
    let hole_cards: BTreeMap<usize, [Card; 2]> = hole_cards
        .into_iter()
        .map(|(seat_no, cards)| (seat_no, [cards[0], cards[1]]))
        .collect();

    let first_to_act = if heads_up {
        dealer_seat
    } else {
        next_occupied(&occupied, cfg.max_seats, bb_seat)
    };

    let runtime = TableRuntime {
        hand_id: Uuid::new_v4().to_string(),
        round: Street::Preflop,
        dealer_seat,
        current_turn_seat: Some(first_to_act),
        turn_ends_at: Some(turn_ends_at),
        deck,
        board: vec![],
        pending_board: vec![],
        is_dealing_board: false,
        auto_runout: false,
        pot_total,
        current_bet: cfg.big_blind,
        min_raise: cfg.big_blind,
        last_aggressor_seat: Some(bb_seat),
        acted_this_round: BTreeSet::new(),
        players,
        small_blind: cfg.small_blind,
        big_blind: cfg.big_blind,
        max_seats: cfg.max_seats,
    };

    Some(OpenedHand {
        runtime,
        hole_cards,
        small_blind_seat: sb_seat,
        big_blind_seat: bb_seat,
    })
}

fn next_occupied(occupied: &BTreeSet<usize>, max_seats: usize, after: usize) -> usize {
    for offset in 1..=max_seats {
        let seat_no = (after - 1 + offset) % max_seats + 1;
        if occupied.contains(&seat_no) {
            return seat_no;
        }
    }
    after
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn cfg() -> HandConfig {
        HandConfig {
            small_blind: 5,
            big_blind: 10,
            max_seats: 6,
        }
    }

    fn hand_seat(seat_no: usize, stack: i64) -> HandSeat {
        HandSeat {
            seat_no,
            user_id: format!("user{}", seat_no),
            username: format!("Player {}", seat_no),
            stack,
            is_sitting_out: false,
        }
    }

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(42)
    }

    #[test]
    fn test_needs_two_funded_seats() {
        assert!(open_hand(&cfg(), &[hand_seat(1, 1000)], None, 0, &mut rng()).is_none());
        assert!(open_hand(
            &cfg(),
            &[hand_seat(1, 1000), hand_seat(2, 0)],
            None,
            0,
            &mut rng()
        )
        .is_none());
    }

    #[test]
    fn test_first_hand_dealer_is_lowest_occupied_seat() {
        let seats = vec![hand_seat(3, 1000), hand_seat(5, 1000), hand_seat(1, 1000)];
        let hand = open_hand(&cfg(), &seats, None, 0, &mut rng()).unwrap();
        assert_eq!(hand.runtime.dealer_seat, 1);
    }

    #[test]
    fn test_dealer_rotates_to_next_occupied_seat() {
        let seats = vec![hand_seat(1, 1000), hand_seat(3, 1000), hand_seat(5, 1000)];
        let hand = open_hand(&cfg(), &seats, Some(3), 0, &mut rng()).unwrap();
        assert_eq!(hand.runtime.dealer_seat, 5);

        // Wraps past the table size.
        let hand = open_hand(&cfg(), &seats, Some(5), 0, &mut rng()).unwrap();
        assert_eq!(hand.runtime.dealer_seat, 1);
    }

    #[test]
    fn test_heads_up_dealer_posts_small_blind_and_acts_first() {
        let seats = vec![hand_seat(1, 1000), hand_seat(2, 1000)];
        let hand = open_hand(&cfg(), &seats, None, 123, &mut rng()).unwrap();
        let rt = &hand.runtime;

        assert_eq!(rt.dealer_seat, 1);
        assert_eq!(hand.small_blind_seat, 1);
        assert_eq!(hand.big_blind_seat, 2);
        assert_eq!(rt.seat(1).unwrap().bet, 5);
        assert_eq!(rt.seat(2).unwrap().bet, 10);
        assert_eq!(rt.current_turn_seat, Some(1));
        assert_eq!(rt.turn_ends_at, Some(123));
        assert_eq!(rt.pot_total, 15);
    }

    #[test]
    fn test_ring_blinds_and_first_actor() {
        let seats = vec![
            hand_seat(1, 1000),
            hand_seat(2, 1000),
            hand_seat(3, 1000),
            hand_seat(4, 1000),
        ];
        let hand = open_hand(&cfg(), &seats, None, 0, &mut rng()).unwrap();
        let rt = &hand.runtime;

        assert_eq!(rt.dealer_seat, 1);
        assert_eq!(hand.small_blind_seat, 2);
        assert_eq!(hand.big_blind_seat, 3);
        assert_eq!(rt.current_turn_seat, Some(4));
        assert_eq!(rt.current_bet, 10);
        assert_eq!(rt.min_raise, 10);
        assert_eq!(rt.last_aggressor_seat, Some(3));
    }

    #[test]
    fn test_short_stack_blind_is_all_in() {
        let seats = vec![hand_seat(1, 1000), hand_seat(2, 1000), hand_seat(3, 4)];
        let hand = open_hand(&cfg(), &seats, None, 0, &mut rng()).unwrap();
        let bb = hand.runtime.seat(3).unwrap();
        assert_eq!(bb.bet, 4);
        assert!(bb.is_all_in);
        // The table bet is still the full big blind.
        assert_eq!(hand.runtime.current_bet, 10);
    }

    #[test]
    fn test_every_player_gets_two_distinct_cards() {
        let seats = vec![
            hand_seat(1, 1000),
            hand_seat(2, 1000),
            hand_seat(3, 1000),
            hand_seat(4, 1000),
            hand_seat(5, 1000),
        ];
        let hand = open_hand(&cfg(), &seats, None, 0, &mut rng()).unwrap();

        let mut seen = std::collections::HashSet::new();
        for cards in hand.hole_cards.values() {
            assert!(seen.insert(cards[0]));
            assert!(seen.insert(cards[1]));
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(hand.runtime.deck.remaining(), 42);

        // Dealt cards no longer sit in the remaining deck.
        for card in &seen {
            assert!(!hand.runtime.deck.cards().contains(card));
        }
    }

    #[test]
    fn test_pot_matches_committed_after_blinds() {
        let seats = vec![hand_seat(1, 1000), hand_seat(2, 1000), hand_seat(3, 1000)];
        let hand = open_hand(&cfg(), &seats, None, 0, &mut rng()).unwrap();
        assert_eq!(hand.runtime.pot_total, hand.runtime.committed_total());
    }
}
