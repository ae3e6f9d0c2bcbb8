//! Showdown resolution: side pots from committed contributions, per-pot
//! ranking, and chip distribution with the odd-chip rule.

use crate::game::deck::Card;
use crate::game::eval::{evaluate_seven, HandValue};
use crate::game::runtime::TableRuntime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One non-folded seat's cards and hand strength, revealed to the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowdownReveal {
    pub seat_no: usize,
    pub user_id: String,
    pub cards: [Card; 2],
    pub value: u64,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowdownWinner {
    pub seat_no: usize,
    pub user_id: String,
    pub payout: i64,
    pub value: u64,
}

#[derive(Debug, Clone)]
pub struct ShowdownResult {
    pub reveals: Vec<ShowdownReveal>,
    /// Aggregated payouts across all pots, one entry per winning seat.
    pub winners: Vec<ShowdownWinner>,
}

struct PotLevel {
    amount: i64,
    eligible: Vec<usize>,
}

impl TableRuntime {
    /// Builds the pot levels from every seat's committed total. Folded seats
    /// still fund the pots they contributed to; only non-folded seats are
    /// eligible to win.
    fn contribution_pots(&self) -> Vec<PotLevel> {
        let mut levels: Vec<i64> = self
            .players
            .values()
            .map(|s| s.committed)
            .filter(|&c| c > 0)
            .collect();
        levels.sort_unstable();
        levels.dedup();

        let mut pots = Vec::new();
        let mut prev = 0i64;
        for lvl in levels {
            let contributors = self
                .players
                .values()
                .filter(|s| s.committed >= lvl)
                .count() as i64;
            let amount = (lvl - prev) * contributors;
            let eligible: Vec<usize> = self
                .players
                .values()
                .filter(|s| s.committed >= lvl && s.is_contender())
                .map(|s| s.seat_no)
                .collect();
            if amount > 0 {
                pots.push(PotLevel { amount, eligible });
            }
            prev = lvl;
        }
        pots
    }
}

/// Resolves a showdown. `hole_cards` must hold the cards of every non-folded
/// seat; the board is read from the runtime. Payouts are returned, not
/// applied. `Σ payout == Σ committed` always.
pub fn resolve_showdown(
    rt: &TableRuntime,
    hole_cards: &BTreeMap<usize, [Card; 2]>,
) -> ShowdownResult {
    let values: BTreeMap<usize, HandValue> = rt
        .contenders()
        .filter_map(|s| {
            hole_cards
                .get(&s.seat_no)
                .map(|cards| (s.seat_no, evaluate_seven(cards, &rt.board)))
        })
        .collect();

    let reveals: Vec<ShowdownReveal> = rt
        .contenders()
        .filter_map(|s| {
            let cards = hole_cards.get(&s.seat_no)?;
            let value = values.get(&s.seat_no)?;
            Some(ShowdownReveal {
                seat_no: s.seat_no,
                user_id: s.user_id.clone(),
                cards: *cards,
                value: value.value,
                category: value.category.to_string(),
            })
        })
        .collect();

    let mut payouts: BTreeMap<usize, i64> = BTreeMap::new();
    for pot in rt.contribution_pots() {
        let best = pot
            .eligible
            .iter()
            .filter_map(|seat_no| values.get(seat_no))
            .max()
            .copied();
        let Some(best) = best else {
            // No eligible hand for this layer (everyone above it folded);
            // the chips fall to the winners of the layer below via the next
            // eligible set, which by construction cannot be empty for the
            // bottom layer of a live hand.
            continue;
        };

        let mut winners: Vec<usize> = pot
            .eligible
            .iter()
            .copied()
            .filter(|seat_no| values.get(seat_no) == Some(&best))
            .collect();
        // Odd chips go to the winners closest to the dealer's left.
        winners.sort_by_key(|&seat_no| rt.distance_from_dealer_left(seat_no));

        let base = pot.amount / winners.len() as i64;
        let rem = pot.amount - base * winners.len() as i64;
        for (i, seat_no) in winners.iter().enumerate() {
            let extra = if (i as i64) < rem { 1 } else { 0 };
            *payouts.entry(*seat_no).or_insert(0) += base + extra;
        }
    }

    let winners: Vec<ShowdownWinner> = payouts
        .iter()
        .map(|(&seat_no, &payout)| ShowdownWinner {
            seat_no,
            user_id: rt
                .seat(seat_no)
                .map(|s| s.user_id.clone())
                .unwrap_or_default(),
            payout,
            value: values.get(&seat_no).map(|v| v.value).unwrap_or(0),
        })
        .collect();

    ShowdownResult { reveals, winners }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::deck::Card;
    use crate::game::runtime::testutil::{runtime_with_seats, seat};
    use crate::game::runtime::Street;

    fn card(text: &str) -> Card {
        let bytes = text.as_bytes();
        let rank = match bytes[0] {
            b'T' => 10,
            b'J' => 11,
            b'Q' => 12,
            b'K' => 13,
            b'A' => 14,
            d => (d - b'0') as u8,
        };
        let suit = match bytes[1] {
            b'S' => 0,
            b'H' => 1,
            b'D' => 2,
            _ => 3,
        };
        Card::new(rank, suit)
    }

    fn hole(a: &str, b: &str) -> [Card; 2] {
        [card(a), card(b)]
    }

    fn board(texts: [&str; 5]) -> Vec<Card> {
        texts.iter().map(|s| card(s)).collect()
    }

    /// Three all-in players with committed 100/200/200; board gives seats 2
    /// and 3 the same two pair, seat 1 nothing.
    fn three_way_all_in() -> (TableRuntime, BTreeMap<usize, [Card; 2]>) {
        let mut rt = runtime_with_seats(vec![seat(1, 0), seat(2, 0), seat(3, 0)]);
        rt.round = Street::Showdown;
        rt.dealer_seat = 1;
        rt.board = board(["KS", "KH", "9D", "9C", "2S"]);
        for (seat_no, committed) in [(1, 100), (2, 200), (3, 200)] {
            let s = rt.players.get_mut(&seat_no).unwrap();
            s.committed = committed;
            s.is_all_in = true;
        }
        rt.pot_total = rt.committed_total();

        let mut cards = BTreeMap::new();
        cards.insert(1, hole("3D", "4C")); // plays the board, loses
        cards.insert(2, hole("AD", "5C")); // kings and nines, ace kicker
        cards.insert(3, hole("AH", "6S")); // identical value
        (rt, cards)
    }

    #[test]
    fn test_side_pots_split_between_tied_winners() {
        let (rt, cards) = three_way_all_in();
        let result = resolve_showdown(&rt, &cards);

        // Main pot 300 split 150/150, side pot 200 split 100/100.
        let by_seat: BTreeMap<usize, i64> =
            result.winners.iter().map(|w| (w.seat_no, w.payout)).collect();
        assert_eq!(by_seat.get(&2), Some(&250));
        assert_eq!(by_seat.get(&3), Some(&250));
        assert_eq!(by_seat.get(&1), None);

        let total: i64 = result.winners.iter().map(|w| w.payout).sum();
        assert_eq!(total, rt.committed_total());
    }

    #[test]
    fn test_odd_chip_goes_left_of_dealer() {
        let (mut rt, cards) = three_way_all_in();
        // Bump the main pot to an odd total: committed 101/200/200 makes the
        // bottom layer 3x101 = 303, side 198.
        rt.players.get_mut(&1).unwrap().committed = 101;
        for seat_no in [2, 3] {
            rt.players.get_mut(&seat_no).unwrap().committed = 201;
        }
        rt.pot_total = rt.committed_total();

        let result = resolve_showdown(&rt, &cards);
        let by_seat: BTreeMap<usize, i64> =
            result.winners.iter().map(|w| (w.seat_no, w.payout)).collect();

        // Main 303: 151 each + 1 odd chip to seat 2 (closest to dealer 1's
        // left). Side 200: 100 each.
        assert_eq!(by_seat.get(&2).copied(), Some(252));
        assert_eq!(by_seat.get(&3).copied(), Some(251));

        let total: i64 = result.winners.iter().map(|w| w.payout).sum();
        assert_eq!(total, rt.committed_total());
    }

    #[test]
    fn test_odd_chip_wraps_around_the_table() {
        let (mut rt, cards) = three_way_all_in();
        rt.dealer_seat = 3;
        rt.players.get_mut(&1).unwrap().committed = 101;
        for seat_no in [2, 3] {
            rt.players.get_mut(&seat_no).unwrap().committed = 201;
        }
        rt.pot_total = rt.committed_total();

        let result = resolve_showdown(&rt, &cards);
        let by_seat: BTreeMap<usize, i64> =
            result.winners.iter().map(|w| (w.seat_no, w.payout)).collect();

        // Dealer is seat 3. Walking clockwise from seat 4, seat 2 comes up
        // before seat 3, so seat 2 takes the odd chip.
        assert_eq!(by_seat.get(&2).copied(), Some(252));
        assert_eq!(by_seat.get(&3).copied(), Some(251));
    }

    #[test]
    fn test_folded_seat_funds_pot_but_cannot_win() {
        let mut rt = runtime_with_seats(vec![seat(1, 500), seat(2, 0), seat(3, 0)]);
        rt.round = Street::Showdown;
        rt.board = board(["KS", "KH", "9D", "9C", "2S"]);
        // Seat 1 folded after committing 100; seats 2 and 3 all-in for 200.
        {
            let s1 = rt.players.get_mut(&1).unwrap();
            s1.committed = 100;
            s1.has_folded = true;
        }
        for seat_no in [2, 3] {
            let s = rt.players.get_mut(&seat_no).unwrap();
            s.committed = 200;
            s.is_all_in = true;
        }
        rt.pot_total = rt.committed_total();

        let mut cards = BTreeMap::new();
        cards.insert(2, hole("AD", "5C"));
        cards.insert(3, hole("QD", "5S"));
        let result = resolve_showdown(&rt, &cards);

        // Seat 2 wins everything, including the folded seat's 100.
        assert_eq!(result.winners.len(), 1);
        assert_eq!(result.winners[0].seat_no, 2);
        assert_eq!(result.winners[0].payout, 500);

        // Folded seats are never revealed.
        assert!(result.reveals.iter().all(|r| r.seat_no != 1));
        assert_eq!(result.reveals.len(), 2);
    }

    #[test]
    fn test_uncalled_overbet_layer_returns_to_its_owner() {
        let mut rt = runtime_with_seats(vec![seat(1, 0), seat(2, 0)]);
        rt.round = Street::Showdown;
        rt.board = board(["KS", "KH", "9D", "9C", "2S"]);
        // Seat 1 all-in 150, seat 2 covers with 400: the 250 top layer has
        // seat 2 as its only eligible and flows back regardless of hands.
        {
            let s1 = rt.players.get_mut(&1).unwrap();
            s1.committed = 150;
            s1.is_all_in = true;
        }
        {
            let s2 = rt.players.get_mut(&2).unwrap();
            s2.committed = 400;
            s2.is_all_in = true;
        }
        rt.pot_total = rt.committed_total();

        let mut cards = BTreeMap::new();
        cards.insert(1, hole("AD", "5C")); // wins the contested layer
        cards.insert(2, hole("QD", "5S"));
        let result = resolve_showdown(&rt, &cards);

        let by_seat: BTreeMap<usize, i64> =
            result.winners.iter().map(|w| (w.seat_no, w.payout)).collect();
        assert_eq!(by_seat.get(&1), Some(&300));
        assert_eq!(by_seat.get(&2), Some(&250));
    }

    #[test]
    fn test_three_way_five_chip_pot_splits_two_two_one() {
        // Three players, 5 chips total at the contested layer is impossible
        // with equal contributions, so model it directly: committed 1/2/2
        // and identical hands for all three at a 5-chip pot.
        let mut rt = runtime_with_seats(vec![seat(1, 0), seat(2, 0), seat(3, 0)]);
        rt.round = Street::Showdown;
        rt.dealer_seat = 3;
        rt.board = board(["AS", "KS", "QD", "JC", "TH"]); // board plays for everyone
        for seat_no in [1, 2, 3] {
            let s = rt.players.get_mut(&seat_no).unwrap();
            s.committed = if seat_no == 1 { 1 } else { 2 };
            s.is_all_in = true;
        }
        rt.pot_total = rt.committed_total();

        let mut cards = BTreeMap::new();
        cards.insert(1, hole("2D", "3C"));
        cards.insert(2, hole("2H", "3S"));
        cards.insert(3, hole("4D", "5C"));
        let result = resolve_showdown(&rt, &cards);

        let by_seat: BTreeMap<usize, i64> =
            result.winners.iter().map(|w| (w.seat_no, w.payout)).collect();
        // Layer 1: 3 chips across three tied winners -> 1 each.
        // Layer 2: 2 chips across seats 2 and 3 -> 1 each.
        assert_eq!(by_seat.get(&1), Some(&1));
        assert_eq!(by_seat.get(&2), Some(&2));
        assert_eq!(by_seat.get(&3), Some(&2));
        let total: i64 = result.winners.iter().map(|w| w.payout).sum();
        assert_eq!(total, 5);
    }
}
