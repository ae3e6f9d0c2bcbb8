use crate::game::deck::Card;
use rs_poker::core::{Hand, Rank, Rankable};

/// Total-order value of a 7-card hand. Greater beats lesser; equal values
/// split. The packing puts the hand category in the high bits and the
/// within-category tiebreak below it, so a single integer comparison decides
/// any matchup.
#[derive(Debug, Clone, Copy)]
pub struct HandValue {
    pub value: u64,
    pub category: &'static str,
}

impl PartialEq for HandValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for HandValue {}

impl PartialOrd for HandValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HandValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

fn pack(rank: Rank) -> HandValue {
    let (category, tiebreak, name) = match rank {
        Rank::HighCard(v) => (0u64, v, "High Card"),
        Rank::OnePair(v) => (1, v, "Pair"),
        Rank::TwoPair(v) => (2, v, "Two Pair"),
        Rank::ThreeOfAKind(v) => (3, v, "Three of a Kind"),
        Rank::Straight(v) => (4, v, "Straight"),
        Rank::Flush(v) => (5, v, "Flush"),
        Rank::FullHouse(v) => (6, v, "Full House"),
        Rank::FourOfAKind(v) => (7, v, "Four of a Kind"),
        Rank::StraightFlush(v) => (8, v, "Straight Flush"),
    };
    HandValue {
        value: (category << 32) | tiebreak as u64,
        category: name,
    }
}

/// Evaluates the best 5-card hand from 2 hole cards and up to 5 board cards.
pub fn evaluate_seven(hole_cards: &[Card], board: &[Card]) -> HandValue {
    let mut all_cards = Vec::with_capacity(hole_cards.len() + board.len());
    all_cards.extend(hole_cards.iter().map(|c| c.to_rs_poker()));
    all_cards.extend(board.iter().map(|c| c.to_rs_poker()));

    let hand = Hand::new_with_cards(all_cards);
    pack(hand.rank())
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn cards(texts: &[&str]) -> Vec<Card> {
        texts.iter().map(|s| card(s)).collect()
    }

    #[test]
    fn test_straight_flush_beats_quads() {
        let board = cards(&["9S", "8S", "7S", "2D", "2C"]);
        let sf = evaluate_seven(&cards(&["6S", "5S"]), &board);
        let quads = evaluate_seven(&cards(&["2H", "2S"]), &board);
        assert_eq!(sf.category, "Straight Flush");
        assert_eq!(quads.category, "Four of a Kind");
        assert!(sf > quads);
    }

    #[test]
    fn test_kicker_breaks_pair_tie() {
        let board = cards(&["KS", "KH", "7D", "4C", "2S"]);
        let ace_kicker = evaluate_seven(&cards(&["AD", "9C"]), &board);
        let queen_kicker = evaluate_seven(&cards(&["QD", "9H"]), &board);
        assert_eq!(ace_kicker.category, "Pair");
        assert!(ace_kicker > queen_kicker);
    }

    #[test]
    fn test_board_plays_ties() {
        let board = cards(&["AS", "KS", "QD", "JC", "TH"]);
        let a = evaluate_seven(&cards(&["2D", "3C"]), &board);
        let b = evaluate_seven(&cards(&["4H", "5S"]), &board);
        assert_eq!(a, b);
    }

    #[test]
    fn test_wheel_straight_is_lowest_straight() {
        let wheel = evaluate_seven(
            &cards(&["AD", "2C"]),
            &cards(&["3H", "4S", "5D", "9C", "KH"]),
        );
        let six_high = evaluate_seven(
            &cards(&["6D", "2C"]),
            &cards(&["3H", "4S", "5D", "9C", "KH"]),
        );
        assert_eq!(wheel.category, "Straight");
        assert_eq!(six_high.category, "Straight");
        assert!(six_high > wheel);
    }

    #[test]
    fn test_preflop_evaluation_works_with_empty_board() {
        let pair = evaluate_seven(&cards(&["AS", "AH"]), &[]);
        let high = evaluate_seven(&cards(&["AS", "KH"]), &[]);
        assert_eq!(pair.category, "Pair");
        assert!(pair > high);
    }
}
