use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A playing card. Ranks run 2-14 (Jack=11, Queen=12, King=13, Ace=14),
/// suits 0-3 (Spades, Hearts, Diamonds, Clubs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub rank: u8,
    pub suit: u8,
}

impl Card {
    pub fn new(rank: u8, suit: u8) -> Self {
        Self { rank, suit }
    }

    fn suit_char(suit: u8) -> char {
        match suit {
            0 => 'S',
            1 => 'H',
            2 => 'D',
            3 => 'C',
            _ => '?',
        }
    }

    // Convert to rs_poker for hand evaluation
    pub(crate) fn to_rs_poker(self) -> rs_poker::core::Card {
        use rs_poker::core::{Suit, Value};

        let value = match self.rank {
            2 => Value::Two,
            3 => Value::Three,
            4 => Value::Four,
            5 => Value::Five,
            6 => Value::Six,
            7 => Value::Seven,
            8 => Value::Eight,
            9 => Value::Nine,
            10 => Value::Ten,
            11 => Value::Jack,
            12 => Value::Queen,
            13 => Value::King,
            14 => Value::Ace,
            _ => Value::Two,
        };

        let suit = match self.suit {
            0 => Suit::Spade,
            1 => Suit::Heart,
            2 => Suit::Diamond,
            3 => Suit::Club,
            _ => Suit::Spade,
        };

        rs_poker::core::Card { value, suit }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rank_str = match self.rank {
            10 => "T".to_string(),
            11 => "J".to_string(),
            12 => "Q".to_string(),
            13 => "K".to_string(),
            14 => "A".to_string(),
            n => n.to_string(),
        };
        write!(f, "{}{}", rank_str, Self::suit_char(self.suit))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Builds the standard 52-card deck in fixed order: rank outer, suit inner.
    pub fn new() -> Self {
        let mut cards = Vec::with_capacity(52);
        for rank in 2..=14 {
            for suit in 0..4 {
                cards.push(Card::new(rank, suit));
            }
        }
        Self { cards }
    }

    /// Fisher-Yates shuffle against a caller-supplied RNG so tests can seed it.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        self.cards.shuffle(rng);
    }

    /// Returns the first `n` cards and the remaining deck, leaving `self`
    /// untouched. The caller stores the remainder back where it belongs.
    pub fn draw(&self, n: usize) -> (Vec<Card>, Deck) {
        let n = n.min(self.cards.len());
        let drawn = self.cards[..n].to_vec();
        let rest = Deck {
            cards: self.cards[n..].to_vec(),
        };
        (drawn, rest)
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}
