//! Card identity, point value, rule classification, shuffle and draw (C1).

use protocol::{Card, Rank, RuleType, Suit};
use rand::Rng;
use rand::seq::SliceRandom;

/// Error returned by [`Deck::draw`] when there are no cards left. Callers
/// must handle this by advancing the turn without drawing (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyDeck;

/// The point value of a card for scoring purposes. Red Kings are the only
/// source of negative points.
pub fn point_value(card: &Card) -> i32 {
    match (card.suit, card.rank) {
        (_, Rank::Joker) => 0,
        (_, Rank::Ace) => 1,
        (_, Rank::Two) => 2,
        (_, Rank::Three) => 3,
        (_, Rank::Four) => 4,
        (_, Rank::Five) => 5,
        (_, Rank::Six) => 6,
        (_, Rank::Seven) => 7,
        (_, Rank::Eight) => 8,
        (_, Rank::Nine) => 9,
        (_, Rank::Ten) => 10,
        (_, Rank::Jack) => 10,
        (_, Rank::Queen) => 10,
        (Suit::Hearts | Suit::Diamonds, Rank::King) => -1,
        (Suit::Clubs | Suit::Spades, Rank::King) => 10,
        (Suit::Joker, Rank::King) => unreachable!("joker suit never pairs with King"),
    }
}

/// The rule a card triggers when discarded off the draw, or `None`.
pub fn rule_type(card: &Card) -> Option<RuleType> {
    match (card.suit, card.rank) {
        (_, Rank::Seven | Rank::Eight) => Some(RuleType::PeekOwn),
        (_, Rank::Nine | Rank::Ten) => Some(RuleType::PeekOther),
        (_, Rank::Jack | Rank::Queen) => Some(RuleType::BlindSwitch),
        (Suit::Clubs | Suit::Spades, Rank::King) => Some(RuleType::BlackKing),
        _ => None,
    }
}

const RANKS: [Rank; 13] = [
    Rank::Ace, Rank::Two, Rank::Three, Rank::Four, Rank::Five, Rank::Six, Rank::Seven,
    Rank::Eight, Rank::Nine, Rank::Ten, Rank::Jack, Rank::Queen, Rank::King,
];
const SUITS: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

/// A 54-card deck: the standard 52 plus two distinguishable jokers.
#[derive(Clone, Debug)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Builds a fresh, unshuffled 54-card deck with stable ids.
    pub fn fresh() -> Self {
        let mut cards = Vec::with_capacity(54);
        let mut id = 0u8;
        for suit in SUITS {
            for rank in RANKS {
                cards.push(Card { suit, rank, id });
                id += 1;
            }
        }
        cards.push(Card { suit: Suit::Joker, rank: Rank::Joker, id });
        id += 1;
        cards.push(Card { suit: Suit::Joker, rank: Rank::Joker, id });
        Deck { cards }
    }

    /// Builds a freshly shuffled 54-card deck, Fisher-Yates over `rng`.
    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut deck = Self::fresh();
        deck.cards.shuffle(rng);
        deck
    }

    /// Removes and returns the last card, or `EmptyDeck` if none remain.
    pub fn draw(&mut self) -> Result<Card, EmptyDeck> {
        self.cards.pop().ok_or(EmptyDeck)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_classification_matches_spec() {
        let black_king = Card { suit: Suit::Spades, rank: Rank::King, id: 0 };
        let red_king = Card { suit: Suit::Hearts, rank: Rank::King, id: 1 };
        let joker = Card { suit: Suit::Joker, rank: Rank::Joker, id: 2 };

        assert_eq!(rule_type(&black_king), Some(RuleType::BlackKing));
        assert_eq!(rule_type(&red_king), None);
        assert_eq!(point_value(&red_king), -1);
        assert_eq!(point_value(&black_king), 10);
        assert_eq!(point_value(&joker), 0);
    }

    #[test]
    fn fresh_deck_has_54_unique_ids() {
        let deck = Deck::fresh();
        assert_eq!(deck.len(), 54);
        let mut ids: Vec<u8> = deck.cards().iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 54);
    }

    #[test]
    fn draw_empties_and_then_fails() {
        let mut deck = Deck::fresh();
        for _ in 0..54 {
            assert!(deck.draw().is_ok());
        }
        assert_eq!(deck.draw(), Err(EmptyDeck));
    }
}
