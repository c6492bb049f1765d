//! Reordering algorithms over a whole deck
//!
//! Both functions return new cards carrying the same ids, text and set of
//! sort orders as the input; only the assignment of sort orders to cards
//! changes. The result is meant to be written back with
//! `FlashcardStore::put_all`.
//!
//! Pass cards in display order (ascending sort order, as returned by
//! `FlashcardStore::get_all`) for `rotate` to mean "rotate by k positions".

use rand::seq::SliceRandom;
use rand::Rng;

use super::models::Flashcard;

/// Give the card at position `i` the sort order held by the card at
/// position `(i + k) mod n`. Negative `k` rotates the other way.
pub fn rotate(cards: &[Flashcard], k: i64) -> Vec<Flashcard> {
    let n = cards.len();
    if n == 0 {
        return Vec::new();
    }

    // Reduce first so any i64 offset works without overflow.
    let shift = k.rem_euclid(n as i64) as usize;
    cards
        .iter()
        .enumerate()
        .map(|(i, card)| card.with_sort_order(cards[(i + shift) % n].sort_order()))
        .collect()
}

/// Redistribute the existing sort orders uniformly at random.
pub fn shuffle<R: Rng + ?Sized>(cards: &[Flashcard], rng: &mut R) -> Vec<Flashcard> {
    let mut sort_orders: Vec<i32> = cards.iter().map(Flashcard::sort_order).collect();
    sort_orders.shuffle(rng);

    cards
        .iter()
        .zip(sort_orders)
        .map(|(card, sort_order)| card.with_sort_order(sort_order))
        .collect()
}
