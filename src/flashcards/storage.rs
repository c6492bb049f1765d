//! In-memory flashcard store
//!
//! `FlashcardStore` owns every stored card and keeps the sort orders
//! consistent. After each public write returns:
//!
//! - every sort order is non-negative,
//! - no two cards share a sort order,
//! - `min_sort_order`/`max_sort_order` are the exact bounds of the stored
//!   sort orders (`i32::MAX`/`i32::MIN` when empty),
//! - every card is stored under its own id.
//!
//! Writes are staged against a copy of the card map and validated before
//! anything is committed, so a rejected write changes nothing and publishes
//! nothing. Committed writes publish to the per-card subjects of the
//! affected cards, then to the collection subject.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;

use super::config::{InvariantCheckMode, StoreConfig};
use super::models::{default_cards, CardId, Flashcard};
use crate::subject::{Observable, Subject};

/// A post-write check that failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("card {id} has negative sort order {sort_order}")]
    NegativeSortOrder { id: CardId, sort_order: i32 },

    #[error("cards {first} and {second} share sort order {sort_order}")]
    DuplicateSortOrder {
        sort_order: i32,
        first: CardId,
        second: CardId,
    },

    #[error("cached sort order bounds {cached:?} do not match the stored cards, expected {actual:?}")]
    BoundsMismatch {
        cached: (i32, i32),
        actual: (i32, i32),
    },

    #[error("card stored under id {key} carries id {found:?}")]
    IdentityMismatch { key: CardId, found: Option<CardId> },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlashcardStoreError {
    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    #[error("Invariant violation: {0}")]
    InvariantViolation(#[from] InvariantViolation),

    #[error("Sort order {sort_order} overflows when shifted by {by}")]
    SortOrderOverflow { sort_order: i32, by: i32 },

    #[error("Card ids exhausted")]
    IdsExhausted,

    #[error("Store is busy publishing a previous write")]
    Busy,
}

pub type Result<T> = std::result::Result<T, FlashcardStoreError>;

/// Values produced by a committed write, waiting to be delivered.
///
/// Kept separate from the write itself so a caller holding the store behind a
/// `RefCell` can release its borrow before subscriber callbacks run.
#[must_use = "a Publication does nothing until it is sent"]
pub(crate) struct Publication {
    cards: Vec<(Subject<Option<Flashcard>>, Option<Flashcard>)>,
    all: Subject<Vec<Flashcard>>,
    snapshot: Vec<Flashcard>,
}

impl Publication {
    pub(crate) fn send(self) {
        for (subject, value) in self.cards {
            subject.set(value);
        }
        self.all.set(self.snapshot);
    }
}

/// Working copy of the mutable state for one write
struct Staged {
    cards: BTreeMap<CardId, Flashcard>,
    next_id: CardId,
}

impl Staged {
    /// Give an id to a card that lacks one, and keep `next_id` ahead of any
    /// explicit id so it is never handed out again.
    fn assign_id(&mut self, card: Flashcard) -> Result<(CardId, Flashcard)> {
        match card.id() {
            None => {
                let id = self.next_id;
                self.next_id = id.checked_add(1).ok_or(FlashcardStoreError::IdsExhausted)?;
                Ok((id, card.with_id(id)))
            }
            Some(id) => {
                if id >= self.next_id {
                    self.next_id = id.checked_add(1).ok_or(FlashcardStoreError::IdsExhausted)?;
                }
                Ok((id, card))
            }
        }
    }
}

/// In-memory store of flashcards with tracked sort order bounds.
#[derive(Debug)]
pub struct FlashcardStore {
    config: StoreConfig,
    cards: BTreeMap<CardId, Flashcard>,
    next_id: CardId,
    min_sort_order: i32,
    max_sort_order: i32,
    card_subjects: HashMap<CardId, Subject<Option<Flashcard>>>,
    all_subject: Subject<Vec<Flashcard>>,
}

impl Default for FlashcardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashcardStore {
    /// An empty store with the default configuration
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Store seeded with the default deck (ids and sort orders 0..=5)
    pub fn from_default() -> Self {
        Self::with_config(StoreConfig {
            seed_defaults: true,
            ..StoreConfig::default()
        })
    }

    pub fn with_config(config: StoreConfig) -> Self {
        let seed = config.seed_defaults;
        let mut store = Self {
            config,
            cards: BTreeMap::new(),
            next_id: 0,
            min_sort_order: i32::MAX,
            max_sort_order: i32::MIN,
            card_subjects: HashMap::new(),
            all_subject: Subject::new(),
        };
        if seed {
            // default deck is valid
            store
                .put_all(default_cards())
                .expect("default deck satisfies the sort order invariants");
        }
        store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ==================== Reads ====================

    pub fn get(&self, id: CardId) -> Option<Flashcard> {
        self.cards.get(&id).cloned()
    }

    /// Snapshot of every card, in ascending sort order
    pub fn get_all(&self) -> Vec<Flashcard> {
        let mut cards: Vec<Flashcard> = self.cards.values().cloned().collect();
        cards.sort_by_key(Flashcard::sort_order);
        cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// The id the next card without one will receive
    pub fn next_id(&self) -> CardId {
        self.next_id
    }

    /// Smallest stored sort order, `i32::MAX` when empty
    pub fn min_sort_order(&self) -> i32 {
        self.min_sort_order
    }

    /// Largest stored sort order, `i32::MIN` when empty
    pub fn max_sort_order(&self) -> i32 {
        self.max_sort_order
    }

    pub fn sort_order_bounds(&self) -> Option<(i32, i32)> {
        if self.cards.is_empty() {
            None
        } else {
            Some((self.min_sort_order, self.max_sort_order))
        }
    }

    /// Re-run the full invariant check against the committed state,
    /// including the cached bounds
    pub fn check_invariants(&self) -> std::result::Result<(), InvariantViolation> {
        check_cards(&self.cards)?;
        check_bounds(&self.cards, (self.min_sort_order, self.max_sort_order))
    }

    // ==================== Subscriptions ====================

    /// Observable for one card. Created on first request and seeded with the
    /// card's current value (`None` if absent); it publishes `None` when the
    /// card is removed and keeps working if the id is stored again.
    pub fn subscribe_to_entity(&mut self, id: CardId) -> Observable<Option<Flashcard>> {
        let current = self.get(id);
        self.card_subjects
            .entry(id)
            .or_insert_with(|| Subject::with_value(current))
            .observable()
    }

    /// Observable for the whole deck, in ascending sort order
    pub fn subscribe_to_all(&self) -> Observable<Vec<Flashcard>> {
        self.all_subject.observable()
    }

    // ==================== Writes ====================

    /// Insert or replace one card
    pub fn put(&mut self, card: Flashcard) -> Result<()> {
        self.put_all(std::iter::once(card))
    }

    /// Insert or replace a batch of cards as one write.
    ///
    /// The batch must leave the whole store with unique, non-negative sort
    /// orders; the store validates but does not resolve conflicts.
    pub fn put_all<I>(&mut self, cards: I) -> Result<()>
    where
        I: IntoIterator<Item = Flashcard>,
    {
        self.write_all(cards).map(Publication::send)
    }

    /// Remove a card and close the gap it leaves in the sort orders
    pub fn remove(&mut self, id: CardId) -> Result<()> {
        self.write_remove(id).map(Publication::send)
    }

    /// Add `by` to the sort order of every card whose sort order lies in
    /// `from..=to`, as one write.
    pub fn shift_sort_orders(&mut self, from: i32, to: i32, by: i32) -> Result<()> {
        self.write_shift(from, to, by).map(Publication::send)
    }

    pub(crate) fn write_all<I>(&mut self, cards: I) -> Result<Publication>
    where
        I: IntoIterator<Item = Flashcard>,
    {
        let mut staged = self.stage();
        let mut affected = Vec::new();

        for card in cards {
            let (id, card) = staged.assign_id(card)?;
            staged.cards.insert(id, card);
            affected.push(id);
        }

        self.commit(staged, &affected, None, "put_all")
    }

    pub(crate) fn write_remove(&mut self, id: CardId) -> Result<Publication> {
        let removed_order = self
            .cards
            .get(&id)
            .map(Flashcard::sort_order)
            .ok_or(FlashcardStoreError::CardNotFound(id))?;

        let mut staged = self.stage();
        staged.cards.remove(&id);

        let shifted = staged
            .cards
            .values()
            .filter(|card| card.sort_order() > removed_order)
            .map(|card| shift_card(card, -1))
            .collect::<Result<Vec<_>>>()?;

        let mut affected = Vec::with_capacity(shifted.len());
        for card in shifted {
            if let Some(card_id) = card.id() {
                affected.push(card_id);
                staged.cards.insert(card_id, card);
            }
        }

        self.commit(staged, &affected, Some(id), "remove")
    }

    pub(crate) fn write_shift(&mut self, from: i32, to: i32, by: i32) -> Result<Publication> {
        let shifted = self
            .cards
            .values()
            .filter(|card| (from..=to).contains(&card.sort_order()))
            .map(|card| shift_card(card, by))
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "shift_sort_orders: {} card(s) in [{}, {}] by {}",
            shifted.len(),
            from,
            to,
            by
        );
        self.write_all(shifted)
    }

    fn stage(&self) -> Staged {
        Staged {
            cards: self.cards.clone(),
            next_id: self.next_id,
        }
    }

    /// Validate the staged state, swap it in and collect what to publish.
    fn commit(
        &mut self,
        staged: Staged,
        affected: &[CardId],
        removed: Option<CardId>,
        op: &str,
    ) -> Result<Publication> {
        let bounds = sort_order_bounds(&staged.cards);

        if self.config.checks_enabled() {
            if let Err(violation) = check_cards(&staged.cards) {
                match self.config.invariant_checks {
                    InvariantCheckMode::Always => {
                        log::warn!("{}: rejected write: {}", op, violation);
                        return Err(violation.into());
                    }
                    InvariantCheckMode::DebugAssert => {
                        panic!("{}: flashcard store invariant violated: {}", op, violation);
                    }
                }
            }
        }

        self.cards = staged.cards;
        self.next_id = staged.next_id;
        (self.min_sort_order, self.max_sort_order) = bounds.unwrap_or((i32::MAX, i32::MIN));

        log::debug!(
            "{}: committed {} card(s){}, {} stored, bounds {:?}",
            op,
            affected.len(),
            removed.map(|id| format!(", removed {}", id)).unwrap_or_default(),
            self.cards.len(),
            bounds
        );

        Ok(self.publication(affected, removed))
    }

    fn publication(&self, affected: &[CardId], removed: Option<CardId>) -> Publication {
        let mut seen = BTreeSet::new();
        let mut cards = Vec::new();

        for &id in affected {
            if !seen.insert(id) {
                continue;
            }
            if let Some(subject) = self.card_subjects.get(&id) {
                cards.push((subject.clone(), self.get(id)));
            }
        }
        if let Some(id) = removed {
            if let Some(subject) = self.card_subjects.get(&id) {
                cards.push((subject.clone(), None));
            }
        }

        Publication {
            cards,
            all: self.all_subject.clone(),
            snapshot: self.get_all(),
        }
    }
}

fn shift_card(card: &Flashcard, by: i32) -> Result<Flashcard> {
    let sort_order = card.sort_order();
    sort_order
        .checked_add(by)
        .map(|shifted| card.with_sort_order(shifted))
        .ok_or(FlashcardStoreError::SortOrderOverflow { sort_order, by })
}

fn sort_order_bounds(cards: &BTreeMap<CardId, Flashcard>) -> Option<(i32, i32)> {
    cards.values().map(Flashcard::sort_order).fold(None, |acc, s| match acc {
        None => Some((s, s)),
        Some((min, max)) => Some((min.min(s), max.max(s))),
    })
}

/// Identity, non-negativity and uniqueness. Bounds are derived from the
/// same map on the write path, so they are checked separately.
fn check_cards(cards: &BTreeMap<CardId, Flashcard>) -> std::result::Result<(), InvariantViolation> {
    let mut owners: HashMap<i32, CardId> = HashMap::with_capacity(cards.len());

    for (&key, card) in cards {
        if card.id() != Some(key) {
            return Err(InvariantViolation::IdentityMismatch {
                key,
                found: card.id(),
            });
        }
        let sort_order = card.sort_order();
        if sort_order < 0 {
            return Err(InvariantViolation::NegativeSortOrder { id: key, sort_order });
        }
        if let Some(first) = owners.insert(sort_order, key) {
            return Err(InvariantViolation::DuplicateSortOrder {
                sort_order,
                first,
                second: key,
            });
        }
    }

    Ok(())
}

fn check_bounds(
    cards: &BTreeMap<CardId, Flashcard>,
    cached: (i32, i32),
) -> std::result::Result<(), InvariantViolation> {
    let actual = sort_order_bounds(cards).unwrap_or((i32::MAX, i32::MIN));
    if cached == actual {
        Ok(())
    } else {
        Err(InvariantViolation::BoundsMismatch { cached, actual })
    }
}
