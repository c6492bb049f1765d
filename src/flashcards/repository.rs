//! Domain-level operations over a shared `FlashcardStore`
//!
//! The repository decides where new cards go (append, prepend) and runs the
//! deck-wide reorderings. Cloned repositories share one store.
//!
//! Subscriber callbacks run after the store borrow is released, so they may
//! read through the repository. A write started from inside a callback is
//! refused with `FlashcardStoreError::Busy`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rand::Rng;

use super::models::{CardId, Flashcard};
use super::ordering;
use super::storage::{FlashcardStore, FlashcardStoreError, InvariantViolation, Publication, Result};
use crate::subject::Observable;

struct Shared {
    store: RefCell<FlashcardStore>,
    publishing: Cell<bool>,
}

/// Clears the publishing flag even if a subscriber panics
struct PublishGuard<'a>(&'a Cell<bool>);

impl<'a> PublishGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for PublishGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[derive(Clone)]
pub struct FlashcardRepository {
    shared: Rc<Shared>,
}

impl FlashcardRepository {
    pub fn new(store: FlashcardStore) -> Self {
        Self {
            shared: Rc::new(Shared {
                store: RefCell::new(store),
                publishing: Cell::new(false),
            }),
        }
    }

    pub fn from_default() -> Self {
        Self::new(FlashcardStore::from_default())
    }

    // ==================== Reads ====================

    pub fn get(&self, id: CardId) -> Option<Flashcard> {
        self.shared.store.borrow().get(id)
    }

    /// Every card in display order
    pub fn get_all(&self) -> Vec<Flashcard> {
        self.shared.store.borrow().get_all()
    }

    pub fn len(&self) -> usize {
        self.shared.store.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.store.borrow().is_empty()
    }

    pub fn sort_order_bounds(&self) -> Option<(i32, i32)> {
        self.shared.store.borrow().sort_order_bounds()
    }

    pub fn check_invariants(&self) -> std::result::Result<(), InvariantViolation> {
        self.shared.store.borrow().check_invariants()
    }

    pub fn find(&self, id: CardId) -> Observable<Option<Flashcard>> {
        self.shared.store.borrow_mut().subscribe_to_entity(id)
    }

    pub fn find_all(&self) -> Observable<Vec<Flashcard>> {
        self.shared.store.borrow().subscribe_to_all()
    }

    // ==================== Writes ====================

    /// Store the card as given, sort order included
    pub fn save(&self, card: Flashcard) -> Result<()> {
        self.write("save", |store| store.write_all(std::iter::once(card)))
    }

    pub fn save_all(&self, cards: Vec<Flashcard>) -> Result<()> {
        self.write("save_all", |store| store.write_all(cards))
    }

    /// Place the card after the current last card
    pub fn append(&self, card: Flashcard) -> Result<()> {
        self.write("append", |store| {
            let sort_order = match store.sort_order_bounds() {
                None => 0,
                Some((_, max)) => max.checked_add(1).ok_or(
                    FlashcardStoreError::SortOrderOverflow {
                        sort_order: max,
                        by: 1,
                    },
                )?,
            };
            store.write_all(std::iter::once(card.with_sort_order(sort_order)))
        })
    }

    /// Shift every card up by one, then place the card just below the new
    /// minimum. Observers see the shift and the insert as two writes.
    pub fn prepend(&self, card: Flashcard) -> Result<()> {
        let bounds = self.shared.store.borrow().sort_order_bounds();
        let Some((_, max)) = bounds else {
            return self.save(card.with_sort_order(0));
        };

        self.write("prepend", |store| store.write_shift(0, max, 1))?;
        self.write("prepend", |store| {
            let min = store.min_sort_order();
            let sort_order = min
                .checked_sub(1)
                .ok_or(FlashcardStoreError::SortOrderOverflow { sort_order: min, by: -1 })?;
            store.write_all(std::iter::once(card.with_sort_order(sort_order)))
        })
    }

    pub fn remove(&self, id: CardId) -> Result<()> {
        self.write("remove", |store| store.write_remove(id))
    }

    /// Shift sort orders in `from..=to` by `by`; see
    /// `FlashcardStore::shift_sort_orders`
    pub fn shift_sort_orders(&self, from: i32, to: i32, by: i32) -> Result<()> {
        self.write("shift_sort_orders", |store| store.write_shift(from, to, by))
    }

    /// Rotate the deck by `k` display positions
    pub fn rotate(&self, k: i64) -> Result<()> {
        self.write("rotate", |store| {
            let rotated = ordering::rotate(&store.get_all(), k);
            store.write_all(rotated)
        })
    }

    pub fn shuffle(&self) -> Result<()> {
        self.shuffle_with(&mut rand::thread_rng())
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<()> {
        self.write("shuffle", |store| {
            let shuffled = ordering::shuffle(&store.get_all(), rng);
            store.write_all(shuffled)
        })
    }

    /// Run one store write, then publish with the store borrow released.
    fn write<F>(&self, op: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut FlashcardStore) -> Result<Publication>,
    {
        if self.shared.publishing.get() {
            log::warn!("{}: refused, a previous write is still publishing", op);
            return Err(FlashcardStoreError::Busy);
        }

        let publication = {
            let mut store = self
                .shared
                .store
                .try_borrow_mut()
                .map_err(|_| FlashcardStoreError::Busy)?;
            f(&mut *store)?
        };

        let _guard = PublishGuard::enter(&self.shared.publishing);
        publication.send();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashcards::models::default_cards;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn display(repo: &FlashcardRepository) -> Vec<(Option<CardId>, i32)> {
        repo.get_all()
            .iter()
            .map(|c| (c.id(), c.sort_order()))
            .collect()
    }

    #[test]
    fn test_append_to_default_deck() {
        let repo = FlashcardRepository::from_default();

        repo.append(Flashcard::unsaved("YAGNI", "You Aren't Gonna Need It"))
            .unwrap();

        let card = repo.get(6).unwrap();
        assert_eq!(card.sort_order(), 6);
        assert_eq!(card.front(), "YAGNI");
    }

    #[test]
    fn test_prepend_to_default_deck() {
        let repo = FlashcardRepository::from_default();

        repo.prepend(Flashcard::unsaved("DRY", "Don't Repeat Yourself"))
            .unwrap();

        assert_eq!(
            display(&repo),
            vec![
                (Some(6), 0),
                (Some(0), 1),
                (Some(1), 2),
                (Some(2), 3),
                (Some(3), 4),
                (Some(4), 5),
                (Some(5), 6),
            ]
        );
    }

    #[test]
    fn test_prepend_publishes_shift_then_insert() {
        let repo = FlashcardRepository::from_default();
        let lengths = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&lengths);
        let _sub = repo
            .find_all()
            .subscribe(move |cards: &Vec<Flashcard>| sink.borrow_mut().push(cards.len()));

        repo.prepend(Flashcard::unsaved("DRY", "Don't Repeat Yourself"))
            .unwrap();

        assert_eq!(*lengths.borrow(), vec![6, 6, 7]);
    }

    #[test]
    fn test_append_and_prepend_on_empty_store() {
        let repo = FlashcardRepository::new(FlashcardStore::new());

        repo.append(Flashcard::unsaved("a", "a")).unwrap();
        assert_eq!(display(&repo), vec![(Some(0), 0)]);

        repo.remove(0).unwrap();
        repo.prepend(Flashcard::unsaved("b", "b")).unwrap();
        assert_eq!(display(&repo), vec![(Some(1), 0)]);
    }

    #[test]
    fn test_remove_via_repository() {
        let repo = FlashcardRepository::from_default();

        repo.remove(2).unwrap();

        assert_eq!(
            display(&repo),
            vec![(Some(0), 0), (Some(1), 1), (Some(3), 2), (Some(4), 3), (Some(5), 4)]
        );
        assert_eq!(repo.remove(2), Err(FlashcardStoreError::CardNotFound(2)));
    }

    #[test]
    fn test_rotate_moves_front_card_to_back() {
        let repo = FlashcardRepository::from_default();

        repo.rotate(1).unwrap();

        let ids: Vec<_> = repo.get_all().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![Some(5), Some(0), Some(1), Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn test_rotate_by_extreme_offset() {
        let repo = FlashcardRepository::from_default();

        repo.rotate(i64::MAX).unwrap();
        repo.rotate(i64::MIN).unwrap();

        // MAX and MIN reduce to +1 and -2 on six cards.
        let ids: Vec<_> = repo.get_all().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![Some(1), Some(2), Some(3), Some(4), Some(5), Some(0)]);
    }

    #[test]
    fn test_shift_sort_orders_via_repository() {
        let repo = FlashcardRepository::from_default();

        repo.shift_sort_orders(4, 5, 2).unwrap();
        assert_eq!(repo.sort_order_bounds(), Some((0, 7)));

        let err = repo.shift_sort_orders(0, 3, 3).unwrap_err();
        assert!(matches!(err, FlashcardStoreError::InvariantViolation(_)));
        assert_eq!(repo.sort_order_bounds(), Some((0, 7)));
    }

    #[test]
    fn test_shuffle_with_seed_keeps_deck() {
        let repo = FlashcardRepository::from_default();

        repo.shuffle_with(&mut StdRng::seed_from_u64(3)).unwrap();

        let mut orders: Vec<_> = repo.get_all().iter().map(Flashcard::sort_order).collect();
        orders.sort_unstable();
        assert_eq!(orders, vec![0, 1, 2, 3, 4, 5]);
        let mut ids: Vec<_> = repo.get_all().iter().filter_map(Flashcard::id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_find_replays_current_card() {
        let repo = FlashcardRepository::from_default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let _sub = repo
            .find(4)
            .subscribe(move |card: &Option<Flashcard>| sink.borrow_mut().push(card.clone()));

        assert_eq!(*seen.borrow(), vec![Some(default_cards()[4].clone())]);
    }

    #[test]
    fn test_callback_may_read_but_not_write() {
        let repo = FlashcardRepository::from_default();
        let outcomes = Rc::new(RefCell::new(Vec::new()));

        let inner = repo.clone();
        let sink = Rc::clone(&outcomes);
        let _sub = repo.find_all().subscribe(move |cards: &Vec<Flashcard>| {
            if cards.len() == 7 {
                let read = inner.len();
                let write = inner.append(Flashcard::unsaved("nested", "write"));
                sink.borrow_mut().push((read, write));
            }
        });

        repo.append(Flashcard::unsaved("x", "y")).unwrap();

        assert_eq!(*outcomes.borrow(), vec![(7, Err(FlashcardStoreError::Busy))]);
        assert_eq!(repo.len(), 7);
        // Writes work again once publishing is done.
        repo.append(Flashcard::unsaved("after", "publish")).unwrap();
        assert_eq!(repo.len(), 8);
    }

    #[test]
    fn test_rejected_save_reports_violation() {
        let repo = FlashcardRepository::from_default();

        let err = repo
            .save(Flashcard::unsaved("clash", "clash").with_sort_order(0))
            .unwrap_err();

        assert!(matches!(err, FlashcardStoreError::InvariantViolation(_)));
        assert_eq!(repo.get_all(), default_cards());
    }
}
