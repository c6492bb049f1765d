//! In-memory ordered flashcard store with push-based change notification.
//!
//! [`flashcards::FlashcardStore`] owns the deck and keeps its sort orders
//! unique, non-negative and tightly bounded. [`subject::Subject`] republishes
//! the store's state to subscribers synchronously on every committed write.

pub mod flashcards;
pub mod subject;

pub use flashcards::{
    CardId, ConfigError, Flashcard, FlashcardRepository, FlashcardStore, FlashcardStoreError,
    InvariantCheckMode, InvariantViolation, StoreConfig,
};
pub use subject::{Observable, Subject, Subscription};
