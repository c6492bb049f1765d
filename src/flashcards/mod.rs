//! Ordered flashcard deck
//!
//! This module provides:
//! - The immutable `Flashcard` value and the default deck
//! - `FlashcardStore`, an in-memory store that keeps sort orders unique,
//!   non-negative and tightly bounded
//! - Rotate and shuffle reorderings
//! - `FlashcardRepository`, the append/prepend/remove facade
//! - Store configuration

pub mod config;
pub mod models;
pub mod ordering;
pub mod repository;
pub mod storage;

pub use config::{ConfigError, InvariantCheckMode, StoreConfig};
pub use models::*;
pub use repository::FlashcardRepository;
pub use storage::{FlashcardStore, FlashcardStoreError, InvariantViolation};
