//! Data models for the flashcard store

use serde::{Deserialize, Serialize};

/// Stable identity of a stored flashcard
pub type CardId = u32;

/// A flashcard with question (front), answer (back) and display position.
///
/// Values are immutable: the `with_*` methods return a modified copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<CardId>,
    front: String,
    back: String,
    #[serde(default)]
    sort_order: i32,
}

impl Flashcard {
    pub fn new(id: Option<CardId>, front: impl Into<String>, back: impl Into<String>, sort_order: i32) -> Self {
        Self {
            id,
            front: front.into(),
            back: back.into(),
            sort_order,
        }
    }

    /// A card that has not been stored yet; the store assigns its id.
    pub fn unsaved(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self::new(None, front, back, 0)
    }

    pub fn id(&self) -> Option<CardId> {
        self.id
    }

    pub fn front(&self) -> &str {
        &self.front
    }

    pub fn back(&self) -> &str {
        &self.back
    }

    pub fn sort_order(&self) -> i32 {
        self.sort_order
    }

    pub fn with_id(&self, id: CardId) -> Self {
        Self {
            id: Some(id),
            ..self.clone()
        }
    }

    pub fn with_sort_order(&self, sort_order: i32) -> Self {
        Self {
            sort_order,
            ..self.clone()
        }
    }

    pub fn with_front(&self, front: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            ..self.clone()
        }
    }

    pub fn with_back(&self, back: impl Into<String>) -> Self {
        Self {
            back: back.into(),
            ..self.clone()
        }
    }
}

/// Front/back pairs of the default deck, in sort order.
const DEFAULT_CARD_TEXT: [(&str, &str); 6] = [
    ("SRP", "Single Responsibility Principle"),
    ("OCP", "Open-Closed Principle"),
    ("LSP", "Liskov Substitution Principle"),
    ("ISP", "Interface Segregation Principle"),
    ("DIP", "Dependency Inversion Principle"),
    ("LKP", "Least Knowledge Principle (Law of Demeter)"),
];

/// The seed deck: ids 0..=5 with matching sort orders 0..=5.
pub fn default_cards() -> Vec<Flashcard> {
    DEFAULT_CARD_TEXT
        .iter()
        .zip(0..)
        .map(|((front, back), i)| Flashcard::new(Some(i as CardId), *front, *back, i))
        .collect()
}
