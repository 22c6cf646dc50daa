use thiserror::Error;

/// Domain failures that the UI recovers from locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LibraryError {
    /// Rejected before any write reaches storage.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl LibraryError {
    pub fn book_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "book",
            id: id.into(),
        }
    }

    pub fn chapter_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "chapter",
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
