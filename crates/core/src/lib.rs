//! Core domain types for Scriptora.

use serde::{Deserialize, Serialize};

mod error;

pub use error::LibraryError;

pub const DEFAULT_FEED_TITLE: &str = "Scriptora";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: Theme,
    pub default_sort: SortKey,
    pub site_url: String,
    pub feed_title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

/// Catalog ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Title,
    TotalChapters,
    Views,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Theme {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err("unknown theme"),
        }
    }
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Title => "title",
            SortKey::TotalChapters => "total_chapters",
            SortKey::Views => "views",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortKey::Title => "title",
            SortKey::TotalChapters => "chapters",
            SortKey::Views => "views",
        }
    }

    pub fn next(self) -> Self {
        match self {
            SortKey::Title => SortKey::TotalChapters,
            SortKey::TotalChapters => SortKey::Views,
            SortKey::Views => SortKey::Title,
        }
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortKey {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(SortKey::Title),
            "total_chapters" | "totalchapters" | "chapters" => Ok(SortKey::TotalChapters),
            "views" => Ok(SortKey::Views),
            _ => Err("unknown sort key"),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            default_sort: SortKey::Title,
            site_url: String::new(),
            feed_title: DEFAULT_FEED_TITLE.to_string(),
        }
    }
}

impl Settings {
    pub fn normalize(&mut self) {
        self.site_url = self.site_url.trim().trim_end_matches('/').to_string();
        self.feed_title = self.feed_title.trim().to_string();
        if self.feed_title.is_empty() {
            self.feed_title = DEFAULT_FEED_TITLE.to_string();
        }
    }

    pub fn cycle_theme(&mut self) {
        self.theme = match self.theme {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        };
    }

    pub fn cycle_default_sort(&mut self) {
        self.default_sort = self.default_sort.next();
    }
}

/// Catalog-side projection of a published book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub synopsis: String,
    pub cover_image: String,
    pub total_chapters: u32,
    /// Unix milliseconds.
    pub created_at: i64,
    #[serde(default)]
    pub views: u64,
}

/// Author input for creating or editing a book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookDraft {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub synopsis: String,
    pub cover_image: String,
}

impl BookDraft {
    pub fn validate(&self) -> Result<(), LibraryError> {
        if self.title.trim().is_empty() {
            return Err(LibraryError::Validation("book title is required".to_string()));
        }
        if self.author.trim().is_empty() {
            return Err(LibraryError::Validation("author is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Unix milliseconds. Reading order is ascending by this field.
    pub created_at: i64,
}

/// Partial chapter update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterFields {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl ChapterFields {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }

    pub fn validate(&self) -> Result<(), LibraryError> {
        match self.title.as_deref() {
            Some(title) => validate_chapter_title(title),
            None => Ok(()),
        }
    }
}

pub fn validate_chapter_title(title: &str) -> Result<(), LibraryError> {
    if title.trim().is_empty() {
        Err(LibraryError::Validation(
            "chapter title is required".to_string(),
        ))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current_chapter: usize,
    pub total_chapters: usize,
}

impl Progress {
    /// Fraction in `[0, 1]`; `(index + 1) / len` while reading.
    pub fn fraction(&self) -> f32 {
        if self.total_chapters == 0 {
            0.0
        } else {
            self.current_chapter as f32 / self.total_chapters as f32
        }
    }

    pub fn percent(&self) -> f32 {
        self.fraction() * 100.0
    }
}

pub fn unix_now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
