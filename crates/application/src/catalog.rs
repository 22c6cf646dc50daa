//! Search, genre filter, sort and pagination over the in-memory catalog.
//!
//! Every derived list is recomputed from scratch from the raw book list and
//! the view state; nothing is cached between calls.

use std::collections::BTreeSet;

use scriptora_core::{Book, SortKey};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

pub const PAGE_SIZE: usize = 24;

/// Books whose title, author or genre contains `search_term`
/// (case-insensitive, spaces kept) and whose genre is selected. A blank
/// term or an empty genre set matches everything.
pub fn apply_filters<'a>(
    books: &'a [Book],
    search_term: &str,
    selected_genres: &BTreeSet<String>,
) -> Vec<&'a Book> {
    let blank = search_term.trim().is_empty();
    let query = search_term.to_lowercase();
    books
        .iter()
        .filter(|book| {
            selected_genres.is_empty() || selected_genres.contains(book.genre.trim())
        })
        .filter(|book| blank || matches_query(book, &query))
        .collect()
}

fn matches_query(book: &Book, query: &str) -> bool {
    [&book.title, &book.author, &book.genre]
        .iter()
        .any(|field| !field.is_empty() && field.to_lowercase().contains(query))
}

pub fn apply_sort<'a>(mut books: Vec<&'a Book>, sort_key: SortKey) -> Vec<&'a Book> {
    match sort_key {
        SortKey::Title => {
            books.sort_by_cached_key(|book| {
                let lower = book.title.to_lowercase();
                (collation_key(&lower), lower, book.title.clone())
            });
        }
        SortKey::TotalChapters => books.sort_by(|a, b| b.total_chapters.cmp(&a.total_chapters)),
        SortKey::Views => books.sort_by(|a, b| b.views.cmp(&a.views)),
    }
    books
}

/// Accents and compatibility forms fold onto their base letters, so
/// "Émile" sorts among the e's.
fn collation_key(lower: &str) -> String {
    lower.nfkd().filter(|c| !is_combining_mark(*c)).collect()
}

/// The `[(page - 1) * size, page * size)` window. Page 0 and pages past the
/// end yield an empty slice.
pub fn paginate<T>(items: &[T], current_page: usize, page_size: usize) -> &[T] {
    if current_page == 0 || page_size == 0 {
        return &[];
    }
    let start = (current_page - 1).saturating_mul(page_size);
    if start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(page_size).min(items.len());
    &items[start..end]
}

pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 1;
    }
    total.div_ceil(page_size).max(1)
}

pub fn toggle_genre(selected_genres: &BTreeSet<String>, genre: &str) -> BTreeSet<String> {
    let mut next = selected_genres.clone();
    if !next.remove(genre) {
        next.insert(genre.to_string());
    }
    next
}

pub fn reset_filters() -> CatalogView {
    CatalogView::default()
}

/// Distinct trimmed genres present in the catalog, sorted
/// case-insensitively. Case variants stay separate because the genre
/// filter compares exactly.
pub fn known_genres(books: &[Book]) -> Vec<String> {
    let mut genres: Vec<String> = books
        .iter()
        .map(|book| book.genre.trim())
        .filter(|genre| !genre.is_empty())
        .map(str::to_string)
        .collect();
    genres.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    genres.dedup();
    genres
}

/// UI-local catalog state. Any filter mutation sends the view back to page 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogView {
    pub search_term: String,
    pub selected_genres: BTreeSet<String>,
    pub sort_key: SortKey,
    pub current_page: usize,
}

impl Default for CatalogView {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            selected_genres: BTreeSet::new(),
            sort_key: SortKey::Title,
            current_page: 1,
        }
    }
}

impl CatalogView {
    pub fn with_sort(mut self, sort_key: SortKey) -> Self {
        self.sort_key = sort_key;
        self
    }

    pub fn has_filters(&self) -> bool {
        !self.search_term.trim().is_empty() || !self.selected_genres.is_empty()
    }

    /// Filtered and sorted, before pagination.
    pub fn matching<'a>(&self, books: &'a [Book]) -> Vec<&'a Book> {
        let filtered = apply_filters(books, &self.search_term, &self.selected_genres);
        apply_sort(filtered, self.sort_key)
    }

    pub fn visible<'a>(&self, books: &'a [Book]) -> Vec<&'a Book> {
        let sorted = self.matching(books);
        tracing::debug!(
            total = books.len(),
            matching = sorted.len(),
            page = self.current_page,
            sort = %self.sort_key,
            "catalog recomputed"
        );
        paginate(&sorted, self.current_page, PAGE_SIZE).to_vec()
    }

    pub fn page_count(&self, books: &[Book]) -> usize {
        page_count(self.matching(books).len(), PAGE_SIZE)
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
        self.current_page = 1;
    }

    pub fn toggle_genre(&mut self, genre: &str) {
        self.selected_genres = toggle_genre(&self.selected_genres, genre);
        self.current_page = 1;
    }

    pub fn clear_genres(&mut self) {
        self.selected_genres.clear();
        self.current_page = 1;
    }

    pub fn set_sort(&mut self, sort_key: SortKey) {
        self.sort_key = sort_key;
        self.current_page = 1;
    }

    pub fn cycle_sort(&mut self) {
        self.set_sort(self.sort_key.next());
    }

    pub fn next_page(&mut self, books: &[Book]) -> bool {
        if self.current_page < self.page_count(books) {
            self.current_page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev_page(&mut self) -> bool {
        if self.current_page > 1 {
            self.current_page -= 1;
            true
        } else {
            false
        }
    }

    /// Pulls the page back in range after the catalog itself changed.
    pub fn clamp_page(&mut self, books: &[Book]) {
        self.current_page = self.current_page.clamp(1, self.page_count(books));
    }
}
