//! Application orchestration layer for Scriptora.

pub mod catalog;
pub mod reader;

use scriptora_core::{Book, BookDraft, Chapter, ChapterFields, Settings};

pub use catalog::{CatalogView, PAGE_SIZE};
pub use reader::{FullscreenHost, ReaderSession, ReaderState};

/// Document store for books and their chapters.
pub trait BookRepository {
    /// No particular order is promised.
    fn list_books(&self) -> anyhow::Result<Vec<Book>>;
    fn get_book(&self, book_id: &str) -> anyhow::Result<Option<Book>>;
    fn create_book(&self, draft: &BookDraft) -> anyhow::Result<Book>;
    fn update_book(&self, book_id: &str, draft: &BookDraft) -> anyhow::Result<()>;
    fn delete_book(&self, book_id: &str) -> anyhow::Result<()>;

    fn list_chapters(&self, book_id: &str) -> anyhow::Result<Vec<Chapter>>;
    fn create_chapter(&self, book_id: &str, title: &str, content: &str) -> anyhow::Result<Chapter>;
    fn update_chapter(
        &self,
        book_id: &str,
        chapter_id: &str,
        fields: &ChapterFields,
    ) -> anyhow::Result<()>;
    fn delete_chapter(&self, book_id: &str, chapter_id: &str) -> anyhow::Result<()>;

    fn increment_view_count(&self, book_id: &str) -> anyhow::Result<()>;
}

/// Last-read chapter index, keyed by book id.
pub trait BookmarkStore {
    fn get_bookmark(&self, book_id: &str) -> anyhow::Result<Option<usize>>;
    fn set_bookmark(&self, book_id: &str, index: usize) -> anyhow::Result<()>;
}

/// Bumps a view counter without letting a failure reach the caller.
pub fn record_view(repo: &dyn BookRepository, book_id: &str) {
    if let Err(err) = repo.increment_view_count(book_id) {
        tracing::warn!(book_id, "increment view count: {err:#}");
    }
}

/// Hands out tickets for in-flight loads. Only the newest ticket is
/// current; results carrying an older one belong to a view that has
/// already moved on and must be dropped.
#[derive(Debug, Default)]
pub struct FetchGeneration {
    current: u64,
}

impl FetchGeneration {
    pub fn begin(&mut self) -> u64 {
        self.current = self.current.wrapping_add(1);
        self.current
    }

    /// Invalidates whatever is in flight.
    pub fn cancel(&mut self) {
        self.current = self.current.wrapping_add(1);
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        ticket == self.current
    }
}

#[derive(Debug, Clone)]
pub struct AppContext {
    pub settings: Settings,
    pub books: Vec<Book>,
    pub catalog: CatalogView,
    /// Position within the visible page.
    pub selected: usize,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        let catalog = CatalogView::default().with_sort(settings.default_sort);
        Self {
            settings,
            books: Vec::new(),
            catalog,
            selected: 0,
        }
    }

    pub fn with_books(mut self, books: Vec<Book>) -> Self {
        self.replace_books(books);
        self
    }

    pub fn replace_books(&mut self, books: Vec<Book>) {
        self.books = books;
        self.catalog.clamp_page(&self.books);
        self.clamp_selection();
    }

    pub fn visible_books(&self) -> Vec<&Book> {
        self.catalog.visible(&self.books)
    }

    pub fn selected_book(&self) -> Option<&Book> {
        self.visible_books().get(self.selected).copied()
    }

    pub fn genres(&self) -> Vec<String> {
        catalog::known_genres(&self.books)
    }

    pub fn clamp_selection(&mut self) {
        let len = self.visible_books().len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    /// Moves the page and cursor onto `book_id` if it still matches the
    /// current filters.
    pub fn select_book(&mut self, book_id: &str) -> bool {
        let Some(position) = self
            .catalog
            .matching(&self.books)
            .iter()
            .position(|book| book.id == book_id)
        else {
            self.clamp_selection();
            return false;
        };
        self.catalog.current_page = position / PAGE_SIZE + 1;
        self.selected = position % PAGE_SIZE;
        true
    }

    pub fn select_next(&mut self) {
        let len = self.visible_books().len();
        if self.selected + 1 < len {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.catalog.set_search_term(term);
        self.selected = 0;
    }

    pub fn toggle_genre(&mut self, genre: &str) {
        self.catalog.toggle_genre(genre);
        self.selected = 0;
    }

    pub fn cycle_sort(&mut self) {
        self.catalog.cycle_sort();
        self.selected = 0;
    }

    pub fn next_page(&mut self) {
        if self.catalog.next_page(&self.books) {
            self.selected = 0;
        }
    }

    pub fn prev_page(&mut self) {
        if self.catalog.prev_page() {
            self.selected = 0;
        }
    }

    /// Back to the default view, keeping the configured sort.
    pub fn reset_catalog(&mut self) {
        self.catalog = catalog::reset_filters().with_sort(self.settings.default_sort);
        self.selected = 0;
    }
}
