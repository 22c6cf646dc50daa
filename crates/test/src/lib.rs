//! Test helpers and fixtures.

use std::cell::RefCell;
use std::collections::HashMap;

use scriptora_application::BookmarkStore;
use scriptora_core::{Book, Chapter, Settings, SortKey};

pub const GENRES: [&str; 5] = ["Fantasy", "Sci-Fi", "Mystery", "Romance", "Horror"];

pub fn make_settings(default_sort: SortKey) -> Settings {
    Settings {
        default_sort,
        ..Settings::default()
    }
}

pub fn make_book(id: &str, title: &str, genre: &str, views: u64) -> Book {
    Book {
        id: id.to_string(),
        title: title.to_string(),
        author: format!("Author of {title}"),
        genre: genre.to_string(),
        synopsis: String::new(),
        cover_image: String::new(),
        total_chapters: 0,
        created_at: 0,
        views,
    }
}

/// `count` books cycling through [`GENRES`]; book `i` has `i` views.
pub fn make_books(count: usize) -> Vec<Book> {
    (0..count)
        .map(|i| {
            let mut book = make_book(
                &format!("b{i:02}"),
                &format!("Book {i:02}"),
                GENRES[i % GENRES.len()],
                i as u64,
            );
            book.total_chapters = (i % 7) as u32;
            book.created_at = i as i64 * 1_000;
            book
        })
        .collect()
}

pub fn make_chapter(id: &str, title: &str, created_at: i64) -> Chapter {
    Chapter {
        id: id.to_string(),
        title: title.to_string(),
        content: format!("Text of {title}"),
        created_at,
    }
}

#[derive(Default)]
pub struct MemoryBookmarks {
    marks: RefCell<HashMap<String, usize>>,
}

impl MemoryBookmarks {
    pub fn get(&self, book_id: &str) -> Option<usize> {
        self.marks.borrow().get(book_id).copied()
    }
}

impl BookmarkStore for MemoryBookmarks {
    fn get_bookmark(&self, book_id: &str) -> anyhow::Result<Option<usize>> {
        Ok(self.get(book_id))
    }

    fn set_bookmark(&self, book_id: &str, index: usize) -> anyhow::Result<()> {
        self.marks.borrow_mut().insert(book_id.to_string(), index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use scriptora_application::{AppContext, BookRepository, PAGE_SIZE, ReaderSession, ReaderState};
    use scriptora_core::BookDraft;
    use scriptora_engine::to_html;
    use scriptora_storage::Storage;

    use super::*;

    #[test]
    fn views_sort_pages_through_catalog() {
        let mut ctx = AppContext::new(make_settings(SortKey::Views)).with_books(make_books(30));

        let first: Vec<u64> = ctx.visible_books().iter().map(|b| b.views).collect();
        assert_eq!(first.len(), PAGE_SIZE);
        assert_eq!(first[0], 29);
        assert_eq!(first[PAGE_SIZE - 1], 6);
        assert!(first.windows(2).all(|pair| pair[0] >= pair[1]));

        ctx.next_page();
        let second: Vec<u64> = ctx.visible_books().iter().map(|b| b.views).collect();
        assert_eq!(second, vec![5, 4, 3, 2, 1, 0]);

        ctx.next_page();
        assert_eq!(ctx.catalog.current_page, 2);
    }

    #[test]
    fn genre_and_search_combine() {
        let mut ctx = AppContext::new(Settings::default()).with_books(make_books(30));
        ctx.toggle_genre("Fantasy");
        ctx.toggle_genre("Mystery");
        assert_eq!(ctx.catalog.matching(&ctx.books).len(), 12);

        ctx.set_search_term("  BOOK 2 ");
        let titles: Vec<&str> = ctx.visible_books().iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["Book 20", "Book 22", "Book 25", "Book 27"]);

        ctx.reset_catalog();
        assert_eq!(ctx.visible_books().len(), PAGE_SIZE);
        assert!(ctx.catalog.selected_genres.is_empty());
    }

    #[test]
    fn bookmark_survives_reopening_a_book() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        let book = storage.create_book(&BookDraft {
            title: "Deep Field".to_string(),
            author: "Ada North".to_string(),
            ..BookDraft::default()
        })?;
        for title in ["Ping", "Silence", "Return"] {
            storage.create_chapter(&book.id, title, "…")?;
        }

        let mut session = ReaderSession::new(book.id.clone(), storage.list_chapters(&book.id)?);
        assert_eq!(session.state(), ReaderState::Cover);
        assert_eq!(session.open(&storage), ReaderState::Reading);
        assert_eq!(session.current_index(), 0);
        assert!(session.next());
        assert!(session.next());
        assert!(!session.next());
        session.close(&storage)?;
        assert_eq!(session.state(), ReaderState::Cover);

        let mut reopened = ReaderSession::new(book.id.clone(), storage.list_chapters(&book.id)?);
        reopened.open(&storage);
        let chapter = reopened.current_chapter().map(|c| c.title.clone());
        assert_eq!(chapter.as_deref(), Some("Return"));
        assert_eq!(reopened.progress().map(|p| p.current_chapter), Some(3));
        Ok(())
    }

    #[test]
    fn memory_bookmarks_feed_reader() -> anyhow::Result<()> {
        let bookmarks = MemoryBookmarks::default();
        bookmarks.set_bookmark("b1", 1)?;
        let chapters = vec![
            make_chapter("c2", "Second", 20),
            make_chapter("c1", "First", 10),
        ];
        let mut session = ReaderSession::new("b1", chapters);
        session.open(&bookmarks);
        assert_eq!(session.current_chapter().map(|c| c.id.as_str()), Some("c2"));

        assert!(session.prev());
        session.close(&bookmarks)?;
        assert_eq!(bookmarks.get("b1"), Some(0));
        Ok(())
    }

    #[test]
    fn chapter_markup_renders() {
        assert_eq!(
            to_html("**Storm** rising\n*quiet*"),
            "<strong>Storm</strong> rising<br><em>quiet</em>"
        );
    }
}
