//! Sqlite-backed persistence.

use std::path::Path;

use anyhow::Context as _;
use rusqlite::{Connection, OptionalExtension as _, Row};
use scriptora_application::{BookRepository, BookmarkStore};
use scriptora_core::{
    Book, BookDraft, Chapter, ChapterFields, LibraryError, Settings, SortKey, Theme,
    unix_now_millis, validate_chapter_title,
};

#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

const BOOK_COLUMNS: &str =
    "id, title, author, genre, synopsis, cover_image, total_chapters, created_at, views";

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("open sqlite db at {}", path.as_ref().display()))?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                theme TEXT NOT NULL,
                default_sort TEXT NOT NULL
            );
            INSERT OR IGNORE INTO settings (id, theme, default_sort)
            VALUES (1, 'dark', 'title');

            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                genre TEXT NOT NULL DEFAULT '',
                synopsis TEXT NOT NULL DEFAULT '',
                cover_image TEXT NOT NULL DEFAULT '',
                total_chapters INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chapters (
                id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS chapters_by_book ON chapters(book_id);

            CREATE TABLE IF NOT EXISTS bookmarks (
                book_id TEXT PRIMARY KEY REFERENCES books(id) ON DELETE CASCADE,
                chapter_index INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        self.add_column_if_missing("books", "views INTEGER NOT NULL DEFAULT 0")?;
        self.add_column_if_missing("settings", "site_url TEXT NOT NULL DEFAULT ''")?;
        self.add_column_if_missing("settings", "feed_title TEXT NOT NULL DEFAULT 'Scriptora'")?;

        Ok(())
    }

    fn add_column_if_missing(&self, table: &str, column_def: &str) -> anyhow::Result<()> {
        match self
            .conn
            .execute(&format!("ALTER TABLE {table} ADD COLUMN {column_def}"), [])
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let msg = err.to_string();
                if msg.contains("duplicate column name") {
                    Ok(())
                } else {
                    Err(err).with_context(|| format!("add {table} column: {column_def}"))
                }
            }
        }
    }

    pub fn load_settings(&self) -> anyhow::Result<Settings> {
        let row = self
            .conn
            .query_row(
                "SELECT theme, default_sort, site_url, feed_title FROM settings WHERE id = 1",
                [],
                |row| {
                    let theme: String = row.get(0)?;
                    let default_sort: String = row.get(1)?;
                    let site_url: String = row.get(2)?;
                    let feed_title: String = row.get(3)?;
                    Ok((theme, default_sort, site_url, feed_title))
                },
            )
            .optional()?;

        let Some((theme, default_sort, site_url, feed_title)) = row else {
            return Ok(Settings::default());
        };

        let mut settings = Settings {
            theme: theme.parse::<Theme>().unwrap_or(Theme::Dark),
            default_sort: default_sort.parse::<SortKey>().unwrap_or_default(),
            site_url,
            feed_title,
        };
        settings.normalize();
        Ok(settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
        let mut settings = settings.clone();
        settings.normalize();

        self.conn.execute(
            "UPDATE settings SET theme = ?, default_sort = ?, site_url = ?, feed_title = ? WHERE id = 1",
            (
                settings.theme.as_str(),
                settings.default_sort.as_str(),
                &settings.site_url,
                &settings.feed_title,
            ),
        )?;
        Ok(())
    }

    fn book_exists(&self, book_id: &str) -> anyhow::Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM books WHERE id = ?", [book_id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn recount_chapters(&self, book_id: &str) -> anyhow::Result<()> {
        self.conn.execute(
            r#"
            UPDATE books
            SET total_chapters = (SELECT COUNT(*) FROM chapters WHERE book_id = ?1)
            WHERE id = ?1
            "#,
            [book_id],
        )?;
        Ok(())
    }

    /// Strictly after the newest chapter of the book, so appends never tie.
    fn next_chapter_timestamp(&self, book_id: &str) -> anyhow::Result<i64> {
        let newest: Option<i64> = self.conn.query_row(
            "SELECT MAX(created_at) FROM chapters WHERE book_id = ?",
            [book_id],
            |row| row.get(0),
        )?;
        let now = unix_now_millis();
        Ok(match newest {
            Some(newest) if newest >= now => newest + 1,
            _ => now,
        })
    }
}

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    let total_chapters: i64 = row.get(6)?;
    let views: i64 = row.get(8)?;
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        genre: row.get(3)?,
        synopsis: row.get(4)?,
        cover_image: row.get(5)?,
        total_chapters: u32::try_from(total_chapters).unwrap_or(0),
        created_at: row.get(7)?,
        views: u64::try_from(views).unwrap_or(0),
    })
}

impl BookRepository for Storage {
    fn list_books(&self) -> anyhow::Result<Vec<Book>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], book_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get_book(&self, book_id: &str) -> anyhow::Result<Option<Book>> {
        let book = self
            .conn
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?"),
                [book_id],
                book_from_row,
            )
            .optional()?;
        Ok(book)
    }

    fn create_book(&self, draft: &BookDraft) -> anyhow::Result<Book> {
        draft.validate()?;
        let book = Book {
            id: uuid::Uuid::new_v4().to_string(),
            title: draft.title.trim().to_string(),
            author: draft.author.trim().to_string(),
            genre: draft.genre.trim().to_string(),
            synopsis: draft.synopsis.clone(),
            cover_image: draft.cover_image.trim().to_string(),
            total_chapters: 0,
            created_at: unix_now_millis(),
            views: 0,
        };
        self.conn.execute(
            r#"
            INSERT INTO books (id, title, author, genre, synopsis, cover_image, total_chapters, created_at, views)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?, 0)
            "#,
            (
                &book.id,
                &book.title,
                &book.author,
                &book.genre,
                &book.synopsis,
                &book.cover_image,
                book.created_at,
            ),
        )?;
        tracing::info!(book_id = %book.id, title = %book.title, "created book");
        Ok(book)
    }

    fn update_book(&self, book_id: &str, draft: &BookDraft) -> anyhow::Result<()> {
        draft.validate()?;
        let changed = self.conn.execute(
            r#"
            UPDATE books SET title = ?, author = ?, genre = ?, synopsis = ?, cover_image = ?
            WHERE id = ?
            "#,
            (
                draft.title.trim(),
                draft.author.trim(),
                draft.genre.trim(),
                &draft.synopsis,
                draft.cover_image.trim(),
                book_id,
            ),
        )?;
        if changed == 0 {
            return Err(LibraryError::book_not_found(book_id).into());
        }
        tracing::info!(book_id, "updated book");
        Ok(())
    }

    fn delete_book(&self, book_id: &str) -> anyhow::Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM books WHERE id = ?", [book_id])?;
        if changed == 0 {
            return Err(LibraryError::book_not_found(book_id).into());
        }
        tracing::info!(book_id, "deleted book");
        Ok(())
    }

    fn list_chapters(&self, book_id: &str) -> anyhow::Result<Vec<Chapter>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, content, created_at FROM chapters WHERE book_id = ? ORDER BY rowid",
        )?;
        let rows = stmt.query_map([book_id], |row| {
            Ok(Chapter {
                id: row.get(0)?,
                title: row.get(1)?,
                content: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn create_chapter(&self, book_id: &str, title: &str, content: &str) -> anyhow::Result<Chapter> {
        validate_chapter_title(title)?;
        if !self.book_exists(book_id)? {
            return Err(LibraryError::book_not_found(book_id).into());
        }

        let chapter = Chapter {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.trim().to_string(),
            content: content.to_string(),
            created_at: self.next_chapter_timestamp(book_id)?,
        };

        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin create chapter")?;
        tx.execute(
            "INSERT INTO chapters (id, book_id, title, content, created_at) VALUES (?, ?, ?, ?, ?)",
            (
                &chapter.id,
                book_id,
                &chapter.title,
                &chapter.content,
                chapter.created_at,
            ),
        )?;
        self.recount_chapters(book_id)?;
        tx.commit().context("commit create chapter")?;

        tracing::info!(book_id, chapter_id = %chapter.id, "created chapter");
        Ok(chapter)
    }

    fn update_chapter(
        &self,
        book_id: &str,
        chapter_id: &str,
        fields: &ChapterFields,
    ) -> anyhow::Result<()> {
        fields.validate()?;
        let changed = self.conn.execute(
            r#"
            UPDATE chapters
            SET title = COALESCE(?1, title), content = COALESCE(?2, content)
            WHERE id = ?3 AND book_id = ?4
            "#,
            (
                fields.title.as_deref().map(str::trim),
                fields.content.as_deref(),
                chapter_id,
                book_id,
            ),
        )?;
        if changed == 0 {
            return Err(LibraryError::chapter_not_found(chapter_id).into());
        }
        tracing::info!(book_id, chapter_id, "updated chapter");
        Ok(())
    }

    fn delete_chapter(&self, book_id: &str, chapter_id: &str) -> anyhow::Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin delete chapter")?;
        let changed = tx.execute(
            "DELETE FROM chapters WHERE id = ? AND book_id = ?",
            [chapter_id, book_id],
        )?;
        if changed == 0 {
            return Err(LibraryError::chapter_not_found(chapter_id).into());
        }
        self.recount_chapters(book_id)?;
        tx.commit().context("commit delete chapter")?;

        tracing::info!(book_id, chapter_id, "deleted chapter");
        Ok(())
    }

    fn increment_view_count(&self, book_id: &str) -> anyhow::Result<()> {
        let changed = self
            .conn
            .execute("UPDATE books SET views = views + 1 WHERE id = ?", [book_id])?;
        if changed == 0 {
            return Err(LibraryError::book_not_found(book_id).into());
        }
        Ok(())
    }
}

impl BookmarkStore for Storage {
    fn get_bookmark(&self, book_id: &str) -> anyhow::Result<Option<usize>> {
        let index: Option<i64> = self
            .conn
            .query_row(
                "SELECT chapter_index FROM bookmarks WHERE book_id = ?",
                [book_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(index.and_then(|index| usize::try_from(index).ok()))
    }

    fn set_bookmark(&self, book_id: &str, index: usize) -> anyhow::Result<()> {
        let index = i64::try_from(index).context("bookmark index out of range")?;
        self.conn.execute(
            r#"
            INSERT INTO bookmarks (book_id, chapter_index, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(book_id) DO UPDATE SET chapter_index = excluded.chapter_index, updated_at = excluded.updated_at
            "#,
            (book_id, index, unix_now_millis()),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str) -> BookDraft {
        BookDraft {
            title: title.to_string(),
            author: "Ada North".to_string(),
            genre: "Fantasy".to_string(),
            synopsis: "A long walk.".to_string(),
            cover_image: "linear-gradient(#000, #fff)".to_string(),
        }
    }

    fn library_error(err: &anyhow::Error) -> Option<&LibraryError> {
        err.downcast_ref::<LibraryError>()
    }

    #[test]
    fn settings_roundtrip() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        let mut settings = storage.load_settings()?;
        assert_eq!(settings.feed_title, "Scriptora");
        settings.theme = Theme::Light;
        settings.default_sort = SortKey::Views;
        settings.site_url = "https://books.example/".to_string();
        settings.feed_title = "New on the shelf".to_string();
        storage.save_settings(&settings)?;

        let settings2 = storage.load_settings()?;
        assert_eq!(settings2.theme, Theme::Light);
        assert_eq!(settings2.default_sort, SortKey::Views);
        assert_eq!(settings2.site_url, "https://books.example");
        assert_eq!(settings2.feed_title, "New on the shelf");
        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        storage.migrate()?;
        storage.migrate()?;
        Ok(())
    }

    #[test]
    fn book_roundtrip() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        let book = storage.create_book(&draft("The Hollow Crown"))?;
        assert_eq!(book.total_chapters, 0);
        assert_eq!(book.views, 0);

        let books = storage.list_books()?;
        assert_eq!(books, vec![book.clone()]);
        assert_eq!(storage.get_book(&book.id)?, Some(book.clone()));

        let mut edited = draft("The Hollow Crown, Revised");
        edited.genre = "Drama".to_string();
        storage.update_book(&book.id, &edited)?;
        let stored = storage.get_book(&book.id)?.unwrap();
        assert_eq!(stored.title, "The Hollow Crown, Revised");
        assert_eq!(stored.genre, "Drama");

        storage.delete_book(&book.id)?;
        assert!(storage.get_book(&book.id)?.is_none());
        Ok(())
    }

    #[test]
    fn invalid_book_never_written() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        let err = storage.create_book(&draft("  ")).unwrap_err();
        assert!(matches!(library_error(&err), Some(LibraryError::Validation(_))));
        assert!(storage.list_books()?.is_empty());
        Ok(())
    }

    #[test]
    fn chapters_keep_total_in_step() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        let book = storage.create_book(&draft("Deep Field"))?;
        let first = storage.create_chapter(&book.id, "One", "**hello**")?;
        let second = storage.create_chapter(&book.id, "Two", "world")?;
        assert!(second.created_at > first.created_at);
        assert_eq!(storage.get_book(&book.id)?.unwrap().total_chapters, 2);

        let chapters = storage.list_chapters(&book.id)?;
        assert_eq!(chapters, vec![first.clone(), second.clone()]);

        storage.delete_chapter(&book.id, &first.id)?;
        assert_eq!(storage.get_book(&book.id)?.unwrap().total_chapters, 1);
        assert_eq!(storage.list_chapters(&book.id)?, vec![second]);
        Ok(())
    }

    #[test]
    fn update_chapter_touches_only_given_fields() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        let book = storage.create_book(&draft("Autumn Letters"))?;
        let chapter = storage.create_chapter(&book.id, "Draft", "old text")?;

        storage.update_chapter(
            &book.id,
            &chapter.id,
            &ChapterFields {
                title: None,
                content: Some("new text".to_string()),
            },
        )?;
        let stored = &storage.list_chapters(&book.id)?[0];
        assert_eq!(stored.title, "Draft");
        assert_eq!(stored.content, "new text");

        storage.update_chapter(
            &book.id,
            &chapter.id,
            &ChapterFields {
                title: Some(" Final ".to_string()),
                content: None,
            },
        )?;
        let stored = &storage.list_chapters(&book.id)?[0];
        assert_eq!(stored.title, "Final");
        assert_eq!(stored.content, "new text");
        Ok(())
    }

    #[test]
    fn chapter_errors_are_typed() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        let book = storage.create_book(&draft("Binary Stars"))?;

        let err = storage.create_chapter(&book.id, "", "text").unwrap_err();
        assert!(matches!(library_error(&err), Some(LibraryError::Validation(_))));
        assert!(storage.list_chapters(&book.id)?.is_empty());

        let err = storage.create_chapter("missing", "One", "").unwrap_err();
        assert!(library_error(&err).is_some_and(LibraryError::is_not_found));

        let err = storage
            .update_chapter(&book.id, "missing", &ChapterFields::default())
            .unwrap_err();
        assert!(library_error(&err).is_some_and(LibraryError::is_not_found));

        let err = storage.delete_chapter(&book.id, "missing").unwrap_err();
        assert!(library_error(&err).is_some_and(LibraryError::is_not_found));
        Ok(())
    }

    #[test]
    fn view_count_increments() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        let book = storage.create_book(&draft("Deep Field"))?;
        storage.increment_view_count(&book.id)?;
        storage.increment_view_count(&book.id)?;
        assert_eq!(storage.get_book(&book.id)?.unwrap().views, 2);
        assert!(storage.increment_view_count("missing").is_err());
        Ok(())
    }

    #[test]
    fn bookmark_roundtrip_and_cascade() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        let book = storage.create_book(&draft("Deep Field"))?;
        assert_eq!(storage.get_bookmark(&book.id)?, None);

        storage.set_bookmark(&book.id, 3)?;
        storage.set_bookmark(&book.id, 4)?;
        assert_eq!(storage.get_bookmark(&book.id)?, Some(4));

        storage.delete_book(&book.id)?;
        assert_eq!(storage.get_bookmark(&book.id)?, None);
        Ok(())
    }

    #[test]
    fn deleting_book_removes_chapters() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        let book = storage.create_book(&draft("Deep Field"))?;
        storage.create_chapter(&book.id, "One", "")?;
        storage.delete_book(&book.id)?;
        assert!(storage.list_chapters(&book.id)?.is_empty());
        Ok(())
    }
}
