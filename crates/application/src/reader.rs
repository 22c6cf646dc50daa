//! Chapter-by-chapter reading session for one book.

use scriptora_core::{Chapter, Progress};

use crate::BookmarkStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Book closed; title, author and an open action are shown.
    Cover,
    Reading,
    /// The book has no chapters. Terminal display state.
    Unavailable,
}

/// Whatever can switch the display into fullscreen. Rejections are not
/// fatal to the session.
pub trait FullscreenHost {
    fn request_fullscreen(&mut self, enable: bool) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct ReaderSession {
    book_id: String,
    chapters: Vec<Chapter>,
    current_index: usize,
    cover_visible: bool,
    fullscreen: bool,
    bookmark_loaded: bool,
}

/// Reading order: ascending `created_at`. Equal timestamps keep the order
/// they were loaded in.
pub fn sort_chapters(chapters: &mut [Chapter]) {
    chapters.sort_by_key(|chapter| chapter.created_at);
}

impl ReaderSession {
    pub fn new(book_id: impl Into<String>, mut chapters: Vec<Chapter>) -> Self {
        sort_chapters(&mut chapters);
        Self {
            book_id: book_id.into(),
            chapters,
            current_index: 0,
            cover_visible: true,
            fullscreen: false,
            bookmark_loaded: false,
        }
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn state(&self) -> ReaderState {
        if self.chapters.is_empty() {
            ReaderState::Unavailable
        } else if self.cover_visible {
            ReaderState::Cover
        } else {
            ReaderState::Reading
        }
    }

    pub fn current_chapter(&self) -> Option<&Chapter> {
        if self.state() == ReaderState::Reading {
            self.chapters.get(self.current_index)
        } else {
            None
        }
    }

    pub fn progress(&self) -> Option<Progress> {
        (self.state() == ReaderState::Reading).then(|| Progress {
            current_chapter: self.current_index + 1,
            total_chapters: self.chapters.len(),
        })
    }

    /// `Cover -> Reading`. The first open of a loaded book resumes from the
    /// stored bookmark when it is in range.
    pub fn open(&mut self, bookmarks: &dyn BookmarkStore) -> ReaderState {
        if self.state() != ReaderState::Cover {
            return self.state();
        }

        if !self.bookmark_loaded {
            self.bookmark_loaded = true;
            self.current_index = match bookmarks.get_bookmark(&self.book_id) {
                Ok(Some(index)) if index < self.chapters.len() => index,
                Ok(_) => 0,
                Err(err) => {
                    tracing::warn!(book_id = %self.book_id, "read bookmark: {err:#}");
                    0
                }
            };
        }

        self.cover_visible = false;
        tracing::info!(
            book_id = %self.book_id,
            index = self.current_index,
            "opened book"
        );
        ReaderState::Reading
    }

    /// Returns whether the displayed chapter changed.
    pub fn next(&mut self) -> bool {
        if self.state() != ReaderState::Reading || self.current_index + 1 >= self.chapters.len() {
            return false;
        }
        self.current_index += 1;
        true
    }

    pub fn prev(&mut self) -> bool {
        if self.state() != ReaderState::Reading || self.current_index == 0 {
            return false;
        }
        self.current_index -= 1;
        true
    }

    pub fn goto(&mut self, index: usize) -> bool {
        if self.state() != ReaderState::Reading
            || index >= self.chapters.len()
            || index == self.current_index
        {
            return false;
        }
        self.current_index = index;
        true
    }

    /// `Reading -> Cover`, writing the bookmark first. The session closes
    /// even when the write fails; the error is handed back for display.
    pub fn close(&mut self, bookmarks: &dyn BookmarkStore) -> anyhow::Result<()> {
        if self.state() != ReaderState::Reading {
            return Ok(());
        }
        let result = bookmarks.set_bookmark(&self.book_id, self.current_index);
        self.cover_visible = true;
        result
    }

    /// Flips fullscreen while reading. A host rejection is logged and the
    /// flag stays as it was.
    pub fn toggle_fullscreen(&mut self, host: &mut dyn FullscreenHost) -> bool {
        if self.state() != ReaderState::Reading {
            return false;
        }
        let enable = !self.fullscreen;
        match host.request_fullscreen(enable) {
            Ok(()) => {
                self.fullscreen = enable;
                true
            }
            Err(err) => {
                tracing::warn!(book_id = %self.book_id, enable, "fullscreen rejected: {err:#}");
                false
            }
        }
    }

    /// Swaps in a freshly loaded chapter list, keeping the index in bounds.
    pub fn replace_chapters(&mut self, mut chapters: Vec<Chapter>) {
        sort_chapters(&mut chapters);
        self.chapters = chapters;
        self.current_index = self
            .current_index
            .min(self.chapters.len().saturating_sub(1));
        if self.chapters.is_empty() {
            self.cover_visible = true;
            self.fullscreen = false;
        }
    }

    /// Index of a chapter by id in reading order.
    pub fn position_of(&self, chapter_id: &str) -> Option<usize> {
        self.chapters.iter().position(|c| c.id == chapter_id)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct MemoryBookmarks {
        marks: RefCell<HashMap<String, usize>>,
        fail_writes: bool,
    }

    impl BookmarkStore for MemoryBookmarks {
        fn get_bookmark(&self, book_id: &str) -> anyhow::Result<Option<usize>> {
            Ok(self.marks.borrow().get(book_id).copied())
        }

        fn set_bookmark(&self, book_id: &str, index: usize) -> anyhow::Result<()> {
            if self.fail_writes {
                anyhow::bail!("disk full");
            }
            self.marks.borrow_mut().insert(book_id.to_string(), index);
            Ok(())
        }
    }

    struct Host {
        accept: bool,
        calls: Vec<bool>,
    }

    impl FullscreenHost for Host {
        fn request_fullscreen(&mut self, enable: bool) -> anyhow::Result<()> {
            self.calls.push(enable);
            if self.accept {
                Ok(())
            } else {
                anyhow::bail!("not allowed")
            }
        }
    }

    fn chapter(id: &str, created_at: i64) -> Chapter {
        Chapter {
            id: id.to_string(),
            title: format!("Chapter {id}"),
            content: String::new(),
            created_at,
        }
    }

    fn three_chapters() -> Vec<Chapter> {
        vec![chapter("c", 30), chapter("a", 10), chapter("b", 20)]
    }

    fn reading(marks: &MemoryBookmarks) -> ReaderSession {
        let mut session = ReaderSession::new("book", three_chapters());
        assert_eq!(session.open(marks), ReaderState::Reading);
        session
    }

    #[test]
    fn chapters_are_ordered_by_created_at() {
        let session = ReaderSession::new("book", three_chapters());
        let ids: Vec<&str> = session.chapters().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(session.state(), ReaderState::Cover);
        assert!(session.current_chapter().is_none());
    }

    #[test]
    fn equal_timestamps_keep_load_order() {
        let session = ReaderSession::new("book", vec![chapter("x", 5), chapter("y", 5)]);
        assert_eq!(session.chapters()[0].id, "x");
        assert_eq!(session.chapters()[1].id, "y");
    }

    #[test]
    fn navigation_is_bounded() {
        let marks = MemoryBookmarks::default();
        let mut session = reading(&marks);
        assert!(!session.prev());
        assert_eq!(session.current_index(), 0);
        assert!(session.next());
        assert!(session.next());
        assert!(!session.next());
        assert_eq!(session.current_index(), 2);
        assert_eq!(session.current_chapter().map(|c| c.id.as_str()), Some("c"));
    }

    #[test]
    fn progress_tracks_index() {
        let marks = MemoryBookmarks::default();
        let mut session = reading(&marks);
        let progress = session.progress().unwrap();
        assert_eq!(progress.current_chapter, 1);
        assert_eq!(progress.total_chapters, 3);
        session.next();
        session.next();
        assert_eq!(session.progress().unwrap().fraction(), 1.0);
    }

    #[test]
    fn open_resumes_from_bookmark_in_range() {
        let marks = MemoryBookmarks::default();
        marks.set_bookmark("book", 2).unwrap();
        let session = reading(&marks);
        assert_eq!(session.current_index(), 2);
    }

    #[test]
    fn out_of_range_bookmark_falls_back_to_start() {
        let marks = MemoryBookmarks::default();
        marks.set_bookmark("book", 99).unwrap();
        let session = reading(&marks);
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn close_writes_bookmark_and_shows_cover() {
        let marks = MemoryBookmarks::default();
        let mut session = reading(&marks);
        session.next();
        session.close(&marks).unwrap();
        assert_eq!(session.state(), ReaderState::Cover);
        assert_eq!(marks.get_bookmark("book").unwrap(), Some(1));
    }

    #[test]
    fn bookmark_is_read_once_per_load() {
        let marks = MemoryBookmarks::default();
        let mut session = reading(&marks);
        session.next();
        session.next();
        session.close(&marks).unwrap();
        marks.set_bookmark("book", 0).unwrap();
        session.open(&marks);
        assert_eq!(session.current_index(), 2);
    }

    #[test]
    fn failed_bookmark_write_still_closes() {
        let marks = MemoryBookmarks {
            fail_writes: true,
            ..MemoryBookmarks::default()
        };
        let mut session = reading(&marks);
        assert!(session.close(&marks).is_err());
        assert_eq!(session.state(), ReaderState::Cover);
    }

    #[test]
    fn empty_book_is_unavailable() {
        let marks = MemoryBookmarks::default();
        let mut session = ReaderSession::new("empty", Vec::new());
        assert_eq!(session.state(), ReaderState::Unavailable);
        assert_eq!(session.open(&marks), ReaderState::Unavailable);
        assert!(!session.next());
        assert!(session.progress().is_none());
        assert!(session.close(&marks).is_ok());
        assert_eq!(marks.get_bookmark("empty").unwrap(), None);
    }

    #[test]
    fn fullscreen_toggles_when_host_accepts() {
        let marks = MemoryBookmarks::default();
        let mut session = reading(&marks);
        let mut host = Host {
            accept: true,
            calls: Vec::new(),
        };
        assert!(session.toggle_fullscreen(&mut host));
        assert!(session.is_fullscreen());
        assert!(session.toggle_fullscreen(&mut host));
        assert!(!session.is_fullscreen());
        assert_eq!(host.calls, vec![true, false]);
    }

    #[test]
    fn fullscreen_rejection_is_a_no_op() {
        let marks = MemoryBookmarks::default();
        let mut session = reading(&marks);
        let mut host = Host {
            accept: false,
            calls: Vec::new(),
        };
        assert!(!session.toggle_fullscreen(&mut host));
        assert!(!session.is_fullscreen());
    }

    #[test]
    fn fullscreen_ignored_on_cover() {
        let mut session = ReaderSession::new("book", three_chapters());
        let mut host = Host {
            accept: true,
            calls: Vec::new(),
        };
        assert!(!session.toggle_fullscreen(&mut host));
        assert!(host.calls.is_empty());
    }

    #[test]
    fn goto_jumps_within_bounds() {
        let marks = MemoryBookmarks::default();
        let mut session = reading(&marks);
        assert!(session.goto(2));
        assert!(!session.goto(2));
        assert!(!session.goto(3));
        assert_eq!(session.current_index(), 2);
    }

    #[test]
    fn replace_chapters_clamps_index() {
        let marks = MemoryBookmarks::default();
        let mut session = reading(&marks);
        session.goto(2);
        session.replace_chapters(vec![chapter("a", 10)]);
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.state(), ReaderState::Reading);
        assert_eq!(session.position_of("a"), Some(0));

        session.replace_chapters(Vec::new());
        assert_eq!(session.state(), ReaderState::Unavailable);
    }
}
