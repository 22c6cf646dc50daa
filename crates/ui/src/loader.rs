//! Background chapter fetches.
//!
//! The worker owns its own sqlite connection. Every request carries a ticket
//! from [`FetchGeneration`]; replies for anything but the newest ticket are
//! dropped, so a reader that was closed or switched to another book never
//! sees a late result.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use anyhow::Context as _;
use scriptora_application::{BookRepository, FetchGeneration};
use scriptora_core::Chapter;
use scriptora_storage::Storage;

struct LoadRequest {
    ticket: u64,
    book_id: String,
}

struct Reply {
    ticket: u64,
    outcome: LoadOutcome,
}

#[derive(Debug)]
pub(crate) struct LoadOutcome {
    pub(crate) book_id: String,
    /// `Ok(None)` when the book id does not resolve.
    pub(crate) result: anyhow::Result<Option<Vec<Chapter>>>,
}

pub(crate) struct ChapterLoader {
    requests: Sender<LoadRequest>,
    replies: Receiver<Reply>,
    generation: FetchGeneration,
}

impl ChapterLoader {
    pub(crate) fn spawn(db_path: PathBuf) -> anyhow::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        thread::Builder::new()
            .name("chapter-loader".to_string())
            .spawn(move || run_worker(db_path, request_rx, reply_tx))
            .context("spawn chapter loader")?;
        Ok(Self {
            requests: request_tx,
            replies: reply_rx,
            generation: FetchGeneration::default(),
        })
    }

    pub(crate) fn request(&mut self, book_id: &str) -> anyhow::Result<()> {
        let ticket = self.generation.begin();
        self.requests
            .send(LoadRequest {
                ticket,
                book_id: book_id.to_string(),
            })
            .map_err(|_| anyhow::anyhow!("chapter loader stopped"))
    }

    pub(crate) fn cancel(&mut self) {
        self.generation.cancel();
    }

    /// Next reply for the newest request, if it has arrived.
    pub(crate) fn try_recv(&mut self) -> Option<LoadOutcome> {
        while let Ok(reply) = self.replies.try_recv() {
            if self.generation.is_current(reply.ticket) {
                return Some(reply.outcome);
            }
            tracing::debug!(book_id = %reply.outcome.book_id, "dropped stale chapter load");
        }
        None
    }
}

fn run_worker(db_path: PathBuf, requests: Receiver<LoadRequest>, replies: Sender<Reply>) {
    let storage = Storage::open(&db_path);
    for request in requests {
        let result = match &storage {
            Ok(storage) => load_book_chapters(storage, &request.book_id),
            Err(err) => Err(anyhow::anyhow!("open {}: {err:#}", db_path.display())),
        };
        let reply = Reply {
            ticket: request.ticket,
            outcome: LoadOutcome {
                book_id: request.book_id,
                result,
            },
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
}

pub(crate) fn load_book_chapters(
    repo: &dyn BookRepository,
    book_id: &str,
) -> anyhow::Result<Option<Vec<Chapter>>> {
    if repo.get_book(book_id)?.is_none() {
        return Ok(None);
    }
    repo.list_chapters(book_id).map(Some)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use scriptora_core::BookDraft;

    use super::*;

    fn draft(title: &str) -> BookDraft {
        BookDraft {
            title: title.to_string(),
            author: "Ada North".to_string(),
            ..BookDraft::default()
        }
    }

    fn wait_for(loader: &mut ChapterLoader) -> Option<LoadOutcome> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(outcome) = loader.try_recv() {
                return Some(outcome);
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn missing_book_resolves_to_none() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        assert!(load_book_chapters(&storage, "missing")?.is_none());

        let book = storage.create_book(&draft("Deep Field"))?;
        assert_eq!(load_book_chapters(&storage, &book.id)?, Some(Vec::new()));
        Ok(())
    }

    #[test]
    fn only_newest_request_is_delivered() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("scriptora.db");
        let storage = Storage::open(&db_path)?;
        let first = storage.create_book(&draft("First"))?;
        let second = storage.create_book(&draft("Second"))?;
        storage.create_chapter(&second.id, "Opening", "text")?;

        let mut loader = ChapterLoader::spawn(db_path)?;
        loader.request(&first.id)?;
        loader.request(&second.id)?;

        let outcome = wait_for(&mut loader).expect("load finished");
        assert_eq!(outcome.book_id, second.id);
        let chapters = outcome.result?.expect("book exists");
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Opening");
        Ok(())
    }

    #[test]
    fn cancelled_request_is_dropped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("scriptora.db");
        let storage = Storage::open(&db_path)?;
        let book = storage.create_book(&draft("Only"))?;

        let mut loader = ChapterLoader::spawn(db_path)?;
        loader.request(&book.id)?;
        loader.cancel();
        thread::sleep(Duration::from_millis(200));
        assert!(loader.try_recv().is_none());
        Ok(())
    }
}
