use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use scriptora_application::{AppContext, BookRepository};
use scriptora_core::BookDraft;
use scriptora_engine::{FeedChannel, render_rss};
use scriptora_storage::Storage;
use scriptora_ui::Ui;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "scriptora", version, about = "Browse and read serialized books")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the RSS feed of newest books.
    Feed {
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Maximum number of items.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Insert a small demo catalog into an empty database.
    Seed,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let project_dirs =
        ProjectDirs::from("dev", "scriptora", "scriptora").context("resolve project dirs")?;
    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir)
        .with_context(|| format!("create config dir {}", config_dir.display()))?;

    init_tracing(config_dir)?;

    let db_path = match std::env::var_os("SCRIPTORA_DB") {
        Some(path) => PathBuf::from(path),
        None => config_dir.join("scriptora.db"),
    };
    let storage = Storage::open(&db_path)?;

    match cli.command {
        None => run_tui(storage, db_path),
        Some(Command::Feed { out, limit }) => write_feed(&storage, out.as_deref(), limit),
        Some(Command::Seed) => seed(&storage),
    }
}

fn init_tracing(config_dir: &Path) -> anyhow::Result<()> {
    let log_path = config_dir.join("scriptora.log");
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("open log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SCRIPTORA_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run_tui(storage: Storage, db_path: PathBuf) -> anyhow::Result<()> {
    let mut settings = storage.load_settings()?;
    settings.normalize();
    let books = storage.list_books()?;
    tracing::info!(books = books.len(), db = %db_path.display(), "starting");

    let ctx = AppContext::new(settings).with_books(books);
    let mut ui = Ui::new(ctx, storage, db_path.clone())?;
    let ctx = ui.run()?;
    drop(ui);

    let storage = Storage::open(&db_path)?;
    storage.save_settings(&ctx.settings)?;
    Ok(())
}

fn write_feed(storage: &Storage, out: Option<&Path>, limit: Option<usize>) -> anyhow::Result<()> {
    let settings = storage.load_settings()?;
    let books = storage.list_books()?;
    let xml = render_rss(&FeedChannel::from_settings(&settings), &books, limit)?;

    match out {
        Some(path) => {
            fs::write(path, xml).with_context(|| format!("write feed {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote feed");
        }
        None => print!("{xml}"),
    }
    Ok(())
}

struct DemoBook {
    title: &'static str,
    author: &'static str,
    genre: &'static str,
    synopsis: &'static str,
    cover_image: &'static str,
    chapters: &'static [(&'static str, &'static str)],
}

const DEMO_BOOKS: &[DemoBook] = &[
    DemoBook {
        title: "The Lantern Road",
        author: "Mira Castell",
        genre: "Fantasy",
        synopsis: "A courier carries a light that must never go out.",
        cover_image: "#7a4b2a",
        chapters: &[
            (
                "The Last Ferry",
                "The river was **black** and still.\nMira counted the lamps on the far bank, *one by one*.",
            ),
            (
                "Ash and Oil",
                "By dawn the lantern had burned through half its oil.\n**Nobody** on the road would sell her more.",
            ),
        ],
    },
    DemoBook {
        title: "Deep Field",
        author: "Ada North",
        genre: "Sci-Fi",
        synopsis: "A survey ship finds a signal where no star should be.",
        cover_image: "#1b2a4a",
        chapters: &[
            (
                "Ping",
                "The array returned a *single* pulse.\nThen another, **exactly** eleven seconds later.",
            ),
            ("Silence", "For three days the signal stopped."),
            (
                "Return",
                "When it came back it was *louder*, and it was coming from behind them.",
            ),
        ],
    },
    DemoBook {
        title: "Quiet Harbor",
        author: "Jonas Reed",
        genre: "Mystery",
        synopsis: "A fishing town, a missing boat, and a harbormaster who lies.",
        cover_image: "",
        chapters: &[],
    },
];

fn seed(storage: &Storage) -> anyhow::Result<()> {
    if !storage.list_books()?.is_empty() {
        println!("catalog is not empty; nothing seeded");
        return Ok(());
    }

    for demo in DEMO_BOOKS {
        let book = storage.create_book(&BookDraft {
            title: demo.title.to_string(),
            author: demo.author.to_string(),
            genre: demo.genre.to_string(),
            synopsis: demo.synopsis.to_string(),
            cover_image: demo.cover_image.to_string(),
        })?;
        for (title, content) in demo.chapters {
            storage
                .create_chapter(&book.id, title, content)
                .with_context(|| format!("seed chapter {title} of {}", demo.title))?;
        }
    }

    println!("seeded {} books", DEMO_BOOKS.len());
    Ok(())
}
