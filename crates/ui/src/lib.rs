//! ratatui-based UI.

use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{event, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, Gauge, HighlightSpacing, List, ListItem, ListState, Paragraph, Wrap,
};
use scriptora_application::{
    AppContext, BookRepository, FullscreenHost, ReaderSession, ReaderState, record_view,
};
use scriptora_core::{
    Book, BookDraft, ChapterFields, LibraryError, SortKey, Theme, validate_chapter_title,
};
use scriptora_engine::{Emphasis, segments};
use scriptora_storage::Storage;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

mod loader;

use loader::{ChapterLoader, LoadOutcome};

pub struct Ui {
    ctx: AppContext,
    storage: Storage,
    loader: ChapterLoader,
    fullscreen_host: TerminalFullscreen,
    settings_panel: SettingsPanel,
    search_panel: SearchPanel,
    genre_panel: GenrePanel,
    book_form: BookForm,
    chapter_form: ChapterForm,
    chapter_list: ChapterListPanel,
    confirm: Option<ConfirmDelete>,
    reader: ReaderPanel,
    status: Option<String>,
}

impl Ui {
    /// `db_path` is reopened by the background chapter loader.
    pub fn new(mut ctx: AppContext, storage: Storage, db_path: PathBuf) -> anyhow::Result<Self> {
        ctx.settings.normalize();
        Ok(Self {
            ctx,
            storage,
            loader: ChapterLoader::spawn(db_path)?,
            fullscreen_host: TerminalFullscreen,
            settings_panel: SettingsPanel::default(),
            search_panel: SearchPanel::default(),
            genre_panel: GenrePanel::default(),
            book_form: BookForm::default(),
            chapter_form: ChapterForm::default(),
            chapter_list: ChapterListPanel::default(),
            confirm: None,
            reader: ReaderPanel::default(),
            status: None,
        })
    }

    pub fn run(&mut self) -> anyhow::Result<AppContext> {
        let mut terminal = setup_terminal()?;
        terminal.clear().ok();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.event_loop(&mut terminal)
        }));
        let restore_result = restore_terminal(&mut terminal);

        match (result, restore_result) {
            (Ok(Ok(())), Ok(())) => Ok(self.ctx.clone()),
            (Ok(Ok(())), Err(err)) => Err(err),
            (Ok(Err(err)), _) => Err(err),
            (Err(panic), Ok(())) => Err(anyhow::anyhow!(panic_to_string(panic))),
            (Err(panic), Err(err)) => Err(anyhow::anyhow!(
                "{}\n(additionally failed to restore terminal: {err})",
                panic_to_string(panic)
            )),
        }
    }

    fn accent_color(&self) -> Color {
        match self.ctx.settings.theme {
            Theme::Light => Color::Blue,
            Theme::Dark => Color::Yellow,
        }
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ) -> anyhow::Result<()> {
        let tick_rate = Duration::from_millis(100);
        let mut needs_redraw = true;

        loop {
            if self.poll_loader() {
                needs_redraw = true;
            }

            if needs_redraw {
                terminal.draw(|frame| self.draw(frame.area(), frame))?;
                needs_redraw = false;
            }

            if !event::poll(tick_rate)? {
                continue;
            }

            match event::read()? {
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        continue;
                    }
                    needs_redraw = true;
                    if self.handle_key(key)? {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }

    /// Returns `true` when the UI should quit.
    fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.close_reader();
            return Ok(true);
        }

        if self.confirm.is_some() {
            self.handle_confirm_key(key);
        } else if self.book_form.open {
            self.handle_book_form_key(key);
        } else if self.chapter_form.open {
            self.handle_chapter_form_key(key);
        } else if self.chapter_list.open {
            self.handle_chapter_list_key(key);
        } else if self.settings_panel.open {
            self.handle_settings_panel_key(key);
        } else if self.search_panel.open {
            self.handle_search_panel_key(key);
        } else if self.genre_panel.open {
            self.handle_genre_panel_key(key);
        } else if self.reader.open {
            self.handle_reader_key(key)?;
        } else {
            return Ok(self.handle_main_key(key));
        }
        Ok(false)
    }

    fn handle_main_key(&mut self, key: KeyEvent) -> bool {
        self.status = None;
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return true,
            KeyCode::Char('/') => {
                self.search_panel.open = true;
                self.search_panel.snapshot = Some(self.ctx.catalog.search_term.clone());
            }
            KeyCode::Char('g') => {
                self.genre_panel.open = true;
                self.genre_panel.cursor = 0;
            }
            KeyCode::Char('o') => self.ctx.cycle_sort(),
            KeyCode::Char('r') => self.ctx.reset_catalog(),
            KeyCode::Char('R') => self.reload_books(),
            KeyCode::Right | KeyCode::PageDown => self.ctx.next_page(),
            KeyCode::Left | KeyCode::PageUp => self.ctx.prev_page(),
            KeyCode::Down => self.ctx.select_next(),
            KeyCode::Up => self.ctx.select_prev(),
            KeyCode::Char('s') => {
                self.settings_panel.open = true;
                self.settings_panel.selected = 0;
            }
            KeyCode::Char('n') => {
                self.book_form = BookForm::new_book();
            }
            KeyCode::Char('e') => {
                if let Some(book) = self.ctx.selected_book() {
                    self.book_form = BookForm::edit(book);
                }
            }
            KeyCode::Char('x') => {
                if let Some(book) = self.ctx.selected_book() {
                    self.confirm = Some(ConfirmDelete::Book {
                        book_id: book.id.clone(),
                        title: book.title.clone(),
                    });
                }
            }
            KeyCode::Enter => {
                if let Some(book) = self.ctx.selected_book().cloned() {
                    self.open_book(book);
                }
            }
            _ => {}
        }
        false
    }

    fn open_book(&mut self, book: Book) {
        record_view(&self.storage, &book.id);
        self.reader.open_book(book.clone());
        if let Err(err) = self.loader.request(&book.id) {
            self.reader.error = Some(format!("{err:#}"));
        }
    }

    fn poll_loader(&mut self) -> bool {
        let mut changed = false;
        while let Some(outcome) = self.loader.try_recv() {
            if self.reader.open {
                self.reader.apply_load(outcome);
                changed = true;
            }
        }
        changed
    }

    /// Leaves the reader entirely, writing the bookmark if a chapter is
    /// showing and abandoning any load still in flight.
    fn close_reader(&mut self) {
        if let Some(session) = self.reader.session.as_mut()
            && let Err(err) = session.close(&self.storage)
        {
            self.status = Some(format!("save bookmark: {err:#}"));
        }
        self.loader.cancel();
        let book_id = self.reader.book_id();
        self.reader = ReaderPanel::default();
        self.chapter_list = ChapterListPanel::default();
        self.reload_books();
        if let Some(book_id) = book_id {
            self.ctx.select_book(&book_id);
        }
    }

    fn reload_books(&mut self) {
        match self.storage.list_books() {
            Ok(books) => self.ctx.replace_books(books),
            Err(err) => self.status = Some(format!("load catalog: {err:#}")),
        }
    }

    fn handle_reader_key(&mut self, key: KeyEvent) -> anyhow::Result<()> {
        self.reader.notice = None;
        let state = self.reader.session.as_ref().map(ReaderSession::state);

        match state {
            None => {
                if key.code == KeyCode::Esc {
                    self.close_reader();
                }
            }
            Some(ReaderState::Unavailable) => match key.code {
                KeyCode::Esc => self.close_reader(),
                KeyCode::Char('a') => self.chapter_form = ChapterForm::new_chapter(),
                _ => {}
            },
            Some(ReaderState::Cover) => match key.code {
                KeyCode::Esc => self.close_reader(),
                KeyCode::Enter => {
                    if let Some(session) = self.reader.session.as_mut() {
                        session.open(&self.storage);
                    }
                    self.reader.invalidate_render();
                }
                KeyCode::Char('a') => self.chapter_form = ChapterForm::new_chapter(),
                _ => {}
            },
            Some(ReaderState::Reading) => self.handle_reading_key(key),
        }
        Ok(())
    }

    fn handle_reading_key(&mut self, key: KeyEvent) {
        let Some(session) = self.reader.session.as_mut() else {
            return;
        };

        match key.code {
            KeyCode::Esc => {
                if let Err(err) = session.close(&self.storage) {
                    self.reader.notice = Some(format!("save bookmark: {err:#}"));
                }
                self.reader.invalidate_render();
            }
            KeyCode::Right | KeyCode::PageDown | KeyCode::Char('l') => {
                if session.next() {
                    self.reader.invalidate_render();
                }
            }
            KeyCode::Left | KeyCode::PageUp | KeyCode::Char('h') => {
                if session.prev() {
                    self.reader.invalidate_render();
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.reader.scroll = self.reader.scroll.saturating_add(1);
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.reader.scroll = self.reader.scroll.saturating_sub(1);
            }
            KeyCode::Char('f') => {
                if !session.toggle_fullscreen(&mut self.fullscreen_host) {
                    self.reader.notice = Some("fullscreen unavailable".to_string());
                }
            }
            KeyCode::Char('c') => {
                self.chapter_list.open = true;
                self.chapter_list.cursor = session.current_index();
            }
            KeyCode::Char('a') => self.chapter_form = ChapterForm::new_chapter(),
            KeyCode::Char('e') => {
                if let Some(chapter) = session.current_chapter() {
                    self.chapter_form = ChapterForm::edit(
                        chapter.id.clone(),
                        chapter.title.clone(),
                        chapter.content.clone(),
                    );
                }
            }
            KeyCode::Char('x') => {
                if let Some(chapter) = session.current_chapter() {
                    self.confirm = Some(ConfirmDelete::Chapter {
                        book_id: session.book_id().to_string(),
                        chapter_id: chapter.id.clone(),
                        title: chapter.title.clone(),
                    });
                }
            }
            _ => {}
        }
    }

    fn handle_chapter_list_key(&mut self, key: KeyEvent) {
        let len = self
            .reader
            .session
            .as_ref()
            .map_or(0, |session| session.chapters().len());
        match key.code {
            KeyCode::Esc => self.chapter_list.open = false,
            KeyCode::Down => {
                if self.chapter_list.cursor + 1 < len {
                    self.chapter_list.cursor += 1;
                }
            }
            KeyCode::Up => {
                self.chapter_list.cursor = self.chapter_list.cursor.saturating_sub(1);
            }
            KeyCode::Enter => {
                let cursor = self.chapter_list.cursor;
                if let Some(session) = self.reader.session.as_mut()
                    && session.goto(cursor)
                {
                    self.reader.invalidate_render();
                }
                self.chapter_list.open = false;
            }
            _ => {}
        }
    }

    /// Reloads the open book's chapters after an author edit and, when
    /// `focus` is given, shows that chapter.
    fn refresh_chapters(&mut self, focus: Option<&str>) {
        let Some(book_id) = self.reader.book_id() else {
            return;
        };
        match self.storage.list_chapters(&book_id) {
            Ok(chapters) => {
                if let Some(session) = self.reader.session.as_mut() {
                    session.replace_chapters(chapters);
                    if let Some(chapter_id) = focus {
                        if session.state() == ReaderState::Cover {
                            session.open(&self.storage);
                        }
                        if let Some(index) = session.position_of(chapter_id) {
                            session.goto(index);
                        }
                    }
                }
            }
            Err(err) => self.reader.notice = Some(format!("reload chapters: {err:#}")),
        }
        self.reader.invalidate_render();
        self.reload_books();
    }

    fn handle_chapter_form_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => self.chapter_form = ChapterForm::default(),
            KeyCode::Char('s') if ctrl => self.commit_chapter_form(),
            KeyCode::Tab | KeyCode::BackTab => {
                self.chapter_form.focus = self.chapter_form.focus.toggle();
            }
            KeyCode::Enter => match self.chapter_form.focus {
                ChapterField::Title => self.chapter_form.focus = ChapterField::Content,
                ChapterField::Content => self.chapter_form.content.push('\n'),
            },
            _ => {
                let input = match self.chapter_form.focus {
                    ChapterField::Title => &mut self.chapter_form.title,
                    ChapterField::Content => &mut self.chapter_form.content,
                };
                if edit_text(input, key) {
                    self.chapter_form.error = None;
                }
            }
        }
    }

    fn commit_chapter_form(&mut self) {
        let title = self.chapter_form.title.trim().to_string();
        if let Err(err) = validate_chapter_title(&title) {
            self.chapter_form.error = Some(err.to_string());
            return;
        }
        let Some(book_id) = self.reader.book_id() else {
            self.chapter_form = ChapterForm::default();
            return;
        };
        let content = self.chapter_form.content.clone();

        let result = match self.chapter_form.editing.clone() {
            Some(chapter_id) => self
                .storage
                .update_chapter(
                    &book_id,
                    &chapter_id,
                    &ChapterFields {
                        title: Some(title),
                        content: Some(content),
                    },
                )
                .map(|()| chapter_id),
            None => self
                .storage
                .create_chapter(&book_id, &title, &content)
                .map(|chapter| chapter.id),
        };

        match result {
            Ok(chapter_id) => {
                self.chapter_form = ChapterForm::default();
                self.refresh_chapters(Some(&chapter_id));
            }
            Err(err) => self.chapter_form.error = Some(describe_error(&err)),
        }
    }

    fn handle_book_form_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => self.book_form = BookForm::default(),
            KeyCode::Char('s') if ctrl => self.commit_book_form(),
            KeyCode::Tab | KeyCode::Down => {
                self.book_form.focus = (self.book_form.focus + 1) % BOOK_FORM_LABELS.len();
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.book_form.focus = self
                    .book_form
                    .focus
                    .checked_sub(1)
                    .unwrap_or(BOOK_FORM_LABELS.len() - 1);
            }
            KeyCode::Enter => {
                if self.book_form.focus + 1 == BOOK_FORM_LABELS.len() {
                    self.commit_book_form();
                } else {
                    self.book_form.focus += 1;
                }
            }
            _ => {
                let focus = self.book_form.focus;
                if let Some(input) = self.book_form.fields.get_mut(focus)
                    && edit_text(input, key)
                {
                    self.book_form.error = None;
                }
            }
        }
    }

    fn commit_book_form(&mut self) {
        let draft = self.book_form.draft();
        if let Err(err) = draft.validate() {
            self.book_form.error = Some(err.to_string());
            return;
        }

        let result = match self.book_form.editing.clone() {
            Some(book_id) => self.storage.update_book(&book_id, &draft),
            None => self.storage.create_book(&draft).map(|_| ()),
        };

        match result {
            Ok(()) => {
                self.status = Some(format!("saved \"{}\"", draft.title.trim()));
                self.book_form = BookForm::default();
                self.reload_books();
            }
            Err(err) => self.book_form.error = Some(describe_error(&err)),
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => {}
            KeyCode::Char('n') | KeyCode::Esc => {
                self.confirm = None;
                return;
            }
            _ => return,
        }

        let Some(confirm) = self.confirm.take() else {
            return;
        };
        match confirm {
            ConfirmDelete::Book { book_id, title } => {
                match self.storage.delete_book(&book_id) {
                    Ok(()) => self.status = Some(format!("deleted \"{title}\"")),
                    Err(err) => self.status = Some(describe_error(&err)),
                }
                self.reload_books();
            }
            ConfirmDelete::Chapter {
                book_id,
                chapter_id,
                ..
            } => match self.storage.delete_chapter(&book_id, &chapter_id) {
                Ok(()) => self.refresh_chapters(None),
                Err(err) => self.reader.notice = Some(describe_error(&err)),
            },
        }
    }

    fn handle_settings_panel_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.settings_panel.open = false;
                if let Err(err) = self.storage.save_settings(&self.ctx.settings) {
                    self.status = Some(format!("save settings: {err:#}"));
                }
            }
            KeyCode::Down => {
                self.settings_panel.selected =
                    (self.settings_panel.selected + 1).min(SETTINGS_MENU_ITEM_COUNT - 1);
            }
            KeyCode::Up => {
                self.settings_panel.selected = self.settings_panel.selected.saturating_sub(1);
            }
            KeyCode::Enter | KeyCode::Left | KeyCode::Right | KeyCode::Char(' ') => {
                match self.settings_panel.selected {
                    SETTINGS_MENU_THEME => self.ctx.settings.cycle_theme(),
                    SETTINGS_MENU_DEFAULT_SORT => self.ctx.settings.cycle_default_sort(),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn handle_search_panel_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                if let Some(previous) = self.search_panel.snapshot.take() {
                    self.ctx.set_search_term(previous);
                }
                self.search_panel.open = false;
            }
            KeyCode::Enter => {
                self.search_panel.snapshot = None;
                self.search_panel.open = false;
            }
            _ => {
                let mut term = self.ctx.catalog.search_term.clone();
                if edit_text(&mut term, key) {
                    self.ctx.set_search_term(term);
                }
            }
        }
    }

    fn handle_genre_panel_key(&mut self, key: KeyEvent) {
        let genres = self.ctx.genres();
        match key.code {
            KeyCode::Esc | KeyCode::Enter => self.genre_panel.open = false,
            KeyCode::Down => {
                if self.genre_panel.cursor + 1 < genres.len() {
                    self.genre_panel.cursor += 1;
                }
            }
            KeyCode::Up => {
                self.genre_panel.cursor = self.genre_panel.cursor.saturating_sub(1);
            }
            KeyCode::Char(' ') => {
                if let Some(genre) = genres.get(self.genre_panel.cursor) {
                    self.ctx.toggle_genre(genre);
                }
            }
            KeyCode::Char('c') => {
                self.ctx.catalog.clear_genres();
                self.ctx.selected = 0;
            }
            _ => {}
        }
    }

    fn draw(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        frame.render_widget(Clear, area);
        if self.reader.open {
            self.draw_reader(area, frame);
        } else {
            self.draw_catalog(area, frame);
        }

        if self.chapter_list.open {
            self.draw_chapter_list(area, frame);
        }
        if self.chapter_form.open {
            self.draw_chapter_form(area, frame);
        }
        if self.book_form.open {
            self.draw_book_form(area, frame);
        }
        if self.confirm.is_some() {
            self.draw_confirm(area, frame);
        }
    }

    fn draw_catalog(&self, area: Rect, frame: &mut ratatui::Frame) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(area);

        let header = Paragraph::new(Text::from(self.catalog_header_lines()))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::BOTTOM));
        frame.render_widget(header, layout[0]);

        let body_layout = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(layout[1]);

        self.draw_library(frame, body_layout[0]);
        frame.render_widget(self.draw_details(), body_layout[1]);

        let footer = Paragraph::new(Text::from(self.catalog_footer_lines()))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::TOP));
        frame.render_widget(footer, layout[2]);

        if self.settings_panel.open {
            self.draw_settings_panel(area, frame);
        }
        if self.search_panel.open {
            self.draw_search_panel(area, frame);
        }
        if self.genre_panel.open {
            self.draw_genre_panel(area, frame);
        }
    }

    fn catalog_header_lines(&self) -> Vec<Line<'static>> {
        let catalog = &self.ctx.catalog;
        let matching = catalog.matching(&self.ctx.books).len();
        let mut summary = format!(
            "sort: {}  ·  page {}/{}  ·  {} of {} books",
            catalog.sort_key.label(),
            catalog.current_page,
            catalog.page_count(&self.ctx.books),
            matching,
            self.ctx.books.len()
        );
        if let Some(filters) = self.active_filter_summary() {
            summary.push_str("  ·  ");
            summary.push_str(&filters);
        }
        vec![
            Line::from(Span::styled(
                self.ctx.settings.feed_title.clone(),
                Style::default()
                    .fg(self.accent_color())
                    .add_modifier(Modifier::BOLD),
            )),
            Line::raw(summary),
        ]
    }

    fn active_filter_summary(&self) -> Option<String> {
        let catalog = &self.ctx.catalog;
        let mut parts = Vec::new();
        let query = catalog.search_term.trim();
        if !query.is_empty() {
            parts.push(format!("search \"{query}\""));
        }
        if !catalog.selected_genres.is_empty() {
            let genres: Vec<&str> = catalog.selected_genres.iter().map(String::as_str).collect();
            parts.push(format!("genres {}", genres.join(", ")));
        }
        (!parts.is_empty()).then(|| parts.join("  "))
    }

    fn catalog_footer_lines(&self) -> Vec<Line<'static>> {
        if let Some(status) = &self.status {
            return vec![Line::from(Span::styled(
                status.clone(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ))];
        }
        vec![Line::from(vec![
            key_hint("Enter"),
            Span::raw(" open  "),
            key_hint("/"),
            Span::raw(" search  "),
            key_hint("g"),
            Span::raw(" genres  "),
            key_hint("o"),
            Span::raw(" sort  "),
            key_hint("←/→"),
            Span::raw(" page  "),
            key_hint("r"),
            Span::raw(" reset  "),
            key_hint("n/e/x"),
            Span::raw(" new/edit/delete  "),
            key_hint("s"),
            Span::raw(" settings  "),
            key_hint("Esc"),
            Span::raw(" quit"),
        ])]
    }

    fn draw_library(&self, frame: &mut ratatui::Frame, area: Rect) {
        let visible = self.ctx.visible_books();
        let title = if self.ctx.catalog.has_filters() {
            "Catalog (filtered)"
        } else {
            "Catalog"
        };
        let block = Block::default().borders(Borders::ALL).title(title);

        if self.ctx.books.is_empty() {
            let lines = vec![
                Line::raw("No books yet."),
                Line::raw(""),
                Line::raw("Press n to create one, or run `scriptora seed`."),
            ];
            let paragraph = Paragraph::new(Text::from(lines))
                .block(block)
                .wrap(Wrap { trim: true });
            frame.render_widget(paragraph, area);
            return;
        }

        if visible.is_empty() {
            let mut lines = vec![Line::raw("No matches.")];
            if self.ctx.catalog.has_filters() {
                lines.push(Line::raw(""));
                lines.push(Line::raw("Tip: press r to reset filters."));
            }
            let paragraph = Paragraph::new(Text::from(lines))
                .block(block)
                .wrap(Wrap { trim: true });
            frame.render_widget(paragraph, area);
            return;
        }

        let max_width = area.width.saturating_sub(6) as usize;
        let items: Vec<ListItem> = visible
            .iter()
            .map(|book| {
                let metric = match self.ctx.catalog.sort_key {
                    SortKey::Title => String::new(),
                    SortKey::TotalChapters => format!(" [{} ch]", book.total_chapters),
                    SortKey::Views => format!(" [{} views]", book.views),
                };
                let label = format!("{} — {}{metric}", book.title, book.author);
                ListItem::new(Line::raw(fit_width(&label, max_width.max(8))))
            })
            .collect();

        let highlight_style = Style::default()
            .fg(Color::Black)
            .bg(self.accent_color())
            .add_modifier(Modifier::BOLD);

        let list = List::new(items)
            .block(block)
            .highlight_style(highlight_style)
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);

        let mut state = ListState::default();
        state.select(Some(self.ctx.selected.min(visible.len() - 1)));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_details(&self) -> Paragraph<'static> {
        let block = Block::default().borders(Borders::ALL).title("Details");
        let Some(book) = self.ctx.selected_book() else {
            return Paragraph::new(Text::from(vec![Line::raw("Nothing selected.")])).block(block);
        };

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let mut lines = vec![
            Line::from(Span::styled(
                book.title.clone(),
                bold.fg(self.accent_color()),
            )),
            Line::raw(""),
            Line::from(vec![
                Span::styled("Author: ", bold),
                Span::raw(book.author.clone()),
            ]),
            Line::from(vec![
                Span::styled("Genre: ", bold),
                Span::raw(if book.genre.is_empty() {
                    "-".to_string()
                } else {
                    book.genre.clone()
                }),
            ]),
            Line::from(vec![
                Span::styled("Chapters: ", bold),
                Span::raw(book.total_chapters.to_string()),
                Span::raw("   "),
                Span::styled("Views: ", bold),
                Span::raw(book.views.to_string()),
            ]),
        ];
        if !book.cover_image.trim().is_empty() {
            lines.push(Line::from(vec![
                Span::styled("Cover: ", bold),
                Span::raw(book.cover_image.clone()),
            ]));
        }
        lines.push(Line::raw(""));
        for line in book.synopsis.lines() {
            lines.push(Line::raw(line.to_string()));
        }

        Paragraph::new(Text::from(lines))
            .block(block)
            .wrap(Wrap { trim: false })
    }

    fn draw_search_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(60, 20, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "Search",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let matching = self.ctx.catalog.matching(&self.ctx.books).len();
        let lines = vec![
            Line::from(vec![
                Span::styled("Title, author or genre: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(self.ctx.catalog.search_term.clone()),
                Span::styled("▏", Style::default().fg(self.accent_color())),
            ]),
            Line::raw(""),
            Line::raw(format!("{matching} matching")),
            Line::raw("Enter keeps, Esc reverts, Ctrl+u clears."),
        ];
        let paragraph = Paragraph::new(Text::from(lines))
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);
    }

    fn draw_genre_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(40, 60, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "Genres",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let inner = block.inner(popup_area);
        frame.render_widget(block, popup_area);

        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(2)])
            .split(inner);

        let genres = self.ctx.genres();
        if genres.is_empty() {
            frame.render_widget(Paragraph::new("No genres in the catalog."), sections[0]);
        } else {
            let items: Vec<ListItem> = genres
                .iter()
                .map(|genre| {
                    let count = self
                        .ctx
                        .books
                        .iter()
                        .filter(|b| b.genre.trim() == genre.as_str())
                        .count();
                    let mark = if self.ctx.catalog.selected_genres.contains(genre) {
                        "[x]"
                    } else {
                        "[ ]"
                    };
                    ListItem::new(Line::raw(format!("{mark} {genre} ({count})")))
                })
                .collect();
            let list = List::new(items)
                .highlight_style(
                    Style::default()
                        .fg(Color::Black)
                        .bg(self.accent_color())
                        .add_modifier(Modifier::BOLD),
                )
                .highlight_symbol("> ")
                .highlight_spacing(HighlightSpacing::Always);
            let mut state = ListState::default();
            state.select(Some(self.genre_panel.cursor.min(genres.len() - 1)));
            frame.render_stateful_widget(list, sections[0], &mut state);
        }

        let help = Paragraph::new(Line::from(vec![
            key_hint("Space"),
            Span::raw(" toggle  "),
            key_hint("c"),
            Span::raw(" clear  "),
            key_hint("Esc"),
            Span::raw(" close"),
        ]))
        .wrap(Wrap { trim: true });
        frame.render_widget(help, sections[1]);
    }

    fn draw_settings_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(45, 30, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "Settings",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let inner = block.inner(popup_area);
        frame.render_widget(block, popup_area);

        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(3)])
            .split(inner);

        let selected = self.settings_panel.selected;
        let settings = &self.ctx.settings;
        let items = vec![
            ListItem::new(Line::from(vec![
                Span::styled("Theme: ", Style::default().add_modifier(Modifier::BOLD)),
                option_chip("dark", settings.theme == Theme::Dark, selected == SETTINGS_MENU_THEME),
                Span::raw(" "),
                option_chip(
                    "light",
                    settings.theme == Theme::Light,
                    selected == SETTINGS_MENU_THEME,
                ),
            ])),
            ListItem::new(Line::from(vec![
                Span::styled("Default sort: ", Style::default().add_modifier(Modifier::BOLD)),
                option_chip(
                    "title",
                    settings.default_sort == SortKey::Title,
                    selected == SETTINGS_MENU_DEFAULT_SORT,
                ),
                Span::raw(" "),
                option_chip(
                    "chapters",
                    settings.default_sort == SortKey::TotalChapters,
                    selected == SETTINGS_MENU_DEFAULT_SORT,
                ),
                Span::raw(" "),
                option_chip(
                    "views",
                    settings.default_sort == SortKey::Views,
                    selected == SETTINGS_MENU_DEFAULT_SORT,
                ),
            ])),
        ];

        let list = List::new(items)
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(self.accent_color())
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);

        let mut state = ListState::default();
        state.select(Some(selected.min(SETTINGS_MENU_ITEM_COUNT - 1)));
        frame.render_stateful_widget(list, sections[0], &mut state);

        let help = Paragraph::new(Line::from(vec![
            key_hint("↑/↓"),
            Span::raw(" select  "),
            key_hint("Enter/←/→"),
            Span::raw(" change  "),
            key_hint("Esc"),
            Span::raw(" save & close"),
        ]))
        .wrap(Wrap { trim: true });
        frame.render_widget(help, sections[1]);
    }

    fn draw_reader(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        let state = self.reader.session.as_ref().map(ReaderSession::state);
        let fullscreen = state == Some(ReaderState::Reading)
            && self
                .reader
                .session
                .as_ref()
                .is_some_and(ReaderSession::is_fullscreen);

        if fullscreen {
            self.draw_chapter(area, frame, false);
            return;
        }

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(2),
            ])
            .split(area);

        let title_text = match &self.reader.book {
            Some(book) => format!("{} — {}", book.title, book.author),
            None => "Reader".to_string(),
        };
        let header = Paragraph::new(Line::from(Span::styled(
            title_text,
            Style::default()
                .fg(self.accent_color())
                .add_modifier(Modifier::BOLD),
        )))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::BOTTOM));
        frame.render_widget(header, layout[0]);

        match state {
            Some(ReaderState::Reading) => self.draw_chapter(layout[1], frame, true),
            Some(ReaderState::Cover) => frame.render_widget(self.draw_cover(), layout[1]),
            Some(ReaderState::Unavailable) => {
                let lines = vec![
                    Line::raw(""),
                    Line::from(Span::styled(
                        "Not available",
                        Style::default().add_modifier(Modifier::BOLD),
                    )),
                    Line::raw(""),
                    Line::raw("This book has no chapters yet."),
                ];
                let paragraph = Paragraph::new(Text::from(lines)).alignment(Alignment::Center);
                frame.render_widget(paragraph, layout[1]);
            }
            None => {
                let message = if self.reader.not_found {
                    "Book not found.".to_string()
                } else if let Some(err) = &self.reader.error {
                    format!("Could not load chapters: {err}")
                } else {
                    "Loading chapters…".to_string()
                };
                let paragraph = Paragraph::new(message)
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true });
                frame.render_widget(paragraph, layout[1]);
            }
        }

        let footer = Paragraph::new(Text::from(self.reader_footer_lines(state)))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::TOP));
        frame.render_widget(footer, layout[2]);
    }

    fn reader_footer_lines(&self, state: Option<ReaderState>) -> Vec<Line<'static>> {
        if let Some(notice) = &self.reader.notice {
            return vec![Line::from(Span::styled(
                notice.clone(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ))];
        }
        let spans = match state {
            Some(ReaderState::Reading) => vec![
                key_hint("←/→"),
                Span::raw(" chapter  "),
                key_hint("↑/↓"),
                Span::raw(" scroll  "),
                key_hint("c"),
                Span::raw(" chapters  "),
                key_hint("f"),
                Span::raw(" fullscreen  "),
                key_hint("a/e/x"),
                Span::raw(" add/edit/delete  "),
                key_hint("Esc"),
                Span::raw(" close book"),
            ],
            Some(ReaderState::Cover) => vec![
                key_hint("Enter"),
                Span::raw(" open  "),
                key_hint("a"),
                Span::raw(" add chapter  "),
                key_hint("Esc"),
                Span::raw(" back"),
            ],
            Some(ReaderState::Unavailable) => vec![
                key_hint("a"),
                Span::raw(" add chapter  "),
                key_hint("Esc"),
                Span::raw(" back"),
            ],
            None => vec![key_hint("Esc"), Span::raw(" back")],
        };
        vec![Line::from(spans)]
    }

    fn draw_cover(&self) -> Paragraph<'static> {
        let Some(book) = &self.reader.book else {
            return Paragraph::new("");
        };
        let chapters = self
            .reader
            .session
            .as_ref()
            .map_or(0, |session| session.chapters().len());
        let lines = vec![
            Line::raw(""),
            Line::raw(""),
            Line::from(Span::styled(
                book.title.clone(),
                Style::default()
                    .fg(self.accent_color())
                    .add_modifier(Modifier::BOLD),
            )),
            Line::raw(""),
            Line::from(Span::styled(
                format!("by {}", book.author),
                Style::default().add_modifier(Modifier::ITALIC),
            )),
            Line::raw(""),
            Line::raw(format!(
                "{} · {chapters} chapter{}",
                if book.genre.is_empty() { "-" } else { book.genre.as_str() },
                if chapters == 1 { "" } else { "s" }
            )),
            Line::raw(""),
            Line::from(vec![
                Span::raw("[ "),
                key_hint("Enter"),
                Span::raw(" open book ]"),
            ]),
        ];
        Paragraph::new(Text::from(lines))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL))
            .wrap(Wrap { trim: true })
    }

    fn draw_chapter(&mut self, area: Rect, frame: &mut ratatui::Frame, with_progress: bool) {
        self.reader.ensure_rendered();
        let Some(session) = self.reader.session.as_ref() else {
            return;
        };
        let Some(chapter) = session.current_chapter() else {
            return;
        };

        let sections = if with_progress {
            Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0), Constraint::Length(1)])
                .split(area)
        } else {
            Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0)])
                .split(area)
        };

        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            chapter.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let lines = self.reader.chapter_lines.clone().unwrap_or_default();
        let paragraph = Paragraph::new(Text::from(lines))
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((self.reader.scroll, 0));
        frame.render_widget(paragraph, sections[0]);

        if with_progress && let Some(progress) = session.progress() {
            let gauge = Gauge::default()
                .gauge_style(Style::default().fg(self.accent_color()))
                .ratio(f64::from(progress.fraction()))
                .label(format!(
                    "Chapter {} of {}",
                    progress.current_chapter, progress.total_chapters
                ));
            frame.render_widget(gauge, sections[1]);
        }
    }

    fn draw_chapter_list(&self, area: Rect, frame: &mut ratatui::Frame) {
        let Some(session) = self.reader.session.as_ref() else {
            return;
        };
        let popup_area = centered_rect(50, 60, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "Chapters",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let items: Vec<ListItem> = session
            .chapters()
            .iter()
            .enumerate()
            .map(|(idx, chapter)| {
                let marker = if idx == session.current_index() { "•" } else { " " };
                ListItem::new(Line::raw(format!("{marker} {}. {}", idx + 1, chapter.title)))
            })
            .collect();
        let list = List::new(items)
            .block(block)
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(self.accent_color())
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        if !session.chapters().is_empty() {
            state.select(Some(
                self.chapter_list
                    .cursor
                    .min(session.chapters().len() - 1),
            ));
        }
        frame.render_stateful_widget(list, popup_area, &mut state);
    }

    fn draw_chapter_form(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(80, 70, area);
        frame.render_widget(Clear, popup_area);

        let title = if self.chapter_form.editing.is_some() {
            "Edit chapter"
        } else {
            "New chapter"
        };
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            title,
            Style::default().add_modifier(Modifier::BOLD),
        ));
        let inner = block.inner(popup_area);
        frame.render_widget(block, popup_area);

        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(2),
            ])
            .split(inner);

        let focused = Style::default().fg(self.accent_color());
        let title_block = Block::default()
            .borders(Borders::ALL)
            .title("Title")
            .border_style(if self.chapter_form.focus == ChapterField::Title {
                focused
            } else {
                Style::default()
            });
        frame.render_widget(
            Paragraph::new(self.chapter_form.title.clone()).block(title_block),
            sections[0],
        );

        let content_block = Block::default()
            .borders(Borders::ALL)
            .title("Content (**bold**, *italic*)")
            .border_style(if self.chapter_form.focus == ChapterField::Content {
                focused
            } else {
                Style::default()
            });
        frame.render_widget(
            Paragraph::new(self.chapter_form.content.clone())
                .block(content_block)
                .wrap(Wrap { trim: false }),
            sections[1],
        );

        let help = match &self.chapter_form.error {
            Some(err) => Line::from(Span::styled(
                err.clone(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            None => Line::from(vec![
                key_hint("Tab"),
                Span::raw(" switch field  "),
                key_hint("Ctrl+s"),
                Span::raw(" save  "),
                key_hint("Esc"),
                Span::raw(" cancel"),
            ]),
        };
        frame.render_widget(Paragraph::new(help), sections[2]);
    }

    fn draw_book_form(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(70, 60, area);
        frame.render_widget(Clear, popup_area);

        let title = if self.book_form.editing.is_some() {
            "Edit book"
        } else {
            "New book"
        };
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            title,
            Style::default().add_modifier(Modifier::BOLD),
        ));

        let mut lines = Vec::new();
        for (idx, (label, value)) in BOOK_FORM_LABELS
            .iter()
            .zip(self.book_form.fields.iter())
            .enumerate()
        {
            let focused = idx == self.book_form.focus;
            let label_style = if focused {
                Style::default()
                    .fg(self.accent_color())
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().add_modifier(Modifier::BOLD)
            };
            let mut spans = vec![
                Span::styled(format!("{label}: "), label_style),
                Span::raw(value.clone()),
            ];
            if focused {
                spans.push(Span::styled("▏", Style::default().fg(self.accent_color())));
            }
            lines.push(Line::from(spans));
        }
        lines.push(Line::raw(""));
        match &self.book_form.error {
            Some(err) => lines.push(Line::from(Span::styled(
                err.clone(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ))),
            None => lines.push(Line::from(vec![
                key_hint("Tab/↑/↓"),
                Span::raw(" field  "),
                key_hint("Ctrl+s"),
                Span::raw(" save  "),
                key_hint("Esc"),
                Span::raw(" cancel"),
            ])),
        }

        let paragraph = Paragraph::new(Text::from(lines))
            .block(block)
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, popup_area);
    }

    fn draw_confirm(&self, area: Rect, frame: &mut ratatui::Frame) {
        let Some(confirm) = &self.confirm else {
            return;
        };
        let popup_area = centered_rect(50, 20, area);
        frame.render_widget(Clear, popup_area);

        let question = match confirm {
            ConfirmDelete::Book { title, .. } => {
                format!("Delete book \"{title}\" and all of its chapters?")
            }
            ConfirmDelete::Chapter { title, .. } => format!("Delete chapter \"{title}\"?"),
        };
        let lines = vec![
            Line::raw(question),
            Line::raw(""),
            Line::from(vec![
                key_hint("y"),
                Span::raw(" delete  "),
                key_hint("n"),
                Span::raw(" keep"),
            ]),
        ];
        let paragraph = Paragraph::new(Text::from(lines))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(Span::styled(
                        "Confirm",
                        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                    )),
            )
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);
    }
}

/// Fullscreen in a terminal means dropping the reader chrome; the only
/// way the request fails is when the terminal cannot be queried.
struct TerminalFullscreen;

impl FullscreenHost for TerminalFullscreen {
    fn request_fullscreen(&mut self, enable: bool) -> anyhow::Result<()> {
        if enable {
            terminal::size().context("query terminal size")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct SettingsPanel {
    open: bool,
    selected: usize,
}

const SETTINGS_MENU_THEME: usize = 0;
const SETTINGS_MENU_DEFAULT_SORT: usize = 1;
const SETTINGS_MENU_ITEM_COUNT: usize = 2;

#[derive(Debug, Clone, Default)]
struct SearchPanel {
    open: bool,
    /// Term to restore on Esc.
    snapshot: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct GenrePanel {
    open: bool,
    cursor: usize,
}

#[derive(Debug, Clone, Default)]
struct ChapterListPanel {
    open: bool,
    cursor: usize,
}

const BOOK_FORM_LABELS: [&str; 5] = ["Title", "Author", "Genre", "Synopsis", "Cover style"];

#[derive(Debug, Clone, Default)]
struct BookForm {
    open: bool,
    editing: Option<String>,
    fields: [String; 5],
    focus: usize,
    error: Option<String>,
}

impl BookForm {
    fn new_book() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    fn edit(book: &Book) -> Self {
        Self {
            open: true,
            editing: Some(book.id.clone()),
            fields: [
                book.title.clone(),
                book.author.clone(),
                book.genre.clone(),
                book.synopsis.clone(),
                book.cover_image.clone(),
            ],
            focus: 0,
            error: None,
        }
    }

    fn draft(&self) -> BookDraft {
        let [title, author, genre, synopsis, cover_image] = self.fields.clone();
        BookDraft {
            title,
            author,
            genre,
            synopsis,
            cover_image,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum ChapterField {
    #[default]
    Title,
    Content,
}

impl ChapterField {
    fn toggle(self) -> Self {
        match self {
            ChapterField::Title => ChapterField::Content,
            ChapterField::Content => ChapterField::Title,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ChapterForm {
    open: bool,
    editing: Option<String>,
    title: String,
    content: String,
    focus: ChapterField,
    error: Option<String>,
}

impl ChapterForm {
    fn new_chapter() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    fn edit(chapter_id: String, title: String, content: String) -> Self {
        Self {
            open: true,
            editing: Some(chapter_id),
            title,
            content,
            focus: ChapterField::Title,
            error: None,
        }
    }
}

#[derive(Debug, Clone)]
enum ConfirmDelete {
    Book {
        book_id: String,
        title: String,
    },
    Chapter {
        book_id: String,
        chapter_id: String,
        title: String,
    },
}

#[derive(Debug, Default)]
struct ReaderPanel {
    open: bool,
    book: Option<Book>,
    /// `None` until the chapter load for `book` lands.
    session: Option<ReaderSession>,
    not_found: bool,
    error: Option<String>,
    scroll: u16,
    chapter_lines: Option<Vec<Line<'static>>>,
    notice: Option<String>,
}

impl ReaderPanel {
    fn open_book(&mut self, book: Book) {
        *self = Self {
            open: true,
            book: Some(book),
            ..Self::default()
        };
    }

    fn book_id(&self) -> Option<String> {
        self.book.as_ref().map(|book| book.id.clone())
    }

    fn apply_load(&mut self, outcome: LoadOutcome) {
        if self.book_id().as_deref() != Some(outcome.book_id.as_str()) {
            return;
        }
        match outcome.result {
            Ok(Some(chapters)) => {
                self.session = Some(ReaderSession::new(outcome.book_id, chapters));
            }
            Ok(None) => self.not_found = true,
            Err(err) => {
                tracing::warn!(book_id = %outcome.book_id, "load chapters: {err:#}");
                self.error = Some(format!("{err:#}"));
            }
        }
        self.invalidate_render();
    }

    fn invalidate_render(&mut self) {
        self.scroll = 0;
        self.chapter_lines = None;
    }

    fn ensure_rendered(&mut self) {
        if self.chapter_lines.is_some() {
            return;
        }
        let Some(chapter) = self
            .session
            .as_ref()
            .and_then(ReaderSession::current_chapter)
        else {
            return;
        };
        self.chapter_lines = Some(chapter_lines(&chapter.content));
    }
}

fn chapter_lines(content: &str) -> Vec<Line<'static>> {
    segments(content)
        .into_iter()
        .map(|line| {
            let spans: Vec<Span<'static>> = line
                .into_iter()
                .map(|segment| {
                    let style = match segment.emphasis {
                        Emphasis::Plain => Style::default(),
                        Emphasis::Bold => Style::default().add_modifier(Modifier::BOLD),
                        Emphasis::Italic => Style::default().add_modifier(Modifier::ITALIC),
                    };
                    Span::styled(segment.text, style)
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

fn describe_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<LibraryError>() {
        Some(err) => err.to_string(),
        None => format!("{err:#}"),
    }
}

/// Single-line editing shared by every text field.
fn edit_text(input: &mut String, key: KeyEvent) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('u') if ctrl => {
            input.clear();
            true
        }
        KeyCode::Char(c) if !ctrl => {
            input.push(c);
            true
        }
        KeyCode::Backspace => input.pop().is_some(),
        _ => false,
    }
}

fn fit_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut width = 0;
    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if width + ch_width + 1 > max_width {
            break;
        }
        out.push(ch);
        width += ch_width;
    }
    out.push('…');
    out
}

fn key_hint(label: &str) -> Span<'static> {
    Span::styled(label.to_string(), Style::default().add_modifier(Modifier::BOLD))
}

fn option_chip(label: &str, selected: bool, row_selected: bool) -> Span<'static> {
    let base = if selected && row_selected {
        Style::default().add_modifier(Modifier::REVERSED | Modifier::BOLD)
    } else if selected {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };

    Span::styled(label.to_string(), base)
}

fn setup_terminal() -> anyhow::Result<Terminal<CrosstermBackend<Stdout>>> {
    terminal::enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    terminal::disable_raw_mode().context("disable raw mode")?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("leave alt screen")?;
    Ok(())
}

fn panic_to_string(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: (unknown payload)".to_string()
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn edit_text_handles_typing_and_clearing() {
        let mut input = String::new();
        assert!(edit_text(&mut input, key(KeyCode::Char('a'))));
        assert!(edit_text(&mut input, key(KeyCode::Char('b'))));
        assert_eq!(input, "ab");
        assert!(edit_text(&mut input, key(KeyCode::Backspace)));
        assert_eq!(input, "a");
        assert!(edit_text(
            &mut input,
            KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL)
        ));
        assert!(input.is_empty());
        assert!(!edit_text(&mut input, key(KeyCode::Backspace)));
        assert!(!edit_text(&mut input, key(KeyCode::Left)));
    }

    #[test]
    fn fit_width_truncates_with_ellipsis() {
        assert_eq!(fit_width("short", 10), "short");
        assert_eq!(fit_width("abcdefghij", 5), "abcd…");
        assert_eq!(fit_width("日本語の本", 5), "日本…");
    }

    #[test]
    fn chapter_lines_carry_emphasis() {
        let lines = chapter_lines("**Storm** rising\n*quiet*");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].spans[0].content, "Storm");
        assert!(lines[0].spans[0].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(lines[0].spans[1].content, " rising");
        assert!(lines[1].spans[0].style.add_modifier.contains(Modifier::ITALIC));
    }

    #[test]
    fn describe_error_prefers_library_errors() {
        let err: anyhow::Error = LibraryError::Validation("chapter title is required".into()).into();
        assert_eq!(describe_error(&err), "invalid input: chapter title is required");
        let err = anyhow::anyhow!("disk on fire");
        assert_eq!(describe_error(&err), "disk on fire");
    }

    #[test]
    fn book_form_builds_draft_from_fields() {
        let book = Book {
            id: "b1".to_string(),
            title: "Deep Field".to_string(),
            author: "Ada Stone".to_string(),
            genre: "Sci-Fi".to_string(),
            synopsis: "Stars.".to_string(),
            cover_image: "#112233".to_string(),
            total_chapters: 0,
            created_at: 0,
            views: 0,
        };
        let form = BookForm::edit(&book);
        assert_eq!(form.editing.as_deref(), Some("b1"));
        let draft = form.draft();
        assert_eq!(draft.title, "Deep Field");
        assert_eq!(draft.cover_image, "#112233");
        assert!(BookForm::new_book().draft().validate().is_err());
    }

    #[test]
    fn reader_panel_ignores_loads_for_other_books() {
        let mut panel = ReaderPanel::default();
        panel.open_book(Book {
            id: "b1".to_string(),
            title: "T".to_string(),
            author: "A".to_string(),
            genre: String::new(),
            synopsis: String::new(),
            cover_image: String::new(),
            total_chapters: 0,
            created_at: 0,
            views: 0,
        });
        panel.apply_load(LoadOutcome {
            book_id: "other".to_string(),
            result: Ok(Some(Vec::new())),
        });
        assert!(panel.session.is_none());

        panel.apply_load(LoadOutcome {
            book_id: "b1".to_string(),
            result: Ok(None),
        });
        assert!(panel.not_found);
    }
}
