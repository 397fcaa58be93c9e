use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use std::io;
use std::time::{Duration, Instant};

use crate::context::ReviewContext;
use crate::host::MemoryThread;
use crate::manager::ManagerId;
use crate::state::{CommentDb, FileSummary, draft_id, unix_now};
use crate::thread::{CollapsibleState, CommentThread, ThreadId};
use crate::{Comment, CommentSide};

const DONE_MESSAGE: &str = "Done";

/// Application state for the thread browser.
pub struct App {
    db: CommentDb,
    ctx: ReviewContext<MemoryThread>,
    author: String,
    files: Vec<FileSummary>,
    selected_file: usize,
    selected_thread: usize,
    /// One manager per side of the selected file, Parent first.
    open_managers: Vec<ManagerId>,
    should_quit: bool,
    show_help: bool,
    confirm_publish: bool,
    status_message: Option<(String, Instant)>,
}

impl App {
    /// Load the files with comments and show the first one.
    pub fn new(db: CommentDb, author: String) -> Result<Self> {
        let files = db.files().context("Failed to list commented files")?;
        let mut app = Self {
            db,
            ctx: ReviewContext::new(),
            author,
            files,
            selected_file: 0,
            selected_thread: 0,
            open_managers: Vec::new(),
            should_quit: false,
            show_help: false,
            confirm_publish: false,
            status_message: None,
        };
        app.open_selected_file()?;
        Ok(app)
    }

    fn selected_path(&self) -> Option<&str> {
        self.files.get(self.selected_file).map(|f| f.path.as_str())
    }

    /// Replace the shown threads with those of the selected file, both sides.
    fn open_selected_file(&mut self) -> Result<()> {
        for manager in self.open_managers.drain(..) {
            self.ctx.close_file(manager);
        }
        self.selected_thread = 0;

        let Some(path) = self.selected_path().map(str::to_string) else {
            return Ok(());
        };
        let comments = self.db.comments_for_file(&path).context("Failed to load comments")?;
        for side in [CommentSide::Parent, CommentSide::Revision] {
            let manager = self.ctx.open_file(&path, side, comments.clone(), MemoryThread::new);
            self.open_managers.push(manager);
        }
        Ok(())
    }

    /// Re-read the file list, keeping the current file selected if it still exists.
    fn reload_files(&mut self) -> Result<()> {
        let current = self.selected_path().map(str::to_string);
        self.files = self.db.files().context("Failed to list commented files")?;

        match current.and_then(|p| self.files.iter().position(|f| f.path == p)) {
            Some(idx) => self.selected_file = idx,
            None => {
                self.selected_file = self.selected_file.min(self.files.len().saturating_sub(1));
                self.open_selected_file()?;
            }
        }
        Ok(())
    }

    fn visible_threads(&self) -> Vec<ThreadId> {
        self.shown_threads().iter().map(|t| t.id()).collect()
    }

    fn shown_threads(&self) -> Vec<&CommentThread<MemoryThread>> {
        self.open_managers
            .iter()
            .flat_map(|&manager| self.ctx.threads_in(manager))
            .collect()
    }

    fn selected_thread_id(&self) -> Option<ThreadId> {
        self.visible_threads().get(self.selected_thread).copied()
    }

    fn clamp_thread_selection(&mut self) {
        let count = self.visible_threads().len();
        self.selected_thread = self.selected_thread.min(count.saturating_sub(1));
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    /// Handle keyboard input.
    fn handle_input(&mut self, key: event::KeyEvent) -> Result<()> {
        if self.confirm_publish {
            self.confirm_publish = false;
            if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                self.publish_current_file()?;
            }
            return Ok(());
        }

        if self.show_help {
            self.show_help = false;
            return Ok(());
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char('?') => {
                self.show_help = true;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                let count = self.visible_threads().len();
                if self.selected_thread + 1 < count {
                    self.selected_thread += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected_thread = self.selected_thread.saturating_sub(1);
            }
            KeyCode::Tab => {
                if self.selected_file + 1 < self.files.len() {
                    self.selected_file += 1;
                    self.open_selected_file()?;
                }
            }
            KeyCode::BackTab => {
                if self.selected_file > 0 {
                    self.selected_file -= 1;
                    self.open_selected_file()?;
                }
            }
            KeyCode::Enter => {
                if let Some(id) = self.selected_thread_id() {
                    self.ctx.toggle_collapsed(id);
                }
            }
            KeyCode::Char('d') => {
                self.reply_done()?;
            }
            KeyCode::Char('x') => {
                self.discard_last_draft()?;
            }
            KeyCode::Char('P') => {
                if self.selected_path().is_some() {
                    self.confirm_publish = true;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Add a resolving "Done" draft to the selected thread.
    fn reply_done(&mut self) -> Result<()> {
        let Some(id) = self.selected_thread_id() else {
            return Ok(());
        };
        let Some(thread) = self.ctx.threads().get(id) else {
            return Ok(());
        };
        if !thread.can_reply() {
            self.set_status("Thread has a pending draft; publish or discard it first");
            return Ok(());
        }
        let Some(last) = thread.last_comment() else {
            return Ok(());
        };

        let reply = Comment {
            id: draft_id(&last.path, last.range.start_line, DONE_MESSAGE),
            path: last.path.clone(),
            side: last.side,
            range: last.range,
            author: self.author.clone(),
            message: DONE_MESSAGE.to_string(),
            draft: true,
            unresolved: false,
            in_reply_to: Some(last.id.clone()),
            updated_at: unix_now(),
        };

        self.db.upsert(&reply).context("Failed to save draft reply")?;
        self.ctx.push_comment(id, reply);
        self.reload_files()?;
        self.set_status("Draft reply saved");
        Ok(())
    }

    /// Delete the selected thread's last comment if it is a draft.
    fn discard_last_draft(&mut self) -> Result<()> {
        let Some(id) = self.selected_thread_id() else {
            return Ok(());
        };
        let Some(last) = self.ctx.threads().get(id).and_then(|t| t.last_comment()) else {
            return Ok(());
        };
        if !last.draft {
            self.set_status("Last comment is published; nothing to discard");
            return Ok(());
        }
        let comment_id = last.id.clone();

        self.db.delete_draft(&comment_id).context("Failed to delete draft")?;
        self.ctx.remove_comment(id, &comment_id);
        self.clamp_thread_selection();
        self.reload_files()?;
        self.set_status("Draft discarded");
        Ok(())
    }

    /// Publish the drafts of the current file and redraw its threads.
    fn publish_current_file(&mut self) -> Result<()> {
        let Some(path) = self.selected_path().map(str::to_string) else {
            return Ok(());
        };
        let count = self.db.publish_file(&path).context("Failed to publish drafts")?;
        self.reload_files()?;
        self.open_selected_file()?;
        self.set_status(format!("Published {} drafts on {}", count, path));
        Ok(())
    }

    /// Render the UI.
    fn render(&mut self, frame: &mut Frame) {
        let expired = self
            .status_message
            .as_ref()
            .map(|(_, time)| time.elapsed() >= Duration::from_secs(3))
            .unwrap_or(false);
        if expired {
            self.status_message = None;
        }

        if self.show_help {
            self.render_help(frame);
            return;
        }

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3)])
            .split(frame.area());

        let main_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
            .split(chunks[0]);

        self.render_file_list(frame, main_chunks[0]);
        self.render_threads(frame, main_chunks[1]);
        self.render_status_bar(frame, chunks[1]);

        if self.confirm_publish {
            self.render_confirm(frame);
        }
    }

    fn render_file_list(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .files
            .iter()
            .enumerate()
            .map(|(idx, file)| {
                let color = if file.drafts > 0 {
                    Color::Yellow
                } else {
                    Color::Gray
                };
                let style = if idx == self.selected_file {
                    Style::default().fg(color).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(color)
                };
                ListItem::new(format!(
                    "{} ({}, {} drafts)",
                    file.path, file.comments, file.drafts
                ))
                .style(style)
            })
            .collect();

        let list = List::new(items).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Files (Tab/Shift+Tab)"),
        );

        frame.render_widget(list, area);
    }

    fn render_threads(&self, frame: &mut Frame, area: Rect) {
        if self.open_managers.is_empty() {
            let paragraph = Paragraph::new("No comments")
                .block(Block::default().borders(Borders::ALL).title("Threads"));
            frame.render_widget(paragraph, area);
            return;
        }

        let mut lines = Vec::new();
        for (idx, thread) in self.shown_threads().into_iter().enumerate() {
            let marker = if idx == self.selected_thread { ">" } else { " " };
            let color = if thread.is_resolved() {
                Color::Green
            } else {
                Color::Red
            };
            let mut header = vec![Span::styled(
                format!("{} L{} {}", marker, thread.range().start_line, thread.label()),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )];
            if thread.side() == CommentSide::Parent {
                header.push(Span::styled(" (base)", Style::default().fg(Color::DarkGray)));
            }
            if thread.has_drafts() {
                header.push(Span::styled(" [draft]", Style::default().fg(Color::Yellow)));
            }
            lines.push(Line::from(header));

            match thread.collapsible_state() {
                Some(CollapsibleState::Expanded) => {
                    for comment in thread.comments() {
                        let style = if comment.draft {
                            Style::default().fg(Color::Yellow)
                        } else {
                            Style::default()
                        };
                        lines.push(Line::from(vec![
                            Span::styled(
                                format!("    {}: ", comment.author),
                                Style::default().fg(Color::Cyan),
                            ),
                            Span::styled(comment.message.clone(), style),
                        ]));
                    }
                }
                _ => {
                    lines.push(Line::from(Span::styled(
                        format!("    … {} comments", thread.comments().len()),
                        Style::default().fg(Color::DarkGray),
                    )));
                }
            }
        }

        let title = match self.selected_path() {
            Some(path) => format!("Threads: {}", path),
            None => "Threads".to_string(),
        };
        let paragraph = Paragraph::new(Text::from(lines))
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: false });

        frame.render_widget(paragraph, area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let status_text = match &self.status_message {
            Some((msg, _)) => msg.clone(),
            None => {
                let threads = self.visible_threads().len();
                format!(
                    "{} threads | j/k=nav Enter=expand d=done x=discard P=publish \
                     Tab=file ?=help q=quit",
                    threads
                )
            }
        };

        let paragraph = Paragraph::new(status_text)
            .block(Block::default().borders(Borders::ALL))
            .wrap(Wrap { trim: false });

        frame.render_widget(paragraph, area);
    }

    fn render_help(&self, frame: &mut Frame) {
        let help_text = [
            "Gerrit Threads - Keyboard Shortcuts",
            "",
            "Navigation:",
            "  j / Down      - Next thread",
            "  k / Up        - Previous thread",
            "  Tab           - Next file",
            "  Shift+Tab     - Previous file",
            "",
            "Actions:",
            "  Enter         - Expand / collapse thread",
            "  d             - Reply \"Done\" (resolves the thread)",
            "  x             - Discard the thread's last draft",
            "  P (Shift+P)   - Publish drafts on this file",
            "",
            "Other:",
            "  ?             - Show this help",
            "  q / Esc       - Quit",
            "",
            "Press any key to close this help",
        ];

        let text = Text::from(help_text.iter().map(|&s| Line::from(s)).collect::<Vec<_>>());

        let paragraph = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Help"))
            .wrap(Wrap { trim: false });

        let area = centered_rect(60, 80, frame.area());
        frame.render_widget(paragraph, area);
    }

    fn render_confirm(&self, frame: &mut Frame) {
        let Some(file) = self.files.get(self.selected_file) else {
            return;
        };
        let message = format!(
            "Publish {} drafts on {}?\n\n(y)es / (n)o",
            file.drafts, file.path
        );

        let paragraph = Paragraph::new(message)
            .block(Block::default().borders(Borders::ALL).title("Confirm"))
            .wrap(Wrap { trim: false })
            .style(Style::default().fg(Color::Yellow));

        let area = centered_rect(50, 30, frame.area());
        frame.render_widget(Clear, area);
        frame.render_widget(paragraph, area);
    }
}

/// Create a centered rectangle.
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

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("Failed to create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

/// Launch the interactive thread browser.
pub fn run_tui(mut app: App) -> Result<()> {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic_info);
    }));

    let mut terminal = setup_terminal()?;

    let result = (|| -> Result<()> {
        loop {
            terminal
                .draw(|f| app.render(f))
                .context("Failed to draw frame")?;

            if app.should_quit {
                break;
            }

            if event::poll(Duration::from_millis(200)).context("Failed to poll events")?
                && let Event::Key(key) = event::read().context("Failed to read event")?
                && key.kind == event::KeyEventKind::Press
            {
                app.handle_input(key)?;
            }
        }
        Ok(())
    })();

    restore_terminal(&mut terminal)?;

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommentRange;
    use crossterm::event::{KeyEvent, KeyModifiers};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn seeded_app(dir: &tempfile::TempDir) -> App {
        let mut db = CommentDb::open(&dir.path().join("comments.db")).unwrap();
        db.upsert(&Comment {
            id: "c1".to_string(),
            path: "src/lib.rs".to_string(),
            side: CommentSide::Revision,
            range: CommentRange::line(4),
            author: "reviewer".to_string(),
            message: "Why?".to_string(),
            draft: false,
            unresolved: true,
            in_reply_to: None,
            updated_at: 1,
        })
        .unwrap();
        App::new(db, "me".to_string()).unwrap()
    }

    #[test]
    fn new_app_opens_first_file() {
        let dir = tempfile::tempdir().unwrap();
        let app = seeded_app(&dir);
        assert_eq!(app.selected_path(), Some("src/lib.rs"));
        assert_eq!(app.visible_threads().len(), 1);
    }

    #[test]
    fn done_then_discard_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = seeded_app(&dir);
        let id = app.selected_thread_id().unwrap();

        app.handle_input(key(KeyCode::Char('d'))).unwrap();
        let thread = app.ctx.threads().get(id).unwrap();
        assert!(thread.is_resolved());
        assert!(!thread.can_reply());
        assert_eq!(app.files[0].drafts, 1);

        app.handle_input(key(KeyCode::Char('x'))).unwrap();
        let thread = app.ctx.threads().get(id).unwrap();
        assert!(!thread.is_resolved());
        assert_eq!(thread.comments().len(), 1);
        assert_eq!(app.files[0].drafts, 0);
    }

    #[test]
    fn parent_side_threads_are_listed_and_published() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = CommentDb::open(&dir.path().join("comments.db")).unwrap();
        db.upsert(&Comment {
            id: "base".to_string(),
            path: "src/lib.rs".to_string(),
            side: CommentSide::Parent,
            range: CommentRange::line(4),
            author: "me".to_string(),
            message: "Was this removed on purpose?".to_string(),
            draft: true,
            unresolved: true,
            in_reply_to: None,
            updated_at: 2,
        })
        .unwrap();
        let mut app = App::new(db, "me".to_string()).unwrap();

        let shown = app.shown_threads();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].side(), CommentSide::Parent);
        assert_eq!(app.files[0].drafts, 1);

        app.handle_input(key(KeyCode::Char('P'))).unwrap();
        app.handle_input(key(KeyCode::Char('y'))).unwrap();
        assert_eq!(app.files[0].drafts, 0);
        assert!(!app.shown_threads()[0].has_drafts());
    }

    #[test]
    fn publish_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = seeded_app(&dir);
        app.handle_input(key(KeyCode::Char('d'))).unwrap();

        app.handle_input(key(KeyCode::Char('P'))).unwrap();
        app.handle_input(key(KeyCode::Char('n'))).unwrap();
        assert_eq!(app.files[0].drafts, 1);

        app.handle_input(key(KeyCode::Char('P'))).unwrap();
        app.handle_input(key(KeyCode::Char('y'))).unwrap();
        assert_eq!(app.files[0].drafts, 0);
        let id = app.selected_thread_id().unwrap();
        assert!(app.ctx.threads().get(id).unwrap().can_reply());
    }

    #[test]
    fn enter_toggles_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = seeded_app(&dir);
        let id = app.selected_thread_id().unwrap();
        assert_eq!(
            app.ctx.threads().get(id).unwrap().collapsible_state(),
            Some(CollapsibleState::Expanded)
        );
        app.handle_input(key(KeyCode::Enter)).unwrap();
        assert_eq!(
            app.ctx.threads().get(id).unwrap().collapsible_state(),
            Some(CollapsibleState::Collapsed)
        );
    }
}
