use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind};
use log::{debug, info};
use ratatui::{
    Frame, Terminal,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::event_source::{Event, EventSource};
use crate::layout::RowKind;
use crate::notification::NotificationManager;
use crate::renderer::Viewport;
use crate::service::{BEACON_WAIT, ReaderService};
use crate::session::{Event as SessionEvent, Phase, ReadingSession};
use crate::theme::Palette;
use crate::toc_popup::TocPopup;

const STATUS_HEIGHT: u16 = 1;
const MOUSE_SCROLL_ROWS: isize = 3;
const MAX_MARGIN: u16 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Quit,
}

/// Terminal front-end of one reading session.
pub struct App {
    service: ReaderService,
    title: String,
    palette: Palette,
    notifications: NotificationManager,
    toc_popup: Option<TocPopup>,
    viewport: Option<Viewport>,
}

impl App {
    pub fn new(service: ReaderService, title: impl Into<String>) -> Self {
        let palette = Palette::from_theme(&service.session().renderer().config().theme);
        Self {
            service,
            title: title.into(),
            palette,
            notifications: NotificationManager::default(),
            toc_popup: None,
            viewport: None,
        }
    }

    pub fn session(&self) -> &ReadingSession {
        self.service.session()
    }

    pub fn notifications(&self) -> &NotificationManager {
        &self.notifications
    }

    pub fn is_toc_open(&self) -> bool {
        self.toc_popup.is_some()
    }

    /// Tells the session how much room the text has, given the terminal size.
    pub fn resize_to(&mut self, width: u16, height: u16) {
        let viewport = Viewport::new(width, height.saturating_sub(STATUS_HEIGHT));
        if self.viewport != Some(viewport) {
            debug!("Viewport now {}x{}", viewport.width, viewport.height);
            self.viewport = Some(viewport);
            self.service.dispatch(SessionEvent::Resized(viewport));
        }
    }

    /// Applies worker results and timers, and picks up new notices.
    pub fn update(&mut self) {
        self.service.poll();
        self.service.tick();
        let now = Instant::now();
        for notice in self.service.drain_notices() {
            self.notifications.error(notice, now);
        }
        self.notifications.update(now);
    }

    fn page_rows(&self) -> isize {
        let height = self.viewport.map(|v| v.height).unwrap_or(0);
        isize::try_from(height.saturating_sub(2).max(1)).unwrap_or(isize::MAX)
    }

    fn scroll(&mut self, rows: isize) {
        self.service.dispatch(SessionEvent::Scrolled(rows));
    }

    fn jump_relative(&mut self, delta: isize) {
        let Some(active) = self.session().renderer().active_chapter() else {
            return;
        };
        if let Some(target) = active.checked_add_signed(delta) {
            self.service.dispatch(SessionEvent::JumpRequested(target));
        }
    }

    fn adjust_margin(&mut self, delta: i16) {
        let mut config = self.session().renderer().config().clone();
        let margin = config.margin.saturating_add_signed(delta).min(MAX_MARGIN);
        if margin != config.margin {
            config.margin = margin;
            self.service.dispatch(SessionEvent::ConfigChanged(config));
        }
    }

    fn open_toc(&mut self) {
        let current = self.session().renderer().active_chapter().unwrap_or(0);
        let Some(toc) = self.session().toc() else {
            return;
        };
        let popup = TocPopup::new(toc, current);
        self.toc_popup = Some(popup);
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<AppAction> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        if self.toc_popup.is_some() {
            return self.handle_toc_key(key);
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') => return Some(AppAction::Quit),
            KeyCode::Char('c') if ctrl => return Some(AppAction::Quit),
            KeyCode::Esc => {
                self.notifications.dismiss();
            }
            KeyCode::Char('d') if ctrl => self.scroll(self.page_rows() / 2),
            KeyCode::Char('u') if ctrl => self.scroll(-self.page_rows() / 2),
            KeyCode::Char('j') | KeyCode::Down => self.scroll(1),
            KeyCode::Char('k') | KeyCode::Up => self.scroll(-1),
            KeyCode::Char(' ') | KeyCode::PageDown => self.scroll(self.page_rows()),
            KeyCode::Char('b') | KeyCode::PageUp => self.scroll(-self.page_rows()),
            KeyCode::Char(']') | KeyCode::Char('l') => self.jump_relative(1),
            KeyCode::Char('[') | KeyCode::Char('h') => self.jump_relative(-1),
            KeyCode::Char('g') | KeyCode::Home => {
                self.service.dispatch(SessionEvent::JumpRequested(0));
            }
            KeyCode::Char('G') | KeyCode::End => {
                if let Some(last) = self.session().toc().map(|toc| toc.last_index()) {
                    self.service.dispatch(SessionEvent::JumpRequested(last));
                }
            }
            KeyCode::Char('t') => self.open_toc(),
            KeyCode::Char('>') => self.adjust_margin(1),
            KeyCode::Char('<') => self.adjust_margin(-1),
            KeyCode::Char(digit @ '0'..='9') => {
                let tenth = f64::from(digit.to_digit(10).unwrap_or(0));
                self.service.dispatch(SessionEvent::SeekRequested(tenth / 10.0));
            }
            _ => {}
        }
        None
    }

    fn handle_toc_key(&mut self, key: KeyEvent) -> Option<AppAction> {
        let page = self.page_rows();
        let popup = self.toc_popup.as_mut()?;
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => popup.next(),
            KeyCode::Char('k') | KeyCode::Up => popup.previous(),
            KeyCode::PageDown => popup.move_by(page),
            KeyCode::PageUp => popup.move_by(-page),
            KeyCode::Char('g') | KeyCode::Home => popup.first(),
            KeyCode::Char('G') | KeyCode::End => popup.last(),
            KeyCode::Enter => {
                let selected = popup.selected();
                self.toc_popup = None;
                if let Some(chapter) = selected {
                    self.service.dispatch(SessionEvent::JumpRequested(chapter));
                }
            }
            KeyCode::Esc | KeyCode::Char('t') => self.toc_popup = None,
            KeyCode::Char('q') => return Some(AppAction::Quit),
            _ => {}
        }
        None
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::ScrollDown => {
                if let Some(popup) = self.toc_popup.as_mut() {
                    popup.next();
                } else {
                    self.scroll(MOUSE_SCROLL_ROWS);
                }
            }
            MouseEventKind::ScrollUp => {
                if let Some(popup) = self.toc_popup.as_mut() {
                    popup.previous();
                } else {
                    self.scroll(-MOUSE_SCROLL_ROWS);
                }
            }
            _ => {}
        }
    }

    pub fn draw(&mut self, f: &mut Frame) {
        let area = f.area();
        f.render_widget(
            Block::default().style(
                Style::default()
                    .bg(self.palette.background)
                    .fg(self.palette.foreground),
            ),
            area,
        );

        let [content_area, status_area] =
            Layout::vertical([Constraint::Min(1), Constraint::Length(STATUS_HEIGHT)]).areas(area);

        match self.session().phase() {
            Phase::Failed => self.draw_failure(f, content_area),
            Phase::Idle | Phase::TocLoading | Phase::TocReady | Phase::ProgressLoading => {
                self.draw_placeholder(f, content_area, "Opening book...");
            }
            _ => self.draw_content(f, content_area),
        }
        self.draw_status(f, status_area);

        let active = self.session().renderer().active_chapter();
        if let (Some(popup), Some(toc)) = (self.toc_popup.as_mut(), self.service.session().toc()) {
            popup.render(f, area, toc, active, &self.palette);
        }
    }

    fn draw_content(&self, f: &mut Frame, area: Rect) {
        let renderer = self.session().renderer();
        let rows = renderer.visible_rows();
        if rows.is_empty() {
            self.draw_placeholder(f, area, "Loading chapters...");
            return;
        }

        let title_style = Style::default()
            .fg(self.palette.accent)
            .add_modifier(Modifier::BOLD);
        let text_style = Style::default().fg(self.palette.foreground);
        let lines: Vec<Line> = rows
            .into_iter()
            .map(|(_, row)| match row.kind {
                RowKind::Title => Line::from(Span::styled(row.text.as_str(), title_style)),
                RowKind::Text => Line::from(Span::styled(row.text.as_str(), text_style)),
                RowKind::Blank => Line::default(),
            })
            .collect();

        let margin = renderer.config().margin.min(area.width / 2);
        let text_area = Rect {
            x: area.x + margin,
            width: area.width.saturating_sub(margin * 2),
            ..area
        };
        f.render_widget(Paragraph::new(lines), text_area);
    }

    fn draw_placeholder(&self, f: &mut Frame, area: Rect, message: &str) {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            message,
            Style::default().fg(self.palette.muted),
        )))
        .alignment(Alignment::Center);
        let [_, middle, _] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(1),
            Constraint::Fill(1),
        ])
        .areas(area);
        f.render_widget(paragraph, middle);
    }

    fn draw_failure(&self, f: &mut Frame, area: Rect) {
        let message = self.session().failure().unwrap_or("Could not open book");
        let paragraph = Paragraph::new(vec![
            Line::from(Span::styled(
                message,
                Style::default()
                    .fg(self.palette.error)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::default(),
            Line::from(Span::styled(
                "Press q to quit",
                Style::default().fg(self.palette.muted),
            )),
        ])
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
        let [_, middle, _] = Layout::vertical([
            Constraint::Fill(1),
            Constraint::Length(4),
            Constraint::Fill(1),
        ])
        .areas(area);
        f.render_widget(paragraph, middle);
    }

    fn draw_status(&self, f: &mut Frame, area: Rect) {
        let session = self.session();
        let muted = Style::default().fg(self.palette.muted);

        let left = self.notifications.status_line(&self.palette).unwrap_or_else(|| {
            let chapter = session
                .renderer()
                .active_chapter()
                .and_then(|index| session.toc()?.chapter(index))
                .map(|chapter| chapter.title.as_str())
                .unwrap_or("");
            Line::from(vec![
                Span::styled(self.title.clone(), muted.add_modifier(Modifier::BOLD)),
                Span::styled(format!("  {chapter}"), muted),
            ])
        });

        let mut right = String::new();
        if session.is_loading() {
            right.push_str("loading  ");
        }
        if let Some(progress) = session.progress() {
            right.push_str(&format!("{:.1}%", progress.fraction * 100.0));
        }

        let [left_area, right_area] =
            Layout::horizontal([Constraint::Min(1), Constraint::Length(right.width() as u16 + 1)])
                .areas(area);
        f.render_widget(Paragraph::new(left), left_area);
        f.render_widget(
            Paragraph::new(Line::from(Span::styled(right, muted))).alignment(Alignment::Right),
            right_area,
        );
    }

    /// Flushes progress and stops the loader.
    pub fn close(&mut self) {
        self.toc_popup = None;
        self.service.shutdown(BEACON_WAIT);
    }
}

pub fn run_app_with_event_source<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    event_source: &mut dyn EventSource,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    let tick_rate = Duration::from_millis(50);

    loop {
        let size = terminal.size()?;
        app.resize_to(size.width, size.height);
        app.update();
        terminal.draw(|f| app.draw(f))?;

        if !event_source.poll(tick_rate)? {
            continue;
        }
        match event_source.read()? {
            Event::Key(key) => {
                if app.handle_key(key) == Some(AppAction::Quit) {
                    break;
                }
            }
            Event::Mouse(mouse) => app.handle_mouse(mouse),
            Event::Resize(width, height) => app.resize_to(width, height),
            _ => {}
        }
    }

    info!("Leaving reader");
    app.close();
    Ok(())
}
