use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState},
};

use crate::theme::Palette;
use crate::toc::TocIndex;

/// Chapter list overlay used to jump around the book.
pub struct TocPopup {
    state: ListState,
    len: usize,
}

impl TocPopup {
    /// Opens with `current` selected.
    pub fn new(toc: &TocIndex, current: usize) -> Self {
        let mut state = ListState::default();
        state.select(Some(current.min(toc.last_index())));
        Self {
            state,
            len: toc.chapter_count(),
        }
    }

    pub fn selected(&self) -> Option<usize> {
        self.state.selected()
    }

    pub fn next(&mut self) {
        self.move_by(1);
    }

    pub fn previous(&mut self) {
        self.move_by(-1);
    }

    /// Moves the selection, stopping at either end of the list.
    pub fn move_by(&mut self, delta: isize) {
        if self.len == 0 {
            return;
        }
        let current = self.state.selected().unwrap_or(0);
        let next = current.saturating_add_signed(delta).min(self.len - 1);
        self.state.select(Some(next));
    }

    pub fn first(&mut self) {
        self.state.select(Some(0));
    }

    pub fn last(&mut self) {
        self.state.select(Some(self.len.saturating_sub(1)));
    }

    pub fn render(
        &mut self,
        f: &mut Frame,
        area: Rect,
        toc: &TocIndex,
        active: Option<usize>,
        palette: &Palette,
    ) {
        let popup_area = centered_rect(60, 80, area);
        f.render_widget(Clear, popup_area);

        let total = toc.total_length().max(1) as f64;
        let items: Vec<ListItem> = toc
            .chapters()
            .iter()
            .map(|chapter| {
                let percent = chapter.start_offset as f64 / total * 100.0;
                let title_style = if Some(chapter.index) == active {
                    Style::default().fg(palette.accent)
                } else {
                    Style::default().fg(palette.foreground)
                };
                ListItem::new(Line::from(vec![
                    Span::styled(format!("{percent:>5.1}% "), Style::default().fg(palette.muted)),
                    Span::styled(chapter.title.clone(), title_style),
                ]))
            })
            .collect();

        let (selection_bg, selection_fg) = palette.selection_colors();
        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Contents ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.muted))
                    .style(Style::default().bg(palette.background)),
            )
            .highlight_style(
                Style::default()
                    .bg(selection_bg)
                    .fg(selection_fg)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");

        f.render_stateful_widget(list, popup_area, &mut self.state);
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
