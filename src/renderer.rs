//! Continuous scroll surface over the loaded chapter window.
//!
//! Every loaded chapter owns a slot in an arena indexed by chapter index. A
//! slot knows its wrapped rows and its top row within the flow; slots are
//! created when a window update is laid out and removed when chapters leave
//! the window. Layout needs the viewport width, so until the first resize the
//! window is known but not yet laid out.

use std::time::{Duration, Instant};

use log::debug;

use crate::layout::{Row, layout_chapter, text_width};
use crate::settings::ReaderConfig;
use crate::window::{ChapterWindow, LoadedRange, WindowChange};

/// Fraction of the viewport, from the top, used to pick the active chapter.
pub const ACTIVE_LINE_RATIO: f64 = 1.0 / 3.0;

/// How long a deferred jump waits for its target before the single retry.
pub const JUMP_RETRY_DELAY: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub width: u16,
    pub height: u16,
}

impl Viewport {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn is_measured(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

#[derive(Debug, Clone)]
pub struct ChapterSlot {
    pub index: usize,
    pub top: usize,
    pub rows: Vec<Row>,
}

impl ChapterSlot {
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn bottom(&self) -> usize {
        self.top + self.rows.len()
    }
}

/// Where inside the target chapter a jump should land.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JumpOffset {
    Rows(usize),
    /// Proportion (0..=1) of the chapter's height.
    Fraction(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingJump {
    chapter: usize,
    offset: JumpOffset,
    retry_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpOutcome {
    Performed,
    Deferred,
    Abandoned,
}

/// Edge-proximity intents recorded by the last scroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeIntents {
    pub near_start: bool,
    pub near_end: bool,
}

/// Reading position within the laid-out flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowPosition {
    pub chapter: usize,
    pub intra_rows: usize,
    pub within: f64,
}

pub struct ScrollRenderer {
    config: ReaderConfig,
    viewport: Viewport,
    slots: Vec<Option<ChapterSlot>>,
    laid_out: Option<LoadedRange>,
    scroll_top: usize,
    scroll_height: usize,
    active: Option<usize>,
    pending_jump: Option<PendingJump>,
    edges: EdgeIntents,
}

impl ScrollRenderer {
    pub fn new(config: ReaderConfig, chapter_count: usize) -> Self {
        Self {
            config,
            viewport: Viewport::default(),
            slots: vec![None; chapter_count],
            laid_out: None,
            scroll_top: 0,
            scroll_height: 0,
            active: None,
            pending_jump: None,
            edges: EdgeIntents::default(),
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    pub fn scroll_height(&self) -> usize {
        self.scroll_height
    }

    pub fn max_scroll_top(&self) -> usize {
        self.scroll_height
            .saturating_sub(usize::from(self.viewport.height))
    }

    pub fn active_chapter(&self) -> Option<usize> {
        self.active
    }

    pub fn slot(&self, index: usize) -> Option<&ChapterSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn has_pending_jump(&self) -> bool {
        self.pending_jump.is_some()
    }

    pub fn pending_jump_target(&self) -> Option<usize> {
        self.pending_jump.map(|jump| jump.chapter)
    }

    pub fn edge_intents(&self) -> EdgeIntents {
        self.edges
    }

    /// Applies a window update to the slot arena.
    ///
    /// When chapters enter or leave above the reading position, `scroll_top`
    /// moves by the change in total height so the visible text stays put.
    pub fn sync(&mut self, window: &ChapterWindow, change: &WindowChange) {
        if !self.viewport.is_measured() {
            debug!("Viewport not measured yet; deferring layout");
            return;
        }

        let old_height = self.scroll_height;
        let old_top = self.scroll_top;

        if change.replaced || self.laid_out.is_none() {
            self.clear_slots();
            self.layout_all(window);
        } else {
            for index in change.dropped_front.iter().chain(&change.dropped_back) {
                if let Some(slot) = self.slots.get_mut(*index) {
                    *slot = None;
                }
            }
            let width = text_width(self.viewport.width, &self.config);
            for index in change.prepended.iter().chain(&change.appended) {
                if let Some(chapter) = window.get(*index) {
                    self.insert_slot(*index, layout_chapter(chapter, width, &self.config));
                }
            }
            self.laid_out = window.range();
            self.restack();
        }

        if change.touches_start() {
            let delta = self.scroll_height as isize - old_height as isize;
            self.scroll_top = old_top.saturating_add_signed(delta);
            debug!(
                "Anchored scroll: top {} -> {} (height {} -> {})",
                old_top, self.scroll_top, old_height, self.scroll_height
            );
        }
        self.clamp_scroll();
        self.refresh_active();
    }

    /// Records the measured viewport. A width change re-wraps every slot.
    pub fn set_viewport(&mut self, viewport: Viewport, window: &ChapterWindow) {
        if viewport == self.viewport {
            return;
        }
        let width_changed = viewport.width != self.viewport.width;
        self.viewport = viewport;

        if width_changed || self.laid_out != window.range() {
            self.relayout_preserving_position(window);
        } else {
            self.clamp_scroll();
            self.refresh_active();
        }
    }

    /// Replaces the typography and re-wraps, keeping the reader on the same
    /// spot of the same chapter.
    pub fn apply_config(&mut self, config: ReaderConfig, window: &ChapterWindow) {
        if config == self.config {
            return;
        }
        self.config = config;
        self.relayout_preserving_position(window);
    }

    fn relayout_preserving_position(&mut self, window: &ChapterWindow) {
        if !self.viewport.is_measured() {
            return;
        }
        let anchor = self.position();
        self.clear_slots();
        self.layout_all(window);

        let restored = anchor.and_then(|anchor| {
            let slot = self.slot(anchor.chapter)?;
            Some(slot.top + (anchor.within * slot.height() as f64).round() as usize)
        });
        if let Some(row) = restored {
            self.scroll_top = row;
        }
        self.clamp_scroll();
        self.refresh_active();
    }

    fn clear_slots(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.laid_out = None;
        self.scroll_height = 0;
    }

    fn layout_all(&mut self, window: &ChapterWindow) {
        let width = text_width(self.viewport.width, &self.config);
        for chapter in window.iter() {
            let rows = layout_chapter(chapter, width, &self.config);
            self.insert_slot(chapter.index(), rows);
        }
        self.laid_out = window.range();
        self.restack();
    }

    fn insert_slot(&mut self, index: usize, rows: Vec<Row>) {
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(ChapterSlot {
            index,
            top: 0,
            rows,
        });
    }

    /// Recomputes slot tops in index order.
    fn restack(&mut self) {
        let mut top = 0;
        if let Some(range) = self.laid_out {
            for index in range.start..=range.end {
                if let Some(Some(slot)) = self.slots.get_mut(index) {
                    slot.top = top;
                    top += slot.rows.len();
                }
            }
        }
        self.scroll_height = top;
    }

    fn laid_out_slots(&self) -> impl Iterator<Item = &ChapterSlot> {
        let range = self.laid_out.map(|r| r.start..r.end + 1).unwrap_or(0..0);
        self.slots[range.start.min(self.slots.len())..range.end.min(self.slots.len())]
            .iter()
            .flatten()
    }

    fn clamp_scroll(&mut self) {
        self.scroll_top = self.scroll_top.min(self.max_scroll_top());
    }

    /// Scrolls to an absolute row. Returns true when the active chapter changed.
    pub fn scroll_to(&mut self, row: usize) -> bool {
        let before = self.active;
        self.scroll_top = row;
        self.clamp_scroll();
        self.refresh_active();
        before != self.active
    }

    pub fn scroll_by(&mut self, delta: isize) -> bool {
        self.scroll_to(self.scroll_top.saturating_add_signed(delta))
    }

    /// Picks the chapter whose top is the closest one at or above the
    /// active line, and records edge-proximity intents.
    fn refresh_active(&mut self) {
        let height = usize::from(self.viewport.height);
        let active_line = self.scroll_top + (height as f64 * ACTIVE_LINE_RATIO) as usize;

        let mut active = None;
        for slot in self.laid_out_slots() {
            if slot.top <= active_line || active.is_none() {
                active = Some(slot.index);
            } else {
                break;
            }
        }
        self.active = active;

        let threshold = height.max(1);
        self.edges = if self.laid_out.is_some() {
            EdgeIntents {
                near_start: self.scroll_top < threshold,
                near_end: self.scroll_height.saturating_sub(self.scroll_top + height) < threshold,
            }
        } else {
            EdgeIntents::default()
        };
    }

    /// Current reading position. Once the last chapter of the book is laid
    /// out and the flow cannot scroll further, the position is the end of
    /// that chapter.
    pub fn position(&self) -> Option<FlowPosition> {
        let at_end = self.is_at_book_end();
        let index = if at_end {
            self.slots.len().checked_sub(1)?
        } else {
            self.active?
        };
        let slot = self.slot(index)?;
        let intra_rows = self.scroll_top.saturating_sub(slot.top);
        let within = if at_end {
            1.0
        } else if slot.height() == 0 {
            0.0
        } else {
            (intra_rows as f64 / slot.height() as f64).min(1.0)
        };
        Some(FlowPosition {
            chapter: slot.index,
            intra_rows,
            within,
        })
    }

    fn is_at_book_end(&self) -> bool {
        self.laid_out
            .is_some_and(|range| range.end + 1 == self.slots.len())
            && self.scroll_top >= self.max_scroll_top()
    }

    /// Scrolls to a chapter, or records the request until its slot exists.
    pub fn scroll_to_chapter(&mut self, chapter: usize, offset: JumpOffset) -> JumpOutcome {
        if self.perform_jump(chapter, offset) {
            self.pending_jump = None;
            return JumpOutcome::Performed;
        }
        debug!("Deferring jump to chapter {chapter}");
        self.pending_jump = Some(PendingJump {
            chapter,
            offset,
            retry_at: None,
        });
        JumpOutcome::Deferred
    }

    /// Runs the pending jump after a window update. If the target still has
    /// no slot, one retry is scheduled.
    pub fn resolve_pending_jump(&mut self, now: Instant) -> Option<JumpOutcome> {
        let mut jump = self.pending_jump?;
        if self.perform_jump(jump.chapter, jump.offset) {
            self.pending_jump = None;
            return Some(JumpOutcome::Performed);
        }
        if jump.retry_at.is_none() {
            jump.retry_at = Some(now + JUMP_RETRY_DELAY);
            self.pending_jump = Some(jump);
        }
        Some(JumpOutcome::Deferred)
    }

    /// Fires the scheduled retry. A jump that still cannot land is dropped.
    pub fn tick(&mut self, now: Instant) -> Option<JumpOutcome> {
        let jump = self.pending_jump?;
        let retry_at = jump.retry_at?;
        if now < retry_at {
            return None;
        }
        self.pending_jump = None;
        if self.perform_jump(jump.chapter, jump.offset) {
            Some(JumpOutcome::Performed)
        } else {
            debug!("Abandoning jump to chapter {}", jump.chapter);
            Some(JumpOutcome::Abandoned)
        }
    }

    pub fn cancel_pending_jump(&mut self) {
        self.pending_jump = None;
    }

    fn perform_jump(&mut self, chapter: usize, offset: JumpOffset) -> bool {
        let Some(slot) = self.slot(chapter) else {
            return false;
        };
        let extra = match offset {
            JumpOffset::Rows(rows) => rows,
            JumpOffset::Fraction(fraction) => {
                (fraction.clamp(0.0, 1.0) * slot.height() as f64).floor() as usize
            }
        };
        let row = slot.top + extra;
        self.scroll_to(row);
        true
    }

    /// Rows currently inside the viewport, paired with their chapter index.
    pub fn visible_rows(&self) -> Vec<(usize, &Row)> {
        let height = usize::from(self.viewport.height);
        let start = self.scroll_top;
        let end = start + height;

        let mut rows = Vec::with_capacity(height);
        for slot in self.laid_out_slots() {
            if slot.bottom() <= start {
                continue;
            }
            if slot.top >= end {
                break;
            }
            let from = start.saturating_sub(slot.top);
            let to = (end - slot.top).min(slot.height());
            rows.extend(slot.rows[from..to].iter().map(|row| (slot.index, row)));
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toc::TocChapter;
    use crate::window::{Direction, LoadedChapter};

    /// Chapter `i` has `10 + i` one-word paragraphs, so heights differ.
    fn chapter(index: usize) -> LoadedChapter {
        let content: String = (0..10 + index).map(|p| format!("p{p}\n")).collect();
        let len = content.chars().count();
        LoadedChapter::new(
            TocChapter::new(index, format!("Chapter {index}"), index * 1000, index * 1000 + len),
            content,
        )
    }

    fn config() -> ReaderConfig {
        ReaderConfig {
            paragraph_spacing: 0.0,
            margin: 0,
            ..ReaderConfig::default()
        }
    }

    fn setup(range: std::ops::RangeInclusive<usize>) -> (ChapterWindow, ScrollRenderer) {
        let mut window = ChapterWindow::new();
        window.merge(range.map(chapter).collect()).unwrap();
        let mut renderer = ScrollRenderer::new(config(), 30);
        renderer.set_viewport(Viewport::new(40, 12), &window);
        (window, renderer)
    }

    #[test]
    fn layout_waits_for_viewport() {
        let mut window = ChapterWindow::new();
        let change = window.merge(vec![chapter(3)]).unwrap();
        let mut renderer = ScrollRenderer::new(config(), 30);

        renderer.sync(&window, &change);
        assert!(renderer.slot(3).is_none());

        renderer.set_viewport(Viewport::new(40, 12), &window);
        assert!(renderer.slot(3).is_some());
        assert_eq!(renderer.active_chapter(), Some(3));
    }

    #[test]
    fn slots_stack_in_index_order() {
        let (_, renderer) = setup(5..=7);
        let five = renderer.slot(5).unwrap();
        let six = renderer.slot(6).unwrap();
        let seven = renderer.slot(7).unwrap();
        assert_eq!(five.top, 0);
        assert_eq!(six.top, five.bottom());
        assert_eq!(seven.top, six.bottom());
        assert_eq!(renderer.scroll_height(), seven.bottom());
    }

    #[test]
    fn active_chapter_uses_upper_third_of_viewport() {
        let (_, mut renderer) = setup(5..=7);
        let six_top = renderer.slot(6).unwrap().top;

        // Chapter 6 starts 5 rows below the top; the active line is at row 4.
        renderer.scroll_to(six_top - 5);
        assert_eq!(renderer.active_chapter(), Some(5));

        // Now it starts 4 rows below: exactly on the active line.
        renderer.scroll_to(six_top - 4);
        assert_eq!(renderer.active_chapter(), Some(6));
    }

    #[test]
    fn prepend_keeps_visual_position() {
        let (mut window, mut renderer) = setup(5..=7);
        renderer.scroll_to(8);
        let before_top = renderer.scroll_top();
        let before_height = renderer.scroll_height();
        let first_visible = renderer.visible_rows()[0].1.clone();

        let change = window.splice(Direction::Prev, vec![chapter(4)]).unwrap();
        renderer.sync(&window, &change);

        let grown = renderer.scroll_height() - before_height;
        assert_eq!(renderer.scroll_top(), before_top + grown);
        assert_eq!(renderer.visible_rows()[0].1, &first_visible);
    }

    #[test]
    fn append_does_not_move_scroll() {
        let (mut window, mut renderer) = setup(5..=7);
        renderer.scroll_to(8);

        let change = window.splice(Direction::Next, vec![chapter(8)]).unwrap();
        renderer.sync(&window, &change);
        assert_eq!(renderer.scroll_top(), 8);
    }

    #[test]
    fn front_discard_moves_scroll_up_by_removed_height() {
        let (mut window, mut renderer) = setup(5..=7);
        let seven_top = renderer.slot(7).unwrap().top;
        renderer.scroll_to(seven_top + 2);
        let removed = renderer.slot(5).unwrap().height();

        let change = window.retain_around(7, 1);
        renderer.sync(&window, &change);

        assert!(renderer.slot(5).is_none());
        assert_eq!(renderer.scroll_top(), seven_top + 2 - removed);
        assert_eq!(renderer.active_chapter(), Some(7));
    }

    #[test]
    fn deferred_jump_runs_once_slot_exists() {
        let (mut window, mut renderer) = setup(5..=7);
        assert_eq!(
            renderer.scroll_to_chapter(20, JumpOffset::Rows(3)),
            JumpOutcome::Deferred
        );
        assert_eq!(renderer.pending_jump_target(), Some(20));

        let change = window.merge((19..=21).map(chapter).collect()).unwrap();
        renderer.sync(&window, &change);
        assert_eq!(
            renderer.resolve_pending_jump(Instant::now()),
            Some(JumpOutcome::Performed)
        );
        assert!(!renderer.has_pending_jump());
        assert_eq!(renderer.active_chapter(), Some(20));
        assert_eq!(renderer.position().unwrap().intra_rows, 3);
    }

    #[test]
    fn deferred_jump_retries_once_then_gives_up() {
        let (_, mut renderer) = setup(5..=7);
        let now = Instant::now();
        renderer.scroll_to_chapter(20, JumpOffset::Rows(0));

        assert_eq!(
            renderer.resolve_pending_jump(now),
            Some(JumpOutcome::Deferred)
        );
        assert_eq!(renderer.tick(now), None);
        assert_eq!(
            renderer.tick(now + JUMP_RETRY_DELAY),
            Some(JumpOutcome::Abandoned)
        );
        assert!(!renderer.has_pending_jump());
        assert_eq!(renderer.tick(now + JUMP_RETRY_DELAY * 2), None);
    }

    #[test]
    fn edge_intents_follow_scroll() {
        let (_, mut renderer) = setup(5..=7);
        assert!(renderer.edge_intents().near_start);
        assert!(!renderer.edge_intents().near_end);

        let max = renderer.max_scroll_top();
        renderer.scroll_to(max);
        assert!(!renderer.edge_intents().near_start);
        assert!(renderer.edge_intents().near_end);
    }

    #[test]
    fn resize_keeps_reading_position() {
        let (window, mut renderer) = setup(5..=7);
        let six_top = renderer.slot(6).unwrap().top;
        renderer.scroll_to(six_top + 4);
        assert_eq!(renderer.active_chapter(), Some(6));

        renderer.set_viewport(Viewport::new(60, 20), &window);
        assert_eq!(renderer.active_chapter(), Some(6));
    }

    #[test]
    fn visible_rows_span_chapter_boundaries() {
        let (_, mut renderer) = setup(5..=7);
        let six_top = renderer.slot(6).unwrap().top;
        renderer.scroll_to(six_top - 2);

        let rows = renderer.visible_rows();
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[0].0, 5);
        assert_eq!(rows[2].0, 6);
    }

    #[test]
    fn bottom_of_last_chapter_reads_as_its_end() {
        let mut window = ChapterWindow::new();
        window.merge((5..=7).map(chapter).collect()).unwrap();
        let mut renderer = ScrollRenderer::new(config(), 8);
        renderer.set_viewport(Viewport::new(40, 12), &window);

        renderer.scroll_to(usize::MAX);
        let seven = renderer.slot(7).unwrap();
        assert!(renderer.scroll_top() < seven.top + seven.height());
        let position = renderer.position().unwrap();
        assert_eq!(position.chapter, 7);
        assert_eq!(position.within, 1.0);

        renderer.scroll_by(-1);
        assert!(renderer.position().unwrap().within < 1.0);
    }
}
