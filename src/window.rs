//! The materialized window of chapters.
//!
//! The window is always a contiguous run of chapter indices. Chapters enter it
//! through window loads and one-chapter extensions at either edge, and leave
//! it when they fall outside the retention radius around the active chapter.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::toc::TocChapter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedChapter {
    #[serde(flatten)]
    pub chapter: TocChapter,
    pub content: String,
}

impl LoadedChapter {
    pub fn new(chapter: TocChapter, content: impl Into<String>) -> Self {
        Self {
            chapter,
            content: content.into(),
        }
    }

    pub fn index(&self) -> usize {
        self.chapter.index
    }
}

/// Inclusive chapter-index bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedRange {
    pub start: usize,
    pub end: usize,
}

impl LoadedRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// `[target - buffer, target + buffer]` clamped to `[0, last]`.
    pub fn around(target: usize, buffer: usize, last: usize) -> Self {
        let target = target.min(last);
        Self {
            start: target.saturating_sub(buffer),
            end: target.saturating_add(buffer).min(last),
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// True when the ranges overlap or sit next to each other.
    pub fn touches(&self, other: &LoadedRange) -> bool {
        self.start <= other.end.saturating_add(1) && other.start <= self.end.saturating_add(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

/// What a window update did, in terms the renderer needs for anchoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowChange {
    /// The old window was thrown away.
    pub replaced: bool,
    /// Indices that entered at the start of the window.
    pub prepended: Vec<usize>,
    /// Indices that entered at the end of the window.
    pub appended: Vec<usize>,
    /// Indices discarded from the start of the window.
    pub dropped_front: Vec<usize>,
    /// Indices discarded from the end of the window.
    pub dropped_back: Vec<usize>,
}

impl WindowChange {
    pub fn is_empty(&self) -> bool {
        !self.replaced
            && self.prepended.is_empty()
            && self.appended.is_empty()
            && self.dropped_front.is_empty()
            && self.dropped_back.is_empty()
    }

    /// Content above the reading position changed height.
    pub fn touches_start(&self) -> bool {
        !self.replaced && (!self.prepended.is_empty() || !self.dropped_front.is_empty())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("chapters in response are not contiguous at index {0}")]
    NotContiguous(usize),

    #[error("response contains no chapters")]
    Empty,

    #[error("chapter {index} content is {actual} chars, expected {expected}")]
    ContentLength {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Default)]
pub struct ChapterWindow {
    chapters: VecDeque<LoadedChapter>,
}

impl ChapterWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range(&self) -> Option<LoadedRange> {
        let first = self.chapters.front()?;
        let last = self.chapters.back()?;
        Some(LoadedRange::new(first.index(), last.index()))
    }

    pub fn contains(&self, index: usize) -> bool {
        self.range().is_some_and(|range| range.contains(index))
    }

    pub fn get(&self, index: usize) -> Option<&LoadedChapter> {
        let range = self.range()?;
        if !range.contains(index) {
            return None;
        }
        self.chapters.get(index - range.start)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedChapter> {
        self.chapters.iter()
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Merges a fetched batch of chapters.
    ///
    /// A batch that overlaps or touches the current window extends it with the
    /// chapters it does not already hold; any other batch replaces the window.
    /// On error the window is left untouched.
    pub fn merge(&mut self, incoming: Vec<LoadedChapter>) -> Result<WindowChange, WindowError> {
        validate(&incoming)?;
        let incoming_range = LoadedRange::new(
            incoming.first().map(LoadedChapter::index).unwrap_or(0),
            incoming.last().map(LoadedChapter::index).unwrap_or(0),
        );

        let current = match self.range() {
            Some(current) if current.touches(&incoming_range) => current,
            _ => {
                self.chapters = incoming.into();
                return Ok(WindowChange {
                    replaced: true,
                    ..WindowChange::default()
                });
            }
        };

        let mut change = WindowChange::default();
        let mut before = Vec::new();
        for chapter in incoming {
            if chapter.index() < current.start {
                before.push(chapter);
            } else if chapter.index() > current.end {
                change.appended.push(chapter.index());
                self.chapters.push_back(chapter);
            }
        }
        for chapter in before.into_iter().rev() {
            change.prepended.push(chapter.index());
            self.chapters.push_front(chapter);
        }
        change.prepended.reverse();
        Ok(change)
    }

    /// Splices one extension batch onto the given edge. Chapters already in the
    /// window are skipped; a batch that is not adjacent to the edge is rejected.
    pub fn splice(
        &mut self,
        direction: Direction,
        incoming: Vec<LoadedChapter>,
    ) -> Result<WindowChange, WindowError> {
        validate(&incoming)?;
        let Some(current) = self.range() else {
            return self.merge(incoming);
        };

        let mut change = WindowChange::default();
        match direction {
            Direction::Prev => {
                let fresh: Vec<_> = incoming
                    .into_iter()
                    .filter(|c| c.index() < current.start)
                    .collect();
                if let Some(last) = fresh.last() {
                    if last.index() + 1 != current.start {
                        return Err(WindowError::NotContiguous(last.index()));
                    }
                }
                for chapter in fresh.into_iter().rev() {
                    change.prepended.push(chapter.index());
                    self.chapters.push_front(chapter);
                }
                change.prepended.reverse();
            }
            Direction::Next => {
                let fresh: Vec<_> = incoming
                    .into_iter()
                    .filter(|c| c.index() > current.end)
                    .collect();
                if let Some(first) = fresh.first() {
                    if first.index() != current.end + 1 {
                        return Err(WindowError::NotContiguous(first.index()));
                    }
                }
                for chapter in fresh {
                    change.appended.push(chapter.index());
                    self.chapters.push_back(chapter);
                }
            }
        }
        Ok(change)
    }

    /// Discards chapters farther than `radius` from `center`.
    pub fn retain_around(&mut self, center: usize, radius: usize) -> WindowChange {
        let mut change = WindowChange::default();
        let low = center.saturating_sub(radius);
        let high = center.saturating_add(radius);

        while self.chapters.front().is_some_and(|c| c.index() < low) {
            if let Some(chapter) = self.chapters.pop_front() {
                change.dropped_front.push(chapter.index());
            }
        }
        while self.chapters.back().is_some_and(|c| c.index() > high) {
            if let Some(chapter) = self.chapters.pop_back() {
                change.dropped_back.push(chapter.index());
            }
        }
        change.dropped_back.reverse();
        change
    }

    pub fn clear(&mut self) {
        self.chapters.clear();
    }
}

fn validate(incoming: &[LoadedChapter]) -> Result<(), WindowError> {
    if incoming.is_empty() {
        return Err(WindowError::Empty);
    }
    for pair in incoming.windows(2) {
        if pair[1].index() != pair[0].index() + 1 {
            return Err(WindowError::NotContiguous(pair[1].index()));
        }
    }
    for chapter in incoming {
        let actual = chapter.content.chars().count();
        if actual != chapter.chapter.len() {
            return Err(WindowError::ContentLength {
                index: chapter.index(),
                expected: chapter.chapter.len(),
                actual,
            });
        }
    }
    Ok(())
}
