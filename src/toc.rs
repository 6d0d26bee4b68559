//! Table of contents for a plain-text book.
//!
//! Offsets are measured in chars (Unicode scalar values) of the whole book
//! text, so a chapter's content length is `end_offset - start_offset` chars.

use serde::{Deserialize, Serialize};

use crate::detector::ChapterDetector;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TocChapter {
    #[serde(default)]
    pub index: usize,
    pub title: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl TocChapter {
    pub fn new(index: usize, title: impl Into<String>, start_offset: usize, end_offset: usize) -> Self {
        Self {
            index,
            title: title.into(),
            start_offset,
            end_offset,
        }
    }

    pub fn len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.start_offset == self.end_offset
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start_offset && offset < self.end_offset
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TocError {
    #[error("table of contents has no chapters")]
    Empty,

    #[error("first chapter starts at {0}, expected 0")]
    LeadingGap(usize),

    #[error("chapter {index} ends at {end} but chapter {next} starts at {next_start}")]
    Discontinuous {
        index: usize,
        end: usize,
        next: usize,
        next_start: usize,
    },

    #[error("chapter {index} has negative length ({start}..{end})")]
    Inverted {
        index: usize,
        start: usize,
        end: usize,
    },

    #[error("last chapter ends at {end}, but the book is {total} chars long")]
    TrailingGap { end: usize, total: usize },
}

/// The full, lightweight chapter list of one book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocIndex {
    chapters: Vec<TocChapter>,
    total_length: usize,
}

impl TocIndex {
    /// Builds an index, checking that chapters partition `[0, total_length)`.
    /// Chapter indices are renumbered to their position.
    pub fn new(mut chapters: Vec<TocChapter>, total_length: usize) -> Result<Self, TocError> {
        let first = chapters.first().ok_or(TocError::Empty)?;
        if first.start_offset != 0 {
            return Err(TocError::LeadingGap(first.start_offset));
        }

        for (i, chapter) in chapters.iter_mut().enumerate() {
            chapter.index = i;
        }

        for (i, chapter) in chapters.iter().enumerate() {
            if chapter.end_offset < chapter.start_offset {
                return Err(TocError::Inverted {
                    index: i,
                    start: chapter.start_offset,
                    end: chapter.end_offset,
                });
            }
            if let Some(next) = chapters.get(i + 1) {
                if chapter.end_offset != next.start_offset {
                    return Err(TocError::Discontinuous {
                        index: i,
                        end: chapter.end_offset,
                        next: i + 1,
                        next_start: next.start_offset,
                    });
                }
            }
        }

        let last_end = chapters.last().map(|c| c.end_offset).unwrap_or(0);
        if last_end != total_length {
            return Err(TocError::TrailingGap {
                end: last_end,
                total: total_length,
            });
        }

        Ok(Self {
            chapters,
            total_length,
        })
    }

    /// Runs chapter detection over the raw text.
    pub fn from_detected(text: &str) -> Self {
        let chapters = ChapterDetector::default().detect(text);
        let total_length = chapters.last().map(|c| c.end_offset).unwrap_or(0);
        Self {
            chapters,
            total_length,
        }
    }

    /// Index of the chapter containing `offset`. Offsets at or past the end of
    /// the book resolve to the last chapter.
    pub fn chapter_at(&self, offset: usize) -> usize {
        let idx = self
            .chapters
            .partition_point(|chapter| chapter.start_offset <= offset);
        let idx = idx.saturating_sub(1);

        // Zero-length chapters share a start offset with their successor;
        // partition_point already lands on the last of them, which is the
        // one that actually holds `offset`.
        idx.min(self.chapters.len().saturating_sub(1))
    }

    pub fn chapter(&self, index: usize) -> Option<&TocChapter> {
        self.chapters.get(index)
    }

    pub fn chapters(&self) -> &[TocChapter] {
        &self.chapters
    }

    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    pub fn total_length(&self) -> usize {
        self.total_length
    }

    pub fn last_index(&self) -> usize {
        self.chapters.len().saturating_sub(1)
    }

    pub fn clamp_index(&self, index: usize) -> usize {
        index.min(self.last_index())
    }
}
