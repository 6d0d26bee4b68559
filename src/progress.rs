//! Reading position, completion fraction, and the persisted position codec.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::toc::TocIndex;

/// A book counts as finished once this much of it has been read.
pub const FINISHED_THRESHOLD: f64 = 0.98;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub fraction: f64,
    pub chapter_index: usize,
    /// Rows scrolled past the top of the chapter.
    pub intra_chapter_offset: usize,
    pub finished: bool,
}

impl ReadingProgress {
    pub fn new(fraction: f64, chapter_index: usize, intra_chapter_offset: usize) -> Self {
        let fraction = clamp_fraction(fraction);
        Self {
            fraction,
            chapter_index,
            intra_chapter_offset,
            finished: fraction >= FINISHED_THRESHOLD,
        }
    }

    pub fn position(&self) -> Position {
        Position::Chapter {
            index: self.chapter_index,
            offset: self.intra_chapter_offset,
        }
    }

    pub fn to_payload(&self) -> ProgressPayload {
        ProgressPayload {
            progress: self.fraction,
            position: self.position().to_string(),
            finished: self.finished,
        }
    }
}

/// Persisted form of a reading position.
///
/// Current writers always produce `"{chapter}:{offset}"`. Older stores hold a
/// bare global char offset, which is still accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Chapter { index: usize, offset: usize },
    LegacyOffset(usize),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid reading position {0:?}")]
pub struct PositionParseError(String);

impl FromStr for Position {
    type Err = PositionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || PositionParseError(s.to_string());
        match s.split_once(':') {
            Some((chapter, offset)) => Ok(Position::Chapter {
                index: chapter.trim().parse().map_err(|_| invalid())?,
                offset: offset.trim().parse().map_err(|_| invalid())?,
            }),
            None => s.parse().map(Position::LegacyOffset).map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Chapter { index, offset } => write!(f, "{index}:{offset}"),
            Position::LegacyOffset(offset) => write!(f, "{offset}"),
        }
    }
}

/// Body of `GET`/`POST /books/{id}/progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub finished: bool,
}

/// Where inside the restored chapter to land.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChapterOffset {
    /// Rows below the chapter top, as written by current sessions.
    Rows(usize),
    /// Proportion (0..=1) of the chapter, when only a char offset or a
    /// fraction is known.
    Within(f64),
}

/// Where a restored session should anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestoreTarget {
    pub chapter_index: usize,
    pub offset: ChapterOffset,
}

impl RestoreTarget {
    pub const START: RestoreTarget = RestoreTarget {
        chapter_index: 0,
        offset: ChapterOffset::Rows(0),
    };

    /// Resolves a saved payload against the book's chapters.
    ///
    /// A chapter position wins; a legacy global offset maps through the TOC;
    /// without a usable position the saved fraction is mapped instead.
    pub fn resolve(payload: &ProgressPayload, toc: &TocIndex) -> Self {
        match payload.position.parse::<Position>() {
            Ok(Position::Chapter { index, offset }) => Self {
                chapter_index: toc.clamp_index(index),
                offset: ChapterOffset::Rows(offset),
            },
            Ok(Position::LegacyOffset(offset)) => Self::from_char_offset(offset, toc),
            Err(_) => Self::from_fraction(payload.progress, toc),
        }
    }

    pub fn from_fraction(fraction: f64, toc: &TocIndex) -> Self {
        let (chapter_index, within) = locate_fraction(toc, fraction);
        Self {
            chapter_index,
            offset: ChapterOffset::Within(within),
        }
    }

    pub fn from_char_offset(offset: usize, toc: &TocIndex) -> Self {
        let (chapter_index, within) = locate_offset(toc, offset);
        Self {
            chapter_index,
            offset: ChapterOffset::Within(within),
        }
    }
}

/// Chapter containing a book-wide fraction, and how far into it the
/// fraction falls.
pub fn locate_fraction(toc: &TocIndex, fraction: f64) -> (usize, f64) {
    let offset = (clamp_fraction(fraction) * toc.total_length() as f64).floor() as usize;
    locate_offset(toc, offset)
}

fn locate_offset(toc: &TocIndex, offset: usize) -> (usize, f64) {
    let chapter = toc.chapter_at(offset);
    let within = toc
        .chapter(chapter)
        .filter(|c| !c.is_empty())
        .map(|c| (offset.saturating_sub(c.start_offset) as f64 / c.len() as f64).min(1.0))
        .unwrap_or(0.0);
    (chapter, within)
}

/// Book-wide fraction for a point `within` (0..=1) of the way through a chapter.
pub fn compute_fraction(toc: &TocIndex, chapter_index: usize, within: f64) -> f64 {
    let total = toc.total_length();
    let Some(chapter) = toc.chapter(chapter_index) else {
        return 0.0;
    };
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    let base = chapter.start_offset as f64 / total;
    let span = chapter.len() as f64 / total;
    clamp_fraction(base + clamp_fraction(within) * span)
}

fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
