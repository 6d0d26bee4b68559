//! Turns chapter text into terminal rows.

use crate::settings::ReaderConfig;
use crate::window::LoadedChapter;

/// Narrowest text column we will wrap to, whatever the margins say.
const MIN_TEXT_WIDTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Title,
    Text,
    Blank,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub kind: RowKind,
    pub text: String,
}

impl Row {
    fn blank() -> Self {
        Self {
            kind: RowKind::Blank,
            text: String::new(),
        }
    }
}

pub fn text_width(viewport_width: u16, config: &ReaderConfig) -> usize {
    let margins = usize::from(config.margin) * 2;
    usize::from(viewport_width)
        .saturating_sub(margins)
        .max(MIN_TEXT_WIDTH)
}

/// Lays out one chapter: a title row, a blank row, then its paragraphs.
///
/// Every non-blank source line is a paragraph. When the chapter text opens
/// with its own heading line, that line is not repeated below the title.
pub fn layout_chapter(chapter: &LoadedChapter, width: usize, config: &ReaderConfig) -> Vec<Row> {
    let stride = config.line_stride();
    let gap = config.paragraph_gap();
    let title = chapter.chapter.title.trim();

    let mut rows = Vec::new();
    for line in textwrap::wrap(title, width) {
        rows.push(Row {
            kind: RowKind::Title,
            text: line.into_owned(),
        });
    }
    rows.push(Row::blank());

    let mut paragraphs = chapter
        .content
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .peekable();
    if paragraphs.peek().is_some_and(|first| first.trim() == title) {
        paragraphs.next();
    }

    let mut first = true;
    for paragraph in paragraphs {
        if !first {
            rows.extend(std::iter::repeat_with(Row::blank).take(gap));
        }
        first = false;
        for line in textwrap::wrap(paragraph, width) {
            rows.push(Row {
                kind: RowKind::Text,
                text: line.into_owned(),
            });
            rows.extend(std::iter::repeat_with(Row::blank).take(stride - 1));
        }
    }
    rows.push(Row::blank());
    rows
}
