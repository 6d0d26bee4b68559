//! Heuristic chapter detection for unstructured text.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::toc::TocChapter;

/// Matches closer than this (in chars) to the previously accepted heading are
/// treated as the same heading line hit by several patterns.
pub const DEFAULT_PROXIMITY: usize = 100;

pub const FALLBACK_TITLE: &str = "Full Text";
pub const PREFACE_TITLE: &str = "Preface";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingKind {
    NumberedChapter,
    EnglishChapter,
    Volume,
    Bracketed,
    Frontmatter,
}

struct HeadingPattern {
    kind: HeadingKind,
    regex: Regex,
}

const CJK_NUMBER: &str = "[0-9０-９零〇一二三四五六七八九十百千万两]+";
const LATIN_NUMBER: &str = r"(?:\d+|(?-i:[IVXLCDM]+)|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty)\b";

static PATTERNS: LazyLock<Vec<HeadingPattern>> = LazyLock::new(|| {
    let sources = [
        (
            HeadingKind::NumberedChapter,
            format!(r"(?m)^[ \t\u{{3000}}]*第{CJK_NUMBER}[章回节集][^\r\n]{{0,40}}\r?$"),
        ),
        (
            HeadingKind::EnglishChapter,
            format!(r"(?mi)^[ \t]*chapter[ \t]+{LATIN_NUMBER}[^\r\n]{{0,50}}\r?$"),
        ),
        (
            HeadingKind::Volume,
            format!(r"(?m)^[ \t\u{{3000}}]*第{CJK_NUMBER}[卷部篇][^\r\n]{{0,40}}\r?$"),
        ),
        (
            HeadingKind::Volume,
            format!(r"(?mi)^[ \t]*(?:volume|part|book)[ \t]+{LATIN_NUMBER}[^\r\n]{{0,50}}\r?$"),
        ),
        (
            HeadingKind::Bracketed,
            r"(?m)^[ \t\u{3000}]*(?:【[^】\r\n]{1,30}】|〖[^〗\r\n]{1,30}〗|\[[^\]\r\n]{1,30}\])[ \t\u{3000}]*\r?$"
                .to_string(),
        ),
        (
            HeadingKind::Frontmatter,
            r"(?m)^[ \t\u{3000}]*(?:序章|楔子|尾声|番外|后记)[^\r\n]{0,30}\r?$".to_string(),
        ),
        (
            HeadingKind::Frontmatter,
            r"(?mi)^[ \t]*(?:prologue|epilogue|preface|afterword)\b[^\r\n]{0,40}\r?$".to_string(),
        ),
    ];

    sources
        .into_iter()
        .map(|(kind, source)| HeadingPattern {
            kind,
            regex: Regex::new(&source).expect("Failed to compile chapter heading regex"),
        })
        .collect()
});

struct HeadingMatch {
    byte_offset: usize,
    title: String,
    kind: HeadingKind,
}

/// Splits raw text into chapters using heading-pattern heuristics.
///
/// Detection is pure: the same text always produces the same chapter list,
/// and the chapters always partition the text with no gaps.
#[derive(Debug, Clone)]
pub struct ChapterDetector {
    proximity: usize,
}

impl Default for ChapterDetector {
    fn default() -> Self {
        Self {
            proximity: DEFAULT_PROXIMITY,
        }
    }
}

impl ChapterDetector {
    pub fn with_proximity(proximity: usize) -> Self {
        Self { proximity }
    }

    pub fn detect(&self, text: &str) -> Vec<TocChapter> {
        let total_length = text.chars().count();

        let mut matches: Vec<HeadingMatch> = PATTERNS
            .iter()
            .flat_map(|pattern| {
                pattern.regex.find_iter(text).map(|m| HeadingMatch {
                    byte_offset: m.start(),
                    title: m.as_str().trim().to_string(),
                    kind: pattern.kind,
                })
            })
            .collect();
        matches.sort_by_key(|m| m.byte_offset);

        let offsets = char_offsets(text, matches.iter().map(|m| m.byte_offset));

        let mut boundaries: Vec<(usize, String)> = Vec::new();
        for (heading, offset) in matches.into_iter().zip(offsets) {
            if let Some((last, _)) = boundaries.last() {
                if offset - last < self.proximity {
                    debug!(
                        "Dropping {:?} heading {:?} at {}: too close to {}",
                        heading.kind, heading.title, offset, last
                    );
                    continue;
                }
            }
            boundaries.push((offset, heading.title));
        }

        if boundaries.is_empty() {
            debug!("No chapter headings found in {} chars", total_length);
            return vec![TocChapter::new(0, FALLBACK_TITLE, 0, total_length)];
        }

        if let Some((first, _)) = boundaries.first_mut() {
            if *first > 0 {
                let leading: String = text.chars().take(*first).collect();
                if leading.trim().is_empty() {
                    *first = 0;
                } else {
                    boundaries.insert(0, (0, PREFACE_TITLE.to_string()));
                }
            }
        }

        let chapters: Vec<TocChapter> = boundaries
            .iter()
            .enumerate()
            .map(|(i, (start, title))| {
                let end = boundaries
                    .get(i + 1)
                    .map(|(next, _)| *next)
                    .unwrap_or(total_length);
                TocChapter::new(i, title.clone(), *start, end)
            })
            .collect();

        debug!(
            "Detected {} chapters in {} chars",
            chapters.len(),
            total_length
        );
        chapters
    }
}

pub fn detect_chapters(text: &str) -> Vec<TocChapter> {
    ChapterDetector::default().detect(text)
}

/// Converts ascending byte offsets into char offsets in a single pass.
fn char_offsets(text: &str, byte_offsets: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut result = Vec::new();
    let mut chars_seen = 0;
    let mut bytes_seen = 0;
    for byte_offset in byte_offsets {
        chars_seen += text[bytes_seen..byte_offset].chars().count();
        bytes_seen = byte_offset;
        result.push(chars_seen);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(chapters: &[TocChapter], total: usize) {
        assert!(!chapters.is_empty());
        assert_eq!(chapters[0].start_offset, 0);
        for pair in chapters.windows(2) {
            assert_eq!(pair[0].end_offset, pair[1].start_offset);
        }
        assert_eq!(chapters.last().unwrap().end_offset, total);
    }

    fn filler(len: usize) -> String {
        let mut s = String::new();
        while s.len() < len {
            s.push_str("lorem ipsum ");
        }
        s.truncate(len);
        s.push('\n');
        s
    }

    #[test]
    fn text_without_headings_is_one_chapter() {
        let text = "just a long story\nwith no headings at all\n".repeat(50);
        let chapters = detect_chapters(&text);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, FALLBACK_TITLE);
        assert_eq!(chapters[0].end_offset, text.chars().count());
    }

    #[test]
    fn empty_text_is_one_empty_chapter() {
        let chapters = detect_chapters("");
        assert_eq!(chapters.len(), 1);
        assert!(chapters[0].is_empty());
    }

    #[test]
    fn detects_english_chapters() {
        let text = format!(
            "Chapter 1 The Start\n{}Chapter 2 The Middle\n{}CHAPTER III\n{}",
            filler(300),
            filler(300),
            filler(300)
        );
        let chapters = detect_chapters(&text);
        let titles: Vec<_> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Chapter 1 The Start", "Chapter 2 The Middle", "CHAPTER III"]);
        assert_partition(&chapters, text.chars().count());
    }

    #[test]
    fn detects_cjk_chapters_with_char_offsets() {
        let body = "这是一段很长的正文内容。".repeat(20);
        let text = format!("第一章 风起\n{body}\n第二章 云涌\n{body}\n第10章 终\n{body}\n");
        let chapters = detect_chapters(&text);
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[1].title, "第二章 云涌");

        let expected_second = "第一章 风起\n".chars().count() + body.chars().count() + 1;
        assert_eq!(chapters[1].start_offset, expected_second);
        assert_partition(&chapters, text.chars().count());
    }

    #[test]
    fn nearby_matches_collapse_to_one_boundary() {
        // 50 chars apart: second heading is swallowed by the first.
        let text = format!("Chapter 1\n{}Chapter 2\n{}", filler(40), filler(600));
        let chapters = detect_chapters(&text);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Chapter 1");

        // 500 chars apart: both stay.
        let text = format!("Chapter 1\n{}Chapter 2\n{}", filler(490), filler(600));
        let chapters = detect_chapters(&text);
        assert_eq!(chapters.len(), 2);
        assert_partition(&chapters, text.chars().count());
    }

    #[test]
    fn custom_proximity_keeps_close_headings() {
        let text = format!("Chapter 1\n{}Chapter 2\n{}", filler(40), filler(600));
        let chapters = ChapterDetector::with_proximity(10).detect(&text);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].title, "Chapter 2");
        assert_partition(&chapters, text.chars().count());
    }

    #[test]
    fn volume_and_chapter_on_adjacent_lines_collapse() {
        let text = format!("第一卷 风云\n第一章 开端\n{}", filler(200));
        let chapters = detect_chapters(&text);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "第一卷 风云");
    }

    #[test]
    fn bracketed_titles_are_headings() {
        let text = format!("【楔子】\n{}【正文】\n{}", filler(200), filler(200));
        let chapters = detect_chapters(&text);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].title, "【正文】");
    }

    #[test]
    fn leading_text_becomes_preface() {
        let text = format!("A Book Title\nby Someone\n{}Chapter 1\n{}", filler(200), filler(200));
        let chapters = detect_chapters(&text);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, PREFACE_TITLE);
        assert_partition(&chapters, text.chars().count());
    }

    #[test]
    fn leading_whitespace_folds_into_first_chapter() {
        let text = format!("\n\n  Chapter 1\n{}", filler(200));
        let chapters = detect_chapters(&text);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].start_offset, 0);
        assert_eq!(chapters[0].title, "Chapter 1");
    }

    #[test]
    fn detection_is_deterministic() {
        let text = format!(
            "Prologue\n{}Part One\n{}Chapter 1\n{}[Interlude]\n{}",
            filler(150),
            filler(150),
            filler(150),
            filler(150)
        );
        let first = detect_chapters(&text);
        let second = detect_chapters(&text);
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
        assert_partition(&first, text.chars().count());
    }

    #[test]
    fn long_lines_are_not_headings() {
        let sentence = "Chapter 1 was the part of the book where absolutely nothing of any importance happened to anyone.";
        let text = format!("{}\n{}", sentence, filler(300));
        let chapters = detect_chapters(&text);
        assert_eq!(chapters[0].title, FALLBACK_TITLE);
    }
}
