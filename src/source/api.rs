//! JSON bodies of the book endpoints.

use serde::{Deserialize, Serialize};

use crate::toc::{TocChapter, TocError, TocIndex};
use crate::window::{LoadedChapter, LoadedRange};

/// `GET /books/{id}/toc`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TocResponse {
    pub chapters: Vec<TocChapter>,
    pub total_length: usize,
}

impl TocResponse {
    pub fn from_index(toc: &TocIndex) -> Self {
        Self {
            chapters: toc.chapters().to_vec(),
            total_length: toc.total_length(),
        }
    }

    pub fn into_index(self) -> Result<TocIndex, TocError> {
        TocIndex::new(self.chapters, self.total_length)
    }
}

/// Inclusive chapter range; `-1..-1` means nothing is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRange {
    pub start: i64,
    pub end: i64,
}

impl WireRange {
    pub const EMPTY: WireRange = WireRange { start: -1, end: -1 };

    pub fn to_range(self) -> Option<LoadedRange> {
        if self.start < 0 || self.end < self.start {
            return None;
        }
        Some(LoadedRange::new(self.start as usize, self.end as usize))
    }
}

impl From<Option<LoadedRange>> for WireRange {
    fn from(range: Option<LoadedRange>) -> Self {
        match range {
            Some(range) => WireRange {
                start: range.start as i64,
                end: range.end as i64,
            },
            None => WireRange::EMPTY,
        }
    }
}

/// `GET /books/{id}/chapter/{index}?buffer=N`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowResponse {
    pub chapters: Vec<LoadedChapter>,
    pub loaded_range: WireRange,
    pub total_chapters: usize,
    pub total_length: usize,
    pub current_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_response_parses_camel_case_body() {
        let body = r#"{
            "chapters": [
                {"index": 3, "title": "Three", "startOffset": 10, "endOffset": 13, "content": "abc"}
            ],
            "loadedRange": {"start": 3, "end": 3},
            "totalChapters": 9,
            "totalLength": 500,
            "currentIndex": 3
        }"#;
        let response: WindowResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.chapters[0].index(), 3);
        assert_eq!(response.chapters[0].content, "abc");
        assert_eq!(response.loaded_range.to_range(), Some(LoadedRange::new(3, 3)));
    }

    #[test]
    fn sentinel_range_is_empty() {
        assert_eq!(WireRange::EMPTY.to_range(), None);
        assert_eq!(WireRange::from(None), WireRange::EMPTY);
        assert_eq!(
            WireRange::from(Some(LoadedRange::new(2, 4))),
            WireRange { start: 2, end: 4 }
        );
    }

    #[test]
    fn toc_response_validates_into_index() {
        let body = r#"{"chapters": [
            {"title": "A", "startOffset": 0, "endOffset": 5},
            {"title": "B", "startOffset": 5, "endOffset": 9}
        ], "totalLength": 9}"#;
        let toc: TocResponse = serde_json::from_str(body).unwrap();
        let index = toc.clone().into_index().unwrap();
        assert_eq!(index.chapter(1).map(|c| c.index), Some(1));

        let short = TocResponse {
            total_length: 12,
            ..toc
        };
        assert!(short.into_index().is_err());
    }
}
