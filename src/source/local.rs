//! Serves a plain-text file from disk.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::{BookSource, SourceError, TocResponse, WindowResponse, WireRange};
use crate::progress::ProgressPayload;
use crate::progress_store::ProgressStore;
use crate::toc::TocIndex;
use crate::window::{LoadedChapter, LoadedRange};

/// A TXT book held in memory, with its chapter list and a local progress store.
///
/// The table of contents is read from a `<file>.toc.json` sidecar when one
/// exists and still matches the text; otherwise chapters are detected and the
/// sidecar is rewritten.
pub struct LocalBookSource {
    book_id: String,
    text: String,
    toc: TocIndex,
    byte_ranges: Vec<Range<usize>>,
    store: ProgressStore,
}

impl LocalBookSource {
    pub fn open(path: &Path, store: ProgressStore) -> Result<Self, SourceError> {
        let bytes = fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let toc = load_or_detect_toc(path, &text);
        let book_id = fs::canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf())
            .to_string_lossy()
            .into_owned();

        info!(
            "Opened {} ({} chars, {} chapters)",
            path.display(),
            toc.total_length(),
            toc.chapter_count()
        );
        Ok(Self::with_toc(book_id, text, toc, store))
    }

    /// Serves `text` directly; chapters are always detected.
    pub fn from_text(book_id: impl Into<String>, text: impl Into<String>, store: ProgressStore) -> Self {
        let text = text.into();
        let toc = TocIndex::from_detected(&text);
        Self::with_toc(book_id.into(), text, toc, store)
    }

    fn with_toc(book_id: String, text: String, toc: TocIndex, store: ProgressStore) -> Self {
        let byte_ranges = byte_ranges(&text, &toc);
        Self {
            book_id,
            text,
            toc,
            byte_ranges,
            store,
        }
    }

    pub fn toc(&self) -> &TocIndex {
        &self.toc
    }

    fn chapter_content(&self, index: usize) -> &str {
        self.byte_ranges
            .get(index)
            .and_then(|range| self.text.get(range.clone()))
            .unwrap_or_default()
    }
}

impl BookSource for LocalBookSource {
    fn book_id(&self) -> &str {
        &self.book_id
    }

    fn fetch_toc(&mut self) -> Result<TocResponse, SourceError> {
        Ok(TocResponse::from_index(&self.toc))
    }

    fn fetch_window(&mut self, index: usize, buffer: usize) -> Result<WindowResponse, SourceError> {
        let count = self.toc.chapter_count();
        if index >= count {
            return Err(SourceError::OutOfRange { index, count });
        }

        let range = LoadedRange::around(index, buffer, self.toc.last_index());
        let chapters = (range.start..=range.end)
            .filter_map(|i| {
                let chapter = self.toc.chapter(i)?.clone();
                Some(LoadedChapter::new(chapter, self.chapter_content(i)))
            })
            .collect();
        debug!("Serving chapters {}..={} of {}", range.start, range.end, self.book_id);

        Ok(WindowResponse {
            chapters,
            loaded_range: WireRange::from(Some(range)),
            total_chapters: count,
            total_length: self.toc.total_length(),
            current_index: index,
        })
    }

    fn fetch_progress(&mut self) -> Result<Option<ProgressPayload>, SourceError> {
        Ok(self.store.get(&self.book_id).map(|saved| saved.to_payload()))
    }

    fn save_progress(&mut self, payload: &ProgressPayload) -> Result<(), SourceError> {
        self.store
            .update(&self.book_id, payload)
            .map_err(SourceError::Store)
    }
}

pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".toc.json");
    PathBuf::from(name)
}

fn load_or_detect_toc(path: &Path, text: &str) -> TocIndex {
    let sidecar = sidecar_path(path);
    let total = text.chars().count();

    match read_sidecar(&sidecar) {
        Ok(toc) if toc.total_length() == total => {
            debug!("Using chapter list from {}", sidecar.display());
            return toc;
        }
        Ok(toc) => info!(
            "Chapter list {} is stale ({} chars, text has {}), re-detecting",
            sidecar.display(),
            toc.total_length(),
            total
        ),
        Err(e) if sidecar.exists() => warn!("Ignoring chapter list {}: {}", sidecar.display(), e),
        Err(_) => {}
    }

    let toc = TocIndex::from_detected(text);
    match serde_json::to_string_pretty(&TocResponse::from_index(&toc)) {
        Ok(body) => {
            if let Err(e) = fs::write(&sidecar, body) {
                warn!("Failed to write chapter list {}: {}", sidecar.display(), e);
            }
        }
        Err(e) => warn!("Failed to serialize chapter list: {e}"),
    }
    toc
}

fn read_sidecar(path: &Path) -> Result<TocIndex, SourceError> {
    let content = fs::read_to_string(path)?;
    let response: TocResponse = serde_json::from_str(&content)?;
    Ok(response.into_index()?)
}

/// Byte range of every chapter, from the char offsets of the index.
fn byte_ranges(text: &str, toc: &TocIndex) -> Vec<Range<usize>> {
    let mut boundaries = toc
        .chapters()
        .iter()
        .map(|chapter| chapter.start_offset)
        .chain(std::iter::once(toc.total_length()))
        .peekable();

    let mut bytes = Vec::with_capacity(toc.chapter_count() + 1);
    for (char_pos, (byte_pos, _)) in text.char_indices().enumerate() {
        while boundaries.peek() == Some(&char_pos) {
            bytes.push(byte_pos);
            boundaries.next();
        }
    }
    bytes.extend(boundaries.map(|_| text.len()));

    bytes.windows(2).map(|pair| pair[0]..pair[1]).collect()
}
