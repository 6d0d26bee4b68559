//! Where book content and reading progress come from.
//!
//! A [`BookSource`] serves the chapter contract: the full table of contents,
//! windows of chapter content around an index, and the saved progress. Calls
//! block; the worker thread owns the source and runs them off the UI thread.

pub mod api;
pub mod http;
pub mod local;

pub use api::{TocResponse, WindowResponse, WireRange};
pub use http::HttpBookSource;
pub use local::LocalBookSource;

use log::warn;

use crate::progress::ProgressPayload;
use crate::toc::TocError;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered {status}")]
    Status { status: u16, url: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid table of contents: {0}")]
    InvalidToc(#[from] TocError),

    #[error("chapter {index} is out of range (book has {count})")]
    OutOfRange { index: usize, count: usize },

    #[error("progress store: {0:#}")]
    Store(anyhow::Error),
}

pub trait BookSource: Send {
    /// Key the progress of this book is stored under.
    fn book_id(&self) -> &str;

    fn fetch_toc(&mut self) -> Result<TocResponse, SourceError>;

    /// Chapters `[index - buffer, index + buffer]`, clamped to the book.
    fn fetch_window(&mut self, index: usize, buffer: usize) -> Result<WindowResponse, SourceError>;

    /// `None` when nothing has been saved for this book.
    fn fetch_progress(&mut self) -> Result<Option<ProgressPayload>, SourceError>;

    fn save_progress(&mut self, payload: &ProgressPayload) -> Result<(), SourceError>;

    /// Fire-and-forget save used on teardown. Failures are only logged.
    fn send_beacon(&mut self, payload: &ProgressPayload) {
        if let Err(e) = self.save_progress(payload) {
            warn!("Progress beacon for {} failed: {}", self.book_id(), e);
        }
    }
}

impl<S: BookSource + ?Sized> BookSource for Box<S> {
    fn book_id(&self) -> &str {
        (**self).book_id()
    }

    fn fetch_toc(&mut self) -> Result<TocResponse, SourceError> {
        (**self).fetch_toc()
    }

    fn fetch_window(&mut self, index: usize, buffer: usize) -> Result<WindowResponse, SourceError> {
        (**self).fetch_window(index, buffer)
    }

    fn fetch_progress(&mut self) -> Result<Option<ProgressPayload>, SourceError> {
        (**self).fetch_progress()
    }

    fn save_progress(&mut self, payload: &ProgressPayload) -> Result<(), SourceError> {
        (**self).save_progress(payload)
    }

    fn send_beacon(&mut self, payload: &ProgressPayload) {
        (**self).send_beacon(payload)
    }
}
