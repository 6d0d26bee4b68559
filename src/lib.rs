// Engine
pub mod detector;
pub mod layout;
pub mod loader;
pub mod progress;
pub mod progress_store;
pub mod reflow;
pub mod renderer;
pub mod request;
pub mod service;
pub mod session;
pub mod settings;
pub mod source;
pub mod toc;
pub mod tracker;
pub mod window;
pub mod worker;

// Terminal reader
pub mod app;
pub mod event_source;
pub mod notification;
pub mod panic_handler;
pub mod theme;
pub mod toc_popup;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use app::{App, run_app_with_event_source};
pub use service::ReaderService;
pub use session::{Effect, Event, Phase, ReadingSession};
pub use source::{BookSource, HttpBookSource, LocalBookSource, SourceError};
pub use toc::{TocChapter, TocIndex};
