pub mod test_helpers {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::event_source::{Event, KeyCode, SimulatedEventSource};
    use crate::progress::ProgressPayload;
    use crate::source::{BookSource, SourceError, TocResponse, WindowResponse};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    /// Builder for creating test scenarios with simulated user input
    #[derive(Default)]
    pub struct TestScenarioBuilder {
        events: Vec<Event>,
    }

    impl TestScenarioBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a character key press
        pub fn press_char(mut self, c: char) -> Self {
            self.events.push(SimulatedEventSource::char_key(c));
            self
        }

        /// Add a Ctrl+character key press
        pub fn press_ctrl_char(mut self, c: char) -> Self {
            self.events.push(SimulatedEventSource::ctrl_char_key(c));
            self
        }

        pub fn press_enter(mut self) -> Self {
            self.events.push(SimulatedEventSource::key(KeyCode::Enter));
            self
        }

        pub fn press_esc(mut self) -> Self {
            self.events.push(SimulatedEventSource::key(KeyCode::Esc));
            self
        }

        /// Scroll down n rows (press 'j' n times)
        pub fn navigate_down(mut self, times: usize) -> Self {
            for _ in 0..times {
                self.events.push(SimulatedEventSource::char_key('j'));
            }
            self
        }

        /// Scroll up n rows (press 'k' n times)
        pub fn navigate_up(mut self, times: usize) -> Self {
            for _ in 0..times {
                self.events.push(SimulatedEventSource::char_key('k'));
            }
            self
        }

        pub fn next_chapter(mut self) -> Self {
            self.events.push(SimulatedEventSource::char_key(']'));
            self
        }

        pub fn prev_chapter(mut self) -> Self {
            self.events.push(SimulatedEventSource::char_key('['));
            self
        }

        /// Scroll half screen down (Ctrl+d)
        pub fn half_screen_down(mut self) -> Self {
            self.events.push(SimulatedEventSource::ctrl_char_key('d'));
            self
        }

        /// Scroll half screen up (Ctrl+u)
        pub fn half_screen_up(mut self) -> Self {
            self.events.push(SimulatedEventSource::ctrl_char_key('u'));
            self
        }

        pub fn open_toc(mut self) -> Self {
            self.events.push(SimulatedEventSource::char_key('t'));
            self
        }

        pub fn mouse_scroll_down(mut self, times: usize) -> Self {
            for _ in 0..times {
                self.events.push(SimulatedEventSource::mouse_scroll(true));
            }
            self
        }

        pub fn resize(mut self, width: u16, height: u16) -> Self {
            self.events.push(SimulatedEventSource::resize(width, height));
            self
        }

        /// Quit the application (press 'q')
        pub fn quit(mut self) -> Self {
            self.events.push(SimulatedEventSource::char_key('q'));
            self
        }

        /// Build the simulated event source
        pub fn build(self) -> SimulatedEventSource {
            SimulatedEventSource::new(self.events)
        }
    }

    /// Create a test terminal for snapshot testing
    pub fn create_test_terminal(width: u16, height: u16) -> Terminal<TestBackend> {
        let backend = TestBackend::new(width, height);
        Terminal::new(backend).unwrap()
    }

    /// Capture the current terminal buffer as a string
    pub fn capture_terminal_state(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut lines = Vec::new();

        for y in 0..buffer.area.height {
            let mut line = String::new();
            for x in 0..buffer.area.width {
                line.push_str(buffer[(x, y)].symbol());
            }
            lines.push(line.trim_end().to_string());
        }

        while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
            lines.pop();
        }

        lines.join("\n")
    }

    /// Plain-text book with `chapters` headed chapters of `lines` lines each.
    pub fn sample_book(chapters: usize, lines: usize) -> String {
        let mut text = String::new();
        for i in 0..chapters {
            text.push_str(&format!("Chapter {}\n", i + 1));
            for p in 0..lines {
                text.push_str(&format!("line {i}-{p}\n"));
            }
        }
        text
    }

    /// Wraps a source and counts the window fetches made through it.
    pub struct CountingSource<S> {
        inner: S,
        window_fetches: Arc<AtomicUsize>,
        progress_saves: Arc<AtomicUsize>,
    }

    impl<S: BookSource> CountingSource<S> {
        pub fn new(inner: S) -> Self {
            Self {
                inner,
                window_fetches: Arc::new(AtomicUsize::new(0)),
                progress_saves: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Shared counter, still readable after the source moved to the worker.
        pub fn window_fetches(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.window_fetches)
        }

        pub fn progress_saves(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.progress_saves)
        }
    }

    impl<S: BookSource> BookSource for CountingSource<S> {
        fn book_id(&self) -> &str {
            self.inner.book_id()
        }

        fn fetch_toc(&mut self) -> Result<TocResponse, SourceError> {
            self.inner.fetch_toc()
        }

        fn fetch_window(
            &mut self,
            index: usize,
            buffer: usize,
        ) -> Result<WindowResponse, SourceError> {
            self.window_fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_window(index, buffer)
        }

        fn fetch_progress(&mut self) -> Result<Option<ProgressPayload>, SourceError> {
            self.inner.fetch_progress()
        }

        fn save_progress(&mut self, payload: &ProgressPayload) -> Result<(), SourceError> {
            self.progress_saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save_progress(payload)
        }
    }
}
