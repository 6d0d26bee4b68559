//! Reading session state machine
//!
//! The session owns the table of contents, the chapter window, the renderer
//! and the progress tracker. It never performs I/O: every event returns the
//! effects the caller has to carry out, and the results come back as events.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::loader::{Completion, LoadError, LoadKind, TargetDecision, WindowFetch, WindowLoader};
use crate::progress::{
    ChapterOffset, ProgressPayload, ReadingProgress, RestoreTarget, compute_fraction,
    locate_fraction,
};
use crate::renderer::{JumpOffset, JumpOutcome, ScrollRenderer, Viewport};
use crate::request::RequestId;
use crate::settings::{EngineSettings, ReaderConfig};
use crate::source::{SourceError, TocResponse, WindowResponse};
use crate::toc::TocIndex;
use crate::tracker::ProgressTracker;
use crate::window::{ChapterWindow, Direction, WindowChange};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    TocLoading,
    TocReady,
    ProgressLoading,
    WindowLoading(LoadKind),
    WindowReady,
    ScrollActive,
    Flushing,
    Closed,
    Failed,
}

impl Phase {
    fn accepts_navigation(self) -> bool {
        matches!(
            self,
            Phase::WindowLoading(_) | Phase::WindowReady | Phase::ScrollActive
        )
    }
}

/// Inputs to the session
#[derive(Debug)]
pub enum Event {
    Open,
    TocLoaded(Result<TocResponse, SourceError>),
    ProgressLoaded(Result<Option<ProgressPayload>, SourceError>),
    WindowLoaded {
        id: RequestId,
        result: Result<WindowResponse, SourceError>,
    },
    Resized(Viewport),
    /// Scroll by a signed number of rows
    Scrolled(isize),
    /// Table-of-contents navigation
    JumpRequested(usize),
    /// Progress-bar navigation to a book-wide fraction
    SeekRequested(f64),
    ConfigChanged(ReaderConfig),
    Tick,
    Teardown,
    /// The teardown beacon has been handed off
    Flushed,
}

/// Work the session asks its driver to do
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    FetchToc,
    FetchProgress,
    FetchWindow(WindowFetch),
    SaveProgress(ProgressPayload),
    /// Best-effort save of a closing session
    Beacon(ProgressPayload),
    /// Recoverable error to show to the reader
    Notify(String),
    /// The book cannot be shown at all
    Fatal(String),
}

pub struct ReadingSession {
    phase: Phase,
    toc: Option<TocIndex>,
    window: ChapterWindow,
    loader: WindowLoader,
    renderer: ScrollRenderer,
    tracker: ProgressTracker,
    progress: Option<ReadingProgress>,
    retain: usize,
    reading: bool,
    failure: Option<String>,
}

impl ReadingSession {
    pub fn new(config: ReaderConfig, engine: &EngineSettings) -> Self {
        Self {
            phase: Phase::Idle,
            toc: None,
            window: ChapterWindow::new(),
            loader: WindowLoader::new(engine.buffer),
            renderer: ScrollRenderer::new(config, 0),
            tracker: ProgressTracker::new(Duration::from_millis(engine.debounce_ms)),
            progress: None,
            retain: engine.retain.max(engine.buffer),
            reading: false,
            failure: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn toc(&self) -> Option<&TocIndex> {
        self.toc.as_ref()
    }

    pub fn window(&self) -> &ChapterWindow {
        &self.window
    }

    pub fn renderer(&self) -> &ScrollRenderer {
        &self.renderer
    }

    pub fn progress(&self) -> Option<&ReadingProgress> {
        self.progress.as_ref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    /// Earliest instant at which a `Tick` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tracker.deadline()
    }

    /// Apply an event and return resulting effects
    pub fn handle(&mut self, event: Event, now: Instant) -> Vec<Effect> {
        match event {
            Event::Open => {
                if self.phase != Phase::Idle {
                    return vec![];
                }
                self.set_phase(Phase::TocLoading);
                vec![Effect::FetchToc]
            }

            Event::TocLoaded(result) => {
                if self.phase != Phase::TocLoading {
                    return vec![];
                }
                self.on_toc_loaded(result)
            }

            Event::ProgressLoaded(result) => {
                if self.phase != Phase::ProgressLoading {
                    return vec![];
                }
                self.on_progress_loaded(result, now)
            }

            Event::WindowLoaded { id, result } => {
                if !self.phase.accepts_navigation() {
                    debug!("Ignoring window response {id:?} in {:?}", self.phase);
                    return vec![];
                }
                self.on_window_loaded(id, result, now)
            }

            Event::Resized(viewport) => {
                self.renderer.set_viewport(viewport, &self.window);
                let mut effects = Vec::new();
                if self.phase.accepts_navigation() {
                    self.settle_pending_jump(now);
                    self.record_progress(now);
                    effects.extend(self.maybe_extend(None, now));
                }
                effects
            }

            Event::Scrolled(delta) => {
                if !self.phase.accepts_navigation() {
                    return vec![];
                }
                self.renderer.scroll_by(delta);
                self.reading = true;
                if self.phase == Phase::WindowReady {
                    self.set_phase(Phase::ScrollActive);
                }
                self.record_progress(now);
                let prefer = if delta < 0 {
                    Direction::Prev
                } else {
                    Direction::Next
                };
                self.maybe_extend(Some(prefer), now).into_iter().collect()
            }

            Event::JumpRequested(chapter) => {
                if !self.phase.accepts_navigation() {
                    return vec![];
                }
                self.jump(chapter, JumpOffset::Rows(0), now)
            }

            Event::SeekRequested(fraction) => {
                if !self.phase.accepts_navigation() {
                    return vec![];
                }
                let Some(toc) = &self.toc else {
                    return vec![];
                };
                let (chapter, within) = locate_fraction(toc, fraction);
                self.jump(chapter, JumpOffset::Fraction(within), now)
            }

            Event::ConfigChanged(config) => {
                self.renderer.apply_config(config, &self.window);
                self.record_progress(now);
                vec![]
            }

            Event::Tick => self.on_tick(now),

            Event::Teardown => self.teardown(),

            Event::Flushed => {
                if self.phase == Phase::Flushing {
                    self.set_phase(Phase::Closed);
                }
                vec![]
            }
        }
    }

    /// Explicitly loads one more chapter past an edge of the window.
    pub fn load_more(&mut self, direction: Direction, now: Instant) -> Vec<Effect> {
        if !self.phase.accepts_navigation() {
            return vec![];
        }
        self.request_extension(direction, now).into_iter().collect()
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("Session {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn ready_phase(&self) -> Phase {
        if self.reading {
            Phase::ScrollActive
        } else {
            Phase::WindowReady
        }
    }

    fn on_toc_loaded(&mut self, result: Result<TocResponse, SourceError>) -> Vec<Effect> {
        let toc = match result.map_err(LoadError::from).and_then(|response| {
            response
                .into_index()
                .map_err(|e| LoadError::Source(SourceError::InvalidToc(e)))
        }) {
            Ok(toc) => toc,
            Err(e) => {
                let message = format!("Could not load table of contents: {e}");
                warn!("{message}");
                self.failure = Some(message.clone());
                self.set_phase(Phase::Failed);
                return vec![Effect::Fatal(message)];
            }
        };

        info!(
            "Table of contents ready: {} chapters, {} chars",
            toc.chapter_count(),
            toc.total_length()
        );
        self.toc = Some(toc);
        self.set_phase(Phase::TocReady);
        self.set_phase(Phase::ProgressLoading);
        vec![Effect::FetchProgress]
    }

    fn on_progress_loaded(
        &mut self,
        result: Result<Option<ProgressPayload>, SourceError>,
        now: Instant,
    ) -> Vec<Effect> {
        let Some(toc) = &self.toc else {
            return vec![];
        };

        let target = match result {
            Ok(Some(payload)) => {
                let target = RestoreTarget::resolve(&payload, toc);
                info!(
                    "Restoring chapter {} at {:?} (saved {:?})",
                    target.chapter_index, target.offset, payload.position
                );
                self.tracker.seed(payload);
                target
            }
            Ok(None) => RestoreTarget::START,
            Err(e) => {
                warn!("Could not load saved progress, starting at the beginning: {e}");
                RestoreTarget::START
            }
        };

        self.set_phase(Phase::WindowReady);
        let offset = match target.offset {
            ChapterOffset::Rows(rows) => JumpOffset::Rows(rows),
            ChapterOffset::Within(within) => JumpOffset::Fraction(within),
        };
        self.jump(target.chapter_index, offset, now)
    }

    /// Scrolls to a chapter, loading it first when it is not in the window.
    fn jump(&mut self, chapter: usize, offset: JumpOffset, now: Instant) -> Vec<Effect> {
        let Some(toc) = &self.toc else {
            return vec![];
        };
        let chapter = toc.clamp_index(chapter);
        let decision = self.loader.request_target(chapter, self.window.range(), toc);

        let outcome = self.renderer.scroll_to_chapter(chapter, offset);
        if outcome == JumpOutcome::Performed {
            self.record_progress(now);
        }

        match decision {
            TargetDecision::AlreadyLoaded => vec![],
            TargetDecision::Queued => vec![],
            TargetDecision::Fetch(fetch) => {
                self.set_phase(Phase::WindowLoading(fetch.kind));
                vec![Effect::FetchWindow(fetch)]
            }
        }
    }

    fn on_window_loaded(
        &mut self,
        id: RequestId,
        result: Result<WindowResponse, SourceError>,
        now: Instant,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();

        match result {
            Ok(response) => match self.loader.complete(id) {
                Completion::Unknown => return effects,
                Completion::Superseded => {}
                Completion::Accepted(kind) => {
                    if let Err(e) = self.apply_window(kind, response) {
                        effects.push(self.window_failed(kind, &LoadError::from(e)));
                    }
                }
            },
            Err(e) => match self.loader.fail(id, now) {
                Completion::Unknown => return effects,
                Completion::Superseded => {}
                Completion::Accepted(kind) => {
                    effects.push(self.window_failed(kind, &LoadError::from(e)));
                }
            },
        }

        self.set_phase(self.ready_phase());

        if let Some(target) = self.loader.take_queued() {
            if let Some(toc) = &self.toc {
                if let TargetDecision::Fetch(fetch) =
                    self.loader.request_target(target, self.window.range(), toc)
                {
                    self.set_phase(Phase::WindowLoading(fetch.kind));
                    effects.push(Effect::FetchWindow(fetch));
                }
            }
        }

        self.settle_pending_jump(now);
        self.apply_retention();
        self.record_progress(now);
        effects.extend(self.maybe_extend(None, now));
        effects
    }

    fn apply_window(
        &mut self,
        kind: LoadKind,
        response: WindowResponse,
    ) -> Result<(), crate::window::WindowError> {
        let change = match kind {
            LoadKind::Target(_) => self.window.merge(response.chapters)?,
            LoadKind::Extend(direction) => self.window.splice(direction, response.chapters)?,
        };
        debug!(
            "Window now {:?} after {:?} ({} prepended, {} appended)",
            self.window.range(),
            kind,
            change.prepended.len(),
            change.appended.len()
        );
        self.renderer.sync(&self.window, &change);
        Ok(())
    }

    fn window_failed(&mut self, kind: LoadKind, error: &LoadError) -> Effect {
        warn!("Window load {kind:?} failed: {error}");
        if let LoadKind::Target(_) = kind {
            self.renderer.cancel_pending_jump();
        }
        Effect::Notify(format!("Failed to load chapters: {error}"))
    }

    /// Runs the deferred jump once nothing it could be waiting for is in
    /// flight and the window can be laid out.
    fn settle_pending_jump(&mut self, now: Instant) {
        if !self.renderer.has_pending_jump()
            || self.loader.is_loading()
            || !self.renderer.viewport().is_measured()
        {
            return;
        }
        if let Some(outcome) = self.renderer.resolve_pending_jump(now) {
            debug!("Pending jump: {outcome:?}");
        }
    }

    /// Drops chapters far from the one being read.
    fn apply_retention(&mut self) {
        if self.renderer.has_pending_jump() {
            return;
        }
        let Some(active) = self.renderer.active_chapter() else {
            return;
        };
        let change: WindowChange = self.window.retain_around(active, self.retain);
        if !change.is_empty() {
            debug!(
                "Discarded chapters {:?} {:?}",
                change.dropped_front, change.dropped_back
            );
            self.renderer.sync(&self.window, &change);
        }
    }

    fn record_progress(&mut self, now: Instant) {
        if self.renderer.has_pending_jump() {
            return;
        }
        let (Some(toc), Some(position)) = (&self.toc, self.renderer.position()) else {
            return;
        };
        let fraction = compute_fraction(toc, position.chapter, position.within);
        let progress = ReadingProgress::new(fraction, position.chapter, position.intra_rows);
        self.tracker.update(&progress, now);
        self.progress = Some(progress);
    }

    /// Turns the renderer's edge intents into at most one extension fetch.
    fn maybe_extend(&mut self, prefer: Option<Direction>, now: Instant) -> Option<Effect> {
        if self.renderer.has_pending_jump() || !self.renderer.viewport().is_measured() {
            return None;
        }
        let edges = self.renderer.edge_intents();
        let order = match prefer {
            Some(Direction::Prev) => [Direction::Prev, Direction::Next],
            _ => [Direction::Next, Direction::Prev],
        };
        order
            .into_iter()
            .filter(|direction| match direction {
                Direction::Prev => edges.near_start,
                Direction::Next => edges.near_end,
            })
            .find_map(|direction| self.request_extension(direction, now))
    }

    fn request_extension(&mut self, direction: Direction, now: Instant) -> Option<Effect> {
        let toc = self.toc.as_ref()?;
        let fetch = self
            .loader
            .request_extension(direction, self.window.range(), toc, now)?;
        self.set_phase(Phase::WindowLoading(fetch.kind));
        Some(Effect::FetchWindow(fetch))
    }

    fn on_tick(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(outcome) = self.renderer.tick(now) {
            debug!("Pending jump retry: {outcome:?}");
            self.record_progress(now);
            if self.phase.accepts_navigation() {
                effects.extend(self.maybe_extend(None, now));
            }
        }
        if let Some(payload) = self.tracker.poll(now) {
            effects.push(Effect::SaveProgress(payload));
        }
        effects
    }

    fn teardown(&mut self) -> Vec<Effect> {
        match self.phase {
            Phase::Flushing | Phase::Closed => return vec![],
            _ => {}
        }
        self.loader.reset();
        self.renderer.cancel_pending_jump();

        match self.tracker.flush() {
            Some(payload) => {
                self.set_phase(Phase::Flushing);
                vec![Effect::Beacon(payload)]
            }
            None => {
                self.set_phase(Phase::Closed);
                vec![]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress_store::ProgressStore;
    use crate::source::{BookSource, LocalBookSource};
    use crate::window::LoadedRange;

    fn book(chapters: usize) -> LocalBookSource {
        let mut text = String::new();
        for i in 0..chapters {
            text.push_str(&format!("Chapter {}\n", i + 1));
            for p in 0..40 {
                text.push_str(&format!("line {i}-{p}\n"));
            }
        }
        LocalBookSource::from_text("test", text, ProgressStore::ephemeral())
    }

    fn engine() -> EngineSettings {
        EngineSettings {
            buffer: 2,
            retain: 6,
            debounce_ms: 1000,
        }
    }

    fn config() -> ReaderConfig {
        ReaderConfig {
            paragraph_spacing: 0.0,
            margin: 0,
            ..ReaderConfig::default()
        }
    }

    /// Opens a session up to the point where the first window fetch is issued.
    fn open(
        source: &mut LocalBookSource,
        saved: Option<ProgressPayload>,
        now: Instant,
    ) -> (ReadingSession, WindowFetch) {
        let mut session = ReadingSession::new(config(), &engine());
        assert_eq!(session.handle(Event::Open, now), vec![Effect::FetchToc]);
        assert_eq!(
            session.handle(Event::TocLoaded(source.fetch_toc()), now),
            vec![Effect::FetchProgress]
        );
        session.handle(Event::Resized(Viewport::new(40, 10)), now);

        let effects = session.handle(Event::ProgressLoaded(Ok(saved)), now);
        let [Effect::FetchWindow(fetch)] = effects.as_slice() else {
            panic!("expected one window fetch, got {effects:?}");
        };
        (session, *fetch)
    }

    fn deliver(
        session: &mut ReadingSession,
        source: &mut LocalBookSource,
        fetch: WindowFetch,
        now: Instant,
    ) -> Vec<Effect> {
        let result = source.fetch_window(fetch.index, fetch.buffer);
        session.handle(
            Event::WindowLoaded {
                id: fetch.id,
                result,
            },
            now,
        )
    }

    #[test]
    fn open_without_progress_loads_start() {
        let now = Instant::now();
        let mut source = book(10);
        let (mut session, fetch) = open(&mut source, None, now);

        assert_eq!(fetch.index, 0);
        assert_eq!(fetch.buffer, 2);
        assert_eq!(session.phase(), Phase::WindowLoading(LoadKind::Target(0)));

        assert!(deliver(&mut session, &mut source, fetch, now).is_empty());
        assert_eq!(session.phase(), Phase::WindowReady);
        assert_eq!(session.window().range(), Some(LoadedRange::new(0, 2)));
        assert_eq!(session.renderer().active_chapter(), Some(0));
    }

    #[test]
    fn toc_failure_is_fatal() {
        let now = Instant::now();
        let mut session = ReadingSession::new(config(), &engine());
        session.handle(Event::Open, now);

        let error = SourceError::Status {
            status: 500,
            url: "http://x/books/1/toc".to_string(),
        };
        let effects = session.handle(Event::TocLoaded(Err(error)), now);
        assert!(matches!(effects.as_slice(), [Effect::Fatal(_)]));
        assert_eq!(session.phase(), Phase::Failed);
        assert!(session.failure().is_some());
        assert!(session.handle(Event::Scrolled(5), now).is_empty());
    }

    #[test]
    fn saved_position_anchors_after_load() {
        let now = Instant::now();
        let mut source = book(10);
        let saved = ReadingProgress::new(0.55, 5, 3).to_payload();
        let (mut session, fetch) = open(&mut source, Some(saved), now);

        assert_eq!((fetch.index, fetch.kind), (5, LoadKind::Target(5)));
        assert!(session.renderer().has_pending_jump());

        deliver(&mut session, &mut source, fetch, now);
        assert!(!session.renderer().has_pending_jump());
        let position = session.renderer().position().unwrap();
        assert_eq!((position.chapter, position.intra_rows), (5, 3));

        // The fraction is recomputed from the layout; the position is kept.
        let effects = session.handle(Event::Teardown, now);
        let [Effect::Beacon(payload)] = effects.as_slice() else {
            panic!("{effects:?}");
        };
        assert_eq!(payload.position, "5:3");
    }

    #[test]
    fn fraction_only_progress_lands_inside_chapter() {
        let now = Instant::now();
        let mut source = book(10);
        let saved = ProgressPayload {
            progress: 0.55,
            position: String::new(),
            finished: false,
        };
        let (mut session, fetch) = open(&mut source, Some(saved), now);
        assert_eq!(fetch.index, 5);

        deliver(&mut session, &mut source, fetch, now);
        let position = session.renderer().position().unwrap();
        assert_eq!(position.chapter, 5);
        assert!(
            (15..=30).contains(&position.intra_rows),
            "{position:?}"
        );
    }

    #[test]
    fn jump_inside_window_fetches_nothing() {
        let now = Instant::now();
        let mut source = book(30);
        let saved = ReadingProgress::new(0.3, 10, 0).to_payload();
        let (mut session, fetch) = open(&mut source, Some(saved), now);
        deliver(&mut session, &mut source, fetch, now);
        assert_eq!(session.window().range(), Some(LoadedRange::new(8, 12)));

        assert!(session.handle(Event::JumpRequested(9), now).is_empty());
        assert_eq!(session.renderer().active_chapter(), Some(9));
        assert!(!session.is_loading());
    }

    #[test]
    fn latest_jump_supersedes_in_flight_load() {
        let now = Instant::now();
        let mut source = book(30);
        let (mut session, first) = open(&mut source, None, now);
        deliver(&mut session, &mut source, first, now);

        let effects = session.handle(Event::JumpRequested(20), now);
        let [Effect::FetchWindow(to_twenty)] = effects.as_slice() else {
            panic!("{effects:?}");
        };
        assert!(session.handle(Event::JumpRequested(25), now).is_empty());

        // The response for 20 is stale; the queued jump to 25 goes out instead.
        let effects = deliver(&mut session, &mut source, *to_twenty, now);
        let [Effect::FetchWindow(to_twenty_five)] = effects.as_slice() else {
            panic!("{effects:?}");
        };
        assert_eq!(to_twenty_five.index, 25);
        assert_eq!(session.window().range(), Some(LoadedRange::new(0, 2)));

        deliver(&mut session, &mut source, *to_twenty_five, now);
        assert_eq!(session.window().range(), Some(LoadedRange::new(23, 27)));
        assert_eq!(session.renderer().active_chapter(), Some(25));
    }

    #[test]
    fn scrolling_to_the_end_extends_by_one_chapter() {
        let now = Instant::now();
        let mut source = book(10);
        let (mut session, fetch) = open(&mut source, None, now);
        deliver(&mut session, &mut source, fetch, now);

        let bottom = session.renderer().max_scroll_top() as isize;
        let effects = session.handle(Event::Scrolled(bottom), now);
        let [Effect::FetchWindow(extension)] = effects.as_slice() else {
            panic!("{effects:?}");
        };
        assert_eq!(
            (extension.index, extension.buffer, extension.kind),
            (3, 0, LoadKind::Extend(Direction::Next))
        );
        assert_eq!(session.phase(), Phase::WindowLoading(extension.kind));

        // Further scrolling while loading asks for nothing.
        assert!(session.handle(Event::Scrolled(1), now).is_empty());

        deliver(&mut session, &mut source, *extension, now);
        assert_eq!(session.window().range(), Some(LoadedRange::new(0, 3)));
        assert_eq!(session.phase(), Phase::ScrollActive);
    }

    #[test]
    fn load_more_fetches_one_adjacent_chapter() {
        let now = Instant::now();
        let mut source = book(10);
        let (mut session, fetch) = open(&mut source, None, now);
        deliver(&mut session, &mut source, fetch, now);
        assert_eq!(session.window().range(), Some(LoadedRange::new(0, 2)));

        // Nothing before the first chapter.
        assert!(session.load_more(Direction::Prev, now).is_empty());

        let effects = session.load_more(Direction::Next, now);
        let [Effect::FetchWindow(extension)] = effects.as_slice() else {
            panic!("{effects:?}");
        };
        assert_eq!(
            (extension.index, extension.buffer, extension.kind),
            (3, 0, LoadKind::Extend(Direction::Next))
        );

        // Single flight: a second request while loading is dropped.
        assert!(session.load_more(Direction::Next, now).is_empty());
        assert!(session.load_more(Direction::Prev, now).is_empty());

        deliver(&mut session, &mut source, *extension, now);
        assert_eq!(session.window().range(), Some(LoadedRange::new(0, 3)));
        assert!(!session.is_loading());
    }

    #[test]
    fn reading_to_the_last_row_finishes_the_book() {
        let now = Instant::now();
        let mut source = book(5);
        let saved = ReadingProgress::new(0.8, 4, 0).to_payload();
        let (mut session, fetch) = open(&mut source, Some(saved), now);
        deliver(&mut session, &mut source, fetch, now);
        assert_eq!(session.window().range(), Some(LoadedRange::new(2, 4)));
        assert!(!session.progress().unwrap().finished);

        session.handle(Event::Scrolled(1000), now);
        let renderer = session.renderer();
        assert_eq!(renderer.scroll_top(), renderer.max_scroll_top());

        let progress = session.progress().unwrap();
        assert_eq!(progress.chapter_index, 4);
        assert_eq!(progress.fraction, 1.0);
        assert!(progress.finished);
    }

    #[test]
    fn scrolling_up_prepends_without_moving_text() {
        let now = Instant::now();
        let mut source = book(10);
        let saved = ReadingProgress::new(0.5, 5, 0).to_payload();
        let (mut session, fetch) = open(&mut source, Some(saved), now);
        deliver(&mut session, &mut source, fetch, now);
        assert_eq!(session.window().range(), Some(LoadedRange::new(3, 7)));

        let top = session.renderer().scroll_top() as isize;
        let effects = session.handle(Event::Scrolled(-top), now);
        let [Effect::FetchWindow(extension)] = effects.as_slice() else {
            panic!("{effects:?}");
        };
        assert_eq!(extension.index, 2);

        let first_row = session.renderer().visible_rows()[0].1.clone();
        let height_before = session.renderer().scroll_height();
        deliver(&mut session, &mut source, *extension, now);

        let grown = session.renderer().scroll_height() - height_before;
        assert_eq!(session.renderer().scroll_top(), grown);
        assert_eq!(session.renderer().visible_rows()[0].1, &first_row);
    }

    #[test]
    fn failed_window_load_notifies_and_keeps_window() {
        let now = Instant::now();
        let mut source = book(10);
        let (mut session, fetch) = open(&mut source, None, now);
        deliver(&mut session, &mut source, fetch, now);

        let effects = session.handle(Event::JumpRequested(8), now);
        let [Effect::FetchWindow(fetch)] = effects.as_slice() else {
            panic!("{effects:?}");
        };
        let error = SourceError::Status {
            status: 503,
            url: "x".to_string(),
        };
        let effects = session.handle(
            Event::WindowLoaded {
                id: fetch.id,
                result: Err(error),
            },
            now,
        );
        assert!(matches!(effects.as_slice(), [Effect::Notify(_)]));
        assert_eq!(session.window().range(), Some(LoadedRange::new(0, 2)));
        assert!(!session.renderer().has_pending_jump());
        assert_eq!(session.phase(), Phase::WindowReady);
    }

    #[test]
    fn progress_is_saved_after_debounce() {
        let now = Instant::now();
        let mut source = book(10);
        let (mut session, fetch) = open(&mut source, None, now);
        deliver(&mut session, &mut source, fetch, now);

        session.handle(Event::Scrolled(5), now);
        assert!(session.handle(Event::Tick, now + Duration::from_millis(500)).is_empty());

        let effects = session.handle(Event::Tick, now + Duration::from_millis(1000));
        let [Effect::SaveProgress(payload)] = effects.as_slice() else {
            panic!("{effects:?}");
        };
        assert_eq!(payload.position, "0:5");
        assert!(session.handle(Event::Tick, now + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn teardown_sends_one_beacon() {
        let now = Instant::now();
        let mut source = book(10);
        let (mut session, fetch) = open(&mut source, None, now);
        deliver(&mut session, &mut source, fetch, now);
        session.handle(Event::Scrolled(7), now);

        let effects = session.handle(Event::Teardown, now);
        let [Effect::Beacon(payload)] = effects.as_slice() else {
            panic!("{effects:?}");
        };
        assert_eq!(payload.position, "0:7");
        assert_eq!(session.phase(), Phase::Flushing);

        assert!(session.handle(Event::Teardown, now).is_empty());
        session.handle(Event::Flushed, now);
        assert_eq!(session.phase(), Phase::Closed);
    }

    #[test]
    fn seek_loads_chapter_holding_fraction() {
        let now = Instant::now();
        let mut source = book(10);
        let (mut session, fetch) = open(&mut source, None, now);
        deliver(&mut session, &mut source, fetch, now);

        let effects = session.handle(Event::SeekRequested(0.65), now);
        let [Effect::FetchWindow(fetch)] = effects.as_slice() else {
            panic!("{effects:?}");
        };
        assert_eq!(fetch.index, 6);

        deliver(&mut session, &mut source, *fetch, now);
        let position = session.renderer().position().unwrap();
        assert_eq!(position.chapter, 6);
        assert!(position.intra_rows > 0);
    }

    #[test]
    fn retention_discards_far_chapters() {
        let now = Instant::now();
        let mut source = book(30);
        let saved = ReadingProgress::new(0.3, 10, 0).to_payload();
        let (mut session, fetch) = open(&mut source, Some(saved), now);
        deliver(&mut session, &mut source, fetch, now);

        // 12..=16 touches 8..=12, so the window grows instead of being replaced.
        let effects = session.handle(Event::JumpRequested(14), now);
        let [Effect::FetchWindow(fetch)] = effects.as_slice() else {
            panic!("{effects:?}");
        };
        deliver(&mut session, &mut source, *fetch, now);
        assert_eq!(session.window().range(), Some(LoadedRange::new(8, 16)));

        let effects = session.handle(Event::JumpRequested(18), now);
        let [Effect::FetchWindow(fetch)] = effects.as_slice() else {
            panic!("{effects:?}");
        };
        deliver(&mut session, &mut source, *fetch, now);
        assert_eq!(session.window().range(), Some(LoadedRange::new(12, 20)));
        assert!(session.renderer().slot(11).is_none());
    }
}
