//! Plans window fetches.
//!
//! At most one window fetch is in flight. Extension requests that arrive
//! while loading are dropped, since the next scroll asks again. An explicit
//! jump that arrives while loading becomes the queued target; only the most
//! recent one is kept, and a target fetch already in flight is marked stale
//! so its response is discarded when it lands.

use std::time::{Duration, Instant};

use log::debug;

use crate::request::RequestId;
use crate::source::SourceError;
use crate::toc::TocIndex;
use crate::window::{Direction, LoadedRange, WindowError};

/// Extensions are not retried for this long after one fails.
pub const EXTENSION_COOLDOWN: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("server returned an unusable window: {0}")]
    Window(#[from] WindowError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Target(usize),
    Extend(Direction),
}

/// One fetch the caller should send to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFetch {
    pub id: RequestId,
    pub index: usize,
    pub buffer: usize,
    pub kind: LoadKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetDecision {
    /// The target is already materialized; no fetch is needed.
    AlreadyLoaded,
    /// A fetch is in flight; the target will be requested after it.
    Queued,
    Fetch(WindowFetch),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The response belongs to the current fetch and should be applied.
    Accepted(LoadKind),
    /// A newer jump replaced this fetch; drop the response.
    Superseded,
    /// Not a fetch this loader issued (or one already completed).
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    id: RequestId,
    kind: LoadKind,
    stale: bool,
}

#[derive(Debug)]
pub struct WindowLoader {
    buffer: usize,
    next_request_id: u64,
    in_flight: Option<InFlight>,
    queued_target: Option<usize>,
    extension_blocked_until: Option<Instant>,
}

impl WindowLoader {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer,
            next_request_id: 1,
            in_flight: None,
            queued_target: None,
            extension_blocked_until: None,
        }
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<(RequestId, LoadKind)> {
        self.in_flight.map(|f| (f.id, f.kind))
    }

    pub fn queued_target(&self) -> Option<usize> {
        self.queued_target
    }

    /// Makes sure `target` and `buffer` chapters around it get loaded.
    pub fn request_target(
        &mut self,
        target: usize,
        loaded: Option<LoadedRange>,
        toc: &TocIndex,
    ) -> TargetDecision {
        let target = toc.clamp_index(target);

        if let Some(in_flight) = &mut self.in_flight {
            if in_flight.kind == LoadKind::Target(target) {
                in_flight.stale = false;
                self.queued_target = None;
            } else {
                if let LoadKind::Target(_) = in_flight.kind {
                    in_flight.stale = true;
                }
                debug!("Queueing jump to chapter {target} behind request {:?}", in_flight.id);
                self.queued_target = Some(target);
            }
            return TargetDecision::Queued;
        }

        self.queued_target = None;
        if loaded.is_some_and(|range| range.contains(target)) {
            return TargetDecision::AlreadyLoaded;
        }

        TargetDecision::Fetch(self.issue(target, self.buffer, LoadKind::Target(target)))
    }

    /// Plans a one-chapter extension past the given edge of the window.
    pub fn request_extension(
        &mut self,
        direction: Direction,
        loaded: Option<LoadedRange>,
        toc: &TocIndex,
        now: Instant,
    ) -> Option<WindowFetch> {
        if self.in_flight.is_some() {
            return None;
        }
        if self.extension_blocked_until.is_some_and(|until| now < until) {
            return None;
        }

        let range = loaded?;
        let index = match direction {
            Direction::Prev => range.start.checked_sub(1)?,
            Direction::Next if range.end < toc.last_index() => range.end + 1,
            Direction::Next => return None,
        };
        Some(self.issue(index, 0, LoadKind::Extend(direction)))
    }

    fn issue(&mut self, index: usize, buffer: usize, kind: LoadKind) -> WindowFetch {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        self.in_flight = Some(InFlight {
            id,
            kind,
            stale: false,
        });
        WindowFetch {
            id,
            index,
            buffer,
            kind,
        }
    }

    /// Matches a successful response against the fetch in flight.
    pub fn complete(&mut self, id: RequestId) -> Completion {
        match self.in_flight {
            Some(in_flight) if in_flight.id == id => {
                self.in_flight = None;
                self.extension_blocked_until = None;
                if in_flight.stale {
                    debug!("Discarding superseded window response {id:?}");
                    Completion::Superseded
                } else {
                    Completion::Accepted(in_flight.kind)
                }
            }
            _ => Completion::Unknown,
        }
    }

    /// Matches a failed response. Failed extensions start the cooldown.
    pub fn fail(&mut self, id: RequestId, now: Instant) -> Completion {
        match self.in_flight {
            Some(in_flight) if in_flight.id == id => {
                self.in_flight = None;
                if let LoadKind::Extend(_) = in_flight.kind {
                    self.extension_blocked_until = Some(now + EXTENSION_COOLDOWN);
                }
                if in_flight.stale {
                    Completion::Superseded
                } else {
                    Completion::Accepted(in_flight.kind)
                }
            }
            _ => Completion::Unknown,
        }
    }

    /// The jump recorded while the last fetch was in flight.
    pub fn take_queued(&mut self) -> Option<usize> {
        self.queued_target.take()
    }

    /// Forgets everything in flight; later responses become `Unknown`.
    pub fn reset(&mut self) {
        self.in_flight = None;
        self.queued_target = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toc::TocChapter;

    fn toc(count: usize) -> TocIndex {
        let chapters = (0..count)
            .map(|i| TocChapter::new(i, format!("{i}"), i * 10, i * 10 + 10))
            .collect();
        TocIndex::new(chapters, count * 10).unwrap()
    }

    fn fetch(decision: TargetDecision) -> WindowFetch {
        match decision {
            TargetDecision::Fetch(fetch) => fetch,
            other => panic!("expected a fetch, got {other:?}"),
        }
    }

    #[test]
    fn target_outside_window_fetches_with_buffer() {
        let toc = toc(30);
        let mut loader = WindowLoader::new(2);

        let first = fetch(loader.request_target(10, None, &toc));
        assert_eq!((first.index, first.buffer), (10, 2));
        assert_eq!(
            LoadedRange::around(first.index, first.buffer, toc.last_index()),
            LoadedRange::new(8, 12)
        );
        assert_eq!(loader.complete(first.id), Completion::Accepted(LoadKind::Target(10)));

        let loaded = Some(LoadedRange::new(8, 12));
        assert_eq!(
            loader.request_target(9, loaded, &toc),
            TargetDecision::AlreadyLoaded
        );
        assert!(!loader.is_loading());
    }

    #[test]
    fn latest_jump_wins_while_loading() {
        let toc = toc(30);
        let mut loader = WindowLoader::new(2);
        let first = fetch(loader.request_target(10, None, &toc));

        assert_eq!(loader.request_target(20, None, &toc), TargetDecision::Queued);
        assert_eq!(loader.request_target(25, None, &toc), TargetDecision::Queued);
        assert_eq!(loader.complete(first.id), Completion::Superseded);
        assert_eq!(loader.take_queued(), Some(25));

        let second = fetch(loader.request_target(25, None, &toc));
        assert_eq!(loader.complete(second.id), Completion::Accepted(LoadKind::Target(25)));
        assert_eq!(loader.complete(second.id), Completion::Unknown);
    }

    #[test]
    fn jumping_back_to_in_flight_target_keeps_it() {
        let toc = toc(30);
        let mut loader = WindowLoader::new(2);
        let first = fetch(loader.request_target(10, None, &toc));

        loader.request_target(20, None, &toc);
        loader.request_target(10, None, &toc);
        assert_eq!(loader.complete(first.id), Completion::Accepted(LoadKind::Target(10)));
        assert_eq!(loader.take_queued(), None);
    }

    #[test]
    fn extensions_stop_at_document_edges() {
        let toc = toc(5);
        let mut loader = WindowLoader::new(2);
        let now = Instant::now();

        let at_start = Some(LoadedRange::new(0, 2));
        assert_eq!(loader.request_extension(Direction::Prev, at_start, &toc, now), None);

        let next = loader
            .request_extension(Direction::Next, at_start, &toc, now)
            .unwrap();
        assert_eq!((next.index, next.buffer), (3, 0));
        loader.complete(next.id);

        let at_end = Some(LoadedRange::new(2, 4));
        assert_eq!(loader.request_extension(Direction::Next, at_end, &toc, now), None);
        assert_eq!(
            loader
                .request_extension(Direction::Prev, at_end, &toc, now)
                .map(|f| f.index),
            Some(1)
        );
    }

    #[test]
    fn extensions_are_dropped_while_loading() {
        let toc = toc(30);
        let mut loader = WindowLoader::new(2);
        let now = Instant::now();
        let loaded = Some(LoadedRange::new(8, 12));

        let first = loader
            .request_extension(Direction::Next, loaded, &toc, now)
            .unwrap();
        assert_eq!(loader.request_extension(Direction::Prev, loaded, &toc, now), None);
        assert_eq!(loader.complete(first.id), Completion::Accepted(LoadKind::Extend(Direction::Next)));
    }

    #[test]
    fn failed_extension_cools_down() {
        let toc = toc(30);
        let mut loader = WindowLoader::new(2);
        let now = Instant::now();
        let loaded = Some(LoadedRange::new(8, 12));

        let attempt = loader
            .request_extension(Direction::Next, loaded, &toc, now)
            .unwrap();
        assert_eq!(
            loader.fail(attempt.id, now),
            Completion::Accepted(LoadKind::Extend(Direction::Next))
        );
        assert_eq!(loader.request_extension(Direction::Next, loaded, &toc, now), None);
        assert!(
            loader
                .request_extension(Direction::Next, loaded, &toc, now + EXTENSION_COOLDOWN)
                .is_some()
        );
    }

    #[test]
    fn jumps_ignore_extension_cooldown() {
        let toc = toc(30);
        let mut loader = WindowLoader::new(2);
        let now = Instant::now();
        let loaded = Some(LoadedRange::new(8, 12));

        let attempt = loader
            .request_extension(Direction::Next, loaded, &toc, now)
            .unwrap();
        loader.fail(attempt.id, now);
        assert!(matches!(
            loader.request_target(20, loaded, &toc),
            TargetDecision::Fetch(_)
        ));
    }
}
