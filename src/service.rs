//! Reader service - runs a session against a loader worker

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};

use crate::request::{LoadRequest, LoadResponse};
use crate::session::{Effect, Event, Phase, ReadingSession};
use crate::settings::{EngineSettings, ReaderConfig};
use crate::source::BookSource;
use crate::worker::load_worker;

/// How long closing waits for the progress beacon to go out.
pub const BEACON_WAIT: Duration = Duration::from_millis(1500);

/// Owns a [`ReadingSession`] and the worker thread that performs its I/O.
///
/// Events go in through [`dispatch`](Self::dispatch); the effects they
/// produce are turned into worker requests, and worker responses are fed back
/// as events by [`poll`](Self::poll).
pub struct ReaderService {
    session: ReadingSession,
    request_tx: Sender<LoadRequest>,
    response_rx: Receiver<LoadResponse>,
    worker: Option<JoinHandle<()>>,
    notices: Vec<String>,
    beacon_pending: bool,
}

impl ReaderService {
    /// Starts the worker and opens the book.
    pub fn spawn<S: BookSource + 'static>(
        source: S,
        config: ReaderConfig,
        engine: &EngineSettings,
    ) -> Self {
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let worker = std::thread::Builder::new()
            .name("bookstream-loader".to_string())
            .spawn(move || load_worker(source, request_rx, response_tx))
            .map_err(|e| warn!("Failed to spawn loader thread: {e}"))
            .ok();

        let mut service = Self {
            session: ReadingSession::new(config, engine),
            request_tx,
            response_rx,
            worker,
            notices: Vec::new(),
            beacon_pending: false,
        };
        service.dispatch(Event::Open);
        service
    }

    pub fn session(&self) -> &ReadingSession {
        &self.session
    }

    pub fn dispatch(&mut self, event: Event) {
        self.dispatch_at(event, Instant::now());
    }

    pub fn dispatch_at(&mut self, event: Event, now: Instant) {
        let effects = self.session.handle(event, now);
        self.execute_effects(effects);
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            let request = match effect {
                Effect::FetchToc => LoadRequest::Toc,
                Effect::FetchProgress => LoadRequest::Progress,
                Effect::FetchWindow(fetch) => LoadRequest::Window {
                    id: fetch.id,
                    index: fetch.index,
                    buffer: fetch.buffer,
                },
                Effect::SaveProgress(payload) => LoadRequest::SaveProgress(payload),
                Effect::Beacon(payload) => {
                    self.beacon_pending = true;
                    LoadRequest::Beacon(payload)
                }
                Effect::Notify(message) | Effect::Fatal(message) => {
                    self.notices.push(message);
                    continue;
                }
            };
            if self.request_tx.send(request).is_err() {
                warn!("Loader worker is gone, dropping request");
            }
        }
    }

    fn handle_response(&mut self, response: LoadResponse, now: Instant) {
        let event = match response {
            LoadResponse::Toc(result) => Event::TocLoaded(result),
            LoadResponse::Progress(result) => Event::ProgressLoaded(result),
            LoadResponse::Window { id, result } => Event::WindowLoaded { id, result },
            LoadResponse::Saved(Ok(())) => {
                debug!("Progress saved");
                return;
            }
            LoadResponse::Saved(Err(e)) => {
                warn!("Failed to save progress: {e}");
                return;
            }
            LoadResponse::BeaconSent => {
                self.beacon_pending = false;
                Event::Flushed
            }
        };
        self.dispatch_at(event, now);
    }

    /// Applies every response the worker has produced so far. Returns how
    /// many were handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response, Instant::now());
            handled += 1;
        }
        handled
    }

    pub fn tick(&mut self) {
        self.dispatch(Event::Tick);
    }

    /// True while the session waits on the worker.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.session.phase(),
            Phase::TocLoading | Phase::ProgressLoading
        ) || self.session.is_loading()
    }

    /// Blocks until the session stops waiting on the worker, or `timeout`
    /// elapses. Returns false on timeout.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_busy() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.response_rx.recv_timeout(remaining) {
                Ok(response) => self.handle_response(response, Instant::now()),
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => return !self.is_busy(),
            }
        }
        true
    }

    pub fn drain_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    /// Flushes progress and stops the worker. The beacon is waited for at
    /// most `beacon_wait`.
    pub fn shutdown(&mut self, beacon_wait: Duration) {
        if self.worker.is_none() {
            return;
        }

        self.dispatch(Event::Teardown);
        let deadline = Instant::now() + beacon_wait;
        while self.beacon_pending {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.response_rx.recv_timeout(remaining) {
                Ok(response) => self.handle_response(response, Instant::now()),
                Err(_) => {
                    warn!("Progress beacon not confirmed within {beacon_wait:?}");
                    break;
                }
            }
        }

        let _ = self.request_tx.send(LoadRequest::Shutdown);
        if let Some(worker) = self.worker.take() {
            if self.beacon_pending {
                // The worker may still be blocked on the network; let it finish
                // on its own.
                return;
            }
            if worker.join().is_err() {
                warn!("Loader worker panicked");
            }
        }
    }
}

impl Drop for ReaderService {
    fn drop(&mut self) {
        self.shutdown(BEACON_WAIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress_store::ProgressStore;
    use crate::renderer::Viewport;
    use crate::source::LocalBookSource;
    use crate::window::LoadedRange;

    fn source() -> LocalBookSource {
        let mut text = String::new();
        for i in 0..12 {
            text.push_str(&format!("Chapter {}\n", i + 1));
            for p in 0..30 {
                text.push_str(&format!("paragraph {p} of chapter {i}\n"));
            }
        }
        LocalBookSource::from_text("svc", text, ProgressStore::ephemeral())
    }

    #[test]
    fn opens_and_loads_first_window() {
        let mut service = ReaderService::spawn(source(), ReaderConfig::default(), &EngineSettings::default());
        service.dispatch(Event::Resized(Viewport::new(60, 20)));

        assert!(service.wait_idle(Duration::from_secs(5)));
        assert_eq!(service.session().phase(), Phase::WindowReady);
        assert_eq!(service.session().window().range(), Some(LoadedRange::new(0, 2)));
        assert!(service.drain_notices().is_empty());
    }

    #[test]
    fn jump_round_trips_through_worker() {
        let mut service = ReaderService::spawn(source(), ReaderConfig::default(), &EngineSettings::default());
        service.dispatch(Event::Resized(Viewport::new(60, 20)));
        service.wait_idle(Duration::from_secs(5));

        service.dispatch(Event::JumpRequested(9));
        assert!(service.wait_idle(Duration::from_secs(5)));
        assert_eq!(service.session().renderer().active_chapter(), Some(9));

        service.shutdown(BEACON_WAIT);
        assert_eq!(service.session().phase(), Phase::Closed);
    }
}
