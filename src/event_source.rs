use anyhow::Result;
pub use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers, MouseEvent,
    MouseEventKind,
};
use std::collections::VecDeque;
use std::time::Duration;

/// Where the reader gets terminal input from
pub trait EventSource {
    /// Wait up to `timeout` for an event to become available
    fn poll(&mut self, timeout: Duration) -> Result<bool>;

    fn read(&mut self) -> Result<Event>;
}

/// Terminal input through crossterm
pub struct KeyboardEventSource;

impl EventSource for KeyboardEventSource {
    fn poll(&mut self, timeout: Duration) -> Result<bool> {
        Ok(crossterm::event::poll(timeout)?)
    }

    fn read(&mut self) -> Result<Event> {
        Ok(crossterm::event::read()?)
    }
}

/// Scripted input for tests. Once the script runs out it keeps answering
/// with `q` so the reader loop ends.
pub struct SimulatedEventSource {
    events: VecDeque<Event>,
    idle_polls: usize,
}

impl SimulatedEventSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: events.into(),
            idle_polls: 0,
        }
    }

    /// Number of polls that found no scripted event waiting.
    pub fn idle_polls(&self) -> usize {
        self.idle_polls
    }

    pub fn key_event(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::empty(),
        })
    }

    pub fn key(code: KeyCode) -> Event {
        Self::key_event(code, KeyModifiers::empty())
    }

    pub fn char_key(c: char) -> Event {
        Self::key(KeyCode::Char(c))
    }

    pub fn ctrl_char_key(c: char) -> Event {
        Self::key_event(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    pub fn mouse_scroll(down: bool) -> Event {
        Event::Mouse(MouseEvent {
            kind: if down {
                MouseEventKind::ScrollDown
            } else {
                MouseEventKind::ScrollUp
            },
            column: 0,
            row: 0,
            modifiers: KeyModifiers::empty(),
        })
    }

    pub fn resize(width: u16, height: u16) -> Event {
        Event::Resize(width, height)
    }
}

impl EventSource for SimulatedEventSource {
    fn poll(&mut self, _timeout: Duration) -> Result<bool> {
        if self.events.is_empty() {
            self.idle_polls += 1;
        }
        Ok(true)
    }

    fn read(&mut self) -> Result<Event> {
        Ok(self
            .events
            .pop_front()
            .unwrap_or_else(|| Self::char_key('q')))
    }
}
