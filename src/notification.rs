use std::time::{Duration, Instant};

use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};

use crate::theme::Palette;

pub const DEFAULT_NOTICE_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    pub expires_at: Instant,
}

impl Notification {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Short-lived messages shown in the status bar, newest first.
#[derive(Debug)]
pub struct NotificationManager {
    notifications: Vec<Notification>,
    duration: Duration,
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::with_duration(DEFAULT_NOTICE_DURATION)
    }
}

impl NotificationManager {
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            notifications: Vec::new(),
            duration,
        }
    }

    pub fn notify(&mut self, message: impl Into<String>, level: NotificationLevel, now: Instant) {
        self.notifications.insert(
            0,
            Notification {
                message: message.into(),
                level,
                expires_at: now + self.duration,
            },
        );
    }

    pub fn info(&mut self, message: impl Into<String>, now: Instant) {
        self.notify(message, NotificationLevel::Info, now);
    }

    pub fn error(&mut self, message: impl Into<String>, now: Instant) {
        self.notify(message, NotificationLevel::Error, now);
    }

    /// Remove expired notifications, returns true if any were removed
    pub fn update(&mut self, now: Instant) -> bool {
        let initial_len = self.notifications.len();
        self.notifications.retain(|n| !n.is_expired(now));
        self.notifications.len() != initial_len
    }

    pub fn current(&self) -> Option<&Notification> {
        self.notifications.first()
    }

    pub fn dismiss(&mut self) -> bool {
        if self.notifications.is_empty() {
            false
        } else {
            self.notifications.remove(0);
            true
        }
    }

    pub fn count(&self) -> usize {
        self.notifications.len()
    }

    /// Status-bar line for the newest notification.
    pub fn status_line(&self, palette: &Palette) -> Option<Line<'static>> {
        let current = self.current()?;
        let style = match current.level {
            NotificationLevel::Info => Style::default().fg(palette.accent),
            NotificationLevel::Error => Style::default()
                .fg(palette.error)
                .add_modifier(Modifier::BOLD),
        };
        Some(Line::from(Span::styled(current.message.clone(), style)))
    }
}
