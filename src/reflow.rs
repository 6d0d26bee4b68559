//! Bridge to reflowable (structured-markup) renderers.
//!
//! Those books are laid out by an external engine with its own navigation
//! and percentage API. All this side does is hand it a [`StyleSheet`], ask it
//! to display a location, and turn its `relocated` reports into debounced
//! progress writes.

use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, warn};

use crate::progress::{FINISHED_THRESHOLD, ProgressPayload};
use crate::settings::ReaderConfig;
use crate::tracker::ProgressTracker;

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayTarget {
    Start,
    /// Renderer-specific location string, as reported by `relocated`.
    Location(String),
    Percentage(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReflowTocEntry {
    pub title: String,
    pub location: String,
}

/// Style forwarded to the renderer, derived from [`ReaderConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct StyleSheet {
    pub font_size_px: f32,
    pub line_height: f32,
    pub letter_spacing_px: f32,
    pub paragraph_spacing_em: f32,
    pub font_family: String,
    pub background: String,
    pub foreground: String,
}

impl From<&ReaderConfig> for StyleSheet {
    fn from(config: &ReaderConfig) -> Self {
        Self {
            font_size_px: config.font_size,
            line_height: config.line_height,
            letter_spacing_px: config.letter_spacing,
            paragraph_spacing_em: config.paragraph_spacing,
            font_family: config.font_family.clone(),
            background: config.theme.background.clone(),
            foreground: config.theme.foreground.clone(),
        }
    }
}

impl StyleSheet {
    /// CSS body rule for renderers that take raw stylesheets.
    pub fn to_css(&self) -> String {
        format!(
            "body {{ font-family: {}; font-size: {}px; line-height: {}; letter-spacing: {}px; \
             background: {}; color: {}; }} p {{ margin-bottom: {}em; }}",
            self.font_family,
            self.font_size_px,
            self.line_height,
            self.letter_spacing_px,
            self.background,
            self.foreground,
            self.paragraph_spacing_em,
        )
    }
}

pub trait ReflowableRenderer {
    fn display(&mut self, target: &DisplayTarget) -> Result<()>;

    fn apply_style(&mut self, style: &StyleSheet) -> Result<()>;

    /// Converts a location to a fraction in `[0, 1]`, if the renderer knows it.
    fn location_to_percentage(&self, location: &str) -> Option<f64>;

    fn table_of_contents(&self) -> Vec<ReflowTocEntry>;
}

/// Drives one reflowable book: style in, progress out.
pub struct ReflowSession<R: ReflowableRenderer> {
    renderer: R,
    tracker: ProgressTracker,
    style: StyleSheet,
}

impl<R: ReflowableRenderer> ReflowSession<R> {
    pub fn new(renderer: R, config: &ReaderConfig, debounce: Duration) -> Self {
        Self {
            renderer,
            tracker: ProgressTracker::new(debounce),
            style: StyleSheet::from(config),
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn style(&self) -> &StyleSheet {
        &self.style
    }

    pub fn current(&self) -> Option<&ProgressPayload> {
        self.tracker.current()
    }

    /// Applies the style and shows the saved location, or the start.
    pub fn open(&mut self, saved: Option<ProgressPayload>) -> Result<()> {
        self.renderer.apply_style(&self.style)?;
        let target = match saved {
            Some(payload) => {
                let target = if payload.position.is_empty() {
                    DisplayTarget::Percentage(payload.progress)
                } else {
                    DisplayTarget::Location(payload.position.clone())
                };
                self.tracker.seed(payload);
                target
            }
            None => DisplayTarget::Start,
        };
        debug!("Opening reflowable book at {target:?}");
        self.renderer.display(&target)
    }

    pub fn apply_config(&mut self, config: &ReaderConfig) -> Result<()> {
        let style = StyleSheet::from(config);
        if style == self.style {
            return Ok(());
        }
        self.renderer.apply_style(&style)?;
        self.style = style;
        Ok(())
    }

    pub fn seek(&mut self, fraction: f64) -> Result<()> {
        self.renderer
            .display(&DisplayTarget::Percentage(fraction.clamp(0.0, 1.0)))
    }

    pub fn jump_to(&mut self, entry: &ReflowTocEntry) -> Result<()> {
        self.renderer
            .display(&DisplayTarget::Location(entry.location.clone()))
    }

    /// Handles the renderer's `relocated` report. Returns true when the
    /// recorded progress changed.
    pub fn relocated(&mut self, location: &str, now: Instant) -> bool {
        let Some(fraction) = self.renderer.location_to_percentage(location) else {
            warn!("Renderer could not place location {location}");
            return false;
        };
        if !fraction.is_finite() {
            return false;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        self.tracker.update_payload(
            ProgressPayload {
                progress: fraction,
                position: location.to_string(),
                finished: fraction >= FINISHED_THRESHOLD,
            },
            now,
        )
    }

    /// Payload due for writing, once the debounce has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<ProgressPayload> {
        self.tracker.poll(now)
    }

    pub fn flush(&mut self) -> Option<ProgressPayload> {
        self.tracker.flush()
    }
}
