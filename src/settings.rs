use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "bookstream";

/// Background/foreground pair the reader paints with. Colors are `#RRGGBB`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemePalette {
    pub name: String,
    pub background: String,
    pub foreground: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accent: Option<String>,
}

impl Default for ThemePalette {
    fn default() -> Self {
        Self {
            name: "Oceanic Next".to_string(),
            background: "#1B2B34".to_string(),
            foreground: "#C0C5CE".to_string(),
            accent: Some("#6699CC".to_string()),
        }
    }
}

/// Typography and theme, consumed read-only by the renderer.
///
/// The terminal layout honours `line_height`, `paragraph_spacing` and
/// `margin`; the remaining fields are forwarded to reflowable renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    #[serde(default = "default_line_height")]
    pub line_height: f32,

    #[serde(default)]
    pub letter_spacing: f32,

    #[serde(default = "default_paragraph_spacing")]
    pub paragraph_spacing: f32,

    #[serde(default = "default_font_family")]
    pub font_family: String,

    #[serde(default)]
    pub margin: u16,

    #[serde(default)]
    pub theme: ThemePalette,
}

fn default_font_size() -> f32 {
    18.0
}

fn default_line_height() -> f32 {
    1.0
}

fn default_paragraph_spacing() -> f32 {
    1.0
}

fn default_font_family() -> String {
    "serif".to_string()
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            line_height: default_line_height(),
            letter_spacing: 0.0,
            paragraph_spacing: default_paragraph_spacing(),
            font_family: default_font_family(),
            margin: 2,
            theme: ThemePalette::default(),
        }
    }
}

/// Upper bound for `line_height` and `paragraph_spacing`, in rows.
pub const MAX_ROW_SPACING: usize = 8;

impl ReaderConfig {
    /// Rows each wrapped text line occupies.
    pub fn line_stride(&self) -> usize {
        (self.line_height.round() as usize).clamp(1, MAX_ROW_SPACING)
    }

    /// Blank rows between paragraphs.
    pub fn paragraph_gap(&self) -> usize {
        (self.paragraph_spacing.max(0.0).round() as usize).min(MAX_ROW_SPACING)
    }
}

/// Tunables for the window loader and progress tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Chapters preloaded on each side of a jump target.
    #[serde(default = "default_buffer")]
    pub buffer: usize,

    /// Chapters kept on each side of the active chapter before discarding.
    #[serde(default = "default_retain")]
    pub retain: usize,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_buffer() -> usize {
    2
}

fn default_retain() -> usize {
    6
}

fn default_debounce_ms() -> u64 {
    1000
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            buffer: default_buffer(),
            retain: default_retain(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub reader: ReaderConfig,

    #[serde(default)]
    pub engine: EngineSettings,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            reader: ReaderConfig::default(),
            engine: EngineSettings::default(),
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Loads settings from the default location, writing defaults there when the
/// file does not exist yet.
pub fn load_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };
    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

pub fn load_settings_from_path(path: &Path) {
    match read_settings(path) {
        Ok(mut settings) => {
            debug!("Loaded settings from {path:?}");

            if settings.version < CURRENT_VERSION {
                migrate_settings(&mut settings);
                save_settings_to_file(&settings, path);
            }

            if let Ok(mut global) = SETTINGS.write() {
                *global = settings;
            }
        }
        Err(e) => {
            error!("Failed to load settings file {path:?}: {e}");
        }
    }
}

pub fn read_settings(path: &Path) -> anyhow::Result<Settings> {
    let content = fs::read_to_string(path)?;
    let settings: Settings = serde_yaml::from_str(&content)?;
    if settings.reader.theme.background.is_empty() || settings.reader.theme.foreground.is_empty() {
        anyhow::bail!("theme palette needs both a background and a foreground color");
    }
    Ok(settings)
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    settings.version = CURRENT_VERSION;
}

fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let body = match serde_yaml::to_string(settings) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize settings: {e}");
            return;
        }
    };

    let mut content = String::from(SETTINGS_HEADER);
    content.push_str(&body);

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

const SETTINGS_HEADER: &str = r##"# ============================================================================
# bookstream settings
# ============================================================================
# reader.line_height and reader.paragraph_spacing are measured in rows.
# reader.theme colors are "#RRGGBB".
# engine.buffer chapters are preloaded around every jump target.

"##;

// Public API for accessing settings

pub fn get_reader_config() -> ReaderConfig {
    SETTINGS
        .read()
        .map(|s| s.reader.clone())
        .unwrap_or_default()
}

pub fn get_engine_settings() -> EngineSettings {
    SETTINGS
        .read()
        .map(|s| s.engine.clone())
        .unwrap_or_default()
}
