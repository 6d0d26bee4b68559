use ratatui::style::Color;

use crate::settings::ThemePalette;

/// Colors the terminal reader paints with, derived from the configured
/// background/foreground pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    pub background: Color,
    pub foreground: Color,
    pub accent: Color, // Titles, selection
    pub muted: Color,  // Status bar, borders
    pub error: Color,
}

impl Palette {
    pub fn from_theme(theme: &ThemePalette) -> Self {
        let defaults = ThemePalette::default();
        let background = parse_hex(&theme.background)
            .or_else(|| parse_hex(&defaults.background))
            .unwrap_or(Color::Black);
        let foreground = parse_hex(&theme.foreground)
            .or_else(|| parse_hex(&defaults.foreground))
            .unwrap_or(Color::White);
        let accent = theme
            .accent
            .as_deref()
            .and_then(parse_hex)
            .unwrap_or(foreground);

        Self {
            background,
            foreground,
            accent,
            muted: blend(background, foreground, 0.45),
            error: Color::Rgb(0xEC, 0x5F, 0x67),
        }
    }

    // Get colors for the selected row of a list
    pub fn selection_colors(&self) -> (Color, Color) {
        (self.accent, self.background)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::from_theme(&ThemePalette::default())
    }
}

/// Parses `#RRGGBB` (the leading `#` is optional).
pub fn parse_hex(value: &str) -> Option<Color> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

fn blend(from: Color, to: Color, amount: f32) -> Color {
    match (from, to) {
        (Color::Rgb(r1, g1, b1), Color::Rgb(r2, g2, b2)) => {
            let mix = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * amount).round() as u8;
            Color::Rgb(mix(r1, r2), mix(g1, g2), mix(b1, b2))
        }
        _ => to,
    }
}
