//! Core domain types for Page Turner.

mod annotation;
mod bookmark;
mod error;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use annotation::{Annotation, FontSpec, REMOVE_RADIUS_SQ, single_line};
pub use bookmark::{Bookmark, BookmarkEntry, BookmarkSlot, BookmarkTable};
pub use error::{Error, Result};

pub const DEFAULT_SCROLL_AMOUNT: f64 = 300.0;
pub const DEFAULT_TIMER_VALUE: f64 = 5.0;

const MIN_SCROLL_AMOUNT: f64 = 1.0;
const MAX_SCROLL_AMOUNT: f64 = 10_000.0;
const MIN_TIMER_VALUE: f64 = 0.25;
const MAX_TIMER_VALUE: f64 = 3_600.0;

/// Layout strategy for the pages of a piece.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewMode {
    #[default]
    #[serde(rename = "Two Page")]
    TwoPage,
    #[serde(rename = "Fit Width")]
    FitWidth,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::TwoPage => "Two Page",
            ViewMode::FitWidth => "Fit Width",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            ViewMode::TwoPage => ViewMode::FitWidth,
            ViewMode::FitWidth => ViewMode::TwoPage,
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ViewMode {
    type Err = &'static str;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let compact: String = value
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.as_str() {
            "twopage" => Ok(ViewMode::TwoPage),
            "fitwidth" => Ok(ViewMode::FitWidth),
            _ => Err("unknown view mode"),
        }
    }
}

/// An options line kept verbatim because it is not one of the typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOption {
    pub name: Option<String>,
    pub line: String,
}

/// Typed options record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub music_dir: Option<String>,
    pub scroll_amount: f64,
    pub timer_value: f64,
    pub view_mode: ViewMode,
    pub magick_home: Option<String>,
    #[serde(skip)]
    pub extra: Vec<RawOption>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            music_dir: None,
            scroll_amount: DEFAULT_SCROLL_AMOUNT,
            timer_value: DEFAULT_TIMER_VALUE,
            view_mode: ViewMode::TwoPage,
            magick_home: None,
            extra: Vec::new(),
        }
    }
}

impl Settings {
    pub fn normalize(&mut self) {
        self.scroll_amount = clamp_or(
            self.scroll_amount,
            MIN_SCROLL_AMOUNT,
            MAX_SCROLL_AMOUNT,
            DEFAULT_SCROLL_AMOUNT,
        );
        self.timer_value = clamp_or(
            self.timer_value,
            MIN_TIMER_VALUE,
            MAX_TIMER_VALUE,
            DEFAULT_TIMER_VALUE,
        );
        self.music_dir = normalize_opt(self.music_dir.take());
        self.magick_home = normalize_opt(self.magick_home.take());
    }

    pub fn toggle_view_mode(&mut self) {
        self.view_mode = self.view_mode.toggled();
    }

    pub fn piece_params(&self) -> PieceParams {
        PieceParams {
            scroll_amount: self.scroll_amount,
            timer_value: self.timer_value,
        }
    }
}

/// Per-piece view parameters, saved alongside the piece.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PieceParams {
    pub scroll_amount: f64,
    /// Auto-advance interval in seconds.
    pub timer_value: f64,
}

impl Default for PieceParams {
    fn default() -> Self {
        Self {
            scroll_amount: DEFAULT_SCROLL_AMOUNT,
            timer_value: DEFAULT_TIMER_VALUE,
        }
    }
}

impl PieceParams {
    pub fn normalize(&mut self) {
        self.scroll_amount = clamp_or(
            self.scroll_amount,
            MIN_SCROLL_AMOUNT,
            MAX_SCROLL_AMOUNT,
            DEFAULT_SCROLL_AMOUNT,
        );
        self.timer_value = clamp_or(
            self.timer_value,
            MIN_TIMER_VALUE,
            MAX_TIMER_VALUE,
            DEFAULT_TIMER_VALUE,
        );
    }

    /// Shortens the auto-advance interval by a tenth.
    pub fn speed_up(&mut self) {
        self.timer_value -= 0.1 * self.timer_value;
        self.normalize();
    }

    /// Lengthens the auto-advance interval by a tenth.
    pub fn slow_down(&mut self) {
        self.timer_value += 0.1 * self.timer_value;
        self.normalize();
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.timer_value)
    }
}

/// Position within a piece; `current_page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current_page: u32,
    pub total_pages: u32,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.current_page, self.total_pages)
    }
}

/// Source of page image dimensions, in pixels.
pub trait PageGeometry {
    fn page_size(&self, path: &Path) -> Result<(u32, u32)>;

    /// Drops anything remembered about `path`, e.g. after the file was rewritten.
    fn forget(&self, _path: &Path) {}
}

fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

fn normalize_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_use_two_page() {
        let settings = Settings::default();
        assert_eq!(settings.view_mode, ViewMode::TwoPage);
        assert_eq!(settings.scroll_amount, DEFAULT_SCROLL_AMOUNT);
    }

    #[test]
    fn view_mode_toggles() {
        let mut settings = Settings::default();
        settings.toggle_view_mode();
        assert_eq!(settings.view_mode, ViewMode::FitWidth);
        settings.toggle_view_mode();
        assert_eq!(settings.view_mode, ViewMode::TwoPage);
    }

    #[test]
    fn view_mode_parses_strings() {
        assert_eq!("Two Page".parse::<ViewMode>().unwrap(), ViewMode::TwoPage);
        assert_eq!("fit-width".parse::<ViewMode>().unwrap(), ViewMode::FitWidth);
        assert_eq!(" FIT WIDTH ".parse::<ViewMode>().unwrap(), ViewMode::FitWidth);
        assert_eq!("two_page".parse::<ViewMode>().unwrap(), ViewMode::TwoPage);
        assert!("single".parse::<ViewMode>().is_err());
    }

    #[test]
    fn view_mode_display_matches_record_tag() {
        assert_eq!(ViewMode::TwoPage.to_string(), "Two Page");
        assert_eq!(ViewMode::FitWidth.to_string(), "Fit Width");
    }

    #[test]
    fn settings_normalizes_ranges() {
        let mut settings = Settings {
            music_dir: Some("  ".to_string()),
            scroll_amount: 0.0,
            timer_value: f64::NAN,
            view_mode: ViewMode::FitWidth,
            magick_home: Some(" /opt/magick ".to_string()),
            extra: Vec::new(),
        };
        settings.normalize();
        assert_eq!(settings.music_dir, None);
        assert_eq!(settings.scroll_amount, MIN_SCROLL_AMOUNT);
        assert_eq!(settings.timer_value, DEFAULT_TIMER_VALUE);
        assert_eq!(settings.magick_home.as_deref(), Some("/opt/magick"));
    }

    #[test]
    fn timer_speed_changes_by_a_tenth() {
        let mut params = PieceParams {
            scroll_amount: 100.0,
            timer_value: 10.0,
        };
        params.speed_up();
        assert!((params.timer_value - 9.0).abs() < 1e-9);
        params.slow_down();
        assert!((params.timer_value - 9.9).abs() < 1e-9);
    }

    #[test]
    fn progress_displays_page_of_total() {
        let progress = Progress {
            current_page: 3,
            total_pages: 12,
        };
        assert_eq!(progress.to_string(), "3/12");
    }
}
