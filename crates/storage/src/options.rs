//! Options record: one `[name, value]` pair per line.
//!
//! Lines are parsed as data, never evaluated. Values that are not a quoted
//! string or a number, unknown names, and lines that do not parse at all are
//! carried through verbatim so a save does not lose them.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::Context as _;
use pageturner_core::{RawOption, Settings, ViewMode};
use tracing::warn;

pub const OPTIONS_FILE_NAME: &str = "options.txt";

const MUSIC_DIR: &str = "MUSIC_DIR";
const SCROLL_AMOUNT: &str = "SCROLL_AMOUNT";
const TIMER_VALUE: &str = "TIMER_VALUE";
const VIEW_MODE: &str = "VIEW_MODE";
const MAGICK_HOME: &str = "MAGICK_HOME";

#[derive(Debug, Clone, PartialEq)]
enum OptionValue {
    Str(String),
    Number(f64),
    Opaque(String),
}

impl OptionValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            OptionValue::Number(n) => Some(*n),
            OptionValue::Str(s) => s.trim().parse().ok(),
            OptionValue::Opaque(_) => None,
        }
    }
}

pub fn parse_options(text: &str) -> Settings {
    let mut settings = Settings::default();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let Some((name, value)) = parse_line(line) else {
            warn!(line, "keeping unparseable options line");
            settings.extra.push(RawOption {
                name: None,
                line: line.to_string(),
            });
            continue;
        };
        if !apply(&mut settings, &name, &value) {
            settings.extra.push(RawOption {
                name: Some(name),
                line: line.to_string(),
            });
        }
    }
    settings.normalize();
    settings
}

pub fn render_options(settings: &Settings) -> String {
    let mut written: Vec<&str> = Vec::new();
    let mut out = String::new();
    let mut push = |name: &'static str, value: String| {
        out.push_str(&format!("['{name}', {value}]\n"));
        written.push(name);
    };

    if let Some(dir) = &settings.music_dir {
        push(MUSIC_DIR, quote(dir));
    }
    push(SCROLL_AMOUNT, number(settings.scroll_amount));
    push(TIMER_VALUE, number(settings.timer_value));
    push(VIEW_MODE, quote(settings.view_mode.as_str()));
    if let Some(home) = &settings.magick_home {
        push(MAGICK_HOME, quote(home));
    }

    for raw in &settings.extra {
        let shadowed = raw
            .name
            .as_deref()
            .is_some_and(|name| written.contains(&name));
        if !shadowed {
            out.push_str(&raw.line);
            out.push('\n');
        }
    }
    out
}

/// Returns `None` when no options file exists yet.
pub fn load_options(path: &Path) -> anyhow::Result<Option<Settings>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(parse_options(&text))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read options {}", path.display())),
    }
}

pub fn save_options(path: &Path, settings: &Settings) -> anyhow::Result<()> {
    let mut settings = settings.clone();
    settings.normalize();
    fs::write(path, render_options(&settings))
        .with_context(|| format!("write options {}", path.display()))
}

fn apply(settings: &mut Settings, name: &str, value: &OptionValue) -> bool {
    match (name, value) {
        (MUSIC_DIR, OptionValue::Str(dir)) => settings.music_dir = Some(dir.clone()),
        (MAGICK_HOME, OptionValue::Str(home)) => settings.magick_home = Some(home.clone()),
        (SCROLL_AMOUNT, value) => match value.as_number() {
            Some(n) => settings.scroll_amount = n,
            None => return false,
        },
        (TIMER_VALUE, value) => match value.as_number() {
            Some(n) => settings.timer_value = n,
            None => return false,
        },
        (VIEW_MODE, OptionValue::Str(mode)) => match mode.parse::<ViewMode>() {
            Ok(mode) => settings.view_mode = mode,
            Err(_) => return false,
        },
        _ => return false,
    }
    true
}

fn parse_line(line: &str) -> Option<(String, OptionValue)> {
    let inner = line.trim().strip_prefix('[')?.strip_suffix(']')?.trim();
    let (name, rest) = split_quoted(inner)?;
    let value = rest.trim_start().strip_prefix(',')?.trim();
    if value.is_empty() {
        return None;
    }
    let value = match split_quoted(value) {
        Some((s, tail)) if tail.trim().is_empty() => OptionValue::Str(s),
        _ => match value.parse::<f64>() {
            Ok(n) => OptionValue::Number(n),
            Err(_) => OptionValue::Opaque(value.to_string()),
        },
    };
    Some((name, value))
}

/// Splits a leading `'...'` or `"..."` literal off `text`.
fn split_quoted(text: &str) -> Option<(String, &str)> {
    let mut chars = text.char_indices();
    let (_, quote) = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let mut out = String::new();
    let mut escaped = false;
    for (idx, ch) in chars {
        if escaped {
            out.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            return Some((out, &text[idx + ch.len_utf8()..]));
        } else {
            out.push(ch);
        }
    }
    None
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
