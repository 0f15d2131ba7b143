//! Performer commands: single keys plus a few `:`-prefixed line commands
//! for actions that need an argument.

use std::path::PathBuf;

use pageturner_core::BookmarkSlot;

pub const ESCAPE: char = '\u{1b}';

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Forward,
    Backward,
    NextPiece,
    PrevPiece,
    GoToPiece(String),
    ListPieces,
    ToggleViewMode,
    ToggleTimer,
    SpeedUp,
    SlowDown,
    GoToStart,
    RemoveAllBookmarks,
    GoToBookmark(BookmarkSlot),
    SetBookmark(BookmarkSlot),
    GrowFont,
    ShrinkFont,
    BeginAnnotate(String),
    BeginRemove,
    /// Removes every annotation on the current page.
    ClearAnnotations,
    Cancel,
    /// Mouse click in screen coordinates; completes a pending annotate or remove.
    Click { x: f64, y: f64 },
    Resize { width: f64, height: f64 },
    LoadPiece(PathBuf),
    LoadProgram(PathBuf),
    SaveProgram(PathBuf),
    /// Repeats a scanner transfer that failed.
    RetryScan,
    StopScan,
    Tick,
    Quit,
}

impl Command {
    pub fn from_key(key: char) -> Option<Self> {
        if let Some(slot) = BookmarkSlot::from_goto_key(key) {
            return Some(Command::GoToBookmark(slot));
        }
        if let Some(slot) = BookmarkSlot::from_set_key(key) {
            return Some(Command::SetBookmark(slot));
        }
        let command = match key {
            'f' | ' ' => Command::Forward,
            'b' => Command::Backward,
            'F' => Command::NextPiece,
            'B' => Command::PrevPiece,
            'v' => Command::ToggleViewMode,
            't' => Command::ToggleTimer,
            'q' => Command::SpeedUp,
            's' => Command::SlowDown,
            '0' => Command::GoToStart,
            '-' => Command::RemoveAllBookmarks,
            '>' | '.' => Command::GrowFont,
            '<' | ',' => Command::ShrinkFont,
            'A' => Command::BeginAnnotate(String::new()),
            'R' => Command::BeginRemove,
            ESCAPE => Command::Cancel,
            'x' => Command::Quit,
            _ => return None,
        };
        Some(command)
    }

    /// Parses one input line. A bare key line maps through [`Command::from_key`].
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(rest) = line.strip_prefix(':') else {
            let mut chars = line.chars();
            let key = chars.next()?;
            return match chars.next() {
                None => Self::from_key(key),
                Some(_) => None,
            };
        };
        let (name, arg) = match rest.split_once(' ') {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "piece" if !arg.is_empty() => Some(Command::LoadPiece(PathBuf::from(arg))),
            "program" if !arg.is_empty() => Some(Command::LoadProgram(PathBuf::from(arg))),
            "save-program" if !arg.is_empty() => Some(Command::SaveProgram(PathBuf::from(arg))),
            "goto" if !arg.is_empty() => Some(Command::GoToPiece(arg.to_string())),
            "pieces" => Some(Command::ListPieces),
            "clear" => Some(Command::ClearAnnotations),
            "retry-scan" => Some(Command::RetryScan),
            "stop-scan" => Some(Command::StopScan),
            "annotate" if !arg.is_empty() => Some(Command::BeginAnnotate(arg.to_string())),
            "click" => {
                let (x, y) = two_numbers(arg)?;
                Some(Command::Click { x, y })
            }
            "resize" => {
                let (width, height) = two_numbers(arg)?;
                Some(Command::Resize { width, height })
            }
            "quit" => Some(Command::Quit),
            _ => None,
        }
    }
}

fn two_numbers(arg: &str) -> Option<(f64, f64)> {
    let mut parts = arg.split_whitespace().map(str::parse::<f64>);
    let a = parts.next()?.ok()?;
    let b = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((a, b))
}
