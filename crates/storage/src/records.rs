//! Plain-text records: program (collection) files and the startup record.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

pub const STARTUP_FILE_NAME: &str = "startup.txt";

/// Reads a collection file: one piece directory per line, top to bottom.
pub fn read_program_file(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read program file {}", path.display()))?;
    Ok(text
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

pub fn write_program_file(path: &Path, pieces: &[PathBuf]) -> anyhow::Result<()> {
    let mut text = String::new();
    for piece in pieces {
        text.push_str(&piece.to_string_lossy());
        text.push('\n');
    }
    fs::write(path, text).with_context(|| format!("write program file {}", path.display()))
}

/// What was open when the program last exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupRecord {
    pub last_piece: Option<PathBuf>,
    pub last_collection: Option<PathBuf>,
}

impl StartupRecord {
    pub fn parse(text: &str) -> Self {
        let mut lines = text.lines().map(|line| line.trim_end_matches('\r'));
        let mut next_path = || {
            lines
                .next()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(PathBuf::from)
        };
        let last_piece = next_path();
        let last_collection = next_path();
        Self {
            last_piece,
            last_collection,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.last_piece.is_none() && self.last_collection.is_none() {
            return out;
        }
        if let Some(piece) = &self.last_piece {
            out.push_str(&piece.to_string_lossy());
        }
        out.push('\n');
        if let Some(collection) = &self.last_collection {
            out.push_str(&collection.to_string_lossy());
            out.push('\n');
        }
        out
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => {
                Err(err).with_context(|| format!("read startup record {}", path.display()))
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        fs::write(path, self.render())
            .with_context(|| format!("write startup record {}", path.display()))
    }
}
