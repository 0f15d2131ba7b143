//! A program: the ordered pieces of a performance set.

use std::path::{Path, PathBuf};

use crate::piece::display_name;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    file: Option<PathBuf>,
    pieces: Vec<PathBuf>,
    active: Option<usize>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pieces(pieces: Vec<PathBuf>) -> Self {
        let active = (!pieces.is_empty()).then_some(0);
        Self {
            file: None,
            pieces,
            active,
        }
    }

    /// A program holding just one piece, as when a piece is loaded directly.
    pub fn single(piece: impl Into<PathBuf>) -> Self {
        Self::from_pieces(vec![piece.into()])
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let pieces = pageturner_storage::read_program_file(path)?;
        let mut program = Self::from_pieces(pieces);
        program.file = Some(path.to_path_buf());
        Ok(program)
    }

    pub fn save(&mut self, path: &Path) -> anyhow::Result<()> {
        pageturner_storage::write_program_file(path, &self.pieces)?;
        self.file = Some(path.to_path_buf());
        Ok(())
    }

    pub fn name(&self) -> Option<String> {
        self.file.as_deref().map(|file| {
            file.file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_else(|| display_name(file))
        })
    }

    pub fn pieces(&self) -> &[PathBuf] {
        &self.pieces
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_path(&self) -> Option<&Path> {
        self.active
            .and_then(|i| self.pieces.get(i))
            .map(PathBuf::as_path)
    }

    pub fn piece_names(&self) -> Vec<String> {
        self.pieces.iter().map(|p| display_name(p)).collect()
    }

    pub fn set_active(&mut self, index: usize) -> bool {
        if index < self.pieces.len() {
            self.active = Some(index);
            true
        } else {
            false
        }
    }

    /// Selects the first piece whose display name matches, ignoring case.
    pub fn set_active_by_name(&mut self, name: &str) -> bool {
        let name = name.trim();
        match self
            .pieces
            .iter()
            .position(|p| display_name(p).eq_ignore_ascii_case(name))
        {
            Some(index) => self.set_active(index),
            None => false,
        }
    }

    /// Moves to the next piece; stays on the last one.
    pub fn next_piece(&mut self) -> bool {
        match self.active {
            Some(i) if i + 1 < self.pieces.len() => {
                self.active = Some(i + 1);
                true
            }
            _ => false,
        }
    }

    /// Moves to the previous piece; stays on the first one.
    pub fn prev_piece(&mut self) -> bool {
        match self.active {
            Some(i) if i > 0 => {
                self.active = Some(i - 1);
                true
            }
            _ => false,
        }
    }
}
