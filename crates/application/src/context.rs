use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use pageturner_core::{FontSpec, Settings, ViewMode};
use pageturner_storage::{PieceState, StartupRecord, Storage};
use tracing::{info, warn};

use crate::commands::Command;
use crate::navigation::{NavigationEngine, Viewport};
use crate::piece::Piece;
use crate::program::Program;

/// Where per-piece state is kept between sessions.
pub trait PieceStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<PieceState>>;
    fn save(&self, key: &str, state: &PieceState) -> anyhow::Result<()>;
}

impl PieceStore for Storage {
    fn load(&self, key: &str) -> anyhow::Result<Option<PieceState>> {
        self.load_piece_state(key)
    }

    fn save(&self, key: &str, state: &PieceState) -> anyhow::Result<()> {
        self.save_piece_state(key, state)
    }
}

/// Annotation mode waiting for a click.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Pending {
    #[default]
    None,
    /// Waiting for the annotation text.
    Text,
    Annotate {
        text: String,
    },
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Everything the control loop owns apart from the navigation engine.
pub struct AppContext {
    pub settings: Settings,
    pub program: Program,
    pub piece: Option<Piece>,
    pub startup: StartupRecord,
    pub font: FontSpec,
    pending: Pending,
    timer_running: bool,
    message: Option<String>,
    store: Option<Box<dyn PieceStore>>,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            program: Program::new(),
            piece: None,
            startup: StartupRecord::default(),
            font: FontSpec::default(),
            pending: Pending::None,
            timer_running: false,
            message: None,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Box<dyn PieceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_startup(mut self, startup: StartupRecord) -> Self {
        self.startup = startup;
        self
    }

    pub fn pending(&self) -> &Pending {
        &self.pending
    }

    /// `true` when the next input line is annotation text rather than a command.
    pub fn awaiting_text(&self) -> bool {
        self.pending == Pending::Text
    }

    pub fn timer_running(&self) -> bool {
        self.timer_running
    }

    /// Auto-advance interval while the timer runs on a loaded piece.
    pub fn timer_interval(&self) -> Option<Duration> {
        if !self.timer_running {
            return None;
        }
        self.piece.as_ref().map(|piece| piece.params().interval())
    }

    pub fn status_line(&self) -> String {
        let program = self.program.name().unwrap_or_default();
        let piece = self.piece.as_ref().map(Piece::name).unwrap_or_default();
        format!("Program: {program}    Piece: {piece}")
    }

    /// Transient message from the last command, cleared on read.
    pub fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }

    /// Opens a piece directory as a one-piece program.
    ///
    /// On failure the active piece and program are left as they were.
    pub fn load_piece(&mut self, dir: &Path, nav: &mut NavigationEngine) -> anyhow::Result<()> {
        self.activate(dir, nav)?;
        self.program = Program::single(dir);
        self.startup.last_piece = Some(dir.to_path_buf());
        Ok(())
    }

    pub fn load_program(&mut self, file: &Path, nav: &mut NavigationEngine) -> anyhow::Result<()> {
        let program = Program::load(file)?;
        let Some(first) = program.active_path().map(Path::to_path_buf) else {
            anyhow::bail!("collection {} lists no pieces", file.display());
        };
        self.activate(&first, nav)?;
        info!(collection = %file.display(), pieces = program.len(), "loaded program");
        self.program = program;
        self.startup.last_collection = Some(file.to_path_buf());
        self.startup.last_piece = Some(first);
        Ok(())
    }

    pub fn save_program(&mut self, file: &Path) -> anyhow::Result<()> {
        self.program.save(file)?;
        self.startup.last_collection = Some(file.to_path_buf());
        Ok(())
    }

    /// Reopens what the startup record names: the last collection, positioned
    /// on the last piece when it belongs to it, else the last piece alone.
    pub fn resume(&mut self, nav: &mut NavigationEngine) -> anyhow::Result<bool> {
        let last_piece = self.startup.last_piece.clone();
        if let Some(collection) = self.startup.last_collection.clone() {
            self.load_program(&collection, nav)?;
            if let Some(piece) = last_piece {
                if let Some(index) = self.program.pieces().iter().position(|p| *p == piece) {
                    self.switch_with(nav, |program| program.set_active(index))?;
                }
            }
            return Ok(true);
        }
        match last_piece {
            Some(piece) => {
                self.load_piece(&piece, nav)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn next_piece(&mut self, nav: &mut NavigationEngine) -> anyhow::Result<bool> {
        self.switch_with(nav, Program::next_piece)
    }

    pub fn prev_piece(&mut self, nav: &mut NavigationEngine) -> anyhow::Result<bool> {
        self.switch_with(nav, Program::prev_piece)
    }

    pub fn go_to_piece(&mut self, name: &str, nav: &mut NavigationEngine) -> anyhow::Result<bool> {
        self.switch_with(nav, |program| program.set_active_by_name(name))
    }

    /// Writes the active piece's state to the store, if there is one.
    pub fn save_piece_state(&self, view_mode: ViewMode) -> anyhow::Result<()> {
        let (Some(store), Some(piece)) = (&self.store, &self.piece) else {
            return Ok(());
        };
        let mut state = piece.state();
        state.view_mode = Some(view_mode);
        store
            .save(&state_key(piece.dir()), &state)
            .with_context(|| format!("save state of {}", piece.dir().display()))
    }

    /// Runs one command. Failures are reported in the status message and logged.
    pub fn apply(&mut self, command: Command, nav: &mut NavigationEngine) -> Flow {
        match self.try_apply(command, nav) {
            Ok(flow) => flow,
            Err(err) => {
                warn!("command failed: {err:#}");
                self.message = Some(format!("{err:#}"));
                Flow::Continue
            }
        }
    }

    fn try_apply(&mut self, command: Command, nav: &mut NavigationEngine) -> anyhow::Result<Flow> {
        match command {
            Command::Forward => {
                nav.turn_forward(self.piece.as_mut());
            }
            Command::Backward => {
                nav.turn_backward(self.piece.as_mut());
            }
            Command::Tick => {
                if self.timer_running {
                    nav.tick(self.piece.as_mut());
                }
            }
            Command::NextPiece => {
                self.next_piece(nav)?;
            }
            Command::PrevPiece => {
                self.prev_piece(nav)?;
            }
            Command::GoToPiece(name) => {
                if !self.go_to_piece(&name, nav)? {
                    self.message = Some(format!("No Piece Named {name}"));
                }
            }
            Command::ListPieces => {
                let names = self.program.piece_names();
                self.message = Some(if names.is_empty() {
                    "No Program".to_string()
                } else {
                    format!("Pieces: {}", names.join(", "))
                });
            }
            Command::ToggleViewMode => {
                let mode = nav.toggle_view_mode(self.piece.as_mut());
                self.settings.view_mode = mode;
                self.message = Some(mode.to_string());
            }
            Command::ToggleTimer => {
                if self.piece.is_some() {
                    self.timer_running = !self.timer_running;
                    let state = if self.timer_running { "Started" } else { "Stopped" };
                    self.message = Some(format!("Timer {state}"));
                }
            }
            Command::SpeedUp => {
                if let Some(piece) = self.piece.as_mut() {
                    piece.params_mut().speed_up();
                    self.message = Some(format!("Timer {:.2}s", piece.params().timer_value));
                }
            }
            Command::SlowDown => {
                if let Some(piece) = self.piece.as_mut() {
                    piece.params_mut().slow_down();
                    self.message = Some(format!("Timer {:.2}s", piece.params().timer_value));
                }
            }
            Command::GoToStart => nav.go_to_start(self.piece.as_mut()),
            Command::RemoveAllBookmarks => {
                if let Some(piece) = self.piece.as_mut() {
                    piece.remove_all_bookmarks();
                    self.message = Some("All Bookmarks Removed".to_string());
                }
            }
            Command::GoToBookmark(slot) => {
                if self.piece.is_some() && nav.go_to_bookmark(slot, self.piece.as_mut()).is_none() {
                    self.message = Some(format!("Bookmark {slot} Not Set"));
                }
            }
            Command::SetBookmark(slot) => {
                if nav.set_bookmark(slot, self.piece.as_mut()).is_some() {
                    self.message = Some(format!("Bookmark {slot} Set"));
                }
            }
            Command::GrowFont => self.font.grow(),
            Command::ShrinkFont => self.font.shrink(),
            Command::BeginAnnotate(text) => {
                let text = pageturner_core::single_line(&text);
                self.pending = if text.trim().is_empty() {
                    Pending::Text
                } else {
                    Pending::Annotate { text }
                };
            }
            Command::BeginRemove => self.pending = Pending::Remove,
            Command::ClearAnnotations => {
                if self.piece.is_some() {
                    let removed = nav.clear_annotations(self.piece.as_mut())?;
                    self.message = Some(format!("Removed {removed}"));
                }
            }
            Command::Cancel => self.pending = Pending::None,
            Command::Click { x, y } => match std::mem::take(&mut self.pending) {
                Pending::Annotate { text } => {
                    nav.add_annotation(self.piece.as_mut(), (x, y), &text, self.font.clone())?;
                }
                Pending::Remove => {
                    let removed = nav.remove_annotations_at(self.piece.as_mut(), (x, y))?;
                    self.message = Some(format!("Removed {removed}"));
                }
                other => self.pending = other,
            },
            Command::Resize { width, height } => {
                nav.resize(Viewport::new(width, height), self.piece.as_mut());
            }
            Command::LoadPiece(dir) => self.load_piece(&dir, nav)?,
            Command::LoadProgram(file) => self.load_program(&file, nav)?,
            Command::SaveProgram(file) => self.save_program(&file)?,
            // The control loop takes these while a scan is open.
            Command::RetryScan | Command::StopScan => {
                self.message = Some("No Scan Active".to_string());
            }
            Command::Quit => {
                if let Err(err) = self.save_piece_state(nav.view_mode()) {
                    warn!("quitting without saving piece state: {err:#}");
                }
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    /// Moves the cursor of a copy of the program and activates the piece it
    /// lands on. The program is only updated once that piece has opened.
    fn switch_with(
        &mut self,
        nav: &mut NavigationEngine,
        select: impl FnOnce(&mut Program) -> bool,
    ) -> anyhow::Result<bool> {
        let mut program = self.program.clone();
        if !select(&mut program) {
            return Ok(false);
        }
        let Some(dir) = program.active_path().map(Path::to_path_buf) else {
            return Ok(false);
        };
        self.activate(&dir, nav)?;
        self.program = program;
        self.startup.last_piece = Some(dir);
        Ok(true)
    }

    /// Opens `dir` and makes it the active piece, saving the one it replaces.
    fn activate(&mut self, dir: &Path, nav: &mut NavigationEngine) -> anyhow::Result<()> {
        let mut piece = Piece::open(dir, self.settings.piece_params())
            .with_context(|| format!("open piece {}", dir.display()))?;

        if let Err(err) = self.save_piece_state(nav.view_mode()) {
            warn!("{err:#}");
        }

        let mut mode = nav.view_mode();
        if let Some(store) = &self.store {
            match store.load(&state_key(dir)) {
                Ok(Some(state)) => {
                    piece.apply_state(&state);
                    mode = state.view_mode.unwrap_or(mode);
                }
                Ok(None) => {}
                Err(err) => warn!(piece = %dir.display(), "ignoring saved state: {err:#}"),
            }
        }

        info!(piece = %dir.display(), pages = piece.len(), page = piece.current_index(), "loaded piece");
        self.pending = Pending::None;
        self.piece = Some(piece);
        self.settings.view_mode = mode;
        nav.set_view_mode(mode, self.piece.as_mut());
        Ok(())
    }
}

fn state_key(dir: &Path) -> String {
    let dir: PathBuf = dir.components().collect();
    dir.to_string_lossy().to_string()
}
