//! Application orchestration layer for Page Turner.

mod commands;
mod context;
mod navigation;
mod piece;
mod program;

pub use commands::{Command, ESCAPE};
pub use context::{AppContext, Flow, Pending, PieceStore};
pub use navigation::{
    NavigationEngine, Overlay, PageSlot, PlacedPage, TurnOutcome, Viewport,
};
pub use piece::{Page, Piece};
pub use program::Program;
