//! Persistence for Page Turner.
//!
//! Flat files live next to the music (annotation records, collection files)
//! or in the home directory (options, startup record). Per-piece state that
//! has no file format of its own (current page, view parameters, bookmarks)
//! is kept in a sqlite database.

mod annotations;
mod options;
mod pages;
mod records;

use std::path::Path;

use anyhow::Context as _;
use pageturner_core::{BookmarkEntry, BookmarkTable, PieceParams, ViewMode};
use rusqlite::{Connection, OptionalExtension as _};

pub use annotations::{
    ANNOTATION_EXTENSION, annotation_path, decode_annotations, encode_annotations,
    load_annotations, save_annotations,
};
pub use options::{OPTIONS_FILE_NAME, load_options, parse_options, render_options, save_options};
pub use pages::{RECOGNIZED_EXTENSIONS, is_recognized, list_pages};
pub use records::{STARTUP_FILE_NAME, StartupRecord, read_program_file, write_program_file};

pub const DATABASE_FILE_NAME: &str = "pageturner.db";

/// Saved state of one piece, keyed by its directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PieceState {
    pub current_page: usize,
    pub params: PieceParams,
    pub bookmarks: BookmarkTable,
    pub view_mode: Option<ViewMode>,
}

#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("open sqlite db at {}", path.as_ref().display()))?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pieces (
                path TEXT PRIMARY KEY,
                current_page INTEGER NOT NULL DEFAULT 0,
                scroll_amount REAL NOT NULL,
                timer_value REAL NOT NULL,
                bookmarks_json TEXT NOT NULL DEFAULT '[]',
                updated_at INTEGER NOT NULL DEFAULT (unixepoch())
            );
            "#,
        )?;

        match self
            .conn
            .execute("ALTER TABLE pieces ADD COLUMN view_mode TEXT", [])
        {
            Ok(_) => {}
            Err(err) => {
                let msg = err.to_string();
                if !msg.contains("duplicate column name") {
                    return Err(err).context("add pieces.view_mode column");
                }
            }
        }

        Ok(())
    }

    pub fn load_piece_state(&self, path: &str) -> anyhow::Result<Option<PieceState>> {
        let row = self
            .conn
            .query_row(
                "SELECT current_page, scroll_amount, timer_value, bookmarks_json, view_mode FROM pieces WHERE path = ?",
                [path],
                |row| {
                    let current_page: i64 = row.get(0)?;
                    let scroll_amount: f64 = row.get(1)?;
                    let timer_value: f64 = row.get(2)?;
                    let bookmarks_json: String = row.get(3)?;
                    let view_mode: Option<String> = row.get(4)?;
                    Ok((current_page, scroll_amount, timer_value, bookmarks_json, view_mode))
                },
            )
            .optional()?;

        let Some((current_page, scroll_amount, timer_value, bookmarks_json, view_mode)) = row
        else {
            return Ok(None);
        };

        let entries: Vec<BookmarkEntry> = match serde_json::from_str(&bookmarks_json) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path, "ignoring unreadable bookmarks: {err}");
                Vec::new()
            }
        };
        let mut params = PieceParams {
            scroll_amount,
            timer_value,
        };
        params.normalize();

        Ok(Some(PieceState {
            current_page: usize::try_from(current_page).unwrap_or(0),
            params,
            bookmarks: BookmarkTable::from_entries(&entries),
            view_mode: view_mode.and_then(|mode| mode.parse::<ViewMode>().ok()),
        }))
    }

    pub fn save_piece_state(&self, path: &str, state: &PieceState) -> anyhow::Result<()> {
        let bookmarks_json = serde_json::to_string(&state.bookmarks.entries())?;
        let current_page = i64::try_from(state.current_page).unwrap_or(0);
        self.conn.execute(
            r#"
            INSERT INTO pieces (path, current_page, scroll_amount, timer_value, bookmarks_json, view_mode, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, unixepoch())
            ON CONFLICT(path) DO UPDATE SET
                current_page = excluded.current_page,
                scroll_amount = excluded.scroll_amount,
                timer_value = excluded.timer_value,
                bookmarks_json = excluded.bookmarks_json,
                view_mode = excluded.view_mode,
                updated_at = excluded.updated_at
            "#,
            (
                path,
                current_page,
                state.params.scroll_amount,
                state.params.timer_value,
                bookmarks_json,
                state.view_mode.map(|mode| mode.as_str()),
            ),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageturner_core::{Bookmark, BookmarkSlot};

    #[test]
    fn missing_piece_has_no_state() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        assert!(storage.load_piece_state("/music/none")?.is_none());
        Ok(())
    }

    #[test]
    fn piece_state_roundtrip() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        let mut bookmarks = BookmarkTable::new();
        bookmarks.set(
            BookmarkSlot::new(1).unwrap(),
            Bookmark {
                page: 3,
                x: 10.0,
                y: 20.0,
            },
        );
        let state = PieceState {
            current_page: 3,
            params: PieceParams {
                scroll_amount: 150.0,
                timer_value: 4.0,
            },
            bookmarks,
            view_mode: Some(ViewMode::FitWidth),
        };
        storage.save_piece_state("/music/etude", &state)?;
        assert_eq!(storage.load_piece_state("/music/etude")?, Some(state.clone()));

        let mut updated = state;
        updated.bookmarks.clear();
        updated.view_mode = None;
        storage.save_piece_state("/music/etude", &updated)?;
        assert_eq!(storage.load_piece_state("/music/etude")?, Some(updated));
        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> anyhow::Result<()> {
        let storage = Storage::open_in_memory()?;
        storage.migrate()?;
        storage.save_piece_state("/a", &PieceState::default())?;
        Ok(())
    }
}
