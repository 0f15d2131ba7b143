//! A piece: the ordered page images of one work, with its bookmarks.

use std::path::{Path, PathBuf};

use pageturner_core::{
    Annotation, Bookmark, BookmarkSlot, BookmarkTable, PieceParams, Progress, Result,
};
use pageturner_storage::PieceState;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Page {
    ordinal: usize,
    file_name: String,
    annotations: Option<Vec<Annotation>>,
}

impl Page {
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

#[derive(Debug, Clone)]
pub struct Piece {
    dir: PathBuf,
    pages: Vec<Page>,
    current: usize,
    bookmarks: BookmarkTable,
    params: PieceParams,
}

impl Piece {
    /// Opens a piece directory. Fails with `EmptyDirectory` when it holds no
    /// recognized page images.
    pub fn open(dir: impl AsRef<Path>, params: PieceParams) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let names = pageturner_storage::list_pages(&dir)?;
        debug!(dir = %dir.display(), pages = names.len(), "opened piece");
        let pages = names
            .into_iter()
            .enumerate()
            .map(|(ordinal, file_name)| Page {
                ordinal,
                file_name,
                annotations: None,
            })
            .collect();
        Ok(Self {
            dir,
            pages,
            current: 0,
            bookmarks: BookmarkTable::new(),
            params,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> String {
        display_name(&self.dir)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn page_path(&self, index: usize) -> Option<PathBuf> {
        self.pages.get(index).map(|page| self.dir.join(&page.file_name))
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.pages.get(self.current)
    }

    pub fn next_page(&self) -> Option<&Page> {
        self.pages.get(self.current + 1)
    }

    pub fn previous_page(&self) -> Option<&Page> {
        self.current.checked_sub(1).and_then(|i| self.pages.get(i))
    }

    pub fn progress(&self) -> Progress {
        let count = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
        Progress {
            current_page: count(self.current + 1),
            total_pages: count(self.pages.len()),
        }
    }

    pub fn set_current_page(&mut self, index: usize) {
        self.current = index.min(self.pages.len().saturating_sub(1));
    }

    /// Advances the cursor; `false` when already on the last page.
    pub fn turn_forward(&mut self) -> bool {
        if self.current + 1 < self.pages.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    /// Moves the cursor back; `false` when already on the first page.
    pub fn turn_backward(&mut self) -> bool {
        if self.current > 0 {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    pub fn params(&self) -> PieceParams {
        self.params
    }

    pub fn params_mut(&mut self) -> &mut PieceParams {
        &mut self.params
    }

    pub fn bookmarks(&self) -> &BookmarkTable {
        &self.bookmarks
    }

    pub fn add_bookmark(&mut self, page: usize, origin: (f64, f64), slot: BookmarkSlot) {
        self.bookmarks.set(
            slot,
            Bookmark {
                page,
                x: origin.0,
                y: origin.1,
            },
        );
    }

    /// Moves the cursor to a bookmarked page. `None` when the slot is unset.
    pub fn go_to_bookmark(&mut self, slot: BookmarkSlot) -> Option<Bookmark> {
        let bookmark = self.bookmarks.get(slot)?;
        if bookmark.page >= self.pages.len() {
            warn!(%slot, page = bookmark.page, "bookmark points past the last page");
            return None;
        }
        self.current = bookmark.page;
        Some(bookmark)
    }

    pub fn remove_all_bookmarks(&mut self) {
        self.bookmarks.clear();
    }

    /// Annotations of a page, read from its record on first use.
    ///
    /// A malformed or unreadable record leaves the page without annotations.
    pub fn annotations(&mut self, index: usize) -> &[Annotation] {
        let Some(path) = self.page_path(index) else {
            return &[];
        };
        let page = &mut self.pages[index];
        page.annotations
            .get_or_insert_with(|| match pageturner_storage::load_annotations(&path) {
                Ok(annotations) => annotations,
                Err(err) => {
                    warn!(page = %path.display(), "ignoring annotation record: {err}");
                    Vec::new()
                }
            })
    }

    /// Adds an annotation and rewrites the page's record.
    pub fn add_annotation(&mut self, index: usize, annotation: Annotation) -> Result<()> {
        self.update_annotations(index, |annotations| {
            annotations.push(annotation);
            true
        })
    }

    /// Removes every annotation near `(x, y)`; returns how many were removed.
    pub fn remove_annotations_near(&mut self, index: usize, x: i32, y: i32) -> Result<usize> {
        let mut removed = 0;
        self.update_annotations(index, |annotations| {
            let before = annotations.len();
            annotations.retain(|a| !a.is_near(x, y));
            removed = before - annotations.len();
            removed > 0
        })?;
        Ok(removed)
    }

    /// Empties a page's set; returns how many annotations it held.
    pub fn clear_annotations(&mut self, index: usize) -> Result<usize> {
        let mut removed = 0;
        self.update_annotations(index, |annotations| {
            removed = annotations.len();
            annotations.clear();
            removed > 0
        })?;
        Ok(removed)
    }

    pub fn state(&self) -> PieceState {
        PieceState {
            current_page: self.current,
            params: self.params,
            bookmarks: self.bookmarks.clone(),
            view_mode: None,
        }
    }

    /// Restores saved state, dropping anything that no longer fits the pages.
    pub fn apply_state(&mut self, state: &PieceState) {
        self.set_current_page(state.current_page);
        self.params = state.params;
        self.bookmarks = state.bookmarks.clone();
        self.bookmarks.retain_pages(self.pages.len());
    }

    fn update_annotations(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut Vec<Annotation>) -> bool,
    ) -> Result<()> {
        let Some(path) = self.page_path(index) else {
            return Ok(());
        };
        let mut annotations = self.annotations(index).to_vec();
        if !edit(&mut annotations) {
            return Ok(());
        }
        pageturner_storage::save_annotations(&path, &annotations)?;
        self.pages[index].annotations = Some(annotations);
        Ok(())
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
