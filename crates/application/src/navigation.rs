//! Page-turn and scroll state machine.
//!
//! The engine keeps the viewport origin and the two page slots on screen: the
//! current page and the one after it. In two-page mode they sit side by side
//! and a turn moves the cursor by one page. In fit-width mode they are stacked
//! and a request scrolls by the piece's scroll amount; the cursor only moves
//! once the current page has scrolled out of the viewport, and the offset is
//! shifted by the boundary page's height so the picture does not jump.

use std::path::PathBuf;

use pageturner_core::{Annotation, Bookmark, BookmarkSlot, FontSpec, PageGeometry, ViewMode};
use tracing::{debug, warn};

use crate::piece::Piece;

/// Page size used when an image's dimensions cannot be read (US letter at 72 dpi).
const FALLBACK_PAGE_SIZE: (u32, u32) = (612, 792);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Moved within the current page.
    Scrolled,
    Advanced,
    Retreated,
    /// Nothing moved: at the end of the piece in that direction.
    NoAdvance,
    /// No piece is loaded.
    NoPiece,
}

impl TurnOutcome {
    pub fn page_changed(&self) -> bool {
        matches!(self, TurnOutcome::Advanced | TurnOutcome::Retreated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(1.0),
        }
    }
}

/// A loaded page image, scaled for the active view mode.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSlot {
    pub ordinal: usize,
    pub path: PathBuf,
    pub width: f64,
    pub height: f64,
    /// Annotations tagged with the active view mode.
    pub annotations: Vec<Annotation>,
}

/// Where a slot lands on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedPage {
    pub ordinal: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// An annotation positioned in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlay<'a> {
    pub page: usize,
    pub x: f64,
    pub y: f64,
    pub annotation: &'a Annotation,
}

pub struct NavigationEngine {
    geometry: Box<dyn PageGeometry>,
    view_mode: ViewMode,
    viewport: Viewport,
    origin_x: f64,
    offset: f64,
    slots: [Option<PageSlot>; 2],
}

impl NavigationEngine {
    pub fn new(geometry: Box<dyn PageGeometry>, view_mode: ViewMode, viewport: Viewport) -> Self {
        Self {
            geometry,
            view_mode,
            viewport,
            origin_x: 0.0,
            offset: 0.0,
            slots: [None, None],
        }
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Distance the page column has been scrolled up, in screen pixels.
    pub fn scroll_offset(&self) -> f64 {
        self.offset
    }

    /// Viewport origin as stored in bookmarks: horizontal pan and scroll offset.
    pub fn origin(&self) -> (f64, f64) {
        (self.origin_x, self.offset)
    }

    pub fn slots(&self) -> [Option<&PageSlot>; 2] {
        [self.slots[0].as_ref(), self.slots[1].as_ref()]
    }

    /// Reloads both slots from the piece's cursor.
    pub fn load(&mut self, piece: Option<&mut Piece>) {
        match piece {
            Some(piece) => self.reload(piece),
            None => self.slots = [None, None],
        }
    }

    pub fn turn_forward(&mut self, piece: Option<&mut Piece>) -> TurnOutcome {
        let Some(piece) = piece else {
            return TurnOutcome::NoPiece;
        };
        let outcome = match self.view_mode {
            ViewMode::TwoPage => self.turn_two_page(piece, Piece::turn_forward, TurnOutcome::Advanced),
            ViewMode::FitWidth => self.scroll_forward(piece),
        };
        debug!(?outcome, page = piece.current_index(), offset = self.offset, "forward");
        outcome
    }

    pub fn turn_backward(&mut self, piece: Option<&mut Piece>) -> TurnOutcome {
        let Some(piece) = piece else {
            return TurnOutcome::NoPiece;
        };
        let outcome = match self.view_mode {
            ViewMode::TwoPage => {
                self.turn_two_page(piece, Piece::turn_backward, TurnOutcome::Retreated)
            }
            ViewMode::FitWidth => self.scroll_backward(piece),
        };
        debug!(?outcome, page = piece.current_index(), offset = self.offset, "backward");
        outcome
    }

    /// Auto-advance timer tick.
    pub fn tick(&mut self, piece: Option<&mut Piece>) -> TurnOutcome {
        self.turn_forward(piece)
    }

    /// Switches layout; other-mode annotations are hidden, not removed.
    pub fn set_view_mode(&mut self, mode: ViewMode, piece: Option<&mut Piece>) {
        self.view_mode = mode;
        self.offset = 0.0;
        self.load(piece);
    }

    pub fn toggle_view_mode(&mut self, piece: Option<&mut Piece>) -> ViewMode {
        let mode = self.view_mode.toggled();
        self.set_view_mode(mode, piece);
        mode
    }

    pub fn resize(&mut self, viewport: Viewport, piece: Option<&mut Piece>) {
        self.viewport = viewport;
        self.load(piece);
    }

    pub fn go_to_start(&mut self, piece: Option<&mut Piece>) {
        let Some(piece) = piece else {
            return;
        };
        piece.set_current_page(0);
        self.origin_x = 0.0;
        self.offset = 0.0;
        self.reload(piece);
    }

    /// Stores the current page and viewport origin in `slot`.
    pub fn set_bookmark(&mut self, slot: BookmarkSlot, piece: Option<&mut Piece>) -> Option<Bookmark> {
        let piece = piece?;
        if piece.is_empty() {
            return None;
        }
        let page = piece.current_index();
        piece.add_bookmark(page, self.origin(), slot);
        piece.bookmarks().get(slot)
    }

    /// Jumps to a bookmark; `None` when the slot is not set.
    pub fn go_to_bookmark(&mut self, slot: BookmarkSlot, piece: Option<&mut Piece>) -> Option<Bookmark> {
        let piece = piece?;
        let bookmark = piece.go_to_bookmark(slot)?;
        self.origin_x = bookmark.x;
        self.offset = bookmark.y;
        self.reload(piece);
        Some(bookmark)
    }

    /// Screen positions of the slots.
    pub fn layout(&self) -> Vec<PlacedPage> {
        let mut placed = Vec::with_capacity(2);
        let Some(first) = &self.slots[0] else {
            return placed;
        };
        let top = -self.offset;
        placed.push(PlacedPage {
            ordinal: first.ordinal,
            x: self.origin_x,
            y: top,
            width: first.width,
            height: first.height,
        });
        if let Some(second) = &self.slots[1] {
            let (x, y) = match self.view_mode {
                ViewMode::TwoPage => (self.origin_x + first.width, top),
                ViewMode::FitWidth => (self.origin_x, top + first.height),
            };
            placed.push(PlacedPage {
                ordinal: second.ordinal,
                x,
                y,
                width: second.width,
                height: second.height,
            });
        }
        placed
    }

    /// Annotations to draw. In fit-width mode only the current page's are shown.
    pub fn overlays(&self) -> Vec<Overlay<'_>> {
        let placed = self.layout();
        let shown = match self.view_mode {
            ViewMode::TwoPage => 2,
            ViewMode::FitWidth => 1,
        };
        let mut out = Vec::new();
        for (slot, at) in self.slots.iter().zip(placed.iter()).take(shown) {
            let Some(slot) = slot else {
                continue;
            };
            let dx = at.x;
            let dy = -self.offset;
            for annotation in &slot.annotations {
                out.push(Overlay {
                    page: slot.ordinal,
                    x: f64::from(annotation.x) + dx,
                    y: f64::from(annotation.y) + dy,
                    annotation,
                });
            }
        }
        out
    }

    /// Maps a screen point to image coordinates of the current page.
    pub fn screen_to_image(&self, x: f64, y: f64) -> (i32, i32) {
        (
            (x - self.origin_x).round() as i32,
            (y + self.offset).round() as i32,
        )
    }

    /// Places an annotation on the current page at a screen point, tagged with
    /// the active view mode, and rewrites the page's record.
    pub fn add_annotation(
        &mut self,
        piece: Option<&mut Piece>,
        at: (f64, f64),
        text: &str,
        font: FontSpec,
    ) -> pageturner_core::Result<bool> {
        let Some(piece) = piece else {
            return Ok(false);
        };
        if piece.is_empty() {
            return Ok(false);
        }
        let (x, y) = self.screen_to_image(at.0, at.1);
        let annotation = Annotation::new(x, y, text, font, self.view_mode);
        piece.add_annotation(piece.current_index(), annotation)?;
        self.reload(piece);
        Ok(true)
    }

    /// Removes annotations of the current page near a screen point.
    pub fn remove_annotations_at(
        &mut self,
        piece: Option<&mut Piece>,
        at: (f64, f64),
    ) -> pageturner_core::Result<usize> {
        let Some(piece) = piece else {
            return Ok(0);
        };
        if piece.is_empty() {
            return Ok(0);
        }
        let (x, y) = self.screen_to_image(at.0, at.1);
        let removed = piece.remove_annotations_near(piece.current_index(), x, y)?;
        if removed > 0 {
            self.reload(piece);
        }
        Ok(removed)
    }

    /// Removes every annotation on the current page.
    pub fn clear_annotations(&mut self, piece: Option<&mut Piece>) -> pageturner_core::Result<usize> {
        let Some(piece) = piece else {
            return Ok(0);
        };
        if piece.is_empty() {
            return Ok(0);
        }
        let removed = piece.clear_annotations(piece.current_index())?;
        if removed > 0 {
            self.reload(piece);
        }
        Ok(removed)
    }

    /// Drops cached dimensions of a page file that was rewritten on disk.
    pub fn forget_page(&self, path: &std::path::Path) {
        self.geometry.forget(path);
    }

    /// `true` while any part of the current page overlaps the viewport.
    pub fn current_page_visible(&self) -> bool {
        match &self.slots[0] {
            Some(slot) => self.overlaps_viewport(-self.offset, slot.height),
            None => false,
        }
    }

    /// `true` while the page stacked below the current one overlaps the viewport.
    pub fn lower_page_visible(&self) -> bool {
        let Some(first) = &self.slots[0] else {
            return false;
        };
        let height = self.slots[1]
            .as_ref()
            .map(|slot| slot.height)
            .unwrap_or(first.height);
        self.overlaps_viewport(-self.offset + first.height, height)
    }

    fn overlaps_viewport(&self, top: f64, height: f64) -> bool {
        top + height > 0.0 && top < self.viewport.height
    }

    fn turn_two_page(
        &mut self,
        piece: &mut Piece,
        turn: fn(&mut Piece) -> bool,
        moved: TurnOutcome,
    ) -> TurnOutcome {
        if !turn(piece) {
            return TurnOutcome::NoAdvance;
        }
        self.origin_x = 0.0;
        self.offset = 0.0;
        self.reload(piece);
        moved
    }

    fn scroll_forward(&mut self, piece: &mut Piece) -> TurnOutcome {
        if self.slots[0].is_none() {
            self.reload(piece);
        }
        let Some(leaving) = self.slots[0].as_ref().map(|slot| slot.height) else {
            return TurnOutcome::NoAdvance;
        };
        let amount = piece.params().scroll_amount;
        self.offset += amount;
        if self.current_page_visible() {
            return TurnOutcome::Scrolled;
        }
        if piece.turn_forward() {
            self.offset -= leaving;
            self.reload(piece);
            TurnOutcome::Advanced
        } else {
            // Last page: do not scroll it out of view.
            self.offset -= amount;
            TurnOutcome::NoAdvance
        }
    }

    fn scroll_backward(&mut self, piece: &mut Piece) -> TurnOutcome {
        if self.slots[0].is_none() {
            self.reload(piece);
        }
        if self.slots[0].is_none() {
            return TurnOutcome::NoAdvance;
        }
        let at_first_page = piece.current_index() == 0;
        if at_first_page && self.offset <= 0.0 {
            return TurnOutcome::NoAdvance;
        }
        let amount = piece.params().scroll_amount;
        self.offset -= amount;
        if self.lower_page_visible() || !piece.turn_backward() {
            if at_first_page {
                self.offset = self.offset.max(0.0);
            }
            return TurnOutcome::Scrolled;
        }
        self.reload(piece);
        let entering = self.slots[0].as_ref().map(|slot| slot.height).unwrap_or(0.0);
        self.offset += entering;
        TurnOutcome::Retreated
    }

    fn reload(&mut self, piece: &mut Piece) {
        let current = piece.current_index();
        self.slots = [self.load_slot(piece, current), self.load_slot(piece, current + 1)];
    }

    fn load_slot(&self, piece: &mut Piece, index: usize) -> Option<PageSlot> {
        let path = piece.page_path(index)?;
        let (width, height) = self.scaled_size(self.image_size(&path));
        let mode = self.view_mode;
        let annotations = piece
            .annotations(index)
            .iter()
            .filter(|a| a.is_visible_in(mode))
            .cloned()
            .collect();
        Some(PageSlot {
            ordinal: index,
            path,
            width,
            height,
            annotations,
        })
    }

    fn image_size(&self, path: &std::path::Path) -> (u32, u32) {
        match self.geometry.page_size(path) {
            Ok((w, h)) if w > 0 && h > 0 => (w, h),
            Ok(_) => FALLBACK_PAGE_SIZE,
            Err(err) => {
                warn!(page = %path.display(), "using fallback page size: {err}");
                FALLBACK_PAGE_SIZE
            }
        }
    }

    fn scaled_size(&self, (w, h): (u32, u32)) -> (f64, f64) {
        let (w, h) = (f64::from(w), f64::from(h));
        match self.view_mode {
            ViewMode::FitWidth => {
                let scale = self.viewport.width / w;
                (self.viewport.width, h * scale)
            }
            ViewMode::TwoPage => (self.viewport.width / 2.0, self.viewport.height),
        }
    }
}
