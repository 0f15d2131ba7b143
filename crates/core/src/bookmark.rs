use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const MAX_BOOKMARKS: u8 = 9;

/// Bookmark slot, numbered 1 through 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BookmarkSlot(u8);

impl BookmarkSlot {
    pub fn new(slot: u8) -> Option<Self> {
        (1..=MAX_BOOKMARKS).contains(&slot).then_some(Self(slot))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Digit keys recall a bookmark.
    pub fn from_goto_key(key: char) -> Option<Self> {
        let digit = key.to_digit(10)?;
        Self::new(u8::try_from(digit).ok()?)
    }

    /// Shifted digit keys store a bookmark.
    pub fn from_set_key(key: char) -> Option<Self> {
        let slot = match key {
            '!' => 1,
            '@' => 2,
            '#' => 3,
            '$' => 4,
            '%' => 5,
            '^' => 6,
            '&' => 7,
            '*' => 8,
            '(' => 9,
            _ => return None,
        };
        Self::new(slot)
    }
}

impl std::fmt::Display for BookmarkSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Saved position: page ordinal plus viewport origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub page: usize,
    pub x: f64,
    pub y: f64,
}

/// Flat form of one table row, used for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookmarkEntry {
    pub slot: u8,
    pub page: usize,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookmarkTable {
    slots: BTreeMap<BookmarkSlot, Bookmark>,
}

impl BookmarkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, slot: BookmarkSlot, bookmark: Bookmark) {
        self.slots.insert(slot, bookmark);
    }

    pub fn get(&self, slot: BookmarkSlot) -> Option<Bookmark> {
        self.slots.get(&slot).copied()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BookmarkSlot, Bookmark)> + '_ {
        self.slots.iter().map(|(slot, bookmark)| (*slot, *bookmark))
    }

    /// Drops bookmarks pointing past the last page.
    pub fn retain_pages(&mut self, page_count: usize) {
        self.slots.retain(|_, bookmark| bookmark.page < page_count);
    }

    pub fn entries(&self) -> Vec<BookmarkEntry> {
        self.iter()
            .map(|(slot, b)| BookmarkEntry {
                slot: slot.get(),
                page: b.page,
                x: b.x,
                y: b.y,
            })
            .collect()
    }

    /// Rebuilds a table, skipping entries with out-of-range slots.
    pub fn from_entries(entries: &[BookmarkEntry]) -> Self {
        let mut table = Self::new();
        for entry in entries {
            if let Some(slot) = BookmarkSlot::new(entry.slot) {
                table.set(
                    slot,
                    Bookmark {
                        page: entry.page,
                        x: entry.x,
                        y: entry.y,
                    },
                );
            }
        }
        table
    }
}
