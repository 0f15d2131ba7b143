//! Directory-backed page listing.

use std::fs;
use std::path::Path;

use pageturner_core::{Error, Result};

pub const RECOGNIZED_EXTENSIONS: [&str; 7] = ["gif", "bmp", "tiff", "jpeg", "jpg", "png", "pdf"];

pub fn is_recognized(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            RECOGNIZED_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Lists the page images of a piece directory in filename order.
///
/// Acquisition names pages `PageNN.ext`, so filename order is page order for
/// up to 99 pages.
pub fn list_pages(dir: &Path) -> Result<Vec<String>> {
    let mut pages = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || !is_recognized(&path) {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => pages.push(name),
            Err(name) => {
                tracing::debug!(?name, "skipping page with non-utf8 file name");
            }
        }
    }
    if pages.is_empty() {
        return Err(Error::EmptyDirectory(dir.to_path_buf()));
    }
    pages.sort();
    Ok(pages)
}
