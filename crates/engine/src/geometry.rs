use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pageturner_core::{Error, PageGeometry, Result};

/// Reads page dimensions from image headers, remembering each answer.
#[derive(Debug, Default)]
pub struct HeaderGeometry {
    sizes: RefCell<HashMap<PathBuf, (u32, u32)>>,
}

impl HeaderGeometry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageGeometry for HeaderGeometry {
    fn page_size(&self, path: &Path) -> Result<(u32, u32)> {
        if let Some(size) = self.sizes.borrow().get(path) {
            return Ok(*size);
        }
        let size = image::image_dimensions(path).map_err(|err| Error::UnreadableImage {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        self.sizes.borrow_mut().insert(path.to_path_buf(), size);
        Ok(size)
    }

    fn forget(&self, path: &Path) {
        self.sizes.borrow_mut().remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn reads_and_caches_dimensions() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Page01.png");
        RgbImage::from_pixel(30, 40, Rgb([0, 0, 0])).save(&path)?;

        let headers = HeaderGeometry::new();
        assert_eq!(headers.page_size(&path)?, (30, 40));
        std::fs::remove_file(&path)?;
        assert_eq!(headers.page_size(&path)?, (30, 40));
        headers.forget(&path);
        assert!(headers.page_size(&path).is_err());
        Ok(())
    }

    #[test]
    fn pdf_pages_are_unreadable() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("score.pdf");
        std::fs::write(&path, b"%PDF-1.4\n")?;
        assert!(matches!(
            HeaderGeometry::new().page_size(&path),
            Err(Error::UnreadableImage { .. })
        ));
        Ok(())
    }
}
