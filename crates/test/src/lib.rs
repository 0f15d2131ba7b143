//! Test helpers and fixtures.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::{DynamicImage, Rgb, RgbImage};
use pageturner_core::{Error, PageGeometry, Result, Settings, ViewMode};
use pageturner_engine::{Capability, DataSource, ImageInfo, ReadyNotifier, ScanRuntime, SourceManager};

pub fn make_settings(view_mode: ViewMode, scroll_amount: f64) -> Settings {
    Settings {
        view_mode,
        scroll_amount,
        ..Settings::default()
    }
}

/// Creates `root/name` holding the given files, all empty.
pub fn piece_dir(root: &Path, name: &str, files: &[&str]) -> anyhow::Result<PathBuf> {
    let dir = root.join(name);
    fs::create_dir_all(&dir)?;
    for file in files {
        fs::write(dir.join(file), b"")?;
    }
    Ok(dir)
}

/// Writes a blank page image; the format follows the extension.
pub fn write_page(dir: &Path, name: &str, width: u32, height: u32) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    RgbImage::from_pixel(width, height, Rgb([255, 255, 255])).save(&path)?;
    Ok(path)
}

/// Page sizes by file name, with one size for everything else.
#[derive(Debug, Clone)]
pub struct FixedGeometry {
    sizes: HashMap<String, (u32, u32)>,
    default: (u32, u32),
}

impl FixedGeometry {
    pub fn uniform(width: u32, height: u32) -> Self {
        Self {
            sizes: HashMap::new(),
            default: (width, height),
        }
    }

    pub fn with_page(mut self, name: &str, width: u32, height: u32) -> Self {
        self.sizes.insert(name.to_string(), (width, height));
        self
    }
}

impl PageGeometry for FixedGeometry {
    fn page_size(&self, path: &Path) -> Result<(u32, u32)> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(self.sizes.get(&name).copied().unwrap_or(self.default))
    }
}

#[derive(Debug, Default)]
struct ScannerState {
    notifier: Option<ReadyNotifier>,
    acquires: usize,
    transfers: usize,
    destroyed: usize,
    failing_transfers: usize,
}

/// A scanner runtime driven from the test: it notifies on request and
/// hands out a small white page per transfer.
#[derive(Debug, Clone, Default)]
pub struct ScriptedScanner {
    state: Rc<RefCell<ScannerState>>,
}

impl ScriptedScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runtime(&self) -> Box<dyn ScanRuntime> {
        Box::new(self.clone())
    }

    /// Delivers a ready notification from another thread.
    pub fn notify_ready(&self) {
        let notifier = self.state.borrow().notifier.clone();
        if let Some(notifier) = notifier {
            let _ = std::thread::spawn(move || notifier.ready()).join();
        }
    }

    pub fn fail_next_transfers(&self, count: usize) {
        self.state.borrow_mut().failing_transfers = count;
    }

    pub fn acquires(&self) -> usize {
        self.state.borrow().acquires
    }

    pub fn transfers(&self) -> usize {
        self.state.borrow().transfers
    }

    pub fn destroyed(&self) -> usize {
        self.state.borrow().destroyed
    }
}

impl ScanRuntime for ScriptedScanner {
    fn open_source_manager(&mut self, _product_name: &str) -> Result<Option<Box<dyn SourceManager>>> {
        Ok(Some(Box::new(self.clone())))
    }
}

impl SourceManager for ScriptedScanner {
    fn open_source(&mut self, _name: Option<&str>) -> Result<Option<Box<dyn DataSource>>> {
        Ok(Some(Box::new(self.clone())))
    }

    fn set_notifier(&mut self, notifier: ReadyNotifier) {
        self.state.borrow_mut().notifier = Some(notifier);
    }

    fn destroy(&mut self) {
        self.state.borrow_mut().destroyed += 1;
    }
}

impl DataSource for ScriptedScanner {
    fn name(&self) -> String {
        "Scripted Scanner".to_string()
    }

    fn set_capability(&mut self, capability: Capability, _value: f64) -> Result<()> {
        Err(Error::DeviceCapabilityUnsupported(capability.to_string()))
    }

    fn request_acquire(&mut self, _show_ui: bool) -> Result<()> {
        self.state.borrow_mut().acquires += 1;
        Ok(())
    }

    fn image_info(&mut self) -> Result<Option<ImageInfo>> {
        Ok(Some(ImageInfo {
            width: 17,
            height: 22,
        }))
    }

    fn transfer_natively(&mut self) -> Result<DynamicImage> {
        let mut state = self.state.borrow_mut();
        if state.failing_transfers > 0 {
            state.failing_transfers -= 1;
            return Err(Error::TransferFailure("device busy".to_string()));
        }
        state.transfers += 1;
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(17, 22, Rgb([255, 255, 255]))))
    }

    fn transfer_file_name(&mut self) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    fn set_transfer_file_name(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn transfer_by_file(&mut self) -> Result<()> {
        Err(Error::TransferFailure("by-file transfer not scripted".to_string()))
    }

    fn destroy(&mut self) {
        self.state.borrow_mut().destroyed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_settings() {
        let settings = make_settings(ViewMode::FitWidth, 120.0);
        assert_eq!(settings.view_mode, ViewMode::FitWidth);
        assert_eq!(settings.scroll_amount, 120.0);
    }

    #[test]
    fn fixed_geometry_prefers_named_pages() -> anyhow::Result<()> {
        let geometry = FixedGeometry::uniform(612, 792).with_page("Page02.gif", 850, 1100);
        assert_eq!(geometry.page_size(Path::new("/x/Page01.gif"))?, (612, 792));
        assert_eq!(geometry.page_size(Path::new("/x/Page02.gif"))?, (850, 1100));
        Ok(())
    }
}
