//! A scan runtime backed by an inbox directory.
//!
//! Each recognized image dropped into the inbox counts as one scanned page,
//! taken in file-name order. Useful with scanners that save to a folder, and
//! for exercising the protocol without hardware.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use image::DynamicImage;
use pageturner_core::{Error, Result};
use tracing::{debug, warn};

use super::{Capability, DataSource, ImageInfo, ReadyNotifier, ScanRuntime, SourceManager};

pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(200);

/// Name the folder device gives its by-file transfer file, inside the inbox.
pub const INBOX_TRANSFER_FILE_NAME: &str = "TWAIN.TMP";

#[derive(Debug, Clone)]
pub struct FolderScanRuntime {
    inbox: PathBuf,
    interval: Duration,
}

impl FolderScanRuntime {
    pub fn new(inbox: impl Into<PathBuf>) -> Self {
        Self {
            inbox: inbox.into(),
            interval: DEFAULT_WATCH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl ScanRuntime for FolderScanRuntime {
    fn open_source_manager(&mut self, product_name: &str) -> Result<Option<Box<dyn SourceManager>>> {
        if !self.inbox.is_dir() {
            warn!(inbox = %self.inbox.display(), "scan inbox is not a directory");
            return Ok(None);
        }
        debug!(product_name, inbox = %self.inbox.display(), "folder source manager");
        Ok(Some(Box::new(FolderSourceManager {
            inbox: self.inbox.clone(),
            interval: self.interval,
            notifier: None,
        })))
    }
}

struct FolderSourceManager {
    inbox: PathBuf,
    interval: Duration,
    notifier: Option<ReadyNotifier>,
}

impl SourceManager for FolderSourceManager {
    fn open_source(&mut self, _name: Option<&str>) -> Result<Option<Box<dyn DataSource>>> {
        Ok(Some(Box::new(FolderSource {
            inbox: self.inbox.clone(),
            interval: self.interval,
            notifier: self.notifier.clone(),
            transfer_file: None,
            handed_out: None,
            watcher: None,
        })))
    }

    fn set_notifier(&mut self, notifier: ReadyNotifier) {
        self.notifier = Some(notifier);
    }

    fn destroy(&mut self) {
        self.notifier = None;
    }
}

struct Watcher {
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Watcher {
    fn stop(self) {
        self.cancelled.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            warn!("inbox watcher panicked");
        }
    }
}

struct FolderSource {
    inbox: PathBuf,
    interval: Duration,
    notifier: Option<ReadyNotifier>,
    transfer_file: Option<PathBuf>,
    /// Inbox file of the last transfer, removed once the page is written.
    handed_out: Option<PathBuf>,
    watcher: Option<Watcher>,
}

impl FolderSource {
    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
    }

    fn take_next(&self) -> Result<PathBuf> {
        next_image(&self.inbox)?
            .ok_or_else(|| Error::TransferFailure(format!("{} is empty", self.inbox.display())))
    }
}

impl DataSource for FolderSource {
    fn name(&self) -> String {
        format!("Folder {}", self.inbox.display())
    }

    fn set_capability(&mut self, capability: Capability, _value: f64) -> Result<()> {
        Err(Error::DeviceCapabilityUnsupported(capability.to_string()))
    }

    fn request_acquire(&mut self, _show_ui: bool) -> Result<()> {
        self.stop_watcher();
        let Some(notifier) = self.notifier.clone() else {
            return Ok(());
        };
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let inbox = self.inbox.clone();
        let interval = self.interval;
        let handle = std::thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                match next_image(&inbox) {
                    Ok(Some(path)) => {
                        debug!(path = %path.display(), "inbox image ready");
                        notifier.ready();
                        return;
                    }
                    Ok(None) => {}
                    Err(err) => warn!("inbox watch: {err}"),
                }
                std::thread::sleep(interval);
            }
        });
        self.watcher = Some(Watcher { cancelled, handle });
        Ok(())
    }

    fn image_info(&mut self) -> Result<Option<ImageInfo>> {
        let Some(path) = next_image(&self.inbox)? else {
            return Ok(None);
        };
        match image::image_dimensions(&path) {
            Ok((width, height)) => Ok(Some(ImageInfo { width, height })),
            // Probably still being written.
            Err(err) => {
                debug!(path = %path.display(), "not readable yet: {err}");
                Ok(None)
            }
        }
    }

    fn transfer_natively(&mut self) -> Result<DynamicImage> {
        let path = self.take_next()?;
        let image = image::open(&path).map_err(|err| Error::UnreadableImage {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        self.handed_out = Some(path);
        Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
    }

    fn transfer_file_name(&mut self) -> Result<Option<PathBuf>> {
        Ok(Some(
            self.transfer_file
                .clone()
                .unwrap_or_else(|| self.inbox.join(INBOX_TRANSFER_FILE_NAME)),
        ))
    }

    fn set_transfer_file_name(&mut self, path: &Path) -> Result<()> {
        self.transfer_file = Some(path.to_path_buf());
        Ok(())
    }

    fn transfer_by_file(&mut self) -> Result<()> {
        let path = self.take_next()?;
        let target = self
            .transfer_file
            .clone()
            .unwrap_or_else(|| self.inbox.join(INBOX_TRANSFER_FILE_NAME));
        fs::copy(&path, &target)?;
        self.handed_out = Some(path);
        Ok(())
    }

    fn finish_transfer(&mut self) -> Result<()> {
        if let Some(path) = self.handed_out.take() {
            debug!(path = %path.display(), "inbox image consumed");
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn destroy(&mut self) {
        self.stop_watcher();
    }
}

impl Drop for FolderSource {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

/// First image in the inbox by file name. PDFs are not scans.
fn next_image(inbox: &Path) -> Result<Option<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(inbox)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if pageturner_storage::is_recognized(&path) && !is_pdf {
            images.push(path);
        }
    }
    images.sort();
    Ok(images.into_iter().next())
}
