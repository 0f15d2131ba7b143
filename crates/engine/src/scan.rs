//! Scanner acquisition handshake.
//!
//! `Closed -> SourceOpen -> AcquirePending -> Transferring -> SourceOpen`,
//! with `terminate` valid from anywhere. Completion of an acquire is seen
//! either through a ready notification sent from the runtime's own thread
//! (drained on the control thread by [`ScanAcquisitionProtocol::pump`]) or
//! by polling for image info ([`ScanAcquisitionProtocol::poll`]). Both feed
//! the same transfer step.

pub mod folder;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use image::{DynamicImage, ImageReader};
use pageturner_core::{Error, Result};
use tracing::{debug, error, info, warn};

pub const DEFAULT_PRODUCT_NAME: &str = "Page Turner";
pub const DEFAULT_TRANSFER_FILE_NAME: &str = "TWAIN.TMP";
pub const FALLBACK_TRANSFER_FILE_NAME: &str = "twainxfer.jpg";
pub const DEFAULT_RESOLUTION: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    XResolution,
    YResolution,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::XResolution => f.write_str("x-resolution"),
            Capability::YResolution => f.write_str("y-resolution"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

/// Host scanning runtime: hands out source managers.
pub trait ScanRuntime {
    /// `None` when no source manager is available.
    fn open_source_manager(&mut self, product_name: &str) -> Result<Option<Box<dyn SourceManager>>>;
}

pub trait SourceManager {
    /// Opens a data source by name, or interactively when `name` is `None`.
    /// `None` when the user cancels the selection.
    fn open_source(&mut self, name: Option<&str>) -> Result<Option<Box<dyn DataSource>>>;

    /// Installs the channel ready and close-requested notifications go to.
    fn set_notifier(&mut self, notifier: ReadyNotifier);

    fn destroy(&mut self);
}

pub trait DataSource {
    fn name(&self) -> String;

    fn set_capability(&mut self, capability: Capability, value: f64) -> Result<()>;

    fn request_acquire(&mut self, show_ui: bool) -> Result<()>;

    /// `None` while no image is ready.
    fn image_info(&mut self) -> Result<Option<ImageInfo>>;

    fn transfer_natively(&mut self) -> Result<DynamicImage>;

    /// The file the device will write a by-file transfer to, if it names one.
    fn transfer_file_name(&mut self) -> Result<Option<PathBuf>>;

    fn set_transfer_file_name(&mut self, path: &Path) -> Result<()>;

    /// Writes the image to the current transfer file name.
    fn transfer_by_file(&mut self) -> Result<()>;

    /// The page from the last transfer has been written; the source may
    /// discard its copy. Not called when writing the page failed.
    fn finish_transfer(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSignal {
    Ready,
    CloseRequested,
}

/// Sending half handed to the runtime. Safe to use from any thread; signals
/// from a terminated session are dropped on arrival.
#[derive(Debug, Clone)]
pub struct ReadyNotifier {
    tx: Sender<(u64, ScanSignal)>,
    session: u64,
}

impl ReadyNotifier {
    pub fn ready(&self) {
        self.send(ScanSignal::Ready);
    }

    pub fn close_requested(&self) {
        self.send(ScanSignal::CloseRequested);
    }

    fn send(&self, signal: ScanSignal) {
        if self.tx.send((self.session, signal)).is_err() {
            debug!(?signal, "scan protocol gone; dropping signal");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    #[default]
    Notify,
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    Native,
    ByFile,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub product_name: String,
    pub completion: Completion,
    pub transfer: TransferMode,
    /// Directory new pages are written to.
    pub target_dir: PathBuf,
    /// Extension of written pages, including the dot.
    pub suffix: String,
    pub resolution: f64,
    /// Used when the device names no by-file transfer file.
    pub default_transfer_file: PathBuf,
    /// Substituted when the device's transfer file cannot be written.
    pub fallback_transfer_file: PathBuf,
}

impl ScanConfig {
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            completion: Completion::default(),
            transfer: TransferMode::default(),
            target_dir: target_dir.into(),
            suffix: ".gif".to_string(),
            resolution: DEFAULT_RESOLUTION,
            default_transfer_file: PathBuf::from(DEFAULT_TRANSFER_FILE_NAME),
            fallback_transfer_file: std::env::temp_dir().join(FALLBACK_TRANSFER_FILE_NAME),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Closed,
    SourceOpen,
    AcquirePending,
    Transferring,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// One page was written; `page` is the 1-based page counter.
    PageAcquired { path: PathBuf, page: usize },
    /// The transfer failed. The session stays in `AcquirePending` and holds
    /// until `retry_transfer` or `terminate`.
    TransferFailed(String),
    CloseRequested,
}

/// Derives `Page<NN><suffix>` names in a target directory.
#[derive(Debug, Clone)]
pub struct PageNamer {
    dir: PathBuf,
    suffix: String,
    count: usize,
}

impl PageNamer {
    pub fn new(dir: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            suffix: suffix.into(),
            count: 0,
        }
    }

    pub fn page_name(number: usize, suffix: &str) -> String {
        format!("Page{number:02}{suffix}")
    }

    /// Pages written so far.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn next_path(&self) -> PathBuf {
        self.dir.join(Self::page_name(self.count + 1, &self.suffix))
    }

    fn advance(&mut self) -> usize {
        self.count += 1;
        self.count
    }
}

pub struct ScanAcquisitionProtocol {
    runtime: Box<dyn ScanRuntime>,
    config: ScanConfig,
    state: ScanState,
    manager: Option<Box<dyn SourceManager>>,
    source: Option<Box<dyn DataSource>>,
    last_source: Option<String>,
    namer: PageNamer,
    /// Set by a failed transfer; readiness is ignored until the caller decides.
    held: bool,
    session: u64,
    tx: Sender<(u64, ScanSignal)>,
    rx: Receiver<(u64, ScanSignal)>,
}

impl ScanAcquisitionProtocol {
    pub fn new(runtime: Box<dyn ScanRuntime>, config: ScanConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        let namer = PageNamer::new(&config.target_dir, config.suffix.clone());
        Self {
            runtime,
            config,
            state: ScanState::Closed,
            manager: None,
            source: None,
            last_source: None,
            namer,
            held: false,
            session: 0,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn pages_written(&self) -> usize {
        self.namer.count()
    }

    pub fn next_page_path(&self) -> PathBuf {
        self.namer.next_path()
    }

    pub fn source_name(&self) -> Option<&str> {
        self.last_source.as_deref()
    }

    /// `true` after a failed transfer, until `retry_transfer` or `terminate`.
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Opens the source manager and a data source. Returns `false` and stays
    /// `Closed` when no manager is available or the user cancels.
    pub fn open_source(&mut self) -> Result<bool> {
        if let Some(mut source) = self.source.take() {
            source.destroy();
        }
        self.state = ScanState::Closed;
        self.held = false;
        self.next_session();

        if self.manager.is_none() {
            self.manager = self.runtime.open_source_manager(&self.config.product_name)?;
        }
        let Some(manager) = self.manager.as_mut() else {
            warn!("no scanner source manager available");
            return Ok(false);
        };
        manager.set_notifier(ReadyNotifier {
            tx: self.tx.clone(),
            session: self.session,
        });
        let Some(source) = manager.open_source(self.last_source.as_deref())? else {
            info!("source selection cancelled");
            return Ok(false);
        };

        let name = source.name();
        info!(product = %self.config.product_name, source = %name, "scanner source open");
        self.last_source = Some(name);
        self.source = Some(source);
        self.state = ScanState::SourceOpen;
        Ok(true)
    }

    /// Starts an acquisition with the device's own UI. Only valid from
    /// `SourceOpen`; returns `false` otherwise.
    pub fn request_acquire(&mut self) -> Result<bool> {
        if self.state != ScanState::SourceOpen {
            warn!(state = ?self.state, "acquire requested without an open source");
            return Ok(false);
        }
        let Some(source) = self.source.as_mut() else {
            return Ok(false);
        };
        if let Err(err) = source.set_capability(Capability::YResolution, self.config.resolution) {
            warn!("scanning with device defaults: {err}");
        }
        source.request_acquire(true)?;
        self.state = ScanState::AcquirePending;
        info!("waiting for scanner");
        Ok(true)
    }

    /// Drains notifications that arrived from the runtime's thread.
    pub fn pump(&mut self) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        loop {
            let (session, signal) = match self.rx.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            };
            if session != self.session {
                debug!(?signal, session, "dropping signal from a closed session");
                continue;
            }
            match signal {
                ScanSignal::Ready => {
                    if self.config.completion == Completion::Notify
                        && self.state == ScanState::AcquirePending
                        && !self.held
                    {
                        events.push(self.on_ready());
                    }
                }
                ScanSignal::CloseRequested => events.push(ProtocolEvent::CloseRequested),
            }
        }
        events
    }

    /// Checks for a ready image. A no-op unless polling is configured and an
    /// acquire is pending and not held by a failed transfer.
    pub fn poll(&mut self) -> Option<ProtocolEvent> {
        if self.config.completion != Completion::Poll
            || self.state != ScanState::AcquirePending
            || self.held
        {
            return None;
        }
        let source = self.source.as_mut()?;
        match source.image_info() {
            Ok(Some(info)) => {
                debug!(width = info.width, height = info.height, "image ready");
                Some(self.on_ready())
            }
            Ok(None) => None,
            Err(err) => {
                warn!("image info unavailable: {err}");
                None
            }
        }
    }

    /// Repeats the transfer after a failure held the session.
    pub fn retry_transfer(&mut self) -> Option<ProtocolEvent> {
        (self.state == ScanState::AcquirePending && self.held).then(|| self.on_ready())
    }

    /// Releases the source and manager. Safe from any state.
    pub fn terminate(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.destroy();
        }
        if let Some(mut manager) = self.manager.take() {
            manager.destroy();
        }
        if self.state != ScanState::Closed {
            info!("scanner session closed");
        }
        self.state = ScanState::Closed;
        self.held = false;
        self.next_session();
    }

    /// Signals sent under earlier sessions are dropped from here on.
    fn next_session(&mut self) {
        self.session += 1;
        while self.rx.try_recv().is_ok() {}
    }

    fn on_ready(&mut self) -> ProtocolEvent {
        self.state = ScanState::Transferring;
        let target = self.namer.next_path();
        match self.transfer(&target) {
            Ok(()) => {
                let page = self.namer.advance();
                info!(page, path = %target.display(), mode = ?self.config.transfer, "page acquired");
                self.state = ScanState::SourceOpen;
                self.held = false;
                ProtocolEvent::PageAcquired { path: target, page }
            }
            Err(err) => {
                error!(path = %target.display(), mode = ?self.config.transfer, "transfer failed: {err:?}");
                self.state = ScanState::AcquirePending;
                self.held = true;
                ProtocolEvent::TransferFailed(err.to_string())
            }
        }
    }

    fn transfer(&mut self, target: &Path) -> Result<()> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| Error::TransferFailure("no data source".to_string()))?;
        let image = match self.config.transfer {
            TransferMode::Native => source.transfer_natively()?,
            TransferMode::ByFile => {
                let file = resolve_transfer_file(source.as_mut(), &self.config)?;
                source.transfer_by_file()?;
                debug!(file = %file.display(), "image transferred by file");
                decode_file(&file)?
            }
        };
        image.save(target).map_err(|err| {
            Error::TransferFailure(format!("write {}: {err}", target.display()))
        })?;
        source.finish_transfer()
    }
}

impl Drop for ScanAcquisitionProtocol {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Picks the by-file transfer path, substituting the fallback when the
/// device's choice is not writable.
fn resolve_transfer_file(source: &mut dyn DataSource, config: &ScanConfig) -> Result<PathBuf> {
    let named = match source.transfer_file_name() {
        Ok(named) => named,
        Err(err) => {
            debug!("device does not name a transfer file: {err}");
            None
        }
    };
    let file = named.unwrap_or_else(|| config.default_transfer_file.clone());
    if can_write(&file) {
        return Ok(file);
    }
    warn!(
        "{}; using {}",
        Error::UnwritableTarget(file.clone()),
        config.fallback_transfer_file.display()
    );
    let fallback = config.fallback_transfer_file.clone();
    source.set_transfer_file_name(&fallback)?;
    if !can_write(&fallback) {
        return Err(Error::UnwritableTarget(fallback));
    }
    Ok(fallback)
}

/// Tries to create a scratch file next to `file`.
fn can_write(file: &Path) -> bool {
    let dir = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tempfile::tempfile_in(dir).is_ok()
}

fn decode_file(path: &Path) -> Result<DynamicImage> {
    let unreadable = |reason: String| Error::UnreadableImage {
        path: path.to_path_buf(),
        reason,
    };
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|err| unreadable(err.to_string()))
}
