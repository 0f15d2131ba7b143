//! Device-facing pieces of Page Turner: the scanner acquisition protocol,
//! PDF conversion, and reading page image sizes.

pub mod convert;
pub mod geometry;
pub mod scan;

pub use convert::Converter;
pub use geometry::HeaderGeometry;
pub use scan::folder::FolderScanRuntime;
pub use scan::{
    Capability, Completion, DataSource, ImageInfo, PageNamer, ProtocolEvent, ReadyNotifier,
    ScanAcquisitionProtocol, ScanConfig, ScanRuntime, ScanSignal, ScanState, SourceManager,
    TransferMode,
};
