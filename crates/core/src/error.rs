//! Error taxonomy shared by the Page Turner crates.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Annotation record with a bad count or too few/many lines.
    #[error("malformed annotation record: {0}")]
    MalformedRecord(String),

    /// Piece directory without any recognized page image.
    #[error("no recognized page images in {}", .0.display())]
    EmptyDirectory(PathBuf),

    /// Transfer-by-file target directory cannot be written.
    #[error("transfer target is not writable: {}", .0.display())]
    UnwritableTarget(PathBuf),

    /// Optional scanner capability rejected by the device.
    #[error("device capability unsupported: {0}")]
    DeviceCapabilityUnsupported(String),

    #[error("image transfer failed: {0}")]
    TransferFailure(String),

    /// External converter reported errors; the text is its error stream.
    #[error("external tool failed: {0}")]
    ExternalToolFailure(String),

    #[error("cannot read page image {}: {reason}", .path.display())]
    UnreadableImage { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
