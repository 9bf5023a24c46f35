use thiserror::Error;

use crate::types::JewelryKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("unknown category `{0}`")]
    UnknownCategory(String),
    #[error("category `{0}` has no loaded assets")]
    NotLoaded(String),
    #[error("asset index {index} out of range for `{category}` ({len} assets)")]
    IndexOutOfRange {
        category: String,
        index: usize,
        len: usize,
    },
    #[error("{} selection is locked while try-all is running", .0.label())]
    Locked(JewelryKind),
}

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("select a category first")]
    NoCategory,
    #[error("category `{0}` has no assets to try")]
    EmptyCatalog(String),
    #[error("try-all is already running")]
    AlreadyRunning,
    #[error("failed to capture snapshot: {0}")]
    Capture(#[from] image::ImageError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("gallery is empty")]
    Empty,
    #[error("snapshot index {index} out of range ({len} snapshots)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("failed to package bundle: {0}")]
    Package(#[from] zip::result::ZipError),
    #[error("failed to write bundle: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("share cancelled by user")]
    Cancelled,
    #[error("share failed: {0}")]
    Failed(String),
}
