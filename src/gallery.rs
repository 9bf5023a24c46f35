use std::{
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use image::{ImageEncoder, RgbaImage, codecs::png::PngEncoder};
use zip::{CompressionMethod, DateTime, ZipWriter, write::SimpleFileOptions};

use crate::{
    config::ExportConfig,
    error::{GalleryError, ShareError},
};

/// PNG-encoded still of one composited frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Snapshot {
    png: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl Snapshot {
    pub fn encode(image: &RgbaImage) -> Result<Self, image::ImageError> {
        let (width, height) = image.dimensions();
        let mut png = Vec::new();
        PngEncoder::new(&mut png).write_image(
            image.as_raw(),
            width,
            height,
            image::ExtendedColorType::Rgba8,
        )?;
        Ok(Self {
            png: png.into(),
            width,
            height,
        })
    }

    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn decode(&self) -> Result<RgbaImage, image::ImageError> {
        let image = image::load_from_memory_with_format(&self.png, image::ImageFormat::Png)?;
        Ok(image.to_rgba8())
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.png.len())
            .finish()
    }
}

// PNG data is already compressed; store it as is.
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(DateTime::default())
}

/// Zip archive with one entry per snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bundle {
    pub file_name: String,
    pub entries: Vec<String>,
    pub bytes: Vec<u8>,
}

impl Bundle {
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, GalleryError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes)?;
        log::info!("wrote {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareRequest {
    pub title: String,
    pub text: String,
    pub url: String,
}

/// Platform sharing capability, if the host has one.
pub trait ShareTarget {
    fn share(&self, request: &ShareRequest) -> Result<(), ShareError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    Cancelled,
    Failed(String),
    Unsupported,
}

/// Snapshots from one try-all run, with a display focus.
#[derive(Clone, Debug)]
pub struct Gallery {
    snapshots: Vec<Snapshot>,
    focus: usize,
    open: bool,
}

impl Gallery {
    pub fn new(snapshots: Vec<Snapshot>) -> Self {
        Self {
            snapshots,
            focus: 0,
            open: true,
        }
    }

    pub fn list(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.focus = 0;
        self.open = false;
    }

    pub fn select(&mut self, index: usize) -> Result<&Snapshot, GalleryError> {
        let len = self.snapshots.len();
        let snapshot = self
            .snapshots
            .get(index)
            .ok_or(GalleryError::IndexOutOfRange { index, len })?;
        self.focus = index;
        Ok(snapshot)
    }

    pub fn focused(&self) -> Option<&Snapshot> {
        self.snapshots.get(self.focus)
    }

    pub fn focus_index(&self) -> usize {
        self.focus
    }

    /// Build the downloadable archive. Entry timestamps are fixed, so packaging the same
    /// snapshots twice gives identical bytes.
    pub fn package(&self, config: &ExportConfig) -> Result<Bundle, GalleryError> {
        if self.snapshots.is_empty() {
            return Err(GalleryError::Empty);
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut entries = Vec::with_capacity(self.snapshots.len());

        for (i, snapshot) in self.snapshots.iter().enumerate() {
            let name = format!("{}{}.png", config.entry_prefix, i + 1);
            writer.start_file(name.as_str(), entry_options())?;
            writer.write_all(snapshot.png())?;
            entries.push(name);
        }

        let bytes = writer.finish()?.into_inner();
        log::info!(
            "packaged {} snapshots into {} ({} bytes)",
            entries.len(),
            config.bundle_name,
            bytes.len()
        );

        Ok(Bundle {
            file_name: config.bundle_name.clone(),
            entries,
            bytes,
        })
    }

    pub fn share(&self, target: Option<&dyn ShareTarget>, config: &ExportConfig) -> ShareOutcome {
        let Some(target) = target else {
            log::warn!("sharing is not supported here; use the downloaded bundle instead");
            return ShareOutcome::Unsupported;
        };

        let request = ShareRequest {
            title: config.share_title.clone(),
            text: config.share_text.clone(),
            url: config.share_url.clone(),
        };
        match target.share(&request) {
            Ok(()) => ShareOutcome::Shared,
            Err(ShareError::Cancelled) => {
                log::info!("share cancelled");
                ShareOutcome::Cancelled
            }
            Err(ShareError::Failed(reason)) => {
                log::warn!("share failed: {reason}");
                ShareOutcome::Failed(reason)
            }
        }
    }
}
