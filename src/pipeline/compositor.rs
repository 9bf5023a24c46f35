use std::time::Instant;

use anyhow::{Context, Result};
use fast_image_resize as fir;
use image::{
    RgbaImage,
    error::{ParameterError, ParameterErrorKind},
};
use rayon::prelude::*;

use crate::{
    catalog::Asset,
    config::OverlayConfig,
    gallery::Snapshot,
    types::{Frame, JewelryKind, Landmark},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayPlacement {
    pub kind: JewelryKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Face anchor points in surface pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceAnchors {
    pub left_ear: (f32, f32),
    pub right_ear: (f32, f32),
    pub neck: (f32, f32),
    pub ear_distance: f32,
}

impl FaceAnchors {
    pub fn project(
        landmarks: &[Landmark],
        config: &OverlayConfig,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        let left_ear = landmarks.get(config.left_ear_index)?.to_pixels(width, height);
        let right_ear = landmarks.get(config.right_ear_index)?.to_pixels(width, height);
        let neck = landmarks.get(config.neck_index)?.to_pixels(width, height);
        let ear_distance = (right_ear.0 - left_ear.0).hypot(right_ear.1 - left_ear.1);

        Some(Self {
            left_ear,
            right_ear,
            neck,
            ear_distance,
        })
    }

    /// Both earrings hang from the ear anchors, horizontally centred on them.
    pub fn earrings(&self, config: &OverlayConfig, native: (u32, u32)) -> [OverlayPlacement; 2] {
        let width = self.ear_distance * config.earring_scale;
        let height = scaled_height(width, native);
        let at = |(x, y): (f32, f32)| OverlayPlacement {
            kind: JewelryKind::Earring,
            x: x - width / 2.0,
            y,
            width,
            height,
        };
        [at(self.left_ear), at(self.right_ear)]
    }

    pub fn necklace(&self, config: &OverlayConfig, native: (u32, u32)) -> OverlayPlacement {
        let width = self.ear_distance * config.necklace_scale;
        OverlayPlacement {
            kind: JewelryKind::Necklace,
            x: self.neck.0 - width / 2.0,
            y: self.neck.1 + self.ear_distance * config.necklace_drop,
            width,
            height: scaled_height(width, native),
        }
    }
}

fn scaled_height(width: f32, (native_w, native_h): (u32, u32)) -> f32 {
    if native_w == 0 {
        return 0.0;
    }
    width * (native_h as f32 / native_w as f32)
}

#[derive(Clone, Debug)]
pub struct CompositedFrame {
    pub image: RgbaImage,
    pub overlays: Vec<OverlayPlacement>,
    pub timestamp: Instant,
}

/// Owns the single output surface. Every cycle starts from the raw frame, so overlays from an
/// earlier cycle never survive into a frame without a detected face.
pub struct Compositor {
    config: OverlayConfig,
    surface: RgbaImage,
    resizer: fir::Resizer,
}

impl Compositor {
    pub fn new(config: OverlayConfig) -> Self {
        Self {
            config,
            surface: RgbaImage::new(0, 0),
            resizer: fir::Resizer::new(),
        }
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// Encode the current surface. Fails while nothing has been composed.
    pub fn snapshot(&self) -> Result<Snapshot, image::ImageError> {
        if self.surface.width() == 0 || self.surface.height() == 0 {
            return Err(image::ImageError::Parameter(ParameterError::from_kind(
                ParameterErrorKind::DimensionMismatch,
            )));
        }
        Snapshot::encode(&self.surface)
    }

    /// Draw one face-detector cycle. `face` is empty when no face was found.
    ///
    /// Returns `None` for a frame whose buffer does not match its dimensions; the surface is
    /// emptied so nothing from an earlier cycle can be shown or captured.
    pub fn compose(
        &mut self,
        frame: &Frame,
        face: &[Landmark],
        earring: Option<&Asset>,
        necklace: Option<&Asset>,
    ) -> Option<Vec<OverlayPlacement>> {
        if !frame.is_consistent() {
            log::warn!(
                "skipping frame with mismatched buffer: {} bytes for {}x{}",
                frame.rgba.len(),
                frame.width,
                frame.height
            );
            self.surface = RgbaImage::new(0, 0);
            return None;
        }

        if self.surface.dimensions() != (frame.width, frame.height) {
            log::debug!("resizing output surface to {}x{}", frame.width, frame.height);
            self.surface = RgbaImage::new(frame.width, frame.height);
        }
        self.surface.copy_from_slice(&frame.rgba);

        let (width, height) = self.surface.dimensions();
        let Some(anchors) = FaceAnchors::project(face, &self.config, width, height) else {
            return Some(Vec::new());
        };

        let mut drawn = Vec::new();
        if let Some((asset, image)) = earring.and_then(|a| a.image().map(|img| (a, img))) {
            for placement in anchors.earrings(&self.config, image.dimensions()) {
                if self.draw(asset, image, &placement) {
                    drawn.push(placement);
                }
            }
        }
        if let Some((asset, image)) = necklace.and_then(|a| a.image().map(|img| (a, img))) {
            let placement = anchors.necklace(&self.config, image.dimensions());
            if self.draw(asset, image, &placement) {
                drawn.push(placement);
            }
        }
        Some(drawn)
    }

    fn draw(&mut self, asset: &Asset, image: &RgbaImage, placement: &OverlayPlacement) -> bool {
        let box_w = placement.width.round() as i64;
        let box_h = placement.height.round() as i64;
        if box_w <= 0 || box_h <= 0 {
            return false;
        }
        let x0 = placement.x.round() as i64;
        let y0 = placement.y.round() as i64;

        // Only the part of the box that overlaps the surface is resized.
        let left = x0.max(0);
        let top = y0.max(0);
        let right = x0.saturating_add(box_w).min(self.surface.width() as i64);
        let bottom = y0.saturating_add(box_h).min(self.surface.height() as i64);
        if left >= right || top >= bottom {
            return false;
        }
        let (visible_w, visible_h) = ((right - left) as u32, (bottom - top) as u32);

        let scale_x = image.width() as f64 / box_w as f64;
        let scale_y = image.height() as f64 / box_h as f64;
        let crop = SourceCrop {
            left: (left - x0) as f64 * scale_x,
            top: (top - y0) as f64 * scale_y,
            width: visible_w as f64 * scale_x,
            height: visible_h as f64 * scale_y,
        };

        match scale_rgba(&mut self.resizer, image, &crop, visible_w, visible_h) {
            Ok(scaled) => {
                blend_onto(&mut self.surface, &scaled, visible_w, visible_h, left, top);
                true
            }
            Err(err) => {
                log::warn!(
                    "failed to scale {} #{} for overlay: {err:?}",
                    asset.category(),
                    asset.index()
                );
                false
            }
        }
    }
}

/// Region of the source image, in source pixels, that maps onto the visible overlay.
#[derive(Clone, Copy, Debug, PartialEq)]
struct SourceCrop {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

impl SourceCrop {
    fn is_whole(&self, image: &RgbaImage) -> bool {
        self.left == 0.0
            && self.top == 0.0
            && self.width == image.width() as f64
            && self.height == image.height() as f64
    }
}

fn scale_rgba(
    resizer: &mut fir::Resizer,
    image: &RgbaImage,
    crop: &SourceCrop,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    if crop.is_whole(image) && image.dimensions() == (width, height) {
        return Ok(image.as_raw().clone());
    }

    let src_image = fir::images::Image::from_vec_u8(
        image.width(),
        image.height(),
        image.as_raw().clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(width, height, fir::PixelType::U8x4);
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear))
        .crop(crop.left, crop.top, crop.width, crop.height);
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    Ok(dst_image.into_vec())
}

/// Source-over blend of an RGBA overlay at (`x0`, `y0`), clipped to the surface.
fn blend_onto(surface: &mut RgbaImage, overlay: &[u8], width: u32, height: u32, x0: i64, y0: i64) {
    let surface_w = surface.width() as i64;
    let stride = surface.width() as usize * 4;
    if stride == 0 {
        return;
    }

    surface
        .par_chunks_exact_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let oy = y as i64 - y0;
            if oy < 0 || oy >= height as i64 {
                return;
            }
            for ox in 0..width as i64 {
                let sx = x0 + ox;
                if sx < 0 || sx >= surface_w {
                    continue;
                }
                let src_idx = ((oy * width as i64 + ox) as usize) * 4;
                let dst_idx = sx as usize * 4;
                let src = &overlay[src_idx..src_idx + 4];
                blend_pixel(&mut row[dst_idx..dst_idx + 4], src);
            }
        });
}

fn blend_pixel(dst: &mut [u8], src: &[u8]) {
    let alpha = src[3] as u32;
    match alpha {
        0 => {}
        255 => dst.copy_from_slice(src),
        _ => {
            let inv = 255 - alpha;
            for c in 0..3 {
                dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * inv + 127) / 255) as u8;
            }
            dst[3] = (alpha + (dst[3] as u32 * inv + 127) / 255).min(255) as u8;
        }
    }
}
