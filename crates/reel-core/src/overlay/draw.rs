//! Per-frame drawing: title, running timecode, watermark.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::imageops::FilterType;
use image::{Rgb, RgbImage, RgbaImage};
use imageproc::drawing::draw_text_mut;

use super::layout::{format_timecode, Layout, WATERMARK_OPACITY};
use super::CompositeError;

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const SHADOW_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Fonts tried when none is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSansBold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial.ttf",
];

/// The configured font, or the first system font that exists.
pub fn resolve_font(configured: Option<&Path>) -> Result<PathBuf, CompositeError> {
    if let Some(p) = configured {
        return Ok(p.to_path_buf());
    }
    SYSTEM_FONTS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .ok_or_else(|| CompositeError::InvalidAsset {
            path: PathBuf::new(),
            reason: "no font configured and no system font found".to_string(),
        })
}

pub fn load_font(path: &Path) -> Result<FontVec, CompositeError> {
    let bytes = std::fs::read(path).map_err(|e| CompositeError::InvalidAsset {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    FontVec::try_from_vec(bytes).map_err(|e| CompositeError::InvalidAsset {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load `path` and scale it to the layout's watermark height.
pub fn load_watermark(path: &Path, layout: &Layout) -> Result<RgbaImage, CompositeError> {
    let img = image::open(path)
        .map_err(|e| CompositeError::InvalidAsset {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .to_rgba8();
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(CompositeError::InvalidAsset {
            path: path.to_path_buf(),
            reason: "empty image".to_string(),
        });
    }
    let target_h = layout.watermark_height();
    let target_w = ((w as f64 * target_h as f64 / h as f64).round() as u32)
        .clamp(1, layout.width);
    Ok(image::imageops::resize(&img, target_w, target_h, FilterType::Triangle))
}

/// Blend `overlay` onto `frame` at `(x, y)` with per-pixel alpha times `opacity`.
/// Pixels falling outside the frame are skipped.
pub fn blend(frame: &mut RgbImage, overlay: &RgbaImage, x: i32, y: i32, opacity: f32) {
    let (fw, fh) = (frame.width() as i64, frame.height() as i64);
    for (ox, oy, px) in overlay.enumerate_pixels() {
        let fx = x as i64 + ox as i64;
        let fy = y as i64 + oy as i64;
        if fx < 0 || fy < 0 || fx >= fw || fy >= fh {
            continue;
        }
        let alpha = px.0[3] as f32 / 255.0 * opacity;
        if alpha <= 0.0 {
            continue;
        }
        let dst = frame.get_pixel_mut(fx as u32, fy as u32);
        for c in 0..3 {
            let v = dst.0[c] as f32 * (1.0 - alpha) + px.0[c] as f32 * alpha;
            dst.0[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Draws the fixed overlay elements onto each frame.
pub struct Painter {
    layout: Layout,
    font: FontVec,
    title: String,
    timeline: bool,
    watermark: Option<RgbaImage>,
    fps: f64,
}

impl Painter {
    pub fn new(
        layout: Layout,
        font: FontVec,
        title: &str,
        timeline: bool,
        watermark: Option<RgbaImage>,
        fps: f64,
    ) -> Self {
        Self {
            layout,
            font,
            title: title.to_string(),
            timeline,
            watermark,
            fps,
        }
    }

    fn shadowed_text(&self, frame: &mut RgbImage, (x, y): (i32, i32), text: &str) {
        let scale = PxScale::from(self.layout.text_px);
        let off = self.layout.shadow_offset;
        draw_text_mut(frame, SHADOW_COLOR, x + off, y + off, scale, &self.font, text);
        draw_text_mut(frame, TEXT_COLOR, x, y, scale, &self.font, text);
    }

    /// Draw everything for frame number `index` (0-based).
    pub fn paint(&self, frame: &mut RgbImage, index: u64) {
        if !self.title.is_empty() {
            self.shadowed_text(frame, self.layout.title_origin(), &self.title);
        }
        if self.timeline {
            let stamp = format_timecode(index as f64 / self.fps);
            self.shadowed_text(frame, self.layout.timecode_origin(), &stamp);
        }
        if let Some(wm) = &self.watermark {
            let (x, y) = self.layout.watermark_origin(wm.width());
            blend(frame, wm, x, y, WATERMARK_OPACITY);
        }
    }
}
