//! Output geometry and overlay anchor positions.

use super::CompositeError;

/// Title and timecode glyph height as a fraction of frame height.
const TEXT_HEIGHT_FRACTION: f32 = 0.06;
const MIN_TEXT_PX: f32 = 12.0;
/// Edge margin as a fraction of frame height.
const MARGIN_FRACTION: f32 = 0.03;
/// Watermark height as a fraction of frame height.
pub const WATERMARK_HEIGHT_FRACTION: f32 = 0.15;
/// Fixed blend weight of the watermark over the frame.
pub const WATERMARK_OPACITY: f32 = 0.5;

/// Output frame size: scaled down to `max_height` if the source is taller,
/// aspect ratio kept, both sides even (4:2:0 chroma subsampling).
pub fn output_dimensions(
    width: u32,
    height: u32,
    max_height: Option<u32>,
) -> Result<(u32, u32), CompositeError> {
    let unsupported = || CompositeError::UnsupportedDimensions { width, height };
    if width < 2 || height < 2 {
        return Err(unsupported());
    }
    let target_h = match max_height {
        Some(max) if height > max => max,
        _ => height,
    };
    let target_h = target_h & !1;
    if target_h < 2 {
        return Err(unsupported());
    }
    let target_w = if target_h == height {
        width & !1
    } else {
        let exact = width as f64 * target_h as f64 / height as f64;
        ((exact / 2.0).round() as u32) * 2
    };
    if target_w < 2 {
        return Err(unsupported());
    }
    Ok((target_w, target_h))
}

/// `mm:ss` for a position in seconds. Minutes are not wrapped at 60.
pub fn format_timecode(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Pixel positions for one output size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub text_px: f32,
    pub margin: i32,
    pub shadow_offset: i32,
}

impl Layout {
    pub fn new(width: u32, height: u32) -> Self {
        let h = height as f32;
        let text_px = (h * TEXT_HEIGHT_FRACTION).max(MIN_TEXT_PX);
        Self {
            width,
            height,
            text_px,
            margin: ((h * MARGIN_FRACTION).round() as i32).max(4),
            shadow_offset: ((text_px / 16.0).round() as i32).max(1),
        }
    }

    pub fn title_origin(&self) -> (i32, i32) {
        (self.margin, self.margin)
    }

    pub fn timecode_origin(&self) -> (i32, i32) {
        let y = self.height as i32 - self.margin - self.text_px.ceil() as i32;
        (self.margin, y.max(0))
    }

    /// Target watermark height in pixels.
    pub fn watermark_height(&self) -> u32 {
        ((self.height as f32 * WATERMARK_HEIGHT_FRACTION).round() as u32).max(1)
    }

    /// Top-left corner for a watermark of `wm_width` pixels.
    pub fn watermark_origin(&self, wm_width: u32) -> (i32, i32) {
        let x = self.width as i32 - self.margin - wm_width as i32;
        (x.max(0), self.margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_1080p_to_360() {
        assert_eq!(output_dimensions(1920, 1080, Some(360)).unwrap(), (640, 360));
        assert_eq!(output_dimensions(1920, 1080, Some(720)).unwrap(), (1280, 720));
    }

    #[test]
    fn shorter_sources_keep_size() {
        assert_eq!(output_dimensions(640, 360, Some(720)).unwrap(), (640, 360));
        assert_eq!(output_dimensions(640, 360, None).unwrap(), (640, 360));
    }

    #[test]
    fn odd_sizes_round_to_even() {
        assert_eq!(output_dimensions(641, 361, None).unwrap(), (640, 360));
        // 853.33 wide at 480 rounds to the nearest even width.
        assert_eq!(output_dimensions(1280, 720, Some(480)).unwrap(), (854, 480));
        assert_eq!(output_dimensions(1280, 720, Some(481)).unwrap(), (854, 480));
    }

    #[test]
    fn degenerate_sizes_are_rejected() {
        assert!(matches!(
            output_dimensions(0, 1080, None),
            Err(CompositeError::UnsupportedDimensions { .. })
        ));
        assert!(output_dimensions(1, 1, None).is_err());
        assert!(output_dimensions(4000, 2, Some(1)).is_err());
    }

    #[test]
    fn timecodes() {
        assert_eq!(format_timecode(0.0), "00:00");
        assert_eq!(format_timecode(59.99), "00:59");
        assert_eq!(format_timecode(61.0), "01:01");
        assert_eq!(format_timecode(3600.0 + 5.0), "60:05");
        assert_eq!(format_timecode(f64::NAN), "00:00");
        assert_eq!(format_timecode(-3.0), "00:00");
    }

    #[test]
    fn anchors_stay_inside_frame() {
        let l = Layout::new(640, 360);
        assert_eq!(l.title_origin(), (l.margin, l.margin));
        let (_, ty) = l.timecode_origin();
        assert!(ty + l.text_px as i32 <= 360);
        assert_eq!(l.watermark_height(), 54);
        let (wx, wy) = l.watermark_origin(100);
        assert_eq!(wx + 100 + l.margin, 640);
        assert_eq!(wy, l.margin);
    }
}
