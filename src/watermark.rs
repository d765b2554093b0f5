//! Text watermark compositing.
//!
//! The watermark is drawn onto a transparent overlay the size of the image:
//! eight copies of the text offset by one pixel in black form the stroke, and
//! a final copy in the configured color sits on top. The overlay is then
//! alpha-composited onto the base image.
//!
//! ```rust
//! use image::{DynamicImage, RgbImage};
//! use photo_watermark::font::{FontCandidates, FontResolver};
//! use photo_watermark::watermark::{WatermarkConfig, Watermarker};
//!
//! let watermarker = Watermarker::new(FontResolver::new(FontCandidates::none()));
//! let image = DynamicImage::ImageRgb8(RgbImage::new(400, 300));
//!
//! let mut config = WatermarkConfig::default();
//! config.text = "2022-11-03".into();
//! config.position = (1.0, 1.0);
//!
//! let (stamped, placement) = watermarker.apply(&image, &config).unwrap();
//! assert_eq!(stamped.dimensions(), (400, 300));
//! assert!(placement.origin.0 + placement.text_size.0 <= 400);
//! ```

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, Rgba, RgbImage, RgbaImage, imageops};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::font::{FontResolver, WatermarkFont};
use crate::layout::{self, CharCountWrap, TextWrap};

/// Context attached to every compositing, encoding or save failure.
pub const WATERMARK_FAILED: &str = "Watermark operation failed";

/// Auto font size never goes below this.
pub const MIN_AUTO_FONT_SIZE: u32 = 20;

/// Outline thickness in pixels.
const STROKE_WIDTH: i32 = 1;
const STROKE_COLOR: [u8; 3] = [0, 0, 0];

const JPEG_QUALITY: u8 = 95;

/// Everything needed to stamp one image.
///
/// Passed by reference into each call and never retained, so callers may
/// change text or position between images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    pub text: String,
    /// 0 (invisible) to 100 (opaque).
    pub opacity: u8,
    /// Anchor as fractions of the free space `(W - textW, H - textH)`.
    pub position: (f32, f32),
    /// Font size in pixels; `None` picks one from the image size.
    pub font_size: Option<u32>,
    pub text_color: [u8; 3],
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            text: "Watermark Text".to_string(),
            opacity: 50,
            position: (0.5, 0.5),
            font_size: None,
            text_color: [255, 255, 0],
        }
    }
}

impl WatermarkConfig {
    /// Set opacity, clamped to `0..=100`.
    pub fn set_opacity(&mut self, opacity: i32) {
        self.opacity = opacity.clamp(0, 100) as u8;
    }

    /// Set the relative position, each component clamped to `0.0..=1.0`.
    pub fn set_position(&mut self, x: f32, y: f32) {
        self.position = (clamp_unit(x), clamp_unit(y));
    }

    /// Alpha value used for both stroke and fill.
    pub fn alpha(&self) -> u8 {
        opacity_to_alpha(self.opacity)
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() { 0.5 } else { v.clamp(0.0, 1.0) }
}

/// `round(255 * opacity / 100)`, with opacity clamped to 100.
pub fn opacity_to_alpha(opacity: u8) -> u8 {
    let opacity = u32::from(opacity.min(100));
    ((255 * opacity + 50) / 100) as u8
}

/// `max(20, min(width, height) / 10)`.
pub fn auto_font_size(width: u32, height: u32) -> u32 {
    (width.min(height) / 10).max(MIN_AUTO_FONT_SIZE)
}

/// Map a relative position to the top-left pixel of the text block.
///
/// The result always lies in `[0, W - textW] x [0, H - textH]`; out-of-range
/// fractions are clamped, and a block larger than the image pins to 0.
pub fn resolve_origin(image: (u32, u32), text: (u32, u32), relative: (f32, f32)) -> (u32, u32) {
    let axis = |extent: u32, size: u32, rel: f32| -> u32 {
        let free = extent.saturating_sub(size);
        let pos = (f64::from(free) * f64::from(clamp_unit(rel))).floor();
        (pos.max(0.0) as u32).min(free)
    };
    (
        axis(image.0, text.0, relative.0),
        axis(image.1, text.1, relative.1),
    )
}

/// Output encoding for exported images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    /// Flattened to RGB, quality 95.
    Jpeg,
    /// Alpha channel kept.
    Png,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Where and how big the watermark ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Top-left corner of the text block in pixels.
    pub origin: (u32, u32),
    /// Measured text block size in pixels.
    pub text_size: (u32, u32),
    pub font_size: u32,
    /// The text after wrapping, lines joined with `\n`.
    pub wrapped_text: String,
}

/// Applies text watermarks. Holds the font resolver and wrap strategy; all
/// per-image settings come from the [`WatermarkConfig`] passed to each call.
pub struct Watermarker {
    fonts: FontResolver,
    wrapper: Box<dyn TextWrap>,
}

impl Watermarker {
    pub fn new(fonts: FontResolver) -> Self {
        Self {
            fonts,
            wrapper: Box::new(CharCountWrap),
        }
    }

    /// Replace the line-wrapping strategy.
    pub fn with_wrapper(mut self, wrapper: Box<dyn TextWrap>) -> Self {
        self.wrapper = wrapper;
        self
    }

    /// Build the transparent watermark layer for an image of `size`.
    pub fn render_overlay(
        &self,
        size: (u32, u32),
        config: &WatermarkConfig,
    ) -> Result<(RgbaImage, Placement)> {
        let (width, height) = size;
        let font_size = config
            .font_size
            .filter(|s| *s > 0)
            .unwrap_or_else(|| auto_font_size(width, height));
        let font = self.fonts.resolve(font_size).context(WATERMARK_FAILED)?;

        let wrapped = self.wrapper.wrap(&config.text, width / 2, &font);
        let text_size = layout::measure(&wrapped, &font);
        let origin = resolve_origin(size, text_size, config.position);

        let alpha = config.alpha();
        let mut overlay = RgbaImage::new(width, height);
        let (x, y) = (origin.0 as i32, origin.1 as i32);

        let [r, g, b] = STROKE_COLOR;
        let stroke = Rgba([r, g, b, alpha]);
        for dx in [-STROKE_WIDTH, 0, STROKE_WIDTH] {
            for dy in [-STROKE_WIDTH, 0, STROKE_WIDTH] {
                if dx != 0 || dy != 0 {
                    draw_block(&mut overlay, &font, &wrapped, x + dx, y + dy, stroke);
                }
            }
        }

        let [r, g, b] = config.text_color;
        draw_block(&mut overlay, &font, &wrapped, x, y, Rgba([r, g, b, alpha]));

        let placement = Placement {
            origin,
            text_size,
            font_size: font.size(),
            wrapped_text: wrapped,
        };
        Ok((overlay, placement))
    }

    /// Composite the watermark onto `image`. The result keeps an alpha channel.
    pub fn apply(&self, image: &DynamicImage, config: &WatermarkConfig) -> Result<(RgbaImage, Placement)> {
        let mut base = image.to_rgba8();
        let (overlay, placement) = self.render_overlay(base.dimensions(), config)?;
        alpha_composite(&mut base, &overlay);
        Ok((base, placement))
    }

    /// Opaque rendering for display.
    pub fn preview(&self, image: &DynamicImage, config: &WatermarkConfig) -> Result<RgbImage> {
        let (stamped, _) = self.apply(image, config)?;
        Ok(DynamicImage::ImageRgba8(stamped).to_rgb8())
    }

    /// Apply the watermark and encode the result entirely in memory.
    pub fn encode(
        &self,
        image: &DynamicImage,
        config: &WatermarkConfig,
        format: ExportFormat,
    ) -> Result<(Vec<u8>, Placement)> {
        let (stamped, placement) = self.apply(image, config)?;
        let bytes = encode_image(stamped, format).context(WATERMARK_FAILED)?;
        Ok((bytes, placement))
    }

    /// Apply, encode and write `output` in one go. Nothing is written unless
    /// encoding succeeded.
    pub fn export(
        &self,
        image: &DynamicImage,
        config: &WatermarkConfig,
        format: ExportFormat,
        output: &Path,
    ) -> Result<Placement> {
        let (bytes, placement) = self.encode(image, config, format)?;
        std::fs::write(output, bytes)
            .with_context(|| format!("Failed to write {}", output.display()))
            .context(WATERMARK_FAILED)?;
        Ok(placement)
    }

    /// Open `input`, watermark it and save to `output`.
    pub fn watermark_file(
        &self,
        input: &Path,
        output: &Path,
        config: &WatermarkConfig,
        format: ExportFormat,
    ) -> Result<Placement> {
        let image = image::open(input)
            .with_context(|| format!("Failed to open {}", input.display()))
            .context(WATERMARK_FAILED)?;
        self.export(&image, config, format, output)
    }
}

fn draw_block(canvas: &mut RgbaImage, font: &WatermarkFont, text: &str, x: i32, y: i32, color: Rgba<u8>) {
    let advance = layout::line_advance(font) as i32;
    for (i, line) in text.split('\n').enumerate() {
        font.draw_line(canvas, color, x, y + i as i32 * advance, line);
    }
}

/// Porter-Duff "over": composite `overlay` onto `base` in place.
///
/// Pixels where the overlay is fully transparent are left untouched, so a
/// zero-opacity watermark is a no-op.
pub fn alpha_composite(base: &mut RgbaImage, overlay: &RgbaImage) {
    for (dst, src) in base.pixels_mut().zip(overlay.pixels()) {
        let sa = u32::from(src[3]);
        if sa == 0 {
            continue;
        }
        let da = u32::from(dst[3]);

        // Output alpha scaled by 255.
        let out_a = sa * 255 + da * (255 - sa);
        let mut out = [0u8; 4];
        for c in 0..3 {
            let num = u32::from(src[c]) * sa * 255 + u32::from(dst[c]) * da * (255 - sa);
            out[c] = ((num + out_a / 2) / out_a) as u8;
        }
        out[3] = ((out_a + 127) / 255) as u8;
        *dst = Rgba(out);
    }
}

/// Encode an RGBA image. JPEG output is flattened to RGB first.
pub fn encode_image(image: RgbaImage, format: ExportFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        ExportFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
            let encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
            rgb.write_with_encoder(encoder).context("Failed to encode JPEG")?;
        }
        ExportFormat::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut bytes, CompressionType::Fast, FilterType::Adaptive);
            image.write_with_encoder(encoder).context("Failed to encode PNG")?;
        }
    }
    Ok(bytes)
}

/// Downscale to fit inside `max_width` x `max_height`, keeping the aspect
/// ratio. Images that already fit are returned unchanged.
pub fn fit_within(image: &RgbImage, max_width: u32, max_height: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    let ratio = (f64::from(max_width) / f64::from(width))
        .min(f64::from(max_height) / f64::from(height))
        .min(1.0);
    if ratio >= 1.0 {
        return image.clone();
    }

    let new_width = ((f64::from(width) * ratio) as u32).max(1);
    let new_height = ((f64::from(height) * ratio) as u32).max(1);
    imageops::resize(image, new_width, new_height, imageops::FilterType::Lanczos3)
}

/// Parse a color name (`white`, `red`, ...) or `#rrggbb` hex value.
pub fn parse_color(value: &str) -> Result<[u8; 3]> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("Invalid hex color: {value}");
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
        return Ok([channel(0)?, channel(2)?, channel(4)?]);
    }

    let rgb = match value.to_lowercase().as_str() {
        "white" => [255, 255, 255],
        "black" => [0, 0, 0],
        "red" => [255, 0, 0],
        "green" => [0, 128, 0],
        "blue" => [0, 0, 255],
        "yellow" => [255, 255, 0],
        "orange" => [255, 165, 0],
        "gray" | "grey" => [128, 128, 128],
        _ => anyhow::bail!("Unknown color: {value} (use a name or #rrggbb)"),
    };
    Ok(rgb)
}
