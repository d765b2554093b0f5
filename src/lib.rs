//! # photo-watermark
//!
//! Stamp photos with their capture date. The date comes from embedded EXIF
//! metadata when available and from the file's modification time otherwise;
//! it is drawn as outlined, semi-transparent text and the result is written
//! to a separate output directory. The originals are never modified.
//!
//! ## Quick Start
//!
//! The pipeline module handles the full collect → date → stamp → write flow:
//!
//! ```rust,no_run
//! use photo_watermark::config::ConfigStore;
//! use photo_watermark::exif::default_probes;
//! use photo_watermark::font::FontResolver;
//! use photo_watermark::pipeline::{BatchOptions, run_batch};
//! use photo_watermark::watermark::Watermarker;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     // Saved settings (opacity, position, colors...) or defaults
//!     let app = ConfigStore::open_default()?.load();
//!
//!     let watermarker = Watermarker::new(FontResolver::system(app.font_path.as_deref()));
//!     let report = run_batch(
//!         Path::new("./photos"),
//!         &app.watermark_config(),
//!         &BatchOptions::default(),
//!         &watermarker,
//!         &default_probes(),
//!     )?;
//!
//!     for result in &report.results {
//!         println!("{} -> {}", result.source_filename, result.resolved_text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! The date reader and the compositor can be used on their own:
//!
//! ```rust,no_run
//! use photo_watermark::exif::{default_probes, extract_raw_date, parse_date};
//! use photo_watermark::font::FontResolver;
//! use photo_watermark::watermark::{ExportFormat, WatermarkConfig, Watermarker};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let path = Path::new("photo.jpg");
//!
//!     // 1. Find the capture date
//!     let raw = extract_raw_date(path, &default_probes());
//!     let date = raw.as_deref().and_then(parse_date);
//!
//!     // 2. Stamp and save
//!     let config = WatermarkConfig {
//!         text: date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
//!         opacity: 80,
//!         position: (1.0, 1.0),
//!         ..WatermarkConfig::default()
//!     };
//!     let watermarker = Watermarker::new(FontResolver::system(None));
//!     watermarker.watermark_file(path, Path::new("stamped.png"), &config, ExportFormat::Png)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`exif`]: capture-date probes and date parsing
//! - [`font`]: font lookup with a built-in fallback face
//! - [`layout`]: line wrapping and text measurement
//! - [`watermark`]: overlay rendering, compositing and export
//! - [`pipeline`]: candidate collection, output naming and batch processing
//! - [`config`]: persisted settings and backups
//! - [`template`]: named watermark presets

pub mod config;
pub mod exif;
pub mod font;
pub mod layout;
pub mod pipeline;
pub mod template;
pub mod watermark;
