use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::exif::{self, DateProbe};
use crate::watermark::{ExportFormat, WatermarkConfig, Watermarker};

/// Default output directory, created under the current working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "_watermark";

/// Watermark text used when a metadata date exists but cannot be parsed.
pub const DATE_UNKNOWN_TEXT: &str = "date unknown";

/// Where the watermark text for an image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataSource {
    /// A metadata date tag, parsed and formatted `YYYY-MM-DD`.
    MetadataDate,
    /// A metadata date tag was found but not understood; placeholder text used.
    MetadataParseFailed,
    /// No metadata date; the file's modification date was used.
    FileMtime,
}

/// How output files are named.
///
/// The extension always follows the [`ExportFormat`], so `IMG_1.png` exported
/// as JPEG with [`NamingRule::Suffix`] becomes `IMG_1_watermarked.jpg`.
///
/// # Example
///
/// ```rust
/// use photo_watermark::pipeline::{NamingRule, output_file_name};
/// use photo_watermark::watermark::ExportFormat;
/// use std::path::Path;
///
/// let name = output_file_name(Path::new("IMG_1.png"), NamingRule::Prefix, "wm_", "", ExportFormat::Jpeg);
/// assert_eq!(name, "wm_IMG_1.jpg");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingRule {
    /// Keep the original file stem.
    #[default]
    Original,
    /// Prepend the configured prefix.
    Prefix,
    /// Append the configured suffix.
    Suffix,
}

/// The outcome of watermarking a single image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatermarkResult {
    pub source_filename: String,
    pub resolved_text: String,
    /// Top-left corner of the watermark in pixels.
    pub resolved_position_pixels: (u32, u32),
    /// Source image `(width, height)`.
    pub image_dimensions: (u32, u32),
    pub output_path: PathBuf,
    pub metadata_source: MetadataSource,
}

/// A file that was an image but could not be watermarked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Totals and per-file records of one batch run.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    /// Images watermarked and written.
    pub processed: usize,
    /// Candidates that did not open as images.
    pub skipped: usize,
    pub results: Vec<WatermarkResult>,
    pub failures: Vec<FileFailure>,
}

/// Batch settings that apply to every file.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    pub export_format: ExportFormat,
    pub naming_rule: NamingRule,
    pub prefix: String,
    pub suffix: String,
    /// Walk sub-directories of a directory input.
    pub recursive: bool,
    /// Per-image relative positions that replace the configured one.
    pub position_overrides: HashMap<PathBuf, (f32, f32)>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            export_format: ExportFormat::Jpeg,
            naming_rule: NamingRule::Original,
            prefix: "wm_".to_string(),
            suffix: "_watermarked".to_string(),
            recursive: false,
            position_overrides: HashMap::new(),
        }
    }
}

/// Collect candidate files from a file or directory path.
///
/// Directories are listed in file-name order, recursively only when asked.
/// Files inside `exclude` (the output directory) are never candidates. No
/// format filtering happens here: each candidate is validated by decoding.
///
/// # Example
///
/// ```rust,no_run
/// use photo_watermark::pipeline::collect_candidates;
/// use std::path::Path;
///
/// let files = collect_candidates(Path::new("./photos"), false, Path::new("_watermark")).unwrap();
/// println!("Found {} files", files.len());
/// ```
pub fn collect_candidates(input: &Path, recursive: bool, exclude: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        anyhow::bail!("Path does not exist: {}", input.display());
    }

    // Only an output directory nested inside the input needs skipping.
    let input_root = input.canonicalize().ok();
    let exclude = exclude
        .canonicalize()
        .ok()
        .filter(|out| Some(out) != input_root.as_ref());
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut files = Vec::new();
    for entry in WalkDir::new(input)
        .max_depth(max_depth)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(ref out) = exclude {
            if path.canonicalize().map(|p| p.starts_with(out)).unwrap_or(false) {
                continue;
            }
        }
        files.push(path.to_path_buf());
    }

    Ok(files)
}

/// Build the output file name for `source`.
pub fn output_file_name(
    source: &Path,
    rule: NamingRule,
    prefix: &str,
    suffix: &str,
    format: ExportFormat,
) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let name = match rule {
        NamingRule::Original => stem,
        NamingRule::Prefix => format!("{prefix}{stem}"),
        NamingRule::Suffix => format!("{stem}{suffix}"),
    };
    format!("{name}.{}", format.extension())
}

/// Output file names already handed out during one batch run.
///
/// Two sources that map to the same name (`shot.png` and `shot.bmp` both
/// exported as `shot.jpg`) get `_1`, `_2`... appended to the stem.
/// Names are compared case-insensitively.
#[derive(Debug, Default)]
pub struct OutputNames {
    taken: HashSet<String>,
}

impl OutputNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name`, or the first free numbered variant of it.
    pub fn claim(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_lowercase()) {
            return name.to_string();
        }

        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{ext}")),
            _ => (name, String::new()),
        };
        let mut counter = 1;
        loop {
            let candidate = format!("{stem}_{counter}{ext}");
            if self.taken.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Refuse an output directory that holds any of the source files.
pub fn check_output_dir(sources: &[PathBuf], output_dir: &Path) -> Result<()> {
    let Ok(out) = output_dir.canonicalize() else {
        // Not created yet, so it cannot hold a source.
        return Ok(());
    };

    for source in sources {
        let parent = source
            .canonicalize()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        if parent.as_deref() == Some(out.as_path()) {
            anyhow::bail!(
                "Output directory {} contains source image {}; choose another directory so originals are not overwritten",
                output_dir.display(),
                source.display()
            );
        }
    }
    Ok(())
}

/// Decide the watermark text for `path` from its metadata or mtime.
///
/// - metadata date found and parsed: `YYYY-MM-DD`, [`MetadataSource::MetadataDate`]
/// - found but unparseable: [`DATE_UNKNOWN_TEXT`], [`MetadataSource::MetadataParseFailed`]
/// - nothing found: the file's local modification date, [`MetadataSource::FileMtime`]
pub fn resolve_watermark_text(
    path: &Path,
    probes: &[Box<dyn DateProbe>],
) -> Result<(String, MetadataSource)> {
    if let Some(raw) = exif::extract_raw_date(path, probes) {
        return Ok(match exif::parse_date(&raw) {
            Some(date) => (date.format("%Y-%m-%d").to_string(), MetadataSource::MetadataDate),
            None => {
                log::debug!("Unparseable metadata date {raw:?} in {}", path.display());
                (DATE_UNKNOWN_TEXT.to_string(), MetadataSource::MetadataParseFailed)
            }
        });
    }

    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time of {}", path.display()))?;
    let date: DateTime<Local> = modified.into();
    Ok((date.format("%Y-%m-%d").to_string(), MetadataSource::FileMtime))
}

/// Watermark every image under `input` (a file or directory).
///
/// This is the main entry point for the library. For each candidate:
///
/// 1. **Open**: decode it; anything that is not an image is skipped
/// 2. **Date**: pick the text via [`resolve_watermark_text`]
/// 3. **Stamp**: composite with a fresh copy of `config` and write it to
///    `options.output_dir`
///
/// Only directory-level problems (missing input, unusable output directory)
/// abort the run; per-file failures are recorded in the report.
///
/// # Example
///
/// ```rust,no_run
/// use photo_watermark::exif::default_probes;
/// use photo_watermark::font::FontResolver;
/// use photo_watermark::pipeline::{BatchOptions, run_batch};
/// use photo_watermark::watermark::{WatermarkConfig, Watermarker};
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// let watermarker = Watermarker::new(FontResolver::system(None));
/// let report = run_batch(
///     Path::new("./photos"),
///     &WatermarkConfig::default(),
///     &BatchOptions::default(),
///     &watermarker,
///     &default_probes(),
/// )?;
/// println!("{} processed, {} skipped", report.processed, report.skipped);
/// # Ok(())
/// # }
/// ```
pub fn run_batch(
    input: &Path,
    config: &WatermarkConfig,
    options: &BatchOptions,
    watermarker: &Watermarker,
    probes: &[Box<dyn DateProbe>],
) -> Result<BatchReport> {
    let candidates = collect_candidates(input, options.recursive, &options.output_dir)?;
    check_output_dir(&candidates, &options.output_dir)?;

    std::fs::create_dir_all(&options.output_dir).with_context(|| {
        format!("Failed to create output directory {}", options.output_dir.display())
    })?;
    log::info!("Output directory: {}", options.output_dir.display());

    let mut report = BatchReport::default();
    let mut names = OutputNames::new();
    let total = candidates.len();

    for (i, path) in candidates.iter().enumerate() {
        log::debug!("[{}/{}] {}", i + 1, total, path.display());

        let image = match image::open(path) {
            Ok(image) => image,
            Err(e) => {
                log::info!("Skipping non-image file: {} ({e})", path.display());
                report.skipped += 1;
                continue;
            }
        };

        let file_name = names.claim(&output_file_name(
            path,
            options.naming_rule,
            &options.prefix,
            &options.suffix,
            options.export_format,
        ));
        let output_path = options.output_dir.join(file_name);

        match process_image(path, &image, config, options, &output_path, watermarker, probes) {
            Ok(result) => {
                report.processed += 1;
                report.results.push(result);
            }
            Err(e) => {
                log::error!("Failed to watermark {}: {e:#}", path.display());
                report.failures.push(FileFailure {
                    path: path.clone(),
                    error: format!("{e:#}"),
                });
            }
        }
    }

    Ok(report)
}

/// Watermark one already-decoded image and write it to `output_path`.
pub fn process_image(
    path: &Path,
    image: &image::DynamicImage,
    config: &WatermarkConfig,
    options: &BatchOptions,
    output_path: &Path,
    watermarker: &Watermarker,
    probes: &[Box<dyn DateProbe>],
) -> Result<WatermarkResult> {
    let (text, source) = resolve_watermark_text(path, probes)?;

    let mut snapshot = config.clone();
    snapshot.text = text;
    if let Some(&(x, y)) = options.position_overrides.get(path) {
        snapshot.set_position(x, y);
    }

    let placement = watermarker.export(image, &snapshot, options.export_format, output_path)?;

    Ok(WatermarkResult {
        source_filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        resolved_text: snapshot.text,
        resolved_position_pixels: placement.origin,
        image_dimensions: (image.width(), image.height()),
        output_path: output_path.to_path_buf(),
        metadata_source: source,
    })
}
