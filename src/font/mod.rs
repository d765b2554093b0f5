//! Font resolution for watermark text.
//!
//! [`FontResolver`] walks an ordered list of candidates (explicit font file
//! paths first, then well-known file names searched for under the system
//! font directories) and degrades to an embedded DejaVu Sans Mono face when
//! nothing loads. Running out of candidates is never an error.
//!
//! ```rust
//! use photo_watermark::font::{FontCandidates, FontResolver};
//!
//! // A resolver with nothing to try always yields the embedded face.
//! let resolver = FontResolver::new(FontCandidates::none());
//! let font = resolver.resolve(32).unwrap();
//! assert!(font.is_embedded());
//! assert_eq!(font.size(), 32);
//! ```

mod tables;

use ab_glyph::{Font, FontArc, FontVec, PxScale, ScaleFont};
use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

/// How deep font directories are searched.
const FONT_DIR_DEPTH: usize = 4;

/// Last-resort face (DejaVu Sans Mono, see `fonts/DejaVu-LICENSE.txt`).
/// Covers Latin, Greek and Cyrillic; CJK text renders as missing glyphs.
const EMBEDDED_FONT_DATA: &[u8] = include_bytes!("fonts/DejaVuSansMono.ttf");

static EMBEDDED_FONT: OnceLock<Option<FontArc>> = OnceLock::new();

fn embedded_font() -> Result<FontArc> {
    EMBEDDED_FONT
        .get_or_init(|| FontArc::try_from_slice(EMBEDDED_FONT_DATA).ok())
        .clone()
        .context("Embedded fallback font could not be parsed")
}

/// A font face bound to a pixel size, able to measure and draw lines.
#[derive(Clone)]
pub struct WatermarkFont {
    font: FontArc,
    size: u32,
    embedded: bool,
}

impl std::fmt::Debug for WatermarkFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkFont")
            .field("size", &self.size)
            .field("embedded", &self.embedded)
            .finish()
    }
}

impl WatermarkFont {
    /// Whether this is the embedded fallback rather than a system font.
    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    /// Size in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    fn scale(&self) -> PxScale {
        PxScale::from(self.size as f32)
    }

    /// Height of a single line of text.
    pub fn line_height(&self) -> u32 {
        let scaled = self.font.as_scaled(self.scale());
        scaled.height().ceil().max(0.0) as u32
    }

    /// Width of a single line (no line breaks) in pixels.
    pub fn line_width(&self, line: &str) -> u32 {
        if line.is_empty() {
            return 0;
        }
        text_size(self.scale(), &self.font, line).0
    }

    /// Draw a single line with its top-left corner at `(x, y)`.
    pub fn draw_line(&self, canvas: &mut RgbaImage, color: Rgba<u8>, x: i32, y: i32, line: &str) {
        if line.is_empty() {
            return;
        }
        draw_text_mut(canvas, color, x, y, self.scale(), &self.font, line);
    }
}

/// Ordered font candidates for a [`FontResolver`].
#[derive(Debug, Clone, Default)]
pub struct FontCandidates {
    /// Font files, tried in order.
    pub paths: Vec<PathBuf>,
    /// Directories searched for `file_names` when no path loads.
    pub search_dirs: Vec<PathBuf>,
    /// Font file names, most preferred first. Matched case-insensitively.
    pub file_names: Vec<String>,
}

impl FontCandidates {
    /// The known-good fonts for the platform this binary runs on.
    pub fn for_current_platform() -> Self {
        Self::for_platform(std::env::consts::OS)
    }

    /// The known-good fonts for `os` (a `std::env::consts::OS` value).
    pub fn for_platform(os: &str) -> Self {
        let table = tables::table_for(os);
        let root = table.root_env.map(|(var, default)| {
            std::env::var_os(var)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        });

        let rooted = |file: &&str| match &root {
            Some(root) => root.join(file),
            None => PathBuf::from(file),
        };

        Self {
            paths: table.files.iter().map(rooted).collect(),
            search_dirs: table.search_dirs.iter().map(rooted).collect(),
            file_names: table.file_names.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// No candidates at all: resolution always yields the embedded face.
    pub fn none() -> Self {
        Self::default()
    }

    /// Put `path` ahead of every other candidate.
    pub fn prefer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(0, path.into());
        self
    }
}

/// Resolves a font face once and hands out size-specific handles.
///
/// The system face is looked up lazily on the first
/// [`resolve`](Self::resolve) call and reused afterwards; only the size
/// changes between images.
pub struct FontResolver {
    candidates: FontCandidates,
    face: OnceLock<Option<FontArc>>,
}

impl std::fmt::Debug for FontResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontResolver")
            .field("candidates", &self.candidates)
            .field("resolved", &self.face.get().map(Option::is_some))
            .finish()
    }
}

impl FontResolver {
    pub fn new(candidates: FontCandidates) -> Self {
        Self {
            candidates,
            face: OnceLock::new(),
        }
    }

    /// Resolver for the current platform, with an optional user font tried first.
    pub fn system(preferred: Option<&Path>) -> Self {
        let mut candidates = FontCandidates::for_current_platform();
        if let Some(path) = preferred {
            candidates = candidates.prefer_path(path);
        }
        Self::new(candidates)
    }

    /// A font at `size` pixels: the first loadable candidate, else the
    /// embedded face. Fails only if the embedded face itself is unusable.
    pub fn resolve(&self, size: u32) -> Result<WatermarkFont> {
        let (font, embedded) = match self.face() {
            Some(font) => (font.clone(), false),
            None => (embedded_font()?, true),
        };
        Ok(WatermarkFont {
            font,
            size: size.max(1),
            embedded,
        })
    }

    fn face(&self) -> Option<&FontArc> {
        self.face.get_or_init(|| self.load()).as_ref()
    }

    fn load(&self) -> Option<FontArc> {
        for path in &self.candidates.paths {
            if let Some(font) = load_font_file(path) {
                log::debug!("Using font {}", path.display());
                return Some(font);
            }
        }

        if let Some(path) = find_font_file(&self.candidates.search_dirs, &self.candidates.file_names)
            && let Some(font) = load_font_file(&path)
        {
            log::debug!("Using font {}", path.display());
            return Some(font);
        }

        log::warn!(
            "No system font could be loaded; falling back to the embedded DejaVu Sans Mono (CJK text will not render)"
        );
        None
    }
}

fn load_font_file(path: &Path) -> Option<FontArc> {
    if !path.is_file() {
        return None;
    }
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            log::debug!("Cannot read font {}: {e}", path.display());
            return None;
        }
    };
    match FontVec::try_from_vec(data) {
        Ok(font) => Some(FontArc::new(font)),
        Err(_) => {
            log::debug!("Not a usable font file: {}", path.display());
            None
        }
    }
}

/// The most preferred of `names` found anywhere under `dirs`.
fn find_font_file(dirs: &[PathBuf], names: &[String]) -> Option<PathBuf> {
    if names.is_empty() {
        return None;
    }

    let wanted: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
    let mut best: Option<(usize, PathBuf)> = None;

    for dir in dirs.iter().filter(|d| d.is_dir()) {
        let files = WalkDir::new(dir)
            .max_depth(FONT_DIR_DEPTH)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file());

        for entry in files {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            let Some(rank) = wanted.iter().position(|w| *w == name) else {
                continue;
            };
            if best.as_ref().is_none_or(|(current, _)| rank < *current) {
                best = Some((rank, entry.into_path()));
            }
        }
    }

    best.map(|(_, path)| path)
}
