use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

use photo_watermark::config::{AppConfig, ConfigStore};
use photo_watermark::exif::{self, DateProbe};
use photo_watermark::font::FontResolver;
use photo_watermark::pipeline::{self, BatchOptions, NamingRule};
use photo_watermark::template::Template;
use photo_watermark::watermark::{self, ExportFormat, WatermarkConfig, Watermarker};

/// Largest preview written by `--preview`.
const PREVIEW_BOUNDS: (u32, u32) = (800, 600);

#[derive(Parser, Debug)]
#[command(
    name = "photo-watermark",
    version,
    about = "Stamp photos with their capture date, read from EXIF metadata or the file's modification time"
)]
struct Cli {
    /// Image file or directory to process
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Font size in pixels (default: scaled to the image)
    #[arg(long, value_name = "PX")]
    font_size: Option<u32>,

    /// Text color: a name (white, red, ...) or #rrggbb
    #[arg(long, value_name = "COLOR")]
    color: Option<String>,

    /// Where to place the date
    #[arg(long, value_enum)]
    position: Option<Position>,

    /// Opacity from 0 (invisible) to 100 (opaque)
    #[arg(long, value_name = "0-100")]
    opacity: Option<i32>,

    /// Output directory (default: ./_watermark)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Output image format
    #[arg(long, value_enum)]
    format: Option<Format>,

    /// How output files are named
    #[arg(long, value_enum)]
    naming: Option<Naming>,

    /// Prefix used by `--naming prefix`
    #[arg(long)]
    prefix: Option<String>,

    /// Suffix used by `--naming suffix`
    #[arg(long)]
    suffix: Option<String>,

    /// Also process images in sub-directories
    #[arg(short, long)]
    recursive: bool,

    /// Apply a saved template before the other options
    #[arg(short, long, value_name = "NAME")]
    template: Option<String>,

    /// Settings directory (default: ~/.photo_watermark)
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Print every metadata entry and the extracted raw date of each input,
    /// with debug logging
    #[arg(long)]
    debug: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Write a downscaled preview of a single input image and exit
    #[arg(long, value_name = "FILE")]
    preview: Option<PathBuf>,

    /// Save the effective watermark settings as a template and exit
    #[arg(long, value_name = "NAME")]
    save_template: Option<String>,

    /// List saved templates and exit
    #[arg(long)]
    list_templates: bool,

    /// Delete a template and exit
    #[arg(long, value_name = "NAME")]
    delete_template: Option<String>,

    /// Rename a template and exit
    #[arg(long, num_args = 2, value_names = ["OLD", "NEW"])]
    rename_template: Option<Vec<String>>,

    /// Export a template to a file and exit
    #[arg(long, num_args = 2, value_names = ["NAME", "FILE"])]
    export_template: Option<Vec<String>>,

    /// Import a template file and exit
    #[arg(long, value_name = "FILE")]
    import_template: Option<PathBuf>,

    /// Write a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Delete the saved config and exit
    #[arg(long)]
    reset_config: bool,

    /// Back up the config (default: config_backup.json) and exit
    #[arg(long, value_name = "FILE", num_args = 0..=1)]
    backup_config: Option<Option<PathBuf>>,

    /// Restore the config from a backup (default: config_backup.json) and exit
    #[arg(long, value_name = "FILE", num_args = 0..=1)]
    restore_config: Option<Option<PathBuf>>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Position {
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Position {
    fn relative(self) -> (f32, f32) {
        match self {
            Self::Center => (0.5, 0.5),
            Self::TopLeft => (0.0, 0.0),
            Self::TopRight => (1.0, 0.0),
            Self::BottomLeft => (0.0, 1.0),
            Self::BottomRight => (1.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Jpeg,
    Png,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Jpeg => ExportFormat::Jpeg,
            Format::Png => ExportFormat::Png,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Naming {
    Original,
    Prefix,
    Suffix,
}

impl From<Naming> for NamingRule {
    fn from(naming: Naming) -> Self {
        match naming {
            Naming::Original => NamingRule::Original,
            Naming::Prefix => NamingRule::Prefix,
            Naming::Suffix => NamingRule::Suffix,
        }
    }
}

fn log_level(verbose: bool, debug: bool) -> &'static str {
    if verbose || debug { "debug" } else { "info" }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level(cli.verbose, cli.debug)),
    )
        .format_timestamp(None)
        .init();

    let store = match &cli.config_dir {
        Some(dir) => ConfigStore::open(dir)?,
        None => ConfigStore::open_default()?,
    };

    if handle_config_commands(&cli, &store)? || handle_template_commands(&cli, &store)? {
        return Ok(());
    }

    let app = store.load();
    let config = effective_config(&cli, &app, &store)?;

    // Handle --save-template
    if let Some(name) = &cli.save_template {
        store.templates().save(name, &Template::from_config(&config))?;
        println!("Template saved: {name}");
        return Ok(());
    }

    let Some(input) = cli.path.as_deref() else {
        anyhow::bail!("No input file or directory specified. Use --help for usage.");
    };

    let options = batch_options(&cli, &app);
    let probes = exif::default_probes();
    let watermarker = Watermarker::new(FontResolver::system(app.font_path.as_deref()));

    if cli.debug {
        for path in pipeline::collect_candidates(input, options.recursive, &options.output_dir)? {
            print_metadata(&path, &probes);
        }
    }

    // Handle --preview
    if let Some(target) = &cli.preview {
        return write_preview(input, target, &config, &watermarker, &probes);
    }

    log::info!(
        "Watermark: opacity {}%, position ({:.2}, {:.2}), format {:?}",
        config.opacity,
        config.position.0,
        config.position.1,
        options.export_format
    );

    let report = pipeline::run_batch(input, &config, &options, &watermarker, &probes)?;

    for result in &report.results {
        log::info!("{}", result.source_filename);
        log::info!("  Text     : {} ({:?})", result.resolved_text, result.metadata_source);
        log::info!("  Size     : {} x {}", result.image_dimensions.0, result.image_dimensions.1);
        log::info!("  Position : ({}, {})", result.resolved_position_pixels.0, result.resolved_position_pixels.1);
        log::info!("  Saved to : {}", result.output_path.display());
    }

    // JSON output
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report.results)?);
    }

    // Summary
    let failed = report.failures.len();
    log::info!(
        "Done: {} processed, {} skipped, {failed} failed",
        report.processed,
        report.skipped
    );
    if failed > 0 {
        anyhow::bail!("{failed} image(s) could not be watermarked");
    }

    Ok(())
}

/// `--init`, `--reset-config`, `--backup-config`, `--restore-config`.
/// Returns true when a command ran.
fn handle_config_commands(cli: &Cli, store: &ConfigStore) -> Result<bool> {
    if cli.init {
        store.save(&AppConfig::default())?;
        println!("Default config written to {}", store.config_path().display());
        return Ok(true);
    }

    if cli.reset_config {
        store.reset()?;
        println!("Config reset to defaults");
        return Ok(true);
    }

    if let Some(target) = &cli.backup_config {
        let written = store.backup(target.as_deref())?;
        println!("Config backed up to {}", written.display());
        return Ok(true);
    }

    if let Some(source) = &cli.restore_config {
        store.restore(source.as_deref())?;
        println!("Config restored");
        return Ok(true);
    }

    Ok(false)
}

/// Template management flags other than `--save-template`.
/// Returns true when a command ran.
fn handle_template_commands(cli: &Cli, store: &ConfigStore) -> Result<bool> {
    let templates = store.templates();

    if cli.list_templates {
        let names = templates.list()?;
        if names.is_empty() {
            println!("No templates saved in {}", templates.dir().display());
        }
        for name in names {
            println!("{name}");
        }
        return Ok(true);
    }

    if let Some(name) = &cli.delete_template {
        if templates.delete(name)? {
            println!("Template deleted: {name}");
        } else {
            anyhow::bail!("Template not found: {name}");
        }
        return Ok(true);
    }

    if let Some([old, new]) = cli.rename_template.as_deref() {
        templates.rename(old, new)?;
        println!("Template renamed: {old} -> {new}");
        return Ok(true);
    }

    if let Some([name, file]) = cli.export_template.as_deref() {
        templates.export(name, Path::new(file))?;
        println!("Template {name} exported to {file}");
        return Ok(true);
    }

    if let Some(file) = &cli.import_template {
        let name = templates.import(file, None)?;
        println!("Template imported as {name}");
        return Ok(true);
    }

    Ok(false)
}

/// Saved config, then `--template`, then the individual flags.
fn effective_config(cli: &Cli, app: &AppConfig, store: &ConfigStore) -> Result<WatermarkConfig> {
    let mut config = app.watermark_config();

    if let Some(name) = &cli.template {
        let template = store
            .templates()
            .load(name)?
            .with_context(|| format!("Template not found: {name}"))?;
        template.apply_to(&mut config);
    }

    if let Some(size) = cli.font_size {
        config.font_size = Some(size);
    }
    if let Some(color) = &cli.color {
        config.text_color = watermark::parse_color(color)?;
    }
    if let Some(position) = cli.position {
        let (x, y) = position.relative();
        config.set_position(x, y);
    }
    if let Some(opacity) = cli.opacity {
        config.set_opacity(opacity);
    }

    Ok(config)
}

fn batch_options(cli: &Cli, app: &AppConfig) -> BatchOptions {
    BatchOptions {
        output_dir: cli
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(pipeline::DEFAULT_OUTPUT_DIR)),
        export_format: cli.format.map(ExportFormat::from).unwrap_or(app.export_format),
        naming_rule: cli.naming.map(NamingRule::from).unwrap_or(app.naming_rule),
        prefix: cli.prefix.clone().unwrap_or_else(|| app.prefix.clone()),
        suffix: cli.suffix.clone().unwrap_or_else(|| app.suffix.clone()),
        recursive: cli.recursive,
        ..BatchOptions::default()
    }
}

fn write_preview(
    input: &Path,
    target: &Path,
    config: &WatermarkConfig,
    watermarker: &Watermarker,
    probes: &[Box<dyn DateProbe>],
) -> Result<()> {
    if !input.is_file() {
        anyhow::bail!("--preview needs a single image file, got {}", input.display());
    }

    let image = image::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let (text, _) = pipeline::resolve_watermark_text(input, probes)?;
    let config = WatermarkConfig {
        text,
        ..config.clone()
    };

    let preview = watermarker.preview(&image, &config)?;
    let preview = watermark::fit_within(&preview, PREVIEW_BOUNDS.0, PREVIEW_BOUNDS.1);
    preview
        .save(target)
        .with_context(|| format!("Failed to write preview {}", target.display()))?;
    println!("Preview written to {}", target.display());
    Ok(())
}

// ANSI color codes
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Print every metadata entry of a file and the raw date the probes settle on.
fn print_metadata(path: &Path, probes: &[Box<dyn DateProbe>]) {
    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    let entries = exif::dump_entries(path);
    if entries.is_empty() {
        println!("  {DIM}(no EXIF metadata found){RESET}");
    }
    for (tag, value) in &entries {
        println!("  {:<28} : {value}", tag);
    }

    println!("  {DIM}{}{RESET}", "─".repeat(70));
    match exif::extract_raw_date(path, probes) {
        Some(raw) => {
            let parsed = exif::parse_date(&raw)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unparseable".to_string());
            println!("  {BOLD}{:<28}{RESET} : {raw:?} -> {parsed}", "Raw date");
        }
        None => println!("  {BOLD}{:<28}{RESET} : (none)", "Raw date"),
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_enables_debug_logging() {
        assert_eq!(log_level(false, false), "info");
        assert_eq!(log_level(true, false), "debug");
        assert_eq!(log_level(false, true), "debug");

        let cli = Cli::parse_from(["photo-watermark", "--debug", "photos"]);
        assert_eq!(log_level(cli.verbose, cli.debug), "debug");
    }
}
