use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::pipeline::NamingRule;
use crate::template::TemplateStore;
use crate::watermark::{ExportFormat, WatermarkConfig};

const CONFIG_FILE: &str = "config.json";
const BACKUP_FILE: &str = "config_backup.json";
const TEMPLATES_DIR: &str = "templates";

/// Persisted user settings.
///
/// Field names match the on-disk JSON keys. Missing keys take their
/// defaults, so older config files keep loading.
///
/// # Loading
///
/// ```rust,no_run
/// use photo_watermark::config::ConfigStore;
///
/// let store = ConfigStore::open_default().unwrap();
/// let mut config = store.load();
/// config.opacity = 80;
/// store.save(&config).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub watermark_text: String,
    /// 0-100.
    pub opacity: u8,
    /// Relative `[x, y]`, each 0-1.
    pub position: [f32; 2],
    pub export_format: ExportFormat,
    pub naming_rule: NamingRule,
    pub prefix: String,
    pub suffix: String,
    pub text_color: [u8; 3],
    /// Fixed font size in pixels; `None` sizes text from the image.
    pub font_size: Option<u32>,
    /// A font file to try before the platform defaults.
    pub font_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let watermark = WatermarkConfig::default();
        Self {
            watermark_text: watermark.text,
            opacity: watermark.opacity,
            position: [watermark.position.0, watermark.position.1],
            export_format: ExportFormat::Jpeg,
            naming_rule: NamingRule::Original,
            prefix: "wm_".to_string(),
            suffix: "_watermarked".to_string(),
            text_color: watermark.text_color,
            font_size: watermark.font_size,
            font_path: None,
        }
    }
}

impl AppConfig {
    /// A fresh watermark configuration built from these settings.
    pub fn watermark_config(&self) -> WatermarkConfig {
        let mut config = WatermarkConfig {
            text: self.watermark_text.clone(),
            font_size: self.font_size,
            text_color: self.text_color,
            ..WatermarkConfig::default()
        };
        config.set_opacity(i32::from(self.opacity));
        config.set_position(self.position[0], self.position[1]);
        config
    }
}

/// The application data directory: `config.json`, its backup, and templates.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    /// `%APPDATA%\PhotoWatermark` on Windows, `~/.photo_watermark` elsewhere.
    pub fn default_dir() -> Result<PathBuf> {
        if cfg!(windows) {
            let app_data = std::env::var_os("APPDATA").context("APPDATA is not set")?;
            Ok(PathBuf::from(app_data).join("PhotoWatermark"))
        } else {
            let home = std::env::var_os("HOME").context("HOME is not set")?;
            Ok(PathBuf::from(home).join(".photo_watermark"))
        }
    }

    /// Open the store in the default directory, creating it if needed.
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_dir()?)
    }

    /// Open the store rooted at `root`, creating the directory layout if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(TEMPLATES_DIR))
            .with_context(|| format!("Failed to create config directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.root.join(BACKUP_FILE)
    }

    /// The template store living next to the config file.
    pub fn templates(&self) -> TemplateStore {
        TemplateStore::new(self.root.join(TEMPLATES_DIR))
    }

    /// Load the saved config, or defaults when it is missing or unreadable.
    pub fn load(&self) -> AppConfig {
        let path = self.config_path();
        if !path.exists() {
            log::debug!("No config at {}. Using defaults.", path.display());
            return AppConfig::default();
        }

        let loaded = std::fs::read_to_string(&path)
            .context("Failed to read config file")
            .and_then(|contents| {
                serde_json::from_str::<AppConfig>(&contents).context("Failed to parse config file")
            });
        match loaded {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{e:#} ({}). Using defaults.", path.display());
                AppConfig::default()
            }
        }
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        let path = self.config_path();
        let contents = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        std::fs::write(&path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Delete the saved config so the next load yields defaults.
    pub fn reset(&self) -> Result<()> {
        let path = self.config_path();
        if path.exists() {
            std::fs::remove_file(&path).context("Failed to delete config file")?;
        }
        Ok(())
    }

    /// Copy the config file to `target` (default: `config_backup.json`).
    pub fn backup(&self, target: Option<&Path>) -> Result<PathBuf> {
        let target = target.map(Path::to_path_buf).unwrap_or_else(|| self.backup_path());
        let source = self.config_path();
        if !source.exists() {
            anyhow::bail!("No config file to back up at {}", source.display());
        }
        std::fs::copy(&source, &target)
            .with_context(|| format!("Failed to back up config to {}", target.display()))?;
        Ok(target)
    }

    /// Replace the config file with `source` (default: `config_backup.json`).
    pub fn restore(&self, source: Option<&Path>) -> Result<()> {
        let source = source.map(Path::to_path_buf).unwrap_or_else(|| self.backup_path());
        if !source.exists() {
            anyhow::bail!("No config backup at {}", source.display());
        }
        std::fs::copy(&source, self.config_path())
            .with_context(|| format!("Failed to restore config from {}", source.display()))?;
        Ok(())
    }
}
