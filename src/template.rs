use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::watermark::WatermarkConfig;

const MAX_NAME_LEN: usize = 50;
const FORBIDDEN_CHARS: &[char] = &['<', '>', '"', '/', '\\', '|', '?', '*', ':', '\n', '\t'];
const RESERVED_NAMES: &[&str] = &["CON", "PRN", "AUX", "NUL"];

/// A named, reusable set of watermark settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub text: String,
    pub opacity: u8,
    pub position: [f32; 2],
}

impl Template {
    /// Capture the reusable parts of `config`.
    pub fn from_config(config: &WatermarkConfig) -> Self {
        Self {
            text: config.text.clone(),
            opacity: config.opacity,
            position: [config.position.0, config.position.1],
        }
    }

    /// Overwrite text, opacity and position of `config`. Values are clamped.
    pub fn apply_to(&self, config: &mut WatermarkConfig) {
        config.text = self.text.clone();
        config.set_opacity(i32::from(self.opacity));
        config.set_position(self.position[0], self.position[1]);
    }
}

/// Whether `name` can be used as a template file name on every platform.
pub fn validate_template_name(name: &str) -> bool {
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return false;
    }
    if name.contains(FORBIDDEN_CHARS) {
        return false;
    }
    !is_reserved(name)
}

fn is_reserved(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    if RESERVED_NAMES.contains(&upper.as_str()) {
        return true;
    }
    ["COM", "LPT"].iter().any(|device| {
        upper
            .strip_prefix(device)
            .is_some_and(|n| n.len() == 1 && matches!(n.as_bytes()[0], b'1'..=b'9'))
    })
}

/// Templates stored as `<name>.json` files in one directory.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_template_name(name) && self.path_for(name).is_file()
    }

    /// Save `template` under `name`, replacing any template of that name.
    pub fn save(&self, name: &str, template: &Template) -> Result<()> {
        if !validate_template_name(name) {
            anyhow::bail!("Invalid template name: {name:?}");
        }
        std::fs::create_dir_all(&self.dir).context("Failed to create templates directory")?;
        let contents =
            serde_json::to_string_pretty(template).context("Failed to serialize template")?;
        std::fs::write(self.path_for(name), contents)
            .with_context(|| format!("Failed to write template {name}"))?;
        log::info!("Template saved: {name}");
        Ok(())
    }

    /// Load a template; `Ok(None)` when no template has that name.
    pub fn load(&self, name: &str) -> Result<Option<Template>> {
        if !self.exists(name) {
            return Ok(None);
        }
        read_template(&self.path_for(name)).map(Some)
    }

    /// Template names sorted alphabetically. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?;

        let mut names = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match read_template(&path) {
                Ok(_) => names.push(name.to_string()),
                Err(e) => log::warn!("Skipping template {}: {e:#}", path.display()),
            }
        }

        names.sort();
        Ok(names)
    }

    /// Delete a template. Returns `false` when it did not exist.
    pub fn delete(&self, name: &str) -> Result<bool> {
        if !self.exists(name) {
            return Ok(false);
        }
        std::fs::remove_file(self.path_for(name))
            .with_context(|| format!("Failed to delete template {name}"))?;
        Ok(true)
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        if !validate_template_name(new) {
            anyhow::bail!("Invalid template name: {new:?}");
        }
        if !self.exists(old) {
            anyhow::bail!("Template not found: {old}");
        }
        if self.exists(new) {
            anyhow::bail!("Template already exists: {new}");
        }
        std::fs::rename(self.path_for(old), self.path_for(new))
            .with_context(|| format!("Failed to rename template {old} to {new}"))?;
        Ok(())
    }

    /// Copy a template out to an arbitrary file.
    pub fn export(&self, name: &str, target: &Path) -> Result<()> {
        let template = self
            .load(name)?
            .with_context(|| format!("Template not found: {name}"))?;
        let contents =
            serde_json::to_string_pretty(&template).context("Failed to serialize template")?;
        std::fs::write(target, contents)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        Ok(())
    }

    /// Import a template file and return the name it was stored under.
    ///
    /// The name defaults to the file stem. An invalid or taken name gets a
    /// numeric suffix (`name_1`, `name_2`, ...) until it is free.
    pub fn import(&self, source: &Path, name: Option<&str>) -> Result<String> {
        let template = read_template(source)?;

        let base = match name {
            Some(name) => name.to_string(),
            None => source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let base: String = base
            .chars()
            .map(|c| if FORBIDDEN_CHARS.contains(&c) { '_' } else { c })
            .collect();
        let base = if base.is_empty() { "template".to_string() } else { base };

        let mut candidate: String = base.chars().take(MAX_NAME_LEN).collect();
        let mut counter = 1;
        while !validate_template_name(&candidate) || self.exists(&candidate) {
            if counter > 1000 {
                anyhow::bail!("No free template name for {base:?}");
            }
            candidate = numbered_name(&base, counter);
            counter += 1;
        }

        self.save(&candidate, &template)?;
        Ok(candidate)
    }
}

/// `base_N`, with `base` shortened so the result fits [`MAX_NAME_LEN`].
fn numbered_name(base: &str, counter: u32) -> String {
    let suffix = format!("_{counter}");
    let keep = MAX_NAME_LEN.saturating_sub(suffix.len());
    let head: String = base.chars().take(keep).collect();
    format!("{head}{suffix}")
}

fn read_template(path: &Path) -> Result<Template> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, TemplateStore) {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path().join("templates"));
        (dir, store)
    }

    fn sample() -> Template {
        Template {
            text: "© 2024".into(),
            opacity: 70,
            position: [1.0, 1.0],
        }
    }

    #[test]
    fn name_validation() {
        assert!(validate_template_name("corner stamp"));
        assert!(validate_template_name("水印"));
        assert!(validate_template_name("COM10"));
        assert!(validate_template_name("console"));

        assert!(!validate_template_name(""));
        assert!(!validate_template_name(&"x".repeat(51)));
        assert!(!validate_template_name("a/b"));
        assert!(!validate_template_name("what?"));
        assert!(!validate_template_name("tab\there"));
        assert!(!validate_template_name("con"));
        assert!(!validate_template_name("Lpt3"));
        assert!(!validate_template_name("COM1"));
    }

    #[test]
    fn save_load_round_trip() {
        let (_dir, store) = store();
        store.save("corner", &sample()).unwrap();
        assert_eq!(store.load("corner").unwrap(), Some(sample()));
        assert_eq!(store.load("missing").unwrap(), None);
    }

    #[test]
    fn save_rejects_invalid_name() {
        let (_dir, store) = store();
        assert!(store.save("NUL", &sample()).is_err());
    }

    #[test]
    fn list_is_sorted_and_skips_garbage() {
        let (_dir, store) = store();
        store.save("zeta", &sample()).unwrap();
        store.save("alpha", &sample()).unwrap();
        std::fs::write(store.dir().join("broken.json"), "nope").unwrap();
        std::fs::write(store.dir().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.list().unwrap(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn list_without_directory_is_empty() {
        let (_dir, store) = store();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn delete_reports_absence() {
        let (_dir, store) = store();
        store.save("gone", &sample()).unwrap();
        assert!(store.delete("gone").unwrap());
        assert!(!store.delete("gone").unwrap());
    }

    #[test]
    fn rename_rules() {
        let (_dir, store) = store();
        store.save("a", &sample()).unwrap();
        store.save("b", &sample()).unwrap();

        assert!(store.rename("a", "b").is_err());
        assert!(store.rename("a", "bad|name").is_err());
        assert!(store.rename("missing", "c").is_err());

        store.rename("a", "c").unwrap();
        assert!(!store.exists("a"));
        assert!(store.exists("c"));
    }

    #[test]
    fn export_then_import_deduplicates_name() {
        let (dir, store) = store();
        store.save("stamp", &sample()).unwrap();
        let file = dir.path().join("stamp.json");
        store.export("stamp", &file).unwrap();

        assert_eq!(store.import(&file, None).unwrap(), "stamp_1");
        assert_eq!(store.import(&file, None).unwrap(), "stamp_2");
        assert_eq!(store.import(&file, Some("fresh")).unwrap(), "fresh");
        assert_eq!(store.load("stamp_2").unwrap(), Some(sample()));
    }

    #[test]
    fn import_fixes_reserved_name() {
        let (dir, store) = store();
        let file = dir.path().join("aux.json");
        std::fs::write(&file, serde_json::to_string(&sample()).unwrap()).unwrap();
        assert_eq!(store.import(&file, None).unwrap(), "aux_1");
    }

    #[test]
    fn import_shortens_long_names_to_fit() {
        let (dir, store) = store();
        let long = "x".repeat(MAX_NAME_LEN);
        store.save(&long, &sample()).unwrap();

        let file = dir.path().join(format!("{long}.json"));
        std::fs::write(&file, serde_json::to_string(&sample()).unwrap()).unwrap();

        let first = store.import(&file, None).unwrap();
        assert_eq!(first, format!("{}_1", "x".repeat(MAX_NAME_LEN - 2)));
        let second = store.import(&file, None).unwrap();
        assert_eq!(second, format!("{}_2", "x".repeat(MAX_NAME_LEN - 2)));
        assert!(validate_template_name(&first) && validate_template_name(&second));

        let longer = "y".repeat(MAX_NAME_LEN + 20);
        let name = store.import(&file, Some(&longer)).unwrap();
        assert_eq!(name, "y".repeat(MAX_NAME_LEN));
        assert_eq!(store.load(&name).unwrap(), Some(sample()));
    }

    #[test]
    fn import_replaces_forbidden_characters() {
        let (dir, store) = store();
        let file = dir.path().join("plain.json");
        std::fs::write(&file, serde_json::to_string(&sample()).unwrap()).unwrap();
        assert_eq!(store.import(&file, Some("a:b")).unwrap(), "a_b");
    }

    #[test]
    fn import_rejects_invalid_json() {
        let (dir, store) = store();
        let file = dir.path().join("junk.json");
        std::fs::write(&file, "{}").unwrap();
        assert!(store.import(&file, None).is_err());
    }

    #[test]
    fn export_missing_template_fails() {
        let (dir, store) = store();
        assert!(store.export("nope", &dir.path().join("out.json")).is_err());
    }

    #[test]
    fn apply_to_clamps_into_config() {
        let template = Template {
            text: "hello".into(),
            opacity: 150,
            position: [2.0, 0.25],
        };
        let mut config = WatermarkConfig::default();
        template.apply_to(&mut config);
        assert_eq!(config.text, "hello");
        assert_eq!(config.opacity, 100);
        assert_eq!(config.position, (1.0, 0.25));
        assert_eq!(Template::from_config(&config).position, [1.0, 0.25]);
    }
}
