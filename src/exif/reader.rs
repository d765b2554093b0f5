use nom_exif::*;
use std::path::Path;

use super::date::normalize_timestamp;

/// A single strategy for pulling a raw capture-date string out of a file.
///
/// Probes are tried in order by [`extract_raw_date`]; the first one that
/// returns `Some` wins. Implementations must swallow their own failures:
/// a corrupt or missing metadata block is simply "not found".
pub trait DateProbe {
    /// Short name used in log output.
    fn name(&self) -> &str;
    /// Return the raw date string, or `None` when this probe finds nothing.
    fn probe(&self, path: &Path) -> Option<String>;
}

/// Structured EXIF reader: `DateTimeOriginal`, then the generic `DateTime`
/// (last modified) tag of IFD0.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredExifProbe;

impl DateProbe for StructuredExifProbe {
    fn name(&self) -> &str {
        "structured-exif"
    }

    fn probe(&self, path: &Path) -> Option<String> {
        let mut parser = MediaParser::new();
        let ms = match MediaSource::file_path(path) {
            Ok(ms) => ms,
            Err(e) => {
                log::debug!("Cannot open {} for EXIF: {e}", path.display());
                return None;
            }
        };

        let iter: ExifIter = match parser.parse(ms) {
            Ok(iter) => iter,
            Err(_) => {
                log::debug!("No EXIF data found in {}", path.display());
                return None;
            }
        };
        let exif: Exif = iter.into();

        [ExifTag::DateTimeOriginal, ExifTag::ModifyDate]
            .into_iter()
            .find_map(|tag| exif.get(tag).and_then(entry_to_string))
    }
}

/// Tags checked by [`TagScanProbe`] before it falls back to scanning.
const WELL_KNOWN_DATE_TAGS: &[rexif::ExifTag] = &[
    rexif::ExifTag::DateTimeOriginal,
    rexif::ExifTag::DateTime,
    rexif::ExifTag::DateTimeDigitized,
];

/// Generic tag scanner.
///
/// Looks at a fixed list of well-known date tags first, then at every entry
/// whose tag name mentions "date" or "time", returning the first
/// string-valued match.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagScanProbe;

impl DateProbe for TagScanProbe {
    fn name(&self) -> &str {
        "tag-scan"
    }

    fn probe(&self, path: &Path) -> Option<String> {
        let exif = match rexif::parse_file(path) {
            Ok(data) => data,
            Err(e) => {
                log::debug!("Tag scan found no EXIF in {}: {e}", path.display());
                return None;
            }
        };

        for tag in WELL_KNOWN_DATE_TAGS {
            let found = exif
                .entries
                .iter()
                .filter(|e| e.tag == *tag)
                .find_map(ascii_value);
            if found.is_some() {
                return found;
            }
        }

        exif.entries
            .iter()
            .filter(|e| {
                let name = format!("{:?}", e.tag).to_lowercase();
                name.contains("date") || name.contains("time")
            })
            .find_map(ascii_value)
    }
}

/// The default probe chain: structured reader first, generic scan second.
pub fn default_probes() -> Vec<Box<dyn DateProbe>> {
    vec![Box::new(StructuredExifProbe), Box::new(TagScanProbe)]
}

/// Run the probe chain and return the first raw date string found.
pub fn extract_raw_date(path: &Path, probes: &[Box<dyn DateProbe>]) -> Option<String> {
    for probe in probes {
        if let Some(raw) = probe.probe(path) {
            log::debug!("{}: raw date {raw:?} via {}", path.display(), probe.name());
            return Some(raw);
        }
    }
    None
}

/// Every metadata entry the generic reader sees, as `(tag, value)` pairs.
///
/// Used for `--debug` output. Returns an empty list on any read failure.
pub fn dump_entries(path: &Path) -> Vec<(String, String)> {
    match rexif::parse_file(path) {
        Ok(exif) => exif
            .entries
            .iter()
            .map(|e| (format!("{:?}", e.tag), e.value_more_readable.trim().to_string()))
            .collect(),
        Err(e) => {
            log::debug!("No metadata to dump for {}: {e}", path.display());
            Vec::new()
        }
    }
}

/// Convert an EntryValue to an Option<String>.
fn entry_to_string(val: &EntryValue) -> Option<String> {
    let s = normalize_timestamp(&val.to_string());
    if s.trim().is_empty() { None } else { Some(s) }
}

fn ascii_value(entry: &rexif::ExifEntry) -> Option<String> {
    match &entry.value {
        rexif::TagValue::Ascii(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct FixedProbe {
        value: Option<&'static str>,
        calls: Cell<usize>,
    }

    impl DateProbe for FixedProbe {
        fn name(&self) -> &str {
            "fixed"
        }

        fn probe(&self, _path: &Path) -> Option<String> {
            self.calls.set(self.calls.get() + 1);
            self.value.map(str::to_string)
        }
    }

    #[test]
    fn first_probe_wins() {
        let probes: Vec<Box<dyn DateProbe>> = vec![
            Box::new(FixedProbe { value: Some("2022:11:03 14:20:00"), calls: Cell::new(0) }),
            Box::new(FixedProbe { value: Some("1999:01:01 00:00:00"), calls: Cell::new(0) }),
        ];
        let raw = extract_raw_date(Path::new("a.jpg"), &probes);
        assert_eq!(raw.as_deref(), Some("2022:11:03 14:20:00"));
    }

    #[test]
    fn falls_through_to_later_probe() {
        let probes: Vec<Box<dyn DateProbe>> = vec![
            Box::new(FixedProbe { value: None, calls: Cell::new(0) }),
            Box::new(FixedProbe { value: Some("2020-05-05"), calls: Cell::new(0) }),
        ];
        let raw = extract_raw_date(Path::new("a.jpg"), &probes);
        assert_eq!(raw.as_deref(), Some("2020-05-05"));
    }

    #[test]
    fn empty_chain_finds_nothing() {
        assert_eq!(extract_raw_date(Path::new("a.jpg"), &[]), None);
    }

    #[test]
    fn readers_swallow_missing_files() {
        let path = Path::new("/nonexistent/photo.jpg");
        assert_eq!(StructuredExifProbe.probe(path), None);
        assert_eq!(TagScanProbe.probe(path), None);
        assert!(dump_entries(path).is_empty());
    }

    #[test]
    fn readers_swallow_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.jpg");
        std::fs::write(&path, b"\xFF\xD8\xFF\xE1\x00\x10Exif\x00\x00garbage").unwrap();

        assert_eq!(extract_raw_date(&path, &default_probes()), None);
    }
}
