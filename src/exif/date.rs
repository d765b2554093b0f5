use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Date patterns tried in order. Each entry is `(date part, has time component)`.
///
/// Colon-delimited first since that is what EXIF writes, then the dash and
/// slash variants that show up in XMP-converted or hand-edited files.
const DATE_PATTERNS: &[(&str, bool)] = &[
    ("%Y:%m:%d", true),
    ("%Y-%m-%d", true),
    ("%Y/%m/%d", true),
    ("%Y:%m:%d", false),
    ("%Y-%m-%d", false),
    ("%Y/%m/%d", false),
];

const TIME_PATTERN: &str = "%H:%M:%S";

/// Parse a raw metadata date string into a calendar date.
///
/// Non-printable characters are stripped first (EXIF ASCII fields are often
/// NUL-padded or carry stray control bytes). When the string contains
/// whitespace only the text before the first whitespace is parsed, so the
/// time component never has to be valid.
///
/// Returns `None` when no pattern matches. Never panics.
///
/// ```rust
/// use photo_watermark::exif::parse_date;
///
/// let date = parse_date("2022:11:03 14:20:00").unwrap();
/// assert_eq!(date.format("%Y-%m-%d").to_string(), "2022-11-03");
/// assert!(parse_date("not a date").is_none());
/// ```
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = strip_non_printable(raw);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    let has_time = cleaned.contains(char::is_whitespace);
    let date_part = cleaned.split_whitespace().next()?;

    for (pattern, with_time) in DATE_PATTERNS {
        let parsed = if has_time {
            NaiveDate::parse_from_str(date_part, pattern).ok()
        } else if *with_time {
            NaiveDateTime::parse_from_str(cleaned, &format!("{pattern} {TIME_PATTERN}"))
                .ok()
                .map(|dt| dt.date())
        } else {
            NaiveDate::parse_from_str(cleaned, pattern).ok()
        };

        if parsed.is_some() {
            return parsed;
        }
    }

    None
}

/// Remove control and other non-printable characters, keeping plain spaces.
pub fn strip_non_printable(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() && (*c == ' ' || !c.is_whitespace()))
        .filter(|c| !matches!(c, '\u{200B}'..='\u{200F}' | '\u{FEFF}'))
        .collect()
}

/// Bring timestamps rendered by typed metadata readers back to EXIF form.
///
/// Structured readers hand back RFC 3339 (`2022-11-03T14:20:00+08:00`) or an
/// ISO `T`-separated local time; everything else passes through untouched.
pub(crate) fn normalize_timestamp(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('"');

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.format("%Y:%m:%d %H:%M:%S").to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, pattern) {
            return dt.format("%Y:%m:%d %H:%M:%S").to_string();
        }
    }

    trimmed.to_string()
}
