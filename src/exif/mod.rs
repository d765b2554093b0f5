//! Capture-date extraction from embedded image metadata.
//!
//! - [`extract_raw_date`]: run an ordered chain of [`DateProbe`]s and return
//!   the first raw date string found
//! - [`parse_date`]: normalize a raw date string into a calendar date
//! - [`dump_entries`]: list every metadata entry (debug output)
//!
//! The default chain ([`default_probes`]) tries a structured EXIF reader for
//! `DateTimeOriginal`/`DateTime` first, then a generic scanner that walks all
//! tags whose name mentions a date or time. Reader failures are never fatal.

mod date;
mod reader;

pub use date::{parse_date, strip_non_printable};
pub use reader::{
    DateProbe, StructuredExifProbe, TagScanProbe, default_probes, dump_entries, extract_raw_date,
};
