use chrono::{Local, TimeZone};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tempfile::TempDir;

use photo_watermark::exif::{
    DateProbe, StructuredExifProbe, TagScanProbe, default_probes, extract_raw_date, parse_date,
};
use photo_watermark::font::{FontCandidates, FontResolver};
use photo_watermark::pipeline::{
    BatchOptions, MetadataSource, NamingRule, resolve_watermark_text, run_batch,
};
use photo_watermark::watermark::{ExportFormat, WatermarkConfig, Watermarker};

const DATE_TIME: u16 = 0x0132;
const EXIF_IFD_POINTER: u16 = 0x8769;
const GPS_IFD_POINTER: u16 = 0x8825;
const DATE_TIME_ORIGINAL: u16 = 0x9003;
const DATE_TIME_DIGITIZED: u16 = 0x9004;
const GPS_DATE_STAMP: u16 = 0x001d;

/// Write one IFD of ASCII entries (plus an optional sub-IFD pointer) at the
/// end of `tiff`. Values go to `values`, which starts at `data_start`.
fn push_ifd(
    tiff: &mut Vec<u8>,
    entries: &[(u16, &str)],
    pointer: Option<(u16, u32)>,
    data_start: usize,
    values: &mut Vec<u8>,
) {
    let count = entries.len() + usize::from(pointer.is_some());
    tiff.extend_from_slice(&(count as u16).to_le_bytes());
    for (tag, text) in entries {
        tiff.extend_from_slice(&tag.to_le_bytes());
        tiff.extend_from_slice(&2u16.to_le_bytes());
        tiff.extend_from_slice(&(text.len() as u32 + 1).to_le_bytes());
        tiff.extend_from_slice(&((data_start + values.len()) as u32).to_le_bytes());
        values.extend_from_slice(text.as_bytes());
        values.push(0);
    }
    if let Some((tag, offset)) = pointer {
        tiff.extend_from_slice(&tag.to_le_bytes());
        tiff.extend_from_slice(&4u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&offset.to_le_bytes());
    }
    tiff.extend_from_slice(&0u32.to_le_bytes());
}

/// Little-endian TIFF block with ASCII entries in IFD0 and, optionally, in
/// one sub-IFD reached through `sub.0` (Exif or GPS pointer tag).
/// Every value must be longer than four bytes so it lives out of line.
fn exif_tiff(ifd0: &[(u16, &str)], sub: Option<(u16, &[(u16, &str)])>) -> Vec<u8> {
    assert!(ifd0.iter().chain(sub.iter().flat_map(|s| s.1)).all(|(_, v)| v.len() >= 4));

    let ifd_size = |n: usize| 2 + 12 * n + 4;
    let sub_offset = 8 + ifd_size(ifd0.len() + usize::from(sub.is_some()));
    let data_start = sub_offset + sub.map_or(0, |(_, entries)| ifd_size(entries.len()));

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II\x2a\x00");
    tiff.extend_from_slice(&8u32.to_le_bytes());

    let mut values = Vec::new();
    let pointer = sub.map(|(tag, _)| (tag, sub_offset as u32));
    push_ifd(&mut tiff, ifd0, pointer, data_start, &mut values);
    if let Some((_, entries)) = sub {
        push_ifd(&mut tiff, entries, None, data_start, &mut values);
    }
    assert_eq!(tiff.len(), data_start);

    tiff.extend_from_slice(&values);
    tiff
}

fn write_jpeg_with_exif(path: &Path, tiff: &[u8]) {
    let image = RgbImage::from_pixel(320, 240, Rgb([40, 80, 120]));
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 90)
        .encode_image(&image)
        .unwrap();

    let mut app1 = vec![0xFF, 0xE1];
    app1.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(tiff);

    // Right after SOI.
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&app1);
    out.extend_from_slice(&jpeg[2..]);
    fs::write(path, out).unwrap();
}

fn write_dated_jpeg(path: &Path, date: &str) {
    let exif_ifd: &[(u16, &str)] = &[(DATE_TIME_ORIGINAL, date)];
    let tiff = exif_tiff(&[], Some((EXIF_IFD_POINTER, exif_ifd)));
    write_jpeg_with_exif(path, &tiff);
}

fn write_plain_png(path: &Path) {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([200, 200, 200])))
        .save(path)
        .unwrap();
}

fn set_mtime(path: &Path, y: i32, m: u32, d: u32) {
    let when: SystemTime = Local.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap().into();
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(when)
        .unwrap();
}

fn watermarker() -> Watermarker {
    Watermarker::new(FontResolver::new(FontCandidates::none()))
}

#[test]
fn batch_dates_from_exif_and_mtime() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("photos");
    fs::create_dir(&input).unwrap();

    write_dated_jpeg(&input.join("a_dated.jpg"), "2022:11:03 14:20:00");
    write_plain_png(&input.join("b_plain.png"));
    set_mtime(&input.join("b_plain.png"), 2023, 5, 1);
    fs::write(input.join("c_notes.txt"), "not an image").unwrap();

    let output = dir.path().join("out");
    let options = BatchOptions {
        output_dir: output.clone(),
        export_format: ExportFormat::Png,
        ..BatchOptions::default()
    };

    let report = run_batch(
        &input,
        &WatermarkConfig::default(),
        &options,
        &watermarker(),
        &default_probes(),
    )
    .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped, 1);
    assert!(report.failures.is_empty());

    let dated = &report.results[0];
    assert_eq!(dated.source_filename, "a_dated.jpg");
    assert_eq!(dated.resolved_text, "2022-11-03");
    assert_eq!(dated.metadata_source, MetadataSource::MetadataDate);
    assert_eq!(dated.image_dimensions, (320, 240));
    assert_eq!(dated.output_path, output.join("a_dated.png"));

    let plain = &report.results[1];
    assert_eq!(plain.resolved_text, "2023-05-01");
    assert_eq!(plain.metadata_source, MetadataSource::FileMtime);

    let written = image::open(output.join("b_plain.png")).unwrap();
    assert_eq!((written.width(), written.height()), (200, 100));
    assert!(!output.join("c_notes.png").exists());
}

#[test]
fn batch_leaves_originals_untouched() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("photos");
    fs::create_dir(&input).unwrap();
    let source = input.join("shot.jpg");
    write_dated_jpeg(&source, "2021:01:02 03:04:05");
    let before = fs::read(&source).unwrap();

    let options = BatchOptions {
        output_dir: dir.path().join("out"),
        naming_rule: NamingRule::Suffix,
        suffix: "_dated".into(),
        ..BatchOptions::default()
    };
    let report = run_batch(
        &source,
        &WatermarkConfig::default(),
        &options,
        &watermarker(),
        &default_probes(),
    )
    .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.results[0].resolved_text, "2021-01-02");
    assert!(dir.path().join("out").join("shot_dated.jpg").is_file());
    assert_eq!(fs::read(&source).unwrap(), before);
}

#[test]
fn report_serializes_for_json_output() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("pic.png");
    write_plain_png(&source);

    let options = BatchOptions {
        output_dir: dir.path().join("out"),
        ..BatchOptions::default()
    };
    let report = run_batch(
        &source,
        &WatermarkConfig::default(),
        &options,
        &watermarker(),
        &default_probes(),
    )
    .unwrap();

    let json = serde_json::to_value(&report.results).unwrap();
    assert_eq!(json[0]["source_filename"], "pic.png");
    assert_eq!(json[0]["metadata_source"], "file-mtime");
    assert_eq!(json[0]["image_dimensions"], serde_json::json!([200, 100]));
    assert!(json[0]["resolved_position_pixels"].is_array());
    assert!(json[0].get("position").is_none());
}

#[test]
fn ifd0_datetime_is_used_without_original_date() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("edited.jpg");
    write_jpeg_with_exif(&path, &exif_tiff(&[(DATE_TIME, "2020:02:29 08:00:00")], None));
    set_mtime(&path, 2024, 6, 1);

    let structured = StructuredExifProbe.probe(&path).unwrap();
    let date = parse_date(&structured).unwrap();
    assert_eq!(date.format("%Y-%m-%d").to_string(), "2020-02-29");

    assert_eq!(TagScanProbe.probe(&path).as_deref(), Some("2020:02:29 08:00:00"));

    let (text, source) = resolve_watermark_text(&path, &default_probes()).unwrap();
    assert_eq!(text, "2020-02-29");
    assert_eq!(source, MetadataSource::MetadataDate);
}

#[test]
fn tag_scan_finds_digitized_date() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scan.jpg");
    let exif_ifd: &[(u16, &str)] = &[(DATE_TIME_DIGITIZED, "2019:07:14 10:11:12")];
    let tiff = exif_tiff(&[], Some((EXIF_IFD_POINTER, exif_ifd)));
    write_jpeg_with_exif(&path, &tiff);
    set_mtime(&path, 2024, 6, 1);

    assert_eq!(StructuredExifProbe.probe(&path), None);
    assert_eq!(TagScanProbe.probe(&path).as_deref(), Some("2019:07:14 10:11:12"));
    assert_eq!(
        extract_raw_date(&path, &default_probes()).as_deref(),
        Some("2019:07:14 10:11:12")
    );

    let (text, source) = resolve_watermark_text(&path, &default_probes()).unwrap();
    assert_eq!(text, "2019-07-14");
    assert_eq!(source, MetadataSource::MetadataDate);
}

#[test]
fn tag_scan_falls_back_to_any_date_named_tag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gps.jpg");
    let gps_ifd: &[(u16, &str)] = &[(GPS_DATE_STAMP, "2022:11:03")];
    let tiff = exif_tiff(&[], Some((GPS_IFD_POINTER, gps_ifd)));
    write_jpeg_with_exif(&path, &tiff);
    set_mtime(&path, 2024, 6, 1);

    assert_eq!(StructuredExifProbe.probe(&path), None);
    assert_eq!(TagScanProbe.probe(&path).as_deref(), Some("2022:11:03"));

    let (text, source) = resolve_watermark_text(&path, &default_probes()).unwrap();
    assert_eq!(text, "2022-11-03");
    assert_eq!(source, MetadataSource::MetadataDate);
}
