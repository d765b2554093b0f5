//! Line wrapping and text block measurement.
//!
//! Wrapping is a character-count approximation: the number of characters per
//! line is estimated from the font size rather than measured glyph by glyph.
//! It sits behind [`TextWrap`] so a measuring implementation can replace it.

use crate::font::WatermarkFont;

/// Extra vertical space between consecutive lines, in pixels.
pub const LINE_SPACING: u32 = 4;

/// Strategy for breaking watermark text into lines.
pub trait TextWrap: Send + Sync {
    /// Wrap `text` so each line roughly fits in `max_width` pixels when drawn
    /// with `font`. Lines are joined with `\n`.
    fn wrap(&self, text: &str, max_width: u32, font: &WatermarkFont) -> String;
}

/// Estimates a character budget per line as `max_width / (font size / 2)`.
///
/// Explicit line breaks are kept, and an empty paragraph stays an empty line.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharCountWrap;

impl TextWrap for CharCountWrap {
    fn wrap(&self, text: &str, max_width: u32, font: &WatermarkFont) -> String {
        let char_width = (font.size() / 2).max(1);
        let per_line = (max_width / char_width).max(1) as usize;

        text.split('\n')
            .flat_map(|paragraph| wrap_paragraph(paragraph, per_line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Greedy word wrap of one paragraph to at most `width` characters per line.
///
/// Runs of whitespace collapse to single spaces; words longer than `width`
/// are split. A blank paragraph yields a single empty line.
pub fn wrap_paragraph(paragraph: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in paragraph.split_whitespace() {
        let len = word.chars().count();

        if current_len > 0 && current_len + 1 + len <= width {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + len;
            continue;
        }

        if current_len > 0 {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }

        let mut rest: Vec<char> = word.chars().collect();
        while rest.len() > width {
            let tail = rest.split_off(width);
            lines.push(rest.into_iter().collect());
            rest = tail;
        }
        current_len = rest.len();
        current = rest.into_iter().collect();
    }

    if current_len > 0 {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

/// Vertical distance between the tops of consecutive lines.
pub fn line_advance(font: &WatermarkFont) -> u32 {
    font.line_height() + LINE_SPACING
}

/// Bounding box `(width, height)` of a (possibly multi-line) text block.
pub fn measure(text: &str, font: &WatermarkFont) -> (u32, u32) {
    let lines: Vec<&str> = text.split('\n').collect();
    let width = lines.iter().map(|line| font.line_width(line)).max().unwrap_or(0);
    let height = font.line_height() + (lines.len() as u32 - 1) * line_advance(font);
    (width, height)
}
