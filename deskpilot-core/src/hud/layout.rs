//! Paragraph numbering and word wrapping for the HUD.

/// Measures rendered text width in pixels.
pub trait TextMeasure {
    fn text_width(&self, text: &str) -> u32;
}

/// Narrowest wrap width regardless of surface size.
pub const MIN_WRAP_WIDTH: u32 = 200;

/// Wrap width for a surface `surface_width` pixels wide.
pub fn wrap_width(surface_width: u32, max_width: u32, margin: u32) -> u32 {
    let usable = surface_width.saturating_sub(margin.saturating_mul(2));
    max_width.min(MIN_WRAP_WIDTH.max(usable))
}

/// `"01| "`, `"02| "`, …
pub fn line_prefix(index: usize) -> String {
    format!("{index:02}| ")
}

/// Break `text` into the display lines of the HUD.
///
/// Non-blank paragraphs are kept up to `max_paragraphs`, numbered from 1
/// and greedily wrapped to `width` pixels. Continuation lines are indented
/// by as many spaces as the prefix has characters. A word that alone
/// exceeds the width stays on its own line unbroken.
pub fn layout<M: TextMeasure + ?Sized>(
    text: &str,
    max_paragraphs: usize,
    width: u32,
    measure: &M,
) -> Vec<String> {
    let mut lines = Vec::new();

    let paragraphs = text
        .split('\n')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .take(max_paragraphs);

    for (i, paragraph) in paragraphs.enumerate() {
        let prefix = line_prefix(i + 1);
        let indent = " ".repeat(prefix.chars().count());

        let mut lead = prefix.as_str();
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{lead}{current} {word}");
            if measure.text_width(&candidate) > width {
                lines.push(format!("{lead}{current}"));
                lead = indent.as_str();
                current.clear();
                current.push_str(word);
            } else {
                current.push(' ');
                current.push_str(word);
            }
        }
        lines.push(format!("{lead}{current}"));
    }

    lines
}
