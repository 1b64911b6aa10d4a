//! Page geometry and text metrics
//!
//! All measurements are PDF points (1/72 inch), origin at the bottom-left.

/// US Letter, portrait
pub const LETTER_WIDTH: f32 = 612.0;
pub const LETTER_HEIGHT: f32 = 792.0;

/// 0.5 inch
pub const MARGIN: f32 = 36.0;

/// Band above the bottom margin reserved for the page number
pub const FOOTER_HEIGHT: f32 = 36.0;

/// Embedded images are capped at this resolution relative to the content box
const MAX_IMAGE_DPI: f32 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn contains(&self, other: &Rect) -> bool {
        const EPS: f32 = 0.01;
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.x + other.width <= self.x + self.width + EPS
            && other.y + other.height <= self.y + self.height + EPS
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub footer_height: f32,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::letter()
    }
}

impl PageLayout {
    pub fn letter() -> Self {
        Self {
            width: LETTER_WIDTH,
            height: LETTER_HEIGHT,
            margin: MARGIN,
            footer_height: FOOTER_HEIGHT,
        }
    }

    /// Area available to page content, above the footer band
    pub fn content_box(&self) -> Rect {
        Rect {
            x: self.margin,
            y: self.margin + self.footer_height,
            width: self.width - 2.0 * self.margin,
            height: self.height - 2.0 * self.margin - self.footer_height,
        }
    }

    /// Baseline of the page-number line, vertically centered in the footer band
    pub fn footer_baseline(&self, font_size: f32) -> f32 {
        self.margin + (self.footer_height - font_size) / 2.0
    }

    /// Placement of a `px_width` × `px_height` image: scaled to fit the content
    /// box with its aspect ratio kept, centered on both axes.
    pub fn fit_image(&self, px_width: u32, px_height: u32) -> Rect {
        let area = self.content_box();
        if px_width == 0 || px_height == 0 {
            return area;
        }

        let scale = (area.width / px_width as f32).min(area.height / px_height as f32);
        let width = px_width as f32 * scale;
        let height = px_height as f32 * scale;

        Rect {
            x: area.x + (area.width - width) / 2.0,
            y: area.y + (area.height - height) / 2.0,
            width,
            height,
        }
    }

    /// Largest pixel size worth embedding; bigger images are downsampled
    pub fn max_image_pixels(&self) -> (u32, u32) {
        let area = self.content_box();
        let per_point = MAX_IMAGE_DPI / 72.0;
        (
            (area.width * per_point).round() as u32,
            (area.height * per_point).round() as u32,
        )
    }
}

/// Helvetica advance widths for WinAnsi codes 32..=126, in 1/1000 em
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

fn char_width(c: char) -> u16 {
    match c as u32 {
        code @ 32..=126 => HELVETICA_WIDTHS[(code - 32) as usize],
        _ => 556,
    }
}

/// Rendered width of `text` in Helvetica at `size` points
pub fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| char_width(c) as u32).sum();
    units as f32 * size / 1000.0
}

/// Greedy word wrap to `max_width`. Words wider than a line are split.
pub fn wrap_text(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };

        if text_width(&candidate, size) <= max_width {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }

        if text_width(word, size) <= max_width {
            current = word.to_string();
        } else {
            for c in word.chars() {
                current.push(c);
                if text_width(&current, size) > max_width && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                }
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
