//! Low-level PDF assembly on top of lopdf
//!
//! Pages are drawn onto a [`PageCanvas`] as raw content-stream operators and
//! appended to a [`PdfBuilder`], which owns the object table.

use image::GrayImage;
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::layout::{text_width, PageLayout, Rect};

const FONT_NAME: &str = "F1";

/// Content stream for one page
#[derive(Debug, Default)]
pub struct PageCanvas {
    ops: String,
    images: Vec<(String, ObjectId)>,
}

impl PageCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw `text` horizontally centered on `center_x` with its baseline at `baseline`
    pub fn centered_text(&mut self, text: &str, size: f32, center_x: f32, baseline: f32) {
        let x = center_x - text_width(text, size) / 2.0;
        self.text(text, size, x, baseline);
    }

    pub fn text(&mut self, text: &str, size: f32, x: f32, baseline: f32) {
        self.ops.push_str(&format!(
            "BT\n/{} {:.1} Tf\n{:.2} {:.2} Td\n({}) Tj\nET\n",
            FONT_NAME,
            size,
            x,
            baseline,
            escape_pdf_string(text)
        ));
    }

    /// Set the fill gray level (0 = black, 1 = white) for following text
    pub fn fill_gray(&mut self, level: f32) {
        self.ops.push_str(&format!("{:.2} g\n", level));
    }

    /// Paint an embedded image into `rect`
    pub fn image(&mut self, image_id: ObjectId, rect: Rect) {
        let name = format!("Im{}", self.images.len() + 1);
        self.ops.push_str(&format!(
            "q\n{:.2} 0 0 {:.2} {:.2} {:.2} cm\n/{} Do\nQ\n",
            rect.width, rect.height, rect.x, rect.y, name
        ));
        self.images.push((name, image_id));
    }

    /// Outline `rect`, dashed when `dashed` is set
    pub fn frame(&mut self, rect: Rect, gray: f32, dashed: bool) {
        let dash = if dashed { "[6 4] 0 d\n" } else { "" };
        self.ops.push_str(&format!(
            "q\n{:.2} G\n1 w\n{}{:.2} {:.2} {:.2} {:.2} re\nS\nQ\n",
            gray, dash, rect.x, rect.y, rect.width, rect.height
        ));
    }
}

/// Accumulates pages into a single document
pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    page_ids: Vec<ObjectId>,
    layout: PageLayout,
}

impl PdfBuilder {
    pub fn new(layout: PageLayout) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        Self {
            doc,
            pages_id,
            font_id,
            page_ids: Vec::new(),
            layout,
        }
    }

    /// Embed an 8-bit grayscale image as a Flate-compressed XObject.
    ///
    /// The document holds every page until it is published, so pixels are
    /// never kept raw.
    pub fn add_gray_image(&mut self, image: &GrayImage) -> ObjectId {
        let mut stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width() as i64,
                "Height" => image.height() as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            image.as_raw().clone(),
        );
        if let Err(e) = stream.compress() {
            tracing::warn!(error = %e, "Image stream left uncompressed");
        }
        self.doc.add_object(stream)
    }

    pub fn add_page(&mut self, canvas: PageCanvas) {
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, canvas.ops.into_bytes()));

        let mut xobjects = lopdf::Dictionary::new();
        for (name, id) in canvas.images {
            xobjects.set(name, id);
        }

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                self.layout.width.into(),
                self.layout.height.into(),
            ],
            "Resources" => dictionary! {
                "Font" => dictionary! {
                    FONT_NAME => self.font_id,
                },
                "XObject" => xobjects,
            },
            "Contents" => content_id,
        });
        self.page_ids.push(page_id);
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Write the page tree, catalog and info dictionary
    pub fn finish(mut self, title: &str) -> Document {
        let kids: Vec<Object> = self.page_ids.iter().map(|id| (*id).into()).collect();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Title" => text_string(title),
            "Producer" => Object::string_literal("coloring-book-server"),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);

        self.doc
    }
}

/// Escape text for a literal string shown with the WinAnsi-encoded font.
/// Latin-1 characters become octal escapes; anything beyond is replaced.
fn escape_pdf_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            c if c.is_ascii() && !c.is_control() => out.push(c),
            c if ('\u{a0}'..='\u{ff}').contains(&c) => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            _ => out.push('?'),
        }
    }
    out
}

/// PDF text string for document metadata: plain when ASCII, UTF-16BE otherwise
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::string_literal(s);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}
