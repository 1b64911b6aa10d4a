//! Coloring book composition
//!
//! One cover page followed by one page per image reference, in submission
//! order. An image that cannot be resolved or decoded gets a placeholder page
//! instead, so page numbering never shifts.

use std::io::Write;
use std::sync::Arc;

use image::{imageops::FilterType, GrayAlphaImage, GrayImage, Luma, LumaA};
use lopdf::Document;
use thiserror::Error;

use crate::images::{ImageRef, ImageResolver, ResolutionError};
use crate::jobs::CancelToken;

use super::layout::{wrap_text, PageLayout};
use super::pdf::{PageCanvas, PdfBuilder};

/// Cover title used when a submission has none
pub const DEFAULT_TITLE: &str = "My Coloring Book";

const SUBTITLE: &str = "A Personalized Coloring Book";
const INSTRUCTIONS: [&str; 3] = [
    "Grab your crayons, markers or colored pencils.",
    "Each page is one of your pictures, ready to color.",
    "There is no wrong way to do it. Have fun!",
];

const TITLE_SIZE: f32 = 28.0;
const FOOTER_SIZE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Cover,
    /// Input image `index` (0-based) drawn on the page
    Image { index: usize },
    /// Input image `index` could not be included
    Placeholder { index: usize },
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("composition cancelled")]
    Cancelled,
}

/// A composed, not yet serialized, book
pub struct ColoringBook {
    document: Document,
    pages: Vec<PageKind>,
    title: String,
}

impl ColoringBook {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[PageKind] {
        &self.pages
    }

    pub fn placeholder_count(&self) -> usize {
        self.pages
            .iter()
            .filter(|p| matches!(p, PageKind::Placeholder { .. }))
            .count()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Compress streams and serialize the PDF
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> std::io::Result<()> {
        self.document.compress();
        self.document.save_to(writer)
    }
}

/// Lays out resolved images into a [`ColoringBook`]
pub struct BookComposer {
    resolver: Arc<ImageResolver>,
    layout: PageLayout,
}

impl BookComposer {
    pub fn new(resolver: Arc<ImageResolver>) -> Self {
        Self {
            resolver,
            layout: PageLayout::letter(),
        }
    }

    /// Compose the book. Images are resolved one at a time, in order.
    ///
    /// Per-image failures become placeholder pages; the only error is
    /// cancellation, observed between images.
    pub async fn compose(
        &self,
        images: &[ImageRef],
        title: &str,
        cancel: &CancelToken,
    ) -> Result<ColoringBook, ComposeError> {
        let total_pages = images.len() + 1;
        let mut builder = PdfBuilder::new(self.layout);
        let mut pages = Vec::with_capacity(total_pages);

        builder.add_page(self.cover_page(title, total_pages));
        pages.push(PageKind::Cover);

        for (index, image) in images.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(image_index = index, "Composition cancelled");
                return Err(ComposeError::Cancelled);
            }

            let mut canvas = PageCanvas::new();
            match self.load_page_image(image).await {
                Ok(gray) => {
                    let placement = self.layout.fit_image(gray.width(), gray.height());
                    let image_id = builder.add_gray_image(&gray);
                    canvas.image(image_id, placement);
                    pages.push(PageKind::Image { index });
                    tracing::debug!(
                        image_index = index,
                        width = gray.width(),
                        height = gray.height(),
                        "Image page drawn"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        image_index = index,
                        kind = image.kind(),
                        reference = %image,
                        error = %e,
                        "Image could not be included, drawing placeholder"
                    );
                    self.draw_placeholder(&mut canvas, index);
                    pages.push(PageKind::Placeholder { index });
                }
            }

            self.draw_footer(&mut canvas, index + 2, total_pages);
            builder.add_page(canvas);
        }

        Ok(ColoringBook {
            document: builder.finish(title),
            pages,
            title: title.to_string(),
        })
    }

    async fn load_page_image(&self, image: &ImageRef) -> Result<GrayImage, ResolutionError> {
        let resolved = self.resolver.resolve(image).await?;
        let max = self.layout.max_image_pixels();

        tokio::task::spawn_blocking(move || decode_grayscale(&resolved.data, max))
            .await
            .map_err(|e| ResolutionError::Decode(format!("decoder task failed: {}", e)))?
    }

    fn cover_page(&self, title: &str, total_pages: usize) -> PageCanvas {
        let mut canvas = PageCanvas::new();
        let area = self.layout.content_box();
        let center = area.center_x();

        let mut baseline = self.layout.height * 0.68;
        for line in wrap_text(title, TITLE_SIZE, area.width) {
            canvas.centered_text(&line, TITLE_SIZE, center, baseline);
            baseline -= TITLE_SIZE * 1.25;
        }

        baseline -= 14.0;
        canvas.centered_text(SUBTITLE, 16.0, center, baseline);
        baseline -= 28.0;
        canvas.centered_text(&format!("{} pages", total_pages), 12.0, center, baseline);

        canvas.fill_gray(0.35);
        let mut baseline = area.y + 120.0;
        for line in INSTRUCTIONS {
            canvas.centered_text(line, 11.0, center, baseline);
            baseline -= 16.0;
        }
        canvas.fill_gray(0.0);

        canvas
    }

    fn draw_placeholder(&self, canvas: &mut PageCanvas, index: usize) {
        let area = self.layout.content_box();
        canvas.frame(area, 0.6, true);
        canvas.centered_text(
            &format!("Image {} could not be included", index + 1),
            18.0,
            area.center_x(),
            area.center_y() + 8.0,
        );
        canvas.fill_gray(0.35);
        canvas.centered_text(
            "The picture could not be loaded or read as an image.",
            11.0,
            area.center_x(),
            area.center_y() - 16.0,
        );
        canvas.fill_gray(0.0);
    }

    fn draw_footer(&self, canvas: &mut PageCanvas, page: usize, total: usize) {
        canvas.centered_text(
            &format!("Page {} of {}", page, total),
            FOOTER_SIZE,
            self.layout.width / 2.0,
            self.layout.footer_baseline(FOOTER_SIZE),
        );
    }
}

/// Decode, cap the resolution and flatten onto white
fn decode_grayscale(data: &[u8], max: (u32, u32)) -> Result<GrayImage, ResolutionError> {
    let mut decoded =
        image::load_from_memory(data).map_err(|e| ResolutionError::Decode(e.to_string()))?;

    let (max_width, max_height) = max;
    if decoded.width() > max_width || decoded.height() > max_height {
        decoded = decoded.resize(max_width, max_height, FilterType::Triangle);
    }

    Ok(flatten_on_white(&decoded.to_luma_alpha8()))
}

fn flatten_on_white(image: &GrayAlphaImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let LumaA([luma, alpha]) = *image.get_pixel(x, y);
        let (luma, alpha) = (luma as u32, alpha as u32);
        Luma([((luma * alpha + 255 * (255 - alpha)) / 255) as u8])
    })
}
