#[cfg(feature = "pdf")]
mod pdfium;

#[cfg(feature = "pdf")]
pub use pdfium::{PdfiumDocument, PdfiumRenderFactory};

/// Render scale that fits a page's longest edge into `max_dimension`
/// pixels.
pub fn thumbnail_scale(page_width: f32, page_height: f32, max_dimension: u32) -> f32 {
    let longest = page_width.max(page_height);
    if !longest.is_finite() || longest <= 0.0 {
        return 1.0;
    }
    max_dimension.max(1) as f32 / longest
}

/// Inverts the colour channels of an RGBA buffer in place, leaving alpha.
pub fn invert_pixels(pixels: &mut [u8]) {
    for chunk in pixels.chunks_exact_mut(4) {
        chunk[0] = 255 - chunk[0];
        chunk[1] = 255 - chunk[1];
        chunk[2] = 255 - chunk[2];
    }
}

/// Whether a blank page must precede an appended page so that it starts a
/// new duplex sheet.
pub fn needs_duplex_padding(page_count: usize, duplex: bool) -> bool {
    duplex && page_count % 2 == 1
}
