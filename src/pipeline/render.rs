//! PDF rasterisation: render every page to a PNG file via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Why write files instead of returning images?
//!
//! A 200-page deck rendered at 2× would hold hundreds of megapixels in
//! memory at once. Writing each page to `<pages_dir>/page_N.png` and
//! dropping the bitmap immediately keeps peak memory at one page, and the
//! files double as a debugging record of exactly what the model saw.
//!
//! ## Why cap pixels, not scale?
//!
//! Page sizes vary wildly: an A0 poster at 2× would produce a
//! 10,000+ px image. `max_pixels` caps the longest edge regardless of
//! physical size, keeping memory bounded and matching the image-size sweet
//! spot for vision models.

use crate::error::ConvertError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome of rasterising a document.
#[derive(Debug)]
pub struct RenderedDocument {
    pub total_pages: usize,
    /// First-page dimensions in PDF points.
    pub page_width: f32,
    pub page_height: f32,
    /// `page_N.png` paths, in page order (1-indexed names).
    pub page_files: Vec<PathBuf>,
}

/// Rasterise every page of `pdf_path` into `pages_dir`.
///
/// `on_page(page_num, total)` fires after each page is written; it is called
/// from the blocking thread, so it must not block on async work.
pub async fn render_pdf_pages(
    pdf_path: &Path,
    pages_dir: &Path,
    scale: f32,
    max_pixels: u32,
    on_page: impl FnMut(usize, usize) + Send + 'static,
) -> Result<RenderedDocument, ConvertError> {
    let pdf_path = pdf_path.to_path_buf();
    let pages_dir = pages_dir.to_path_buf();

    tokio::fs::create_dir_all(&pages_dir)
        .await
        .map_err(|e| ConvertError::io(&pages_dir, e))?;

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(&pdf_path, &pages_dir, scale, max_pixels, on_page)
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("Render task panicked: {e}")))?
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    pdf_path: &Path,
    pages_dir: &Path,
    scale: f32,
    max_pixels: u32,
    mut on_page: impl FnMut(usize, usize),
) -> Result<RenderedDocument, ConvertError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| ConvertError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!(total_pages, "PDF loaded");

    let mut page_width = 0.0f32;
    let mut page_height = 0.0f32;
    let mut page_files = Vec::with_capacity(total_pages);

    for idx in 0..total_pages {
        let page = pages
            .get(idx as u16)
            .map_err(|e| ConvertError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;

        if idx == 0 {
            page_width = page.width().value;
            page_height = page.height().value;
        }

        // Target width is page-width × scale, capped by max_pixels on either
        // edge (pdfium scales the other dimension proportionally).
        let target_width = ((page.width().value * scale) as u32).min(max_pixels);
        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width as i32)
            .set_maximum_height(max_pixels as i32);

        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| ConvertError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                })?;

        let image = bitmap.as_image();
        let file = pages_dir.join(format!("page_{}.png", idx + 1));
        image
            .save(&file)
            .map_err(|e| ConvertError::RasterisationFailed {
                page: idx + 1,
                detail: format!("PNG write failed: {e}"),
            })?;

        debug!(
            page = idx + 1,
            width = image.width(),
            height = image.height(),
            "Rendered page"
        );

        page_files.push(file);
        on_page(idx + 1, total_pages);
    }

    Ok(RenderedDocument {
        total_pages,
        page_width,
        page_height,
        page_files,
    })
}

/// Bind to a pdfium library: `PDFIUM_LIB_PATH` first, then the system copy.
fn bind_pdfium() -> Result<Pdfium, ConvertError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        if !path.is_empty() {
            let bindings = Pdfium::bind_to_library(&path)
                .map_err(|e| ConvertError::PdfiumBindingFailed(format!("{path}: {e:?}")))?;
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| ConvertError::PdfiumBindingFailed(format!("{e:?}")))
}
