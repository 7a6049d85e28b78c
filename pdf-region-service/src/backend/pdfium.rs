//! Page rendering with PDFium.
//!
//! PDFium handles are not `Send`, so nothing here outlives a single call. Each
//! operation binds the library, loads the document from the shared bytes and
//! drops everything before returning. The [`SourceDocument`] handle that moves
//! between threads carries only bytes and page geometry.

use bytes::Bytes;
use image::RgbaImage;
use pdfium_render::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{PageRenderer, PageSize, RenderMode, RenderTarget, SourceDocument};
use crate::error::RenderError;

/// Bind to PDFium, trying local paths first, then the system library.
pub fn create_pdfium() -> Result<Pdfium, RenderError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| RenderError::Open {
            message: format!(
                "Failed to load PDFium library. Place libpdfium next to the binary, in ./vendor/pdfium/lib/, or install it system-wide: {:?}",
                e
            ),
        })?;

    Ok(Pdfium::new(bindings))
}

fn to_i32(value: u32) -> i32 {
    value.min(i32::MAX as u32) as i32
}

fn render_config(target: RenderTarget, mode: RenderMode) -> PdfRenderConfig {
    let config = PdfRenderConfig::new()
        .set_target_width(to_i32(target.width))
        .set_target_height(to_i32(target.height));

    match mode {
        RenderMode::Display => config,
        RenderMode::Print => config.use_print_quality(true),
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), RenderError> {
    if cancel.is_cancelled() {
        Err(RenderError::Cancelled)
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Fail fast at startup if the library cannot be bound.
    pub fn check_library(&self) -> Result<(), RenderError> {
        create_pdfium().map(|_| ())
    }
}

impl PageRenderer for PdfiumRenderer {
    fn open(&self, bytes: Bytes) -> Result<SourceDocument, RenderError> {
        let pdfium = create_pdfium()?;
        let pages = {
            let document = pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .map_err(|e| RenderError::Open {
                    message: e.to_string(),
                })?;

            let sizes: Vec<PageSize> = document
                .pages()
                .iter()
                .map(|page| PageSize {
                    width: page.width().value,
                    height: page.height().value,
                })
                .collect();
            sizes
        };

        debug!(pages = pages.len(), bytes = bytes.len(), "Opened PDF");
        Ok(SourceDocument::new(bytes, pages))
    }

    fn render(
        &self,
        document: &SourceDocument,
        page_index: usize,
        target: RenderTarget,
        mode: RenderMode,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, RenderError> {
        check_cancelled(cancel)?;

        let pdfium = create_pdfium()?;
        let pdf = pdfium
            .load_pdf_from_byte_slice(document.bytes(), None)
            .map_err(|e| RenderError::Open {
                message: e.to_string(),
            })?;

        let page_number = u16::try_from(page_index).map_err(|_| RenderError::Failed {
            message: format!("Page index {} is out of range", page_index),
        })?;
        let page = pdf.pages().get(page_number).map_err(|e| RenderError::Failed {
            message: format!("Failed to get page {}: {}", page_index, e),
        })?;
        check_cancelled(cancel)?;

        let bitmap = page
            .render_with_config(&render_config(target, mode))
            .map_err(|e| RenderError::Failed {
                message: format!("Failed to render page {}: {}", page_index, e),
            })?;
        check_cancelled(cancel)?;

        let image = bitmap.as_image().to_rgba8();
        if image.width() != target.width || image.height() != target.height {
            warn!(
                page = page_index,
                mode = %mode,
                expected = format!("{}x{}", target.width, target.height),
                actual = format!("{}x{}", image.width(), image.height()),
                "Rendered bitmap does not match requested surface"
            );
            return Err(RenderError::IncompatibleSurface {
                message: format!(
                    "expected {}x{} surface, got {}x{}",
                    target.width,
                    target.height,
                    image.width(),
                    image.height()
                ),
            });
        }

        Ok(image)
    }

    fn close(&self, document: &SourceDocument) {
        // Nothing is held between calls; the bytes go with the last handle.
        debug!(pages = document.page_count(), "Closed PDF");
    }
}
