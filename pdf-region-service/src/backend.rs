//! Collaborator capabilities used by the extraction pipeline.
//!
//! The pipeline never talks to PDFium, the `image` crate or the network
//! directly. It holds these traits as `Arc<dyn ...>` built once in `main` and
//! handed to the orchestrator:
//! - [`SourceFetcher`] downloads the source PDF bytes
//! - [`PageRenderer`] opens a document and rasterizes pages
//! - [`Canvas`] allocates, fills, copies and PNG-encodes raster surfaces

pub mod canvas;
pub mod fetch;
pub mod pdfium;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{Rgba, RgbaImage};
use tokio_util::sync::CancellationToken;

use crate::error::{CanvasError, FetchError, RenderError};
use crate::extraction::PixelRect;

pub use canvas::ImageCanvas;
pub use fetch::HttpFetcher;
pub use pdfium::PdfiumRenderer;

/// Page size in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// An opened source document.
///
/// Holds the raw bytes and the page geometry read at open time. Cloning is
/// cheap so the handle can be moved into blocking render tasks.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    bytes: Bytes,
    pages: Arc<[PageSize]>,
}

impl SourceDocument {
    pub fn new(bytes: Bytes, pages: Vec<PageSize>) -> Self {
        Self {
            bytes,
            pages: pages.into(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_size(&self, page_index: usize) -> Option<PageSize> {
        self.pages.get(page_index).copied()
    }
}

/// Rendering intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Display,
    Print,
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderMode::Display => f.write_str("display"),
            RenderMode::Print => f.write_str("print"),
        }
    }
}

/// Pixel dimensions a page is rasterized to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Download the document at `url`, failing if it takes longer than
    /// `timeout` or is larger than `max_bytes`.
    async fn fetch(&self, url: &str, timeout: Duration, max_bytes: u64)
    -> Result<Bytes, FetchError>;
}

/// PDF decoding and page rasterization.
///
/// Calls block; the pipeline runs them on the blocking thread pool.
pub trait PageRenderer: Send + Sync {
    fn open(&self, bytes: Bytes) -> Result<SourceDocument, RenderError>;

    /// Rasterize one page. Implementations must check `cancel` between stages
    /// and return [`RenderError::Cancelled`] once it fires, dropping any
    /// partially drawn surface.
    fn render(
        &self,
        document: &SourceDocument,
        page_index: usize,
        target: RenderTarget,
        mode: RenderMode,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, RenderError>;

    /// Release resources tied to an opened document.
    fn close(&self, document: &SourceDocument);
}

/// Raster surface operations.
pub trait Canvas: Send + Sync {
    fn create(&self, width: u32, height: u32) -> Result<RgbaImage, CanvasError>;

    fn fill(
        &self,
        surface: &mut RgbaImage,
        region: PixelRect,
        color: Rgba<u8>,
    ) -> Result<(), CanvasError>;

    /// Copy `region` of `source` into `target` with its top-left corner at
    /// `offset` (x, y).
    fn copy_region(
        &self,
        source: &RgbaImage,
        region: PixelRect,
        target: &mut RgbaImage,
        offset: (u32, u32),
    ) -> Result<(), CanvasError>;

    fn encode_png(&self, surface: &RgbaImage) -> Result<Vec<u8>, CanvasError>;
}
