//! Page rendering with a timeout, cooperative cancellation and a print-mode
//! fallback.
//!
//! The renderer blocks, so each attempt runs on the blocking pool and is raced
//! against the deadline. When the deadline wins, the attempt's cancellation
//! token fires and the renderer drops its partial surface at the next stage
//! boundary. Dropping the whole future (client gone) cancels it the same way.

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{PageRenderer, PageSize, RenderMode, RenderTarget, SourceDocument};
use crate::error::RenderError;

use super::types::{FailureCode, RenderedPage};

/// Rasterization limits for one batch
#[derive(Debug, Clone, Copy)]
pub struct RenderLimits {
    pub max_page_pixels: u64,
    /// Scale pages to this width; `None` renders one pixel per point
    pub target_width: Option<u32>,
    pub max_render_scale: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PageRenderError {
    #[error("Page index {page_index} is out of bounds for PDF with {page_count} pages")]
    IndexOutOfBounds { page_index: u32, page_count: usize },

    #[error("Rendered page exceeds max pixels: {width}x{height} > {max_pixels}")]
    TooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },

    #[error("Page render timeout after {timeout_ms}ms ({mode} mode)")]
    Timeout { timeout_ms: u128, mode: RenderMode },

    #[error("{message}")]
    Failed { message: String },
}

impl PageRenderError {
    pub fn code(&self) -> FailureCode {
        match self {
            PageRenderError::IndexOutOfBounds { .. } => FailureCode::PageIndexOutOfBounds,
            PageRenderError::TooLarge { .. } => FailureCode::PageTooLarge,
            PageRenderError::Timeout { .. } => FailureCode::PageRenderTimeout,
            PageRenderError::Failed { .. } => FailureCode::PageRenderFailed,
        }
    }
}

/// Outcome of a single render attempt
enum AttemptError {
    Renderer(RenderError),
    Timeout,
    Aborted(String),
}

/// Scale factor for a page `page_width` points wide.
pub fn render_scale(page_width: f32, target_width: Option<u32>, max_render_scale: f64) -> f64 {
    match target_width {
        Some(target) if page_width > 0.0 => (target as f64 / page_width as f64).min(max_render_scale),
        _ => 1.0,
    }
}

/// Pixel size of a page at `scale`, at least 1x1.
pub fn render_target(size: PageSize, scale: f64) -> RenderTarget {
    let width = (size.width as f64 * scale).ceil().max(1.0);
    let height = (size.height as f64 * scale).ceil().max(1.0);
    RenderTarget {
        width: width.min(u32::MAX as f64) as u32,
        height: height.min(u32::MAX as f64) as u32,
    }
}

pub struct PageRenderOrchestrator {
    renderer: Arc<dyn PageRenderer>,
}

impl PageRenderOrchestrator {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }

    /// Render one page, retrying once in print mode if the display-mode
    /// surface is rejected. Both attempts share the same deadline.
    pub async fn render_page(
        &self,
        document: &SourceDocument,
        page_index: u32,
        timeout: Duration,
        limits: RenderLimits,
    ) -> Result<RenderedPage, PageRenderError> {
        let index = page_index as usize;
        let size = document
            .page_size(index)
            .ok_or(PageRenderError::IndexOutOfBounds {
                page_index,
                page_count: document.page_count(),
            })?;

        let scale = render_scale(size.width, limits.target_width, limits.max_render_scale);
        let target = render_target(size, scale);
        if target.pixels() > limits.max_page_pixels {
            return Err(PageRenderError::TooLarge {
                width: target.width,
                height: target.height,
                max_pixels: limits.max_page_pixels,
            });
        }

        debug!(
            page = page_index,
            size = format!("{}x{}", target.width, target.height),
            scale = scale,
            timeout_ms = timeout.as_millis() as u64,
            "Rendering page"
        );

        let deadline = Instant::now() + timeout;
        let image = match self
            .attempt(document, index, target, RenderMode::Display, deadline)
            .await
        {
            Ok(image) => image,
            Err(AttemptError::Renderer(RenderError::IncompatibleSurface { message })) => {
                warn!(
                    page = page_index,
                    error = %message,
                    "Display render rejected surface, retrying in print mode"
                );
                self.attempt(document, index, target, RenderMode::Print, deadline)
                    .await
                    .map_err(|e| attempt_error(e, timeout, RenderMode::Print))?
            }
            Err(e) => return Err(attempt_error(e, timeout, RenderMode::Display)),
        };

        Ok(RenderedPage { page_index, image })
    }

    async fn attempt(
        &self,
        document: &SourceDocument,
        page_index: usize,
        target: RenderTarget,
        mode: RenderMode,
        deadline: Instant,
    ) -> Result<RgbaImage, AttemptError> {
        let cancel = CancellationToken::new();
        // Cancels on every exit, including the caller dropping this future.
        let _cancel_on_drop = cancel.clone().drop_guard();

        let renderer = Arc::clone(&self.renderer);
        let document = document.clone();
        let token = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            renderer.render(&document, page_index, target, mode, &token)
        });

        match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(Ok(image))) => Ok(image),
            Ok(Ok(Err(e))) => Err(AttemptError::Renderer(e)),
            Ok(Err(join_error)) => Err(AttemptError::Aborted(format!(
                "Render task aborted: {}",
                join_error
            ))),
            Err(_) => {
                cancel.cancel();
                debug!(page = page_index, mode = %mode, "Render timed out, cancelled");
                Err(AttemptError::Timeout)
            }
        }
    }
}

fn attempt_error(error: AttemptError, timeout: Duration, mode: RenderMode) -> PageRenderError {
    match error {
        AttemptError::Timeout | AttemptError::Renderer(RenderError::Cancelled) => {
            PageRenderError::Timeout {
                timeout_ms: timeout.as_millis(),
                mode,
            }
        }
        AttemptError::Renderer(e) => PageRenderError::Failed {
            message: e.to_string(),
        },
        AttemptError::Aborted(message) => PageRenderError::Failed { message },
    }
}
