//! Scripted collaborators for pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use image::{Rgba, RgbaImage};
use tokio_util::sync::CancellationToken;

use crate::backend::{
    Canvas, ImageCanvas, PageRenderer, PageSize, RenderMode, RenderTarget, SourceDocument,
    SourceFetcher,
};
use crate::config::{ServiceConfig, load_config_from};
use crate::error::{CanvasError, FetchError, RenderError};
use crate::extraction::PixelRect;

pub const FAKE_PDF: &[u8] = b"%PDF-1.7\n%scripted";

/// How a scripted page responds to a render call
#[derive(Debug, Clone)]
pub enum PageBehavior {
    Render,
    Fail(String),
    /// Display mode rejects the surface, print mode succeeds
    IncompatibleInDisplay,
    IncompatibleAlways,
    /// Blocks until cancelled
    Hang,
    /// Renders after sleeping
    Slow(Duration),
}

/// Colour each page is filled with, so crops can be traced back to pages.
pub fn page_color(page_index: usize) -> Rgba<u8> {
    let shade = (page_index as u8).wrapping_mul(40);
    Rgba([shade, 100, 200, 255])
}

pub struct ScriptedRenderer {
    pages: Vec<PageSize>,
    behaviors: HashMap<usize, PageBehavior>,
    open_error: Option<String>,
    open_delay: Option<Duration>,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub cancellations: AtomicUsize,
    calls: Mutex<Vec<(usize, RenderMode)>>,
}

impl ScriptedRenderer {
    pub fn new(pages: &[(f32, f32)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|&(width, height)| PageSize { width, height })
                .collect(),
            behaviors: HashMap::new(),
            open_error: None,
            open_delay: None,
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page(mut self, page_index: usize, behavior: PageBehavior) -> Self {
        self.behaviors.insert(page_index, behavior);
        self
    }

    pub fn failing_open(mut self, message: &str) -> Self {
        self.open_error = Some(message.to_string());
        self
    }

    /// Opening blocks for `delay` before succeeding
    pub fn slow_open(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn render_calls(&self) -> Vec<(usize, RenderMode)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rendered_pages(&self) -> Vec<usize> {
        self.render_calls().into_iter().map(|(page, _)| page).collect()
    }

    fn draw(page_index: usize, target: RenderTarget) -> RgbaImage {
        RgbaImage::from_pixel(target.width, target.height, page_color(page_index))
    }

    fn wait_for_cancel(&self, cancel: &CancellationToken) -> RenderError {
        let started = Instant::now();
        while started.elapsed() < Duration::from_secs(5) {
            if cancel.is_cancelled() {
                self.cancellations.fetch_add(1, Ordering::SeqCst);
                return RenderError::Cancelled;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        RenderError::Failed {
            message: "never cancelled".to_string(),
        }
    }
}

impl PageRenderer for ScriptedRenderer {
    fn open(&self, bytes: Bytes) -> Result<SourceDocument, RenderError> {
        if let Some(message) = &self.open_error {
            return Err(RenderError::Open {
                message: message.clone(),
            });
        }
        if let Some(delay) = self.open_delay {
            std::thread::sleep(delay);
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(SourceDocument::new(bytes, self.pages.clone()))
    }

    fn render(
        &self,
        _document: &SourceDocument,
        page_index: usize,
        target: RenderTarget,
        mode: RenderMode,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, RenderError> {
        self.calls.lock().unwrap().push((page_index, mode));

        match self.behaviors.get(&page_index).unwrap_or(&PageBehavior::Render) {
            PageBehavior::Render => Ok(Self::draw(page_index, target)),
            PageBehavior::Fail(message) => Err(RenderError::Failed {
                message: message.clone(),
            }),
            PageBehavior::IncompatibleInDisplay if mode == RenderMode::Display => {
                Err(RenderError::IncompatibleSurface {
                    message: "display surface rejected".to_string(),
                })
            }
            PageBehavior::IncompatibleInDisplay => Ok(Self::draw(page_index, target)),
            PageBehavior::IncompatibleAlways => Err(RenderError::IncompatibleSurface {
                message: format!("{} surface rejected", mode),
            }),
            PageBehavior::Hang => Err(self.wait_for_cancel(cancel)),
            PageBehavior::Slow(delay) => {
                std::thread::sleep(*delay);
                if cancel.is_cancelled() {
                    self.cancellations.fetch_add(1, Ordering::SeqCst);
                    return Err(RenderError::Cancelled);
                }
                Ok(Self::draw(page_index, target))
            }
        }
    }

    fn close(&self, _document: &SourceDocument) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted response for [`ScriptedFetcher`]
#[derive(Debug, Clone)]
pub enum FetchScript {
    Body(Bytes),
    Status(u16),
    Delay(Duration),
}

pub struct ScriptedFetcher {
    script: FetchScript,
    pub calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn pdf() -> Self {
        Self::new(FetchScript::Body(Bytes::from_static(FAKE_PDF)))
    }

    pub fn new(script: FetchScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        _url: &str,
        timeout: Duration,
        _max_bytes: u64,
    ) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            FetchScript::Body(bytes) => Ok(bytes.clone()),
            FetchScript::Status(status) => Err(FetchError::Status { status: *status }),
            FetchScript::Delay(delay) => {
                if *delay > timeout {
                    tokio::time::sleep(timeout).await;
                    Err(FetchError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    })
                } else {
                    tokio::time::sleep(*delay).await;
                    Ok(Bytes::from_static(FAKE_PDF))
                }
            }
        }
    }
}

/// Real canvas with scripted PNG encoding: it can fail for surfaces of one
/// width or take a fixed time per encode.
pub struct ScriptedCanvas {
    inner: ImageCanvas,
    fail_width: Option<u32>,
    encode_delay: Option<Duration>,
}

impl ScriptedCanvas {
    fn new() -> Self {
        Self {
            inner: ImageCanvas::new(),
            fail_width: None,
            encode_delay: None,
        }
    }

    pub fn failing_width(fail_width: u32) -> Self {
        Self {
            fail_width: Some(fail_width),
            ..Self::new()
        }
    }

    pub fn slow_encode(delay: Duration) -> Self {
        Self {
            encode_delay: Some(delay),
            ..Self::new()
        }
    }
}

impl Canvas for ScriptedCanvas {
    fn create(&self, width: u32, height: u32) -> Result<RgbaImage, CanvasError> {
        self.inner.create(width, height)
    }

    fn fill(
        &self,
        surface: &mut RgbaImage,
        region: PixelRect,
        color: Rgba<u8>,
    ) -> Result<(), CanvasError> {
        self.inner.fill(surface, region, color)
    }

    fn copy_region(
        &self,
        source: &RgbaImage,
        region: PixelRect,
        target: &mut RgbaImage,
        offset: (u32, u32),
    ) -> Result<(), CanvasError> {
        self.inner.copy_region(source, region, target, offset)
    }

    fn encode_png(&self, surface: &RgbaImage) -> Result<Vec<u8>, CanvasError> {
        if let Some(delay) = self.encode_delay {
            std::thread::sleep(delay);
        }
        if self.fail_width == Some(surface.width()) {
            return Err(CanvasError::Encode {
                message: "scripted encoder failure".to_string(),
            });
        }
        self.inner.encode_png(surface)
    }
}

/// Configuration with a test secret plus `extra` TOML.
pub fn test_config(extra: &str) -> ServiceConfig {
    load_config_from(&format!("[auth]\nsecret = \"test-secret\"\n{}", extra)).unwrap()
}
