//! Batch sequencing: fetch once, render page by page, crop image by image.
//!
//! Every requested image ends with exactly one result. Failures are scoped as
//! narrowly as possible: a fetch failure fails the batch's images, a page
//! failure fails that page's images, and a crop failure fails one image. The
//! deadline is checked before the fetch, before each page and before each
//! image; once it is spent the remaining images fail without further work.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::{Canvas, PageRenderer, SourceDocument, SourceFetcher};
use crate::config::ServiceConfig;
use crate::error::{FetchError, RenderError, ServiceResult, SourceError};

use super::coordinates::to_pixel_rect;
use super::crop::CropExtractor;
use super::deadline::DeadlineBudget;
use super::grouping::PageGroups;
use super::render::{PageRenderOrchestrator, RenderLimits};
use super::results::ResultAggregator;
use super::types::{
    EncodedCrop, ExtractionRequest, ExtractionResponse, FailureCode, ImageSpec, RenderedPage,
};

/// An opened source document, closed exactly once when dropped.
struct OpenDocument {
    renderer: Arc<dyn PageRenderer>,
    document: SourceDocument,
}

impl Drop for OpenDocument {
    fn drop(&mut self) {
        self.renderer.close(&self.document);
    }
}

/// Why one image (or a group of them) failed
#[derive(Debug, Clone)]
struct ItemFailure {
    code: FailureCode,
    message: String,
}

impl ItemFailure {
    fn new(code: FailureCode, message: String) -> Self {
        Self { code, message }
    }
}

pub struct BatchOrchestrator {
    fetcher: Arc<dyn SourceFetcher>,
    renderer: Arc<dyn PageRenderer>,
    canvas: Arc<dyn Canvas>,
    pages: PageRenderOrchestrator,
}

impl BatchOrchestrator {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        renderer: Arc<dyn PageRenderer>,
        canvas: Arc<dyn Canvas>,
    ) -> Self {
        Self {
            fetcher,
            pages: PageRenderOrchestrator::new(Arc::clone(&renderer)),
            renderer,
            canvas,
        }
    }

    /// The configured deadline, tightened by the request's own if it has one.
    pub fn effective_deadline(request: &ExtractionRequest, config: &ServiceConfig) -> Duration {
        let configured = config.timing.request_deadline();
        match request.deadline_ms {
            Some(ms) => configured.min(Duration::from_millis(ms)),
            None => configured,
        }
    }

    pub async fn process(
        &self,
        request: &ExtractionRequest,
        config: &ServiceConfig,
    ) -> ServiceResult<ExtractionResponse> {
        let budget = DeadlineBudget::start(Self::effective_deadline(request, config));
        let groups = PageGroups::build(&request.images);
        let mut results = ResultAggregator::new(&request.images, groups.positions_from(0));

        info!(
            request_id = %request.request_id,
            images = request.images.len(),
            pages = groups.page_count(),
            deadline_ms = budget.total().as_millis() as u64,
            "Processing extraction batch"
        );

        self.run(request, config, &budget, &groups, &mut results)
            .await;

        let response = results.finish(request.request_id.clone(), config.output.result_order)?;
        let succeeded = response.results.iter().filter(|r| r.is_success()).count();
        info!(
            request_id = %request.request_id,
            succeeded = succeeded,
            failed = response.results.len() - succeeded,
            elapsed_ms = budget.elapsed_ms() as u64,
            "Extraction batch complete"
        );

        Ok(response)
    }

    async fn run(
        &self,
        request: &ExtractionRequest,
        config: &ServiceConfig,
        budget: &DeadlineBudget,
        groups: &PageGroups<'_>,
        results: &mut ResultAggregator<'_>,
    ) {
        let all = 0..request.images.len();

        if budget.exhausted() {
            let message = format!(
                "stage=deadline_before_fetch elapsedMs={} deadlineMs={}",
                budget.elapsed_ms(),
                budget.total().as_millis()
            );
            results.fail_remaining(all, FailureCode::DeadlineExceeded, &message);
            return;
        }

        let source = match self.open_source(request, config, budget).await {
            Ok(source) => source,
            Err(error) => {
                let code = if budget.exhausted() {
                    FailureCode::DeadlineExceeded
                } else {
                    FailureCode::SourceFetchFailed
                };
                warn!(
                    request_id = %request.request_id,
                    code = %code,
                    error = %error,
                    "Source document unavailable"
                );
                results.fail_remaining(all, code, &error.to_string());
                return;
            }
        };

        let limits = RenderLimits {
            max_page_pixels: config.limits.max_page_pixels,
            target_width: request.target_width.or(config.render.target_width),
            max_render_scale: config.render.max_render_scale,
        };
        let extractor = CropExtractor::new(Arc::clone(&self.canvas), config.output.crop_margin_px);

        for (group_index, entry) in groups.entries().iter().enumerate() {
            if budget.exhausted() {
                let message = format!(
                    "stage=deadline_before_page elapsedMs={} deadlineMs={} pageIndex={}",
                    budget.elapsed_ms(),
                    budget.total().as_millis(),
                    entry.page_index
                );
                let failed = results.fail_remaining(
                    groups.positions_from(group_index),
                    FailureCode::DeadlineExceeded,
                    &message,
                );
                warn!(
                    request_id = %request.request_id,
                    page = entry.page_index,
                    images = failed,
                    "Deadline exhausted, skipping remaining pages"
                );
                break;
            }

            let timeout = budget.bound(config.timing.page_render_timeout());
            let page = match self
                .pages
                .render_page(&source.document, entry.page_index, timeout, limits)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    let code = if budget.exhausted() {
                        FailureCode::DeadlineExceeded
                    } else {
                        e.code()
                    };
                    let message = format!(
                        "stage=page_render elapsedMs={} pageIndex={} timeoutMs={} {}",
                        budget.elapsed_ms(),
                        entry.page_index,
                        timeout.as_millis(),
                        e
                    );
                    warn!(
                        request_id = %request.request_id,
                        page = entry.page_index,
                        code = %code,
                        error = %e,
                        "Page render failed"
                    );
                    results.fail_remaining(
                        entry.images.iter().map(|image| image.position),
                        code,
                        &message,
                    );
                    continue;
                }
            };

            for image in &entry.images {
                if budget.exhausted() {
                    let message = format!(
                        "stage=deadline_during_page elapsedMs={} deadlineMs={} pageIndex={}",
                        budget.elapsed_ms(),
                        budget.total().as_millis(),
                        entry.page_index
                    );
                    results.record_failure(image.position, FailureCode::DeadlineExceeded, message);
                    continue;
                }

                match self.crop_image(&extractor, &page, image.spec, config, budget) {
                    Ok(crop) => results.record_success(image.position, crop),
                    Err(failure) => {
                        debug!(
                            request_id = %request.request_id,
                            image_id = %image.spec.image_id,
                            code = %failure.code,
                            "Crop failed"
                        );
                        results.record_failure(image.position, failure.code, failure.message);
                    }
                }
            }
            // The rendered page is released here, before the next one is drawn.
        }
    }

    /// Fetch and open the source document. Both steps are bounded by the
    /// budget; an open that outlives it is closed when it finally returns.
    async fn open_source(
        &self,
        request: &ExtractionRequest,
        config: &ServiceConfig,
        budget: &DeadlineBudget,
    ) -> Result<OpenDocument, SourceError> {
        let timeout = budget.bound(config.timing.fetch_timeout());
        let max_bytes = config.limits.max_pdf_bytes;
        let fetch_failure = |source: FetchError| SourceError::Fetch {
            elapsed_ms: budget.elapsed_ms(),
            timeout_ms: timeout.as_millis(),
            source,
        };

        if let Some(size) = request.file.size_bytes {
            if size > max_bytes {
                return Err(fetch_failure(FetchError::TooLarge {
                    size,
                    max: max_bytes,
                }));
            }
        }

        let bytes = self
            .fetcher
            .fetch(&request.file.url, timeout, max_bytes)
            .await
            .map_err(fetch_failure)?;

        let open_timeout = budget.bound(budget.remaining());
        let renderer = Arc::clone(&self.renderer);
        let task = tokio::task::spawn_blocking(move || -> Result<OpenDocument, RenderError> {
            let document = renderer.open(bytes)?;
            Ok(OpenDocument { renderer, document })
        });

        let source = match tokio::time::timeout(open_timeout, task).await {
            Ok(Ok(Ok(source))) => source,
            Ok(Ok(Err(e))) => {
                return Err(SourceError::Open {
                    elapsed_ms: budget.elapsed_ms(),
                    source: e,
                });
            }
            Ok(Err(join_error)) => {
                return Err(SourceError::OpenAborted {
                    elapsed_ms: budget.elapsed_ms(),
                    message: join_error.to_string(),
                });
            }
            Err(_) => {
                return Err(SourceError::OpenTimeout {
                    elapsed_ms: budget.elapsed_ms(),
                    timeout_ms: open_timeout.as_millis(),
                });
            }
        };

        debug!(
            request_id = %request.request_id,
            pages = source.document.page_count(),
            elapsed_ms = budget.elapsed_ms() as u64,
            "Source document opened"
        );

        Ok(source)
    }

    fn crop_image(
        &self,
        extractor: &CropExtractor,
        page: &RenderedPage,
        image: &ImageSpec,
        config: &ServiceConfig,
        budget: &DeadlineBudget,
    ) -> Result<EncodedCrop, ItemFailure> {
        let rect = to_pixel_rect(image.coordinates, page.width() as f64, page.height() as f64)
            .map_err(|e| {
                ItemFailure::new(
                    FailureCode::CropConversionFailed,
                    format!(
                        "stage=crop_convert elapsedMs={} pageIndex={} {}",
                        budget.elapsed_ms(),
                        page.page_index,
                        e
                    ),
                )
            })?;

        if rect.area() > config.limits.max_crop_pixels {
            return Err(ItemFailure::new(
                FailureCode::CropTooLarge,
                format!(
                    "stage=crop_validate elapsedMs={} pageIndex={} crop={}x{} cropPixels={} maxCropPixels={}",
                    budget.elapsed_ms(),
                    page.page_index,
                    rect.width(),
                    rect.height(),
                    rect.area(),
                    config.limits.max_crop_pixels
                ),
            ));
        }

        extractor.extract(page, rect).map_err(|e| {
            ItemFailure::new(
                FailureCode::CropEncodeFailed,
                format!(
                    "stage=crop_encode elapsedMs={} pageIndex={} crop={}x{} {}",
                    budget.elapsed_ms(),
                    page.page_index,
                    rect.width(),
                    rect.height(),
                    e
                ),
            )
        })
    }
}
