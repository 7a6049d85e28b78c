//! Service configuration.
//!
//! Loaded once at startup from an optional `config` file and `PDF_REGION__*`
//! environment variables. Nothing here changes while the service runs.

mod defaults;
mod loader;

use serde::Deserialize;
use std::time::Duration;

pub use loader::{load_config, load_config_from};

use defaults::{
    default_crop_margin_px, default_fetch_timeout_ms, default_host, default_limits,
    default_max_concurrent_requests, default_max_crop_pixels, default_max_images_per_request,
    default_max_page_pixels, default_max_pdf_bytes, default_max_render_scale, default_output,
    default_page_render_timeout_ms, default_port, default_queue_timeout_ms, default_render,
    default_request_deadline_ms, default_server, default_timing,
};

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    pub auth: AuthConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,

    #[serde(default = "default_timing")]
    pub timing: TimingConfig,

    #[serde(default = "default_render")]
    pub render: RenderConfig,

    #[serde(default = "default_output")]
    pub output: OutputConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Shared-secret authentication for the extraction endpoint
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    /// Expected value of the `x-image-processor-secret` header
    pub secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Request size and resource ceilings
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Requests with more images are rejected outright
    #[serde(default = "default_max_images_per_request")]
    pub max_images_per_request: usize,

    #[serde(default = "default_max_pdf_bytes")]
    pub max_pdf_bytes: u64,

    /// Largest page raster (width * height) the renderer may allocate
    #[serde(default = "default_max_page_pixels")]
    pub max_page_pixels: u64,

    /// Largest crop (width * height, margin excluded)
    #[serde(default = "default_max_crop_pixels")]
    pub max_crop_pixels: u64,

    /// Batches processed at once; later requests wait for a slot
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

/// Timing limits, all in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    #[serde(default = "default_page_render_timeout_ms")]
    pub page_render_timeout_ms: u64,

    /// Wall-clock budget for a whole batch
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,

    /// How long a request may wait for a processing slot
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,
}

impl TimingConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn page_render_timeout(&self) -> Duration {
        Duration::from_millis(self.page_render_timeout_ms)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }
}

/// Page rasterization settings
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Render pages scaled to this width in pixels. Unset renders at scale 1
    /// (one pixel per PDF point).
    #[serde(default)]
    pub target_width: Option<u32>,

    /// Upper bound on the scale derived from a target width
    #[serde(default = "default_max_render_scale")]
    pub max_render_scale: f64,
}

/// Order of results in the response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOrder {
    /// Grouped by ascending page, then by input order within the page
    #[default]
    PageGrouped,
    /// Same order as the request's image list
    Input,
}

/// Output shaping
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// White border added on every side of each crop
    #[serde(default = "default_crop_margin_px")]
    pub crop_margin_px: u32,

    #[serde(default)]
    pub result_order: ResultOrder,
}

impl ServiceConfig {
    /// Reject settings that would make every request fail.
    pub fn validate(&self) -> Result<(), String> {
        if self.auth.secret.trim().is_empty() {
            return Err("auth.secret must not be empty".to_string());
        }
        let limits = &self.limits;
        if limits.max_images_per_request == 0
            || limits.max_pdf_bytes == 0
            || limits.max_page_pixels == 0
            || limits.max_crop_pixels == 0
            || limits.max_concurrent_requests == 0
        {
            return Err("limits must all be positive".to_string());
        }
        let timing = &self.timing;
        if timing.fetch_timeout_ms == 0
            || timing.page_render_timeout_ms == 0
            || timing.request_deadline_ms == 0
        {
            return Err("timing limits must all be positive".to_string());
        }
        if !(self.render.max_render_scale.is_finite() && self.render.max_render_scale > 0.0) {
            return Err("render.max_render_scale must be positive".to_string());
        }
        if self.render.target_width == Some(0) {
            return Err("render.target_width must be positive when set".to_string());
        }
        Ok(())
    }
}
