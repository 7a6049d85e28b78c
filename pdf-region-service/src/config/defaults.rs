//! Default value functions for ServiceConfig.

use super::{LimitsConfig, OutputConfig, RenderConfig, ResultOrder, ServerConfig, TimingConfig};

// ==================== Section Defaults ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_images_per_request: default_max_images_per_request(),
        max_pdf_bytes: default_max_pdf_bytes(),
        max_page_pixels: default_max_page_pixels(),
        max_crop_pixels: default_max_crop_pixels(),
        max_concurrent_requests: default_max_concurrent_requests(),
    }
}

pub(crate) fn default_timing() -> TimingConfig {
    TimingConfig {
        fetch_timeout_ms: default_fetch_timeout_ms(),
        page_render_timeout_ms: default_page_render_timeout_ms(),
        request_deadline_ms: default_request_deadline_ms(),
        queue_timeout_ms: default_queue_timeout_ms(),
    }
}

pub(crate) fn default_render() -> RenderConfig {
    RenderConfig {
        target_width: None,
        max_render_scale: default_max_render_scale(),
    }
}

pub(crate) fn default_output() -> OutputConfig {
    OutputConfig {
        crop_margin_px: default_crop_margin_px(),
        result_order: ResultOrder::default(),
    }
}

// ==================== Server Defaults ====================

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    3000
}

// ==================== Limits Defaults ====================

pub(crate) fn default_max_images_per_request() -> usize {
    500
}

pub(crate) fn default_max_pdf_bytes() -> u64 {
    52_428_800 // 50MB
}

pub(crate) fn default_max_page_pixels() -> u64 {
    20_000_000
}

pub(crate) fn default_max_crop_pixels() -> u64 {
    8_000_000
}

pub(crate) fn default_max_concurrent_requests() -> usize {
    8
}

// ==================== Timing Defaults ====================

pub(crate) fn default_fetch_timeout_ms() -> u64 {
    30_000
}

pub(crate) fn default_page_render_timeout_ms() -> u64 {
    7_500
}

pub(crate) fn default_request_deadline_ms() -> u64 {
    20_000
}

pub(crate) fn default_queue_timeout_ms() -> u64 {
    2_000
}

// ==================== Render / Output Defaults ====================

pub(crate) fn default_max_render_scale() -> f64 {
    2.0
}

pub(crate) fn default_crop_margin_px() -> u32 {
    20
}
