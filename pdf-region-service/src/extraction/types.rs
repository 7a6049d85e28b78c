//! Core types for batch region extraction.

use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// Upper bound of the normalized coordinate space on both axes
pub const NORMALIZED_MAX: f64 = 1000.0;

pub const PNG_MIME_TYPE: &str = "image/png";

/// One batch of crops against a single source document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    pub request_id: String,
    pub file: SourceFile,
    pub images: Vec<ImageSpec>,
    /// Render pages scaled to this width instead of the configured policy
    #[serde(default)]
    pub target_width: Option<u32>,
    /// Tighter deadline than the configured one, in milliseconds
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

/// Where the source PDF lives
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub url: String,
    /// Size advertised by the caller; checked before downloading
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub storage_id: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// One requested crop
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    #[serde(alias = "documentSectionImageId")]
    pub image_id: String,
    #[serde(default)]
    pub placeholder_id: Option<String>,
    /// Zero-based
    pub page_index: u32,
    /// `[y1, x1, y2, x2]` in the 0..=1000 normalized space, corners in any order
    pub coordinates: [f64; 4],
}

impl ExtractionRequest {
    /// Structural checks that reject the whole request.
    pub fn validate(&self, max_images: usize) -> ServiceResult<()> {
        if self.request_id.trim().is_empty() {
            return Err(ServiceError::invalid_field(
                "requestId",
                "requestId must not be empty",
            ));
        }

        let url = reqwest::Url::parse(&self.file.url).map_err(|e| {
            ServiceError::invalid_field(
                "file.url",
                format!("file.url is not a valid URL: {}", e),
            )
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ServiceError::invalid_field(
                "file.url",
                format!("file.url must be http or https, got {}", url.scheme()),
            ));
        }

        if self.images.len() > max_images {
            return Err(ServiceError::invalid_field(
                "images",
                format!(
                    "Too many images in request ({} > {})",
                    self.images.len(),
                    max_images
                ),
            ));
        }

        if self.target_width == Some(0) {
            return Err(ServiceError::invalid_field(
                "targetWidth",
                "targetWidth must be positive",
            ));
        }
        if self.deadline_ms == Some(0) {
            return Err(ServiceError::invalid_field(
                "deadlineMs",
                "deadlineMs must be positive",
            ));
        }

        for (position, image) in self.images.iter().enumerate() {
            if image.image_id.trim().is_empty() {
                return Err(ServiceError::invalid_field(
                    format!("images[{}].imageId", position),
                    format!("images[{}].imageId must not be empty", position),
                ));
            }
            if image.coordinates.iter().any(|c| !c.is_finite()) {
                return Err(ServiceError::invalid_field(
                    format!("images[{}].coordinates", position),
                    format!("images[{}].coordinates must be finite numbers", position),
                ));
            }
        }

        Ok(())
    }
}

/// Integer crop rectangle in page pixels, `min < max` on both axes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub min_y: u32,
    pub min_x: u32,
    pub max_y: u32,
    pub max_x: u32,
}

impl PixelRect {
    /// The whole of a `width` x `height` surface.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            min_y: 0,
            min_x: 0,
            max_y: height,
            max_x: width,
        }
    }

    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x)
    }

    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.min_x < self.max_x && self.min_y < self.max_y && self.max_x <= width && self.max_y <= height
    }
}

impl std::fmt::Display for PixelRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.min_y, self.min_x, self.max_y, self.max_x
        )
    }
}

/// A rasterized page, alive only while its crops are processed
#[derive(Debug)]
pub struct RenderedPage {
    pub page_index: u32,
    pub image: image::RgbaImage,
}

impl RenderedPage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// An encoded crop, margin included in the dimensions
#[derive(Debug, Clone)]
pub struct EncodedCrop {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Per-image failure codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    SourceFetchFailed,
    PageIndexOutOfBounds,
    PageTooLarge,
    PageRenderTimeout,
    PageRenderFailed,
    CropConversionFailed,
    CropTooLarge,
    CropEncodeFailed,
    DeadlineExceeded,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::SourceFetchFailed => "SOURCE_FETCH_FAILED",
            FailureCode::PageIndexOutOfBounds => "PAGE_INDEX_OUT_OF_BOUNDS",
            FailureCode::PageTooLarge => "PAGE_TOO_LARGE",
            FailureCode::PageRenderTimeout => "PAGE_RENDER_TIMEOUT",
            FailureCode::PageRenderFailed => "PAGE_RENDER_FAILED",
            FailureCode::CropConversionFailed => "CROP_CONVERSION_FAILED",
            FailureCode::CropTooLarge => "CROP_TOO_LARGE",
            FailureCode::CropEncodeFailed => "CROP_ENCODE_FAILED",
            FailureCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one requested image
#[derive(Debug, Clone)]
pub enum ExtractionResult {
    Success {
        image_id: String,
        crop: EncodedCrop,
    },
    Failed {
        image_id: String,
        code: FailureCode,
        message: String,
    },
}

impl ExtractionResult {
    pub fn image_id(&self) -> &str {
        match self {
            ExtractionResult::Success { image_id, .. } | ExtractionResult::Failed { image_id, .. } => {
                image_id
            }
        }
    }

    pub fn failure_code(&self) -> Option<FailureCode> {
        match self {
            ExtractionResult::Success { .. } => None,
            ExtractionResult::Failed { code, .. } => Some(*code),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionResponse {
    pub request_id: String,
    pub results: Vec<ExtractionResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(images: serde_json::Value) -> ExtractionRequest {
        serde_json::from_value(serde_json::json!({
            "requestId": "req_123",
            "file": {
                "storageId": "storage_123",
                "url": "https://example.com/test.pdf",
                "mimeType": "application/pdf"
            },
            "images": images
        }))
        .unwrap()
    }

    fn field(err: &ServiceError) -> Option<&str> {
        match err {
            ServiceError::InvalidRequest {
                details: Some(details),
                ..
            } => details["field"].as_str(),
            _ => None,
        }
    }

    #[test]
    fn test_accepts_original_field_names() {
        let request = request(serde_json::json!([{
            "documentSectionImageId": "img_1",
            "placeholderId": "plot-1",
            "pageIndex": 0,
            "coordinates": [100, 120, 600, 700]
        }]));

        assert_eq!(request.images.len(), 1);
        assert_eq!(request.images[0].image_id, "img_1");
        assert_eq!(request.images[0].coordinates, [100.0, 120.0, 600.0, 700.0]);
        assert!(request.validate(500).is_ok());
    }

    #[test]
    fn test_rejects_wrong_coordinate_count() {
        let parsed: Result<ExtractionRequest, _> = serde_json::from_value(serde_json::json!({
            "requestId": "req_123",
            "file": { "url": "https://example.com/test.pdf" },
            "images": [{ "imageId": "a", "pageIndex": 0, "coordinates": [1, 2, 3] }]
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_rejects_negative_page_index() {
        let parsed: Result<ExtractionRequest, _> = serde_json::from_value(serde_json::json!({
            "requestId": "req_123",
            "file": { "url": "https://example.com/test.pdf" },
            "images": [{ "imageId": "a", "pageIndex": -1, "coordinates": [1, 2, 3, 4] }]
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate_limits() {
        let images = serde_json::json!([
            { "imageId": "a", "pageIndex": 0, "coordinates": [0, 0, 10, 10] },
            { "imageId": "b", "pageIndex": 1, "coordinates": [0, 0, 10, 10] }
        ]);
        let request = request(images);

        assert!(request.validate(2).is_ok());
        let err = request.validate(1).unwrap_err();
        assert!(err.to_string().contains("Too many images in request (2 > 1)"));
        assert_eq!(field(&err), Some("images"));
    }

    #[test]
    fn test_validate_rejects_bad_url_and_ids() {
        let mut bad_url = request(serde_json::json!([]));
        bad_url.file.url = "ftp://example.com/test.pdf".to_string();
        assert!(bad_url.validate(10).is_err());

        bad_url.file.url = "not a url".to_string();
        assert!(bad_url.validate(10).is_err());

        let err = bad_url.validate(10).unwrap_err();
        assert_eq!(field(&err), Some("file.url"));

        let empty_id = request(serde_json::json!([
            { "imageId": "a", "pageIndex": 0, "coordinates": [0, 0, 10, 10] },
            { "imageId": " ", "pageIndex": 0, "coordinates": [0, 0, 10, 10] }
        ]));
        let err = empty_id.validate(10).unwrap_err();
        assert_eq!(field(&err), Some("images[1].imageId"));
    }

    #[test]
    fn test_validate_names_offending_field() {
        let mut bad = request(serde_json::json!([
            { "imageId": "a", "pageIndex": 0, "coordinates": [0, 0, 10, 10] }
        ]));
        bad.images[0].coordinates[2] = f64::NAN;
        let err = bad.validate(10).unwrap_err();
        assert_eq!(field(&err), Some("images[0].coordinates"));

        bad.images[0].coordinates[2] = 10.0;
        bad.deadline_ms = Some(0);
        assert_eq!(field(&bad.validate(10).unwrap_err()), Some("deadlineMs"));

        bad.deadline_ms = None;
        bad.target_width = Some(0);
        assert_eq!(field(&bad.validate(10).unwrap_err()), Some("targetWidth"));

        bad.target_width = None;
        bad.request_id = String::new();
        assert_eq!(field(&bad.validate(10).unwrap_err()), Some("requestId"));
    }

    #[test]
    fn test_pixel_rect_geometry() {
        let rect = PixelRect {
            min_y: 50,
            min_x: 200,
            max_y: 450,
            max_x: 800,
        };
        assert_eq!(rect.width(), 600);
        assert_eq!(rect.height(), 400);
        assert_eq!(rect.area(), 240_000);
        assert!(rect.fits_within(1000, 500));
        assert!(!rect.fits_within(700, 500));
        assert_eq!(rect.to_string(), "[50, 200, 450, 800]");
    }

    #[test]
    fn test_failure_code_wire_names() {
        assert_eq!(
            serde_json::to_value(FailureCode::CropConversionFailed).unwrap(),
            serde_json::json!("CROP_CONVERSION_FAILED")
        );
        assert_eq!(
            FailureCode::DeadlineExceeded.to_string(),
            "DEADLINE_EXCEEDED"
        );
    }
}
