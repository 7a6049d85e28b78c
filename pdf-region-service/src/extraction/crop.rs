//! Cutting a pixel rectangle out of a rendered page onto a white margin.

use std::sync::Arc;

use image::Rgba;

use crate::backend::Canvas;
use crate::error::CanvasError;

use super::types::{EncodedCrop, PixelRect, RenderedPage};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

pub struct CropExtractor {
    canvas: Arc<dyn Canvas>,
    margin: u32,
}

impl CropExtractor {
    pub fn new(canvas: Arc<dyn Canvas>, margin: u32) -> Self {
        Self { canvas, margin }
    }

    /// Copy `rect` of `page` into a fresh surface padded by the margin on all
    /// four sides and encode it as PNG.
    pub fn extract(&self, page: &RenderedPage, rect: PixelRect) -> Result<EncodedCrop, CanvasError> {
        let padding = self.margin.saturating_mul(2);
        let width = rect.width().saturating_add(padding);
        let height = rect.height().saturating_add(padding);

        let mut surface = self.canvas.create(width, height)?;
        self.canvas
            .fill(&mut surface, PixelRect::full(width, height), WHITE)?;
        self.canvas
            .copy_region(&page.image, rect, &mut surface, (self.margin, self.margin))?;
        let bytes = self.canvas.encode_png(&surface)?;

        Ok(EncodedCrop {
            width,
            height,
            bytes,
        })
    }
}
