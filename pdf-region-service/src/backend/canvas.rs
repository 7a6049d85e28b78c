//! Raster surfaces backed by the `image` crate.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage, imageops};

use crate::backend::Canvas;
use crate::error::CanvasError;
use crate::extraction::PixelRect;

/// Largest surface the canvas will allocate, in pixels
const MAX_SURFACE_PIXELS: u64 = 1 << 28;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCanvas;

impl ImageCanvas {
    pub fn new() -> Self {
        Self
    }
}

fn check_region(region: PixelRect, surface: &RgbaImage) -> Result<(), CanvasError> {
    if region.fits_within(surface.width(), surface.height()) {
        Ok(())
    } else {
        Err(CanvasError::OutOfBounds {
            region: region.to_string(),
            width: surface.width(),
            height: surface.height(),
        })
    }
}

impl Canvas for ImageCanvas {
    fn create(&self, width: u32, height: u32) -> Result<RgbaImage, CanvasError> {
        let pixels = width as u64 * height as u64;
        if pixels == 0 || pixels > MAX_SURFACE_PIXELS {
            return Err(CanvasError::Allocation { width, height });
        }
        Ok(RgbaImage::new(width, height))
    }

    fn fill(
        &self,
        surface: &mut RgbaImage,
        region: PixelRect,
        color: Rgba<u8>,
    ) -> Result<(), CanvasError> {
        check_region(region, surface)?;
        for y in region.min_y..region.max_y {
            for x in region.min_x..region.max_x {
                surface.put_pixel(x, y, color);
            }
        }
        Ok(())
    }

    fn copy_region(
        &self,
        source: &RgbaImage,
        region: PixelRect,
        target: &mut RgbaImage,
        offset: (u32, u32),
    ) -> Result<(), CanvasError> {
        check_region(region, source)?;

        let (x, y) = offset;
        let placed = PixelRect {
            min_y: y,
            min_x: x,
            max_y: y.saturating_add(region.height()),
            max_x: x.saturating_add(region.width()),
        };
        check_region(placed, target)?;

        let cropped =
            imageops::crop_imm(source, region.min_x, region.min_y, region.width(), region.height())
                .to_image();
        imageops::replace(target, &cropped, x as i64, y as i64);
        Ok(())
    }

    fn encode_png(&self, surface: &RgbaImage) -> Result<Vec<u8>, CanvasError> {
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(
                surface.as_raw(),
                surface.width(),
                surface.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| CanvasError::Encode {
                message: e.to_string(),
            })?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    #[test]
    fn test_create_rejects_empty_and_huge() {
        let canvas = ImageCanvas::new();
        assert!(canvas.create(10, 20).is_ok());
        assert_eq!(
            canvas.create(0, 20).unwrap_err(),
            CanvasError::Allocation {
                width: 0,
                height: 20
            }
        );
        assert!(canvas.create(u32::MAX, u32::MAX).is_err());
    }

    #[test]
    fn test_fill_region() {
        let canvas = ImageCanvas::new();
        let mut surface = canvas.create(4, 4).unwrap();
        let region = PixelRect {
            min_y: 1,
            min_x: 1,
            max_y: 3,
            max_x: 2,
        };

        canvas.fill(&mut surface, region, RED).unwrap();

        assert_eq!(*surface.get_pixel(1, 1), RED);
        assert_eq!(*surface.get_pixel(1, 2), RED);
        assert_eq!(surface.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(surface.get_pixel(2, 1).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_fill_out_of_bounds() {
        let canvas = ImageCanvas::new();
        let mut surface = canvas.create(4, 4).unwrap();
        let err = canvas
            .fill(&mut surface, PixelRect::full(5, 4), RED)
            .unwrap_err();
        assert!(matches!(err, CanvasError::OutOfBounds { .. }));
    }

    #[test]
    fn test_copy_region_with_offset() {
        let canvas = ImageCanvas::new();
        let mut source = canvas.create(10, 10).unwrap();
        canvas.fill(&mut source, PixelRect::full(10, 10), RED).unwrap();

        let mut target = canvas.create(6, 6).unwrap();
        canvas.fill(&mut target, PixelRect::full(6, 6), WHITE).unwrap();

        let region = PixelRect {
            min_y: 2,
            min_x: 3,
            max_y: 4,
            max_x: 7,
        };
        canvas.copy_region(&source, region, &mut target, (1, 2)).unwrap();

        assert_eq!(*target.get_pixel(1, 2), RED);
        assert_eq!(*target.get_pixel(4, 3), RED);
        assert_eq!(*target.get_pixel(0, 0), WHITE);
        assert_eq!(*target.get_pixel(5, 3), WHITE);
        assert_eq!(*target.get_pixel(1, 4), WHITE);
    }

    #[test]
    fn test_copy_region_rejects_overflowing_placement() {
        let canvas = ImageCanvas::new();
        let source = canvas.create(10, 10).unwrap();
        let mut target = canvas.create(4, 4).unwrap();

        let err = canvas
            .copy_region(&source, PixelRect::full(4, 4), &mut target, (1, 0))
            .unwrap_err();
        assert!(matches!(err, CanvasError::OutOfBounds { .. }));
    }

    #[test]
    fn test_encode_png_signature() {
        let canvas = ImageCanvas::new();
        let mut surface = canvas.create(3, 2).unwrap();
        canvas.fill(&mut surface, PixelRect::full(3, 2), WHITE).unwrap();

        let png = canvas.encode_png(&surface).unwrap();
        assert_eq!(&png[..8], &PNG_SIGNATURE);

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }
}
