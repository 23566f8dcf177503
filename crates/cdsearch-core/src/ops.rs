//! Color and morphological primitives on [`LazyImage`].

use std::sync::Arc;

use crate::error::ComputeError;
use crate::image::{check_dimensions, intensity, is_above, PixelImage, PixelKind};
use crate::pipeline::LazyImage;

impl LazyImage {
    /// Horizontal mirror: `(x, y)` reads `(width - 1 - x, y)`.
    pub fn mirror(&self) -> LazyImage {
        self.mapi(|x, y, src| src.get(src.width() - 1 - x, y))
    }

    /// Gray conversion (unweighted channel mean for RGB, identity for gray).
    pub fn to_gray(&self) -> LazyImage {
        let kind = self.kind();
        self.map(PixelKind::Gray, move |p| intensity(p, kind))
    }

    /// Keep pixels strictly above `threshold` in any channel, zero the rest.
    pub fn mask(&self, threshold: u32) -> LazyImage {
        let kind = self.kind();
        self.map(kind, move |p| if is_above(p, kind, threshold) { p } else { 0 })
    }

    /// Binary gray image: 1 where the pixel intensity is above `threshold`.
    pub fn to_signal(&self, threshold: u32) -> LazyImage {
        let kind = self.kind();
        self.map(PixelKind::Gray, move |p| {
            u32::from(intensity(p, kind) > threshold)
        })
    }

    /// Zero every pixel whose ROI pixel is black.
    pub fn clear_outside(&self, roi: Arc<PixelImage>) -> Result<LazyImage, ComputeError> {
        check_dimensions(self.dimensions(), roi.dimensions())?;
        Ok(self.mapi(move |x, y, src| if roi.get(x, y) != 0 { src.get(x, y) } else { 0 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::rgb;

    fn sample_rgb() -> PixelImage {
        PixelImage::new(
            3,
            2,
            PixelKind::Rgb,
            vec![
                rgb(255, 0, 0),
                rgb(10, 10, 10),
                rgb(0, 30, 90),
                rgb(0, 0, 0),
                rgb(60, 60, 63),
                rgb(21, 0, 0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn mirror_is_an_involution() {
        let img = LazyImage::from_image(sample_rgb());
        assert_eq!(img.mirror().get(0, 0), rgb(0, 30, 90));
        assert_eq!(img.mirror().mirror().materialize(), sample_rgb());
    }

    #[test]
    fn mask_and_signal_threshold_any_channel() {
        let img = LazyImage::from_image(sample_rgb());
        let masked = img.mask(20).materialize();
        assert_eq!(masked.get(1, 0), 0);
        assert_eq!(masked.get(2, 1), rgb(21, 0, 0));
        let signal = img.to_gray().to_signal(2).materialize();
        assert_eq!(signal.kind(), PixelKind::Gray);
        assert_eq!(signal.row(0), &[1, 1, 1]);
        assert_eq!(signal.row(1), &[0, 1, 1]);
    }

    #[test]
    fn clear_outside_uses_roi() {
        let img = LazyImage::from_image(sample_rgb());
        let roi = PixelImage::new(3, 2, PixelKind::Gray, vec![1, 0, 1, 1, 1, 0]).unwrap();
        let cleared = img.clear_outside(Arc::new(roi)).unwrap().materialize();
        assert_eq!(cleared.get(1, 0), 0);
        assert_eq!(cleared.get(0, 0), rgb(255, 0, 0));
        assert_eq!(cleared.get(2, 1), 0);

        let wrong = PixelImage::filled(2, 2, PixelKind::Gray, 1);
        assert!(img.clear_outside(Arc::new(wrong)).is_err());
    }
}
