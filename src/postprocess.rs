use image::{imageops, DynamicImage, GenericImageView, GrayImage, ImageBuffer, Luma, RgbaImage};
use ndarray::prelude::*;

use crate::{
    errors::{Result, VesselSegError},
    imageops_ai::mask,
    preprocess::RESAMPLE_FILTER,
    stitcher::ProbabilityMap,
};

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Takes the `1×1×H×W` predictor output for one image as a probability map.
pub fn probabilities_from_output(output: &Array4<f32>) -> Result<ProbabilityMap> {
    let shape = output.shape();
    if shape[0] < 1 || shape[1] < 1 {
        return Err(VesselSegError::prediction(format!(
            "predictor returned an empty tensor of shape {shape:?}"
        )));
    }
    Ok(ProbabilityMap::from_array(
        output.slice(s![0, 0, .., ..]).to_owned(),
    ))
}

/// Binarizes a probability map: strictly above `cutoff` is foreground (255).
///
/// NaN probabilities compare false and end up as background.
pub fn threshold(probabilities: &ProbabilityMap, cutoff: f32) -> Result<GrayImage> {
    let pixels = probabilities
        .view()
        .iter()
        .map(|&p| if p > cutoff { FOREGROUND } else { BACKGROUND })
        .collect::<Vec<u8>>();

    ImageBuffer::from_raw(probabilities.width(), probabilities.height(), pixels).ok_or_else(|| {
        VesselSegError::mask_creation(format!(
            "pixel buffer does not match {}x{}",
            probabilities.width(),
            probabilities.height()
        ))
    })
}

/// Cuts the masked regions out of `original`.
///
/// The mask is resized to the original resolution with the normalization
/// filter and becomes the alpha channel; unmasked pixels are fully transparent.
pub fn composite(original: &DynamicImage, binary_mask: &GrayImage) -> Result<RgbaImage> {
    let (width, height) = original.dimensions();
    if binary_mask.width() == 0 || binary_mask.height() == 0 {
        return Err(VesselSegError::mask_creation("mask is empty"));
    }

    let resized;
    let alpha: &ImageBuffer<Luma<u8>, Vec<u8>> = if binary_mask.dimensions() == (width, height) {
        binary_mask
    } else {
        resized = imageops::resize(binary_mask, width, height, RESAMPLE_FILTER);
        &resized
    };

    mask::apply(&original.to_rgb8(), alpha).map_err(VesselSegError::mask_creation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};

    #[test]
    fn test_threshold_is_strict() {
        let map = ProbabilityMap::from_array(array![[0.5, 0.5000001, 0.49], [1.0, 0.0, f32::NAN]]);
        let mask = threshold(&map, 0.5).unwrap();

        assert_eq!(mask.dimensions(), (3, 2));
        assert_eq!(mask.get_pixel(0, 0), &Luma([0]));
        assert_eq!(mask.get_pixel(1, 0), &Luma([255]));
        assert_eq!(mask.get_pixel(2, 0), &Luma([0]));
        assert_eq!(mask.get_pixel(0, 1), &Luma([255]));
        assert_eq!(mask.get_pixel(1, 1), &Luma([0]));
        assert_eq!(mask.get_pixel(2, 1), &Luma([0]));
    }

    #[test]
    fn test_threshold_accepts_out_of_range_values() {
        let map = ProbabilityMap::from_array(array![[1.7, -3.0]]);
        let mask = threshold(&map, 0.5).unwrap();
        assert_eq!(mask.as_raw(), &vec![255, 0]);
    }

    #[test]
    fn test_composite_same_size() {
        let original = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([9, 8, 7])));
        let mut binary = GrayImage::new(2, 2);
        binary.put_pixel(1, 1, Luma([255]));

        let overlay = composite(&original, &binary).unwrap();
        assert_eq!(overlay.get_pixel(0, 0), &Rgba([9, 8, 7, 0]));
        assert_eq!(overlay.get_pixel(1, 1), &Rgba([9, 8, 7, 255]));
    }

    #[test]
    fn test_composite_resizes_mask() {
        let original = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 30, Rgb([1, 2, 3])));
        let binary = GrayImage::from_pixel(384, 384, Luma([255]));

        let overlay = composite(&original, &binary).unwrap();
        assert_eq!(overlay.dimensions(), (50, 30));
        assert!(overlay.pixels().all(|p| p.0 == [1, 2, 3, 255]));
    }

    #[test]
    fn test_probabilities_from_output() {
        let output = Array4::from_shape_fn((1, 1, 2, 3), |(_, _, y, x)| (y * 3 + x) as f32);
        let map = probabilities_from_output(&output).unwrap();
        assert_eq!((map.width(), map.height()), (3, 2));
        assert_eq!(map.get(2, 1), Some(5.0));

        let empty = Array4::<f32>::zeros((0, 1, 2, 2));
        assert!(probabilities_from_output(&empty).is_err());
    }
}
