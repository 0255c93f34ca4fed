use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::{
    errors::{Result, VesselSegError},
    imageops_ai::{linear::srgb_to_linear, padding::padding},
    planner::PatchSpec,
};

/// Resample filter shared by normalization and mask compositing.
pub const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

/// Value used for pixels added around undersized edge patches.
pub const PADDING_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

const GREEN: usize = 1;

/// Converts an image into a `3×target_height×target_width` predictor tensor.
///
/// The image is resampled to the target size, decoded from sRGB to linear
/// light, and its green channel is replicated into all three channels.
pub fn normalize(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> Result<Array3<f32>> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(VesselSegError::conversion(
            "normalize",
            format!("source image is empty ({width}x{height})"),
        ));
    }
    normalize_rgb(&image.to_rgb8(), target_width, target_height)
}

pub fn normalize_rgb(
    image: &RgbImage,
    target_width: u32,
    target_height: u32,
) -> Result<Array3<f32>> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(VesselSegError::conversion(
            "normalize",
            format!("source image is empty ({width}x{height})"),
        ));
    }
    if target_width == 0 || target_height == 0 {
        return Err(VesselSegError::conversion(
            "resize",
            format!("target size is empty ({target_width}x{target_height})"),
        ));
    }

    let resized;
    let image = if (width, height) == (target_width, target_height) {
        image
    } else {
        resized = imageops::resize(image, target_width, target_height, RESAMPLE_FILTER);
        &resized
    };

    let channels = image.as_ndarray3();
    if channels.shape() != [3, target_height as usize, target_width as usize] {
        return Err(VesselSegError::conversion(
            "tensor construction",
            format!("unexpected pixel buffer shape {:?}", channels.shape()),
        ));
    }

    let green = channels.index_axis(Axis(0), GREEN).mapv(srgb_to_linear);
    let tensor = green
        .broadcast((3, target_height as usize, target_width as usize))
        .ok_or_else(|| VesselSegError::conversion("tensor construction", "broadcast failed"))?
        .to_owned();
    Ok(tensor)
}

/// Adds the batch axis expected by [`crate::Predictor`].
pub fn into_batch(tensor: Array3<f32>) -> Array4<f32> {
    tensor.insert_axis(Axis(0))
}

/// Cuts the valid region of `spec` out of `image`.
pub fn crop(image: &RgbImage, spec: &PatchSpec) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    let PatchSpec {
        origin_x: x,
        origin_y: y,
        valid_width: w,
        valid_height: h,
    } = *spec;
    let fits = w > 0
        && h > 0
        && x.checked_add(w).is_some_and(|right| right <= width)
        && y.checked_add(h).is_some_and(|bottom| bottom <= height);
    if !fits {
        return Err(VesselSegError::conversion(
            "crop",
            format!("{spec} lies outside the {width}x{height} image"),
        ));
    }

    Ok(image.view(x, y, w, h).to_image())
}

/// Grows an edge patch to `patch_size × patch_size` with black pixels at the
/// right and bottom.
pub fn pad_patch(patch: RgbImage, patch_size: u32) -> Result<RgbImage> {
    if patch.dimensions() == (patch_size, patch_size) {
        return Ok(patch);
    }
    let (width, height) = patch.dimensions();
    padding(&patch, patch_size, patch_size, PADDING_COLOR).ok_or_else(|| {
        VesselSegError::conversion(
            "pad",
            format!("{width}x{height} patch does not fit into {patch_size}x{patch_size}"),
        )
    })
}
