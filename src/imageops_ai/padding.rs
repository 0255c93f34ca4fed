use image::{imageops, GenericImageView, ImageBuffer, Pixel, Primitive};

/// Places `image` on a `pad_width × pad_height` canvas filled with `color`.
///
/// The content is anchored at the top-left corner so that pixel `(x, y)` of
/// the source keeps its coordinates; padding only grows to the right and the
/// bottom. Returns `None` when the image is larger than the canvas.
pub fn padding<I, P, S>(
    image: &I,
    pad_width: u32,
    pad_height: u32,
    color: P,
) -> Option<ImageBuffer<P, Vec<S>>>
where
    I: GenericImageView<Pixel = P>,
    P: Pixel<Subpixel = S>,
    S: Primitive,
{
    let (width, height) = image.dimensions();
    if width > pad_width || height > pad_height {
        return None;
    }

    let mut canvas = ImageBuffer::from_pixel(pad_width, pad_height, color);
    imageops::replace(&mut canvas, image, 0, 0);
    Some(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_content_stays_top_left() {
        let image = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        let padded = padding(&image, 5, 4, Rgb([0, 0, 0])).unwrap();

        assert_eq!(padded.dimensions(), (5, 4));
        assert_eq!(padded.get_pixel(0, 0), &Rgb([10, 20, 30]));
        assert_eq!(padded.get_pixel(2, 1), &Rgb([10, 20, 30]));
        assert_eq!(padded.get_pixel(3, 0), &Rgb([0, 0, 0]));
        assert_eq!(padded.get_pixel(0, 2), &Rgb([0, 0, 0]));
        assert_eq!(padded.get_pixel(4, 3), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_oversized_image_is_rejected() {
        let image = RgbImage::new(6, 2);
        assert!(padding(&image, 5, 5, Rgb([0, 0, 0])).is_none());
    }
}
