use std::sync::OnceLock;

use palette::{LinSrgb, Srgb};

// sRGB (0..255) -> linear light (0..1)
static SRGB_TO_LINEAR_LUT: OnceLock<[f32; 256]> = OnceLock::new();

fn lut() -> &'static [f32; 256] {
    SRGB_TO_LINEAR_LUT.get_or_init(|| {
        let mut table = [0.0; 256];
        for (value, slot) in table.iter_mut().enumerate() {
            let encoded = Srgb::new(value as u8, value as u8, value as u8).into_format::<f32>();
            let linear: LinSrgb<f32> = encoded.into_linear();
            *slot = linear.green;
        }
        table
    })
}

/// Decodes one gamma-encoded 8-bit sRGB channel into linear light in `[0, 1]`.
#[inline]
pub fn srgb_to_linear(value: u8) -> f32 {
    lut()[value as usize]
}
