use crate::errors::Result;
use ndarray::prelude::*;

/// 固定サイズ入力のセグメンテーション予測器の抽象化
///
/// The predictor takes an `N×3×S×S` tensor with values in `[0, 1]` and returns
/// an `N×1×S×S` probability tensor, where `S` is [`Predictor::input_size`].
/// Output values are not guaranteed to be clamped to `[0, 1]`.
///
/// Implementations must be deterministic for a fixed input; the tiled path
/// relies on that for reproducible output.
pub trait Predictor: Send + Sync {
    /// モデルの入力画像サイズを取得
    fn input_size(&self) -> u32;

    /// テンソル予測
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;
}

impl<P: Predictor + ?Sized> Predictor for std::sync::Arc<P> {
    fn input_size(&self) -> u32 {
        (**self).input_size()
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        (**self).predict(tensor)
    }
}

impl<P: Predictor + ?Sized> Predictor for &P {
    fn input_size(&self) -> u32 {
        (**self).input_size()
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        (**self).predict(tensor)
    }
}
