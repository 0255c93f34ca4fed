use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::{Result, VesselSegError};
use crate::traits::Predictor;
use ndarray::prelude::*;

/// テスト用のモック予測器の振る舞い
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Every output pixel holds the same value.
    Constant(f32),
    /// The probability is the first input channel, i.e. the linearized green
    /// intensity of the pixel.
    EchoInput,
    /// Every call fails with `PredictionFailed`.
    Fail(String),
}

/// テスト用のモック予測器
#[derive(Debug)]
pub struct MockPredictor {
    pub image_size: u32,
    behavior: MockBehavior,
    calls: AtomicUsize,
}

impl MockPredictor {
    pub const fn new(image_size: u32, behavior: MockBehavior) -> Self {
        Self {
            image_size,
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub const fn constant(image_size: u32, value: f32) -> Self {
        Self::new(image_size, MockBehavior::Constant(value))
    }

    pub const fn echo(image_size: u32) -> Self {
        Self::new(image_size, MockBehavior::EchoInput)
    }

    pub fn failing(image_size: u32, reason: &str) -> Self {
        Self::new(image_size, MockBehavior::Fail(reason.to_string()))
    }

    /// 予測呼び出し回数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Predictor for MockPredictor {
    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let shape = tensor.shape();
        let size = self.image_size as usize;
        if shape[1..] != [3, size, size] {
            return Err(VesselSegError::prediction(format!(
                "expected Nx3x{size}x{size} input, got {shape:?}"
            )));
        }

        match &self.behavior {
            MockBehavior::Constant(value) => {
                Ok(Array4::from_elem((shape[0], 1, size, size), *value))
            }
            MockBehavior::EchoInput => Ok(tensor.slice(s![.., 0..1, .., ..]).to_owned()),
            MockBehavior::Fail(reason) => Err(VesselSegError::prediction(reason)),
        }
    }
}

/// テスト用のファクトリー関数
pub const fn create_mock_predictor() -> MockPredictor {
    MockPredictor::constant(crate::config::DEFAULT_PATCH_SIZE, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_predictor_creation() {
        let mock = create_mock_predictor();
        assert_eq!(mock.input_size(), 384);
        assert_eq!(mock.calls(), 0);
    }

    #[test]
    fn test_mock_predictor_shapes() -> Result<()> {
        let mock = MockPredictor::constant(8, 0.25);
        let input = Array4::<f32>::zeros((1, 3, 8, 8));

        let output = mock.predict(input.view())?;
        assert_eq!(output.shape(), &[1, 1, 8, 8]);
        assert!(output.iter().all(|&v| v == 0.25));
        assert_eq!(mock.calls(), 1);
        Ok(())
    }

    #[test]
    fn test_mock_predictor_echo() -> Result<()> {
        let mock = MockPredictor::echo(2);
        let input = Array4::from_shape_fn((1, 3, 2, 2), |(_, c, y, x)| (c * 10 + y * 2 + x) as f32);

        let output = mock.predict(input.view())?;
        assert_eq!(output, array![[[[0.0, 1.0], [2.0, 3.0]]]]);
        Ok(())
    }

    #[test]
    fn test_mock_predictor_rejects_wrong_shape() {
        let mock = MockPredictor::constant(8, 0.0);
        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(mock.predict(input.view()).is_err());

        let failing = MockPredictor::failing(8, "offline");
        let input = Array4::<f32>::zeros((1, 3, 8, 8));
        assert!(matches!(
            failing.predict(input.view()),
            Err(VesselSegError::PredictionFailed { reason }) if reason == "offline"
        ));
    }
}
