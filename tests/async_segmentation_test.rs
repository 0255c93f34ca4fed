use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, Rgb, RgbImage};
use ndarray::{Array4, ArrayView4};
use tokio_util::sync::CancellationToken;

use vessel_seg_rs::{
    mocks::MockPredictor, Predictor, ProcessingMode, SegmentationConfig, Segmenter, VesselSegError,
};

// 呼び出しごとに待機する遅い予測器
struct SlowPredictor {
    inner: MockPredictor,
    delay: Duration,
}

impl Predictor for SlowPredictor {
    fn input_size(&self) -> u32 {
        self.inner.input_size()
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> vessel_seg_rs::Result<Array4<f32>> {
        std::thread::sleep(self.delay);
        self.inner.predict(tensor)
    }
}

impl SlowPredictor {
    fn new(delay_ms: u64) -> Self {
        Self {
            inner: MockPredictor::constant(384, 1.0),
            delay: Duration::from_millis(delay_ms),
        }
    }
}

fn default_segmenter<P: Predictor>(predictor: P) -> Segmenter<P> {
    let config = SegmentationConfig::default();
    Segmenter::new(predictor, config).unwrap()
}

fn test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 90, 60])))
}

#[tokio::test]
async fn test_async_segmentation_matches_sync() {
    let segmenter = Arc::new(default_segmenter(MockPredictor::echo(384)));
    let image = test_image(500, 400);

    let expected = segmenter.segment(&image).unwrap();
    let output = Arc::clone(&segmenter)
        .segment_async(image, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.mode, ProcessingMode::Tiled);
    assert_eq!(output.probabilities, expected.probabilities);
    assert_eq!(output.mask, expected.mask);
}

#[tokio::test]
async fn test_async_reports_no_input() {
    let segmenter = Arc::new(default_segmenter(MockPredictor::constant(384, 1.0)));
    let result = segmenter
        .segment_async(test_image(0, 0), CancellationToken::new())
        .await;
    assert!(matches!(result, Err(VesselSegError::NoInput)));
}

#[tokio::test]
async fn test_cancellation_stops_predictor_calls() {
    let segmenter = Arc::new(default_segmenter(SlowPredictor::new(50)));
    // 7x7 = 49 patches, far more than can run before the cancel fires
    let image = test_image(2200, 2200);
    let cancel = CancellationToken::new();

    let task = tokio::spawn(Arc::clone(&segmenter).segment_async(image, cancel.clone()));
    tokio::time::sleep(Duration::from_millis(120)).await;
    cancel.cancel();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(VesselSegError::Cancelled)));
    assert!(segmenter.predictor().inner.calls() < 49);
}

#[tokio::test]
async fn test_dropping_the_future_cancels_the_request() {
    let segmenter = Arc::new(default_segmenter(SlowPredictor::new(50)));
    let image = test_image(2200, 2200);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(120),
        Arc::clone(&segmenter).segment_async(image, CancellationToken::new()),
    )
    .await;
    assert!(abandoned.is_err());

    // the blocking task notices the cancellation before its next prediction
    tokio::time::sleep(Duration::from_millis(300)).await;
    let calls = segmenter.predictor().inner.calls();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(segmenter.predictor().inner.calls(), calls);
    assert!(calls < 49);
}
