use std::{sync::Arc, time::Instant};

use image::{DynamicImage, GenericImageView, GrayImage, RgbImage, RgbaImage};
use ndarray::prelude::*;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::SegmentationConfig,
    errors::{Result, VesselSegError},
    planner::{plan, PatchSpec},
    postprocess::{composite, probabilities_from_output, threshold},
    preprocess::{crop, into_batch, normalize, normalize_rgb, pad_patch},
    stitcher::{ProbabilityMap, TileStitcher},
    traits::Predictor,
};

/// How a request was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// The whole image was resized to the patch size and predicted once.
    SinglePass,
    /// The image was split into overlapping patches at full resolution.
    Tiled,
}

/// Result of one segmentation request.
#[derive(Debug, Clone)]
pub struct SegmentationOutput {
    /// Binary 0/255 mask. Single-pass masks have the predictor's resolution,
    /// tiled masks the image's.
    pub mask: GrayImage,
    /// Original image with the mask as alpha, at the image's resolution.
    pub overlay: RgbaImage,
    pub probabilities: ProbabilityMap,
    pub mode: ProcessingMode,
    /// Patches dropped because they could not be cropped, padded or normalized.
    pub skipped_patches: Vec<PatchSpec>,
}

/// Stitched probabilities of a tiled run.
#[derive(Debug, Clone)]
pub struct TiledOutcome {
    pub probabilities: ProbabilityMap,
    pub processed: usize,
    pub skipped: Vec<PatchSpec>,
}

/// Drives a [`Predictor`] over images of any size.
pub struct Segmenter<P: Predictor> {
    predictor: P,
    config: SegmentationConfig,
}

impl<P: Predictor> Segmenter<P> {
    pub fn new(predictor: P, config: SegmentationConfig) -> Result<Self> {
        config.validate()?;
        let input_size = predictor.input_size();
        if input_size != config.patch_size {
            return Err(VesselSegError::Configuration {
                message: format!(
                    "patch size {} does not match the predictor input size {}",
                    config.patch_size, input_size
                ),
            });
        }
        Ok(Self { predictor, config })
    }

    pub const fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub const fn predictor(&self) -> &P {
        &self.predictor
    }

    pub const fn mode_for(&self, width: u32, height: u32) -> ProcessingMode {
        if width > self.config.patch_size || height > self.config.patch_size {
            ProcessingMode::Tiled
        } else {
            ProcessingMode::SinglePass
        }
    }

    pub fn segment(&self, image: &DynamicImage) -> Result<SegmentationOutput> {
        self.segment_with_cancel(image, &CancellationToken::new())
    }

    /// Segments `image`, issuing no further predictor calls once `cancel` fires.
    pub fn segment_with_cancel(
        &self,
        image: &DynamicImage,
        cancel: &CancellationToken,
    ) -> Result<SegmentationOutput> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(VesselSegError::NoInput);
        }

        let started = Instant::now();
        let mode = self.mode_for(width, height);
        info!(width, height, ?mode, "segmentation started");

        let (probabilities, skipped_patches) = match mode {
            ProcessingMode::SinglePass => (self.predict_single(image, cancel)?, Vec::new()),
            ProcessingMode::Tiled => {
                let patches = plan(width, height, self.config.patch_size, self.config.overlap)?;
                debug!(patches = patches.len(), step = patches.step(), "planned patches");
                let outcome = self.run_tiled(&image.to_rgb8(), patches, cancel)?;
                (outcome.probabilities, outcome.skipped)
            }
        };

        let mask = threshold(&probabilities, self.config.threshold)?;
        let overlay = composite(image, &mask)?;

        info!(
            ?mode,
            skipped = skipped_patches.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "segmentation finished"
        );

        Ok(SegmentationOutput {
            mask,
            overlay,
            probabilities,
            mode,
            skipped_patches,
        })
    }

    /// Probabilities for the whole image, resized to the patch size.
    fn predict_single(
        &self,
        image: &DynamicImage,
        cancel: &CancellationToken,
    ) -> Result<ProbabilityMap> {
        let size = self.config.patch_size;
        let tensor = into_batch(normalize(image, size, size)?);
        let output = self.predict(tensor.view(), cancel)?;
        probabilities_from_output(&output)
    }

    /// Predicts every patch in `patches` and stitches the results.
    ///
    /// Patches that fail to crop, pad or normalize are skipped; their pixels
    /// keep whatever other patches contribute, or 0 when nothing else covers
    /// them. Predictor failures and cancellation abort the run.
    ///
    /// With `patch_workers > 1` a chunk of patches is predicted in parallel,
    /// but chunks are still blended in iteration order, so the result does
    /// not depend on the worker count.
    pub fn run_tiled<I>(
        &self,
        image: &RgbImage,
        patches: I,
        cancel: &CancellationToken,
    ) -> Result<TiledOutcome>
    where
        I: IntoIterator<Item = PatchSpec>,
    {
        let (width, height) = image.dimensions();
        let workers = self.config.patch_workers.max(1);
        let mut stitcher = TileStitcher::new(width, height);
        let mut skipped = Vec::new();
        let mut processed = 0;

        let mut patches = patches.into_iter();
        loop {
            let chunk: Vec<PatchSpec> = patches.by_ref().take(workers).collect();
            if chunk.is_empty() {
                break;
            }

            let outputs: Vec<Result<Array2<f32>>> = if workers == 1 {
                chunk
                    .iter()
                    .map(|spec| self.predict_patch(image, spec, cancel))
                    .collect()
            } else {
                chunk
                    .par_iter()
                    .map(|spec| self.predict_patch(image, spec, cancel))
                    .collect()
            };

            for (spec, output) in chunk.iter().zip(outputs) {
                match output {
                    Ok(probabilities) => {
                        stitcher.blend(probabilities.view(), spec);
                        processed += 1;
                    }
                    Err(err) if err.is_patch_local() => {
                        warn!(%spec, error = %err, "skipping patch");
                        skipped.push(*spec);
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        let uncovered = stitcher.uncovered_pixels();
        if uncovered > 0 {
            warn!(uncovered, "pixels not covered by any patch fall back to 0");
        }
        debug!(processed, skipped = skipped.len(), "stitched patches");

        Ok(TiledOutcome {
            probabilities: stitcher.finalize(),
            processed,
            skipped,
        })
    }

    /// Crop, pad, normalize and predict one patch; returns its `H×W` output.
    fn predict_patch(
        &self,
        image: &RgbImage,
        spec: &PatchSpec,
        cancel: &CancellationToken,
    ) -> Result<Array2<f32>> {
        let size = self.config.patch_size;
        let tensor = {
            let patch = pad_patch(crop(image, spec)?, size)?;
            into_batch(normalize_rgb(&patch, size, size)?)
        };
        let output = self.predict(tensor.view(), cancel)?;

        let shape = output.shape();
        if shape[0] < 1
            || shape[1] < 1
            || shape[2] < spec.valid_height as usize
            || shape[3] < spec.valid_width as usize
        {
            return Err(VesselSegError::prediction(format!(
                "output shape {shape:?} cannot cover {spec}"
            )));
        }
        Ok(output.slice_move(s![0, 0, .., ..]))
    }

    fn predict(&self, tensor: ArrayView4<f32>, cancel: &CancellationToken) -> Result<Array4<f32>> {
        if cancel.is_cancelled() {
            return Err(VesselSegError::Cancelled);
        }
        self.predictor.predict(tensor).map_err(|err| match err {
            VesselSegError::ModelUnavailable { .. }
            | VesselSegError::PredictionFailed { .. }
            | VesselSegError::Cancelled => err,
            other => VesselSegError::prediction(other),
        })
    }
}

impl<P: Predictor + 'static> Segmenter<P> {
    /// Runs the request on the blocking pool.
    ///
    /// Dropping the returned future cancels the request: no predictor call is
    /// issued after that, and partial results are discarded.
    pub async fn segment_async(
        self: Arc<Self>,
        image: DynamicImage,
        cancel: CancellationToken,
    ) -> Result<SegmentationOutput> {
        let guard = cancel.clone().drop_guard();
        let handle = tokio::task::spawn_blocking(move || self.segment_with_cancel(&image, &cancel));

        let result = match handle.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(VesselSegError::Cancelled),
            Err(err) => std::panic::resume_unwind(err.into_panic()),
        };
        guard.disarm();
        result
    }
}
