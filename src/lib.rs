pub mod config;
pub mod errors;
pub mod imageops_ai;
pub mod mocks;
pub mod model;
pub mod planner;
pub mod postprocess;
pub mod preprocess;
pub mod segmenter;
pub mod stitcher;
pub mod traits;

use image::{imageops, imageops::FilterType, GenericImageView, ImageFormat};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

pub use config::{Config, SegmentationConfig};
pub use errors::{Result, VesselSegError};
pub use model::OnnxPredictor;
pub use planner::{plan, PatchPlan, PatchSpec};
pub use segmenter::{ProcessingMode, SegmentationOutput, Segmenter, TiledOutcome};
pub use stitcher::{ProbabilityMap, TileStitcher};
pub use traits::Predictor;

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Counts of one directory run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectorySummary {
    pub processed: usize,
    pub failed: usize,
}

/// Segments every image below `input_dir` and writes masks to `output_dir`.
pub struct ImageProcessor<P: Predictor> {
    segmenter: Segmenter<P>,
    config: Config,
}

impl<P: Predictor> ImageProcessor<P> {
    pub fn new(predictor: P, config: Config) -> Result<Self> {
        let segmenter = Segmenter::new(predictor, config.segmentation())?;
        Ok(Self { segmenter, config })
    }

    pub fn process_directory(&self) -> Result<DirectorySummary> {
        let input_path = &self.config.input_dir;
        let output_path = &self.config.output_dir;

        if !input_path.exists() {
            return Err(VesselSegError::FileSystem {
                path: input_path.clone(),
                operation: "input directory lookup".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "input directory does not exist",
                ),
            });
        }

        fs::create_dir_all(output_path).map_err(|e| VesselSegError::FileSystem {
            path: output_path.clone(),
            operation: "output directory creation".to_string(),
            source: e,
        })?;

        let image_files = self.collect_image_files(input_path);

        if image_files.is_empty() {
            warn!(path = %input_path.display(), "no images to process");
            return Ok(DirectorySummary::default());
        }

        let pb = ProgressBar::new(image_files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .map_err(|e| VesselSegError::Configuration {
                    message: format!("progress bar template: {e}"),
                })?
                .progress_chars("#>-"),
        );

        let failed = image_files
            .par_iter()
            .progress_with(pb.clone())
            .filter(|input_file| {
                let result = self.process_single_image(input_file, output_path);
                if let Err(e) = &result {
                    error!(path = %input_file.display(), error = %e, "failed to segment image");
                }
                result.is_err()
            })
            .count();

        pb.finish_and_clear();
        let summary = DirectorySummary {
            processed: image_files.len() - failed,
            failed,
        };
        info!(
            processed = summary.processed,
            failed = summary.failed,
            "directory processed"
        );
        Ok(summary)
    }

    fn collect_image_files(&self, input_path: &Path) -> Vec<PathBuf> {
        WalkDir::new(input_path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.is_supported_image_format(e.path()))
            .map(|e| e.into_path())
            .collect()
    }

    /// Whether `path` has the extension of a format this build can decode.
    ///
    /// Formats behind disabled `image` features are left out of the run
    /// instead of failing to decode.
    pub fn is_supported_image_format(&self, path: &Path) -> bool {
        ImageFormat::from_path(path).is_ok_and(|format| format.reading_enabled())
    }

    pub fn process_single_image(&self, input_file: &Path, output_dir: &Path) -> Result<()> {
        let img = image::open(input_file).map_err(|e| VesselSegError::ImageProcessing {
            path: input_file.display().to_string(),
            operation: "image loading".to_string(),
            source: Box::new(e),
        })?;

        let output = self.segmenter.segment(&img)?;

        // single-pass masks come back at the predictor's resolution
        let (width, height) = img.dimensions();
        let mask = if output.mask.dimensions() == (width, height) {
            output.mask
        } else {
            imageops::resize(&output.mask, width, height, FilterType::Nearest)
        };

        let relative_path = self.get_relative_path(input_file)?;
        let output_base = output_dir.join(relative_path);

        if let Some(parent) = output_base.parent() {
            fs::create_dir_all(parent).map_err(|e| VesselSegError::FileSystem {
                path: parent.to_path_buf(),
                operation: "output directory creation".to_string(),
                source: e,
            })?;
        }

        let mask_file = suffixed(&output_base, "mask", &self.config.format);
        let output_format =
            ImageFormat::from_extension(&self.config.format).unwrap_or(ImageFormat::Png);
        mask
            .save_with_format(&mask_file, output_format)
            .map_err(|e| VesselSegError::ImageProcessing {
                path: mask_file.display().to_string(),
                operation: "mask saving".to_string(),
                source: Box::new(e),
            })?;

        if self.config.save_overlay {
            // alpha needs a format that keeps it
            let overlay_file = suffixed(&output_base, "overlay", "png");
            output
                .overlay
                .save_with_format(&overlay_file, ImageFormat::Png)
                .map_err(|e| VesselSegError::ImageProcessing {
                    path: overlay_file.display().to_string(),
                    operation: "overlay saving".to_string(),
                    source: Box::new(e),
                })?;
        }

        Ok(())
    }

    pub fn get_relative_path(&self, input_file: &Path) -> Result<PathBuf> {
        let input_dir = &self.config.input_dir;
        input_file
            .strip_prefix(input_dir)
            .map(|p| p.to_path_buf())
            .map_err(|_| VesselSegError::FileSystem {
                path: input_file.to_path_buf(),
                operation: "relative path resolution".to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "input file is not inside the input directory",
                ),
            })
    }
}

/// `dir/name.jpg` -> `dir/name_<suffix>.<extension>`
fn suffixed(path: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}_{suffix}.{extension}"))
}
