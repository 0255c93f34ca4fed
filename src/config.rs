use clap::Parser;
use image::ImageFormat;
use std::path::PathBuf;

use crate::errors::{Result, VesselSegError};

/// 予測器の固定入力サイズ
pub const DEFAULT_PATCH_SIZE: u32 = 384;
pub const DEFAULT_OVERLAP: u32 = 64;
pub const DEFAULT_THRESHOLD: f32 = 0.5;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    pub input_dir: PathBuf,

    #[arg(default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(short, long)]
    pub model_path: PathBuf,

    /// Mask file format; masks always have the input image's resolution
    #[arg(short, long, default_value = "png", value_parser = check_format)]
    pub format: String,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(long, default_value_t = DEFAULT_PATCH_SIZE)]
    pub patch_size: u32,

    #[arg(long, default_value_t = DEFAULT_OVERLAP)]
    pub overlap: u32,

    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f32,

    /// Number of patches processed concurrently within one image
    #[arg(long, default_value_t = 1)]
    pub patch_workers: usize,

    /// Also write the RGBA cutout next to the mask
    #[arg(long, default_value_t = false)]
    pub save_overlay: bool,
}

impl Config {
    pub const fn segmentation(&self) -> SegmentationConfig {
        SegmentationConfig {
            patch_size: self.patch_size,
            overlap: self.overlap,
            threshold: self.threshold,
            patch_workers: self.patch_workers,
        }
    }
}

/// Tunables of one segmentation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentationConfig {
    /// Side of the square patch; must equal the predictor's input size.
    pub patch_size: u32,
    /// Pixels shared by neighbouring patches.
    pub overlap: u32,
    /// Probabilities strictly above this become foreground.
    pub threshold: f32,
    /// Patches predicted concurrently. `1` keeps the loop sequential.
    pub patch_workers: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            patch_size: DEFAULT_PATCH_SIZE,
            overlap: DEFAULT_OVERLAP,
            threshold: DEFAULT_THRESHOLD,
            patch_workers: 1,
        }
    }
}

impl SegmentationConfig {
    pub const fn step(&self) -> u32 {
        self.patch_size.saturating_sub(self.overlap)
    }

    pub fn validate(&self) -> Result<()> {
        if self.patch_size == 0 {
            return Err(VesselSegError::Configuration {
                message: "patch size must be greater than zero".to_string(),
            });
        }
        if self.overlap >= self.patch_size {
            return Err(VesselSegError::Configuration {
                message: format!(
                    "overlap ({}) must be smaller than patch size ({})",
                    self.overlap, self.patch_size
                ),
            });
        }
        if !self.threshold.is_finite() {
            return Err(VesselSegError::Configuration {
                message: format!("threshold must be finite, got {}", self.threshold),
            });
        }
        if self.patch_workers == 0 {
            return Err(VesselSegError::Configuration {
                message: "patch workers must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn check_format(s: &str) -> std::result::Result<String, String> {
    let supported: Vec<_> = ImageFormat::all()
        .filter(|f| f.writing_enabled())
        .flat_map(|f| f.extensions_str())
        .map(|s| format!("`{}`", s))
        .collect();
    let supported_message = format!("Supported formats: {}", supported.join(", "));

    let format = ImageFormat::from_extension(s)
        .ok_or(format!("{} is not supported. {}", s, supported_message))?;
    if !format.writing_enabled() {
        return Err(format!("{} is not supported. {}", s, supported_message));
    }

    Ok(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tunables() {
        let config = SegmentationConfig::default();
        assert_eq!(config.patch_size, 384);
        assert_eq!(config.overlap, 64);
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.step(), 320);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_patch() {
        let config = SegmentationConfig {
            overlap: 384,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VesselSegError::Configuration { .. })
        ));

        let config = SegmentationConfig {
            patch_size: 0,
            overlap: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_nan_threshold_and_zero_workers() {
        let config = SegmentationConfig {
            threshold: f32::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SegmentationConfig {
            patch_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let config = Config::try_parse_from([
            "vessel-seg",
            "in",
            "--model-path",
            "model.onnx",
            "--overlap",
            "32",
            "--threshold",
            "0.4",
        ])
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.format, "png");
        let seg = config.segmentation();
        assert_eq!(seg.patch_size, 384);
        assert_eq!(seg.overlap, 32);
        assert_eq!(seg.threshold, 0.4);
        assert_eq!(seg.patch_workers, 1);
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        let result = Config::try_parse_from([
            "vessel-seg",
            "in",
            "--model-path",
            "model.onnx",
            "--format",
            "xyz",
        ]);
        assert!(result.is_err());
    }
}
