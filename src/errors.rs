use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the vessel segmentation pipeline.
///
/// # Why structured errors
///
/// The pipeline has two error policies: whole-request failures (predictor down,
/// mask creation) and per-patch failures that the tiled path absorbs. Keeping
/// each failure in its own variant lets the orchestrator decide which is which
/// with a `match` instead of parsing error strings.
#[derive(Error, Debug)]
pub enum VesselSegError {
    #[error("Model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    #[error("No input image was provided")]
    NoInput,

    #[error("Conversion failed: {operation} ({reason})")]
    ConversionFailed { operation: String, reason: String },

    #[error("Prediction failed: {reason}")]
    PredictionFailed { reason: String },

    #[error("Mask creation failed: {reason}")]
    MaskCreationFailed { reason: String },

    #[error("Segmentation request was cancelled")]
    Cancelled,

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, VesselSegError>;

impl VesselSegError {
    pub(crate) fn conversion(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConversionFailed {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn prediction(reason: impl ToString) -> Self {
        Self::PredictionFailed {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn mask_creation(reason: impl ToString) -> Self {
        Self::MaskCreationFailed {
            reason: reason.to_string(),
        }
    }

    /// Errors that stay local to one tile of a tiled request.
    ///
    /// Crop, pad and normalization failures only lose the contribution of the
    /// patch they happened in. Everything else aborts the request.
    pub const fn is_patch_local(&self) -> bool {
        matches!(self, Self::ConversionFailed { .. })
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Code that has a path and an operation at hand should construct
/// `VesselSegError::FileSystem` directly.
impl From<std::io::Error> for VesselSegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to image processing errors.
impl From<image::ImageError> for VesselSegError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

/// ONNX Runtime errors surface while running a session.
impl From<ort::Error> for VesselSegError {
    fn from(err: ort::Error) -> Self {
        Self::prediction(err)
    }
}

/// Shape errors come from reshaping predictor output, so they are reported as
/// prediction failures.
impl From<ndarray::ShapeError> for VesselSegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::prediction(format!("tensor shape conversion: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conversion_errors_are_patch_local() {
        assert!(VesselSegError::conversion("crop", "out of bounds").is_patch_local());
        assert!(!VesselSegError::prediction("boom").is_patch_local());
        assert!(!VesselSegError::mask_creation("boom").is_patch_local());
        assert!(!VesselSegError::NoInput.is_patch_local());
        assert!(!VesselSegError::Cancelled.is_patch_local());
    }

    #[test]
    fn test_messages_are_human_readable() {
        let err = VesselSegError::prediction("session exploded");
        assert_eq!(err.to_string(), "Prediction failed: session exploded");

        let err = VesselSegError::conversion("resize", "zero-sized image");
        assert_eq!(err.to_string(), "Conversion failed: resize (zero-sized image)");
    }
}
