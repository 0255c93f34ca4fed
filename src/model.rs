use std::path::Path;

use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    config::DEFAULT_PATCH_SIZE,
    errors::{Result, VesselSegError},
    traits::Predictor,
};

/// ONNX Runtime backed [`Predictor`].
pub struct OnnxPredictor {
    pub image_size: u32,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

fn unavailable(operation: &str) -> impl FnOnce(ort::Error) -> VesselSegError + '_ {
    move |e| VesselSegError::ModelUnavailable {
        reason: format!("{operation}: {e}"),
    }
}

impl OnnxPredictor {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        let mut session = SessionBuilder::new()
            .map_err(unavailable("session builder initialization"))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(unavailable("execution provider registration"))?
            .with_memory_pattern(true)
            .map_err(unavailable("memory pattern"))?
            .commit_from_file(model_path)
            .map_err(|e| VesselSegError::ModelUnavailable {
                reason: format!("loading {}: {e}", model_path.display()),
            })?;

        let (input_name, output_name) = match (session.inputs.first(), session.outputs.first()) {
            (Some(input), Some(output)) => (input.name.clone(), output.name.clone()),
            _ => {
                return Err(VesselSegError::ModelUnavailable {
                    reason: "model has no inputs or outputs".to_string(),
                })
            }
        };

        // NCHW; dynamic axes are reported as -1
        let image_size = session.inputs[0]
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|&dim| dim > 0)
            .map_or(DEFAULT_PATCH_SIZE, |dim| dim as u32);
        debug!(%input_name, %output_name, image_size, "model loaded");

        // initialize model
        let data = Array4::<f32>::zeros((1, 3, image_size as usize, image_size as usize));
        session
            .run(ort::inputs![
                input_name.as_str() => TensorRef::from_array_view(&data)
                    .map_err(unavailable("warm-up tensor creation"))?
            ])
            .map_err(unavailable("warm-up inference"))?;
        info!(path = %model_path.display(), "model ready");

        Ok(Self {
            image_size,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }
}

impl Predictor for OnnxPredictor {
    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let input = tensor.as_standard_layout();
        let mut binding = self.session.lock();
        let outputs = binding.run(
            ort::inputs![self.input_name.as_str() => TensorRef::from_array_view(&input)?],
        )?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }
}
