use anyhow::{ensure, Context, Result};
use clap::Parser;

use vessel_seg_rs::{init_tracing, Config, ImageProcessor, OnnxPredictor};

fn main() -> Result<()> {
    init_tracing();
    let config = Config::parse();

    ensure!(
        config.model_path.exists(),
        "Model path does not exist: {}",
        config.model_path.display()
    );
    ensure!(
        config.input_dir.exists(),
        "Input directory does not exist: {}",
        config.input_dir.display()
    );
    config
        .segmentation()
        .validate()
        .context("Invalid segmentation settings")?;

    let model = OnnxPredictor::new(&config.model_path, config.device_id)
        .with_context(|| format!("Failed to load model: {}", config.model_path.display()))?;
    let processor = ImageProcessor::new(model, config)
        .context("Failed to set up the pipeline")?;

    let summary = processor.process_directory()?;
    ensure!(
        summary.failed == 0,
        "{} of {} images failed",
        summary.failed,
        summary.failed + summary.processed
    );

    Ok(())
}
