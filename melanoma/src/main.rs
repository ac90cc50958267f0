use anyhow::{Context, Result};
use log::info;

use melanoma::{Pipeline, PipelineConfig};

fn main() -> Result<()> {
    env_logger::init();

    let config = PipelineConfig::from_env().context("loading the configuration")?;
    info!("data root at {}", config.paths.root.display());

    let report = Pipeline::new(config).run()?;
    info!(
        epochs = report.history.epochs(),
        predictions = report.predictions;
        "submission written to {}", report.submission.display()
    );

    if let Some(dir) = &report.run_dir {
        info!("run tracked in {}", dir.display());
    }

    Ok(())
}
