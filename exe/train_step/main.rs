use std::error::Error;

use clap::Parser;
use trainstep::{utils, validate_arguments, TrainArgs, TrainStep};

fn main() -> Result<(), Box<dyn Error>> {
  utils::init_logging()?;
  let args = TrainArgs::parse();

  if let Err(err) = validate_arguments(&args) {
    tracing::error!("{}", err);
    return Err(err.into());
  }

  let config = match args.resolve() {
    Ok(config) => config,
    Err(err) => {
      tracing::error!("{}", err);
      return Err(err.into());
    }
  };

  match TrainStep::from_config(config).run() {
    Ok(outcome) => {
      tracing::info!(
        "accuracy {:.4}, model saved to {}",
        outcome.evaluation.accuracy,
        outcome.model_path
      );
      Ok(())
    }
    Err(err) => {
      tracing::error!("{}", err);
      Err(err.into())
    }
  }
}
