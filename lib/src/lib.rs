pub mod args;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod persistence;
pub mod report;
pub mod step;
pub mod storage;
pub mod utils;

pub use args::{parse_arguments, validate_arguments, TrainArgs};
pub use config::{FileConfig, TrainConfig};
pub use data::load_data;
pub use error::{Error, Result};
pub use model::{create_model, ModelInspect};
pub use persistence::{contains_saved_model, load_model, save_model, LoadedModel};
pub use report::create_visualization;
pub use step::{StepOutcome, TrainStep};
