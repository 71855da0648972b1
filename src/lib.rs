#[macro_use]
extern crate serde_derive;

pub mod activator;
pub mod error;
pub mod feed_forward;
pub mod graph;
pub mod layers;
pub mod matrix;
pub mod topology;
pub mod trainer;

pub use crate::error::{ConfigurationError, Error, PropagationError, Result, TrainingError};
pub use crate::feed_forward::{factory, Network};
pub use crate::graph::Graph;
pub use crate::matrix::Mat;
pub use crate::trainer::{Trainer, TrainingOptions, TrainingStatus};
