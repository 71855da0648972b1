//! Error types.

use crate::layers::{LayerId, Shape};

use thiserror::Error;

/// Raised while a network is being built, before any propagation happens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("{kind} layer requires a width")]
    MissingWidth { kind: &'static str },
    #[error("{kind} layer has a zero {dimension}")]
    ZeroDimension {
        kind: &'static str,
        dimension: &'static str,
    },
    #[error("{kind} layer expects {expected} input(s) but {found} were given")]
    InputCount {
        kind: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("{kind} layer has shape {found}, expected {expected}")]
    ShapeMismatch {
        kind: &'static str,
        expected: Shape,
        found: Shape,
    },
    #[error("layer {0} does not exist yet")]
    UnknownLayer(LayerId),
    #[error("{kind} layer cannot be used as the input of a network")]
    NotAnInput { kind: &'static str },
    #[error("{kind} layer cannot be used as the output of a network")]
    NotATerminal { kind: &'static str },
    #[error("{kind} layer declares shape {declared} but its {buffer} is {found}")]
    BrokenContract {
        kind: &'static str,
        buffer: &'static str,
        declared: Shape,
        found: Shape,
    },
    #[error("a graph needs at least an input and an output layer")]
    EmptyGraph,
}

/// Raised when the propagation engine is driven incorrectly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropagationError {
    #[error("network has not been initialized")]
    Uninitialized,
    #[error("{what} has shape {found}, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: Shape,
        found: Shape,
    },
    #[error("{kind} layer does not accept external input")]
    NotAnInput { kind: &'static str },
    #[error("{kind} layer cannot be compared against a target")]
    NotATerminal { kind: &'static str },
}

/// Raised when training is started with unusable parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    #[error("no training examples were provided")]
    NoExamples,
    #[error("example {index} has {found} {what} values, expected {expected}")]
    ExampleSize {
        index: usize,
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("batch size {batch_size} is invalid for {examples} examples")]
    BatchSize { batch_size: usize, examples: usize },
}

/// Any error produced by this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Propagation(#[from] PropagationError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error("invalid topology: {0}")]
    Topology(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
