//! Utilities for training neural networks.

use crate::error::{Result, TrainingError};

use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, trace};

/// Makes a model trainable using gradient descent.
pub trait Trainable {
    /// Gets the model ready for training, building it if necessary.
    fn prepare(&mut self) -> Result<()>;

    /// Number of values in one input example.
    fn input_len(&self) -> usize;

    /// Number of values in one expected output.
    fn output_len(&self) -> usize;

    /// Using the provided training example, accumulate model updates.
    /// Returns the prediction error under `metric`, measured before the
    /// update.
    fn compute_update(&mut self, example: &[f64], expected: &[f64], metric: ErrorMetric) -> Result<f64>;

    /// Applies and resets the accumulated updates, scaling by the gradient
    /// descent `rate`.
    fn apply_update(&mut self, rate: f64);
}

/// Progress of a training run.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct TrainingStatus {
    /// Completed iterations over the whole example set.
    pub iterations: usize,
    /// Mean example error of the last iteration; NaN before the first one.
    pub error: f64,
}

/// Options of a training run.
///
/// The defaults are:
///
/// * At most 1000 iterations.
/// * Stop once the error reaches 0.005.
/// * A learning rate of 0.3.
/// * A stochastic learning mode.
/// * Mean squared error.
/// * A callback period of 10 iterations.
/// * Logs on training completion.
/// * No timeout.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingOptions {
    pub iterations: usize,
    pub error_threshold: f64,
    pub learning_rate: f64,
    pub learning_mode: LearningMode,
    pub error_metric: ErrorMetric,
    pub callback_period: usize,
    pub logging: Logging,
    pub timeout: Option<Duration>,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        TrainingOptions {
            iterations: 1000,
            error_threshold: 0.005,
            learning_rate: 0.3,
            learning_mode: LearningMode::Stochastic,
            error_metric: ErrorMetric::MeanSquared,
            callback_period: 10,
            logging: Logging::Completion,
            timeout: None,
        }
    }
}

/// A builder for training models.
pub struct Trainer<'a, T: Trainable> {
    model: &'a mut T,
    options: TrainingOptions,
    callback: Option<Box<dyn FnMut(&TrainingStatus) + 'a>>,
}

impl<'a, T: Trainable> Trainer<'a, T> {
    /// Creates a new Trainer instance using the default
    /// [`TrainingOptions`].
    pub fn new(model: &'a mut T) -> Self {
        Trainer {
            model,
            options: TrainingOptions::default(),
            callback: None,
        }
    }

    /// Replaces all options at once.
    pub fn options(mut self, options: TrainingOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the maximum number of iterations.
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.options.iterations = iterations;
        self
    }

    /// Sets the error at or below which training stops.
    pub fn error_threshold(mut self, threshold: f64) -> Self {
        self.options.error_threshold = threshold;
        self
    }

    /// Sets the learning rate to use during gradient descent.
    pub fn learning_rate(mut self, rate: f64) -> Self {
        self.options.learning_rate = rate;
        self
    }

    /// Sets the `LearningMode` to use for training.
    pub fn learning_mode(mut self, mode: LearningMode) -> Self {
        self.options.learning_mode = mode;
        self
    }

    /// Sets the function measuring the error of a single example.
    pub fn error_metric(mut self, metric: ErrorMetric) -> Self {
        self.options.error_metric = metric;
        self
    }

    /// Sets the type of logging to be emitted during training.
    pub fn logging(mut self, logging: Logging) -> Self {
        self.options.logging = logging;
        self
    }

    /// Stops training once `timeout` has elapsed.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Sets how many iterations pass between callback invocations.
    pub fn callback_period(mut self, period: usize) -> Self {
        self.options.callback_period = period;
        self
    }

    /// Sets an observer invoked with the training status every
    /// `callback_period` iterations.
    pub fn callback<C>(mut self, callback: C) -> Self
    where
        C: FnMut(&TrainingStatus) + 'a,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Trains the model using the provided labelled data.
    ///
    /// The provided `examples` should be a list of labelled data, where each
    /// element takes the form `(network input, expected output)`.
    ///
    /// Returns the status after the last iteration. Running out of
    /// iterations is not an error.
    pub fn train<I, O>(mut self, examples: &[(I, O)]) -> Result<TrainingStatus>
    where
        I: AsRef<[f64]>,
        O: AsRef<[f64]>,
    {
        self.model.prepare()?;
        self.validate(examples)?;

        let start_time = Instant::now();
        let batch_size = match self.options.learning_mode {
            LearningMode::Stochastic => 1,
            LearningMode::Batch(size) => size,
        };
        let mut status = TrainingStatus {
            iterations: 0,
            error: f64::NAN,
        };
        while status.iterations < self.options.iterations {
            let mut training_error = 0.0;
            for (i, (example, expected)) in examples.iter().enumerate() {
                training_error += self.model.compute_update(
                    example.as_ref(),
                    expected.as_ref(),
                    self.options.error_metric,
                )?;
                if (i + 1) % batch_size == 0 || i + 1 == examples.len() {
                    self.model.apply_update(self.options.learning_rate);
                }
            }
            status.error = training_error / examples.len() as f64;
            status.iterations += 1;

            self.options.logging.iteration(&status);
            self.notify(&status);
            if self.should_stop(&status, start_time) {
                break;
            }
        }
        self.options.logging.completion(&status, start_time);
        Ok(status)
    }

    fn notify(&mut self, status: &TrainingStatus) {
        let period = self.options.callback_period;
        if let Some(callback) = self.callback.as_mut() {
            if period > 0 && status.iterations % period == 0 {
                callback(status);
            }
        }
    }

    /// Returns true if training is complete.
    fn should_stop(&self, status: &TrainingStatus, start_time: Instant) -> bool {
        if status.error <= self.options.error_threshold {
            return true;
        }
        match self.options.timeout {
            Some(timeout) => start_time.elapsed() >= timeout,
            None => false,
        }
    }

    /// Verifies that the examples fit the model, returning an error if
    /// something is wrong.
    fn validate<I, O>(&self, examples: &[(I, O)]) -> Result<(), TrainingError>
    where
        I: AsRef<[f64]>,
        O: AsRef<[f64]>,
    {
        if examples.is_empty() {
            return Err(TrainingError::NoExamples);
        }
        if let LearningMode::Batch(batch_size) = self.options.learning_mode {
            if batch_size == 0 || batch_size > examples.len() {
                return Err(TrainingError::BatchSize {
                    batch_size,
                    examples: examples.len(),
                });
            }
        }
        for (index, (input, output)) in examples.iter().enumerate() {
            check_len(index, "input", self.model.input_len(), input.as_ref())?;
            check_len(index, "output", self.model.output_len(), output.as_ref())?;
        }
        Ok(())
    }
}

impl<'a, T: Trainable + fmt::Debug> fmt::Debug for Trainer<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Trainer")
            .field("model", &self.model)
            .field("options", &self.options)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

fn check_len(index: usize, what: &'static str, expected: usize, values: &[f64]) -> Result<(), TrainingError> {
    if values.len() != expected {
        return Err(TrainingError::ExampleSize {
            index,
            what,
            expected,
            found: values.len(),
        });
    }
    Ok(())
}

/// The learning mode to use for training
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LearningMode {
    /// Apply weight updates after every training example
    Stochastic,
    /// Apply weights updates in batches of the provided size
    ///
    /// Must not exceed the total number of training instances.
    Batch(usize),
}

/// Measures how far a prediction is from the expected output.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ErrorMetric {
    MeanSquared,
    RootMeanSquared,
    MeanAbsolute,
}

impl ErrorMetric {
    /// Computes the error between `actual` and `expected`.
    pub fn compute(&self, actual: &[f64], expected: &[f64]) -> f64 {
        assert_eq!(actual.len(), expected.len());
        let n = actual.len() as f64;
        let diffs = actual.iter().zip(expected).map(|(a, e)| a - e);
        match self {
            ErrorMetric::MeanSquared => diffs.map(|d| d * d).sum::<f64>() / n,
            ErrorMetric::RootMeanSquared => (diffs.map(|d| d * d).sum::<f64>() / n).sqrt(),
            ErrorMetric::MeanAbsolute => diffs.map(f64::abs).sum::<f64>() / n,
        }
    }
}

/// Logging frequency to use during training
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Logging {
    /// No logs will be emitted
    Silent,
    /// A summary will be logged at completion
    Completion,
    /// A summary will be logged after every `n` training iterations
    Iterations(usize),
}

impl Logging {
    /// Performs logging at the current iteration of training.
    fn iteration(&self, status: &TrainingStatus) {
        match *self {
            Logging::Iterations(freq) if freq > 0 && status.iterations % freq == 0 => {
                info!(iteration = status.iterations, error = status.error, "training");
            }
            _ => trace!(iteration = status.iterations, error = status.error, "training"),
        }
    }

    /// Performs logging at the end of training.
    fn completion(&self, status: &TrainingStatus, start_time: Instant) {
        if let Logging::Silent = self {
            return;
        }
        info!(
            iterations = status.iterations,
            error = status.error,
            elapsed = ?start_time.elapsed(),
            "training completed"
        );
    }
}
