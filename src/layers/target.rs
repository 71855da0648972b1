use crate::error::{ConfigurationError, PropagationError};
use crate::layers::{single_input, Layer, Settings, Shape, Upstream};
use crate::matrix::Mat;

use ndarray::Zip;

/// A terminal layer that passes its input through unchanged.
///
/// Comparing against a target seeds `deltas = output - target`, which is then
/// handed to the predecessor as is.
#[derive(Debug)]
pub struct Target {
    weights: Mat,
    deltas: Mat,
}

impl Target {
    const KIND: &'static str = "Target";

    pub fn new(settings: Settings, upstream: Upstream) -> Result<Self, ConfigurationError> {
        let shape = settings.shape_or(Self::KIND, upstream.shape)?;
        Ok(Target {
            weights: shape.zeros(),
            deltas: shape.zeros(),
        })
    }
}

pub fn target(settings: Settings, upstream: Upstream) -> Result<Target, ConfigurationError> {
    Target::new(settings, upstream)
}

impl Layer for Target {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn shape(&self) -> Shape {
        self.weights.shape()
    }

    fn validate(&self, inputs: &[Shape]) -> Result<(), ConfigurationError> {
        let found = single_input(Self::KIND, inputs)?;
        if found != self.shape() {
            return Err(ConfigurationError::ShapeMismatch {
                kind: Self::KIND,
                expected: self.shape(),
                found,
            });
        }
        Ok(())
    }

    fn weights(&self) -> &Mat {
        &self.weights
    }

    fn weights_mut(&mut self) -> &mut Mat {
        &mut self.weights
    }

    fn deltas(&self) -> &Mat {
        &self.deltas
    }

    fn deltas_mut(&mut self) -> &mut Mat {
        &mut self.deltas
    }

    fn predict(&mut self, inputs: &[&Mat]) {
        self.weights.copy_from(inputs[0]);
    }

    fn compare(&mut self, _: &[&Mat], contributions: &mut [Mat]) {
        contributions[0].copy_from(&self.deltas);
    }

    fn compare_target(
        &mut self,
        target: &Mat,
        inputs: &[&Mat],
        contributions: &mut [Mat],
    ) -> Result<(), PropagationError> {
        if target.shape() != self.shape() {
            return Err(PropagationError::ShapeMismatch {
                what: "target",
                expected: self.shape(),
                found: target.shape(),
            });
        }
        Zip::from(self.deltas.view_mut())
            .and(self.weights.view())
            .and(target.view())
            .for_each(|d, &y, &t| *d = y - t);
        self.compare(inputs, contributions);
        Ok(())
    }

    fn is_terminal(&self) -> bool {
        true
    }
}
