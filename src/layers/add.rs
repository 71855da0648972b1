use crate::error::ConfigurationError;
use crate::layers::{Layer, Settings, Shape, Upstream};
use crate::matrix::Mat;

/// Sums the outputs of several equally shaped predecessors.
///
/// Every predecessor receives the full delta of this layer.
#[derive(Debug)]
pub struct Add {
    inputs: usize,
    weights: Mat,
    deltas: Mat,
}

impl Add {
    const KIND: &'static str = "Add";

    pub fn new(settings: Settings, upstream: &[Upstream]) -> Result<Self, ConfigurationError> {
        let first = upstream.first().ok_or(ConfigurationError::InputCount {
            kind: Self::KIND,
            expected: "at least 1",
            found: 0,
        })?;
        let shape = settings.shape_or(Self::KIND, first.shape)?;
        let layer = Add {
            inputs: upstream.len(),
            weights: shape.zeros(),
            deltas: shape.zeros(),
        };
        let shapes: Vec<Shape> = upstream.iter().map(|u| u.shape).collect();
        layer.validate(&shapes)?;
        Ok(layer)
    }
}

impl Layer for Add {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn shape(&self) -> Shape {
        self.weights.shape()
    }

    fn validate(&self, inputs: &[Shape]) -> Result<(), ConfigurationError> {
        if inputs.is_empty() || inputs.len() != self.inputs {
            return Err(ConfigurationError::InputCount {
                kind: Self::KIND,
                expected: "one per declared predecessor",
                found: inputs.len(),
            });
        }
        if let Some(&found) = inputs.iter().find(|&&s| s != self.shape()) {
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
        for input in &inputs[1..] {
            self.weights += *input;
        }
    }

    fn compare(&mut self, _: &[&Mat], contributions: &mut [Mat]) {
        for contribution in contributions {
            contribution.copy_from(&self.deltas);
        }
    }
}
