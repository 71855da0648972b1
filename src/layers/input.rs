use crate::error::{ConfigurationError, PropagationError};
use crate::layers::{Layer, Settings, Shape};
use crate::matrix::Mat;

/// Entry point of a network, holding the externally provided input.
#[derive(Debug)]
pub struct Input {
    input: Mat,
    weights: Mat,
    deltas: Mat,
}

impl Input {
    const KIND: &'static str = "Input";

    pub fn new(settings: Settings) -> Result<Self, ConfigurationError> {
        let shape = settings.shape(Self::KIND)?;
        Ok(Input {
            input: shape.zeros(),
            weights: shape.zeros(),
            deltas: shape.zeros(),
        })
    }
}

/// Factory shorthand for [`Input::new`].
pub fn input(settings: Settings) -> Result<Input, ConfigurationError> {
    Input::new(settings)
}

impl Layer for Input {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn shape(&self) -> Shape {
        self.weights.shape()
    }

    fn validate(&self, inputs: &[Shape]) -> Result<(), ConfigurationError> {
        if !inputs.is_empty() {
            return Err(ConfigurationError::InputCount {
                kind: Self::KIND,
                expected: "0",
                found: inputs.len(),
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

    fn feed(&mut self, input: &Mat) -> Result<(), PropagationError> {
        if input.shape() != self.shape() {
            return Err(PropagationError::ShapeMismatch {
                what: "input",
                expected: self.shape(),
                found: input.shape(),
            });
        }
        self.input.copy_from(input);
        Ok(())
    }

    fn predict(&mut self, _: &[&Mat]) {
        self.weights.copy_from(&self.input);
    }

    // Nothing lies upstream of the input.
    fn compare(&mut self, _: &[&Mat], _: &mut [Mat]) {}

    fn accepts_input(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_copies_fed_input() {
        let mut layer = Input::new(Settings::new(2)).unwrap();
        layer.feed(&Mat::from_rows(&[[0.25, 0.75]])).unwrap();
        assert!(!layer.weights().any_nonzero());
        layer.predict(&[]);
        assert_eq!(layer.weights().to_vec(), vec![0.25, 0.75]);
    }

    #[test]
    fn feed_rejects_wrong_shape() {
        let mut layer = Input::new(Settings::new(2)).unwrap();
        let err = layer.feed(&Mat::zeros(3, 1)).unwrap_err();
        assert_eq!(
            err,
            PropagationError::ShapeMismatch {
                what: "input",
                expected: Shape::new(2, 1),
                found: Shape::new(3, 1),
            }
        );
    }
}
