use crate::error::ConfigurationError;
use crate::layers::{Layer, Settings, Shape};
use crate::matrix::Mat;

/// A constant node holding zero-filled buffers.
///
/// Both passes are no-ops, which makes it usable as a placeholder anywhere
/// in a graph.
#[derive(Debug)]
pub struct Zeros {
    weights: Mat,
    deltas: Mat,
}

impl Zeros {
    const KIND: &'static str = "Zeros";

    pub fn new(settings: Settings) -> Result<Self, ConfigurationError> {
        let shape = settings.shape(Self::KIND)?;
        Ok(Zeros {
            weights: shape.zeros(),
            deltas: shape.zeros(),
        })
    }
}

pub fn zeros(settings: Settings) -> Result<Zeros, ConfigurationError> {
    Zeros::new(settings)
}

impl Layer for Zeros {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn shape(&self) -> Shape {
        self.weights.shape()
    }

    fn validate(&self, _: &[Shape]) -> Result<(), ConfigurationError> {
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

    fn predict(&mut self, _: &[&Mat]) {}

    fn compare(&mut self, _: &[&Mat], _: &mut [Mat]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_stay_zero() {
        let mut layer = Zeros::new(Settings::new(2).height(3)).unwrap();
        assert_eq!(layer.shape(), Shape::new(2, 3));
        let upstream = Mat::from_rows(&[[1.0, 1.0]]);
        layer.predict(&[&upstream]);
        let mut contributions = [Mat::zeros(2, 1)];
        layer.compare(&[&upstream], &mut contributions);
        assert!(!layer.weights().any_nonzero());
        assert!(!layer.deltas().any_nonzero());
        assert!(!contributions[0].any_nonzero());
    }
}
