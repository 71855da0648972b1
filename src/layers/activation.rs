use crate::activator::Activator;
use crate::error::ConfigurationError;
use crate::layers::{single_input, Layer, Settings, Shape, Upstream};
use crate::matrix::Mat;

use ndarray::Zip;

/// An elementwise activation layer; its shape always matches its input.
#[derive(Debug)]
pub struct Activation {
    activator: Activator,
    weights: Mat,
    deltas: Mat,
}

impl Activation {
    pub fn new(activator: Activator, settings: Settings, upstream: Upstream) -> Result<Self, ConfigurationError> {
        let shape = settings.shape_or(activator.name(), upstream.shape)?;
        Ok(Activation {
            activator,
            weights: shape.zeros(),
            deltas: shape.zeros(),
        })
    }
}

pub fn relu(settings: Settings, upstream: Upstream) -> Result<Activation, ConfigurationError> {
    Activation::new(Activator::ReLU, settings, upstream)
}

pub fn leaky_relu(alpha: f64, settings: Settings, upstream: Upstream) -> Result<Activation, ConfigurationError> {
    Activation::new(Activator::LeakyReLU(alpha), settings, upstream)
}

pub fn sigmoid(settings: Settings, upstream: Upstream) -> Result<Activation, ConfigurationError> {
    Activation::new(Activator::Sigmoid, settings, upstream)
}

pub fn tanh(settings: Settings, upstream: Upstream) -> Result<Activation, ConfigurationError> {
    Activation::new(Activator::TanH, settings, upstream)
}

impl Layer for Activation {
    fn kind(&self) -> &'static str {
        self.activator.name()
    }

    fn shape(&self) -> Shape {
        self.weights.shape()
    }

    fn validate(&self, inputs: &[Shape]) -> Result<(), ConfigurationError> {
        let found = single_input(self.kind(), inputs)?;
        if found != self.shape() {
            return Err(ConfigurationError::ShapeMismatch {
                kind: self.kind(),
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
        self.activator.activate(self.weights.view_mut());
    }

    fn compare(&mut self, _: &[&Mat], contributions: &mut [Mat]) {
        self.activator.derive(
            self.weights.view(),
            self.deltas.view(),
            contributions[0].view_mut(),
        );
    }
}

/// Normalizes the whole grid into a probability distribution.
#[derive(Debug)]
pub struct SoftMax {
    weights: Mat,
    deltas: Mat,
}

impl SoftMax {
    const KIND: &'static str = "SoftMax";

    pub fn new(settings: Settings, upstream: Upstream) -> Result<Self, ConfigurationError> {
        let shape = settings.shape_or(Self::KIND, upstream.shape)?;
        Ok(SoftMax {
            weights: shape.zeros(),
            deltas: shape.zeros(),
        })
    }
}

pub fn soft_max(settings: Settings, upstream: Upstream) -> Result<SoftMax, ConfigurationError> {
    SoftMax::new(settings, upstream)
}

impl Layer for SoftMax {
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
        let max = inputs[0].fold(f64::NEG_INFINITY, |max, &x| max.max(x));
        self.weights.assign(&inputs[0].mapv(|x| (x - max).exp()));
        let sum = self.weights.sum();
        self.weights.mapv_inplace(|y| y / sum);
    }

    fn compare(&mut self, _: &[&Mat], contributions: &mut [Mat]) {
        let weighted = (&*self.weights * &*self.deltas).sum();
        Zip::from(contributions[0].view_mut())
            .and(self.weights.view())
            .and(self.deltas.view())
            .for_each(|c, &y, &d| *c = y * (d - weighted));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerId;

    fn upstream(width: usize, height: usize) -> Upstream {
        Upstream {
            id: LayerId(0),
            shape: Shape::new(width, height),
        }
    }

    #[test]
    fn inherits_upstream_shape() {
        let layer = relu(Settings::default(), upstream(3, 2)).unwrap();
        assert_eq!(layer.shape(), Shape::new(3, 2));
        assert_eq!(layer.kind(), "Relu");
    }

    #[test]
    fn rejects_reshaping() {
        assert!(sigmoid(Settings::new(4), upstream(3, 1)).is_err());
    }

    #[test]
    fn relu_gates_gradient() {
        let mut layer = relu(Settings::default(), upstream(2, 1)).unwrap();
        let input = Mat::from_rows(&[[-1.0, 2.0]]);
        layer.predict(&[&input]);
        assert_eq!(layer.weights().to_vec(), vec![0.0, 2.0]);
        layer.deltas_mut().fill(1.0);
        let mut contributions = [Mat::zeros(2, 1)];
        layer.compare(&[&input], &mut contributions);
        assert_eq!(contributions[0].to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn soft_max_sums_to_one() {
        let mut layer = soft_max(Settings::default(), upstream(2, 2)).unwrap();
        let input = Mat::from_rows(&[[1.0, 2.0], [3.0, 4.0]]);
        layer.predict(&[&input]);
        let total = layer.weights().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(layer.weights()[(1, 1)] > layer.weights()[(0, 0)]);
    }

    #[test]
    fn soft_max_gradient_of_uniform_delta_is_zero() {
        let mut layer = soft_max(Settings::default(), upstream(3, 1)).unwrap();
        let input = Mat::from_rows(&[[0.1, 0.2, 0.3]]);
        layer.predict(&[&input]);
        layer.deltas_mut().fill(1.0);
        let mut contributions = [Mat::zeros(3, 1)];
        layer.compare(&[&input], &mut contributions);
        assert!(contributions[0].iter().all(|c| c.abs() < 1e-12));
    }
}
