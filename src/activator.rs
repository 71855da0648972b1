//! Elementwise activation functions.

use ndarray::{ArrayView, ArrayViewMut, Dimension, Zip};

/// [Activation function](https://en.wikipedia.org/wiki/Activation_function)
/// types shared by the dense layers and the standalone activation layers.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Activator {
    /// Passes values through unchanged
    Identity,
    /// Rectified Linear Unit
    ReLU,
    /// Leaky Rectified Linear Unit
    ///
    /// Takes an `alpha` value to use for negative inputs.
    LeakyReLU(f64),
    /// Sigmoid function
    Sigmoid,
    /// Hyperbolic tan function
    TanH,
}

impl Activator {
    /// Evaluates `f(x)` for the selected the activation function.
    pub fn f(&self, x: f64) -> f64 {
        match *self {
            Activator::Identity => x,
            Activator::ReLU => x.max(0.0),
            Activator::LeakyReLU(alpha) => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activator::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activator::TanH => x.tanh(),
        }
    }

    /// Evaluates the derivative `f'(x)`, where `x = f^{-1}(y)`.
    ///
    /// This takes the *output* of the activation function, so layers only
    /// have to keep their activated values around for the backward pass.
    pub fn fprime(&self, y: f64) -> f64 {
        match *self {
            Activator::Identity => 1.0,
            Activator::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activator::LeakyReLU(alpha) => {
                if y > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            Activator::Sigmoid => y * (1.0 - y),
            Activator::TanH => 1.0 - y * y,
        }
    }

    /// Activates every value of `values` in place.
    pub fn activate<D: Dimension>(&self, mut values: ArrayViewMut<f64, D>) {
        values.mapv_inplace(|x| self.f(x));
    }

    /// Writes `errors * f'(outputs)` into `derivative`.
    ///
    /// Panics if the three arrays differ in shape.
    pub fn derive<D: Dimension>(
        &self,
        outputs: ArrayView<f64, D>,
        errors: ArrayView<f64, D>,
        derivative: ArrayViewMut<f64, D>,
    ) {
        Zip::from(derivative)
            .and(outputs)
            .and(errors)
            .for_each(|d, &y, &e| *d = e * self.fprime(y));
    }

    /// Name used when this activator backs a standalone layer.
    pub fn name(&self) -> &'static str {
        match self {
            Activator::Identity => "Identity",
            Activator::ReLU => "Relu",
            Activator::LeakyReLU(_) => "LeakyRelu",
            Activator::Sigmoid => "Sigmoid",
            Activator::TanH => "TanH",
        }
    }
}
