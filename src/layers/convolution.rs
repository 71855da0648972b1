use crate::error::ConfigurationError;
use crate::layers::{single_input, Layer, Settings, Shape, Upstream};
use crate::matrix::{Mat, ZeroOut};

use ndarray::{s, Array2, Zip};
use rand_distr::StandardNormal;

/// A single-filter 2-D convolution with stride 1 and no padding.
///
/// The output of a `w x h` input and a `fw x fh` filter is
/// `(w - fw + 1) x (h - fh + 1)`.
#[derive(Debug)]
pub struct Convolution {
    filter: Array2<f64>,
    bias: f64,
    filter_delta: Array2<f64>,
    bias_delta: f64,
    input_shape: Shape,
    weights: Mat,
    deltas: Mat,
}

impl Convolution {
    const KIND: &'static str = "Convolution";

    /// Creates a convolution with a randomly initialised `filter` sized
    /// kernel.
    pub fn new(settings: Settings, filter: Shape, upstream: Upstream) -> Result<Self, ConfigurationError> {
        let derived = convolved_shape(filter, upstream.shape)?;
        let shape = settings.shape_or(Self::KIND, derived)?;
        Ok(Convolution {
            filter: Mat::random(StandardNormal, filter.width, filter.height).into_inner(),
            bias: 0.0,
            filter_delta: filter.zeros().into_inner(),
            bias_delta: 0.0,
            input_shape: upstream.shape,
            weights: shape.zeros(),
            deltas: shape.zeros(),
        })
    }

    /// Replaces the random kernel.
    pub fn with_filter(mut self, filter: Mat, bias: f64) -> Result<Self, ConfigurationError> {
        let expected = Shape::new(self.filter.ncols(), self.filter.nrows());
        if filter.shape() != expected {
            return Err(ConfigurationError::ShapeMismatch {
                kind: Self::KIND,
                expected,
                found: filter.shape(),
            });
        }
        self.filter = filter.into_inner();
        self.bias = bias;
        Ok(self)
    }
}

pub fn convolution(settings: Settings, filter: Shape, upstream: Upstream) -> Result<Convolution, ConfigurationError> {
    Convolution::new(settings, filter, upstream)
}

fn convolved_shape(filter: Shape, input: Shape) -> Result<Shape, ConfigurationError> {
    if filter.is_empty() {
        return Err(ConfigurationError::ZeroDimension {
            kind: Convolution::KIND,
            dimension: "filter",
        });
    }
    if filter.width > input.width || filter.height > input.height {
        return Err(ConfigurationError::ShapeMismatch {
            kind: Convolution::KIND,
            expected: filter,
            found: input,
        });
    }
    Ok(Shape::new(
        input.width - filter.width + 1,
        input.height - filter.height + 1,
    ))
}

impl Layer for Convolution {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn shape(&self) -> Shape {
        self.weights.shape()
    }

    fn validate(&self, inputs: &[Shape]) -> Result<(), ConfigurationError> {
        let found = single_input(Self::KIND, inputs)?;
        if found != self.input_shape {
            return Err(ConfigurationError::ShapeMismatch {
                kind: Self::KIND,
                expected: self.input_shape,
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
        let filter = &self.filter;
        let bias = self.bias;
        Zip::from(self.weights.view_mut())
            .and(inputs[0].windows(filter.raw_dim()))
            .for_each(|y, window| *y = (&window * filter).sum() + bias);
    }

    fn compare(&mut self, inputs: &[&Mat], contributions: &mut [Mat]) {
        let (fh, fw) = self.filter.dim();
        let filter_delta = &mut self.filter_delta;
        Zip::from(self.deltas.view())
            .and(inputs[0].windows((fh, fw)))
            .for_each(|&delta, window| filter_delta.scaled_add(delta, &window));
        self.bias_delta += self.deltas.sum();

        let contribution = &mut contributions[0];
        for ((oy, ox), &delta) in self.deltas.indexed_iter() {
            contribution
                .slice_mut(s![oy..oy + fh, ox..ox + fw])
                .scaled_add(delta, &self.filter);
        }
    }

    fn adjust_weights(&mut self, rate: f64) {
        self.filter.scaled_add(-rate, &self.filter_delta);
        self.bias -= rate * self.bias_delta;
        self.reset_update();
    }

    fn reset_update(&mut self) {
        self.filter_delta.zero_out();
        self.bias_delta.zero_out();
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
    fn output_shrinks_by_filter() {
        let layer = convolution(Settings::default(), Shape::new(2, 2), upstream(3, 4)).unwrap();
        assert_eq!(layer.shape(), Shape::new(2, 3));
        assert!(convolution(Settings::default(), Shape::new(4, 1), upstream(3, 3)).is_err());
        assert!(convolution(Settings::new(3), Shape::new(2, 2), upstream(3, 3)).is_err());
    }

    #[test]
    fn convolves_and_back_propagates() {
        let mut layer = convolution(Settings::default(), Shape::new(2, 1), upstream(3, 1))
            .unwrap()
            .with_filter(Mat::from_rows(&[[1.0, -1.0]]), 0.5)
            .unwrap();
        let input = Mat::from_rows(&[[3.0, 1.0, 2.0]]);
        layer.predict(&[&input]);
        assert_eq!(layer.weights().to_vec(), vec![2.5, -0.5]);

        layer.deltas_mut().fill(1.0);
        let mut contributions = [Mat::zeros(3, 1)];
        layer.compare(&[&input], &mut contributions);
        assert_eq!(contributions[0].to_vec(), vec![1.0, 0.0, -1.0]);

        // filter gradient is [3 + 1, 1 + 2], bias gradient 2
        layer.adjust_weights(0.5);
        layer.predict(&[&input]);
        // filter [-1, -2.5], bias -0.5
        assert_eq!(layer.weights().to_vec(), vec![-6.0, -6.5]);
    }
}
