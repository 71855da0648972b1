use crate::error::ConfigurationError;
use crate::layers::{single_input, Layer, Settings, Shape, Upstream};
use crate::matrix::Mat;

use ndarray::{Array2, Zip};

/// Max pooling over square, non-overlapping windows.
///
/// Trailing rows and columns that do not fill a whole window are dropped.
#[derive(Debug)]
pub struct Pool {
    filter: usize,
    input_shape: Shape,
    /// Input position of the maximum of every window.
    switches: Array2<(usize, usize)>,
    weights: Mat,
    deltas: Mat,
}

impl Pool {
    const KIND: &'static str = "Pool";

    pub fn new(settings: Settings, filter: usize, upstream: Upstream) -> Result<Self, ConfigurationError> {
        let derived = pooled_shape(filter, upstream.shape)?;
        let shape = settings.shape_or(Self::KIND, derived)?;
        Ok(Pool {
            filter,
            input_shape: upstream.shape,
            switches: Array2::from_elem((shape.height, shape.width), (0, 0)),
            weights: shape.zeros(),
            deltas: shape.zeros(),
        })
    }
}

pub fn pool(settings: Settings, filter: usize, upstream: Upstream) -> Result<Pool, ConfigurationError> {
    Pool::new(settings, filter, upstream)
}

fn pooled_shape(filter: usize, input: Shape) -> Result<Shape, ConfigurationError> {
    if filter == 0 {
        return Err(ConfigurationError::ZeroDimension {
            kind: Pool::KIND,
            dimension: "filter",
        });
    }
    let shape = Shape::new(input.width / filter, input.height / filter);
    if shape.is_empty() {
        return Err(ConfigurationError::ShapeMismatch {
            kind: Pool::KIND,
            expected: Shape::new(filter, filter),
            found: input,
        });
    }
    Ok(shape)
}

impl Layer for Pool {
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
        let filter = self.filter;
        Zip::indexed(self.weights.view_mut())
            .and(&mut self.switches)
            .and(inputs[0].exact_chunks((filter, filter)))
            .for_each(|(oy, ox), y, switch, window| {
                let mut best = ((0, 0), window[(0, 0)]);
                for (at, &value) in window.indexed_iter() {
                    if value > best.1 {
                        best = (at, value);
                    }
                }
                let ((wy, wx), value) = best;
                *switch = (oy * filter + wy, ox * filter + wx);
                *y = value;
            });
    }

    fn compare(&mut self, _: &[&Mat], contributions: &mut [Mat]) {
        let contribution = &mut contributions[0];
        Zip::from(&self.switches)
            .and(self.deltas.view())
            .for_each(|&at, &delta| contribution[at] += delta);
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
    fn halves_each_dimension() {
        let layer = pool(Settings::default(), 2, upstream(4, 5)).unwrap();
        assert_eq!(layer.shape(), Shape::new(2, 2));
        assert!(pool(Settings::default(), 2, upstream(1, 4)).is_err());
        assert!(pool(Settings::default(), 0, upstream(4, 4)).is_err());
    }

    #[test]
    fn routes_deltas_to_window_maximum() {
        let mut layer = pool(Settings::default(), 2, upstream(4, 2)).unwrap();
        let input = Mat::from_rows(&[[1.0, 5.0, 0.0, -1.0], [2.0, 3.0, -2.0, -3.0]]);
        layer.predict(&[&input]);
        assert_eq!(layer.weights().to_vec(), vec![5.0, 0.0]);

        layer.deltas_mut().copy_from(&Mat::from_rows(&[[0.5, 2.0]]));
        let mut contributions = [Mat::zeros(4, 2)];
        layer.compare(&[&input], &mut contributions);
        assert_eq!(
            contributions[0].to_rows(),
            vec![vec![0.0, 0.5, 2.0, 0.0], vec![0.0; 4]]
        );
    }
}
