use crate::activator::Activator;
use crate::error::{ConfigurationError, PropagationError};
use crate::layers::{single_input, Layer, Settings, Shape, Upstream};
use crate::matrix::{add_outer, Mat, ZeroOut};

use ndarray::{Array1, Array2, Zip};
use rand_distr::StandardNormal;

/// Fully connected transform shared by `FeedForward` and `Output`.
///
/// The predecessor's grid is flattened row by row, so any input shape can
/// feed any output shape.
#[derive(Debug)]
struct Dense {
    /// The activation function to be used for every neuron in the layer.
    activator: Activator,
    /// The network weights, with each neuron's weights stored as a row.
    kernel: Array2<f64>,
    bias: Array1<f64>,
    update: Update,
}

/// Parameter gradients accumulated until the next weight adjustment.
#[derive(Debug)]
struct Update {
    kernel_delta: Array2<f64>,
    bias_delta: Array1<f64>,
}

impl Update {
    fn reset(&mut self) {
        self.kernel_delta.zero_out();
        self.bias_delta.zero_out();
    }
}

impl Dense {
    fn random(activator: Activator, inputs: usize, outputs: usize) -> Self {
        Dense::from_parameters(
            activator,
            Mat::random(StandardNormal, inputs, outputs).into_inner(),
            Mat::random(StandardNormal, outputs, 1).flatten(),
        )
    }

    fn from_parameters(activator: Activator, kernel: Array2<f64>, bias: Array1<f64>) -> Self {
        let update = Update {
            kernel_delta: Array2::zeros(kernel.raw_dim()),
            bias_delta: Array1::zeros(bias.len()),
        };
        Dense {
            activator,
            kernel,
            bias,
            update,
        }
    }

    fn input_len(&self) -> usize {
        self.kernel.ncols()
    }

    fn forward(&self, inputs: &Mat, outputs: &mut Mat) {
        let mut activations = self.kernel.dot(&inputs.flatten()) + &self.bias;
        self.activator.activate(activations.view_mut());
        outputs.assign_flat(&activations);
    }

    fn backward(&mut self, inputs: &Mat, outputs: &Mat, output_errors: &Mat, input_errors: &mut Mat) {
        let mut derivative = Array1::zeros(self.bias.len());
        self.activator.derive(
            outputs.flatten().view(),
            output_errors.flatten().view(),
            derivative.view_mut(),
        );
        input_errors.assign_flat(&self.kernel.t().dot(&derivative));
        add_outer(&mut self.update.kernel_delta, 1.0, &derivative, &inputs.flatten());
        self.update.bias_delta += &derivative;
    }

    fn apply_update(&mut self, rate: f64) {
        self.kernel.scaled_add(-rate, &self.update.kernel_delta);
        self.bias.scaled_add(-rate, &self.update.bias_delta);
        self.update.reset();
    }
}

/// Checks hand-picked parameters against the sizes a dense layer needs.
fn check_parameters(
    kind: &'static str,
    inputs: usize,
    outputs: usize,
    kernel: &Mat,
    bias: &[f64],
) -> Result<(), ConfigurationError> {
    let expected = Shape::new(inputs, outputs);
    if kernel.shape() != expected {
        return Err(ConfigurationError::ShapeMismatch {
            kind,
            expected,
            found: kernel.shape(),
        });
    }
    if bias.len() != outputs {
        return Err(ConfigurationError::ShapeMismatch {
            kind,
            expected: Shape::new(outputs, 1),
            found: Shape::new(bias.len(), 1),
        });
    }
    Ok(())
}

fn check_input(kind: &'static str, expected: Shape, inputs: &[Shape]) -> Result<(), ConfigurationError> {
    let found = single_input(kind, inputs)?;
    if found != expected {
        return Err(ConfigurationError::ShapeMismatch { kind, expected, found });
    }
    Ok(())
}

/// A hidden, fully connected layer.
///
/// Defaults to a sigmoid activation and weights drawn from `N(0, 1)`.
#[derive(Debug)]
pub struct FeedForward {
    dense: Dense,
    input_shape: Shape,
    weights: Mat,
    deltas: Mat,
}

impl FeedForward {
    const KIND: &'static str = "FeedForward";

    pub fn new(settings: Settings, upstream: Upstream) -> Result<Self, ConfigurationError> {
        let shape = settings.shape(Self::KIND)?;
        Ok(FeedForward {
            dense: Dense::random(Activator::Sigmoid, upstream.shape.len(), shape.len()),
            input_shape: upstream.shape,
            weights: shape.zeros(),
            deltas: shape.zeros(),
        })
    }

    /// Sets the activation function used by every neuron.
    pub fn activator(mut self, activator: Activator) -> Self {
        self.dense.activator = activator;
        self
    }

    /// Replaces the random initial parameters.
    ///
    /// `kernel` holds one row of `input_len` weights per output value.
    pub fn with_parameters(mut self, kernel: Mat, bias: Vec<f64>) -> Result<Self, ConfigurationError> {
        check_parameters(Self::KIND, self.input_shape.len(), self.weights.len(), &kernel, &bias)?;
        self.dense = Dense::from_parameters(self.dense.activator, kernel.into_inner(), Array1::from(bias));
        Ok(self)
    }
}

/// Factory shorthand for [`FeedForward::new`].
pub fn feed_forward(settings: Settings, upstream: Upstream) -> Result<FeedForward, ConfigurationError> {
    FeedForward::new(settings, upstream)
}

impl Layer for FeedForward {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn shape(&self) -> Shape {
        self.weights.shape()
    }

    fn validate(&self, inputs: &[Shape]) -> Result<(), ConfigurationError> {
        check_input(Self::KIND, self.input_shape, inputs)
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
        debug_assert_eq!(self.dense.input_len(), inputs[0].len());
        self.dense.forward(inputs[0], &mut self.weights);
    }

    fn compare(&mut self, inputs: &[&Mat], contributions: &mut [Mat]) {
        self.dense
            .backward(inputs[0], &self.weights, &self.deltas, &mut contributions[0]);
    }

    fn adjust_weights(&mut self, rate: f64) {
        self.dense.apply_update(rate);
    }

    fn reset_update(&mut self) {
        self.dense.update.reset();
    }
}

/// The terminal layer of a classifier: a sigmoid dense layer whose deltas
/// are seeded with `output - target`.
#[derive(Debug)]
pub struct Output {
    dense: Dense,
    input_shape: Shape,
    weights: Mat,
    deltas: Mat,
}

impl Output {
    const KIND: &'static str = "Output";

    pub fn new(settings: Settings, upstream: Upstream) -> Result<Self, ConfigurationError> {
        let shape = settings.shape(Self::KIND)?;
        Ok(Output {
            dense: Dense::random(Activator::Sigmoid, upstream.shape.len(), shape.len()),
            input_shape: upstream.shape,
            weights: shape.zeros(),
            deltas: shape.zeros(),
        })
    }

    /// Replaces the random initial parameters, see
    /// [`FeedForward::with_parameters`].
    pub fn with_parameters(mut self, kernel: Mat, bias: Vec<f64>) -> Result<Self, ConfigurationError> {
        check_parameters(Self::KIND, self.input_shape.len(), self.weights.len(), &kernel, &bias)?;
        self.dense = Dense::from_parameters(self.dense.activator, kernel.into_inner(), Array1::from(bias));
        Ok(self)
    }
}

/// Factory shorthand for [`Output::new`].
pub fn output(settings: Settings, upstream: Upstream) -> Result<Output, ConfigurationError> {
    Output::new(settings, upstream)
}

impl Layer for Output {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn shape(&self) -> Shape {
        self.weights.shape()
    }

    fn validate(&self, inputs: &[Shape]) -> Result<(), ConfigurationError> {
        check_input(Self::KIND, self.input_shape, inputs)
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
        self.dense.forward(inputs[0], &mut self.weights);
    }

    fn compare(&mut self, inputs: &[&Mat], contributions: &mut [Mat]) {
        self.dense
            .backward(inputs[0], &self.weights, &self.deltas, &mut contributions[0]);
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

    fn adjust_weights(&mut self, rate: f64) {
        self.dense.apply_update(rate);
    }

    fn reset_update(&mut self) {
        self.dense.update.reset();
    }

    fn is_terminal(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerId;

    fn upstream(width: usize) -> Upstream {
        Upstream {
            id: LayerId(0),
            shape: Shape::new(width, 1),
        }
    }

    #[test]
    fn forward_applies_kernel_bias_and_activation() {
        let mut layer = FeedForward::new(Settings::new(2), upstream(2))
            .unwrap()
            .activator(Activator::Identity)
            .with_parameters(Mat::from_rows(&[[1.0, 2.0], [-1.0, 0.5]]), vec![0.5, 0.0])
            .unwrap();
        let input = Mat::from_rows(&[[1.0, 2.0]]);
        layer.predict(&[&input]);
        assert_eq!(layer.weights().to_vec(), vec![5.5, 0.0]);
    }

    #[test]
    fn compare_pushes_transposed_kernel_upstream() {
        let mut layer = FeedForward::new(Settings::new(1), upstream(2))
            .unwrap()
            .activator(Activator::Identity)
            .with_parameters(Mat::from_rows(&[[2.0, -3.0]]), vec![0.0])
            .unwrap();
        let input = Mat::from_rows(&[[1.0, 1.0]]);
        layer.predict(&[&input]);
        layer.deltas_mut()[(0, 0)] = 0.5;
        let mut contributions = [Mat::zeros(2, 1)];
        layer.compare(&[&input], &mut contributions);
        assert_eq!(contributions[0].to_vec(), vec![1.0, -1.5]);
    }

    #[test]
    fn adjust_weights_descends_and_resets() {
        let mut layer = FeedForward::new(Settings::new(1), upstream(1))
            .unwrap()
            .activator(Activator::Identity)
            .with_parameters(Mat::from_rows(&[[1.0]]), vec![0.0])
            .unwrap();
        let input = Mat::from_rows(&[[2.0]]);
        layer.predict(&[&input]);
        layer.deltas_mut()[(0, 0)] = 1.0;
        let mut contributions = [Mat::zeros(1, 1)];
        layer.compare(&[&input], &mut contributions);
        layer.adjust_weights(0.25);
        layer.predict(&[&input]);
        // kernel 1 - 0.25 * 2 = 0.5, bias 0 - 0.25 * 1 = -0.25
        assert_eq!(layer.weights()[(0, 0)], 0.75);

        // a second adjustment without a new compare changes nothing
        layer.adjust_weights(0.25);
        layer.predict(&[&input]);
        assert_eq!(layer.weights()[(0, 0)], 0.75);
    }

    #[test]
    fn reset_update_discards_pending_gradient() {
        let mut layer = FeedForward::new(Settings::new(1), upstream(1))
            .unwrap()
            .activator(Activator::Identity)
            .with_parameters(Mat::from_rows(&[[1.0]]), vec![0.0])
            .unwrap();
        let input = Mat::from_rows(&[[2.0]]);
        layer.predict(&[&input]);
        layer.deltas_mut()[(0, 0)] = 1.0;
        let mut contributions = [Mat::zeros(1, 1)];
        layer.compare(&[&input], &mut contributions);
        layer.reset_update();
        layer.adjust_weights(0.25);
        layer.predict(&[&input]);
        assert_eq!(layer.weights()[(0, 0)], 2.0);
    }

    #[test]
    fn wrong_parameter_shape_is_rejected() {
        let err = FeedForward::new(Settings::new(3), upstream(2))
            .unwrap()
            .with_parameters(Mat::zeros(3, 2), vec![0.0; 3])
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::ShapeMismatch {
                kind: "FeedForward",
                expected: Shape::new(2, 3),
                found: Shape::new(3, 2),
            }
        );
    }

    #[test]
    fn output_seeds_deltas_from_target() {
        let mut layer = Output::new(Settings::new(1), upstream(1))
            .unwrap()
            .with_parameters(Mat::from_rows(&[[0.0]]), vec![0.0])
            .unwrap();
        let input = Mat::from_rows(&[[1.0]]);
        layer.predict(&[&input]);
        assert_eq!(layer.weights()[(0, 0)], 0.5);

        let mut contributions = [Mat::zeros(1, 1)];
        layer
            .compare_target(&Mat::from_rows(&[[1.0]]), &[&input], &mut contributions)
            .unwrap();
        assert_eq!(layer.deltas()[(0, 0)], -0.5);
        assert!(layer.is_terminal());
    }

    #[test]
    fn output_rejects_wrong_target_shape() {
        let mut layer = Output::new(Settings::new(2), upstream(1)).unwrap();
        let input = Mat::zeros(1, 1);
        let mut contributions = [Mat::zeros(1, 1)];
        assert!(layer
            .compare_target(&Mat::zeros(1, 1), &[&input], &mut contributions)
            .is_err());
    }
}
