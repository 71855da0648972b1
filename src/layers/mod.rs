//! The layer contract and its variants.
//!
//! Every layer owns a `weights` grid, which doubles as its output, and a
//! `deltas` grid of the same shape that collects the error signal during the
//! backward pass. Layers never touch each other's buffers: the graph hands
//! them their predecessors' outputs for reading, and sums whatever they
//! push upstream into the predecessors' deltas.

mod activation;
mod add;
mod convolution;
mod dense;
mod input;
mod pool;
mod target;
mod zeros;

pub use self::activation::{leaky_relu, relu, sigmoid, soft_max, tanh, Activation, SoftMax};
pub use self::add::Add;
pub use self::convolution::{convolution, Convolution};
pub use self::dense::{feed_forward, output, FeedForward, Output};
pub use self::input::{input, Input};
pub use self::pool::{pool, Pool};
pub use self::target::{target, Target};
pub use self::zeros::{zeros, Zeros};

use crate::error::{ConfigurationError, PropagationError};
use crate::matrix::Mat;

use std::fmt;

/// The `width x height` extent of a layer's output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub width: usize,
    pub height: usize,
}

impl Shape {
    pub fn new(width: usize, height: usize) -> Self {
        Shape { width, height }
    }

    /// Number of values in a grid of this shape.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocates a zero-filled grid of this shape.
    pub fn zeros(&self) -> Mat {
        Mat::zeros(self.width, self.height)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Size options handed to a layer factory.
///
/// `height` defaults to 1, so a layer built from `Settings::new(n)` behaves
/// as an `n` element vector.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
}

impl Settings {
    pub fn new(width: usize) -> Self {
        Settings {
            width: Some(width),
            height: None,
        }
    }

    /// Sets the height of the layer.
    pub fn height(mut self, height: usize) -> Self {
        self.height = Some(height);
        self
    }

    /// Resolves the shape of a layer that has no predecessor to inherit from.
    pub fn shape(&self, kind: &'static str) -> Result<Shape, ConfigurationError> {
        let width = self.width.ok_or(ConfigurationError::MissingWidth { kind })?;
        let shape = Shape::new(width, self.height.unwrap_or(1));
        check_nonzero(kind, shape)?;
        Ok(shape)
    }

    /// Resolves the shape of a layer whose shape follows from its inputs.
    ///
    /// Unset dimensions take the `derived` value; set ones must agree with it.
    pub fn shape_or(&self, kind: &'static str, derived: Shape) -> Result<Shape, ConfigurationError> {
        let shape = Shape::new(
            self.width.unwrap_or(derived.width),
            self.height.unwrap_or(derived.height),
        );
        check_nonzero(kind, shape)?;
        if shape != derived {
            return Err(ConfigurationError::ShapeMismatch {
                kind,
                expected: derived,
                found: shape,
            });
        }
        Ok(shape)
    }
}

fn check_nonzero(kind: &'static str, shape: Shape) -> Result<(), ConfigurationError> {
    if shape.width == 0 {
        return Err(ConfigurationError::ZeroDimension {
            kind,
            dimension: "width",
        });
    }
    if shape.height == 0 {
        return Err(ConfigurationError::ZeroDimension {
            kind,
            dimension: "height",
        });
    }
    Ok(())
}

/// Checks that a single-input layer got exactly one input, and returns it.
pub(crate) fn single_input(kind: &'static str, inputs: &[Shape]) -> Result<Shape, ConfigurationError> {
    match inputs {
        [shape] => Ok(*shape),
        _ => Err(ConfigurationError::InputCount {
            kind,
            expected: "1",
            found: inputs.len(),
        }),
    }
}

/// Position of a layer inside the graph that owns it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub(crate) usize);

impl LayerId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A reference to an already constructed predecessor, as seen by a factory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Upstream {
    pub id: LayerId,
    pub shape: Shape,
}

/// A node of the computation graph.
///
/// The graph drives every layer identically: `predict` in topological order
/// and `compare` (or `compare_target` for the terminal layer) in reverse.
pub trait Layer: fmt::Debug {
    /// Name of the layer variant.
    fn kind(&self) -> &'static str;

    /// Shape of this layer's output, and of its deltas.
    fn shape(&self) -> Shape;

    /// Checks this layer's shape against the shapes of its inputs.
    fn validate(&self, inputs: &[Shape]) -> Result<(), ConfigurationError>;

    /// The layer's output buffer.
    fn weights(&self) -> &Mat;

    fn weights_mut(&mut self) -> &mut Mat;

    /// The error signal accumulated for this layer's output.
    fn deltas(&self) -> &Mat;

    fn deltas_mut(&mut self) -> &mut Mat;

    /// Recomputes the output buffer from the predecessors' outputs.
    fn predict(&mut self, inputs: &[&Mat]);

    /// Pushes the accumulated deltas upstream.
    ///
    /// Layers with parameters also add this pass's gradient to their pending
    /// update. `contributions[i]` is zeroed and shaped like `inputs[i]`; whatever is
    /// left in it is added to that predecessor's deltas.
    fn compare(&mut self, inputs: &[&Mat], contributions: &mut [Mat]);

    /// Seeds the deltas from the expected output, then behaves like
    /// `compare`.
    fn compare_target(
        &mut self,
        target: &Mat,
        inputs: &[&Mat],
        contributions: &mut [Mat],
    ) -> Result<(), PropagationError> {
        let _ = (target, inputs, contributions);
        Err(PropagationError::NotATerminal { kind: self.kind() })
    }

    /// Stores the external input of the network.
    fn feed(&mut self, input: &Mat) -> Result<(), PropagationError> {
        let _ = input;
        Err(PropagationError::NotAnInput { kind: self.kind() })
    }

    /// Applies and resets pending parameter updates, scaled by `rate`.
    fn adjust_weights(&mut self, rate: f64) {
        let _ = rate;
    }

    /// Discards pending parameter updates without applying them.
    fn reset_update(&mut self) {}

    /// True for layers that can start a network.
    fn accepts_input(&self) -> bool {
        false
    }

    /// True for layers that can end a network.
    fn is_terminal(&self) -> bool {
        false
    }
}
