//! A [Feedforward neural network]
//! (https://en.wikipedia.org/wiki/Feedforward_neural_network) assembled
//! from layer factories.
//!
//! # Example
//!
//! Let's build a network for the XOR function and train it for a while:
//!
//! ```
//! # use layernet::feed_forward::*;
//! # use layernet::layers::{feed_forward, input, output, Settings};
//! # use layernet::trainer::Trainer;
//! // Create examples of the XOR function
//! let examples = [([0.0, 0.0], [0.0]),
//!                 ([0.0, 1.0], [1.0]),
//!                 ([1.0, 0.0], [1.0]),
//!                 ([1.0, 1.0], [0.0])];
//!
//! // Describe the network: two inputs, three hidden neurons, one output
//! let mut network = Network::new(
//!     || input(Settings::new(2)),
//!     vec![factory(|up| feed_forward(Settings::new(3), up))],
//!     |up| output(Settings::new(1), up),
//! );
//!
//! // Train it using those examples
//! let status = Trainer::new(&mut network)
//!     .learning_rate(0.5)
//!     .iterations(100)
//!     .train(&examples[..])
//!     .unwrap();
//! assert!(status.iterations <= 100);
//!
//! // The trained network maps two inputs to one output
//! assert_eq!(network.run(&[1.0, 0.0]).unwrap().len(), 1);
//! ```

use crate::error::{ConfigurationError, PropagationError, Result};
use crate::graph::Graph;
use crate::layers::{Layer, LayerId, Shape, Upstream};
use crate::matrix::Mat;
use crate::trainer::{ErrorMetric, Trainable, Trainer, TrainingOptions, TrainingStatus};

use std::fmt;
use tracing::debug;

/// Builds the first layer of a network.
pub type InputFactory = Box<dyn Fn() -> Result<Box<dyn Layer>, ConfigurationError>>;

/// Builds a layer on top of its predecessor.
pub type LayerFactory = Box<dyn Fn(Upstream) -> Result<Box<dyn Layer>, ConfigurationError>>;

/// Boxes a layer factory so factories of different layer types can share a
/// list.
pub fn factory<L, F>(f: F) -> LayerFactory
where
    L: Layer + 'static,
    F: Fn(Upstream) -> Result<L, ConfigurationError> + 'static,
{
    Box::new(
        move |upstream: Upstream| -> Result<Box<dyn Layer>, ConfigurationError> { Ok(Box::new(f(upstream)?)) },
    )
}

/// The factories a chain network is built from.
struct Blueprint {
    input: InputFactory,
    hidden: Vec<LayerFactory>,
    output: LayerFactory,
}

/// A network of layers wired input first, output last.
pub struct Network {
    blueprint: Option<Blueprint>,
    graph: Graph,
}

impl Network {
    /// Describes a chain network. Nothing is built until
    /// [`initialize`](Network::initialize) is called.
    ///
    /// Arguments:
    ///  * `input` - builds the input layer.
    ///  * `hidden` - build the hidden layers in order, each on top of the
    ///               previous layer.
    ///  * `output` - builds the output layer on top of the last hidden layer.
    pub fn new<I, O, LI, LO>(input: I, hidden: Vec<LayerFactory>, output: O) -> Self
    where
        LI: Layer + 'static,
        LO: Layer + 'static,
        I: Fn() -> Result<LI, ConfigurationError> + 'static,
        O: Fn(Upstream) -> Result<LO, ConfigurationError> + 'static,
    {
        Network::from_factories(
            Box::new(move || -> Result<Box<dyn Layer>, ConfigurationError> { Ok(Box::new(input()?)) }),
            hidden,
            factory(output),
        )
    }

    /// Like [`new`](Network::new), for already boxed factories.
    pub fn from_factories(input: InputFactory, hidden: Vec<LayerFactory>, output: LayerFactory) -> Self {
        Network {
            blueprint: Some(Blueprint { input, hidden, output }),
            graph: Graph::new(),
        }
    }

    /// Wraps an already built graph.
    ///
    /// The first layer must accept input and the last must be terminal.
    /// Such a network has no factories, so `initialize` leaves it as is.
    pub fn from_graph(graph: Graph) -> Result<Self, ConfigurationError> {
        if graph.len() < 2 {
            return Err(ConfigurationError::EmptyGraph);
        }
        check_endpoints(&graph)?;
        Ok(Network {
            blueprint: None,
            graph,
        })
    }

    /// Builds the layer graph from the factories, replacing any previous one.
    pub fn initialize(&mut self) -> Result<(), ConfigurationError> {
        let blueprint = match &self.blueprint {
            Some(blueprint) => blueprint,
            None => return Ok(()),
        };
        let mut graph = Graph::new();
        let mut previous = graph.add_boxed(&[], (blueprint.input)()?)?;
        for hidden in &blueprint.hidden {
            let layer = hidden(upstream_of(&graph, previous)?)?;
            previous = graph.add_boxed(&[previous], layer)?;
        }
        let layer = (blueprint.output)(upstream_of(&graph, previous)?)?;
        graph.add_boxed(&[previous], layer)?;
        check_endpoints(&graph)?;

        debug!(layers = graph.len(), "initialized network");
        self.graph = graph;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        !self.graph.is_empty()
    }

    /// The layer graph; empty until the network is initialized.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Iterates over all layers, input first.
    pub fn layers(&self) -> impl DoubleEndedIterator<Item = &dyn Layer> + ExactSizeIterator {
        self.graph.layers()
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut (dyn Layer + 'static)> {
        self.graph.layer_mut(LayerId(index))
    }

    /// Shape of the input layer.
    pub fn input_shape(&self) -> Result<Shape, PropagationError> {
        self.graph
            .input_layer()
            .map(|layer| layer.shape())
            .ok_or(PropagationError::Uninitialized)
    }

    /// Shape of the output layer.
    pub fn output_shape(&self) -> Result<Shape, PropagationError> {
        self.graph
            .output_layer()
            .map(|layer| layer.shape())
            .ok_or(PropagationError::Uninitialized)
    }

    /// Feeds the provided `input` through the network, returning the output
    /// layer's buffer.
    pub fn run_input(&mut self, input: &Mat) -> Result<&Mat, PropagationError> {
        self.graph.run_input(input)
    }

    /// Like [`run_input`](Network::run_input), for flat vectors.
    pub fn run(&mut self, input: &[f64]) -> Result<Vec<f64>, PropagationError> {
        let shape = self.input_shape()?;
        let input = reshape("input", shape, input)?;
        Ok(self.run_input(&input)?.to_vec())
    }

    /// Computes the deltas of every layer for the last forward pass.
    ///
    /// This also stages a parameter gradient in every layer that has
    /// parameters. Repeated calls add up; use
    /// [`reset_updates`](Network::reset_updates) to drop them.
    pub fn calculate_deltas(&mut self, target: &Mat) -> Result<(), PropagationError> {
        self.graph.calculate_deltas(target)
    }

    /// Applies the parameter updates collected by `calculate_deltas`.
    pub fn adjust_weights(&mut self, learning_rate: f64) {
        self.graph.adjust_weights(learning_rate);
    }

    /// Drops the parameter updates collected by `calculate_deltas`.
    pub fn reset_updates(&mut self) {
        self.graph.reset_updates();
    }

    /// Trains the network on `examples`, building it first if necessary.
    ///
    /// `callback` is invoked every `options.callback_period` iterations.
    pub fn train<'a, I, O, C>(
        &'a mut self,
        examples: &[(I, O)],
        options: TrainingOptions,
        callback: C,
    ) -> Result<TrainingStatus>
    where
        I: AsRef<[f64]>,
        O: AsRef<[f64]>,
        C: FnMut(&TrainingStatus) + 'a,
    {
        Trainer::new(self)
            .options(options)
            .callback(callback)
            .train(examples)
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Network")
            .field("graph", &self.graph)
            .finish()
    }
}

impl Trainable for Network {
    fn prepare(&mut self) -> Result<()> {
        if !self.is_initialized() {
            self.initialize()?;
        }
        self.reset_updates();
        Ok(())
    }

    fn input_len(&self) -> usize {
        self.input_shape().map_or(0, |shape| shape.len())
    }

    fn output_len(&self) -> usize {
        self.output_shape().map_or(0, |shape| shape.len())
    }

    fn compute_update(&mut self, example: &[f64], expected: &[f64], metric: ErrorMetric) -> Result<f64> {
        let output = self.run(example)?;
        let error = metric.compute(&output, expected);
        let target = reshape("target", self.output_shape()?, expected)?;
        self.calculate_deltas(&target)?;
        Ok(error)
    }

    fn apply_update(&mut self, rate: f64) {
        self.adjust_weights(rate);
    }
}

fn upstream_of(graph: &Graph, id: LayerId) -> Result<Upstream, ConfigurationError> {
    let layer = graph.layer(id).ok_or(ConfigurationError::UnknownLayer(id))?;
    Ok(Upstream {
        id,
        shape: layer.shape(),
    })
}

fn check_endpoints(graph: &Graph) -> Result<(), ConfigurationError> {
    if let Some(layer) = graph.input_layer() {
        if !layer.accepts_input() {
            return Err(ConfigurationError::NotAnInput { kind: layer.kind() });
        }
    }
    if let Some(layer) = graph.output_layer() {
        if !layer.is_terminal() {
            return Err(ConfigurationError::NotATerminal { kind: layer.kind() });
        }
    }
    Ok(())
}

/// Lays a flat vector out as a grid of `shape`.
fn reshape(what: &'static str, shape: Shape, values: &[f64]) -> Result<Mat, PropagationError> {
    Mat::from_vec(shape.width, shape.height, values.to_vec()).ok_or(PropagationError::ShapeMismatch {
        what,
        expected: shape,
        found: Shape::new(values.len(), 1),
    })
}
