//! The layer arena and the propagation engine that drives it.
//!
//! Layers are stored in creation order. Since a layer can only name
//! predecessors that already exist, creation order is a topological order:
//! the forward pass walks the arena front to back and the backward pass
//! walks it back to front.

use crate::error::{ConfigurationError, PropagationError};
use crate::layers::{Layer, LayerId, Shape, Upstream};
use crate::matrix::{Mat, ZeroOut};

use tracing::debug;

/// A layer together with its wiring.
#[derive(Debug)]
struct Node {
    layer: Box<dyn Layer>,
    inputs: Vec<LayerId>,
    /// Scratch space for `compare`, one buffer per input.
    contributions: Vec<Mat>,
}

impl Node {
    /// Sums a consumer's contribution into this layer's deltas.
    fn add_contribution(&mut self, contribution: &Mat) {
        *self.layer.deltas_mut() += contribution;
    }
}

/// An arena of layers forming a directed acyclic graph.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Graph { nodes: Vec::new() }
    }

    /// Adds a layer without predecessors.
    pub fn add_input<L, F>(&mut self, factory: F) -> Result<LayerId, ConfigurationError>
    where
        L: Layer + 'static,
        F: FnOnce() -> Result<L, ConfigurationError>,
    {
        let layer = factory()?;
        self.push(Box::new(layer), Vec::new())
    }

    /// Adds a layer fed by the already existing layers `inputs`.
    pub fn add<L, F>(&mut self, inputs: &[LayerId], factory: F) -> Result<LayerId, ConfigurationError>
    where
        L: Layer + 'static,
        F: FnOnce(&[Upstream]) -> Result<L, ConfigurationError>,
    {
        let upstream = self.upstream(inputs)?;
        let layer = factory(&upstream)?;
        self.push(Box::new(layer), inputs.to_vec())
    }

    /// Adds an already boxed layer fed by `inputs`.
    pub fn add_boxed(&mut self, inputs: &[LayerId], layer: Box<dyn Layer>) -> Result<LayerId, ConfigurationError> {
        self.upstream(inputs)?;
        self.push(layer, inputs.to_vec())
    }

    /// Describes the layers `inputs` for a factory.
    pub fn upstream(&self, inputs: &[LayerId]) -> Result<Vec<Upstream>, ConfigurationError> {
        inputs
            .iter()
            .map(|&id| {
                self.nodes
                    .get(id.0)
                    .map(|node| Upstream {
                        id,
                        shape: node.layer.shape(),
                    })
                    .ok_or(ConfigurationError::UnknownLayer(id))
            })
            .collect()
    }

    fn push(&mut self, layer: Box<dyn Layer>, inputs: Vec<LayerId>) -> Result<LayerId, ConfigurationError> {
        let shapes: Vec<Shape> = inputs.iter().map(|id| self.nodes[id.0].layer.shape()).collect();
        check_contract(layer.as_ref())?;
        layer.validate(&shapes)?;

        let id = LayerId(self.nodes.len());
        debug!(
            layer = %id,
            kind = layer.kind(),
            shape = %layer.shape(),
            inputs = ?inputs,
            "added layer"
        );
        self.nodes.push(Node {
            layer,
            contributions: shapes.iter().map(Shape::zeros).collect(),
            inputs,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn layer(&self, id: LayerId) -> Option<&dyn Layer> {
        self.nodes.get(id.0).map(|node| node.layer.as_ref())
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut (dyn Layer + 'static)> {
        self.nodes.get_mut(id.0).map(|node| node.layer.as_mut())
    }

    /// The predecessors of layer `id`.
    pub fn inputs_of(&self, id: LayerId) -> Option<&[LayerId]> {
        self.nodes.get(id.0).map(|node| node.inputs.as_slice())
    }

    /// Iterates over all layers in topological order.
    pub fn layers(&self) -> impl DoubleEndedIterator<Item = &dyn Layer> + ExactSizeIterator {
        self.nodes.iter().map(|node| node.layer.as_ref())
    }

    /// The first layer, which receives the external input.
    pub fn input_layer(&self) -> Option<&dyn Layer> {
        self.nodes.first().map(|node| node.layer.as_ref())
    }

    /// The last layer, which is compared against targets.
    pub fn output_layer(&self) -> Option<&dyn Layer> {
        self.nodes.last().map(|node| node.layer.as_ref())
    }

    /// Everything between the input and the output layer.
    pub fn hidden_layers(&self) -> impl Iterator<Item = &dyn Layer> {
        let end = self.nodes.len().saturating_sub(1);
        self.nodes
            .iter()
            .take(end)
            .skip(1)
            .map(|node| node.layer.as_ref())
    }

    /// Feeds `input` through every layer in order and returns the output
    /// layer's buffer.
    pub fn run_input(&mut self, input: &Mat) -> Result<&Mat, PropagationError> {
        if self.nodes.is_empty() {
            return Err(PropagationError::Uninitialized);
        }
        self.nodes[0].layer.feed(input)?;
        for i in 0..self.nodes.len() {
            let (before, rest) = self.nodes.split_at_mut(i);
            let node = &mut rest[0];
            let inputs = gather(before, &node.inputs);
            node.layer.predict(&inputs);
        }
        Ok(self.nodes[self.nodes.len() - 1].layer.weights())
    }

    /// Back-propagates the difference between the last forward pass and
    /// `target`.
    ///
    /// All deltas are reset first. The output layer is seeded with the
    /// target, every other layer except the input is then compared in
    /// reverse order, and each contribution is summed into the deltas of the
    /// predecessor it belongs to.
    ///
    /// Layers with parameters stage the gradient of this pass. Staged
    /// gradients add up until `adjust_weights` applies them or
    /// `reset_updates` drops them.
    pub fn calculate_deltas(&mut self, target: &Mat) -> Result<(), PropagationError> {
        let last = match self.nodes.len() {
            0 => return Err(PropagationError::Uninitialized),
            n => n - 1,
        };
        for node in &mut self.nodes {
            node.layer.deltas_mut().zero_out();
        }

        self.backward(last, Some(target))?;
        for i in (1..last).rev() {
            self.backward(i, None)?;
        }
        Ok(())
    }

    fn backward(&mut self, i: usize, target: Option<&Mat>) -> Result<(), PropagationError> {
        let (before, rest) = self.nodes.split_at_mut(i);
        let node = &mut rest[0];
        node.contributions.zero_out();
        {
            let inputs = gather(before, &node.inputs);
            match target {
                Some(target) => node
                    .layer
                    .compare_target(target, &inputs, &mut node.contributions)?,
                None => node.layer.compare(&inputs, &mut node.contributions),
            }
        }
        for (id, contribution) in node.inputs.iter().zip(&node.contributions) {
            before[id.0].add_contribution(contribution);
        }
        Ok(())
    }

    /// Applies the pending parameter updates of every layer.
    pub fn adjust_weights(&mut self, learning_rate: f64) {
        for node in &mut self.nodes {
            node.layer.adjust_weights(learning_rate);
        }
    }

    /// Drops the pending parameter updates of every layer.
    pub fn reset_updates(&mut self) {
        for node in &mut self.nodes {
            node.layer.reset_update();
        }
    }
}

/// Collects the output buffers of `inputs`, all of which precede the
/// current node.
fn gather<'a>(before: &'a [Node], inputs: &[LayerId]) -> Vec<&'a Mat> {
    inputs.iter().map(|id| before[id.0].layer.weights()).collect()
}

/// Checks the buffer invariants every layer has to uphold.
fn check_contract(layer: &dyn Layer) -> Result<(), ConfigurationError> {
    let declared = layer.shape();
    for (buffer, found) in [("weights", layer.weights().shape()), ("deltas", layer.deltas().shape())] {
        if found != declared {
            return Err(ConfigurationError::BrokenContract {
                kind: layer.kind(),
                buffer,
                declared,
                found,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::Activator;
    use crate::layers::{feed_forward, input, target, Add, Settings};

    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(usize, &'static str)>>>;

    /// A 1x1 layer that logs every call the engine makes on it.
    #[derive(Debug)]
    struct Recorder {
        index: usize,
        log: Log,
        weights: Mat,
        deltas: Mat,
    }

    fn recorder(index: usize, log: &Log) -> Result<Recorder, ConfigurationError> {
        Ok(Recorder {
            index,
            log: Rc::clone(log),
            weights: Mat::zeros(1, 1),
            deltas: Mat::zeros(1, 1),
        })
    }

    impl Recorder {
        fn record(&self, call: &'static str) {
            self.log.borrow_mut().push((self.index, call));
        }
    }

    impl Layer for Recorder {
        fn kind(&self) -> &'static str {
            "Recorder"
        }

        fn shape(&self) -> Shape {
            Shape::new(1, 1)
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

        fn predict(&mut self, _: &[&Mat]) {
            self.record("predict");
        }

        fn compare(&mut self, _: &[&Mat], _: &mut [Mat]) {
            self.record("compare");
        }

        fn compare_target(&mut self, _: &Mat, _: &[&Mat], _: &mut [Mat]) -> Result<(), PropagationError> {
            self.record("compare_target");
            Ok(())
        }

        fn feed(&mut self, _: &Mat) -> Result<(), PropagationError> {
            self.record("feed");
            Ok(())
        }

        fn adjust_weights(&mut self, _: f64) {
            self.record("adjust_weights");
        }
    }

    fn drain(log: &Log) -> Vec<(usize, &'static str)> {
        log.borrow_mut().drain(..).collect()
    }

    /// input(1) -> a, input -> b, (a + b) -> target
    fn diamond() -> (Graph, [LayerId; 4]) {
        let mut graph = Graph::new();
        let i = graph.add_input(|| input(Settings::new(1))).unwrap();
        let a = graph
            .add(&[i], |up| {
                feed_forward(Settings::new(1), up[0])?
                    .activator(Activator::Identity)
                    .with_parameters(Mat::from_rows(&[[2.0]]), vec![0.0])
            })
            .unwrap();
        let b = graph
            .add(&[i], |up| {
                feed_forward(Settings::new(1), up[0])?
                    .activator(Activator::Identity)
                    .with_parameters(Mat::from_rows(&[[3.0]]), vec![0.0])
            })
            .unwrap();
        let sum = graph.add(&[a, b], |up| Add::new(Settings::default(), up)).unwrap();
        graph.add(&[sum], |up| target(Settings::default(), up[0])).unwrap();
        (graph, [i, a, b, sum])
    }

    #[test]
    fn forward_pass_follows_wiring() {
        let (mut graph, _) = diamond();
        let out = graph.run_input(&Mat::from_rows(&[[1.0]])).unwrap();
        assert_eq!(out.to_vec(), vec![5.0]);
    }

    #[test]
    fn shared_predecessor_receives_sum_of_contributions() {
        let (mut graph, [i, a, b, sum]) = diamond();
        graph.run_input(&Mat::from_rows(&[[1.0]])).unwrap();
        graph.calculate_deltas(&Mat::from_rows(&[[4.0]])).unwrap();

        let delta = |id| graph.layer(id).unwrap().deltas()[(0, 0)];
        assert_eq!(delta(sum), 1.0);
        assert_eq!(delta(a), 1.0);
        assert_eq!(delta(b), 1.0);
        // 2 * 1 from a plus 3 * 1 from b
        assert_eq!(delta(i), 5.0);
    }

    #[test]
    fn deltas_reset_between_calls() {
        let (mut graph, [i, ..]) = diamond();
        graph.run_input(&Mat::from_rows(&[[1.0]])).unwrap();
        graph.calculate_deltas(&Mat::from_rows(&[[4.0]])).unwrap();
        graph.calculate_deltas(&Mat::from_rows(&[[4.0]])).unwrap();
        assert_eq!(graph.layer(i).unwrap().deltas()[(0, 0)], 5.0);
    }

    #[test]
    fn chain_calls_each_layer_once_in_order() {
        let log = Log::default();
        let mut graph = Graph::new();
        let mut previous = graph.add_input(|| recorder(0, &log)).unwrap();
        for index in 1..4 {
            previous = graph.add(&[previous], |_| recorder(index, &log)).unwrap();
        }

        graph.run_input(&Mat::zeros(1, 1)).unwrap();
        assert_eq!(
            drain(&log),
            [(0, "feed"), (0, "predict"), (1, "predict"), (2, "predict"), (3, "predict")]
        );

        graph.calculate_deltas(&Mat::zeros(1, 1)).unwrap();
        assert_eq!(drain(&log), [(3, "compare_target"), (2, "compare"), (1, "compare")]);

        graph.adjust_weights(0.1);
        assert_eq!(
            drain(&log),
            [(0, "adjust_weights"), (1, "adjust_weights"), (2, "adjust_weights"), (3, "adjust_weights")]
        );
    }

    #[test]
    fn diamond_calls_each_layer_once_in_order() {
        let log = Log::default();
        let mut graph = Graph::new();
        let i = graph.add_input(|| recorder(0, &log)).unwrap();
        let a = graph.add(&[i], |_| recorder(1, &log)).unwrap();
        let b = graph.add(&[i], |_| recorder(2, &log)).unwrap();
        let sum = graph.add(&[a, b], |_| recorder(3, &log)).unwrap();
        graph.add(&[sum], |_| recorder(4, &log)).unwrap();

        graph.run_input(&Mat::zeros(1, 1)).unwrap();
        assert_eq!(
            drain(&log),
            [(0, "feed"), (0, "predict"), (1, "predict"), (2, "predict"), (3, "predict"), (4, "predict")]
        );

        graph.calculate_deltas(&Mat::zeros(1, 1)).unwrap();
        assert_eq!(
            drain(&log),
            [(4, "compare_target"), (3, "compare"), (2, "compare"), (1, "compare")]
        );
    }

    #[test]
    fn unknown_predecessor_is_rejected() {
        let mut graph = Graph::new();
        let err = graph
            .add(&[LayerId(0)], |up| target(Settings::default(), up[0]))
            .unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownLayer(LayerId(0)));
    }

    #[test]
    fn empty_graph_cannot_run() {
        let mut graph = Graph::new();
        assert_eq!(
            graph.run_input(&Mat::zeros(1, 1)).unwrap_err(),
            PropagationError::Uninitialized
        );
        assert_eq!(
            graph.calculate_deltas(&Mat::zeros(1, 1)).unwrap_err(),
            PropagationError::Uninitialized
        );
    }

    #[test]
    fn hidden_layers_exclude_endpoints() {
        let (graph, _) = diamond();
        let kinds: Vec<_> = graph.hidden_layers().map(|l| l.kind()).collect();
        assert_eq!(kinds, ["FeedForward", "FeedForward", "Add"]);
        assert_eq!(graph.input_layer().unwrap().kind(), "Input");
        assert_eq!(graph.output_layer().unwrap().kind(), "Target");
    }
}
