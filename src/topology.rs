//! Serializable network descriptions.
//!
//! A topology lists the layers of a chain network in JSON:
//!
//! ```json
//! {
//!   "input": { "type": "input", "width": 2 },
//!   "hidden": [{ "type": "feed_forward", "width": 3 }],
//!   "output": { "type": "output", "width": 1 }
//! }
//! ```

use crate::activator::Activator;
use crate::error::{ConfigurationError, Result};
use crate::feed_forward::{LayerFactory, Network};
use crate::layers::{self, Layer, Settings, Shape, Upstream};

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// One layer of a [`Topology`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Input {
        #[serde(flatten)]
        settings: Settings,
    },
    Zeros {
        #[serde(flatten)]
        settings: Settings,
    },
    FeedForward {
        #[serde(flatten)]
        settings: Settings,
        #[serde(default)]
        activator: Option<Activator>,
    },
    Output {
        #[serde(flatten)]
        settings: Settings,
    },
    Target {
        #[serde(flatten)]
        settings: Settings,
    },
    Relu {
        #[serde(flatten)]
        settings: Settings,
    },
    LeakyRelu {
        #[serde(flatten)]
        settings: Settings,
        alpha: f64,
    },
    Sigmoid {
        #[serde(flatten)]
        settings: Settings,
    },
    Tanh {
        #[serde(flatten)]
        settings: Settings,
    },
    SoftMax {
        #[serde(flatten)]
        settings: Settings,
    },
    Pool {
        #[serde(flatten)]
        settings: Settings,
        filter: usize,
    },
    Convolution {
        #[serde(flatten)]
        settings: Settings,
        filter_width: usize,
        filter_height: usize,
    },
}

impl LayerSpec {
    /// Builds the described layer on top of `upstream`.
    pub fn build(&self, upstream: Option<Upstream>) -> Result<Box<dyn Layer>, ConfigurationError> {
        let up = || upstream.ok_or(ConfigurationError::NotAnInput { kind: self.kind() });
        let layer: Box<dyn Layer> = match *self {
            LayerSpec::Input { settings } => Box::new(layers::Input::new(settings)?),
            LayerSpec::Zeros { settings } => Box::new(layers::Zeros::new(settings)?),
            LayerSpec::FeedForward { settings, activator } => {
                let layer = layers::FeedForward::new(settings, up()?)?;
                match activator {
                    Some(activator) => Box::new(layer.activator(activator)),
                    None => Box::new(layer),
                }
            }
            LayerSpec::Output { settings } => Box::new(layers::Output::new(settings, up()?)?),
            LayerSpec::Target { settings } => Box::new(layers::Target::new(settings, up()?)?),
            LayerSpec::Relu { settings } => Box::new(layers::relu(settings, up()?)?),
            LayerSpec::LeakyRelu { settings, alpha } => Box::new(layers::leaky_relu(alpha, settings, up()?)?),
            LayerSpec::Sigmoid { settings } => Box::new(layers::sigmoid(settings, up()?)?),
            LayerSpec::Tanh { settings } => Box::new(layers::tanh(settings, up()?)?),
            LayerSpec::SoftMax { settings } => Box::new(layers::SoftMax::new(settings, up()?)?),
            LayerSpec::Pool { settings, filter } => Box::new(layers::Pool::new(settings, filter, up()?)?),
            LayerSpec::Convolution {
                settings,
                filter_width,
                filter_height,
            } => Box::new(layers::Convolution::new(
                settings,
                Shape::new(filter_width, filter_height),
                up()?,
            )?),
        };
        Ok(layer)
    }

    fn kind(&self) -> &'static str {
        match self {
            LayerSpec::Input { .. } => "Input",
            LayerSpec::Zeros { .. } => "Zeros",
            LayerSpec::FeedForward { .. } => "FeedForward",
            LayerSpec::Output { .. } => "Output",
            LayerSpec::Target { .. } => "Target",
            LayerSpec::Relu { .. } => "Relu",
            LayerSpec::LeakyRelu { .. } => "LeakyRelu",
            LayerSpec::Sigmoid { .. } => "Sigmoid",
            LayerSpec::Tanh { .. } => "TanH",
            LayerSpec::SoftMax { .. } => "SoftMax",
            LayerSpec::Pool { .. } => "Pool",
            LayerSpec::Convolution { .. } => "Convolution",
        }
    }

    fn into_factory(self) -> LayerFactory {
        Box::new(move |upstream| self.build(Some(upstream)))
    }
}

/// The layers of a chain network, input first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub input: LayerSpec,
    #[serde(default)]
    pub hidden: Vec<LayerSpec>,
    pub output: LayerSpec,
}

impl Topology {
    /// The 2-3-1 sigmoid network used for XOR style problems.
    pub fn xor() -> Self {
        Topology {
            input: LayerSpec::Input {
                settings: Settings::new(2),
            },
            hidden: vec![LayerSpec::FeedForward {
                settings: Settings::new(3),
                activator: None,
            }],
            output: LayerSpec::Output {
                settings: Settings::new(1),
            },
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Topology::from_reader(BufReader::new(File::open(path)?))
    }

    /// Describes a network with these layers. Call `initialize` to build it.
    pub fn into_network(self) -> Network {
        let input = self.input;
        Network::from_factories(
            Box::new(move || input.build(None)),
            self.hidden.into_iter().map(LayerSpec::into_factory).collect(),
            self.output.into_factory(),
        )
    }
}

impl Network {
    /// Describes a network with the layers of `topology`.
    pub fn from_topology(topology: Topology) -> Network {
        topology.into_network()
    }
}

impl From<Topology> for Network {
    fn from(topology: Topology) -> Network {
        Network::from_topology(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json() {
        let topology = Topology::from_json(
            r#"{
                "input": {"type": "input", "width": 4, "height": 4},
                "hidden": [
                    {"type": "convolution", "filter_width": 2, "filter_height": 2},
                    {"type": "relu"},
                    {"type": "pool", "filter": 3},
                    {"type": "feed_forward", "width": 2, "activator": "TanH"}
                ],
                "output": {"type": "output", "width": 1}
            }"#,
        )
        .unwrap();
        assert_eq!(topology.hidden.len(), 4);
        assert_eq!(
            topology.hidden[3],
            LayerSpec::FeedForward {
                settings: Settings::new(2),
                activator: Some(Activator::TanH),
            }
        );

        let mut network = Network::from_topology(topology);
        network.initialize().unwrap();
        let kinds: Vec<_> = network.layers().map(|l| l.kind()).collect();
        assert_eq!(
            kinds,
            ["Input", "Convolution", "Relu", "Pool", "FeedForward", "Output"]
        );
        assert_eq!(network.layers().nth(3).unwrap().shape(), Shape::new(1, 1));
    }

    #[test]
    fn unknown_layer_type_is_rejected() {
        assert!(Topology::from_json(
            r#"{"input": {"type": "bogus"}, "output": {"type": "output", "width": 1}}"#
        )
        .is_err());
    }

    #[test]
    fn only_the_input_layer_builds_without_upstream() {
        assert!(LayerSpec::Relu {
            settings: Settings::default()
        }
        .build(None)
        .is_err());
        let topology = Topology {
            input: LayerSpec::Relu {
                settings: Settings::default(),
            },
            ..Topology::xor()
        };
        assert_eq!(
            topology.into_network().initialize().unwrap_err(),
            ConfigurationError::NotAnInput { kind: "Relu" }
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Topology::from_path("/nonexistent/topology.json").unwrap_err();
        assert!(matches!(err, crate::error::Error::Io(_)));
    }

    #[test]
    fn xor_topology_builds() {
        let mut network: Network = Topology::xor().into();
        network.initialize().unwrap();
        assert_eq!(network.run(&[0.0, 1.0]).unwrap().len(), 1);
    }
}
