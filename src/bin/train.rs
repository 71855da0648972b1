use layernet::layers::Settings;
use layernet::topology::{LayerSpec, Topology};
use layernet::trainer::{Logging, Trainer};
use layernet::Network;

use clap::Parser;
use rand::distributions::{Distribution, Uniform};
use rand_distr::Normal;
use tracing::info;
use tracing_subscriber::EnvFilter;

type Input = [f64; 2];
type Output = [f64; 2];

/// Trains a network to tell which diagonal pair of quadrants a noisy point
/// on the unit circle lies in.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON topology to train; a 2-5-5-2 network by default
    #[arg(short, long)]
    topology: Option<String>,
    /// Number of training samples
    #[arg(long, default_value_t = 10_000)]
    samples: usize,
    #[arg(long, default_value_t = 0.3)]
    learning_rate: f64,
    #[arg(long, default_value_t = 1000)]
    iterations: usize,
    #[arg(long, default_value_t = 0.001)]
    error_threshold: f64,
    /// Log the training error every n iterations
    #[arg(long, default_value_t = 50)]
    log_period: usize,
}

fn generate_data(num_samples: usize) -> Result<Vec<(Input, Output)>, Box<dyn std::error::Error>> {
    let mut rng = rand::thread_rng();
    let radians = Uniform::new(0.0, 2.0 * std::f64::consts::PI);
    let noise = Normal::new(0.0, 0.1)?;

    let mut data = Vec::with_capacity(num_samples);
    for _ in 0..num_samples {
        let theta = radians.sample(&mut rng);
        let dx = noise.sample(&mut rng);
        let dy = noise.sample(&mut rng);
        let point = [theta.cos() + dx, theta.sin() + dy];
        let class = if point[0] * point[1] > 0.0 {
            [1.0, 0.0]
        } else {
            [0.0, 1.0]
        };
        data.push((point, class));
    }
    Ok(data)
}

fn default_topology() -> Topology {
    Topology {
        input: LayerSpec::Input {
            settings: Settings::new(2),
        },
        hidden: vec![
            LayerSpec::FeedForward {
                settings: Settings::new(5),
                activator: None,
            },
            LayerSpec::FeedForward {
                settings: Settings::new(5),
                activator: None,
            },
        ],
        output: LayerSpec::Output {
            settings: Settings::new(2),
        },
    }
}

fn score(set_name: &str, network: &mut Network, test_data: &[(Input, Output)]) -> layernet::Result<()> {
    let mut num_correct = 0;
    for (input, expected) in test_data {
        let output = network.run(input)?;
        let class = if output[0] > output[1] { 0 } else { 1 };
        if expected[class] == 1.0 {
            num_correct += 1;
        }
    }
    info!(
        set = set_name,
        correct = num_correct,
        total = test_data.len(),
        "scored network"
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let topology = match &args.topology {
        Some(path) => Topology::from_path(path)?,
        None => default_topology(),
    };
    let mut network = topology.into_network();
    network.initialize()?;

    let training_data = generate_data(args.samples)?;
    Trainer::new(&mut network)
        .learning_rate(args.learning_rate)
        .iterations(args.iterations)
        .error_threshold(args.error_threshold)
        .logging(Logging::Iterations(args.log_period))
        .train(&training_data)?;

    score("training", &mut network, &training_data)?;
    score("test", &mut network, &generate_data(1_000)?)?;
    Ok(())
}
