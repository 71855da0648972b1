use layernet::layers::{feed_forward, input, output, Settings};
use layernet::trainer::{Logging, Trainer};
use layernet::{factory, Network};

use tracing::info;
use tracing_subscriber::EnvFilter;

const XOR: [([f64; 2], [f64; 1]); 4] = [
    ([0.0, 0.0], [0.0]),
    ([0.0, 1.0], [1.0]),
    ([1.0, 0.0], [1.0]),
    ([1.0, 1.0], [0.0]),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut network = Network::new(
        || input(Settings::new(2)),
        vec![factory(|up| feed_forward(Settings::new(4), up))],
        |up| output(Settings::new(1), up),
    );
    let status = Trainer::new(&mut network)
        .learning_rate(0.5)
        .iterations(5_000)
        .logging(Logging::Iterations(500))
        .train(&XOR[..])?;
    info!(iterations = status.iterations, error = status.error, "training finished");

    for (example, expected) in &XOR {
        let prediction = network.run(example)?;
        info!(?example, expected = expected[0], predicted = prediction[0], "xor");
    }
    Ok(())
}
