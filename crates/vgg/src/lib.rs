mod smoke;

use std::{error::Error, fs::File, path::PathBuf};

use burn::{backend::NdArray, config::Config};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use vgg_network::model::VggConfig;
use vgg_train::train::TrainConfig;

#[derive(Parser)]
#[command(version = "0.1.0")]
#[command(about = "VGG-style CIFAR-10 classifier")]
struct Cli {
    #[arg(
        short,
        long,
        help = "Activate tracing and write results to the specified file after truncating or creating it"
    )]
    trace_file: Option<PathBuf>,
    #[arg(short, long, help = "Load the training configuration from a JSON file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Print every parameter of the network and the training schedule")]
    Describe,
    #[command(about = "Write the training configuration in use to a JSON file")]
    SaveConfig { path: PathBuf },
    #[command(about = "Run training steps on synthetic CIFAR-10 shaped batches")]
    Smoke {
        #[arg(short, long, default_value_t = 10)]
        steps: usize,
        #[arg(short, long, help = "Overrides the configured batch size")]
        batch_size: Option<usize>,
    },
}

fn initialize_tracing(trace_file: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    match trace_file {
        Some(trace_file) => {
            let subscriber = tracing_subscriber::fmt()
                .with_writer(File::create(trace_file)?)
                .event_format(tracing_subscriber::fmt::format().without_time().json())
                .with_thread_ids(true)
                .with_max_level(Level::TRACE)
                .finish();

            Ok(tracing::subscriber::set_global_default(subscriber)?)
        }
        None => {
            let subscriber = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(EnvFilter::from_default_env())
                .finish();

            Ok(tracing::subscriber::set_global_default(subscriber)?)
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<TrainConfig, Box<dyn Error>> {
    Ok(match path {
        Some(path) => {
            let config = TrainConfig::load(&path)?;
            tracing::info!(path = %path.display(), "loaded training configuration");

            config
        }
        None => TrainConfig::new(VggConfig::new()),
    })
}

// Built on the CPU so describing never needs a GPU.
type DescribeBackend = NdArray;

fn description(config: &TrainConfig) -> Result<Vec<String>, Box<dyn Error>> {
    let (_, parameters) = config.model.init_described::<DescribeBackend>()?;

    let mut lines = parameters
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    lines.push(format!(
        "{} parameters in {} tensors",
        parameters.iter().map(|parameter| parameter.len()).sum::<usize>(),
        parameters.len()
    ));
    lines.push(format!(
        "learning rate {} decaying by {} every {} steps ({} epochs of {} batches)",
        config.initial_learning_rate,
        config.decay_factor,
        config.decay_steps()?,
        config.epochs_per_decay,
        config.batches_per_epoch()?
    ));

    Ok(lines)
}

fn describe(config: &TrainConfig) -> Result<(), Box<dyn Error>> {
    for line in description(config)? {
        println!("{line}");
    }

    Ok(())
}

pub fn cli() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    initialize_tracing(cli.trace_file)?;

    let config = load_config(cli.config)?;

    match cli.command {
        Command::Describe => describe(&config),
        Command::SaveConfig { path } => Ok(config.save(path)?),
        Command::Smoke { steps, batch_size } => {
            let config = match batch_size {
                Some(batch_size) => config.with_batch_size(batch_size),
                None => config,
            };

            smoke::run(&config, steps)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_default_network() {
        let lines = description(&TrainConfig::new(VggConfig::new())).unwrap();

        assert_eq!(lines.len(), 32);
        assert_eq!(lines[0], "64/conv1/W [3, 3, 3, 64]");
        assert_eq!(lines[29], "softmax_linear/b [10]");
        assert!(lines[31].contains("every 9750 steps (25 epochs of 390 batches)"));
    }

    #[test]
    fn describing_empty_batches_fails() {
        let config = TrainConfig::new(VggConfig::new()).with_batch_size(0);

        assert!(description(&config).is_err());
    }
}
