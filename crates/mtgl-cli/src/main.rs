//! MTGL-ADMET command line
//!
//! Run with: cargo run -p mtgl-cli -- <command>

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mtgl", version, about = "Multi-task ADMET prediction with a graph neural network")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write randomly initialised weights for a config
    Init {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Print the layer layout and parameter count
    Summary {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Score featurised molecules from a JSON file
    Predict {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        weights: PathBuf,
        #[arg(short, long)]
        input: PathBuf,
        /// Write predictions here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 128)]
        batch_size: usize,
        #[arg(long)]
        gpu: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so predictions can be piped.
    // `mtgl` matches every `mtgl_*` crate target by prefix.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mtgl=info,warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Init { config, out } => {
            let parameters = mtgl_cli::init(&config, &out)?;
            println!("{parameters} parameters written to {}", out.display());
        }
        Command::Summary { config } => {
            let summary = mtgl_cli::summary(&config)?;
            for layer in &summary.layers {
                println!("{layer}");
            }
            println!("heads:");
            for head in &summary.heads {
                println!("  {head}");
            }
            println!("parameters: {}", summary.parameters);
        }
        Command::Predict {
            config,
            weights,
            input,
            output,
            batch_size,
            gpu,
        } => {
            let records = mtgl_cli::predict(&config, &weights, &input, batch_size, gpu)?;
            let json = serde_json::to_string_pretty(&records)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    info!("Predictions written to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
    }
    Ok(())
}
