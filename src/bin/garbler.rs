//! The garbler: listens for the evaluator, drives the protocol and prints
//! the decoded output bits.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing_subscriber::EnvFilter;

use yao_gc::channel::TcpChannel;
use yao_gc::circuit::{bits_from_str, bits_to_string};
use yao_gc::garble::GarbleMode;
use yao_gc::protocol::run_garbler;
use yao_gc::bristol;

#[derive(Debug, Parser)]
#[command(name = "garbler", about = "Garbled circuits: garbler (server) side")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Circuit description file in Bristol Fashion.
    #[arg(long)]
    circuit: PathBuf,
    /// The garbler's input bits, e.g. '101'.
    #[arg(long, default_value = "")]
    input: String,
    /// Order truth-table rows by permutation bits instead of shuffling them.
    /// Both parties must agree on this flag.
    #[arg(long)]
    pandp: bool,
    /// Per-call transport timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let circuit = bristol::load(&cli.circuit)
        .map_err(|e| anyhow!("cannot load circuit {}: {e:?}", cli.circuit.display()))?;
    let bits = bits_from_str(&cli.input).context("invalid --input")?;
    let mode = if cli.pandp {
        GarbleMode::PointAndPermute
    } else {
        GarbleMode::Shuffled
    };

    let mut channel = TcpChannel::listen(cli.port, Duration::from_secs(cli.timeout))
        .await
        .map_err(|e| anyhow!("transport error: {e:?}"))?;
    let mut rng = ChaCha20Rng::from_entropy();
    let output = run_garbler(&mut channel, &circuit, &bits, mode, &mut rng).await?;

    println!("{}", bits_to_string(&output));
    Ok(())
}
