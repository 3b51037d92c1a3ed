//! The evaluator: connects to the garbler, evaluates the received garbled
//! circuit and returns the output labels.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing_subscriber::EnvFilter;

use yao_gc::channel::TcpChannel;
use yao_gc::circuit::bits_from_str;
use yao_gc::garble::GarbleMode;
use yao_gc::protocol::run_evaluator;

#[derive(Debug, Parser)]
#[command(name = "evaluator", about = "Garbled circuits: evaluator (client) side")]
struct Cli {
    /// The garbler's hostname.
    #[arg(long, default_value = "localhost")]
    host: String,
    /// Port to connect to.
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// The evaluator's input bits, e.g. '101'.
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

    let bits = bits_from_str(&cli.input).context("invalid --input")?;
    let mode = if cli.pandp {
        GarbleMode::PointAndPermute
    } else {
        GarbleMode::Shuffled
    };

    let mut channel = TcpChannel::connect(&cli.host, cli.port, Duration::from_secs(cli.timeout))
        .await
        .map_err(|e| anyhow!("transport error: {e:?}"))?;
    let mut rng = ChaCha20Rng::from_entropy();
    let stats = run_evaluator(&mut channel, &bits, mode, &mut rng).await?;

    println!(
        "evaluated {} gates in {} us ({} decryption attempts, {} successful)",
        stats.gates_evaluated,
        stats.elapsed.as_micros(),
        stats.decryption_attempts,
        stats.successful_decryptions,
    );
    Ok(())
}
