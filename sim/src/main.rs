use clap::Parser;
use powsim_config::config::SimConfig;
use powsim_sim::{export_results, print_parameters, print_summary, run_simulation};
use rand::RngCore;

#[derive(Parser)]
#[command(name = "powsim")]
#[command(about = "Discrete-event simulation of a proof-of-work P2P network", long_about = None)]
struct Cli {
    /// Number of peers
    #[arg(long)]
    peers: Option<usize>,
    /// Fraction of peers with a slow network link
    #[arg(long)]
    z0: Option<f64>,
    /// Fraction of peers with a slow CPU
    #[arg(long)]
    z1: Option<f64>,
    /// Blocks to reach before stopping
    #[arg(long)]
    target_blocks: Option<usize>,
    /// Transactions per block
    #[arg(long)]
    txn_per_block: Option<usize>,
    /// RNG seed (random when omitted)
    #[arg(long)]
    seed: Option<u64>,
    /// Export config.json and results.json under the output directory
    #[arg(long)]
    save_results: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let mut cfg = SimConfig::load()?;
    if let Some(peers) = cli.peers {
        cfg.number_of_peers = peers;
    }
    if let Some(z0) = cli.z0 {
        cfg.z0 = z0;
    }
    if let Some(z1) = cli.z1 {
        cfg.z1 = z1;
    }
    if let Some(blocks) = cli.target_blocks {
        cfg.target_num_blocks = blocks;
    }
    if let Some(txns) = cli.txn_per_block {
        cfg.txn_per_block = txns;
    }
    if cli.save_results {
        cfg.save_results = true;
    }

    let seed = cli.seed.unwrap_or_else(|| rand::thread_rng().next_u64());
    print_parameters(&cfg);
    println!("Seed: {seed}");

    let outcome = run_simulation(&cfg, seed);
    print_summary(&outcome);
    export_results(&cfg, &outcome.report)?;
    Ok(())
}
