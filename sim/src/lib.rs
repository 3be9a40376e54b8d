use anyhow::{Context, Result};
use chrono::Utc;
use powsim_config::config::SimConfig;
use powsim_core::event::{Action, Event, EventKind, HookPhase, Scheduler};
use powsim_core::network::Network;
use powsim_core::peer::PeerId;
use powsim_core::report::SimulationReport;
use powsim_core::sampling;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared broadcast counters surfaced by the driver hooks.
pub struct HookCounters {
    pub txns_broadcast: Arc<AtomicU64>,
    pub blocks_broadcast: Arc<AtomicU64>,
}

/// What a finished run reports back.
pub struct RunOutcome {
    pub report: SimulationReport,
    pub txns_broadcast: u64,
    pub blocks_broadcast: u64,
    pub sim_time_ms: f64,
}

/// Build the overlay, seed the transaction schedule, register the
/// driver hooks and run the scheduler until it stops or drains.
pub fn run_simulation(cfg: &SimConfig, seed: u64) -> RunOutcome {
    let mut seeder = StdRng::seed_from_u64(seed);
    let net_rng = StdRng::seed_from_u64(seeder.next_u64());
    let mut net = Network::build(cfg, net_rng);
    let mut sim = Scheduler::new();

    seed_transactions(cfg, &mut sim, &mut seeder, cfg.total_num_transactions());
    log::info!("{} transactions scheduled", cfg.total_num_transactions());
    let counters = register_driver_hooks(cfg, &mut sim, net.len(), &mut seeder);

    log::info!("simulation started (seed {seed})");
    sim.run(&mut net);
    log::info!("simulation ended at {:.3} ms", sim.clock());

    RunOutcome {
        report: SimulationReport::from_network(&net),
        txns_broadcast: counters.txns_broadcast.load(Ordering::Relaxed),
        blocks_broadcast: counters.blocks_broadcast.load(Ordering::Relaxed),
        sim_time_ms: sim.clock(),
    }
}

/// Seed `count` TXN_CREATE events at exponential inter-arrival times,
/// each assigned to a uniformly random peer.
pub fn seed_transactions(cfg: &SimConfig, sim: &mut Scheduler, rng: &mut StdRng, count: usize) {
    let n = cfg.number_of_peers;
    let mut at = 0.0;
    for _ in 0..count {
        let peer = PeerId(rng.gen_range(0..n));
        sim.enqueue(Event::new(
            EventKind::TxnCreate,
            at,
            0.0,
            Action::CreateTxn { peer },
            format!("{peer} create_txn"),
        ));
        at += sampling::exponential(rng, cfg.avg_txn_interval_time);
    }
}

/// The driver's hooks: mining activity resets the free-transaction
/// window; broadcast counts feed the stop rule; a quiet network gets a
/// BLOCK_CREATE nudge for a random peer at `clock + 10` ms, strictly
/// later than any event firing now.
pub fn register_driver_hooks(
    cfg: &SimConfig,
    sim: &mut Scheduler,
    peer_count: usize,
    rng: &mut StdRng,
) -> HookCounters {
    let free_txns = Arc::new(AtomicU64::new(0));
    let txns_broadcast = Arc::new(AtomicU64::new(0));
    let blocks_broadcast = Arc::new(AtomicU64::new(0));

    {
        let free_txns = free_txns.clone();
        sim.register_hook(
            HookPhase::PostEnqueue,
            Box::new(move |_clock, event, _control| {
                if matches!(
                    event.kind,
                    EventKind::BlockBroadcast
                        | EventKind::BlockMineFinish
                        | EventKind::BlockMineStart
                ) {
                    free_txns.store(0, Ordering::Relaxed);
                }
            }),
        );
    }

    {
        let free_txns = free_txns.clone();
        let txns_broadcast = txns_broadcast.clone();
        let blocks_broadcast = blocks_broadcast.clone();
        let stop_after = cfg.target_num_blocks as u64 + 5;
        let quiet_limit = 5 * cfg.block_txns_trigger_threshold() as u64;
        let mut hook_rng = StdRng::seed_from_u64(rng.next_u64());
        sim.register_hook(
            HookPhase::PostRun,
            Box::new(move |clock, event, control| {
                match event.kind {
                    EventKind::TxnBroadcast => {
                        free_txns.fetch_add(1, Ordering::Relaxed);
                        txns_broadcast.fetch_add(1, Ordering::Relaxed);
                    }
                    EventKind::BlockBroadcast => {
                        blocks_broadcast.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
                if blocks_broadcast.load(Ordering::Relaxed) > stop_after {
                    control.request_stop();
                }
                if free_txns.load(Ordering::Relaxed) > quiet_limit {
                    let peer = PeerId(hook_rng.gen_range(0..peer_count));
                    control.enqueue(Event::new(
                        EventKind::BlockCreate,
                        clock,
                        10.0,
                        Action::GenerateBlock { peer },
                        format!("{peer} create_block"),
                    ));
                    free_txns.store(0, Ordering::Relaxed);
                }
            }),
        );
    }

    HookCounters {
        txns_broadcast,
        blocks_broadcast,
    }
}

/// One right-aligned key per line, derived values included.
pub fn print_parameters(cfg: &SimConfig) {
    println!("Simulation parameters:");
    for (key, value) in cfg.parameter_rows() {
        println!("{key:>32}: {value}");
    }
}

pub fn print_summary(outcome: &RunOutcome) {
    let ratios = &outcome.report.ratios;
    println!("Simulation ended at {:.3} ms", outcome.sim_time_ms);
    println!("  transactions broadcast: {}", outcome.txns_broadcast);
    println!("  blocks broadcast: {}", outcome.blocks_broadcast);
    println!("Mean longest-chain contribution (%):");
    println!("  slow cpu, slow net: {:6.2}", ratios.cpu_slow.net_slow);
    println!("  slow cpu, fast net: {:6.2}", ratios.cpu_slow.net_fast);
    println!("  fast cpu, slow net: {:6.2}", ratios.cpu_fast.net_slow);
    println!("  fast cpu, fast net: {:6.2}", ratios.cpu_fast.net_fast);
}

/// Write `config.json` and `results.json` under a timestamped output
/// directory when saving is enabled. Returns the directory written.
pub fn export_results(cfg: &SimConfig, report: &SimulationReport) -> Result<Option<PathBuf>> {
    if !cfg.save_results {
        return Ok(None);
    }
    let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
    let dir = cfg.output_dir_resolved().join(stamp.to_string());
    fs::create_dir_all(&dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;
    let config_json = serde_json::to_string_pretty(&cfg.export_json())?;
    fs::write(dir.join("config.json"), config_json)?;
    report.write_json(&dir.join("results.json"))?;
    log::info!("results exported to {}", dir.display());
    Ok(Some(dir))
}
