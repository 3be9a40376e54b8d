use crate::network::Network;
use crate::peer::Peer;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Per-block entry of a peer's tree listing.
#[derive(Debug, Serialize)]
pub struct BlockEntry {
    pub id: String,
    pub parent: Option<String>,
    pub parent_hash: Option<String>,
    pub hash: String,
    pub miner: Option<String>,
    pub timestamp: f64,
    pub num_txns: usize,
}

#[derive(Debug, Serialize)]
pub struct ArrivalEntry {
    pub block: String,
    pub arrived_at: f64,
}

#[derive(Debug, Serialize)]
pub struct NeighbourEntry {
    pub peer: String,
    pub rho_ms: f64,
    pub capacity_kb_per_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct ForkEntry {
    pub fork_at: String,
    pub num_children: usize,
}

#[derive(Debug, Serialize)]
pub struct BranchEntry {
    pub leaf: String,
    pub length: u64,
}

#[derive(Debug, Serialize)]
pub struct BranchesSummary {
    pub num_forks: usize,
    pub num_branches: usize,
    pub forks: Vec<ForkEntry>,
    pub branches: Vec<BranchEntry>,
}

#[derive(Debug, Serialize)]
pub struct PeerReport {
    pub id: String,
    pub hash_share: f64,
    pub slow_network: bool,
    pub slow_cpu: bool,
    pub coins: f64,
    pub neighbours: Vec<NeighbourEntry>,
    pub blocks: Vec<BlockEntry>,
    pub block_arrival_times: Vec<ArrivalEntry>,
    pub longest_chain_length: u64,
    pub longest_chain: Vec<String>,
    pub num_generated_blocks: u64,
    pub longest_chain_contribution: f64,
    pub branches_info: BranchesSummary,
}

#[derive(Debug, Serialize)]
pub struct RatioBuckets {
    pub net_slow: f64,
    pub net_fast: f64,
}

/// Mean longest-chain contribution per (cpu x net) bucket; zero for an
/// empty bucket.
#[derive(Debug, Serialize)]
pub struct ContributionRatios {
    pub cpu_slow: RatioBuckets,
    pub cpu_fast: RatioBuckets,
}

#[derive(Debug, Serialize)]
pub struct SummaryEntry {
    pub peer: String,
    pub hash_share: f64,
    pub slow_network: bool,
    pub slow_cpu: bool,
    pub contribution: f64,
    pub num_forks: usize,
    pub num_branches: usize,
}

/// The full reporting surface consumed by out-of-process tooling.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub peers: Vec<PeerReport>,
    pub ratios: ContributionRatios,
    pub summary: Vec<SummaryEntry>,
}

impl SimulationReport {
    pub fn from_network(net: &Network) -> Self {
        let peers: Vec<PeerReport> = net.peers().iter().map(peer_report).collect();
        let ratios = contribution_ratios(net.peers());
        let summary = net
            .peers()
            .iter()
            .map(|peer| {
                let forks = peer.chain.forks();
                let branches = peer.chain.branches();
                SummaryEntry {
                    peer: peer.id.to_string(),
                    hash_share: peer.hash_share,
                    slow_network: peer.slow_net,
                    slow_cpu: peer.slow_cpu,
                    contribution: peer.chain.longest_chain_contribution(),
                    num_forks: forks.len(),
                    num_branches: branches.len(),
                }
            })
            .collect();
        SimulationReport {
            peers,
            ratios,
            summary,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing results to {}", path.display()))?;
        Ok(())
    }
}

fn peer_report(peer: &Peer) -> PeerReport {
    let mut blocks: Vec<BlockEntry> = peer
        .chain
        .blocks()
        .values()
        .map(|block| BlockEntry {
            id: block.id.clone(),
            parent: block.parent.clone(),
            parent_hash: block.parent_hash.clone(),
            hash: block.hash.clone(),
            miner: block.miner.map(|m| m.to_string()),
            timestamp: block.timestamp,
            num_txns: block.num_txns(),
        })
        .collect();
    blocks.sort_by(|a, b| a.id.cmp(&b.id));

    let mut block_arrival_times: Vec<ArrivalEntry> = peer
        .chain
        .arrival_times()
        .iter()
        .map(|(block, &arrived_at)| ArrivalEntry {
            block: block.clone(),
            arrived_at,
        })
        .collect();
    block_arrival_times.sort_by(|a, b| {
        a.arrived_at
            .total_cmp(&b.arrived_at)
            .then_with(|| a.block.cmp(&b.block))
    });

    let neighbours: Vec<NeighbourEntry> = peer
        .neighbours
        .iter()
        .map(|(other, dlink)| NeighbourEntry {
            peer: other.to_string(),
            rho_ms: dlink.rho,
            capacity_kb_per_ms: dlink.capacity,
        })
        .collect();

    let forks = peer.chain.forks();
    let branches = peer.chain.branches();
    PeerReport {
        id: peer.id.to_string(),
        hash_share: peer.hash_share,
        slow_network: peer.slow_net,
        slow_cpu: peer.slow_cpu,
        coins: peer.coins(),
        neighbours,
        blocks,
        block_arrival_times,
        longest_chain_length: peer.chain.longest_length(),
        longest_chain: peer.chain.longest_chain(),
        num_generated_blocks: peer.chain.num_generated_blocks(),
        longest_chain_contribution: peer.chain.longest_chain_contribution(),
        branches_info: BranchesSummary {
            num_forks: forks.len(),
            num_branches: branches.len(),
            forks: forks
                .into_iter()
                .map(|(fork_at, num_children)| ForkEntry {
                    fork_at,
                    num_children,
                })
                .collect(),
            branches: branches
                .into_iter()
                .map(|(leaf, length)| BranchEntry { leaf, length })
                .collect(),
        },
    }
}

fn contribution_ratios(peers: &[Peer]) -> ContributionRatios {
    let mean = |slow_cpu: bool, slow_net: bool| -> f64 {
        let values: Vec<f64> = peers
            .iter()
            .filter(|p| p.slow_cpu == slow_cpu && p.slow_net == slow_net)
            .map(|p| p.chain.longest_chain_contribution())
            .collect();
        if values.is_empty() {
            return 0.0;
        }
        let sum: f64 = values.iter().sum();
        (sum / values.len() as f64 * 100.0).round() / 100.0
    };
    ContributionRatios {
        cpu_slow: RatioBuckets {
            net_slow: mean(true, true),
            net_fast: mean(true, false),
        },
        cpu_fast: RatioBuckets {
            net_slow: mean(false, true),
            net_fast: mean(false, false),
        },
    }
}
