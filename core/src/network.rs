use crate::event::{Action, Event, Scheduler};
use crate::link::Link;
use crate::peer::{Peer, PeerId};
use powsim_config::config::SimConfig;
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::index;
use std::collections::VecDeque;

/// The peer overlay plus the simulation's RNG. Sole owner of all peer
/// state; the scheduler hands fired events here for routing.
pub struct Network {
    peers: Vec<Peer>,
    rng: StdRng,
}

impl Network {
    /// Build the random overlay: assign slow-net/slow-cpu roles to
    /// ceil-fraction subsets, wire each peer to 4..=6 random others,
    /// and rebuild the whole graph from scratch until it is connected.
    pub fn build(cfg: &SimConfig, mut rng: StdRng) -> Self {
        loop {
            let peers = Self::try_build(cfg, &mut rng);
            if Self::is_connected(&peers) {
                let link_count: usize =
                    peers.iter().map(|p| p.neighbours.len()).sum::<usize>() / 2;
                log::info!("network built: {} peers, {} links", peers.len(), link_count);
                return Network { peers, rng };
            }
            log::debug!("overlay not connected, rebuilding from scratch");
        }
    }

    fn try_build(cfg: &SimConfig, rng: &mut StdRng) -> Vec<Peer> {
        let n = cfg.number_of_peers;
        let slow_net = Self::role_flags(rng, n, cfg.z0);
        let slow_cpu = Self::role_flags(rng, n, cfg.z1);
        let mut peers: Vec<Peer> = (0..n)
            .map(|i| Peer::new(PeerId(i), slow_net[i], slow_cpu[i], cfg))
            .collect();

        for i in 0..n {
            let degree = rng.gen_range(4..=6).min(n);
            for j in index::sample(rng, n, degree) {
                if j == i {
                    continue;
                }
                let link = Link::new(rng, PeerId(i), slow_net[i], PeerId(j), slow_net[j]);
                peers[i].connect(PeerId(j), &link);
                peers[j].connect(PeerId(i), &link);
            }
        }
        peers
    }

    /// ceil(fraction * n) random peers carry the role.
    fn role_flags(rng: &mut StdRng, n: usize, fraction: f64) -> Vec<bool> {
        let count = ((fraction * n as f64).ceil() as usize).min(n);
        let mut flags = vec![false; n];
        for i in index::sample(rng, n, count) {
            flags[i] = true;
        }
        flags
    }

    fn is_connected(peers: &[Peer]) -> bool {
        if peers.is_empty() {
            return true;
        }
        let mut visited = vec![false; peers.len()];
        let mut queue = VecDeque::from([0usize]);
        visited[0] = true;
        while let Some(i) = queue.pop_front() {
            for &PeerId(j) in peers[i].neighbours.keys() {
                if !visited[j] {
                    visited[j] = true;
                    queue.push_back(j);
                }
            }
        }
        visited.into_iter().all(|v| v)
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn peer(&self, id: PeerId) -> &Peer {
        &self.peers[id.0]
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Route a fired event to its owner.
    pub fn dispatch(&mut self, event: &Event, sim: &mut Scheduler) {
        let Network { peers, rng } = self;
        match &event.action {
            Action::CreateTxn { peer } => {
                let now = sim.clock();
                peers[peer.0].create_txn(now, sim, rng);
            }
            Action::Send { from, to, msg } => {
                if let Some(dlink) = peers[from.0].neighbours.get(to).copied() {
                    dlink.deliver(msg.clone(), sim, rng);
                }
            }
            Action::Receive { from, to, msg } => {
                peers[to.0].receive_msg(msg, *from, sim, rng);
            }
            Action::Broadcast { peer, msg } => {
                peers[peer.0].broadcast_msg(msg, sim);
            }
            Action::GenerateBlock { peer } => {
                peers[peer.0].chain.generate_block(sim, rng);
            }
            Action::MineStart { peer, block } => {
                peers[peer.0].chain.mine_start(block, sim, rng);
            }
            Action::MineFinish { peer, block } => {
                peers[peer.0].chain.mine_finish(block, sim, rng);
            }
        }
    }
}
