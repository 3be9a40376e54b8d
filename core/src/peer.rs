use crate::blockchain::BlockTree;
use crate::event::{Action, Event, EventKind, Scheduler};
use crate::link::{DirectionalLink, Link};
use crate::message::Message;
use crate::transaction::Transaction;
use powsim_config::config::SimConfig;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Opaque peer identifier, assigned sequentially by the network
/// builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub usize);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{:02}", self.0)
    }
}

/// A network participant: a block-tree engine, an outbound link per
/// neighbour and the dedup set that keeps the flood loop-free.
pub struct Peer {
    pub id: PeerId,
    pub slow_net: bool,
    pub slow_cpu: bool,
    pub hash_share: f64,
    /// Funds knob consulted when choosing transaction amounts. Debited
    /// at creation, never credited; engine branch balances are the
    /// ground truth.
    coins: f64,
    /// neighbour -> outbound directional link (ordered, so neighbour
    /// iteration is reproducible under a fixed seed).
    pub neighbours: BTreeMap<PeerId, DirectionalLink>,
    /// Message ids this peer has already flooded.
    forwarded: HashSet<String>,
    pub chain: BlockTree,
}

impl Peer {
    pub fn new(id: PeerId, slow_net: bool, slow_cpu: bool, cfg: &SimConfig) -> Self {
        let hash_share = Self::compute_hash_share(slow_cpu, cfg);
        let peer_ids: Vec<PeerId> = (0..cfg.number_of_peers).map(PeerId).collect();
        Peer {
            id,
            slow_net,
            slow_cpu,
            hash_share,
            coins: cfg.initial_coins,
            neighbours: BTreeMap::new(),
            forwarded: HashSet::new(),
            chain: BlockTree::new(id, hash_share, &peer_ids, cfg),
        }
    }

    /// Share of total mining power: `1 / ((10 - 9*z1) * n)` for a slow
    /// CPU, ten times that otherwise, normalising aggregate share to
    /// one in expectation.
    fn compute_hash_share(slow_cpu: bool, cfg: &SimConfig) -> f64 {
        let low = 1.0 / ((10.0 - 9.0 * cfg.z1) * cfg.number_of_peers as f64);
        if slow_cpu { low } else { 10.0 * low }
    }

    pub fn connect(&mut self, other: PeerId, link: &Link) {
        self.neighbours.insert(other, link.direction_from(self.id));
    }

    pub fn coins(&self) -> f64 {
        self.coins
    }

    pub fn has_forwarded(&self, msg_id: &str) -> bool {
        self.forwarded.contains(msg_id)
    }

    /// Create a transaction to a random neighbour (to itself when it
    /// has none), fund it from the local coin knob, register it with
    /// the engine and schedule the flood.
    pub fn create_txn<R: Rng + ?Sized>(
        &mut self,
        timestamp: f64,
        sim: &mut Scheduler,
        rng: &mut R,
    ) {
        let to = if self.neighbours.is_empty() {
            self.id
        } else {
            let pick = rng.gen_range(0..self.neighbours.len());
            *self.neighbours.keys().nth(pick).unwrap_or(&self.id)
        };
        let amount = if self.coins > 0.0 {
            rng.gen_range(0.0..self.coins)
        } else {
            0.0
        };
        self.coins -= amount;

        let txn = Arc::new(Transaction::new(rng, self.id, to, amount, timestamp));
        log::debug!("{} <{}> {}", self.id, EventKind::TxnCreate, txn);
        self.chain.add_transaction(txn.clone(), sim, rng);

        let detail = format!("{}->*; {}", self.id, txn);
        sim.enqueue(Event::new(
            EventKind::TxnBroadcast,
            sim.clock(),
            0.0,
            Action::Broadcast {
                peer: self.id,
                msg: Message::Transaction(txn),
            },
            detail,
        ));
    }

    /// Deliver a message from a neighbour: drop if already seen, hand
    /// it to the engine, then relay to every other neighbour. Each
    /// message id is flooded at most once per peer.
    pub fn receive_msg<R: Rng + ?Sized>(
        &mut self,
        msg: &Message,
        source: PeerId,
        sim: &mut Scheduler,
        rng: &mut R,
    ) {
        if self.forwarded.contains(msg.id()) {
            return;
        }
        match msg {
            Message::Transaction(txn) => self.chain.add_transaction(txn.clone(), sim, rng),
            Message::Block(block) => {
                self.chain.add_block(block.clone(), sim, rng);
            }
        }
        self.forward(msg, Some(source), sim);
    }

    /// Flood an own message (a fresh transaction or a mined block) to
    /// every neighbour.
    pub fn broadcast_msg(&mut self, msg: &Message, sim: &mut Scheduler) {
        self.forward(msg, None, sim);
    }

    fn forward(&mut self, msg: &Message, except: Option<PeerId>, sim: &mut Scheduler) {
        self.forwarded.insert(msg.id().to_string());
        for (&neighbour, dlink) in &self.neighbours {
            if Some(neighbour) == except {
                continue;
            }
            dlink.transmit(msg.clone(), sim);
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer(id={})", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::genesis_block;
    use crate::block::Block;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn cfg() -> SimConfig {
        SimConfig {
            number_of_peers: 4,
            z1: 0.5,
            ..SimConfig::default()
        }
    }

    fn wire(a: &mut Peer, b: &mut Peer, rng: &mut StdRng) {
        let link = Link::new(rng, a.id, a.slow_net, b.id, b.slow_net);
        a.connect(b.id, &link);
        b.connect(a.id, &link);
    }

    #[test]
    fn hash_share_scales_ten_to_one() {
        let cfg = cfg();
        let slow = Peer::new(PeerId(0), false, true, &cfg);
        let fast = Peer::new(PeerId(1), false, false, &cfg);
        // (10 - 9*0.5) * 4 = 22
        assert!((slow.hash_share - 1.0 / 22.0).abs() < 1e-12);
        assert!((fast.hash_share - 10.0 / 22.0).abs() < 1e-12);
    }

    #[test]
    fn create_txn_funds_from_coin_knob_and_schedules_broadcast() {
        let mut rng = StdRng::seed_from_u64(21);
        let cfg = cfg();
        let mut sim = Scheduler::new();
        let mut a = Peer::new(PeerId(0), false, false, &cfg);
        let mut b = Peer::new(PeerId(1), false, false, &cfg);
        wire(&mut a, &mut b, &mut rng);

        a.create_txn(0.0, &mut sim, &mut rng);
        assert!(a.coins() <= cfg.initial_coins);
        assert!(a.coins() >= 0.0);
        assert_eq!(a.chain.pending_count(), 1);
        assert_eq!(sim.len(), 1);
    }

    #[test]
    fn isolated_peer_sends_to_itself() {
        let mut rng = StdRng::seed_from_u64(22);
        let cfg = SimConfig {
            number_of_peers: 1,
            z0: 0.0,
            z1: 0.0,
            ..SimConfig::default()
        };
        let mut sim = Scheduler::new();
        let mut lone = Peer::new(PeerId(0), false, false, &cfg);
        lone.create_txn(0.0, &mut sim, &mut rng);
        assert_eq!(lone.chain.pending_count(), 1);
    }

    #[test]
    fn message_is_forwarded_at_most_once() {
        let mut rng = StdRng::seed_from_u64(23);
        let cfg = cfg();
        let mut sim = Scheduler::new();
        let mut a = Peer::new(PeerId(0), false, false, &cfg);
        let mut b = Peer::new(PeerId(1), false, false, &cfg);
        let mut c = Peer::new(PeerId(2), false, false, &cfg);
        wire(&mut a, &mut b, &mut rng);
        wire(&mut a, &mut c, &mut rng);

        let txn = Arc::new(Transaction::new(&mut rng, PeerId(1), PeerId(2), 3.0, 0.0));
        let msg = Message::Transaction(txn);

        a.receive_msg(&msg, PeerId(1), &mut sim, &mut rng);
        // relayed to c only, not back to the source
        assert_eq!(sim.len(), 1);
        assert!(a.has_forwarded(msg.id()));

        // the echo is dropped entirely
        a.receive_msg(&msg, PeerId(2), &mut sim, &mut rng);
        assert_eq!(sim.len(), 1);
        assert_eq!(a.chain.pending_count(), 1);
    }

    #[test]
    fn received_block_reaches_the_engine() {
        let mut rng = StdRng::seed_from_u64(24);
        let cfg = cfg();
        let mut sim = Scheduler::new();
        let mut a = Peer::new(PeerId(0), false, false, &cfg);
        let mut b = Peer::new(PeerId(1), false, false, &cfg);
        wire(&mut a, &mut b, &mut rng);

        let genesis = genesis_block();
        let block = Arc::new(Block::new(&mut rng, &genesis, Vec::new(), PeerId(1), 1.0));
        let msg = Message::Block(block.clone());
        a.receive_msg(&msg, PeerId(1), &mut sim, &mut rng);
        assert!(a.chain.has_block(&block.id));
        assert_eq!(a.chain.longest_length(), 2);
    }

    #[test]
    fn broadcast_reaches_every_neighbour() {
        let mut rng = StdRng::seed_from_u64(25);
        let cfg = cfg();
        let mut sim = Scheduler::new();
        let mut a = Peer::new(PeerId(0), false, false, &cfg);
        let mut b = Peer::new(PeerId(1), false, false, &cfg);
        let mut c = Peer::new(PeerId(2), false, false, &cfg);
        wire(&mut a, &mut b, &mut rng);
        wire(&mut a, &mut c, &mut rng);

        let txn = Arc::new(Transaction::new(&mut rng, PeerId(0), PeerId(1), 3.0, 0.0));
        a.broadcast_msg(&Message::Transaction(txn), &mut sim);
        assert_eq!(sim.len(), 2);
    }
}
