use crate::block::{Block, BlockId, genesis_block};
use crate::event::{Action, Event, EventKind, Scheduler};
use crate::message::Message;
use crate::peer::PeerId;
use crate::sampling;
use crate::transaction::Transaction;
use powsim_config::config::SimConfig;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Why a block was not accepted. Rejections are expected outcomes:
/// they are logged and counted, never propagated as fatal errors, and
/// the sender does not learn of the drop.
#[derive(Debug, Error)]
pub enum BlockRejection {
    #[error("previous block {parent} not known locally")]
    MissingParent { parent: BlockId },
    #[error("block already in tree")]
    AlreadyAccepted,
    #[error("transaction {txn} overdraws its sender")]
    InsufficientBalance { txn: String },
    #[error("transaction {txn} already on this branch")]
    DuplicateTransaction { txn: String },
}

/// One peer's view of the block tree.
///
/// Branch state (length, balances, transaction set) is kept per
/// accepted block, keyed by opaque block id, so sibling branches stay
/// independent and the orphan rescan needs no back-pointers. The
/// engine is the sole writer of its own maps; blocks themselves are
/// shared read-only.
pub struct BlockTree {
    owner: PeerId,
    hash_share: f64,
    /// Mean block interval, ms. Constant for the whole run.
    avg_interval_time: f64,
    min_txns: usize,
    trigger_txns: usize,

    blocks: HashMap<BlockId, Arc<Block>>,
    arrival_time: HashMap<BlockId, f64>,
    branch_length: HashMap<BlockId, u64>,
    branch_balance: HashMap<BlockId, HashMap<PeerId, f64>>,
    branch_txns: HashMap<BlockId, HashSet<String>>,
    pending_txns: Vec<Arc<Transaction>>,
    orphans: Vec<Arc<Block>>,
    mining: Vec<Block>,
    longest_leaf: BlockId,
    longest_length: u64,
    pending_generate: bool,
    num_generated_blocks: u64,
}

impl BlockTree {
    pub fn new(owner: PeerId, hash_share: f64, peers: &[PeerId], cfg: &SimConfig) -> Self {
        let genesis = genesis_block();
        let mut tree = BlockTree {
            owner,
            hash_share,
            avg_interval_time: cfg.avg_block_mining_time,
            min_txns: cfg.block_txns_min_threshold(),
            trigger_txns: cfg.block_txns_trigger_threshold(),
            blocks: HashMap::new(),
            arrival_time: HashMap::new(),
            branch_length: HashMap::new(),
            branch_balance: HashMap::new(),
            branch_txns: HashMap::new(),
            pending_txns: Vec::new(),
            orphans: Vec::new(),
            mining: Vec::new(),
            longest_leaf: genesis.id.clone(),
            longest_length: 1,
            pending_generate: false,
            num_generated_blocks: 0,
        };
        let balances: HashMap<PeerId, f64> =
            peers.iter().map(|&p| (p, cfg.initial_coins)).collect();
        tree.branch_length.insert(genesis.id.clone(), 1);
        tree.branch_balance.insert(genesis.id.clone(), balances);
        tree.branch_txns.insert(genesis.id.clone(), HashSet::new());
        tree.arrival_time.insert(genesis.id.clone(), 0.0);
        tree.blocks.insert(genesis.id.clone(), genesis);
        tree
    }

    /// Register a received (or self-created) transaction. A deferred
    /// mining attempt is released once enough transactions are pending;
    /// the owner's own transactions never trigger it.
    pub fn add_transaction<R: Rng + ?Sized>(
        &mut self,
        txn: Arc<Transaction>,
        sim: &mut Scheduler,
        rng: &mut R,
    ) {
        self.pending_txns.push(txn.clone());
        if txn.from == Some(self.owner) {
            return;
        }
        if self.pending_generate && self.pending_txns.len() >= self.trigger_txns {
            self.pending_generate = false;
            self.generate_block(sim, rng);
        }
    }

    /// Validate and insert a block received from the network. A block
    /// with an unknown parent is buffered for retry; every other
    /// rejection drops it silently. Returns whether the block entered
    /// the tree.
    pub fn add_block<R: Rng + ?Sized>(
        &mut self,
        block: Arc<Block>,
        sim: &mut Scheduler,
        rng: &mut R,
    ) -> bool {
        match self.validate(&block) {
            Ok(()) => {
                self.admit(block, sim, rng);
                true
            }
            Err(reason @ BlockRejection::MissingParent { .. }) => {
                log::debug!("{} block buffered {}: {}", self.owner, block, reason);
                self.orphans.push(block);
                false
            }
            Err(reason) => {
                log::debug!("{} block dropped {}: {}", self.owner, block, reason);
                false
            }
        }
    }

    fn validate(&self, block: &Block) -> Result<(), BlockRejection> {
        // Only genesis is parentless, and genesis is always present.
        let Some(parent_id) = block.parent.as_ref() else {
            return Err(BlockRejection::AlreadyAccepted);
        };
        if !self.blocks.contains_key(parent_id) {
            return Err(BlockRejection::MissingParent {
                parent: parent_id.clone(),
            });
        }
        if self.blocks.contains_key(&block.id) {
            return Err(BlockRejection::AlreadyAccepted);
        }
        let balances = &self.branch_balance[parent_id];
        let branch_txns = &self.branch_txns[parent_id];
        for txn in &block.transactions {
            if let Some(from) = txn.from {
                let funds = balances.get(&from).copied().unwrap_or(0.0);
                if funds < txn.amount {
                    return Err(BlockRejection::InsufficientBalance {
                        txn: txn.id.clone(),
                    });
                }
            }
            if branch_txns.contains(&txn.id) {
                return Err(BlockRejection::DuplicateTransaction {
                    txn: txn.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Insert a validated block, retry the orphan buffer once, and for
    /// everything that entered extend the longest chain and restart
    /// mining where it grew.
    fn admit<R: Rng + ?Sized>(&mut self, block: Arc<Block>, sim: &mut Scheduler, rng: &mut R) {
        self.insert(&block, sim.clock());
        let mut admitted = vec![block];

        // Single pass: an orphan whose parent arrived in this very pass
        // is picked up only if it sits later in the buffer; the rest
        // stay buffered for the next call.
        let buffered = std::mem::take(&mut self.orphans);
        for orphan in buffered {
            match self.validate(&orphan) {
                Ok(()) => {
                    self.insert(&orphan, sim.clock());
                    admitted.push(orphan);
                }
                Err(BlockRejection::MissingParent { .. }) => self.orphans.push(orphan),
                Err(reason) => {
                    log::debug!("{} orphan dropped {}: {}", self.owner, orphan, reason);
                }
            }
        }

        for accepted in admitted {
            let length = self.branch_length[&accepted.id];
            if length > self.longest_length {
                log::debug!(
                    "{} longest chain {} -> {} at {}",
                    self.owner,
                    self.longest_length,
                    length,
                    accepted
                );
                self.longest_length = length;
                self.longest_leaf = accepted.id.clone();
                self.generate_block(sim, rng);
            }
        }
    }

    fn insert(&mut self, block: &Arc<Block>, clock: f64) {
        for txn in &block.transactions {
            if txn.is_coinbase() {
                continue;
            }
            if let Some(pos) = self.pending_txns.iter().position(|p| p.id == txn.id) {
                self.pending_txns.remove(pos);
            }
        }

        let Some(parent_id) = block.parent.as_ref() else {
            return;
        };
        let mut balances = self.branch_balance[parent_id].clone();
        for txn in &block.transactions {
            if let Some(from) = txn.from {
                *balances.entry(from).or_insert(0.0) -= txn.amount;
            }
            *balances.entry(txn.to).or_insert(0.0) += txn.amount;
        }
        let mut branch_txns = self.branch_txns[parent_id].clone();
        branch_txns.extend(block.transactions.iter().map(|t| t.id.clone()));

        let length = self.branch_length[parent_id] + 1;
        self.branch_length.insert(block.id.clone(), length);
        self.branch_balance.insert(block.id.clone(), balances);
        self.branch_txns.insert(block.id.clone(), branch_txns);
        self.arrival_time.insert(block.id.clone(), clock);
        self.blocks.insert(block.id.clone(), block.clone());
        log::debug!("{} <{}> {}", self.owner, EventKind::BlockAccepted, block);
    }

    /// Assemble a candidate on the longest leaf from the spendable
    /// pending transactions, in arrival order. Too few survivors latch
    /// the deferral flag instead of mining.
    pub fn generate_block<R: Rng + ?Sized>(&mut self, sim: &mut Scheduler, rng: &mut R) {
        let mut balances = self.branch_balance[&self.longest_leaf].clone();
        let mut selected = Vec::new();
        for txn in &self.pending_txns {
            let Some(from) = txn.from else { continue };
            let funds = balances.get(&from).copied().unwrap_or(0.0);
            if funds < txn.amount {
                continue;
            }
            *balances.entry(from).or_insert(0.0) -= txn.amount;
            *balances.entry(txn.to).or_insert(0.0) += txn.amount;
            selected.push(txn.clone());
        }

        if selected.len() < self.min_txns {
            log::debug!(
                "{} only {} spendable txns (minimum {}), deferring block attempt",
                self.owner,
                selected.len(),
                self.min_txns
            );
            self.pending_generate = true;
            return;
        }

        let parent = self.blocks[&self.longest_leaf].clone();
        let candidate = Block::new(rng, &parent, selected, self.owner, sim.clock());
        log::debug!("{} <{}> {}", self.owner, EventKind::BlockCreate, candidate);
        let detail = format!("attempt to mine {}", candidate);
        let block_id = candidate.id.clone();
        self.mining.push(candidate);
        sim.enqueue(Event::new(
            EventKind::BlockMineStart,
            sim.clock(),
            0.0,
            Action::MineStart {
                peer: self.owner,
                block: block_id,
            },
            detail,
        ));
    }

    /// BLOCK_MINE_START: sample the hashing-power-scaled delay and
    /// schedule the finish.
    pub fn mine_start<R: Rng + ?Sized>(&mut self, block_id: &str, sim: &mut Scheduler, rng: &mut R) {
        if !self.mining.iter().any(|b| b.id == block_id) {
            return;
        }
        let delay = sampling::exponential(rng, self.avg_interval_time / self.hash_share);
        let detail = format!("mining finishes for block {}", block_id);
        sim.enqueue(Event::new(
            EventKind::BlockMineFinish,
            sim.clock(),
            delay,
            Action::MineFinish {
                peer: self.owner,
                block: block_id.to_string(),
            },
            detail,
        ));
    }

    /// BLOCK_MINE_FINISH: the candidate wins only if the longest leaf
    /// is still its parent and it still validates. Winners get the
    /// coinbase appended, enter the tree and are flooded; losers are
    /// discarded. Both count as generated.
    pub fn mine_finish<R: Rng + ?Sized>(
        &mut self,
        block_id: &str,
        sim: &mut Scheduler,
        rng: &mut R,
    ) {
        let Some(pos) = self.mining.iter().position(|b| b.id == block_id) else {
            return;
        };
        let candidate = self.mining.remove(pos);
        self.num_generated_blocks += 1;

        let on_longest = candidate.parent.as_deref() == Some(self.longest_leaf.as_str());
        if on_longest && self.validate(&candidate).is_ok() {
            log::debug!(
                "{} <{}> {}",
                self.owner,
                EventKind::BlockMineSuccess,
                candidate
            );
            let coinbase = Transaction::coinbase(rng, self.owner, candidate.timestamp);
            let block = Arc::new(candidate.with_coinbase(coinbase));
            let detail = format!("{}->* broadcast {}", self.owner, block);
            let msg = Message::Block(block.clone());
            self.admit(block, sim, rng);
            sim.enqueue(Event::new(
                EventKind::BlockBroadcast,
                sim.clock(),
                0.0,
                Action::Broadcast {
                    peer: self.owner,
                    msg,
                },
                detail,
            ));
        } else {
            log::debug!("{} <{}> {}", self.owner, EventKind::BlockMineFail, candidate);
        }
    }

    // ---- inspection -------------------------------------------------

    pub fn owner(&self) -> PeerId {
        self.owner
    }

    pub fn blocks(&self) -> &HashMap<BlockId, Arc<Block>> {
        &self.blocks
    }

    pub fn block(&self, id: &str) -> Option<&Arc<Block>> {
        self.blocks.get(id)
    }

    pub fn has_block(&self, id: &str) -> bool {
        self.blocks.contains_key(id)
    }

    pub fn arrival_times(&self) -> &HashMap<BlockId, f64> {
        &self.arrival_time
    }

    pub fn branch_length(&self, id: &str) -> Option<u64> {
        self.branch_length.get(id).copied()
    }

    pub fn branch_balance(&self, id: &str) -> Option<&HashMap<PeerId, f64>> {
        self.branch_balance.get(id)
    }

    pub fn longest_leaf(&self) -> &BlockId {
        &self.longest_leaf
    }

    pub fn longest_length(&self) -> u64 {
        self.longest_length
    }

    pub fn num_generated_blocks(&self) -> u64 {
        self.num_generated_blocks
    }

    pub fn pending_count(&self) -> usize {
        self.pending_txns.len()
    }

    pub fn generate_deferred(&self) -> bool {
        self.pending_generate
    }

    pub fn mining_ids(&self) -> Vec<BlockId> {
        self.mining.iter().map(|b| b.id.clone()).collect()
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Root-to-leaf path of the longest chain, genesis first.
    pub fn longest_chain(&self) -> Vec<BlockId> {
        let mut chain = Vec::new();
        let mut cursor = Some(self.longest_leaf.clone());
        while let Some(id) = cursor {
            cursor = self.blocks[&id].parent.clone();
            chain.push(id);
        }
        chain.reverse();
        chain
    }

    /// Blocks without children.
    pub fn leaves(&self) -> Vec<BlockId> {
        let parents: HashSet<&BlockId> = self
            .blocks
            .values()
            .filter_map(|b| b.parent.as_ref())
            .collect();
        let mut leaves: Vec<BlockId> = self
            .blocks
            .keys()
            .filter(|id| !parents.contains(id))
            .cloned()
            .collect();
        leaves.sort();
        leaves
    }

    /// Blocks with more than one child, with their child counts.
    pub fn forks(&self) -> Vec<(BlockId, usize)> {
        let mut children: HashMap<&BlockId, usize> = HashMap::new();
        for block in self.blocks.values() {
            if let Some(parent) = block.parent.as_ref() {
                *children.entry(parent).or_insert(0) += 1;
            }
        }
        let mut forks: Vec<(BlockId, usize)> = children
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(id, n)| (id.clone(), n))
            .collect();
        forks.sort();
        forks
    }

    /// Every root-to-leaf path, as (leaf, length).
    pub fn branches(&self) -> Vec<(BlockId, u64)> {
        self.leaves()
            .into_iter()
            .map(|leaf| {
                let length = self.branch_length[&leaf];
                (leaf, length)
            })
            .collect()
    }

    /// Percentage of this peer's generated blocks that ended up on the
    /// longest chain, rounded to two decimals; zero when nothing was
    /// generated.
    pub fn longest_chain_contribution(&self) -> f64 {
        if self.num_generated_blocks == 0 {
            return 0.0;
        }
        let own = self
            .longest_chain()
            .iter()
            .filter(|id| self.blocks[*id].miner == Some(self.owner))
            .count();
        (own as f64 / self.num_generated_blocks as f64 * 10_000.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::GENESIS_ID;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn cfg() -> SimConfig {
        SimConfig {
            number_of_peers: 3,
            txn_per_block: 2,
            ..SimConfig::default()
        }
    }

    fn peers() -> Vec<PeerId> {
        vec![PeerId(0), PeerId(1), PeerId(2)]
    }

    fn tree_for(owner: usize) -> BlockTree {
        BlockTree::new(PeerId(owner), 1.0, &peers(), &cfg())
    }

    fn txn(rng: &mut StdRng, from: usize, to: usize, amount: f64) -> Arc<Transaction> {
        Arc::new(Transaction::new(
            rng,
            PeerId(from),
            PeerId(to),
            amount,
            0.0,
        ))
    }

    fn foreign_block(rng: &mut StdRng, parent: &Block, miner: usize) -> Arc<Block> {
        Arc::new(Block::new(rng, parent, Vec::new(), PeerId(miner), 1.0))
    }

    #[test]
    fn starts_from_genesis_with_seeded_balances() {
        let tree = tree_for(0);
        assert_eq!(tree.longest_length(), 1);
        assert_eq!(tree.longest_leaf(), GENESIS_ID);
        assert_eq!(tree.branch_length(GENESIS_ID), Some(1));
        let balances = tree.branch_balance(GENESIS_ID).unwrap();
        assert_eq!(balances.len(), 3);
        assert!(balances.values().all(|&b| b == 1000.0));
    }

    #[test]
    fn own_transaction_never_triggers_mining() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        // latch the deferral first
        tree.generate_block(&mut sim, &mut rng);
        assert!(tree.generate_deferred());

        tree.add_transaction(txn(&mut rng, 0, 1, 5.0), &mut sim, &mut rng);
        tree.add_transaction(txn(&mut rng, 0, 2, 5.0), &mut sim, &mut rng);
        assert_eq!(tree.pending_count(), 2);
        assert!(tree.generate_deferred());
        assert!(sim.is_empty());
    }

    #[test]
    fn deferred_attempt_releases_at_trigger_threshold() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        tree.generate_block(&mut sim, &mut rng);
        assert!(tree.generate_deferred());

        tree.add_transaction(txn(&mut rng, 1, 2, 5.0), &mut sim, &mut rng);
        assert!(tree.generate_deferred());
        tree.add_transaction(txn(&mut rng, 2, 1, 5.0), &mut sim, &mut rng);
        assert!(!tree.generate_deferred());
        assert_eq!(tree.mining_ids().len(), 1);
        assert_eq!(sim.len(), 1);
    }

    #[test]
    fn too_few_spendable_txns_defers_instead_of_mining() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        // one spendable txn is below the minimum of two
        tree.add_transaction(txn(&mut rng, 1, 2, 5.0), &mut sim, &mut rng);
        tree.generate_block(&mut sim, &mut rng);
        assert!(tree.generate_deferred());
        assert!(tree.mining_ids().is_empty());
        assert!(sim.is_empty());
    }

    #[test]
    fn generate_skips_overdrawing_transactions() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        // P1 holds 1000: the second spend of 600 must be skipped
        tree.add_transaction(txn(&mut rng, 1, 2, 600.0), &mut sim, &mut rng);
        tree.add_transaction(txn(&mut rng, 1, 2, 600.0), &mut sim, &mut rng);
        tree.add_transaction(txn(&mut rng, 2, 1, 5.0), &mut sim, &mut rng);
        tree.generate_block(&mut sim, &mut rng);

        let mining = tree.mining_ids();
        assert_eq!(mining.len(), 1);
        tree.mine_start(&mining[0], &mut sim, &mut rng);
        tree.mine_finish(&mining[0], &mut sim, &mut rng);

        let leaf = tree.longest_leaf().clone();
        let block = tree.block(&leaf).unwrap();
        // two spends survived, plus the coinbase
        assert_eq!(block.num_txns(), 3);
        let balances = tree.branch_balance(&leaf).unwrap();
        assert_eq!(balances[&PeerId(1)], 1000.0 - 600.0 + 5.0);
    }

    #[test]
    fn mined_block_gets_coinbase_and_broadcast() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        tree.add_transaction(txn(&mut rng, 1, 2, 10.0), &mut sim, &mut rng);
        tree.add_transaction(txn(&mut rng, 2, 1, 5.0), &mut sim, &mut rng);
        tree.generate_block(&mut sim, &mut rng);
        let mining = tree.mining_ids();
        assert_eq!(mining.len(), 1);

        tree.mine_start(&mining[0], &mut sim, &mut rng);
        tree.mine_finish(&mining[0], &mut sim, &mut rng);

        assert_eq!(tree.num_generated_blocks(), 1);
        assert_eq!(tree.longest_length(), 2);
        let leaf = tree.longest_leaf().clone();
        let block = tree.block(&leaf).unwrap();
        assert_eq!(block.num_txns(), 3);
        assert!(block.transactions.last().unwrap().is_coinbase());
        assert_eq!(block.miner, Some(PeerId(0)));

        // miner credited with the subsidy
        let balances = tree.branch_balance(&leaf).unwrap();
        assert_eq!(balances[&PeerId(0)], 1050.0);

        // conservation: total supply grew by exactly one subsidy
        let total: f64 = balances.values().sum();
        assert!((total - (3.0 * 1000.0 + 50.0)).abs() < 1e-9);

        // pending transactions were consumed by the block
        assert_eq!(tree.pending_count(), 0);
    }

    #[test]
    fn losing_the_mining_race_discards_the_candidate() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        tree.add_transaction(txn(&mut rng, 1, 2, 10.0), &mut sim, &mut rng);
        tree.add_transaction(txn(&mut rng, 2, 1, 5.0), &mut sim, &mut rng);
        tree.generate_block(&mut sim, &mut rng);
        let candidate = tree.mining_ids().remove(0);

        // a competing block lands first and moves the longest leaf
        let genesis = genesis_block();
        let rival = foreign_block(&mut rng, &genesis, 1);
        assert!(tree.add_block(rival.clone(), &mut sim, &mut rng));
        assert_eq!(tree.longest_leaf(), &rival.id);

        tree.mine_finish(&candidate, &mut sim, &mut rng);
        assert_eq!(tree.num_generated_blocks(), 1);
        assert!(!tree.has_block(&candidate));
        assert_eq!(tree.longest_length(), 2);
    }

    #[test]
    fn orphan_is_held_until_its_parent_arrives() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        let genesis = genesis_block();
        let b1 = foreign_block(&mut rng, &genesis, 1);
        let b2 = foreign_block(&mut rng, &b1, 2);

        assert!(!tree.add_block(b2.clone(), &mut sim, &mut rng));
        assert!(!tree.has_block(&b2.id));
        assert_eq!(tree.orphan_count(), 1);

        assert!(tree.add_block(b1.clone(), &mut sim, &mut rng));
        assert!(tree.has_block(&b1.id));
        assert!(tree.has_block(&b2.id));
        assert_eq!(tree.orphan_count(), 0);
        assert_eq!(tree.branch_length(&b2.id), Some(3));
        assert_eq!(tree.longest_leaf(), &b2.id);
        assert_eq!(tree.longest_length(), 3);
    }

    #[test]
    fn orphan_rescan_is_single_pass_in_buffer_order() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        let genesis = genesis_block();
        let b1 = foreign_block(&mut rng, &genesis, 1);
        let b2 = foreign_block(&mut rng, &b1, 2);
        let b3 = foreign_block(&mut rng, &b2, 1);

        // b3 buffered ahead of b2: one pass admits b2 only
        tree.add_block(b3.clone(), &mut sim, &mut rng);
        tree.add_block(b2.clone(), &mut sim, &mut rng);
        assert_eq!(tree.orphan_count(), 2);

        tree.add_block(b1.clone(), &mut sim, &mut rng);
        assert!(tree.has_block(&b2.id));
        assert!(!tree.has_block(&b3.id));
        assert_eq!(tree.orphan_count(), 1);
    }

    #[test]
    fn duplicate_spend_across_branches_is_allowed_within_one_rejected() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        let genesis = genesis_block();
        let spend = txn(&mut rng, 1, 2, 1000.0);
        let b1 = Arc::new(Block::new(
            &mut rng,
            &genesis,
            vec![spend.clone()],
            PeerId(1),
            1.0,
        ));
        let b1_sibling = Arc::new(Block::new(
            &mut rng,
            &genesis,
            vec![spend.clone()],
            PeerId(2),
            1.0,
        ));

        // both siblings may carry the same spend
        assert!(tree.add_block(b1.clone(), &mut sim, &mut rng));
        assert!(tree.add_block(b1_sibling.clone(), &mut sim, &mut rng));

        // but repeating it deeper on the same branch must fail
        let b2 = Arc::new(Block::new(&mut rng, &b1, vec![spend.clone()], PeerId(1), 2.0));
        assert!(!tree.add_block(b2.clone(), &mut sim, &mut rng));
        assert!(!tree.has_block(&b2.id));
        // not an orphan either: its parent is known
        assert_eq!(tree.orphan_count(), 0);
    }

    #[test]
    fn overdrawing_block_is_rejected() {
        let mut rng = StdRng::seed_from_u64(10);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        let genesis = genesis_block();
        let spend = txn(&mut rng, 1, 2, 1000.5);
        let block = Arc::new(Block::new(&mut rng, &genesis, vec![spend], PeerId(1), 1.0));
        assert!(!tree.add_block(block.clone(), &mut sim, &mut rng));
        assert!(!tree.has_block(&block.id));
    }

    #[test]
    fn double_add_leaves_tree_unchanged() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        let genesis = genesis_block();
        let block = foreign_block(&mut rng, &genesis, 1);
        assert!(tree.add_block(block.clone(), &mut sim, &mut rng));
        let blocks_before = tree.blocks().len();
        let length_before = tree.longest_length();

        assert!(!tree.add_block(block.clone(), &mut sim, &mut rng));
        assert_eq!(tree.blocks().len(), blocks_before);
        assert_eq!(tree.longest_length(), length_before);
    }

    #[test]
    fn equal_length_branch_keeps_the_incumbent_leaf() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        let genesis = genesis_block();
        let first = foreign_block(&mut rng, &genesis, 1);
        let second = foreign_block(&mut rng, &genesis, 2);
        tree.add_block(first.clone(), &mut sim, &mut rng);
        tree.add_block(second.clone(), &mut sim, &mut rng);

        assert_eq!(tree.longest_leaf(), &first.id);
        assert_eq!(tree.longest_length(), 2);
        assert_eq!(tree.leaves().len(), 2);
        let forks = tree.forks();
        assert_eq!(forks.len(), 1);
        assert_eq!(forks[0], (GENESIS_ID.to_string(), 2));
    }

    #[test]
    fn branch_lengths_follow_parents() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);

        let genesis = genesis_block();
        let b1 = foreign_block(&mut rng, &genesis, 1);
        let b2 = foreign_block(&mut rng, &b1, 2);
        tree.add_block(b1.clone(), &mut sim, &mut rng);
        tree.add_block(b2.clone(), &mut sim, &mut rng);

        for (id, block) in tree.blocks() {
            match block.parent.as_ref() {
                Some(parent) => assert_eq!(
                    tree.branch_length(id),
                    tree.branch_length(parent).map(|l| l + 1)
                ),
                None => assert_eq!(tree.branch_length(id), Some(1)),
            }
        }
        assert_eq!(tree.longest_chain(), vec![
            GENESIS_ID.to_string(),
            b1.id.clone(),
            b2.id.clone()
        ]);
    }

    #[test]
    fn contribution_is_share_of_own_generated_blocks_on_longest_chain() {
        let mut rng = StdRng::seed_from_u64(14);
        let mut sim = Scheduler::new();
        let mut tree = tree_for(0);
        assert_eq!(tree.longest_chain_contribution(), 0.0);

        tree.add_transaction(txn(&mut rng, 1, 2, 10.0), &mut sim, &mut rng);
        tree.add_transaction(txn(&mut rng, 2, 1, 5.0), &mut sim, &mut rng);
        tree.generate_block(&mut sim, &mut rng);
        let candidate = tree.mining_ids().remove(0);
        tree.mine_start(&candidate, &mut sim, &mut rng);
        tree.mine_finish(&candidate, &mut sim, &mut rng);

        assert_eq!(tree.longest_chain_contribution(), 100.0);
    }
}
