use crate::peer::PeerId;
use crate::sampling;
use crate::transaction::Transaction;
use once_cell::sync::Lazy;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

pub type BlockId = String;

pub const GENESIS_ID: &str = "genesis";

/// The genesis block shared by every peer's tree. Immutable, so a
/// process-wide singleton is safe; each engine keeps its own tree-side
/// metadata keyed by block id.
static GENESIS: Lazy<Arc<Block>> = Lazy::new(|| {
    Arc::new(Block::assemble(
        GENESIS_ID.to_string(),
        None,
        None,
        Vec::new(),
        None,
        0.0,
    ))
});

pub fn genesis_block() -> Arc<Block> {
    GENESIS.clone()
}

/// A block of the tree. Immutable after construction; equality is by
/// opaque id, the hash is an unforged label over the header.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub parent: Option<BlockId>,
    pub parent_hash: Option<String>,
    pub transactions: Vec<Arc<Transaction>>,
    pub miner: Option<PeerId>,
    pub timestamp: f64,
    pub hash: String,
}

impl Block {
    /// Candidate block on top of `parent`, mined by `miner`.
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        parent: &Block,
        transactions: Vec<Arc<Transaction>>,
        miner: PeerId,
        timestamp: f64,
    ) -> Self {
        Self::assemble(
            sampling::random_id(rng, 6),
            Some(parent.id.clone()),
            Some(parent.hash.clone()),
            transactions,
            Some(miner),
            timestamp,
        )
    }

    /// Rebuild this candidate with the coinbase appended. The id is
    /// preserved; the hash label covers the final transaction list.
    pub fn with_coinbase(&self, coinbase: Transaction) -> Self {
        let mut transactions = self.transactions.clone();
        transactions.push(Arc::new(coinbase));
        Self::assemble(
            self.id.clone(),
            self.parent.clone(),
            self.parent_hash.clone(),
            transactions,
            self.miner,
            self.timestamp,
        )
    }

    fn assemble(
        id: BlockId,
        parent: Option<BlockId>,
        parent_hash: Option<String>,
        transactions: Vec<Arc<Transaction>>,
        miner: Option<PeerId>,
        timestamp: f64,
    ) -> Self {
        let header = Self::header_string(&id, parent_hash.as_deref(), timestamp, &transactions);
        let hash = hex::encode(Sha256::digest(header.as_bytes()));
        Block {
            id,
            parent,
            parent_hash,
            transactions,
            miner,
            timestamp,
            hash,
        }
    }

    fn header_string(
        id: &str,
        parent_hash: Option<&str>,
        timestamp: f64,
        transactions: &[Arc<Transaction>],
    ) -> String {
        let txn_ids: String = transactions.iter().map(|t| t.id.as_str()).collect();
        format!("{}-{}-{}-{}", id, parent_hash.unwrap_or("none"), timestamp, txn_ids)
    }

    pub fn is_genesis(&self) -> bool {
        self.parent.is_none()
    }

    pub fn num_txns(&self) -> usize {
        self.transactions.len()
    }

    /// Size in kB: one per transaction plus one for the header.
    pub fn size_kb(&self) -> f64 {
        (self.num_txns() + 1) as f64
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block(id={})", self.id)
    }
}
