use crate::peer::PeerId;
use crate::sampling;
use rand::Rng;
use std::fmt;

/// Subsidy minted to the miner by the coinbase of every block.
pub const COINBASE_AMOUNT: f64 = 50.0;

/// Every transaction occupies one kilobyte on the wire.
pub const TXN_SIZE_KB: f64 = 1.0;

pub type TxnId = String;

/// A transfer between two peers. Immutable after construction.
///
/// `from` is `None` only for the coinbase variant, which is appended by
/// the miner once mining succeeds, never before.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: TxnId,
    pub from: Option<PeerId>,
    pub to: PeerId,
    pub amount: f64,
    pub timestamp: f64,
}

impl Transaction {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        from: PeerId,
        to: PeerId,
        amount: f64,
        timestamp: f64,
    ) -> Self {
        Transaction {
            id: sampling::random_id(rng, 8),
            from: Some(from),
            to,
            amount,
            timestamp,
        }
    }

    /// Coinbase minting [`COINBASE_AMOUNT`] to the miner.
    pub fn coinbase<R: Rng + ?Sized>(rng: &mut R, to: PeerId, timestamp: f64) -> Self {
        Transaction {
            id: sampling::random_id(rng, 8),
            from: None,
            to,
            amount: COINBASE_AMOUNT,
            timestamp,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.from.is_none()
    }

    pub fn size_kb(&self) -> f64 {
        TXN_SIZE_KB
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_coinbase() {
            write!(f, "Coinbase(id={})", self.id)
        } else {
            write!(f, "Txn(id={})", self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn coinbase_has_no_sender_and_fixed_amount() {
        let mut rng = StdRng::seed_from_u64(1);
        let cb = Transaction::coinbase(&mut rng, PeerId(3), 12.0);
        assert!(cb.is_coinbase());
        assert_eq!(cb.amount, COINBASE_AMOUNT);
        assert_eq!(cb.to, PeerId(3));
    }

    #[test]
    fn regular_transaction_keeps_sender() {
        let mut rng = StdRng::seed_from_u64(1);
        let txn = Transaction::new(&mut rng, PeerId(0), PeerId(1), 12.5, 100.0);
        assert!(!txn.is_coinbase());
        assert_eq!(txn.from, Some(PeerId(0)));
        assert_eq!(txn.size_kb(), 1.0);
    }
}
