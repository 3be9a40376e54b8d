pub mod block;
pub mod blockchain;
pub mod event;
pub mod link;
pub mod message;
pub mod network;
pub mod peer;
pub mod report;
pub mod sampling;
pub mod transaction;

// Explicit re-exports to avoid ambiguous glob re-exports
pub use block::{Block, BlockId, GENESIS_ID, genesis_block};
pub use blockchain::{BlockRejection, BlockTree};
pub use event::{Action, Control, Event, EventKind, Hook, HookPhase, Scheduler};
pub use link::{DirectionalLink, Link};
pub use message::Message;
pub use network::Network;
pub use peer::{Peer, PeerId};
pub use report::SimulationReport;
pub use transaction::{COINBASE_AMOUNT, Transaction, TxnId};
