use crate::event::{Action, Event, EventKind, Scheduler};
use crate::message::Message;
use crate::peer::PeerId;
use crate::sampling;
use rand::Rng;

pub const SLOW_NET_MBPS: f64 = 5.0;
pub const FAST_NET_MBPS: f64 = 100.0;

/// Numerator (kbits) of the queueing-delay mean: d ~ Exp((96/8)/c).
const QUEUE_DELAY_KBITS: f64 = 96.0;

/// One direction of a link. Latency for a message of |m| kB is
/// `rho + |m|/c + d` ms with `d` resampled per message.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLink {
    pub from: PeerId,
    pub to: PeerId,
    /// Propagation delay rho, ms.
    pub rho: f64,
    /// Capacity c, kB/ms.
    pub capacity: f64,
}

impl DirectionalLink {
    fn sample_delay<R: Rng + ?Sized>(&self, rng: &mut R, msg: &Message) -> f64 {
        let queueing = sampling::exponential(rng, (QUEUE_DELAY_KBITS / 8.0) / self.capacity);
        self.rho + msg.size_kb() / self.capacity + queueing
    }

    /// Entry point for senders: a zero-delay SEND event whose firing
    /// samples the latency and schedules the RECEIVE.
    pub fn transmit(&self, msg: Message, sim: &mut Scheduler) {
        let kind = match msg {
            Message::Transaction(_) => EventKind::TxnSend,
            Message::Block(_) => EventKind::BlockSend,
        };
        let detail = format!("{}*->{}; {}", self.from, self.to, msg);
        sim.enqueue(Event::new(
            kind,
            sim.clock(),
            0.0,
            Action::Send {
                from: self.from,
                to: self.to,
                msg,
            },
            detail,
        ));
    }

    /// SEND dispatch: sample the per-message latency and schedule the
    /// delivery at the destination peer.
    pub fn deliver<R: Rng + ?Sized>(&self, msg: Message, sim: &mut Scheduler, rng: &mut R) {
        let delay = self.sample_delay(rng, &msg);
        let kind = match msg {
            Message::Transaction(_) => EventKind::TxnReceive,
            Message::Block(_) => EventKind::BlockReceive,
        };
        let detail = format!("{}->{}*; {}; delay {:.4}ms", self.from, self.to, msg, delay);
        sim.enqueue(Event::new(
            kind,
            sim.clock(),
            delay,
            Action::Receive {
                from: self.from,
                to: self.to,
                msg,
            },
            detail,
        ));
    }
}

/// Undirected channel between two peers: a shared propagation delay
/// rho ~ U[10, 501] ms and a shared capacity (5 Mbps when either
/// endpoint is slow-net, else 100 Mbps, in kB/ms) wrapped around two
/// directional links.
#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub a: PeerId,
    pub b: PeerId,
    pub rho: f64,
    pub capacity: f64,
}

impl Link {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        a: PeerId,
        a_slow_net: bool,
        b: PeerId,
        b_slow_net: bool,
    ) -> Self {
        let rho = rng.gen_range(10.0..=501.0);
        let mbps = if a_slow_net || b_slow_net {
            SLOW_NET_MBPS
        } else {
            FAST_NET_MBPS
        };
        Link {
            a,
            b,
            rho,
            capacity: mbps_to_kb_per_ms(mbps),
        }
    }

    /// The outbound direction as seen from `peer`.
    pub fn direction_from(&self, peer: PeerId) -> DirectionalLink {
        let (from, to) = if peer == self.a {
            (self.a, self.b)
        } else {
            (self.b, self.a)
        };
        DirectionalLink {
            from,
            to,
            rho: self.rho,
            capacity: self.capacity,
        }
    }
}

pub fn mbps_to_kb_per_ms(mbps: f64) -> f64 {
    mbps * 1024.0 / (8.0 * 1000.0)
}
