use crate::block::BlockId;
use crate::message::Message;
use crate::network::Network;
use crate::peer::PeerId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

/// Every kind of event the simulation schedules or logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TxnCreate,
    TxnSend,
    TxnReceive,
    TxnBroadcast,
    BlockCreate,
    BlockSend,
    BlockReceive,
    BlockBroadcast,
    BlockAccepted,
    BlockMineStart,
    BlockMineFinish,
    BlockMineSuccess,
    BlockMineFail,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::TxnCreate => "TXN_CREATE",
            EventKind::TxnSend => "TXN_SEND",
            EventKind::TxnReceive => "TXN_RECEIVE",
            EventKind::TxnBroadcast => "TXN_BROADCAST",
            EventKind::BlockCreate => "BLOCK_CREATE",
            EventKind::BlockSend => "BLOCK_SEND",
            EventKind::BlockReceive => "BLOCK_RECEIVE",
            EventKind::BlockBroadcast => "BLOCK_BROADCAST",
            EventKind::BlockAccepted => "BLOCK_ACCEPTED",
            EventKind::BlockMineStart => "BLOCK_MINE_START",
            EventKind::BlockMineFinish => "BLOCK_MINE_FINISH",
            EventKind::BlockMineSuccess => "BLOCK_MINE_SUCCESS",
            EventKind::BlockMineFail => "BLOCK_MINE_FAIL",
        };
        f.write_str(name)
    }
}

/// What an event does when it fires. Payload only; routing lives in
/// [`Network::dispatch`].
#[derive(Debug, Clone)]
pub enum Action {
    /// The peer creates and floods a fresh transaction.
    CreateTxn { peer: PeerId },
    /// A message enters the directional link `from -> to`; firing
    /// samples the link latency and schedules the delivery.
    Send {
        from: PeerId,
        to: PeerId,
        msg: Message,
    },
    /// A message arrives at `to` from neighbour `from`.
    Receive {
        from: PeerId,
        to: PeerId,
        msg: Message,
    },
    /// The peer floods a message to every neighbour.
    Broadcast { peer: PeerId, msg: Message },
    /// The peer's engine attempts to assemble and mine a candidate.
    GenerateBlock { peer: PeerId },
    /// Sample the mining delay for a candidate.
    MineStart { peer: PeerId, block: BlockId },
    /// Mining of a candidate completed, won or lost.
    MineFinish { peer: PeerId, block: BlockId },
}

/// A scheduled unit of work, ordered by `actionable_at`.
#[derive(Debug, Clone)]
pub struct Event {
    /// Opaque id, assigned by the scheduler at enqueue time.
    pub id: u64,
    pub kind: EventKind,
    pub created_at: f64,
    pub delay: f64,
    pub actionable_at: f64,
    pub action: Action,
    /// Human-readable annotation, used only in debug logs.
    pub detail: String,
}

impl Event {
    pub fn new(
        kind: EventKind,
        created_at: f64,
        delay: f64,
        action: Action,
        detail: impl Into<String>,
    ) -> Self {
        Event {
            id: 0,
            kind,
            created_at,
            delay,
            actionable_at: created_at + delay,
            action,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event({} {} @{:.3}->{:.3} {})",
            self.id, self.kind, self.created_at, self.actionable_at, self.detail
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreEnqueue,
    PostEnqueue,
    PreRun,
    PostRun,
}

impl HookPhase {
    fn index(self) -> usize {
        match self {
            HookPhase::PreEnqueue => 0,
            HookPhase::PostEnqueue => 1,
            HookPhase::PreRun => 2,
            HookPhase::PostRun => 3,
        }
    }
}

/// Effects a hook may request; the scheduler applies them after the
/// hook returns, so hooks never touch the heap directly.
#[derive(Default)]
pub struct Control {
    stop: bool,
    followups: Vec<Event>,
}

impl Control {
    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    pub fn enqueue(&mut self, event: Event) {
        self.followups.push(event);
    }
}

/// Hooks observe the clock and the event; they run in registration
/// order within their phase.
pub type Hook = Box<dyn FnMut(f64, &Event, &mut Control)>;

/// Heap entry; `BinaryHeap` is a max-heap so the ordering is reversed,
/// with the enqueue sequence breaking actionable-time ties.
struct Scheduled {
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .event
            .actionable_at
            .total_cmp(&self.event.actionable_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Single-threaded discrete-event scheduler: a logical clock advanced
/// by a min-heap of timestamped events. Injected by reference into
/// everything that schedules, so independent simulations can coexist.
pub struct Scheduler {
    clock: f64,
    queue: BinaryHeap<Scheduled>,
    hooks: [Vec<Hook>; 4],
    next_id: u64,
    stop: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            clock: 0.0,
            queue: BinaryHeap::new(),
            hooks: [Vec::new(), Vec::new(), Vec::new(), Vec::new()],
            next_id: 0,
            stop: false,
        }
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop
    }

    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    pub fn register_hook(&mut self, phase: HookPhase, hook: Hook) {
        self.hooks[phase.index()].push(hook);
    }

    pub fn enqueue(&mut self, mut event: Event) {
        event.id = self.next_id;
        self.next_id += 1;
        self.fire_hooks(HookPhase::PreEnqueue, &event);
        log::trace!("scheduled: {}", event);
        self.queue.push(Scheduled {
            seq: event.id,
            event: event.clone(),
        });
        self.fire_hooks(HookPhase::PostEnqueue, &event);
    }

    fn fire_hooks(&mut self, phase: HookPhase, event: &Event) {
        if self.hooks[phase.index()].is_empty() {
            return;
        }
        let mut hooks = std::mem::take(&mut self.hooks[phase.index()]);
        let mut control = Control::default();
        for hook in hooks.iter_mut() {
            hook(self.clock, event, &mut control);
        }
        self.hooks[phase.index()] = hooks;
        if control.stop {
            self.stop = true;
        }
        for followup in control.followups {
            self.enqueue(followup);
        }
    }

    /// Dispatch loop: advance the clock to each event in actionable
    /// order and hand it to the network, until the queue drains or a
    /// stop is requested. The clock never moves backwards.
    pub fn run(&mut self, net: &mut Network) {
        while !self.stop {
            let Some(next) = self.queue.pop() else { break };
            let event = next.event;
            self.clock = event.actionable_at;
            self.fire_hooks(HookPhase::PreRun, &event);
            if self.stop {
                break;
            }
            match event.kind {
                EventKind::TxnSend | EventKind::BlockSend => log::trace!("running: {}", event),
                _ => log::debug!("running: {}", event),
            }
            net.dispatch(&event, self);
            self.fire_hooks(HookPhase::PostRun, &event);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    fn marker(kind: EventKind, at: f64) -> Event {
        Event::new(
            kind,
            0.0,
            at,
            Action::GenerateBlock { peer: PeerId(0) },
            "marker",
        )
    }

    #[test]
    fn heap_orders_by_actionable_time() {
        let mut sim = Scheduler::new();
        sim.enqueue(marker(EventKind::TxnCreate, 30.0));
        sim.enqueue(marker(EventKind::TxnCreate, 10.0));
        sim.enqueue(marker(EventKind::TxnCreate, 20.0));

        let mut times = Vec::new();
        while let Some(next) = sim.queue.pop() {
            times.push(next.event.actionable_at);
        }
        assert_eq!(times, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut sim = Scheduler::new();
        sim.enqueue(marker(EventKind::TxnCreate, 5.0));
        sim.enqueue(marker(EventKind::BlockCreate, 5.0));

        let first = sim.queue.pop().unwrap().event;
        let second = sim.queue.pop().unwrap().event;
        assert_eq!(first.kind, EventKind::TxnCreate);
        assert_eq!(second.kind, EventKind::BlockCreate);
        assert!(first.id < second.id);
    }

    #[test]
    fn enqueue_hooks_fire_in_phase_order() {
        let mut sim = Scheduler::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        sim.register_hook(
            HookPhase::PreEnqueue,
            Box::new(move |_, _, _| log.lock().unwrap().push("pre")),
        );
        let log = seen.clone();
        sim.register_hook(
            HookPhase::PostEnqueue,
            Box::new(move |_, _, _| log.lock().unwrap().push("post")),
        );

        sim.enqueue(marker(EventKind::TxnCreate, 1.0));
        assert_eq!(*seen.lock().unwrap(), vec!["pre", "post"]);
    }

    #[test]
    fn hook_followups_are_enqueued() {
        let mut sim = Scheduler::new();
        sim.register_hook(
            HookPhase::PostEnqueue,
            Box::new(|clock, event, control| {
                if event.kind == EventKind::TxnCreate {
                    control.enqueue(Event::new(
                        EventKind::BlockCreate,
                        clock,
                        10.0,
                        Action::GenerateBlock { peer: PeerId(0) },
                        "followup",
                    ));
                }
            }),
        );

        sim.enqueue(marker(EventKind::TxnCreate, 1.0));
        assert_eq!(sim.len(), 2);
    }

    #[test]
    fn stop_request_sticks() {
        let mut sim = Scheduler::new();
        sim.register_hook(
            HookPhase::PostEnqueue,
            Box::new(|_, _, control| control.request_stop()),
        );
        sim.enqueue(marker(EventKind::TxnCreate, 1.0));
        assert!(sim.is_stopped());
    }
}
