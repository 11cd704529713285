use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_utils::Backoff;
use puppetmaster_queue::{spsc, Consumer, Producer};

use crate::config::{SchedulerConfig, SchedulerError};
use crate::dispatcher::Dispatcher;
use crate::log::{EventKind, EventSink, NullSink};
use crate::oracle::ConflictOracle;
use crate::txn::{Transaction, TxnId};

/// A running scheduler instance.
///
/// Owns every ring and the dispatcher thread; ownership is a tree rooted
/// here, so multiple instances coexist freely (nothing is process-global).
/// Client and puppet threads interact through the ports handed out by
/// [`client`](Scheduler::client) and [`puppet`](Scheduler::puppet).
pub struct Scheduler {
    clients: Vec<Option<ClientPort>>,
    puppets: Vec<Option<PuppetPort>>,
    running: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Starts a scheduler with the given oracle and no event sink.
    pub fn new<O>(config: SchedulerConfig, oracle: O) -> Result<Self, SchedulerError>
    where
        O: ConflictOracle + 'static,
    {
        Scheduler::with_sink(config, oracle, Arc::new(NullSink))
    }

    /// Starts a scheduler that reports lifecycle events to `sink`.
    ///
    /// Validates the configuration, allocates every ring, and spawns the
    /// dispatcher thread pinned to the configured core.
    pub fn with_sink<O>(
        config: SchedulerConfig,
        oracle: O,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, SchedulerError>
    where
        O: ConflictOracle + 'static,
    {
        config.validate()?;

        let mut clients = Vec::with_capacity(config.num_clients);
        let mut pending_rx: Vec<Consumer<Transaction>> = Vec::with_capacity(config.num_clients);
        for id in 0..config.num_clients {
            let (tx, rx) = spsc::ring(config.pending_capacity);
            clients.push(Some(ClientPort {
                id,
                pending: tx,
                sink: sink.clone(),
            }));
            pending_rx.push(rx);
        }

        let mut puppets = Vec::with_capacity(config.num_puppets);
        let mut scheduled_tx: Vec<Producer<TxnId>> = Vec::with_capacity(config.num_puppets);
        let mut done_rx: Vec<Consumer<TxnId>> = Vec::with_capacity(config.num_puppets);
        for id in 0..config.num_puppets {
            let (sched_tx, sched_rx) = spsc::ring(config.sched_capacity);
            let (dn_tx, dn_rx) = spsc::ring(config.sched_capacity);
            puppets.push(Some(PuppetPort {
                id,
                scheduled: sched_rx,
                done: dn_tx,
                sink: sink.clone(),
            }));
            scheduled_tx.push(sched_tx);
            done_rx.push(dn_rx);
        }

        let running = Arc::new(AtomicBool::new(true));
        let dispatcher = Dispatcher::new(
            pending_rx,
            scheduled_tx,
            done_rx,
            config.active_capacity,
            oracle,
            sink,
            running.clone(),
            config.refresh_period,
        );

        let core = config.scheduler_core;
        let handle = std::thread::Builder::new()
            .name("pm-dispatcher".into())
            .spawn(move || {
                pin_to_core(core);
                dispatcher.run();
            })
            .map_err(SchedulerError::Spawn)?;

        Ok(Scheduler {
            clients,
            puppets,
            running,
            dispatcher: Some(handle),
        })
    }

    /// Takes the submission port for client `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range or the port was already taken; a
    /// second taker would break the single-producer discipline of the
    /// pending ring.
    pub fn client(&mut self, id: usize) -> ClientPort {
        match self.clients.get_mut(id) {
            Some(slot) => match slot.take() {
                Some(port) => port,
                None => panic!("client port {} already taken", id),
            },
            None => panic!("no such client {}", id),
        }
    }

    /// Takes the worker port for puppet `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range or the port was already taken.
    pub fn puppet(&mut self, id: usize) -> PuppetPort {
        match self.puppets.get_mut(id) {
            Some(slot) => match slot.take() {
                Some(port) => port,
                None => panic!("puppet port {} already taken", id),
            },
            None => panic!("no such puppet {}", id),
        }
    }

    /// Number of clients this scheduler was configured with.
    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    /// Number of puppets this scheduler was configured with.
    pub fn num_puppets(&self) -> usize {
        self.puppets.len()
    }

    /// Signals the dispatcher to exit and joins it.
    ///
    /// Cooperative: drains no pending work. If the dispatcher died of a
    /// protocol violation, the panic resurfaces here.
    pub fn shutdown(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.dispatcher.take() {
            if let Err(cause) = handle.join() {
                panic::resume_unwind(cause);
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.dispatcher.take() {
            if handle.join().is_err() {
                tracing::error!("dispatcher thread panicked");
            }
        }
    }
}

/// Submission port for one client; the producing half of that client's
/// pending ring. Held by exactly one thread.
pub struct ClientPort {
    id: usize,
    pending: Producer<Transaction>,
    sink: Arc<dyn EventSink>,
}

impl ClientPort {
    /// The client id this port submits as.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Submits a transaction, spinning with backoff while the pending ring
    /// is full. Transactions from one client dispatch in submission order.
    pub fn submit(&mut self, txn: &Transaction) {
        self.sink.record(txn.id(), EventKind::Submit, self.id as u64);
        let backoff = Backoff::new();
        let mut txn = *txn;
        loop {
            match self.pending.push(txn) {
                Ok(()) => return,
                Err(back) => {
                    txn = back;
                    backoff.snooze();
                }
            }
        }
    }

    /// Number of submissions the dispatcher has not yet looked at.
    pub fn backlog(&self) -> usize {
        self.pending.len()
    }
}

/// Worker port for one puppet; the consuming half of its scheduled ring and
/// the producing half of its done ring. Held by exactly one thread.
pub struct PuppetPort {
    id: usize,
    scheduled: Consumer<TxnId>,
    done: Producer<TxnId>,
    sink: Arc<dyn EventSink>,
}

impl PuppetPort {
    /// The puppet id this port works as.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Returns the next scheduled transaction id, or `None` when nothing is
    /// scheduled (forever, once the dispatcher has exited).
    pub fn poll(&mut self) -> Option<TxnId> {
        let id = self.scheduled.pop()?;
        self.sink.record(id, EventKind::WorkRecv, self.id as u64);
        Some(id)
    }

    /// Reports a transaction complete, spinning with backoff while the done
    /// ring is full.
    ///
    /// Completions must be reported in the order the ids were polled; the
    /// dispatcher treats any other order as a fatal protocol violation.
    pub fn report_done(&mut self, txn_id: TxnId) {
        self.sink.record(txn_id, EventKind::Done, self.id as u64);
        let backoff = Backoff::new();
        let mut msg = txn_id;
        loop {
            match self.done.push(msg) {
                Ok(()) => return,
                Err(back) => {
                    msg = back;
                    backoff.snooze();
                }
            }
        }
    }
}

/// Pins the calling thread to `core`, modulo the cores actually present.
///
/// A missing or failed pin is only a warning; the scheduler still works, it
/// just loses the cache locality the pin buys.
fn pin_to_core(core: usize) {
    let cores = match core_affinity::get_core_ids() {
        Some(cores) if !cores.is_empty() => cores,
        _ => {
            tracing::warn!("no core ids available, dispatcher left unpinned");
            return;
        }
    };
    let target = cores[core % cores.len()];
    if core >= cores.len() {
        tracing::warn!(
            requested = core,
            actual = target.id,
            "scheduler core out of range, using fallback"
        );
    }
    if !core_affinity::set_for_current(target) {
        tracing::warn!(core = target.id, "failed to pin dispatcher thread");
    }
}
