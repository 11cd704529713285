use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_utils::Backoff;
use puppetmaster_queue::{Consumer, Producer};

use crate::active::ActiveSet;
use crate::log::{EventKind, EventSink};
use crate::oracle::ConflictOracle;
use crate::txn::{Transaction, TxnId};

/// The scheduling loop.
///
/// Owns the active set and the oracle outright; every ring end it holds is
/// the dispatcher-side half. Runs on its own pinned thread until the shared
/// run flag is cleared.
pub(crate) struct Dispatcher<O: ConflictOracle> {
    /// Consumer end of each per-client pending ring.
    pending: Vec<Consumer<Transaction>>,
    /// Producer end of each per-puppet scheduled ring.
    scheduled: Vec<Producer<TxnId>>,
    /// Consumer end of each per-puppet done ring.
    done: Vec<Consumer<TxnId>>,
    active: ActiveSet,
    oracle: O,
    sink: Arc<dyn EventSink>,
    running: Arc<AtomicBool>,
    refresh_period: u64,
    admits_since_switch: u64,
    /// True from the refresh trigger until the oracle reports the filter
    /// switch complete.
    switching: bool,
    /// Puppet round-robin cursor; points one past the last chosen puppet.
    next_puppet: usize,
}

impl<O: ConflictOracle> Dispatcher<O> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        pending: Vec<Consumer<Transaction>>,
        scheduled: Vec<Producer<TxnId>>,
        done: Vec<Consumer<TxnId>>,
        active_capacity: usize,
        oracle: O,
        sink: Arc<dyn EventSink>,
        running: Arc<AtomicBool>,
        refresh_period: u64,
    ) -> Self {
        let num_puppets = scheduled.len();
        Dispatcher {
            pending,
            scheduled,
            done,
            active: ActiveSet::new(num_puppets, active_capacity),
            oracle,
            sink,
            running,
            refresh_period,
            admits_since_switch: 0,
            switching: false,
            next_puppet: 0,
        }
    }

    /// Runs the scheduling loop until shutdown is signalled.
    pub(crate) fn run(mut self) {
        tracing::debug!(
            clients = self.pending.len(),
            puppets = self.scheduled.len(),
            "dispatcher running"
        );
        while self.running.load(Ordering::Relaxed) {
            self.retire_pass();
            self.admit_pass();
            self.refresh_step();
        }
        tracing::debug!(in_flight = self.active.total(), "dispatcher exiting");
    }

    /// Drains every done ring, retiring each completed transaction.
    ///
    /// Completions on a puppet arrive in dispatch order, so each done id
    /// must match the head of that puppet's active lane; anything else means
    /// an ordering or API-misuse bug somewhere upstream and is fatal.
    fn retire_pass(&mut self) {
        for puppet in 0..self.done.len() {
            while let Some(id) = self.done[puppet].pop() {
                let txn = self.active.pop(puppet);
                assert_eq!(
                    txn.id(),
                    id,
                    "puppet {} reported {} done but {} was at the head of its lane",
                    puppet,
                    id,
                    txn.id()
                );
                self.oracle.retire(&txn);
                self.sink.record(id, EventKind::Cleanup, puppet as u64);
            }
        }
    }

    /// One admission pass over the clients, in strict round-robin starting
    /// at client 0.
    ///
    /// Only the head of each pending ring is considered: a conflicting head
    /// stays put and blocks its own client until it or some active
    /// conflicter retires. That head-of-line blocking keeps per-client FIFO
    /// observable and bounds the scan.
    fn admit_pass(&mut self) {
        for client in 0..self.pending.len() {
            let txn = match self.pending[client].peek() {
                Some(txn) => *txn,
                None => continue,
            };
            let puppet = match self.pick_puppet() {
                Some(puppet) => puppet,
                // Every active lane is full; no candidate can go anywhere.
                None => break,
            };
            if self.oracle.conflicts(&txn, &self.active) {
                continue;
            }

            self.pending[client].pop();
            self.active.push(puppet, txn);
            self.oracle.admit(&txn);
            self.publish(puppet, txn.id());
            self.next_puppet = (puppet + 1) % self.scheduled.len();
            self.admits_since_switch += 1;
        }
    }

    /// Next puppet in round-robin order whose active lane has room.
    fn pick_puppet(&self) -> Option<usize> {
        let n = self.scheduled.len();
        (0..n)
            .map(|i| (self.next_puppet + i) % n)
            .find(|&p| !self.active.is_full(p))
    }

    /// Publishes a dispatch decision on the puppet's scheduled ring.
    ///
    /// The ring is sized not to fill in steady state; if it does, the
    /// dispatcher spins until the puppet drains it.
    fn publish(&mut self, puppet: usize, id: TxnId) {
        // Recorded before the push so the ready event is visible by the
        // time the puppet can observe the id.
        self.sink.record(id, EventKind::SchedReady, puppet as u64);
        let backoff = Backoff::new();
        let mut msg = id;
        loop {
            match self.scheduled[puppet].push(msg) {
                Ok(()) => break,
                Err(back) => {
                    msg = back;
                    backoff.snooze();
                }
            }
        }
    }

    /// Starts a filter switch every `refresh_period` admissions and drives
    /// it one bounded step per loop iteration until the oracle reports it
    /// complete. Retirement and admission keep running meanwhile.
    fn refresh_step(&mut self) {
        if !self.switching {
            if self.admits_since_switch < self.refresh_period {
                return;
            }
            self.switching = true;
        }
        if self.oracle.refresh(&self.active) {
            self.switching = false;
            self.admits_since_switch = 0;
        }
    }
}
