use crate::txn::TxnId;

/// The lifecycle points the scheduler reports to its event sink.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EventKind {
    /// A client started submitting the transaction.
    Submit,
    /// The dispatcher published the transaction to a scheduled ring.
    SchedReady,
    /// A puppet picked the transaction up from its scheduled ring.
    WorkRecv,
    /// A puppet reported the transaction complete.
    Done,
    /// The dispatcher retired the transaction.
    Cleanup,
}

/// Receiver for per-transaction lifecycle events.
///
/// `record` is called from client, puppet, and dispatcher threads alike and
/// must be safe from any of them. `aux` carries the puppet id for
/// [`SchedReady`](EventKind::SchedReady), [`WorkRecv`](EventKind::WorkRecv),
/// [`Done`](EventKind::Done) and [`Cleanup`](EventKind::Cleanup), and the
/// client id for [`Submit`](EventKind::Submit). The scheduler defines no
/// storage or wire format for these events.
pub trait EventSink: Send + Sync {
    /// Records one lifecycle event.
    fn record(&self, txn_id: TxnId, kind: EventKind, aux: u64);
}

/// A sink that discards every event.
#[derive(Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _txn_id: TxnId, _kind: EventKind, _aux: u64) {}
}

/// A sink that forwards every event to [`tracing`] at trace level.
#[derive(Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, txn_id: TxnId, kind: EventKind, aux: u64) {
        tracing::trace!(txn = txn_id.0, kind = ?kind, aux, "txn lifecycle event");
    }
}
