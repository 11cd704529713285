//! Puppetmaster: a conflict-free transaction scheduler.
//!
//! Clients submit database-style transactions, each naming the objects it
//! reads and writes, and a dedicated dispatcher thread hands them to a pool
//! of worker "puppets" such that no two concurrently executing transactions
//! share a read/write conflict on any object. Every cross-thread hand-off
//! goes over a lock-free SPSC ring; admission is bounded and non-blocking.
//!
//! # Key Features
//!
//! - **Conflict-free concurrency**: a candidate only dispatches when it
//!   conflicts with nothing in flight, checked either exactly or through a
//!   pair of alternating Bloom filters.
//! - **At-most-once scheduling**: each transaction is dispatched once and
//!   retired once, FIFO per client and per puppet.
//! - **Single-threaded control plane**: the dispatcher exclusively owns the
//!   active set and the conflict oracle; no locks anywhere on the data path.
//! - **Bounded everything**: fixed-capacity rings, bounded per-iteration
//!   refresh work, bounded spins.
//!
//! # Example
//!
//! ```rust
//! use puppetmaster::{ExactOracle, Scheduler, SchedulerConfig, Transaction, TxnId};
//!
//! let mut scheduler =
//!     Scheduler::new(SchedulerConfig::new(1, 2), ExactOracle::new()).unwrap();
//! let mut client = scheduler.client(0);
//! let mut puppets = [scheduler.puppet(0), scheduler.puppet(1)];
//!
//! client.submit(&Transaction::new(TxnId(1), 0).write(7));
//!
//! // Busy-poll the puppets until the dispatch shows up.
//! let (id, which) = loop {
//!     if let Some(found) = puppets
//!         .iter_mut()
//!         .enumerate()
//!         .find_map(|(i, p)| p.poll().map(|id| (id, i)))
//!     {
//!         break found;
//!     }
//! };
//! assert_eq!(id, TxnId(1));
//! puppets[which].report_done(id);
//! scheduler.shutdown();
//! ```

#![warn(missing_docs)]

mod active;
mod config;
mod dispatcher;
mod log;
mod oracle;
mod scheduler;
mod txn;

pub use active::ActiveSet;
pub use config::{SchedulerConfig, SchedulerError};
pub use log::{EventKind, EventSink, NullSink, TracingSink};
pub use oracle::{BloomFilter, BloomOracle, ConflictOracle, ExactOracle};
pub use scheduler::{ClientPort, PuppetPort, Scheduler};
pub use txn::{ObjectRef, Transaction, TxnId};

/// Maximum number of client submitters.
pub const MAX_CLIENTS: usize = 64;

/// Maximum number of puppet workers.
pub const MAX_PUPPETS: usize = 64;

/// Default capacity of each per-client pending ring.
pub const MAX_PENDING_PER_CLIENT: usize = 128;

/// Default capacity of each per-puppet active lane.
pub const MAX_ACTIVE_PER_PUPPET: usize = 128;

/// Default capacity of each per-puppet scheduled and done ring.
///
/// Strictly larger than [`MAX_ACTIVE_PER_PUPPET`] so a puppet's whole
/// in-flight window fits in either ring; the dispatcher's publish spin and
/// a worker's done spin can then never wait on each other.
pub const MAX_SCHED_OUT: usize = 256;

/// Maximum number of object references in one transaction.
pub const MAX_TXN_OBJS: usize = 16;

/// Default core the dispatcher thread pins itself to.
pub const SCHEDULER_CORE_ID: usize = 2;

/// Default number of admissions between Bloom filter switches.
pub const REFRESH_PERIOD: u64 = 512;

/// Default log2 of the bits in each Bloom filter partition.
pub const BLOOM_LOG2_PART_BITS: u32 = 14;

/// Default number of Bloom filter partitions.
pub const BLOOM_NUM_PARTS: usize = 4;
