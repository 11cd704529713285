use std::fmt;
use std::io;

use crate::{
    MAX_ACTIVE_PER_PUPPET, MAX_CLIENTS, MAX_PENDING_PER_CLIENT, MAX_PUPPETS, MAX_SCHED_OUT,
    REFRESH_PERIOD, SCHEDULER_CORE_ID,
};

/// Scheduler sizing and placement parameters.
///
/// The defaults mirror the reference configuration; every capacity is per
/// ring and must be a power of two.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Number of client submitters, each with its own pending ring.
    pub num_clients: usize,
    /// Number of puppet workers, each with its own scheduled and done rings.
    pub num_puppets: usize,
    /// Capacity of each per-client pending ring.
    pub pending_capacity: usize,
    /// Capacity of each per-puppet active lane.
    pub active_capacity: usize,
    /// Capacity of each per-puppet scheduled and done ring.
    pub sched_capacity: usize,
    /// Core the dispatcher thread pins itself to (modulo available cores).
    pub scheduler_core: usize,
    /// Number of admissions between filter switches.
    pub refresh_period: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            num_clients: 1,
            num_puppets: 8,
            pending_capacity: MAX_PENDING_PER_CLIENT,
            active_capacity: MAX_ACTIVE_PER_PUPPET,
            sched_capacity: MAX_SCHED_OUT,
            scheduler_core: SCHEDULER_CORE_ID,
            refresh_period: REFRESH_PERIOD,
        }
    }
}

impl SchedulerConfig {
    /// A default configuration for `num_clients` clients and `num_puppets`
    /// puppets.
    pub fn new(num_clients: usize, num_puppets: usize) -> Self {
        SchedulerConfig {
            num_clients,
            num_puppets,
            ..SchedulerConfig::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), SchedulerError> {
        if self.num_clients == 0 || self.num_clients > MAX_CLIENTS {
            return Err(SchedulerError::BadClientCount {
                requested: self.num_clients,
            });
        }
        if self.num_puppets == 0 || self.num_puppets > MAX_PUPPETS {
            return Err(SchedulerError::BadPuppetCount {
                requested: self.num_puppets,
            });
        }
        for (what, value) in [
            ("pending ring", self.pending_capacity),
            ("active lane", self.active_capacity),
            ("scheduled/done ring", self.sched_capacity),
        ] {
            if value < 2 || !value.is_power_of_two() {
                return Err(SchedulerError::BadCapacity { what, value });
            }
        }
        // One ring slot is reserved for full/empty discrimination, so the
        // scheduled and done rings only absorb a puppet's whole in-flight
        // window when they are strictly larger than the active lane. Any
        // smaller and the dispatcher's publish spin could form a cycle with
        // a worker's done spin.
        if self.sched_capacity <= self.active_capacity {
            return Err(SchedulerError::SchedRingTooSmall {
                sched: self.sched_capacity,
                active: self.active_capacity,
            });
        }
        if self.refresh_period == 0 {
            return Err(SchedulerError::ZeroRefreshPeriod);
        }
        Ok(())
    }
}

/// Errors reported by [`Scheduler::new`](crate::Scheduler::new).
///
/// These cover misconfiguration and resource failures at startup only;
/// data-plane invariant violations are unrecoverable and panic instead.
#[derive(Debug)]
pub enum SchedulerError {
    /// Client count is zero or above [`MAX_CLIENTS`].
    BadClientCount {
        /// The rejected count.
        requested: usize,
    },
    /// Puppet count is zero or above [`MAX_PUPPETS`].
    BadPuppetCount {
        /// The rejected count.
        requested: usize,
    },
    /// A ring capacity is not a power of two of at least 2.
    BadCapacity {
        /// Which ring the capacity belongs to.
        what: &'static str,
        /// The rejected capacity.
        value: usize,
    },
    /// The scheduled/done ring cannot absorb a full active lane.
    SchedRingTooSmall {
        /// The rejected scheduled/done ring capacity.
        sched: usize,
        /// The active lane capacity it must exceed.
        active: usize,
    },
    /// The refresh period is zero.
    ZeroRefreshPeriod,
    /// The dispatcher thread could not be spawned.
    Spawn(io::Error),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::BadClientCount { requested } => {
                write!(
                    f,
                    "client count {} outside 1..={}",
                    requested, MAX_CLIENTS
                )
            }
            SchedulerError::BadPuppetCount { requested } => {
                write!(
                    f,
                    "puppet count {} outside 1..={}",
                    requested, MAX_PUPPETS
                )
            }
            SchedulerError::BadCapacity { what, value } => {
                write!(
                    f,
                    "{} capacity {} is not a power of two >= 2",
                    what, value
                )
            }
            SchedulerError::SchedRingTooSmall { sched, active } => {
                write!(
                    f,
                    "scheduled/done ring capacity {} must exceed active lane capacity {}",
                    sched, active
                )
            }
            SchedulerError::ZeroRefreshPeriod => {
                write!(f, "refresh period must be at least 1")
            }
            SchedulerError::Spawn(err) => {
                write!(f, "failed to spawn dispatcher thread: {}", err)
            }
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Spawn(err) => Some(err),
            _ => None,
        }
    }
}
