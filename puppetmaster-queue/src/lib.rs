//! Queue primitives for Puppetmaster.
//!
//! ## Features
//!
//! - `spsc`: Bounded single-producer single-consumer ring with split
//!   producer/consumer handles.
//! - `utils`: Cache-line alignment helper used to keep the ring indices on
//!   separate lines.
//!
//! ## Usage
//!
//! ```rust
//! use puppetmaster_queue::spsc;
//!
//! let (mut tx, mut rx) = spsc::ring::<u64>(8);
//! assert!(tx.push(42).is_ok());
//! assert_eq!(rx.pop(), Some(42));
//! ```

pub mod spsc;
pub mod utils;

pub use spsc::{ring, Consumer, Producer};
