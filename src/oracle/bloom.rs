use std::collections::VecDeque;

use crate::active::ActiveSet;
use crate::oracle::ConflictOracle;
use crate::txn::Transaction;
use crate::{BLOOM_LOG2_PART_BITS, BLOOM_NUM_PARTS};

/// Multiply-shift constants, one odd 64-bit multiplier per partition.
///
/// The first is the golden-ratio constant; the others come from well-known
/// mixers with good avalanche on the high bits.
const HASH_CONSTANTS: [u64; 4] = [
    0x9e3779b97f4a7c15,
    0xc6a4a7935bd1e995,
    0x2545f4914f6cdd1d,
    0x21c64e4276c9f809,
];

/// How many worklist entries one refresh step folds into the shadow filter.
const REBUILD_BATCH: usize = 32;

/// A partitioned Bloom filter over object ids.
///
/// The bit array is split into `parts` disjoint regions; hash `k` only ever
/// sets bits in region `k`, so two hashes of the same id cannot collide on
/// one bit. Membership requires a hit in every region.
pub struct BloomFilter {
    words: Box<[u64]>,
    parts: usize,
    part_bits: usize,
    shift: u32,
}

impl BloomFilter {
    /// Creates a filter with `parts` regions of `2^log2_part_bits` bits.
    ///
    /// # Panics
    ///
    /// Panics if `parts` is zero or exceeds the number of hash constants,
    /// or if `log2_part_bits` is not in `1..=32`.
    pub fn new(log2_part_bits: u32, parts: usize) -> Self {
        assert!(
            parts >= 1 && parts <= HASH_CONSTANTS.len(),
            "partition count must be in 1..={}, got {}",
            HASH_CONSTANTS.len(),
            parts
        );
        assert!(
            (1..=32).contains(&log2_part_bits),
            "log2 partition size must be in 1..=32, got {}",
            log2_part_bits
        );

        let part_bits = 1usize << log2_part_bits;
        let total_bits = part_bits * parts;
        BloomFilter {
            words: vec![0u64; total_bits.div_ceil(64)].into_boxed_slice(),
            parts,
            part_bits,
            shift: 64 - log2_part_bits,
        }
    }

    /// The reference geometry: 4 partitions of 16384 bits.
    pub fn with_default_geometry() -> Self {
        BloomFilter::new(BLOOM_LOG2_PART_BITS, BLOOM_NUM_PARTS)
    }

    /// Bit position of hash `k` of `id`, within the whole array.
    fn bit(&self, id: u64, k: usize) -> usize {
        let hash = (id.wrapping_mul(HASH_CONSTANTS[k]) >> self.shift) as usize;
        k * self.part_bits + hash
    }

    /// Sets the membership bits for `id`.
    pub fn insert(&mut self, id: u64) {
        for k in 0..self.parts {
            let bit = self.bit(id, k);
            self.words[bit / 64] |= 1u64 << (bit % 64);
        }
    }

    /// Returns `true` if `id` may have been inserted since the last clear.
    ///
    /// False positives are possible; false negatives are not.
    pub fn contains(&self, id: u64) -> bool {
        (0..self.parts).all(|k| {
            let bit = self.bit(id, k);
            self.words[bit / 64] & (1u64 << (bit % 64)) != 0
        })
    }

    /// Clears every bit.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Number of set bits, for diagnostics.
    pub fn density(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Conflict detection through two alternating Bloom filters.
///
/// Queries probe only the *live* filter, which reflects every in-flight
/// transaction plus whatever bits past admissions left behind. Retired
/// transactions' bits are never cleared eagerly; instead the *shadow*
/// filter is rebuilt from the current active set and the two are swapped,
/// which bounds the false-positive accumulation.
///
/// The rebuild is amortized over a worklist: when a switch begins, the
/// active set is snapshotted into the worklist, each [`refresh`] step folds
/// a bounded batch of it into the shadow, and admissions performed while
/// the switch is in progress go into both filters. Once the worklist is
/// empty the shadow reflects every in-flight transaction and the swap is
/// safe.
///
/// [`refresh`]: ConflictOracle::refresh
pub struct BloomOracle {
    filters: [BloomFilter; 2],
    live: usize,
    /// Transactions still to be folded into the shadow; `Some` while a
    /// switch is in progress.
    rebuild: Option<VecDeque<Transaction>>,
    retired_since_switch: u64,
}

impl BloomOracle {
    /// Creates the oracle with the reference filter geometry.
    pub fn new() -> Self {
        BloomOracle::with_geometry(BLOOM_LOG2_PART_BITS, BLOOM_NUM_PARTS)
    }

    /// Creates the oracle with `parts` regions of `2^log2_part_bits` bits
    /// per filter. Small geometries saturate quickly and are useful for
    /// exercising the switch protocol.
    pub fn with_geometry(log2_part_bits: u32, parts: usize) -> Self {
        BloomOracle {
            filters: [
                BloomFilter::new(log2_part_bits, parts),
                BloomFilter::new(log2_part_bits, parts),
            ],
            live: 0,
            rebuild: None,
            retired_since_switch: 0,
        }
    }

    /// The filter currently answering queries.
    pub fn live_filter(&self) -> &BloomFilter {
        &self.filters[self.live]
    }

    /// Returns `true` while a filter switch is in progress.
    pub fn switching(&self) -> bool {
        self.rebuild.is_some()
    }
}

impl Default for BloomOracle {
    fn default() -> Self {
        BloomOracle::new()
    }
}

impl ConflictOracle for BloomOracle {
    fn conflicts(&self, candidate: &Transaction, _active: &ActiveSet) -> bool {
        let live = &self.filters[self.live];
        candidate.objects().iter().any(|obj| live.contains(obj.id()))
    }

    fn admit(&mut self, txn: &Transaction) {
        let switching = self.rebuild.is_some();
        for obj in txn.objects() {
            self.filters[self.live].insert(obj.id());
            if switching {
                self.filters[self.live ^ 1].insert(obj.id());
            }
        }
    }

    fn retire(&mut self, _txn: &Transaction) {
        // The bits stay; they are shed at the next completed switch.
        self.retired_since_switch += 1;
    }

    fn refresh(&mut self, active: &ActiveSet) -> bool {
        if self.rebuild.is_none() {
            // Switch begins: everything in flight right now must reach the
            // shadow before the swap. Later admissions insert themselves.
            self.rebuild = Some(active.iter().copied().collect());
        }

        let shadow = self.live ^ 1;
        for _ in 0..REBUILD_BATCH {
            let txn = match self.rebuild.as_mut().and_then(|w| w.pop_front()) {
                Some(txn) => txn,
                None => break,
            };
            for obj in txn.objects() {
                self.filters[shadow].insert(obj.id());
            }
        }

        if self.rebuild.as_ref().is_some_and(|w| !w.is_empty()) {
            return false;
        }

        self.live = shadow;
        self.filters[shadow ^ 1].clear();
        self.rebuild = None;
        tracing::trace!(
            retired = self.retired_since_switch,
            density = self.filters[self.live].density(),
            "bloom filter switch complete"
        );
        self.retired_since_switch = 0;
        true
    }
}
