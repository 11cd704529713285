use crate::txn::Transaction;

/// One puppet's FIFO of in-flight transactions.
///
/// Head and tail are monotonic; the lane is full when their distance reaches
/// the slot count. No atomics: the whole set lives on the dispatcher thread.
struct Lane {
    slots: Box<[Option<Transaction>]>,
    head: usize,
    tail: usize,
}

impl Lane {
    fn new(capacity: usize) -> Self {
        Lane {
            slots: vec![None; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
        }
    }

    fn len(&self) -> usize {
        self.tail - self.head
    }

    fn is_full(&self) -> bool {
        self.len() == self.slots.len()
    }

    fn push(&mut self, txn: Transaction) {
        assert!(!self.is_full(), "active lane overflow");
        let idx = self.tail % self.slots.len();
        self.slots[idx] = Some(txn);
        self.tail += 1;
    }

    fn pop(&mut self) -> Transaction {
        assert!(self.len() > 0, "pop from empty active lane");
        let idx = self.head % self.slots.len();
        self.head += 1;
        match self.slots[idx].take() {
            Some(txn) => txn,
            None => unreachable!("occupied lane slot was empty"),
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Transaction> {
        (self.head..self.tail).map(move |i| {
            match self.slots[i % self.slots.len()].as_ref() {
                Some(txn) => txn,
                None => unreachable!("occupied lane slot was empty"),
            }
        })
    }
}

/// The set of dispatched-but-not-retired transactions, one FIFO lane per
/// puppet.
///
/// Owned exclusively by the dispatcher. The per-puppet FIFO encodes the
/// worker contract that completions arrive in dispatch order, so retirement
/// is an O(1) pop rather than a search.
pub struct ActiveSet {
    lanes: Vec<Lane>,
}

impl ActiveSet {
    /// Creates an active set for `num_puppets` puppets, each lane holding up
    /// to `capacity` transactions.
    pub fn new(num_puppets: usize, capacity: usize) -> Self {
        ActiveSet {
            lanes: (0..num_puppets).map(|_| Lane::new(capacity)).collect(),
        }
    }

    /// Appends `txn` to `puppet`'s lane.
    ///
    /// # Panics
    ///
    /// Panics if the lane is full; callers must check [`is_full`](Self::is_full)
    /// first.
    pub fn push(&mut self, puppet: usize, txn: Transaction) {
        self.lanes[puppet].push(txn);
    }

    /// Removes and returns the oldest transaction on `puppet`'s lane.
    ///
    /// # Panics
    ///
    /// Panics if the lane is empty.
    pub fn pop(&mut self, puppet: usize) -> Transaction {
        self.lanes[puppet].pop()
    }

    /// Returns `true` if `puppet`'s lane cannot take another transaction.
    pub fn is_full(&self, puppet: usize) -> bool {
        self.lanes[puppet].is_full()
    }

    /// Number of in-flight transactions on `puppet`'s lane.
    pub fn len(&self, puppet: usize) -> usize {
        self.lanes[puppet].len()
    }

    /// Total number of in-flight transactions across all puppets.
    pub fn total(&self) -> usize {
        self.lanes.iter().map(Lane::len).sum()
    }

    /// Returns `true` if no transaction is in flight anywhere.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Iterates over every in-flight transaction across all puppets.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.lanes.iter().flat_map(Lane::iter)
    }
}
