use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::utils::CacheAligned;

/// Shared state of a bounded single-producer single-consumer ring.
///
/// Head and tail are monotonically increasing counters masked to the buffer
/// length on access. One slot is sacrificed so that full and empty states
/// stay distinguishable: empty is `head == tail`, full is
/// `tail - head == capacity - 1`.
struct Ring<T> {
    /// Index of the next slot to consume. Written by the consumer only.
    head: CacheAligned<AtomicUsize>,

    /// Index of the next slot to fill. Written by the producer only.
    tail: CacheAligned<AtomicUsize>,

    /// The buffer holding slots.
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,

    /// A mask for indices.
    mask: usize,
}

// SAFETY: the ring is only ever driven through the unique Producer and
// Consumer handles. The producer writes a slot strictly before the
// store-release on tail that publishes it; the consumer acquire-loads tail
// before reading the slot and store-releases head only after the read. Each
// slot therefore has exactly one writer at any time.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "ring capacity must be a power of two >= 2, got {}",
            capacity
        );

        let mut buffer = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            buffer.push(UnsafeCell::new(MaybeUninit::uninit()));
        }

        Ring {
            head: CacheAligned::new(AtomicUsize::new(0)),
            tail: CacheAligned::new(AtomicUsize::new(0)),
            buffer: buffer.into_boxed_slice(),
            mask: capacity - 1,
        }
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::SeqCst);
        let tail = self.tail.load(Ordering::SeqCst);
        tail.wrapping_sub(head)
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        // Both handles are gone, so the counters are quiescent.
        let mut head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        while head != tail {
            let slot = &mut self.buffer[head & self.mask];
            unsafe { slot.get_mut().assume_init_drop() };
            head = head.wrapping_add(1);
        }
    }
}

/// The producing half of an SPSC ring.
///
/// Not cloneable: exactly one thread may push.
pub struct Producer<T> {
    inner: Arc<Ring<T>>,
}

/// The consuming half of an SPSC ring.
///
/// Not cloneable: exactly one thread may pop.
pub struct Consumer<T> {
    inner: Arc<Ring<T>>,
}

/// Creates a bounded SPSC ring and splits it into its two handles.
///
/// `capacity` must be a power of two and at least 2; one slot is reserved
/// for full/empty discrimination, so the ring holds `capacity - 1` items.
///
/// # Panics
///
/// Panics if `capacity` is zero or not a power of two.
pub fn ring<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let inner = Arc::new(Ring::new(capacity));
    (
        Producer {
            inner: inner.clone(),
        },
        Consumer { inner },
    )
}

impl<T> Producer<T> {
    /// Pushes an element into the ring.
    ///
    /// Returns the element back when the ring is full; never blocks. The
    /// element becomes visible to the consumer only once the slot payload
    /// is, via the store-release on tail.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        let ring = &*self.inner;
        let tail = ring.tail.load(Ordering::Relaxed);
        let head = ring.head.load(Ordering::Acquire);

        if tail.wrapping_sub(head) == ring.mask {
            return Err(value);
        }

        unsafe {
            (*ring.buffer[tail & ring.mask].get()).write(value);
        }
        ring.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Returns the number of items currently in the ring.
    ///
    /// May be stale by the time it returns; monotonically correct for the
    /// producer (the count can only shrink underneath it).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the ring is full.
    pub fn is_full(&self) -> bool {
        self.len() == self.inner.mask
    }

    /// Returns the number of items the ring can hold.
    pub fn capacity(&self) -> usize {
        self.inner.mask
    }
}

impl<T> Consumer<T> {
    /// Pops the oldest element from the ring, or `None` when empty.
    pub fn pop(&mut self) -> Option<T> {
        let ring = &*self.inner;
        let head = ring.head.load(Ordering::Relaxed);
        let tail = ring.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        let value = unsafe { (*ring.buffer[head & ring.mask].get()).assume_init_read() };
        ring.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Returns a reference to the oldest element without consuming it.
    ///
    /// The same emptiness check as [`pop`](Consumer::pop), but head does not
    /// advance; the producer cannot overwrite the slot until it does.
    pub fn peek(&self) -> Option<&T> {
        let ring = &*self.inner;
        let head = ring.head.load(Ordering::Relaxed);
        let tail = ring.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        Some(unsafe { (*ring.buffer[head & ring.mask].get()).assume_init_ref() })
    }

    /// Returns the number of items currently in the ring.
    ///
    /// May be stale by the time it returns; monotonically correct for the
    /// consumer (the count can only grow underneath it).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the ring is full.
    pub fn is_full(&self) -> bool {
        self.len() == self.inner.mask
    }

    /// Returns the number of items the ring can hold.
    pub fn capacity(&self) -> usize {
        self.inner.mask
    }
}
