use puppetmaster_queue::spsc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_simple_push_pop() {
    let (mut tx, mut rx) = spsc::ring(4);
    assert!(rx.is_empty());
    assert!(!tx.is_full());
    assert_eq!(tx.capacity(), 3);

    assert!(tx.push(1).is_ok());
    assert!(tx.push(2).is_ok());
    assert!(tx.push(3).is_ok());
    assert!(tx.is_full());

    assert_eq!(tx.push(4), Err(4));

    assert_eq!(rx.pop(), Some(1));
    assert!(!tx.is_full());

    assert_eq!(rx.pop(), Some(2));
    assert_eq!(rx.pop(), Some(3));
    assert!(rx.is_empty());

    assert_eq!(rx.pop(), None);
}

#[test]
fn test_peek_does_not_advance() {
    let (mut tx, mut rx) = spsc::ring(4);
    assert_eq!(rx.peek(), None);

    tx.push(7).unwrap();
    tx.push(8).unwrap();

    assert_eq!(rx.peek(), Some(&7));
    assert_eq!(rx.peek(), Some(&7));
    assert_eq!(rx.len(), 2);

    assert_eq!(rx.pop(), Some(7));
    assert_eq!(rx.peek(), Some(&8));
}

#[test]
fn test_fifo_across_wraparound() {
    let (mut tx, mut rx) = spsc::ring(4);

    for round in 0..10u64 {
        for i in 0..3 {
            tx.push(round * 3 + i).unwrap();
        }
        for i in 0..3 {
            assert_eq!(rx.pop(), Some(round * 3 + i));
        }
    }
}

#[test]
fn test_quiescent_queries_are_idempotent() {
    let (mut tx, rx) = spsc::ring::<u32>(8);
    tx.push(1).unwrap();
    tx.push(2).unwrap();

    for _ in 0..3 {
        assert_eq!(tx.len(), 2);
        assert_eq!(rx.len(), 2);
        assert!(!rx.is_empty());
        assert!(!tx.is_full());
    }
}

#[test]
#[should_panic(expected = "power of two")]
fn test_non_power_of_two_capacity_panics() {
    let _ = spsc::ring::<u32>(6);
}

#[test]
#[should_panic(expected = "power of two")]
fn test_zero_capacity_panics() {
    let _ = spsc::ring::<u32>(0);
}

#[test]
fn test_drops_unconsumed_items() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Counted;
    impl Drop for Counted {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    let (mut tx, mut rx) = spsc::ring(8);
    for _ in 0..5 {
        tx.push(Counted).unwrap();
    }
    drop(rx.pop());
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);

    drop(tx);
    drop(rx);
    assert_eq!(DROPS.load(Ordering::SeqCst), 5);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_transfer() {
    const COUNT: u64 = 100_000;

    let (mut tx, mut rx) = spsc::ring(64);
    let received = Arc::new(AtomicUsize::new(0));
    let received2 = received.clone();

    let producer = thread::spawn(move || {
        for i in 0..COUNT {
            while tx.push(i).is_err() {
                thread::yield_now();
            }
        }
    });

    let consumer = thread::spawn(move || {
        let mut expected = 0u64;
        while expected < COUNT {
            match rx.pop() {
                Some(v) => {
                    // FIFO: values arrive in submission order, none skipped.
                    assert_eq!(v, expected);
                    expected += 1;
                    received2.fetch_add(1, Ordering::Relaxed);
                }
                None => thread::yield_now(),
            }
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
    assert_eq!(received.load(Ordering::SeqCst), COUNT as usize);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_peek_then_pop() {
    const COUNT: u64 = 10_000;

    let (mut tx, mut rx) = spsc::ring(16);

    let producer = thread::spawn(move || {
        for i in 0..COUNT {
            while tx.push(i).is_err() {
                thread::yield_now();
            }
        }
    });

    let consumer = thread::spawn(move || {
        let mut expected = 0u64;
        while expected < COUNT {
            match rx.peek().copied() {
                Some(v) => {
                    assert_eq!(v, expected);
                    assert_eq!(rx.pop(), Some(v));
                    expected += 1;
                }
                None => thread::yield_now(),
            }
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}
