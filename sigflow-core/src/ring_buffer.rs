//! A bounded single-producer/multi-consumer ring buffer with backpressure and
//! end-of-stream propagation.
//!
//! Grounded on the `Producer`/`Consumer` handle split of this codebase's
//! lock-free SPSC ring, generalized from one reader to N independent-cursor
//! readers and from atomics to a mutex/condvar pair; a lock-free
//! implementation is an equally valid alternative so long as the same
//! blocking backpressure semantics hold. The logical reserve/commit and
//! peek/consume pairs are collapsed into single blocking `write`/`read` calls
//! that copy elements across the lock rather than handing back a slice tied
//! to the guard's lifetime.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

struct Shared<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

struct State<T> {
    // Backlog shared by every reader; bounded by capacity once the slowest
    // reader's cursor is accounted for.
    backlog: VecDeque<T>,
    /// Per-consumer count of how many leading elements of `backlog` it has
    /// already consumed and thus no longer needs.
    read_offsets: Vec<usize>,
    eos: bool,
}

impl<T> State<T> {
    fn min_read_offset(&self) -> usize {
        self.read_offsets.iter().copied().min().unwrap_or(0)
    }

    /// Drop elements every consumer has already read, so the backlog never
    /// grows past `capacity`.
    fn reclaim(&mut self) {
        let reclaimable = self.min_read_offset();
        if reclaimable == 0 {
            return;
        }
        self.backlog.drain(..reclaimable);
        for offset in &mut self.read_offsets {
            *offset -= reclaimable;
        }
    }
}

/// The write half of a stream buffer. There is exactly one per edge.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

/// One read half of a stream buffer, one per fan-out consumer.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
    id: usize,
}

/// Create a stream buffer with the given capacity (rounded up to the next
/// power of two) and one `Consumer` per fan-out reader.
pub fn channel<T: Clone>(capacity: usize, num_consumers: usize) -> (Producer<T>, Vec<Consumer<T>>) {
    assert!(num_consumers >= 1, "a stream buffer needs at least one consumer");
    let capacity = capacity.next_power_of_two().max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            backlog: VecDeque::with_capacity(capacity),
            read_offsets: vec![0; num_consumers],
            eos: false,
        }),
        not_full: Condvar::new(),
        not_empty: Condvar::new(),
        capacity,
    });
    let producer = Producer { shared: shared.clone() };
    let consumers = (0..num_consumers)
        .map(|id| Consumer {
            shared: shared.clone(),
            id,
        })
        .collect();
    (producer, consumers)
}

impl<T: Clone> Producer<T> {
    /// Blocks until at least one slot is free behind the slowest consumer,
    /// then writes as many of `items` as fit without exceeding capacity.
    /// Returns the number of elements actually written.
    ///
    /// Writing after `close` has been called is a logic error and panics,
    /// mirroring the scheduler's own step ordering (a worker never writes
    /// after it has closed its outputs).
    pub fn write(&self, items: &[T]) -> usize {
        if items.is_empty() {
            return 0;
        }
        let mut state = self.shared.state.lock().unwrap();
        assert!(!state.eos, "write after close_write");
        loop {
            state.reclaim();
            let used = state.backlog.len() - state.min_read_offset();
            let free = self.shared.capacity.saturating_sub(used);
            if free > 0 {
                let n = free.min(items.len());
                state.backlog.extend(items[..n].iter().cloned());
                drop(state);
                self.shared.not_empty.notify_all();
                return n;
            }
            state = self.shared.not_full.wait(state).unwrap();
        }
    }

    /// Sets the end-of-stream flag and wakes every blocked reader.
    pub fn close(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.eos = true;
        drop(state);
        self.shared.not_empty.notify_all();
    }
}

impl<T: Clone> Consumer<T> {
    /// Blocks until at least one element is available or end-of-stream is
    /// observed with nothing left to read. Returns up to `max` elements and
    /// whether end-of-stream has been reached (an empty vec with `true` means
    /// the stream is fully drained).
    pub fn read(&self, max: usize) -> (Vec<T>, bool) {
        if max == 0 {
            let state = self.shared.state.lock().unwrap();
            return (Vec::new(), state.eos && self.available(&state) == 0);
        }
        let mut state = self.shared.state.lock().unwrap();
        loop {
            let available = self.available(&state);
            if available > 0 {
                let start = state.read_offsets[self.id];
                let n = available.min(max);
                let items: Vec<T> = state.backlog.iter().skip(start).take(n).cloned().collect();
                state.read_offsets[self.id] += n;
                let eos_now = state.eos && self.available(&state) == 0;
                let notify_producer = {
                    let reclaimable = state.min_read_offset();
                    reclaimable > 0
                };
                drop(state);
                if notify_producer {
                    self.shared.not_full.notify_all();
                }
                return (items, eos_now);
            }
            if state.eos {
                return (Vec::new(), true);
            }
            state = self.shared.not_empty.wait(state).unwrap();
        }
    }

    fn available(&self, state: &State<T>) -> usize {
        state.backlog.len() - state.read_offsets[self.id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_write_then_read() {
        let (p, mut cs) = channel::<i32>(8, 1);
        let c = cs.remove(0);
        assert_eq!(p.write(&[1, 2, 3]), 3);
        let (items, eos) = c.read(10);
        assert_eq!(items, vec![1, 2, 3]);
        assert!(!eos);
    }

    #[test]
    fn close_then_drain_observes_eos() {
        let (p, mut cs) = channel::<i32>(8, 1);
        let c = cs.remove(0);
        p.write(&[1, 2]);
        p.close();
        let (items, eos) = c.read(10);
        assert_eq!(items, vec![1, 2]);
        assert!(eos, "all buffered elements were drained, EOS should be visible");

        let (items, eos) = c.read(10);
        assert!(items.is_empty());
        assert!(eos);
    }

    #[test]
    fn capacity_is_rounded_to_power_of_two() {
        let (_p, cs) = channel::<u8>(10, 1);
        drop(cs);
    }

    #[test]
    fn fan_out_delivers_same_sequence_to_every_consumer() {
        let (p, consumers) = channel::<i32>(16, 3);
        p.write(&[10, 20, 30, 40]);
        p.close();
        for c in consumers {
            let (items, eos) = c.read(100);
            assert_eq!(items, vec![10, 20, 30, 40]);
            assert!(eos);
        }
    }

    #[test]
    fn slow_reader_bounds_producer_memory() {
        // Capacity 4: producing more than 4 without any read should never
        // exceed backlog length 4 once reclaim runs relative to the single
        // reader's cursor (capacity is the bound on unread elements).
        let (p, mut cs) = channel::<i32>(4, 1);
        let c = cs.remove(0);
        let written_first = p.write(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(written_first, 4, "producer must not write past capacity before any read");
        let (items, _eos) = c.read(2);
        assert_eq!(items, vec![1, 2]);
        let written_second = p.write(&[5, 6]);
        assert_eq!(written_second, 2);
    }

    #[test]
    fn concurrent_producer_and_consumer_preserve_order() {
        use std::thread;

        let (p, mut cs) = channel::<i32>(64, 1);
        let c = cs.remove(0);
        let total = 2000;

        let writer = thread::spawn(move || {
            let mut sent = 0;
            while sent < total {
                let chunk: Vec<i32> = (sent..(sent + 17).min(total)).collect();
                let n = p.write(&chunk);
                sent += n;
            }
            p.close();
        });

        let mut received = Vec::with_capacity(total as usize);
        loop {
            let (items, eos) = c.read(32);
            received.extend(items);
            if eos {
                break;
            }
        }
        writer.join().unwrap();

        let expected: Vec<i32> = (0..total).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn zero_length_read_reports_eos_without_blocking() {
        let (p, mut cs) = channel::<i32>(4, 1);
        let c = cs.remove(0);
        p.close();
        let (items, eos) = c.read(0);
        assert!(items.is_empty());
        assert!(eos);
    }
}
