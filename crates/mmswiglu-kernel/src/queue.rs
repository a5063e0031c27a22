use crossbeam::channel::{bounded, Receiver, Sender};

use crate::error::{KernelError, Result};

/// Depth of every staging queue: one slot being filled while one drains.
pub const BUFFER_NUM: usize = 2;

/// A staging buffer checked out of a slot queue.
///
/// Whoever holds the `Slot` owns the buffer; it moves from producer to
/// consumer through `enqueue`/`dequeue` and back through `release`.
#[derive(Debug)]
pub struct Slot<T> {
    data: Vec<T>,
}

impl<T> Slot<T> {
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Producer end of a slot queue: allocates free slots and enqueues filled ones.
#[derive(Debug)]
pub struct SlotProducer<T> {
    name: &'static str,
    free: Receiver<Slot<T>>,
    ready: Sender<Slot<T>>,
}

/// Consumer end of a slot queue: dequeues filled slots and releases them.
#[derive(Debug)]
pub struct SlotConsumer<T> {
    name: &'static str,
    ready: Receiver<Slot<T>>,
    free: Sender<Slot<T>>,
}

/// Create a queue of [`BUFFER_NUM`] slots of `slot_len` elements each.
///
/// All buffers are allocated here; nothing allocates afterwards.
pub fn slot_queue<T: Clone + Default>(
    name: &'static str,
    slot_len: usize,
) -> (SlotProducer<T>, SlotConsumer<T>) {
    let (free_tx, free_rx) = bounded(BUFFER_NUM);
    let (ready_tx, ready_rx) = bounded(BUFFER_NUM);
    for _ in 0..BUFFER_NUM {
        // Capacity is BUFFER_NUM and both ends are alive, so this cannot fail.
        let _ = free_tx.send(Slot {
            data: vec![T::default(); slot_len],
        });
    }
    (
        SlotProducer {
            name,
            free: free_rx,
            ready: ready_tx,
        },
        SlotConsumer {
            name,
            ready: ready_rx,
            free: free_tx,
        },
    )
}

impl<T> SlotProducer<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Take a free slot, blocking until the consumer releases one.
    pub fn alloc(&self) -> Result<Slot<T>> {
        self.free
            .recv()
            .map_err(|_| KernelError::QueueClosed(self.name))
    }

    /// Hand a filled slot to the consumer.
    pub fn enqueue(&self, slot: Slot<T>) -> Result<()> {
        self.ready
            .send(slot)
            .map_err(|_| KernelError::QueueClosed(self.name))
    }
}

impl<T> SlotConsumer<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Take the oldest filled slot, blocking until the producer enqueues one.
    pub fn dequeue(&self) -> Result<Slot<T>> {
        self.ready
            .recv()
            .map_err(|_| KernelError::QueueClosed(self.name))
    }

    /// Return a slot to the free list.
    ///
    /// A producer that has already finished no longer listens; the slot is
    /// then simply dropped.
    pub fn release(&self, slot: Slot<T>) {
        let _ = self.free.send(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_roundtrip() {
        let (tx, rx) = slot_queue::<f32>("test", 4);
        let mut a = tx.alloc().unwrap();
        a.as_mut_slice()[0] = 1.0;
        let mut b = tx.alloc().unwrap();
        b.as_mut_slice()[0] = 2.0;
        tx.enqueue(a).unwrap();
        tx.enqueue(b).unwrap();

        let first = rx.dequeue().unwrap();
        assert_eq!(first.as_slice().len(), 4);
        assert_eq!(first.as_slice()[0], 1.0);
        rx.release(first);
        assert_eq!(rx.dequeue().unwrap().as_slice()[0], 2.0);
    }

    #[test]
    fn test_depth_is_two() {
        let (tx, rx) = slot_queue::<u8>("test", 1);
        let a = tx.alloc().unwrap();
        let _b = tx.alloc().unwrap();
        // With both slots checked out and the consumer gone, nothing is left.
        drop(rx);
        assert!(matches!(tx.alloc(), Err(KernelError::QueueClosed("test"))));
        drop(a);
    }

    #[test]
    fn test_alloc_blocks_until_release() {
        let (tx, rx) = slot_queue::<u8>("test", 1);
        tx.enqueue(tx.alloc().unwrap()).unwrap();
        tx.enqueue(tx.alloc().unwrap()).unwrap();

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let slot = rx.dequeue().unwrap();
            rx.release(slot);
            rx
        });
        // Blocks until the other thread frees a slot.
        assert!(tx.alloc().is_ok());
        drop(releaser.join().unwrap());
    }

    #[test]
    fn test_closed_ends_report_errors() {
        let (tx, rx) = slot_queue::<u8>("gate", 1);
        drop(rx);
        // Buffered free slots are still handed out, then the queue reports closed.
        let slot = tx.alloc().unwrap();
        assert!(matches!(tx.enqueue(slot), Err(KernelError::QueueClosed("gate"))));
        let _ = tx.alloc();
        assert!(tx.alloc().is_err());

        let (tx, rx) = slot_queue::<u8>("up", 1);
        drop(tx);
        assert!(matches!(rx.dequeue(), Err(KernelError::QueueClosed("up"))));
    }
}
