//! Interrupt-to-task event path.
//!
//! Interrupt handlers never touch mailboxes.  They raise an [`Evt`] on the
//! shared [`IsrLine`]; the dispatcher drains the queue from the main loop
//! and publishes each event.
//!
//! ```text
//! ┌─────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ UART ISR    │────▶│                   │     │              │
//! │ DMA ISR     │────▶│  spsc::Queue<Evt> │────▶│  Dispatcher  │
//! │ GPIO ISR    │────▶│  (lock-free)      │     │  (consumer)  │
//! └─────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! Several interrupt sources share the single producer half, so the producer
//! sits behind a `critical_section::Mutex`.  The consumer half is owned by
//! the dispatcher and needs no locking.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::spsc::{Consumer, Producer, Queue};
use log::warn;

use crate::events::Evt;

/// Queue slots.  `heapless` keeps one slot free, so `ISR_QUEUE_LEN - 1`
/// events can be pending.
pub const ISR_QUEUE_LEN: usize = 32;

type IsrQueue = Queue<Evt, ISR_QUEUE_LEN>;

/// Producer side, shared by every interrupt source.
pub struct IsrLine {
    producer: Mutex<RefCell<Producer<'static, Evt, ISR_QUEUE_LEN>>>,
}

impl IsrLine {
    /// Enqueue `evt`.  Safe to call from interrupt context.
    /// Returns `false` if the queue is full and the event was dropped.
    pub fn raise(&self, evt: Evt) -> bool {
        let queued =
            critical_section::with(|cs| self.producer.borrow_ref_mut(cs).enqueue(evt).is_ok());
        if !queued {
            warn!("isr: queue full, dropped {}", evt.sig);
        }
        queued
    }
}

/// Consumer side, owned by the dispatcher.
pub struct IsrDrain {
    consumer: Consumer<'static, Evt, ISR_QUEUE_LEN>,
}

impl IsrDrain {
    pub fn pop(&mut self) -> Option<Evt> {
        self.consumer.dequeue()
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.len() == 0
    }
}

/// Create the interrupt queue.  The queue lives for the rest of the
/// program; call once at boot.
pub fn channel() -> (&'static IsrLine, IsrDrain) {
    let queue: &'static mut IsrQueue = Box::leak(Box::new(Queue::new()));
    let (producer, consumer) = queue.split();
    let line = Box::leak(Box::new(IsrLine {
        producer: Mutex::new(RefCell::new(producer)),
    }));
    (line, IsrDrain { consumer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Signal;

    #[test]
    fn raise_then_drain_in_order() {
        let (line, mut drain) = channel();
        assert!(line.raise(Evt::new(Signal::ButtonTrig)));
        assert!(line.raise(Evt::new(Signal::UartInDataRdy)));
        assert_eq!(drain.len(), 2);
        assert_eq!(drain.pop().map(|e| e.sig), Some(Signal::ButtonTrig));
        assert_eq!(drain.pop().map(|e| e.sig), Some(Signal::UartInDataRdy));
        assert!(drain.pop().is_none());
    }

    #[test]
    fn full_queue_drops() {
        let (line, mut drain) = channel();
        for _ in 0..ISR_QUEUE_LEN - 1 {
            assert!(line.raise(Evt::new(Signal::UartInDmaRecv)));
        }
        assert!(!line.raise(Evt::new(Signal::UartInDmaRecv)));
        assert!(drain.pop().is_some());
        assert!(line.raise(Evt::new(Signal::UartInDmaRecv)));
    }

    #[test]
    fn raise_from_other_thread() {
        let (line, mut drain) = channel();
        std::thread::spawn(move || {
            line.raise(Evt::new(Signal::UartInHwFail));
        })
        .join()
        .unwrap();
        assert_eq!(drain.pop().map(|e| e.sig), Some(Signal::UartInHwFail));
    }
}
