//! Fuzz target: receive DMA reconciliation.
//!
//! Each input byte is one step: the high bit picks producer or consumer,
//! the rest is how many bytes move.  The producer position only ever
//! advances; reconciliation must commit exactly the pending bytes when
//! they fit and leave the write index alone when they do not.
//!
//! cargo fuzz run fuzz_rx_reconcile

#![no_main]

use libfuzzer_sys::fuzz_target;
use signalbox::drivers::serial::{Reconciled, reconcile};
use signalbox::fifo::Fifo;

fuzz_target!(|data: &[u8]| {
    let Ok(fifo) = Fifo::new(64) else { return };
    let mut position = 0u32;
    let mut sink = [0u8; 128];

    for &step in data {
        let n = u32::from(step & 0x7f);
        if step & 0x80 == 0 {
            position = position.wrapping_add(n);
            let before = fifo.write_index();
            match reconcile(&fifo, position) {
                Reconciled::Idle => assert_eq!(position, before),
                Reconciled::Committed(k) => {
                    assert!(k <= 64);
                    assert_eq!(fifo.write_index(), position);
                }
                Reconciled::Overflow { pending, available } => {
                    assert!(pending > available);
                    assert_eq!(fifo.write_index(), before);
                    // The line overran us; a real driver restarts the DMA.
                    position = before;
                }
            }
        } else {
            fifo.read(&mut sink[..n as usize]);
        }
        assert_eq!(fifo.used_count() + fifo.avail_count(), 64);
    }
});
