//! Serial receive and transmit paths through the simulated DMA.

use signalbox::error::ErrorCode;
use signalbox::events::Signal;
use signalbox::inject::USAGE;

use crate::mock_hw::Rig;

/// Longer than the receive activity window.
const QUIET_MS: u32 = 30;

#[test]
fn line_is_dead_until_started() {
    let rig = Rig::new();
    assert_eq!(rig.rx.inject(b"nnn"), 0);
}

#[test]
fn quiet_line_flushes_received_bytes() {
    let mut rig = Rig::new();
    rig.start_system();
    assert_eq!(rig.rx.inject(b"  \r\n"), 4);
    rig.settle();
    assert!(rig.replies(Signal::UartInDataInd).is_empty());

    rig.advance(QUIET_MS);
    assert_eq!(rig.replies(Signal::UartInDataInd).len(), 1);
    // The traffic controller consumed them, even while stopped.
    assert!(rig.board.buffers.rx.is_empty());
    assert_eq!(rig.board.buffers.rx.write_index(), 4);
}

#[test]
fn half_transfer_reports_without_waiting() {
    let mut rig = Rig::new();
    rig.start_system();
    let cap = rig.board.buffers.rx.capacity() as usize;
    rig.rx.inject(&vec![b' '; cap / 2]);
    rig.settle();
    assert_eq!(rig.replies(Signal::UartInDataInd).len(), 1);
}

#[test]
fn overflow_commits_nothing_and_reports() {
    let mut rig = Rig::new();
    rig.start_system();
    let cap = rig.board.buffers.rx.capacity();
    assert_eq!(cap, 256);

    // Half, full and data-ready all fire while 300 bytes land at once.
    rig.rx.inject(&[b' '; 300]);
    rig.advance(QUIET_MS);

    assert!(rig.replies(Signal::UartInDataInd).is_empty());
    let fails = rig.replies(Signal::UartInFailInd);
    assert!(!fails.is_empty());
    for f in &fails {
        let status = f.status_or_success();
        assert_eq!(status.error, ErrorCode::Overflow);
        assert_eq!(status.reason, 300);
    }
    assert_eq!(rig.board.buffers.rx.write_index(), 0);
    assert_eq!(rig.board.buffers.rx.used_count(), 0);
}

#[test]
fn reception_resumes_after_overflow() {
    let mut rig = Rig::new();
    rig.start_system();
    rig.rx.inject(&[b' '; 300]);
    rig.advance(QUIET_MS);
    assert_eq!(rig.replies(Signal::UartInFailInd).len(), 1);
    assert!(rig.rx.is_running());
    assert_eq!(rig.state("serial"), "Started");

    assert_eq!(rig.rx.inject(b"nn"), 2);
    rig.advance(QUIET_MS);
    assert_eq!(rig.replies(Signal::UartInDataInd).len(), 1);
    assert_eq!(rig.replies(Signal::UartInFailInd).len(), 1);
    assert_eq!(rig.board.buffers.rx.write_index(), 2);
    assert!(rig.board.buffers.rx.is_empty());
}

#[test]
fn line_fault_is_reported() {
    let mut rig = Rig::new();
    rig.start_system();
    rig.rx.fault();
    rig.settle();
    let fails = rig.replies(Signal::UartInFailInd);
    assert_eq!(fails.len(), 1);
    assert_eq!(fails[0].status_or_success().error, ErrorCode::HardwareFailure);
    assert!(!rig.rx.is_running());
    // Transmit keeps going.
    assert!(rig.tx.is_running());
}

#[test]
fn console_text_goes_out_in_chunks() {
    let mut rig = Rig::new();
    rig.start_all();
    let sent = rig.tx.take_output();
    assert_eq!(sent, USAGE.as_bytes());
    assert_eq!(rig.replies(Signal::UartOutEmptyInd).len(), 1);
    assert!(rig.board.buffers.tx.is_empty());
}

#[test]
fn stalled_transmit_times_out() {
    let mut rig = Rig::new();
    rig.start_system();
    rig.tx.hold(true);
    rig.request(Signal::TrafficStartReq);
    rig.advance(250);
    let fails = rig.replies(Signal::UartOutFailInd);
    assert_eq!(fails.len(), 1);
    assert_eq!(fails[0].status_or_success().error, ErrorCode::Timeout);
    assert!(!rig.tx.is_running());
}

#[test]
fn held_transmit_finishes_on_completion() {
    let mut rig = Rig::new();
    rig.start_system();
    rig.tx.hold(true);
    rig.request(Signal::TrafficStartReq);
    rig.settle();
    assert!(rig.replies(Signal::UartOutEmptyInd).is_empty());
    // Two chunks: the usage text is longer than one transfer.
    rig.tx.complete();
    rig.settle();
    rig.tx.complete();
    rig.settle();
    assert_eq!(rig.replies(Signal::UartOutEmptyInd).len(), 1);
    assert_eq!(rig.tx.take_output(), USAGE.as_bytes());
}
