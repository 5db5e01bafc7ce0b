//! Traffic controller fed through the serial receive path.

use signalbox::app::ports::Colour;
use signalbox::error::{ErrorCode, Status, reason};
use signalbox::events::Signal;
use signalbox::inject::USAGE;

use crate::mock_hw::Rig;

const QUIET_MS: u32 = 30;

fn heads(rig: &Rig) -> (Option<Colour>, Option<Colour>) {
    (rig.ns.last(), rig.ew.last())
}

/// Inject `bytes` and let the receive path go quiet.
fn type_in(rig: &mut Rig, bytes: &[u8]) {
    assert_eq!(rig.rx.inject(bytes), bytes.len());
    rig.advance(QUIET_MS);
}

#[test]
fn start_rests_on_main_road() {
    let mut rig = Rig::new();
    rig.start_all();
    assert_eq!(rig.state("traffic"), "NsMinTimeWait");
    assert_eq!(heads(&rig), (Some(Colour::Green), Some(Colour::Red)));
    assert_eq!(rig.replies(Signal::TrafficStartCfm).len(), 1);
}

#[test]
fn typed_arrival_after_min_green_runs_a_cycle() {
    let mut rig = Rig::new();
    rig.start_all();
    rig.advance(8_000);
    assert_eq!(rig.state("traffic"), "NsMinTimeExceeded");

    type_in(&mut rig, b"e");
    assert_eq!(rig.state("traffic"), "NsClearing");
    assert_eq!(heads(&rig), (Some(Colour::Yellow), Some(Colour::Red)));

    rig.advance(3_000);
    assert_eq!(rig.state("traffic"), "EwMinTimeWait");
    assert_eq!(heads(&rig), (Some(Colour::Red), Some(Colour::Green)));

    // No more east-west traffic: the idle timer hands the road back.
    rig.advance(6_000);
    assert_eq!(rig.state("traffic"), "EwClearing");
    rig.advance(3_000);
    assert_eq!(rig.state("traffic"), "NsMinTimeWait");
    assert_eq!(heads(&rig), (Some(Colour::Green), Some(Colour::Red)));
}

#[test]
fn early_arrival_waits_out_min_green() {
    let mut rig = Rig::new();
    rig.start_all();
    type_in(&mut rig, b"w");
    assert_eq!(rig.state("traffic"), "NsMinTimeWait");
    assert_eq!(rig.ns.last(), Some(Colour::Green));

    rig.advance(8_000);
    assert_eq!(rig.state("traffic"), "NsClearing");
}

#[test]
fn main_road_arrival_changes_nothing() {
    let mut rig = Rig::new();
    rig.start_all();
    rig.advance(8_000);
    type_in(&mut rig, b"nsns");
    assert_eq!(rig.state("traffic"), "NsMinTimeExceeded");
}

#[test]
fn fault_byte_flashes_red() {
    let mut rig = Rig::new();
    rig.start_all();
    type_in(&mut rig, b"r");
    assert_eq!(rig.state("traffic"), "FlashingOn");
    assert_eq!(heads(&rig), (Some(Colour::Red), Some(Colour::Red)));

    rig.advance(500);
    assert_eq!(rig.state("traffic"), "FlashingOff");
    assert_eq!(heads(&rig), (Some(Colour::Off), Some(Colour::Off)));

    // Arrivals are ignored while flashing.
    type_in(&mut rig, b"e");
    assert!(rig.state("traffic").starts_with("Flashing"));
}

#[test]
fn unknown_byte_prints_usage() {
    let mut rig = Rig::new();
    rig.start_all();
    rig.tx.take_output();
    type_in(&mut rig, b"?");
    assert_eq!(rig.tx.take_output(), USAGE.as_bytes());
}

#[test]
fn long_burst_is_decoded_in_batches() {
    let mut rig = Rig::new();
    rig.start_all();
    rig.advance(8_000);
    // Twenty main-road arrivals, then one side-road arrival at the end.
    let mut burst = vec![b'n'; 20];
    burst.push(b'e');
    type_in(&mut rig, &burst);
    assert_eq!(rig.state("traffic"), "NsClearing");
    assert!(rig.board.buffers.rx.is_empty());
    assert_eq!(rig.board.dispatcher.dropped(), 0);
}

#[test]
fn stop_darkens_both_heads() {
    let mut rig = Rig::new();
    rig.start_all();
    let seq = rig.request(Signal::TrafficStopReq);
    rig.settle();
    assert_eq!(rig.status_of(Signal::TrafficStopCfm, seq), Status::SUCCESS);
    assert_eq!(rig.state("traffic"), "Stopped");
    assert_eq!(heads(&rig), (Some(Colour::Off), Some(Colour::Off)));
}

#[test]
fn second_start_is_refused() {
    let mut rig = Rig::new();
    rig.start_all();
    let seq = rig.request(Signal::TrafficStartReq);
    rig.settle();
    assert_eq!(
        rig.status_of(Signal::TrafficStartCfm, seq),
        Status::new(ErrorCode::State, reason::REDUNDANT)
    );
}
