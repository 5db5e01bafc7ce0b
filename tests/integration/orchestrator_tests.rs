//! System orchestrator driven end to end through the dispatcher.

use signalbox::error::{ErrorCode, Status, reason};
use signalbox::events::Signal;

use crate::mock_hw::{FailingPin, Rig};

#[test]
fn start_brings_every_driver_up() {
    let mut rig = Rig::new();
    let seq = rig.start_system();

    assert_eq!(rig.status_of(Signal::SystemStartCfm, seq), Status::SUCCESS);
    for cfm in [
        Signal::SerialStartCfm,
        Signal::LedStartCfm,
        Signal::ButtonStartCfm,
    ] {
        let got = rig.replies(cfm);
        assert_eq!(got.len(), 1, "{cfm}");
        assert!(got[0].status_or_success().is_success());
    }
    assert_eq!(rig.state("serial"), "Started");
    assert_eq!(rig.state("led"), "Started");
    assert_eq!(rig.state("button"), "Up");
    assert!(rig.rx.is_running());
    assert!(rig.tx.is_running());
}

#[test]
fn serial_is_confirmed_before_the_second_phase_starts() {
    let mut rig = Rig::new();
    rig.start_system();
    let order: Vec<Signal> = rig
        .seen
        .borrow()
        .iter()
        .map(|e| e.sig)
        .filter(|s| s.name().ends_with("StartCfm"))
        .collect();
    assert_eq!(order[0], Signal::SerialStartCfm);
    assert_eq!(order.last(), Some(&Signal::SystemStartCfm));
}

#[test]
fn stop_releases_hardware() {
    let mut rig = Rig::new();
    rig.start_system();
    let seq = rig.request(Signal::SystemStopReq);
    rig.settle();

    assert_eq!(rig.status_of(Signal::SystemStopCfm, seq), Status::SUCCESS);
    assert_eq!(rig.state("system"), "Stopped");
    assert_eq!(rig.state("serial"), "Stopped");
    assert_eq!(rig.state("led"), "Stopped");
    assert_eq!(rig.state("button"), "Stopped");
    assert!(!rig.rx.is_running());
    assert!(!rig.tx.is_running());
}

#[test]
fn stop_while_stopped_is_confirmed() {
    let mut rig = Rig::new();
    let seq = rig.request(Signal::SystemStopReq);
    rig.settle();
    assert_eq!(rig.status_of(Signal::SystemStopCfm, seq), Status::SUCCESS);
    assert!(rig.replies(Signal::SerialStopCfm).is_empty());
}

#[test]
fn led_failure_rolls_back_start() {
    let mut rig = Rig::with_led(FailingPin);
    let seq = rig.request(Signal::SystemStartReq);
    rig.settle();

    let status = rig.status_of(Signal::SystemStartCfm, seq);
    assert_eq!(status.error, ErrorCode::HardwareFailure);
    assert_eq!(rig.state("system"), "Stopped");
    // Serial came up in phase one and was taken down again.
    assert_eq!(rig.replies(Signal::SerialStopCfm).len(), 1);
    assert!(!rig.rx.is_running());
    assert_eq!(rig.state("button"), "Stopped");
}

#[test]
fn second_start_is_redundant() {
    let mut rig = Rig::new();
    rig.start_system();
    let again = rig.request(Signal::SystemStartReq);
    rig.settle();
    assert_eq!(
        rig.status_of(Signal::SystemStartCfm, again),
        Status::new(ErrorCode::State, reason::REDUNDANT)
    );
    assert_eq!(rig.state("system"), "Started");
}

#[test]
fn stop_during_start_aborts_it() {
    let mut rig = Rig::new();
    let start = rig.request(Signal::SystemStartReq);
    let stop = rig.request(Signal::SystemStopReq);
    rig.settle();

    assert_eq!(
        rig.status_of(Signal::SystemStartCfm, start),
        Status::new(ErrorCode::State, reason::ABORTED)
    );
    assert_eq!(rig.status_of(Signal::SystemStopCfm, stop), Status::SUCCESS);
    assert_eq!(rig.state("system"), "Stopped");
    assert!(!rig.rx.is_running());
}

#[test]
fn second_stop_is_deferred_and_answered() {
    let mut rig = Rig::new();
    rig.start_system();
    let first = rig.request(Signal::SystemStopReq);
    let second = rig.request(Signal::SystemStopReq);
    rig.settle();

    assert_eq!(rig.status_of(Signal::SystemStopCfm, first), Status::SUCCESS);
    assert_eq!(rig.status_of(Signal::SystemStopCfm, second), Status::SUCCESS);
    // The drivers were only stopped once.
    assert_eq!(rig.replies(Signal::SerialStopCfm).len(), 1);
}

#[test]
fn button_hold_lights_led_and_release_clears_it() {
    let mut rig = Rig::new();
    rig.start_system();
    assert!(!rig.led.is_set_high());

    rig.button.press(rig.line, true);
    rig.settle();
    assert_eq!(rig.state("button"), "Down");
    rig.advance(1_000);
    assert_eq!(rig.replies(Signal::ButtonHoldInd).len(), 1);
    assert!(rig.led.is_set_high());

    rig.button.press(rig.line, false);
    rig.settle();
    assert_eq!(rig.state("button"), "Up");
    assert!(!rig.led.is_set_high());
    assert_eq!(rig.replies(Signal::LedOnCfm).len(), 1);
    assert_eq!(rig.replies(Signal::LedOffCfm).len(), 1);
}

#[test]
fn short_click_does_not_hold() {
    let mut rig = Rig::new();
    rig.start_system();
    rig.button.press(rig.line, true);
    rig.advance(200);
    rig.button.press(rig.line, false);
    rig.advance(2_000);
    assert!(rig.replies(Signal::ButtonHoldInd).is_empty());
    assert_eq!(rig.replies(Signal::ButtonUpInd).len(), 1);
}

#[test]
fn restart_after_stop() {
    let mut rig = Rig::new();
    rig.start_system();
    rig.request(Signal::SystemStopReq);
    rig.settle();
    let seq = rig.start_system();
    assert_eq!(rig.status_of(Signal::SystemStartCfm, seq), Status::SUCCESS);
    assert!(rig.rx.is_running());
}
