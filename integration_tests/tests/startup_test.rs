use integration_tests::prelude::*;
use mcpcan_driver::BerrCounter;

/// The blocking writes of one start sequence in normal mode at 500 kbit/s
fn start_writes(cnf2: u8, canctrl: u8) -> Vec<Vec<u8>> {
    vec![
        vec![0xC0],
        vec![0x02, 0x28, 0x01, cnf2, 0x00, 0x3F],
        vec![0x02, 0x60, 0x64],
        vec![0x02, 0x70, 0x60],
        vec![0x02, 0x0F, canctrl],
    ]
}

#[test]
fn test_open_configures_chip() {
    init_logging();
    let h = Harness::new();
    let can = h.probe(default_config()).unwrap();
    h.chip.take_writes();

    can.open().unwrap();
    assert_eq!(start_writes(0x91, 0x00), h.chip.take_writes());
    assert_eq!(0x00, h.chip.reg(0x0E) & 0xE0);
    assert_eq!(ControllerState::ErrorActive, can.state());
    assert_eq!(1, h.queue.wake_count());

    // Open kicks off one flag read, in case the interrupt line is already low
    assert_eq!(vec![Step::ReadFlags], h.chip.take_submitted());
    h.chip.run_until_idle(&can);
    assert!(!can.gate_snapshot().busy);
}

#[test]
fn test_mode_selection() {
    let cases = [
        (ControlMode::LOOPBACK, 0x91, 0x40),
        (ControlMode::LOOPBACK | ControlMode::LISTEN_ONLY, 0x91, 0x40),
        (ControlMode::LISTEN_ONLY, 0x91, 0x60),
        (ControlMode::TRIPLE_SAMPLING, 0xD1, 0x00),
        // One shot sets OSM, and the mode poll still succeeds
        (ControlMode::ONE_SHOT, 0x91, 0x08),
        (ControlMode::ONE_SHOT | ControlMode::LISTEN_ONLY, 0x91, 0x68),
    ];
    for (mode, cnf2, canctrl) in cases {
        let h = Harness::new();
        let can = h
            .probe(default_config().with_ctrl_mode(mode))
            .unwrap();
        h.chip.take_writes();
        can.open().unwrap();
        assert_eq!(start_writes(cnf2, canctrl), h.chip.take_writes(), "{mode:?}");
        assert_eq!(canctrl & 0xE0, h.chip.reg(0x0E) & 0xE0);
    }
}

#[test]
fn test_mode_timeout() {
    init_logging();
    let h = Harness::new();
    let board = BoardLog::default();
    let power = |on: bool| board.push("power", on);
    let transceiver = |on: bool| board.push("transceiver", on);
    let can = Mcp2515::probe(
        &h.chip,
        default_config(),
        &h.sink,
        &h.queue,
        &h.clock,
        Callbacks {
            board_setup: None,
            power_enable: Some(&power),
            transceiver_enable: Some(&transceiver),
        },
    )
    .unwrap();
    board.take();

    h.chip.set_freeze_mode(true);
    assert_eq!(
        Err(DriverError::ModeTimeout {
            mode: mcpcan_common::OperatingMode::Normal
        }),
        can.open()
    );
    assert_eq!(
        vec![
            ("power", true),
            ("transceiver", true),
            ("transceiver", false),
            ("power", false)
        ],
        board.take()
    );
    assert_eq!(ControllerState::Stopped, can.state());

    // The interface is not up: stimuli are ignored
    can.notify_interrupt();
    assert!(h.chip.take_submitted().is_empty());
    let frame = CanFrame::new(CanId::std(1), &[]);
    assert_eq!(Err(frame), can.start_xmit(frame));
}

#[test]
fn test_open_bus_failure() {
    let h = Harness::new();
    let can = h.probe(default_config()).unwrap();
    h.chip.set_fail_blocking(true);
    assert_eq!(
        Err(DriverError::BusTransfer { operation: "reset" }),
        can.open()
    );
    assert!(!can.gate_snapshot().busy);
}

#[test]
fn test_close_and_reopen() {
    let h = Harness::new();
    let can = h.open_default();

    can.close();
    assert_eq!(vec![vec![0xC0]], h.chip.take_writes());
    assert_eq!(ControllerState::Stopped, can.state());
    assert!(h.queue.is_stopped());
    assert_eq!(0x80, h.chip.reg(0x0E) & 0xE0);

    // Restarting runs the identical sequence
    can.open().unwrap();
    assert_eq!(start_writes(0x91, 0x00), h.chip.take_writes());
    assert_eq!(ControllerState::ErrorActive, can.state());
    assert!(!h.queue.is_stopped());
}

#[test]
fn test_set_mode() {
    let h = Harness::new();
    let can = h.open_default();

    assert_eq!(Err(DriverError::UnsupportedMode), can.set_mode(CanMode::Sleep));
    assert_eq!(Err(DriverError::UnsupportedMode), can.set_mode(CanMode::Stop));
    assert!(h.chip.take_writes().is_empty());

    can.set_mode(CanMode::Start).unwrap();
    assert_eq!(start_writes(0x91, 0x00), h.chip.take_writes());
    assert_eq!(ControllerState::ErrorActive, can.state());
    assert_eq!(vec![Step::ReadFlags], h.chip.take_submitted());
    h.chip.run_until_idle(&can);

    // Still accepting frames after the restart
    let frame = CanFrame::new(CanId::std(0x10), &[1]);
    can.start_xmit(frame).unwrap();
    h.chip.run_until_idle(&can);
    assert_eq!(vec![frame], h.chip.take_transmitted());
}

#[test]
fn test_berr_counter() {
    let h = Harness::new();
    let can = h.open_default();
    h.chip.set_error_counters(5, 130);
    assert_eq!(
        BerrCounter {
            txerr: 5,
            rxerr: 130
        },
        can.berr_counter().unwrap()
    );
}

#[test]
fn test_restart_with_transfer_outstanding() {
    init_logging();
    let h = Harness::new();
    let can = h.open_default();

    h.chip.receive_frame(CanFrame::new(CanId::std(0x321), &[3, 2, 1]));
    can.notify_interrupt();
    h.chip.complete_next(&can);
    assert_eq!(
        vec![Step::ReadFlags, Step::ReadRxBuf0],
        h.chip.take_submitted()
    );

    // The receive buffer read is still outstanding when the chip is reset
    can.set_mode(CanMode::Start).unwrap();
    assert_eq!(1, h.chip.pending_count());
    assert!(h.chip.take_submitted().is_empty());
    assert!(h.chip.blocking_overlap_count() > 0);
    assert!(can.gate_snapshot().abandoned);

    // The stale response is not taken for flags; one fresh chain follows it
    h.chip.run_until_idle(&can);
    assert_eq!(vec![Step::ReadFlags], h.chip.take_submitted());
    assert_eq!(0, h.chip.overlap_count());
    assert!(h.sink.take().is_empty());
    assert_eq!(0, can.stats().rx_packets);
    let snap = can.gate_snapshot();
    assert!(!snap.busy && !snap.interrupt_pending && !snap.abandoned);
}

#[test]
fn test_set_mode_requires_open_interface() {
    let h = Harness::new();
    let can = h.probe(default_config()).unwrap();
    h.chip.take_writes();

    assert_eq!(Err(DriverError::InterfaceDown), can.set_mode(CanMode::Start));
    assert!(h.chip.take_writes().is_empty());

    can.open().unwrap();
    h.chip.run_until_idle(&can);
    can.close();
    h.chip.take_writes();
    assert_eq!(Err(DriverError::InterfaceDown), can.set_mode(CanMode::Start));
    assert!(h.chip.take_writes().is_empty());
    assert!(!can.gate_snapshot().busy);
}

#[test]
fn test_set_mode_retry_after_failed_restart() {
    let h = Harness::new();
    let can = h.open_default();

    h.chip.set_freeze_mode(true);
    assert_eq!(
        Err(DriverError::ModeTimeout {
            mode: mcpcan_common::OperatingMode::Normal
        }),
        can.set_mode(CanMode::Start)
    );
    assert_eq!(ControllerState::Stopped, can.state());

    h.chip.set_freeze_mode(false);
    can.set_mode(CanMode::Start).unwrap();
    assert_eq!(ControllerState::ErrorActive, can.state());
    h.chip.run_until_idle(&can);

    let frame = CanFrame::new(CanId::std(0x10), &[1]);
    can.start_xmit(frame).unwrap();
    h.chip.run_until_idle(&can);
    assert_eq!(vec![frame], h.chip.take_transmitted());
}
