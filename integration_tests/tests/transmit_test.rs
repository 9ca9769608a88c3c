use integration_tests::prelude::*;
use Step::*;

#[test]
fn test_transmit_from_idle() {
    init_logging();
    let h = Harness::new();
    let can = h.open_default();

    let frame = CanFrame::new(CanId::extended(0x18FF_1234), &[0xDE, 0xAD, 0xBE, 0xEF]);
    can.start_xmit(frame).unwrap();
    assert!(h.queue.is_stopped());
    assert!(can.gate_snapshot().outgoing_occupied);

    h.chip.run_until_idle(&can);
    assert_eq!(
        vec![LoadTransmitBuffer, RequestSend, ReadFlags, ClearStatusFlags, ReadFlags],
        h.chip.take_submitted()
    );
    let bytes = h.chip.take_submitted_bytes();
    assert_eq!(
        vec![0x40, 0xC7, 0xEB, 0x12, 0x34, 0x04, 0xDE, 0xAD, 0xBE, 0xEF],
        bytes[0]
    );
    assert_eq!(vec![0x81], bytes[1]);

    assert_eq!(vec![frame], h.chip.take_transmitted());
    assert_eq!(vec![frame], h.queue.take_completed());
    assert!(!h.queue.is_stopped());
    assert!(!can.gate_snapshot().outgoing_occupied);
    let stats = can.stats();
    assert_eq!(1, stats.tx_packets);
    assert_eq!(4, stats.tx_bytes);
}

#[test]
fn test_remote_frame_transmit() {
    let h = Harness::new();
    let can = h.open_default();

    let frame = CanFrame::new_rtr(CanId::std(0x321), 6);
    can.start_xmit(frame).unwrap();
    h.chip.run_until_idle(&can);

    // The header carries the length; remote frames load no data bytes
    assert_eq!(
        vec![0x40, 0x64, 0x20, 0, 0, 0x46, 0, 0, 0, 0, 0, 0],
        h.chip.take_submitted_bytes()[0]
    );
    assert_eq!(vec![frame], h.chip.take_transmitted());
}

#[test]
fn test_second_frame_rejected_until_sent() {
    let h = Harness::new();
    let can = h.open_default();

    let first = CanFrame::new(CanId::std(1), &[1]);
    let second = CanFrame::new(CanId::std(2), &[2]);
    can.start_xmit(first).unwrap();
    assert_eq!(Err(second), can.start_xmit(second));
    assert!(h.queue.is_stopped());

    h.chip.run_until_idle(&can);
    assert!(!h.queue.is_stopped());
    can.start_xmit(second).unwrap();
    h.chip.run_until_idle(&can);
    assert_eq!(vec![first, second], h.chip.take_transmitted());
    assert_eq!(vec![first, second], h.queue.take_completed());
}

#[test]
fn test_transmit_rejected_while_closed() {
    let h = Harness::new();
    let can = h.probe(default_config()).unwrap();
    let frame = CanFrame::new(CanId::std(1), &[]);
    assert_eq!(Err(frame), can.start_xmit(frame));
    assert_eq!(0, h.chip.pending_count());
}

#[test]
fn test_failed_load_is_retried() {
    init_logging();
    let h = Harness::new();
    let can = h.open_default();

    let frame = CanFrame::new(CanId::std(0x42), &[4, 2]);
    h.chip.fail_next_submits(1);
    can.start_xmit(frame).unwrap();
    let snap = can.gate_snapshot();
    assert!(snap.stalled && snap.transmit_pending && snap.outgoing_occupied);

    can.notify_interrupt();
    h.chip.run_until_idle(&can);
    assert_eq!(
        vec![
            LoadTransmitBuffer,
            LoadTransmitBuffer,
            RequestSend,
            ReadFlags,
            ClearStatusFlags,
            ReadFlags
        ],
        h.chip.take_submitted()
    );
    assert_eq!(vec![frame], h.chip.take_transmitted());
}

#[test]
fn test_failed_request_to_send_reloads_frame() {
    let h = Harness::new();
    let can = h.open_default();

    let frame = CanFrame::new(CanId::std(0x43), &[4, 3]);
    can.start_xmit(frame).unwrap();
    h.chip.fail_next_submits(1);
    h.chip.complete_next(&can);
    assert!(can.gate_snapshot().stalled);
    assert!(h.chip.take_transmitted().is_empty());

    can.notify_interrupt();
    h.chip.run_until_idle(&can);
    assert_eq!(vec![frame], h.chip.take_transmitted());
    assert_eq!(vec![frame], h.queue.take_completed());
    assert!(!can.gate_snapshot().busy);
}

#[test]
fn test_loopback_echo() {
    let h = Harness::new();
    let can = h
        .probe(default_config().with_ctrl_mode(ControlMode::LOOPBACK))
        .unwrap();
    can.open().unwrap();
    h.chip.run_until_idle(&can);

    let frame = CanFrame::new(CanId::std(0x77), &[7, 7, 7]);
    can.start_xmit(frame).unwrap();
    h.chip.run_until_idle(&can);

    assert_eq!(vec![frame], h.sink.take());
    assert_eq!(vec![frame], h.queue.take_completed());
    assert_eq!(1, can.stats().rx_packets);
    assert_eq!(1, can.stats().tx_packets);
    assert_eq!(0, h.chip.overlap_count());
}

#[test]
fn test_close_drops_unsent_frame() {
    init_logging();
    let h = Harness::new();
    let can = h.open_default();

    let frame = CanFrame::new(CanId::std(0x99), &[9]);
    can.start_xmit(frame).unwrap();
    assert_eq!(1, h.chip.pending_count());

    // The load never completes: close gives up waiting and resets the chip
    can.close();
    let snap = can.gate_snapshot();
    assert!(snap.busy && snap.abandoned && !snap.outgoing_occupied);
    assert_eq!(ControllerState::Stopped, can.state());

    // A late completion is discarded and ends the chain
    h.chip.take_submitted();
    assert!(h.chip.complete_next(&can));
    assert!(h.chip.take_submitted().is_empty());
    assert!(h.queue.take_completed().is_empty());
    assert_eq!(GateSnapshot::default(), can.gate_snapshot());

    // The interface comes back clean
    can.open().unwrap();
    h.chip.run_until_idle(&can);
    can.start_xmit(frame).unwrap();
    h.chip.run_until_idle(&can);
    assert_eq!(vec![frame], h.queue.take_completed());
}

#[test]
fn test_late_completion_after_reopen() {
    init_logging();
    let h = Harness::new();
    let can = h.open_default();

    let frame = CanFrame::new(CanId::std(0x98), &[9, 8]);
    can.start_xmit(frame).unwrap();
    h.chip.take_submitted();

    // The load is still outstanding across close and open
    can.close();
    can.open().unwrap();
    assert!(h.chip.take_submitted().is_empty());
    assert_eq!(1, h.chip.pending_count());
    let snap = can.gate_snapshot();
    assert!(snap.busy && snap.abandoned && snap.interrupt_pending);

    // Its completion is discarded, then the kick-off flag read follows
    h.chip.run_until_idle(&can);
    assert_eq!(vec![ReadFlags], h.chip.take_submitted());
    assert_eq!(0, h.chip.overlap_count());
    assert!(h.chip.take_transmitted().is_empty());
    assert!(h.queue.take_completed().is_empty());
    assert!(!can.gate_snapshot().busy);

    can.start_xmit(frame).unwrap();
    h.chip.run_until_idle(&can);
    assert_eq!(vec![frame], h.chip.take_transmitted());
    assert_eq!(0, h.chip.overlap_count());
}

#[test]
fn test_transmit_request_restarts_stalled_frame() {
    init_logging();
    let h = Harness::new();
    let can = h.open_default();

    let first = CanFrame::new(CanId::std(0x11), &[1]);
    let second = CanFrame::new(CanId::std(0x22), &[2]);
    h.chip.fail_next_submits(1);
    can.start_xmit(first).unwrap();
    assert!(can.gate_snapshot().stalled);
    assert!(!h.chip.irq_asserted());

    // No interrupt will come; the next request reloads the held frame
    assert_eq!(Err(second), can.start_xmit(second));
    assert_eq!(1, h.chip.pending_count());
    let snap = can.gate_snapshot();
    assert!(!snap.stalled && !snap.transmit_pending && snap.outgoing_occupied);

    h.chip.run_until_idle(&can);
    assert_eq!(
        vec![
            LoadTransmitBuffer,
            LoadTransmitBuffer,
            RequestSend,
            ReadFlags,
            ClearStatusFlags,
            ReadFlags
        ],
        h.chip.take_submitted()
    );
    assert_eq!(vec![first], h.chip.take_transmitted());
    assert_eq!(vec![first], h.queue.take_completed());

    can.start_xmit(second).unwrap();
    h.chip.run_until_idle(&can);
    assert_eq!(vec![second], h.chip.take_transmitted());
}
