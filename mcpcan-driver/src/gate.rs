//! Arbitration between the stimuli which start a transaction chain
//!
//! Interrupts, transmit requests and the chain itself all decide what happens next through the
//! [`Gate`]. Every decision is a short check-and-set on the shared flags inside a critical section,
//! and the lock is never held across a bus transfer. A method returning a [`Step`] hands the caller
//! the right, and the obligation, to issue that step.
//!
//! When the chip is reset while a transfer is still outstanding, the chain is marked abandoned but
//! stays busy. The stale completion is discarded, and the chain continues from the gate flags
//! alone, so a restarted interface never has two transfers outstanding.
use core::cell::RefCell;

use critical_section::Mutex;
use defmt_or_log::trace;
use mcpcan_common::{traits::TransmitQueue, CanFrame};

use crate::{chain::Step, command::BusCommand};

#[derive(Debug, Default)]
struct GateState {
    /// Interrupts and transmit requests are accepted
    armed: bool,
    /// A transaction chain is running
    busy: bool,
    /// An interrupt arrived while busy
    interrupt_pending: bool,
    /// A transmit request arrived while busy
    transmit_pending: bool,
    /// The chain stopped after a failed submission, with no transfer outstanding
    stalled: bool,
    /// The step whose transfer is outstanding
    in_flight: Option<Step>,
    /// The chip was reset under the running chain
    abandoned: bool,
    /// The frame owned by the driver, from acceptance until the chip reports it sent
    outgoing: Option<CanFrame>,
}

impl GateState {
    /// Pick the step which restarts a stalled chain
    fn resume(&mut self) -> Step {
        self.stalled = false;
        self.interrupt_pending = false;
        if core::mem::take(&mut self.transmit_pending) && self.outgoing.is_some() {
            Step::LoadTransmitBuffer
        } else {
            Step::ReadFlags
        }
    }

    fn quiescent(&mut self) -> Option<Step> {
        self.abandoned = false;
        if !self.armed {
            self.interrupt_pending = false;
            self.transmit_pending = false;
            self.busy = false;
            None
        } else if self.transmit_pending {
            self.transmit_pending = false;
            if self.outgoing.is_some() {
                Some(Step::LoadTransmitBuffer)
            } else {
                Some(Step::ReadFlags)
            }
        } else if self.interrupt_pending {
            self.interrupt_pending = false;
            Some(Step::ReadFlags)
        } else {
            self.busy = false;
            None
        }
    }
}

/// A copy of the gate flags, for diagnostics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GateSnapshot {
    /// A transaction chain is running, or stalled
    pub busy: bool,
    /// An interrupt is waiting to be serviced by the running chain
    pub interrupt_pending: bool,
    /// A transmit request is waiting to be serviced by the running chain
    pub transmit_pending: bool,
    /// The chain stopped after a failed submission
    pub stalled: bool,
    /// The chip was reset while a transfer was outstanding, and its completion is still to come
    pub abandoned: bool,
    /// A frame is held for transmission or awaiting its completion
    pub outgoing_occupied: bool,
}

/// A transmit request which was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Rejected {
    /// The frame, handed back to the caller
    pub frame: CanFrame,
    /// The step to issue when the request restarted a stalled chain
    pub resume: Option<Step>,
}

#[derive(Debug)]
pub(crate) struct Gate {
    state: Mutex<RefCell<GateState>>,
}

impl Gate {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(GateState {
                armed: false,
                busy: false,
                interrupt_pending: false,
                transmit_pending: false,
                stalled: false,
                in_flight: None,
                abandoned: false,
                outgoing: None,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut GateState) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    /// Start accepting stimuli
    pub fn arm(&self) {
        self.with(|s| s.armed = true);
    }

    /// Stop accepting stimuli
    ///
    /// A running chain continues to its next quiescent point, where it stops regardless of pending
    /// work.
    pub fn disarm(&self) {
        self.with(|s| {
            s.armed = false;
            s.interrupt_pending = false;
            s.transmit_pending = false;
        });
    }

    /// An interrupt was signaled
    ///
    /// Returns the step to issue if this starts, or restarts, the chain.
    pub fn notify_interrupt(&self) -> Option<Step> {
        self.with(|s| {
            if !s.armed {
                None
            } else if s.busy && s.stalled {
                let step = s.resume();
                trace!("Interrupt resumes stalled chain");
                Some(step)
            } else if s.busy {
                s.interrupt_pending = true;
                None
            } else {
                s.busy = true;
                Some(Step::ReadFlags)
            }
        })
    }

    /// Take ownership of `frame` for transmission
    ///
    /// An accepted frame stops `queue` in the same critical section, so a concurrent transmit
    /// completion cannot wake it again. The frame is handed back if the gate is disarmed, or a
    /// previous frame has not yet been reported sent; a stalled chain is restarted either way.
    /// Returns the step to issue if this starts the chain.
    pub fn request_transmit(
        &self,
        frame: CanFrame,
        queue: &dyn TransmitQueue,
    ) -> Result<Option<Step>, Rejected> {
        self.with(|s| {
            if !s.armed {
                return Err(Rejected {
                    frame,
                    resume: None,
                });
            }
            if s.outgoing.is_some() {
                let resume = (s.busy && s.stalled).then(|| s.resume());
                return Err(Rejected { frame, resume });
            }
            s.outgoing = Some(frame);
            queue.stop_queue();
            if s.busy && s.stalled {
                s.stalled = false;
                s.transmit_pending = false;
                Ok(Some(Step::LoadTransmitBuffer))
            } else if s.busy {
                s.transmit_pending = true;
                Ok(None)
            } else {
                s.busy = true;
                Ok(Some(Step::LoadTransmitBuffer))
            }
        })
    }

    /// The chain has handled every flag it read
    ///
    /// Pending transmits are served before pending interrupts. Returns None when the chain ends.
    pub fn quiescent(&self) -> Option<Step> {
        self.with(|s| s.quiescent())
    }

    /// Choose between loading a pending transmit and reading the flags again
    pub fn transmit_or_read_flags(&self) -> Step {
        self.with(|s| {
            s.abandoned = false;
            if core::mem::take(&mut s.transmit_pending) && s.outgoing.is_some() {
                Step::LoadTransmitBuffer
            } else {
                Step::ReadFlags
            }
        })
    }

    /// Record the transfer for `step` as outstanding and build its command
    ///
    /// If the chip was reset while the caller was deciding on `step`, the decision is stale and
    /// the chain continues from the gate flags instead, which may end it.
    pub fn begin_transfer(
        &self,
        step: Step,
        build: impl FnOnce(Step, Option<CanFrame>) -> BusCommand,
    ) -> Option<BusCommand> {
        self.with(|s| {
            let step = if core::mem::take(&mut s.abandoned) {
                trace!("Chip reset under the chain, dropping {:?}", step);
                s.quiescent()?
            } else {
                step
            };
            let cmd = build(step, s.outgoing);
            s.in_flight = Some(cmd.step());
            Some(cmd)
        })
    }

    /// Take the outstanding transfer, and whether it was abandoned by a chip reset
    pub fn finish_transfer(&self) -> Option<(Step, bool)> {
        self.with(|s| {
            let step = s.in_flight.take()?;
            Some((step, core::mem::take(&mut s.abandoned)))
        })
    }

    /// The chip reported the transmit buffer empty
    ///
    /// Releases the outgoing frame, and wakes `queue` while the interface is up.
    pub fn complete_transmit(&self, queue: &dyn TransmitQueue) -> Option<CanFrame> {
        self.with(|s| {
            if s.abandoned {
                return None;
            }
            let frame = s.outgoing.take();
            if s.armed {
                queue.wake_queue();
            }
            frame
        })
    }

    /// Submission of `failed` was refused; the chain stops with no transfer outstanding
    pub fn stall(&self, failed: Step) {
        self.with(|s| {
            s.stalled = true;
            s.in_flight = None;
            s.abandoned = false;
            if matches!(failed, Step::LoadTransmitBuffer | Step::RequestSend) {
                s.transmit_pending = true;
            }
        });
    }

    /// True when no transfer can be outstanding: no chain runs, or it stalled
    pub fn is_quiescent(&self) -> bool {
        self.with(|s| !s.busy || s.stalled)
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.with(|s| GateSnapshot {
            busy: s.busy,
            interrupt_pending: s.interrupt_pending,
            transmit_pending: s.transmit_pending,
            stalled: s.stalled,
            abandoned: s.abandoned,
            outgoing_occupied: s.outgoing.is_some(),
        })
    }

    /// Reset the gate after the chip was reset, returning any frame which was never reported sent
    ///
    /// A chain still running is kept busy, and marked abandoned, until its outstanding completion
    /// has been discarded.
    pub fn release(&self) -> Option<CanFrame> {
        self.with(|s| {
            let running = s.busy && !s.stalled;
            let frame = s.outgoing.take();
            *s = GateState {
                busy: running,
                abandoned: running,
                in_flight: if running { s.in_flight } else { None },
                ..Default::default()
            };
            frame
        })
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicBool, Ordering};

    use mcpcan_common::CanId;

    use super::*;

    fn frame(id: u16) -> CanFrame {
        CanFrame::new(CanId::std(id), &[id as u8])
    }

    fn armed_gate() -> Gate {
        let gate = Gate::new();
        gate.arm();
        gate
    }

    #[derive(Default)]
    struct TestQueue {
        stopped: AtomicBool,
    }

    impl TransmitQueue for TestQueue {
        fn stop_queue(&self) {
            self.stopped.store(true, Ordering::Relaxed);
        }

        fn wake_queue(&self) {
            self.stopped.store(false, Ordering::Relaxed);
        }

        fn transmit_complete(&self, _frame: CanFrame) {}
    }

    fn begin(gate: &Gate, step: Step) -> Option<Step> {
        gate.begin_transfer(step, |step, _| match step {
            Step::ReadFlags => BusCommand::read_flags(),
            Step::LoadTransmitBuffer => BusCommand::load_tx_buffer(&frame(0)),
            _ => BusCommand::request_to_send(),
        })
        .map(|cmd| cmd.step())
    }

    fn assert_idle_invariant(gate: &Gate) {
        let snap = gate.snapshot();
        if !snap.busy {
            assert!(!snap.interrupt_pending && !snap.transmit_pending);
        }
    }

    #[test]
    fn test_disarmed_gate_ignores_stimuli() {
        let gate = Gate::new();
        let queue = TestQueue::default();
        assert_eq!(None, gate.notify_interrupt());
        assert_eq!(
            Err(Rejected {
                frame: frame(1),
                resume: None
            }),
            gate.request_transmit(frame(1), &queue)
        );
        assert!(!queue.stopped.load(Ordering::Relaxed));
        assert_eq!(GateSnapshot::default(), gate.snapshot());
    }

    #[test]
    fn test_interrupt_coalescing() {
        let gate = armed_gate();
        assert_eq!(Some(Step::ReadFlags), gate.notify_interrupt());
        assert_eq!(None, gate.notify_interrupt());
        assert_eq!(None, gate.notify_interrupt());
        assert!(gate.snapshot().interrupt_pending);

        // Both notifications fold into a single re-poll
        assert_eq!(Some(Step::ReadFlags), gate.quiescent());
        assert_eq!(None, gate.quiescent());
        assert!(!gate.snapshot().busy);
        assert_idle_invariant(&gate);
    }

    #[test]
    fn test_transmit_starts_chain_at_load() {
        let gate = armed_gate();
        let queue = TestQueue::default();
        assert_eq!(
            Ok(Some(Step::LoadTransmitBuffer)),
            gate.request_transmit(frame(5), &queue)
        );
        assert!(queue.stopped.load(Ordering::Relaxed));
        // Slot stays occupied until completion
        assert_eq!(
            Err(Rejected {
                frame: frame(6),
                resume: None
            }),
            gate.request_transmit(frame(6), &queue)
        );
        assert_eq!(Some(frame(5)), gate.complete_transmit(&queue));
        assert!(!queue.stopped.load(Ordering::Relaxed));
        assert!(!gate.snapshot().outgoing_occupied);
    }

    #[test]
    fn test_transmit_has_priority_at_quiescent_point() {
        let gate = armed_gate();
        let queue = TestQueue::default();
        gate.notify_interrupt();
        assert_eq!(None, gate.notify_interrupt());
        assert_eq!(Ok(None), gate.request_transmit(frame(1), &queue));

        assert_eq!(Some(Step::LoadTransmitBuffer), gate.quiescent());
        assert_eq!(Some(Step::ReadFlags), gate.quiescent());
        assert_eq!(None, gate.quiescent());
        assert_idle_invariant(&gate);
    }

    #[test]
    fn test_transmit_or_read_flags() {
        let gate = armed_gate();
        let queue = TestQueue::default();
        gate.notify_interrupt();
        assert_eq!(Step::ReadFlags, gate.transmit_or_read_flags());
        gate.request_transmit(frame(1), &queue).unwrap();
        assert_eq!(Step::LoadTransmitBuffer, gate.transmit_or_read_flags());
        assert!(!gate.snapshot().transmit_pending);
    }

    #[test]
    fn test_stall_and_resume() {
        let gate = armed_gate();
        gate.notify_interrupt();
        assert_eq!(Some(Step::ReadFlags), begin(&gate, Step::ReadFlags));
        gate.stall(Step::ReadFlags);
        assert!(gate.snapshot().busy);
        assert!(gate.is_quiescent());
        assert_eq!(None, gate.finish_transfer());

        assert_eq!(Some(Step::ReadFlags), gate.notify_interrupt());
        assert!(!gate.snapshot().stalled);
        assert!(!gate.is_quiescent());
    }

    #[test]
    fn test_stalled_transmit_is_reloaded() {
        let gate = armed_gate();
        let queue = TestQueue::default();
        gate.request_transmit(frame(3), &queue).unwrap();
        gate.stall(Step::RequestSend);
        assert!(gate.snapshot().transmit_pending);

        assert_eq!(Some(Step::LoadTransmitBuffer), gate.notify_interrupt());
        assert!(!gate.snapshot().transmit_pending);
        assert!(gate.snapshot().outgoing_occupied);
    }

    #[test]
    fn test_transmit_resumes_stalled_chain() {
        let gate = armed_gate();
        let queue = TestQueue::default();
        gate.notify_interrupt();
        gate.stall(Step::ClearStatusFlags);
        assert_eq!(
            Ok(Some(Step::LoadTransmitBuffer)),
            gate.request_transmit(frame(2), &queue)
        );
        assert!(!gate.snapshot().stalled);
    }

    #[test]
    fn test_rejected_transmit_resumes_stalled_chain() {
        let gate = armed_gate();
        let queue = TestQueue::default();
        gate.request_transmit(frame(1), &queue).unwrap();
        gate.stall(Step::LoadTransmitBuffer);

        // The held frame is reloaded, the new one handed back
        assert_eq!(
            Err(Rejected {
                frame: frame(2),
                resume: Some(Step::LoadTransmitBuffer)
            }),
            gate.request_transmit(frame(2), &queue)
        );
        let snap = gate.snapshot();
        assert!(snap.busy && !snap.stalled && !snap.transmit_pending);

        // Only a stalled chain is restarted
        assert_eq!(
            Err(Rejected {
                frame: frame(2),
                resume: None
            }),
            gate.request_transmit(frame(2), &queue)
        );
    }

    #[test]
    fn test_release_abandons_running_chain() {
        let gate = armed_gate();
        let queue = TestQueue::default();
        gate.notify_interrupt();
        assert_eq!(Some(Step::ReadFlags), begin(&gate, Step::ReadFlags));
        gate.request_transmit(frame(1), &queue).unwrap();

        gate.disarm();
        assert!(!gate.is_quiescent());
        assert_eq!(Some(frame(1)), gate.release());
        let snap = gate.snapshot();
        assert!(snap.busy && snap.abandoned && !snap.outgoing_occupied);

        // Re-armed, an interrupt waits for the stale completion
        gate.arm();
        assert_eq!(None, gate.notify_interrupt());
        assert_eq!(Some((Step::ReadFlags, true)), gate.finish_transfer());
        assert_eq!(Some(Step::ReadFlags), gate.quiescent());
        assert!(!gate.snapshot().abandoned);
    }

    #[test]
    fn test_stale_decision_is_replaced() {
        let gate = armed_gate();
        let queue = TestQueue::default();
        gate.notify_interrupt();
        begin(&gate, Step::ReadFlags);
        assert_eq!(Some((Step::ReadFlags, false)), gate.finish_transfer());

        // The chip is reset while the completion is being handled
        gate.disarm();
        gate.release();
        gate.arm();
        assert_eq!(Ok(None), gate.request_transmit(frame(4), &queue));

        // Flags read before the reset cannot release the new frame
        assert_eq!(None, gate.complete_transmit(&queue));
        assert!(gate.snapshot().outgoing_occupied);
        assert!(queue.stopped.load(Ordering::Relaxed));

        // The handler's next step was decided on pre-reset flags
        assert_eq!(Some(Step::LoadTransmitBuffer), begin(&gate, Step::ClearStatusFlags));
        assert!(!gate.snapshot().abandoned);
    }

    #[test]
    fn test_abandoned_chain_ends_when_disarmed() {
        let gate = armed_gate();
        gate.notify_interrupt();
        begin(&gate, Step::ReadFlags);
        gate.disarm();
        gate.release();

        assert_eq!(Some((Step::ReadFlags, true)), gate.finish_transfer());
        assert_eq!(None, gate.quiescent());
        assert_eq!(GateSnapshot::default(), gate.snapshot());
    }

    #[test]
    fn test_disarm_drains_at_quiescent_point() {
        let gate = armed_gate();
        let queue = TestQueue::default();
        gate.notify_interrupt();
        gate.notify_interrupt();
        gate.request_transmit(frame(1), &queue).unwrap();
        gate.disarm();
        assert_eq!(None, gate.notify_interrupt());
        assert_eq!(None, gate.quiescent());
        assert!(gate.is_quiescent());
        assert_idle_invariant(&gate);

        assert_eq!(Some(frame(1)), gate.release());
        assert_eq!(GateSnapshot::default(), gate.snapshot());
        assert_eq!(None, gate.notify_interrupt());
    }
}
