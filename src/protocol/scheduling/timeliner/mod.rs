//! The transmission timeliner: bridges the scheduler to one bus transport,
//! pairing every terminal bus event with the transmission that caused it.
use embassy_time::Instant;

use crate::error::FailureReason;
use crate::protocol::scheduling::scheduler::TransmissionScheduler;
use crate::protocol::scheduling::transmission::Transmission;
use crate::protocol::transport::bus::{BusEvent, MapleBusTransport};
use crate::protocol::transport::packet::Packet;
use crate::protocol::transport::traits::maple_phy::MaplePhy;
use crate::protocol::transport::RESPONSE_TIMEOUT;

//==================================================================================RESULT
#[derive(Debug)]
/// How one exchange ended.
pub enum TransferOutcome {
    /// The exchange completed; carries the validated response when one was
    /// requested.
    Complete(Option<Packet>),
    /// The exchange was killed or the response failed validation.
    Failed(FailureReason),
}

#[derive(Debug)]
/// A resolved exchange: the transmission that was in flight plus its
/// outcome. Consumed by the node hierarchy.
pub struct TransferResult {
    pub tx: Transmission,
    pub outcome: TransferOutcome,
}

//==================================================================================TIMELINER
/// Per-bus bridge between the scheduler and the transport.
pub struct TransmissionTimeliner<'a, P: MaplePhy> {
    bus: MapleBusTransport<'a, P>,
    in_flight: Option<Transmission>,
}

impl<'a, P: MaplePhy> TransmissionTimeliner<'a, P> {
    pub fn new(bus: MapleBusTransport<'a, P>) -> Self {
        Self {
            bus,
            in_flight: None,
        }
    }

    /// The transmission currently on the wire, if any.
    pub fn in_flight(&self) -> Option<&Transmission> {
        self.in_flight.as_ref()
    }

    /// Start the next due transmission when the bus is free.
    ///
    /// The scheduler entry is only popped once the write actually started;
    /// a busy bus or an occupied line leaves it queued for the next tick.
    pub fn write_task<const CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        now: Instant,
    ) {
        if self.in_flight.is_some() || self.bus.is_busy() {
            return;
        }
        let Some(cursor) = scheduler.peek_next(now) else {
            return;
        };
        let Some(tx) = scheduler.get(&cursor) else {
            return;
        };
        match self
            .bus
            .write(&tx.packet, tx.expect_response, RESPONSE_TIMEOUT, now)
        {
            Ok(()) => {
                self.in_flight = scheduler.pop(cursor, now);
            }
            Err(_refused) => {
                #[cfg(feature = "defmt")]
                defmt::trace!("maple write deferred, entry stays queued");
            }
        }
    }

    /// Poll the transport and resolve a terminal event against the
    /// in-flight transmission.
    pub fn read_task(&mut self, now: Instant) -> Option<TransferResult> {
        let outcome = match self.bus.process_events(now) {
            BusEvent::Idle | BusEvent::Pending => return None,
            BusEvent::WriteComplete => TransferOutcome::Complete(None),
            BusEvent::ReadComplete(packet) => TransferOutcome::Complete(Some(packet)),
            BusEvent::WriteFailed(reason) | BusEvent::ReadFailed(reason) => {
                TransferOutcome::Failed(reason)
            }
        };
        match self.in_flight.take() {
            Some(tx) => Some(TransferResult { tx, outcome }),
            None => {
                // Terminal event with nothing in flight: a cancelled
                // exchange raced its completion. Drop it.
                #[cfg(feature = "defmt")]
                defmt::debug!("maple terminal event without an in-flight transmission");
                None
            }
        }
    }
}
