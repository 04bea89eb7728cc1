//! The transmission record owned by the scheduler: one pending bus exchange
//! plus its priority, cadence, and duration estimate.
use embassy_time::{Duration, Instant};

use crate::infra::codec;
use crate::protocol::transport::address::MapleAddress;
use crate::protocol::transport::packet::Packet;
use crate::protocol::transport::INTER_FRAME_GAP;

/// Monotonic transmission identifier, unique per scheduler instance.
pub type TransmissionId = u32;

//==================================================================================TRANSMISSION
#[derive(Clone, Debug, PartialEq, Eq)]
/// An immutable pending-exchange record.
///
/// Created through [`TransmissionRequest`]; exclusively owned by the
/// scheduler while queued, handed to the timeliner for the duration of one
/// exchange once popped, then discarded or re-queued by cadence.
pub struct Transmission {
    /// Scheduler-stamped unique id.
    pub id: TransmissionId,
    /// Priority level, 0 highest.
    pub priority: u8,
    /// Packet to send; its sender byte is stamped by the scheduler.
    pub packet: Packet,
    /// Typed recipient, decoded from the packet at queue time.
    pub recipient: MapleAddress,
    /// Whether the recipient is expected to answer.
    pub expect_response: bool,
    /// Expected response payload words, for duration estimation only.
    pub expected_response_words: u8,
    /// Cadence period; `None` for one-shot entries.
    pub repeat_period: Option<Duration>,
    /// Absolute end of the repeat window (exclusive); `None` repeats until
    /// cancelled.
    pub repeat_until: Option<Instant>,
    /// Absolute due time of the next attempt.
    pub next_due: Instant,
    /// Precomputed whole-exchange duration, used by the preemption rule.
    pub estimated_duration: Duration,
}

//==================================================================================REQUEST_BUILDER
#[derive(Clone, Debug)]
/// Fluent description of a transmission to queue.
pub struct TransmissionRequest {
    pub priority: u8,
    pub next_due: Instant,
    pub packet: Packet,
    pub expect_response: bool,
    pub expected_response_words: u8,
    pub repeat_period: Option<Duration>,
    pub repeat_until: Option<Instant>,
}

impl TransmissionRequest {
    /// One-shot, no-response request at the given priority and due time.
    pub fn new(priority: u8, next_due: Instant, packet: Packet) -> Self {
        Self {
            priority,
            next_due,
            packet,
            expect_response: false,
            expected_response_words: 0,
            repeat_period: None,
            repeat_until: None,
        }
    }

    /// Expect a response of roughly `expected_words` payload words.
    pub fn with_response(mut self, expected_words: u8) -> Self {
        self.expect_response = true;
        self.expected_response_words = expected_words;
        self
    }

    /// Re-queue at `period` after every pop. A zero period is ignored.
    pub fn repeating(mut self, period: Duration) -> Self {
        self.repeat_period = (period.as_ticks() != 0).then_some(period);
        self
    }

    /// Stop repeating once `end` is reached (exclusive bound).
    pub fn until(mut self, end: Instant) -> Self {
        self.repeat_until = Some(end);
        self
    }

    /// Whole-exchange duration estimate: send time, the fixed inter-frame
    /// gap, and the expected response time when one is awaited.
    pub(crate) fn estimated_duration(&self) -> Duration {
        let mut ns = self.packet.tx_time_ns();
        if self.expect_response {
            ns += INTER_FRAME_GAP.as_micros() * 1_000;
            ns += codec::tx_time_ns(self.expected_response_words as usize);
        }
        Duration::from_micros(ns.div_ceil(1_000))
    }
}
