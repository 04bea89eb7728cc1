//! Maple Bus transport: the per-exchange phase state machine, the
//! ISR-to-task handoff cell, and the polling driver that turns raw PHY
//! events into validated packets.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant};

use crate::error::{FailureReason, ReadStartError, WriteStartError};
use crate::infra::codec;
use crate::protocol::transport::frame::Frame;
use crate::protocol::transport::packet::{Packet, MAX_PAYLOAD_WORDS};
use crate::protocol::transport::traits::maple_phy::MaplePhy;
use crate::protocol::transport::{INTER_WORD_READ_TIMEOUT, OPEN_LINE_CHECK_WINDOW, WRITE_TIMEOUT_EXTRA_PERCENT};

/// Receive capacity in words: the largest legal packet plus slack for the
/// oversized responses some third-party accessories emit.
pub const RX_CAPACITY_WORDS: usize = MAX_PAYLOAD_WORDS + 5;

/// Transmit buffer capacity: bit-count header + frame word + payload +
/// the word carrying the trailing CRC.
const TX_CAPACITY_WORDS: usize = MAX_PAYLOAD_WORDS + 3;

//==================================================================================PHASE
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Step of the write/read state machine for one exchange.
///
/// Only forward transitions are stored: the interrupt domain advances
/// `WriteInProgress → {WriteComplete | WaitingForReadStart} →
/// ReadInProgress → ReadComplete`, and the polling domain alone consumes a
/// terminal (or timed-out) phase back to `Idle`. Failure outcomes are never
/// stored; they are returned as [`BusEvent`] variants at consume time.
pub enum Phase {
    Idle,
    WriteInProgress,
    WaitingForReadStart,
    ReadInProgress,
    WriteComplete,
    ReadComplete,
}

//==================================================================================ISR_BRIDGE
/// Words captured by the receive interrupt glue.
struct RxCapture {
    words: [u32; RX_CAPACITY_WORDS],
    len: usize,
    crc: u8,
    last_activity: Option<Instant>,
    overflowed: bool,
}

impl RxCapture {
    const fn new() -> Self {
        Self {
            words: [0; RX_CAPACITY_WORDS],
            len: 0,
            crc: 0,
            last_activity: None,
            overflowed: false,
        }
    }

    fn reset(&mut self) {
        self.len = 0;
        self.crc = 0;
        self.last_activity = None;
        self.overflowed = false;
        // No need to wipe the word buffer; upcoming captures overwrite it.
    }
}

struct BusShared {
    phase: Phase,
    autostart_read: bool,
    rx: RxCapture,
}

/// Snapshot of a completed receive, copied out of the handoff cell in the
/// same critical section that returns the machine to `Idle`.
struct RxSnapshot {
    words: [u32; RX_CAPACITY_WORDS],
    len: usize,
    crc: u8,
    overflowed: bool,
}

/// ISR-to-task handoff cell for one bus.
///
/// Single-producer/single-consumer contract: the interrupt glue only calls
/// the four event entry points, each of which advances the phase forward and
/// writes its result exactly once per exchange; the polling side (through
/// [`MapleBusTransport`]) alone resets the machine to `Idle`. Every access
/// re-checks the stored phase inside the critical section, so a late
/// callback from a killed exchange is ignored rather than corrupting the
/// next one.
pub struct IsrBridge {
    shared: Mutex<CriticalSectionRawMutex, RefCell<BusShared>>,
}

impl IsrBridge {
    pub const fn new() -> Self {
        Self {
            shared: Mutex::new(RefCell::new(BusShared {
                phase: Phase::Idle,
                autostart_read: false,
                rx: RxCapture::new(),
            })),
        }
    }

    //==================================================================================Interrupt entry points

    /// The transmit shifter pushed its last bit out.
    pub fn write_complete(&self) {
        self.shared.lock(|cell| {
            let mut shared = cell.borrow_mut();
            if shared.phase == Phase::WriteInProgress {
                shared.phase = if shared.autostart_read {
                    Phase::WaitingForReadStart
                } else {
                    Phase::WriteComplete
                };
            }
        });
    }

    /// The receiver observed the first edge of an incoming frame.
    pub fn read_started(&self, now: Instant) {
        self.shared.lock(|cell| {
            let mut shared = cell.borrow_mut();
            if shared.phase == Phase::WaitingForReadStart {
                shared.phase = Phase::ReadInProgress;
                shared.rx.last_activity = Some(now);
            }
        });
    }

    /// One complete word was shifted in.
    pub fn read_word(&self, word: u32, now: Instant) {
        self.shared.lock(|cell| {
            let mut shared = cell.borrow_mut();
            if shared.phase != Phase::ReadInProgress {
                return;
            }
            shared.rx.last_activity = Some(now);
            let len = shared.rx.len;
            if len < RX_CAPACITY_WORDS {
                shared.rx.words[len] = word;
                shared.rx.len = len + 1;
            } else {
                shared.rx.overflowed = true;
            }
        });
    }

    /// The transmitter released the line after its trailing CRC byte.
    pub fn read_complete(&self, crc: u8, now: Instant) {
        self.shared.lock(|cell| {
            let mut shared = cell.borrow_mut();
            if shared.phase == Phase::ReadInProgress {
                shared.rx.crc = crc;
                shared.rx.last_activity = Some(now);
                shared.phase = Phase::ReadComplete;
            }
        });
    }

    //==================================================================================Polling-side accessors

    fn snapshot_phase(&self) -> Phase {
        self.shared.lock(|cell| cell.borrow().phase)
    }

    fn begin_write(&self, autostart_read: bool) {
        self.shared.lock(|cell| {
            let mut shared = cell.borrow_mut();
            shared.phase = Phase::WriteInProgress;
            shared.autostart_read = autostart_read;
            shared.rx.reset();
        });
    }

    fn begin_read(&self) {
        self.shared.lock(|cell| {
            let mut shared = cell.borrow_mut();
            shared.phase = Phase::WaitingForReadStart;
            shared.autostart_read = false;
            shared.rx.reset();
        });
    }

    fn reset_to_idle(&self) {
        self.shared.lock(|cell| {
            let mut shared = cell.borrow_mut();
            shared.phase = Phase::Idle;
            shared.rx.reset();
        });
    }

    /// Consume `observed` back to `Idle`; fails when the interrupt domain
    /// advanced the phase between observation and action.
    fn try_consume(&self, observed: Phase) -> bool {
        self.shared.lock(|cell| {
            let mut shared = cell.borrow_mut();
            if shared.phase == observed {
                shared.phase = Phase::Idle;
                shared.rx.reset();
                true
            } else {
                false
            }
        })
    }

    /// Copy a completed receive out and return the machine to `Idle`.
    fn take_read(&self) -> Option<RxSnapshot> {
        self.shared.lock(|cell| {
            let mut shared = cell.borrow_mut();
            if shared.phase != Phase::ReadComplete {
                return None;
            }
            let snapshot = RxSnapshot {
                words: shared.rx.words,
                len: shared.rx.len,
                crc: shared.rx.crc,
                overflowed: shared.rx.overflowed,
            };
            shared.phase = Phase::Idle;
            shared.rx.reset();
            Some(snapshot)
        })
    }

    /// True when the gap since the last received word exceeds `bound`.
    fn read_stalled(&self, now: Instant, bound: Duration) -> bool {
        self.shared.lock(|cell| {
            let shared = cell.borrow();
            match (shared.phase, shared.rx.last_activity) {
                (Phase::ReadInProgress, Some(last)) => now
                    .checked_duration_since(last)
                    .map_or(false, |gap| gap >= bound),
                _ => false,
            }
        })
    }
}

impl Default for IsrBridge {
    fn default() -> Self {
        Self::new()
    }
}

//==================================================================================BUS_EVENT
#[derive(Debug)]
/// Outcome of one [`MapleBusTransport::process_events`] poll.
pub enum BusEvent {
    /// No exchange in flight.
    Idle,
    /// An exchange is in flight and still inside its time bounds.
    Pending,
    /// The write finished and no response was requested.
    WriteComplete,
    /// The write was killed.
    WriteFailed(FailureReason),
    /// A response was received and validated.
    ReadComplete(Packet),
    /// The receive was killed or failed validation.
    ReadFailed(FailureReason),
}

//==================================================================================TRANSPORT
/// Polling-side driver of one Maple Bus.
///
/// Owns the PHY and the exchange time bounds; shares the phase machine with
/// the interrupt glue through a borrowed [`IsrBridge`]. Must be polled
/// sub-millisecond (see [`crate::protocol::transport::TICK_PERIOD`]).
pub struct MapleBusTransport<'a, P: MaplePhy> {
    phy: P,
    events: &'a IsrBridge,
    write_kill_at: Option<Instant>,
    read_kill_at: Option<Instant>,
    tx_words: [u32; TX_CAPACITY_WORDS],
}

impl<'a, P: MaplePhy> MapleBusTransport<'a, P> {
    pub fn new(phy: P, events: &'a IsrBridge) -> Self {
        Self {
            phy,
            events,
            write_kill_at: None,
            read_kill_at: None,
            tx_words: [0; TX_CAPACITY_WORDS],
        }
    }

    /// True while an exchange is in flight or awaiting consumption.
    pub fn is_busy(&self) -> bool {
        self.events.snapshot_phase() != Phase::Idle
    }

    /// The underlying PHY driver.
    pub fn phy(&self) -> &P {
        &self.phy
    }

    pub fn phy_mut(&mut self) -> &mut P {
        &mut self.phy
    }

    /// Start the asynchronous transmission of `packet`.
    ///
    /// Refuses when an exchange is in flight or the pre-send line check saw
    /// another transmitter. On success the write kill-time is the expected
    /// wire time plus [`WRITE_TIMEOUT_EXTRA_PERCENT`]; with
    /// `autostart_read` the receiver is armed back-to-back and given
    /// `read_timeout` past the write deadline to produce its first edge.
    pub fn write(
        &mut self,
        packet: &Packet,
        autostart_read: bool,
        read_timeout: Duration,
        now: Instant,
    ) -> Result<(), WriteStartError<P::Error>> {
        if self.events.snapshot_phase() != Phase::Idle {
            return Err(WriteStartError::Busy);
        }
        if !packet.is_valid() {
            return Err(WriteStartError::InvalidPacket);
        }
        if self.phy.line_is_occupied(OPEN_LINE_CHECK_WINDOW) {
            return Err(WriteStartError::LineOccupied);
        }

        let total = self.load_tx_words(packet);
        self.events.begin_write(autostart_read);
        if let Err(e) = self.phy.start_transmit(&self.tx_words[..total], autostart_read) {
            self.events.reset_to_idle();
            return Err(WriteStartError::Phy(e));
        }

        let budget_ns = packet.tx_time_ns() * (100 + WRITE_TIMEOUT_EXTRA_PERCENT) / 100;
        let write_kill = now + Duration::from_micros(budget_ns.div_ceil(1_000));
        self.write_kill_at = Some(write_kill);
        self.read_kill_at = autostart_read.then(|| write_kill + read_timeout);
        Ok(())
    }

    /// Arm the receiver without a preceding write (device role).
    ///
    /// `None` waits indefinitely for the host to speak.
    pub fn start_read(
        &mut self,
        timeout: Option<Duration>,
        now: Instant,
    ) -> Result<(), ReadStartError<P::Error>> {
        if self.events.snapshot_phase() != Phase::Idle {
            return Err(ReadStartError::Busy);
        }
        self.events.begin_read();
        if let Err(e) = self.phy.start_receive() {
            self.events.reset_to_idle();
            return Err(ReadStartError::Phy(e));
        }
        self.write_kill_at = None;
        self.read_kill_at = timeout.map(|t| now + t);
        Ok(())
    }

    /// Resolve timeouts and completed exchanges.
    ///
    /// Consuming a terminal phase atomically resets the machine to `Idle`;
    /// when the interrupt domain advances the phase between observation and
    /// action, the poll reports [`BusEvent::Pending`] and the next tick
    /// resolves the fresh state instead.
    pub fn process_events(&mut self, now: Instant) -> BusEvent {
        match self.events.snapshot_phase() {
            Phase::Idle => BusEvent::Idle,
            Phase::WriteInProgress => {
                if self.deadline_passed(self.write_kill_at, now)
                    && self.events.try_consume(Phase::WriteInProgress)
                {
                    self.phy.abort();
                    #[cfg(feature = "defmt")]
                    defmt::debug!("maple write killed past its deadline");
                    return BusEvent::WriteFailed(FailureReason::Timeout);
                }
                BusEvent::Pending
            }
            Phase::WaitingForReadStart => {
                if self.deadline_passed(self.read_kill_at, now)
                    && self.events.try_consume(Phase::WaitingForReadStart)
                {
                    self.phy.abort();
                    #[cfg(feature = "defmt")]
                    defmt::debug!("maple response never started");
                    return BusEvent::ReadFailed(FailureReason::Timeout);
                }
                BusEvent::Pending
            }
            Phase::ReadInProgress => {
                if self.events.read_stalled(now, INTER_WORD_READ_TIMEOUT)
                    && self.events.try_consume(Phase::ReadInProgress)
                {
                    self.phy.abort();
                    #[cfg(feature = "defmt")]
                    defmt::debug!("maple receive stalled between words");
                    return BusEvent::ReadFailed(FailureReason::Timeout);
                }
                BusEvent::Pending
            }
            Phase::WriteComplete => {
                if self.events.try_consume(Phase::WriteComplete) {
                    BusEvent::WriteComplete
                } else {
                    BusEvent::Pending
                }
            }
            Phase::ReadComplete => match self.events.take_read() {
                Some(snapshot) => match Self::validate(&snapshot) {
                    Ok(packet) => BusEvent::ReadComplete(packet),
                    Err(reason) => {
                        #[cfg(feature = "defmt")]
                        defmt::debug!("maple receive rejected: {}", reason);
                        BusEvent::ReadFailed(reason)
                    }
                },
                None => BusEvent::Pending,
            },
        }
    }

    fn deadline_passed(&self, deadline: Option<Instant>, now: Instant) -> bool {
        deadline.map_or(false, |kill| now >= kill)
    }

    /// Check a completed receive against the frame it declares.
    ///
    /// Receptions longer than the declared length are tolerated as long as
    /// the trailing CRC validates over the full received span (a known
    /// accessory quirk); the surfaced packet is truncated to the declared
    /// words.
    fn validate(snapshot: &RxSnapshot) -> Result<Packet, FailureReason> {
        if snapshot.overflowed {
            return Err(FailureReason::BufferOverflow);
        }
        if snapshot.len == 0 {
            return Err(FailureReason::MissingData);
        }
        let frame = Frame::from_word(snapshot.words[0]);
        let declared = frame.length as usize;
        let payload_words = snapshot.len - 1;
        if payload_words < declared {
            return Err(FailureReason::MissingData);
        }
        if codec::crc8(&snapshot.words[..snapshot.len]) != snapshot.crc {
            return Err(FailureReason::CrcInvalid);
        }
        Packet::from_words(&snapshot.words[..1 + declared])
            .map_err(|_| FailureReason::BufferOverflow)
    }

    /// Lay out the transmit buffer: bit-count header, frame word, payload,
    /// then the trailing CRC in the most significant byte of the final word
    /// (the shifter sends words MSB-first and stops after the header's bit
    /// count, so only the CRC byte of that word reaches the wire).
    fn load_tx_words(&mut self, packet: &Packet) -> usize {
        self.tx_words[0] = packet.num_total_bits();
        self.tx_words[1] = packet.frame.to_word();
        let payload = packet.payload();
        self.tx_words[2..2 + payload.len()].copy_from_slice(payload);
        self.tx_words[2 + payload.len()] = (packet.crc() as u32) << 24;
        payload.len() + 3
    }
}
