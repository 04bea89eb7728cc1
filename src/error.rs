//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (address construction,
//! packet building, transport start, scheduling, message decoding, etc.).
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors that can occur while building or decoding a Maple address byte.
pub enum AddressError {
    /// Player index must stay in the 0..=3 range.
    #[error("Invalid player index: {index}")]
    InvalidPlayerIndex { index: u8 },
    /// Sub-peripheral slot must stay in the 0..=4 range.
    #[error("Invalid sub-peripheral slot: {slot}")]
    InvalidSubSlot { slot: u8 },
    /// The byte does not encode exactly one host, main, or sub entity.
    #[error("Address byte does not encode a single entity: {byte:#04x}")]
    InvalidAddressByte { byte: u8 },
    /// A sender byte combined sub bits without the main-peripheral flag.
    #[error("Sender byte carries an ambiguous role: {byte:#04x}")]
    AmbiguousSenderByte { byte: u8 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors encountered while assembling a packet payload.
pub enum PacketError {
    /// Payload would exceed the fixed word capacity.
    #[error("Payload overflow: {requested} words, capacity {capacity}")]
    PayloadOverflow { requested: usize, capacity: usize },
}

#[derive(Error, Debug)]
/// Reasons a transmit could not be started.
pub enum WriteStartError<E: core::fmt::Debug> {
    /// An exchange is already in flight on this bus.
    #[error("Bus is busy")]
    Busy,
    /// Another transmitter held the line low during the pre-send check.
    #[error("Line is occupied by another transmitter")]
    LineOccupied,
    /// The packet fails its own validity invariant.
    #[error("Packet is not valid for transmission")]
    InvalidPacket,
    /// The PHY driver refused to start shifting.
    #[error("PHY error: {0:?}")]
    Phy(E),
}

#[derive(Error, Debug)]
/// Reasons a receive could not be armed.
pub enum ReadStartError<E: core::fmt::Debug> {
    /// An exchange is already in flight on this bus.
    #[error("Bus is busy")]
    Busy,
    /// The PHY driver refused to arm its receiver.
    #[error("PHY error: {0:?}")]
    Phy(E),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Terminal failure taxonomy of one bus exchange.
pub enum FailureReason {
    /// The trailing CRC byte did not match the received span.
    #[error("CRC mismatch on received frame")]
    CrcInvalid,
    /// Fewer payload words arrived than the frame word declared.
    #[error("Received fewer words than declared")]
    MissingData,
    /// The reception exceeded the allocated word buffer.
    #[error("Receive buffer overflow")]
    BufferOverflow,
    /// No activity or completion inside the exchange's kill-time.
    #[error("Exchange timed out")]
    Timeout,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors raised while queueing a transmission.
pub enum ScheduleError {
    /// The monotonic id counter wrapped. Practically unreachable.
    #[error("Transmission id space exhausted")]
    IdSpaceExhausted,
    /// Every scheduler slot is occupied.
    #[error("Scheduler queue is full")]
    QueueFull,
    /// The packet's recipient byte does not decode to a Maple address.
    #[error(transparent)]
    InvalidRecipient(#[from] AddressError),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Failures while decoding a message payload.
pub enum MessageError {
    /// The payload is too short for the message's fixed prefix.
    #[error("Device info payload too short: {words} words")]
    DeviceInfoTooShort { words: usize },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors raised while building a function-code dispatch key.
pub enum FunctionCodeError {
    /// A dispatch key must carry exactly one capability bit.
    #[error("Function code is not a single bit: {bits:#010x}")]
    NotSingleBit { bits: u32 },
}
