//! In-memory representation of a complete Maple Bus packet: one frame word
//! plus up to [`MAX_PAYLOAD_WORDS`] payload words.
use crate::error::PacketError;
use crate::infra::codec;
use crate::protocol::transport::frame::Frame;

/// Maximum payload word count a frame can declare (the length byte).
pub const MAX_PAYLOAD_WORDS: usize = 255;

//==================================================================================PACKET
#[derive(Clone, Debug)]
/// Frame header plus ordered payload words.
///
/// The frame's `length` byte is recomputed by every payload mutation, so a
/// packet built through this type always satisfies
/// `frame.length == payload().len()` when serialized.
pub struct Packet {
    /// Frame header. The `length` field is owned by this type; mutate the
    /// payload through the provided methods rather than writing it directly.
    pub frame: Frame,
    payload: [u32; MAX_PAYLOAD_WORDS],
    len: usize,
}

impl Packet {
    /// Empty packet carrying the sentinel command.
    pub const fn new() -> Self {
        Self {
            frame: Frame::invalid(),
            payload: [0; MAX_PAYLOAD_WORDS],
            len: 0,
        }
    }

    /// Payload-less packet for the given command and addresses.
    pub const fn from_frame(frame: Frame) -> Self {
        let mut packet = Self::new();
        packet.frame = frame;
        packet.frame.length = 0;
        packet
    }

    /// Rebuild a packet from a received word span: the first word is the
    /// frame, the rest is payload.
    ///
    /// The frame's declared length is overwritten with the actual span
    /// length; the transport layer is responsible for reconciling the two
    /// before calling this.
    pub fn from_words(words: &[u32]) -> Result<Self, PacketError> {
        let (first, payload) = match words.split_first() {
            Some(split) => split,
            None => return Ok(Self::new()),
        };
        let mut packet = Self::from_frame(Frame::from_word(*first));
        packet.set_payload(payload)?;
        Ok(packet)
    }

    /// Valid payload words.
    pub fn payload(&self) -> &[u32] {
        &self.payload[..self.len]
    }

    /// Replace the payload and recompute the frame length.
    pub fn set_payload(&mut self, words: &[u32]) -> Result<(), PacketError> {
        self.len = 0;
        self.append_payload(words)
    }

    /// Append words to the payload and recompute the frame length.
    pub fn append_payload(&mut self, words: &[u32]) -> Result<(), PacketError> {
        let end = self.len + words.len();
        if end > MAX_PAYLOAD_WORDS {
            return Err(PacketError::PayloadOverflow {
                requested: end,
                capacity: MAX_PAYLOAD_WORDS,
            });
        }
        self.payload[self.len..end].copy_from_slice(words);
        self.len = end;
        self.frame.length = self.len as u8;
        Ok(())
    }

    /// Append words with a full per-word byte swap.
    ///
    /// Used for the peripheral payloads defined in the opposite byte order
    /// from the frame word.
    pub fn append_payload_swapped(&mut self, words: &[u32]) -> Result<(), PacketError> {
        for word in words {
            self.append_payload(&[codec::swap_word_bytes(*word)])?;
        }
        Ok(())
    }

    /// A packet is valid when its command is not the sentinel and the frame
    /// length matches the payload.
    pub fn is_valid(&self) -> bool {
        self.frame.is_valid() && self.frame.length as usize == self.len
    }

    /// Total wire bits: frame word + payload + the trailing CRC byte.
    pub fn num_total_bits(&self) -> u32 {
        codec::total_bits(self.len)
    }

    /// Wire time in nanoseconds, for scheduling estimates only.
    pub fn tx_time_ns(&self) -> u64 {
        codec::tx_time_ns(self.len)
    }

    /// Trailing CRC byte over the frame word and payload.
    pub fn crc(&self) -> u8 {
        let crc = codec::crc8_push_word(0, self.frame.to_word());
        self.payload()
            .iter()
            .fold(crc, |crc, word| codec::crc8_push_word(crc, *word))
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

// Equality covers the frame and the valid payload span only; bytes beyond
// `len` are scratch space.
impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.frame == other.frame && self.payload() == other.payload()
    }
}

impl Eq for Packet {}
