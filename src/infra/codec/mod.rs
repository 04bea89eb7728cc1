//! Low-level codec utilities for Maple Bus words: the trailing CRC, word
//! byte-order conversion, and the wire-timing arithmetic used by the
//! scheduler. Pure functions, no state, no I/O.

/// Nanoseconds spent on the wire per transmitted bit.
///
/// Matches the original console's ~2 Mbps signaling. Used for scheduling
/// duration estimates only; the hardware-level bit timing belongs to the
/// PHY driver.
pub const MAPLE_NS_PER_BIT: u64 = 480;

//==================================================================================CRC

/// XOR-fold one word into a running 8-bit CRC.
#[inline]
pub fn crc8_push_word(crc: u8, word: u32) -> u8 {
    let [a, b, c, d] = word.to_be_bytes();
    crc ^ a ^ b ^ c ^ d
}

/// Trailing CRC byte of a transmitted span: XOR fold of every byte of the
/// frame word and payload words.
pub fn crc8(words: &[u32]) -> u8 {
    words.iter().fold(0, |crc, word| crc8_push_word(crc, *word))
}

//==================================================================================BYTE_ORDER

/// Full per-word byte swap.
///
/// Some peripheral payloads are defined in the opposite byte order from the
/// frame word and must be swapped word-by-word before transmission. This is
/// a documented quirk of the protocol, not an implementation choice.
#[inline]
pub const fn swap_word_bytes(word: u32) -> u32 {
    word.swap_bytes()
}

//==================================================================================WIRE_TIMING

/// Total bit count of a packet with `payload_words` payload words:
/// frame word + payload words + the single trailing CRC byte.
#[inline]
pub const fn total_bits(payload_words: usize) -> u32 {
    ((payload_words as u32) + 1) * 32 + 8
}

/// Time on the wire, in nanoseconds, for a packet with `payload_words`
/// payload words.
#[inline]
pub const fn tx_time_ns(payload_words: usize) -> u64 {
    total_bits(payload_words) as u64 * MAPLE_NS_PER_BIT
}

//==================================================================================TESTS
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
