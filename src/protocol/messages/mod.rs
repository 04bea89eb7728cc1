//! Typed Maple Bus message payloads above the raw packet layer.
//!
//! Only the device-identity payload lives here today; condition and storage
//! payloads belong to the peripheral implementations consuming this crate.
use crate::error::MessageError;
use crate::protocol::node::function::FunctionCode;

/// Word count of the fixed device-info payload (112 bytes).
pub const DEVICE_INFO_WORDS: usize = 28;

/// Extra words appended by the extended device-info response (40-byte
/// free-form version area).
pub const DEVICE_INFO_EXTENSION_WORDS: usize = 10;

/// First word of the byte-packed text/power block (region through power).
const TEXT_FIRST_WORD: usize = 4;

//==================================================================================DEVICE_INFO
#[derive(Clone, Debug, PartialEq, Eq)]
/// The device-identity payload answering a device-info request.
///
/// Function definitions are paired with capability bits from the most
/// significant advertised bit down: `function_data[0]` describes the
/// highest set bit of `functions`, and so on.
pub struct DeviceInfo {
    /// OR of every advertised capability bit.
    pub functions: u32,
    /// Per-capability definition words, MSB-first pairing.
    pub function_data: [u32; 3],
    /// Destination region byte.
    pub region: u8,
    /// Connection direction byte.
    pub connection_direction: u8,
    /// Product name, ASCII padded with spaces.
    pub product_name: [u8; 30],
    /// Production license string, ASCII padded with spaces.
    pub product_license: [u8; 60],
    /// Standby current draw in 0.1 mA units. Little-endian on the wire,
    /// unlike every other field; a documented protocol quirk.
    pub standby_power: u16,
    /// Maximum current draw in 0.1 mA units. Little-endian on the wire.
    pub max_power: u16,
}

impl DeviceInfo {
    /// Identity with the given capabilities and zeroed text fields.
    pub fn from_functions(functions: u32, function_data: [u32; 3]) -> Self {
        Self {
            functions,
            function_data,
            region: 0xFF,
            connection_direction: 0,
            product_name: [b' '; 30],
            product_license: [b' '; 60],
            standby_power: 0,
            max_power: 0,
        }
    }

    /// Capability bits paired with their definition words, iterating from
    /// the most significant advertised bit down. Bits beyond the third get
    /// a zero definition.
    pub fn advertised_functions(&self) -> impl Iterator<Item = (FunctionCode, u32)> + '_ {
        let mut remaining = self.functions;
        let mut data_index = 0;
        core::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let top = 31 - remaining.leading_zeros();
            let bits = 1u32 << top;
            remaining &= !bits;
            let definition = if data_index < self.function_data.len() {
                self.function_data[data_index]
            } else {
                0
            };
            data_index += 1;
            // Advertised bits are single bits by construction.
            let code = FunctionCode::new(bits).ok()?;
            Some((code, definition))
        })
    }

    /// Serialize into the fixed 28-word payload.
    pub fn to_words(&self) -> [u32; DEVICE_INFO_WORDS] {
        let mut words = [0u32; DEVICE_INFO_WORDS];
        words[0] = self.functions;
        words[1..4].copy_from_slice(&self.function_data);

        let mut bytes = [0u8; 96];
        bytes[0] = self.region;
        bytes[1] = self.connection_direction;
        bytes[2..32].copy_from_slice(&self.product_name);
        bytes[32..92].copy_from_slice(&self.product_license);
        bytes[92..94].copy_from_slice(&self.standby_power.to_le_bytes());
        bytes[94..96].copy_from_slice(&self.max_power.to_le_bytes());

        for (index, chunk) in bytes.chunks_exact(4).enumerate() {
            words[TEXT_FIRST_WORD + index] =
                u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        words
    }

    /// Decode a received payload.
    ///
    /// Only the capability prefix is mandatory; real accessories sometimes
    /// truncate the text fields, which are then zero-filled.
    pub fn from_words(words: &[u32]) -> Result<Self, MessageError> {
        if words.len() < 4 {
            return Err(MessageError::DeviceInfoTooShort { words: words.len() });
        }
        let mut padded = [0u32; DEVICE_INFO_WORDS];
        let take = words.len().min(DEVICE_INFO_WORDS);
        padded[..take].copy_from_slice(&words[..take]);

        let mut bytes = [0u8; 96];
        for (index, chunk) in bytes.chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&padded[TEXT_FIRST_WORD + index].to_be_bytes());
        }

        let mut product_name = [0u8; 30];
        product_name.copy_from_slice(&bytes[2..32]);
        let mut product_license = [0u8; 60];
        product_license.copy_from_slice(&bytes[32..92]);

        Ok(Self {
            functions: padded[0],
            function_data: [padded[1], padded[2], padded[3]],
            region: bytes[0],
            connection_direction: bytes[1],
            product_name,
            product_license,
            standby_power: u16::from_le_bytes([bytes[92], bytes[93]]),
            max_power: u16::from_le_bytes([bytes[94], bytes[95]]),
        })
    }

    /// Serialize the extended payload: the fixed identity followed by the
    /// free-form version area.
    pub fn to_extended_words(
        &self,
        version: &[u8; 40],
    ) -> [u32; DEVICE_INFO_WORDS + DEVICE_INFO_EXTENSION_WORDS] {
        let mut words = [0u32; DEVICE_INFO_WORDS + DEVICE_INFO_EXTENSION_WORDS];
        words[..DEVICE_INFO_WORDS].copy_from_slice(&self.to_words());
        for (index, chunk) in version.chunks_exact(4).enumerate() {
            words[DEVICE_INFO_WORDS + index] =
                u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        words
    }
}
