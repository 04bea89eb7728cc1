//! Protocol-fixed wire constants. Every value in this module is dictated by
//! the Maple Bus specification and must not be tuned: peers on a real bus
//! only understand these exact bytes.

/// Command opcodes carried in the most significant byte of the frame word.
///
/// Request opcodes occupy the low range; response opcodes issued by a
/// peripheral reuse the same byte. The high range (`0xFB..=0xFE`) holds the
/// in-band error responses, encoded on the wire as small negative values in
/// two's complement.
pub mod command {
    /// Ask a peripheral to describe itself (answered by [`DEVICE_INFO_RESPONSE`]).
    pub const DEVICE_INFO_REQUEST: u8 = 0x01;
    /// Ask for the extended self-description, including the free-form version area.
    pub const EXTENDED_DEVICE_INFO_REQUEST: u8 = 0x02;
    /// Return the peripheral to its power-on state.
    pub const RESET: u8 = 0x03;
    /// Tell the peripheral the bus is going down.
    pub const SHUTDOWN: u8 = 0x04;
    /// Device identity payload (see [`crate::protocol::messages::DeviceInfo`]).
    pub const DEVICE_INFO_RESPONSE: u8 = 0x05;
    /// Device identity payload plus the free-form version area.
    pub const EXTENDED_DEVICE_INFO_RESPONSE: u8 = 0x06;
    /// Positive acknowledgement carrying no payload.
    pub const ACK: u8 = 0x07;
    /// Generic data payload response (conditions, block reads, …).
    pub const DATA_TRANSFER: u8 = 0x08;
    /// Poll a function's current state (buttons, axes, …).
    pub const GET_CONDITION: u8 = 0x09;
    /// Query a storage function's geometry.
    pub const GET_MEMORY_INFORMATION: u8 = 0x0A;
    /// Read one storage block.
    pub const BLOCK_READ: u8 = 0x0B;
    /// Write one storage block.
    pub const BLOCK_WRITE: u8 = 0x0C;
    /// Query the outcome of the previous write.
    pub const GET_LAST_ERROR: u8 = 0x0D;
    /// Push state into a function (vibration intensity, screen pixels, …).
    pub const SET_CONDITION: u8 = 0x0E;
    /// Storage-level failure response.
    pub const FILE_ERROR: u8 = 0xFB;
    /// The receiver saw a corrupted frame and wants it again.
    pub const REQUEST_RESEND: u8 = 0xFC;
    /// The command byte itself was not recognized.
    pub const UNKNOWN_COMMAND: u8 = 0xFD;
    /// The addressed function code is not present on this peripheral.
    pub const FUNCTION_CODE_NOT_SUPPORTED: u8 = 0xFE;
    /// Sentinel for "no command"; never valid on the wire.
    pub const INVALID: u8 = 0xFF;
}

/// Function-code capability masks advertised in device-info payloads.
///
/// Exactly one bit identifies one capability; a peripheral's device-info
/// response ORs together every capability it carries.
pub mod function {
    /// Game controller (buttons, triggers, sticks).
    pub const CONTROLLER: u32 = 0x0000_0001;
    /// Block storage (memory unit).
    pub const STORAGE: u32 = 0x0000_0002;
    /// Monochrome screen.
    pub const SCREEN: u32 = 0x0000_0004;
    /// Real-time clock / timer.
    pub const TIMER: u32 = 0x0000_0008;
    /// Audio input.
    pub const AUDIO_INPUT: u32 = 0x0000_0010;
    /// AR gun.
    pub const AR_GUN: u32 = 0x0000_0020;
    /// Keyboard.
    pub const KEYBOARD: u32 = 0x0000_0040;
    /// Light gun.
    pub const LIGHT_GUN: u32 = 0x0000_0080;
    /// Vibration pack.
    pub const VIBRATION: u32 = 0x0000_0100;
    /// Mouse.
    pub const MOUSE: u32 = 0x0000_0200;
    /// Exchange media.
    pub const EX_MEDIA: u32 = 0x0000_0400;
    /// Camera.
    pub const CAMERA: u32 = 0x0000_0800;
}
