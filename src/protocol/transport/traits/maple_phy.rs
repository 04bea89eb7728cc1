//! Minimal abstraction for the Maple Bus signaling hardware. Allows the
//! library to plug into various implementations (PIO state machines,
//! bit-banged GPIO, a simulated bus in tests).
use embassy_time::Duration;

/// Contract implemented by the physical signaling layer.
///
/// The transport drives this trait from the cooperative polling context.
/// Completion and reception events travel back through the
/// [`crate::protocol::transport::bus::IsrBridge`], whose entry points the
/// driver's interrupt glue calls.
pub trait MaplePhy {
    type Error: core::fmt::Debug;

    /// Sample the line for `window` and report whether another transmitter
    /// held it low at any point. Blocking, bounded by `window`.
    fn line_is_occupied(&mut self, window: Duration) -> bool;

    /// Begin the asynchronous shift-out of `buffer`.
    ///
    /// The buffer starts with a bit-count header word; the shifter stops
    /// after exactly that many bits, so the final word may be partial. With
    /// `autostart_read` the hardware must arm its receiver the moment the
    /// last bit leaves the line.
    fn start_transmit(&mut self, buffer: &[u32], autostart_read: bool)
        -> Result<(), Self::Error>;

    /// Arm the receiver and wait for a start pattern.
    fn start_receive(&mut self) -> Result<(), Self::Error>;

    /// Abort any in-flight operation and release the line.
    fn abort(&mut self);
}
