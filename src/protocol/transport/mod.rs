//! Maple Bus transport layer: frame/packet representations, typed wire
//! addresses, the bus phase machine, and hardware abstraction traits.
//!
//! ## Maple Bus Timing Constants
//!
//! These constants bound every asynchronous exchange on the bus. The per-bit
//! time is dictated by the original console's signaling; the timeouts are
//! tunables whose defaults match real accessories observed on the wire.

pub mod address;
pub mod bus;
pub mod frame;
pub mod packet;
pub mod traits;

use embassy_time::Duration;

/// Extra margin applied on top of the computed transmit duration before a
/// write is declared dead (percent).
///
/// A write that has not completed within its own wire time plus this margin
/// means the shifter stalled or the line was stolen; the exchange is killed
/// and reported as a timeout.
pub const WRITE_TIMEOUT_EXTRA_PERCENT: u64 = 20;

/// How long a host waits for a peripheral to start answering.
///
/// This bound is deliberately much larger than the inter-word gap: the
/// responder needs processing time between receiving a request and driving
/// its first response edge. Measured first-party accessories answer well
/// under 1 ms.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_micros(1_000);

/// Maximum gap between two received words before the receive is abandoned.
///
/// Real peripherals insert natural pauses between words while they read
/// flash or scan a matrix; gaps beyond this bound mean the transmitter died
/// mid-frame. The abort is reported as a timeout.
pub const INTER_WORD_READ_TIMEOUT: Duration = Duration::from_micros(100);

/// Duration of the pre-send "line is quiet" check.
///
/// Before every write the line is sampled for this window; any observed low
/// level means another transmitter is active and the write is refused.
pub const OPEN_LINE_CHECK_WINDOW: Duration = Duration::from_micros(10);

/// Fixed gap budgeted between a transmitted frame and the start of the
/// response, used in scheduling duration estimates.
pub const INTER_FRAME_GAP: Duration = Duration::from_micros(50);

/// Cadence of the cooperative polling tick driving the timeliner and node
/// hierarchy. Must stay sub-millisecond so transport timeouts resolve close
/// to their nominal bounds.
pub const TICK_PERIOD: Duration = Duration::from_micros(250);
