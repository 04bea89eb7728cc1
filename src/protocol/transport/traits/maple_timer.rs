//! Asynchronous timer abstraction providing the timing primitives required
//! by the service runner loops.
use embassy_time::Instant;

/// Timer trait abstraction; must remain thread-safe when applicable.
pub trait MapleTimer {
    /// Current monotonic timestamp.
    fn now(&self) -> Instant;

    /// Asynchronously wait for `micros` microseconds.
    fn delay_us<'a>(&'a mut self, micros: u64) -> impl core::future::Future<Output = ()> + 'a;
}
