//! Peripheral-function dispatch keys and the host-side driver registry.
use embassy_time::Instant;

use crate::error::FunctionCodeError;
use crate::protocol::scheduling::scheduler::TxQueue;
use crate::protocol::scheduling::timeliner::TransferResult;
use crate::protocol::transport::address::MapleAddress;

//==================================================================================FUNCTION_CODE
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A single capability bit used as a dispatch key.
pub struct FunctionCode(u32);

impl FunctionCode {
    /// Validating constructor: exactly one bit must be set.
    pub const fn new(bits: u32) -> Result<Self, FunctionCodeError> {
        if bits.count_ones() == 1 {
            Ok(Self(bits))
        } else {
            Err(FunctionCodeError::NotSingleBit { bits })
        }
    }

    /// Raw capability bit.
    pub const fn bits(self) -> u32 {
        self.0
    }
}

//==================================================================================HOST_FUNCTION
/// Driver for one capability of a discovered peripheral, created by the
/// node hierarchy when the capability shows up in a device-info response.
///
/// Drivers cause bus traffic exclusively through the [`TxQueue`] facade
/// they are handed; they never touch the transport or the scheduler's
/// peek/pop surface.
pub trait HostFunction {
    /// Dispatch key (exactly one bit set).
    fn function_code(&self) -> FunctionCode;

    /// Per-tick hook; queue polling traffic for `peripheral` here.
    fn task<const CAP: usize>(
        &mut self,
        queue: &mut TxQueue<'_, CAP>,
        peripheral: MapleAddress,
        now: Instant,
    );

    /// An exchange this driver queued was resolved.
    fn transfer_complete<const CAP: usize>(
        &mut self,
        result: &TransferResult,
        queue: &mut TxQueue<'_, CAP>,
        now: Instant,
    );

    /// Drop transient state; the owning node is being torn down.
    fn reset(&mut self);
}

//==================================================================================FACTORY
/// Registry mapping advertised capability bits to concrete drivers.
///
/// Returning `None` leaves a capability unhandled: the node reports it and
/// keeps polling the drivers it does know.
pub trait HostFunctionFactory {
    type Driver: HostFunction;

    fn create(
        &mut self,
        peripheral: MapleAddress,
        code: FunctionCode,
        definition: u32,
    ) -> Option<Self::Driver>;
}
