//! Sub-peripheral nodes: up to five daisy-chained accessory slots under one
//! main peripheral.
//!
//! A sub node's connectivity is derived, not polled independently: the main
//! peripheral advertises attached slots in the low bits of its sender byte,
//! and the main node flips each sub's state from that mask.
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Instant;

use crate::core::command;
use crate::protocol::messages::DeviceInfo;
use crate::protocol::node::function::{FunctionCode, HostFunction, HostFunctionFactory};
use crate::protocol::node::{
    emit_event, schedule_device_info_probe, NodeEvent, MAX_FUNCTIONS,
};
use crate::protocol::scheduling::scheduler::TransmissionScheduler;
use crate::protocol::scheduling::timeliner::TransferResult;
use crate::protocol::scheduling::transmission::TransmissionId;
use crate::protocol::scheduling::PRIORITY_SUB;
use crate::protocol::transport::address::MapleAddress;
use crate::protocol::transport::packet::Packet;

//==================================================================================SUB_NODE
/// One accessory slot under a main peripheral.
pub struct SubNode<F: HostFunctionFactory> {
    addr: MapleAddress,
    attached: bool,
    functions: [Option<F::Driver>; MAX_FUNCTIONS],
    probe_id: Option<TransmissionId>,
}

impl<F: HostFunctionFactory> SubNode<F> {
    pub(crate) fn new(addr: MapleAddress) -> Self {
        Self {
            addr,
            attached: false,
            functions: core::array::from_fn(|_| None),
            probe_id: None,
        }
    }

    /// Wire address of this slot.
    pub fn address(&self) -> MapleAddress {
        self.addr
    }

    /// Whether the main peripheral currently advertises this slot.
    pub fn attached(&self) -> bool {
        self.attached
    }

    /// Whether function drivers exist (device info was received).
    pub fn has_functions(&self) -> bool {
        self.functions.iter().any(Option::is_some)
    }

    /// The slot appeared in the main's sender mask: start probing it.
    pub(crate) fn connect<const CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        now: Instant,
    ) {
        self.attached = true;
        #[cfg(feature = "defmt")]
        defmt::info!("sub peripheral advertised at {=u8:#04x}", self.addr.to_byte());
        match schedule_device_info_probe(scheduler, self.addr, PRIORITY_SUB, now) {
            Ok(id) => self.probe_id = Some(id),
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("sub probe could not be queued");
            }
        }
    }

    /// The slot vanished from the sender mask, or the parent disconnected:
    /// tear everything down immediately, no failure count involved.
    pub(crate) fn disconnect<const CAP: usize, const EVT_CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        events: Option<&Channel<CriticalSectionRawMutex, NodeEvent, EVT_CAP>>,
    ) {
        let had_functions = self.has_functions();
        for slot in self.functions.iter_mut() {
            *slot = None;
        }
        if let Some(id) = self.probe_id.take() {
            scheduler.cancel_by_id(id);
        }
        scheduler.cancel_by_recipient(self.addr);
        self.attached = false;
        if had_functions {
            #[cfg(feature = "defmt")]
            defmt::info!("sub peripheral lost at {=u8:#04x}", self.addr.to_byte());
            emit_event(
                events,
                NodeEvent::PeripheralDisconnected {
                    peripheral: self.addr,
                },
            );
        }
    }

    /// Per-tick hook for the slot's drivers.
    pub(crate) fn task<const CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        now: Instant,
    ) {
        for driver in self.functions.iter_mut().flatten() {
            driver.task(&mut scheduler.queue(), self.addr, now);
        }
    }

    /// A successful exchange addressed to this slot resolved.
    pub(crate) fn handle_response<const CAP: usize, const EVT_CAP: usize>(
        &mut self,
        factory: &mut F,
        scheduler: &mut TransmissionScheduler<CAP>,
        result: &TransferResult,
        response: &Packet,
        now: Instant,
        events: Option<&Channel<CriticalSectionRawMutex, NodeEvent, EVT_CAP>>,
    ) {
        if response.frame.command == command::DEVICE_INFO_RESPONSE && !self.has_functions() {
            match DeviceInfo::from_words(response.payload()) {
                Ok(info) => self.attach(factory, scheduler, &info, events),
                Err(_e) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("sub device info rejected");
                }
            }
            return;
        }
        let Some(code) = request_function_code(result) else {
            return;
        };
        for driver in self.functions.iter_mut().flatten() {
            if driver.function_code() == code {
                driver.transfer_complete(result, &mut scheduler.queue(), now);
                break;
            }
        }
    }

    fn attach<const CAP: usize, const EVT_CAP: usize>(
        &mut self,
        factory: &mut F,
        scheduler: &mut TransmissionScheduler<CAP>,
        info: &DeviceInfo,
        events: Option<&Channel<CriticalSectionRawMutex, NodeEvent, EVT_CAP>>,
    ) {
        let mut slot = 0;
        for (code, definition) in info.advertised_functions() {
            if slot >= MAX_FUNCTIONS {
                break;
            }
            match factory.create(self.addr, code, definition) {
                Some(driver) => {
                    self.functions[slot] = Some(driver);
                    slot += 1;
                }
                None => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("unrecognized function code {=u32:#010x}", code.bits());
                }
            }
        }
        if let Some(id) = self.probe_id.take() {
            scheduler.cancel_by_id(id);
        }
        #[cfg(feature = "defmt")]
        defmt::info!("sub peripheral attached at {=u8:#04x}", self.addr.to_byte());
        emit_event(
            events,
            NodeEvent::PeripheralConnected {
                peripheral: self.addr,
                functions: info.functions,
            },
        );
    }
}

/// Dispatch key of the request that produced `result`: its first payload
/// word, when that word is a well-formed function code.
pub(crate) fn request_function_code(result: &TransferResult) -> Option<FunctionCode> {
    result
        .tx
        .packet
        .payload()
        .first()
        .copied()
        .and_then(|word| FunctionCode::new(word).ok())
}
