//! The main node: lifecycle of the directly plugged-in peripheral on one
//! bus, plus fan-out to its sub nodes.
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Instant;

use crate::core::command;
use crate::error::ScheduleError;
use crate::protocol::messages::DeviceInfo;
use crate::protocol::node::function::{HostFunction, HostFunctionFactory};
use crate::protocol::node::sub_node::{request_function_code, SubNode};
use crate::protocol::node::{
    emit_event, schedule_device_info_probe, NodeEvent, DISCONNECT_FAILURE_THRESHOLD,
    MAX_FUNCTIONS, MAX_SUB_PERIPHERALS,
};
use crate::protocol::scheduling::scheduler::TransmissionScheduler;
use crate::protocol::scheduling::timeliner::{TransferOutcome, TransferResult};
use crate::protocol::scheduling::transmission::TransmissionId;
use crate::protocol::scheduling::PRIORITY_MAIN;
use crate::protocol::transport::address::{MapleAddress, PlayerIndex, Role};
use crate::protocol::transport::packet::Packet;

//==================================================================================MAIN_NODE
/// Host-side model of one bus: the main peripheral plus its five
/// sub-peripheral slots.
///
/// While nothing is attached the node re-issues a device-info probe at a
/// fixed cadence; a valid response instantiates function drivers through
/// the factory and switches to normal polling. Three consecutive failures
/// addressed to the attached peripheral tear the whole tree down and
/// restart the probe.
pub struct MainNode<'a, F: HostFunctionFactory, const EVT_CAP: usize> {
    addr: MapleAddress,
    factory: F,
    functions: [Option<F::Driver>; MAX_FUNCTIONS],
    subs: [SubNode<F>; MAX_SUB_PERIPHERALS],
    connected: bool,
    failure_count: u8,
    probe_id: Option<TransmissionId>,
    events: Option<&'a Channel<CriticalSectionRawMutex, NodeEvent, EVT_CAP>>,
}

impl<'a, F: HostFunctionFactory, const EVT_CAP: usize> MainNode<'a, F, EVT_CAP> {
    pub fn new(
        player: PlayerIndex,
        factory: F,
        events: Option<&'a Channel<CriticalSectionRawMutex, NodeEvent, EVT_CAP>>,
    ) -> Self {
        Self {
            addr: MapleAddress::main_peripheral(player),
            factory,
            functions: core::array::from_fn(|_| None),
            subs: core::array::from_fn(|slot| {
                let addr = MapleAddress::sub_peripheral(player, slot as u8)
                    .expect("sub-peripheral slots 0..5 are always addressable");
                SubNode::new(addr)
            }),
            connected: false,
            failure_count: 0,
            probe_id: None,
            events,
        }
    }

    /// Wire address of the main peripheral.
    pub fn address(&self) -> MapleAddress {
        self.addr
    }

    /// Whether a peripheral is currently attached.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The five sub-peripheral slots.
    pub fn sub_nodes(&self) -> &[SubNode<F>; MAX_SUB_PERIPHERALS] {
        &self.subs
    }

    /// Number of live function drivers on the main peripheral.
    pub fn function_count(&self) -> usize {
        self.functions.iter().flatten().count()
    }

    /// Queue the initial device-info probe. Call once before ticking.
    pub fn start<const CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        now: Instant,
    ) -> Result<(), ScheduleError> {
        self.probe_id =
            Some(schedule_device_info_probe(scheduler, self.addr, PRIORITY_MAIN, now)?);
        Ok(())
    }

    /// Per-tick hook: run every function driver on the tree.
    pub fn task<const CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        now: Instant,
    ) {
        if self.connected {
            for driver in self.functions.iter_mut().flatten() {
                driver.task(&mut scheduler.queue(), self.addr, now);
            }
        }
        for sub in self.subs.iter_mut() {
            sub.task(scheduler, now);
        }
    }

    /// Consume one resolved exchange from the timeliner.
    pub fn handle_result<const CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        result: &TransferResult,
        now: Instant,
    ) {
        if result.tx.recipient.player() != self.addr.player() {
            return;
        }
        match &result.outcome {
            TransferOutcome::Failed(_reason) => {
                if result.tx.recipient.role() == Role::Main {
                    self.record_failure(scheduler, now);
                }
            }
            TransferOutcome::Complete(response) => {
                if result.tx.recipient.role() == Role::Main {
                    self.failure_count = 0;
                }
                if let Some(response) = response {
                    self.process_response(scheduler, result, response, now);
                }
            }
        }
    }

    /// Tear down the peripheral tree and go back to probing.
    pub fn disconnect<const CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        now: Instant,
    ) {
        for slot in self.functions.iter_mut() {
            *slot = None;
        }
        if let Some(id) = self.probe_id.take() {
            scheduler.cancel_by_id(id);
        }
        scheduler.cancel_by_recipient(self.addr);
        {
            let Self { subs, events, .. } = self;
            for sub in subs.iter_mut() {
                sub.disconnect(scheduler, *events);
            }
        }
        self.connected = false;
        self.failure_count = 0;
        #[cfg(feature = "defmt")]
        defmt::info!("main peripheral lost at {=u8:#04x}", self.addr.to_byte());
        emit_event(
            self.events,
            NodeEvent::PeripheralDisconnected {
                peripheral: self.addr,
            },
        );
        if self.start(scheduler, now).is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("device info probe could not be re-queued");
        }
    }

    //==================================================================================Internals

    fn record_failure<const CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        now: Instant,
    ) {
        if !self.connected {
            // Probe timeouts while nothing is plugged in are the idle norm.
            return;
        }
        self.failure_count += 1;
        if self.failure_count >= DISCONNECT_FAILURE_THRESHOLD {
            self.disconnect(scheduler, now);
        }
    }

    fn process_response<const CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        result: &TransferResult,
        response: &Packet,
        now: Instant,
    ) {
        // Every response from the main peripheral advertises its attached
        // sub slots in the sender byte.
        if let Ok((sender, sub_mask)) = MapleAddress::from_sender_byte(response.frame.sender) {
            if sender == self.addr {
                self.update_sub_connectivity(scheduler, sub_mask, now);
            }
        }
        match result.tx.recipient.role() {
            Role::Main => self.handle_main_response(scheduler, result, response, now),
            Role::Sub(slot) => {
                let Self {
                    factory,
                    subs,
                    events,
                    ..
                } = self;
                if let Some(sub) = subs.get_mut(slot as usize) {
                    sub.handle_response(factory, scheduler, result, response, now, *events);
                }
            }
            Role::Host => {}
        }
    }

    fn handle_main_response<const CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        result: &TransferResult,
        response: &Packet,
        now: Instant,
    ) {
        if !self.connected && response.frame.command == command::DEVICE_INFO_RESPONSE {
            match DeviceInfo::from_words(response.payload()) {
                Ok(info) => self.attach(scheduler, &info),
                Err(_e) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("main device info rejected");
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

    fn attach<const CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        info: &DeviceInfo,
    ) {
        let mut slot = 0;
        for (code, definition) in info.advertised_functions() {
            if slot >= MAX_FUNCTIONS {
                break;
            }
            match self.factory.create(self.addr, code, definition) {
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
        self.connected = true;
        self.failure_count = 0;
        #[cfg(feature = "defmt")]
        defmt::info!("main peripheral attached at {=u8:#04x}", self.addr.to_byte());
        emit_event(
            self.events,
            NodeEvent::PeripheralConnected {
                peripheral: self.addr,
                functions: info.functions,
            },
        );
    }

    fn update_sub_connectivity<const CAP: usize>(
        &mut self,
        scheduler: &mut TransmissionScheduler<CAP>,
        sub_mask: u8,
        now: Instant,
    ) {
        let Self { subs, events, .. } = self;
        for (slot, sub) in subs.iter_mut().enumerate() {
            let advertised = sub_mask & (1 << slot) != 0;
            if advertised && !sub.attached() {
                sub.connect(scheduler, now);
            } else if !advertised && sub.attached() {
                sub.disconnect(scheduler, *events);
            }
        }
    }
}
