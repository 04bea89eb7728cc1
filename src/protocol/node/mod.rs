//! Host-side node hierarchy: the main peripheral node, its daisy-chained
//! sub nodes, the peripheral-function driver registry, and the per-bus
//! service tying the hierarchy to the scheduler and transport.
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant};

use crate::core::command;
use crate::error::ScheduleError;
use crate::protocol::messages::DEVICE_INFO_WORDS;
use crate::protocol::scheduling::scheduler::TransmissionScheduler;
use crate::protocol::scheduling::transmission::{TransmissionId, TransmissionRequest};
use crate::protocol::transport::address::MapleAddress;
use crate::protocol::transport::frame::Frame;
use crate::protocol::transport::packet::Packet;

pub mod function;
pub mod host;
pub mod main_node;
pub mod sub_node;

/// Sub-peripheral slots per main node.
pub const MAX_SUB_PERIPHERALS: usize = 5;

/// Peripheral-function drivers per node.
pub const MAX_FUNCTIONS: usize = 3;

/// Consecutive failures addressed to a connected main peripheral before the
/// node is torn down.
pub const DISCONNECT_FAILURE_THRESHOLD: u8 = 3;

/// Cadence of the device-info probe while no peripheral is attached.
pub const DEVICE_INFO_PROBE_PERIOD: Duration = Duration::from_millis(16);

//==================================================================================NODE_EVENT
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Structural change in the node hierarchy, delivered to the owning
/// collaborator through the service's event channel.
pub enum NodeEvent {
    /// A peripheral answered its device-info probe and its function drivers
    /// were instantiated.
    PeripheralConnected {
        peripheral: MapleAddress,
        functions: u32,
    },
    /// A peripheral was torn down; its function drivers are gone.
    PeripheralDisconnected { peripheral: MapleAddress },
}

/// Non-blocking event delivery; a full channel drops the event rather than
/// stalling the polling tick.
pub(crate) fn emit_event<const EVT_CAP: usize>(
    events: Option<&Channel<CriticalSectionRawMutex, NodeEvent, EVT_CAP>>,
    event: NodeEvent,
) {
    if let Some(channel) = events {
        if channel.try_send(event).is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("node event dropped, channel full");
        }
    }
}

/// Queue the repeating device-info probe for `recipient`.
pub(crate) fn schedule_device_info_probe<const CAP: usize>(
    scheduler: &mut TransmissionScheduler<CAP>,
    recipient: MapleAddress,
    priority: u8,
    now: Instant,
) -> Result<TransmissionId, ScheduleError> {
    let packet = Packet::from_frame(Frame::new(
        command::DEVICE_INFO_REQUEST,
        recipient.to_byte(),
        0,
    ));
    scheduler.add(
        TransmissionRequest::new(priority, now, packet)
            .with_response(DEVICE_INFO_WORDS as u8)
            .repeating(DEVICE_INFO_PROBE_PERIOD),
    )
}
