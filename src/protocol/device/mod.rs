//! Device role: act as a Maple Bus peripheral answering a host.
//!
//! The dispatcher owns the peripheral's identity and routes every incoming
//! packet to its own handlers (device info, reset, shutdown) or to the
//! function implementations provided by the firmware; protocol errors are
//! answered in-band rather than dropped.
use embassy_time::Instant;

use crate::core::command;
use crate::protocol::messages::DeviceInfo;
use crate::protocol::node::function::FunctionCode;
use crate::protocol::transport::address::MapleAddress;
use crate::protocol::transport::bus::{BusEvent, MapleBusTransport};
use crate::protocol::transport::frame::Frame;
use crate::protocol::transport::packet::Packet;
use crate::protocol::transport::traits::maple_phy::MaplePhy;
use crate::protocol::transport::traits::maple_timer::MapleTimer;
use crate::error::FailureReason;
use crate::protocol::transport::{RESPONSE_TIMEOUT, TICK_PERIOD};

//==================================================================================DEVICE_FUNCTION
/// One capability implementation of a device-role peripheral.
///
/// Implementations consume packets addressed to their function code and
/// fill in the reply; they never touch the transport.
pub trait DeviceFunction {
    /// Dispatch key (exactly one bit set).
    fn function_code(&self) -> FunctionCode;

    /// Capability definition word advertised in device-info responses.
    fn function_definition(&self) -> u32;

    /// Handle a packet addressed to this function. Set the reply's command
    /// and payload and return `true`; returning `false` means the command
    /// is not understood and is answered in-band by the dispatcher.
    fn handle_packet(&mut self, packet: &Packet, reply: &mut Packet) -> bool;

    /// Drop transient state after a bus reset.
    fn reset(&mut self);
}

//==================================================================================DISPATCHER
/// Packet router of one device-role peripheral.
pub struct PeripheralDispatcher<'f> {
    addr: MapleAddress,
    /// Slot bits of attached sub-peripherals, advertised in every reply's
    /// sender byte.
    sub_mask: u8,
    info: DeviceInfo,
    version: [u8; 40],
    functions: &'f mut [&'f mut dyn DeviceFunction],
}

impl<'f> PeripheralDispatcher<'f> {
    /// Build a dispatcher advertising exactly the given functions.
    ///
    /// The identity's capability mask and definition words are rebuilt from
    /// `functions`; the text fields of `info` are kept as provided.
    pub fn new(
        addr: MapleAddress,
        sub_mask: u8,
        mut info: DeviceInfo,
        version: [u8; 40],
        functions: &'f mut [&'f mut dyn DeviceFunction],
    ) -> Self {
        info.functions = 0;
        info.function_data = [0; 3];
        // Definitions pair with capability bits MSB-first; order the data
        // words accordingly, independent of the slice order.
        for function in functions.iter() {
            info.functions |= function.function_code().bits();
        }
        let mut data_index = 0;
        let mut remaining = info.functions;
        while remaining != 0 && data_index < info.function_data.len() {
            let top = 1u32 << (31 - remaining.leading_zeros());
            remaining &= !top;
            if let Some(function) = functions.iter().find(|f| f.function_code().bits() == top) {
                info.function_data[data_index] = function.function_definition();
            }
            data_index += 1;
        }
        Self {
            addr,
            sub_mask,
            info,
            version,
            functions,
        }
    }

    /// Wire address of this peripheral.
    pub fn address(&self) -> MapleAddress {
        self.addr
    }

    /// Sender byte stamped on every reply: own bits plus attached slots.
    fn sender_byte(&self) -> u8 {
        self.addr.to_byte() | self.sub_mask
    }

    /// Route one received packet; `None` means no response goes on the
    /// wire (not addressed to us, or the sender talked to itself).
    pub fn handle_packet(&mut self, packet: &Packet) -> Option<Packet> {
        let frame = packet.frame;
        // A frame whose sender and recipient coincide gets no response at
        // all; answering would collide with the next legitimate exchange.
        if frame.sender == frame.recipient {
            return None;
        }
        match MapleAddress::from_byte(frame.recipient) {
            Ok(recipient) if recipient == self.addr => {}
            _ => return None,
        }

        let mut reply = Packet::new();
        match frame.command {
            command::DEVICE_INFO_REQUEST => {
                reply.frame.command = command::DEVICE_INFO_RESPONSE;
                // Identity payloads always fit the packet capacity.
                let _ = reply.set_payload(&self.info.to_words());
            }
            command::EXTENDED_DEVICE_INFO_REQUEST => {
                reply.frame.command = command::EXTENDED_DEVICE_INFO_RESPONSE;
                let _ = reply.set_payload(&self.info.to_extended_words(&self.version));
            }
            command::RESET => {
                for function in self.functions.iter_mut() {
                    function.reset();
                }
                reply.frame.command = command::ACK;
            }
            command::SHUTDOWN => {
                reply.frame.command = command::ACK;
            }
            _ => self.dispatch_to_function(packet, &mut reply),
        }

        reply.frame.recipient = frame.sender;
        reply.frame.sender = self.sender_byte();
        Some(reply)
    }

    /// Reply asking the host to repeat a frame that failed its CRC.
    pub fn request_resend(&self) -> Packet {
        let host = MapleAddress::host(self.addr.player());
        Packet::from_frame(Frame::new(
            command::REQUEST_RESEND,
            host.to_byte(),
            self.sender_byte(),
        ))
    }

    /// Function-addressed commands carry their dispatch key in the first
    /// payload word. Unknown codes and unhandled commands are answered
    /// in-band, never dropped.
    fn dispatch_to_function(&mut self, packet: &Packet, reply: &mut Packet) {
        let Some(code) = packet
            .payload()
            .first()
            .copied()
            .and_then(|word| FunctionCode::new(word).ok())
        else {
            reply.frame.command = command::UNKNOWN_COMMAND;
            return;
        };
        let Some(function) = self
            .functions
            .iter_mut()
            .find(|f| f.function_code() == code)
        else {
            reply.frame.command = command::FUNCTION_CODE_NOT_SUPPORTED;
            return;
        };
        if !function.handle_packet(packet, reply) {
            *reply = Packet::new();
            reply.frame.command = command::UNKNOWN_COMMAND;
        }
    }
}

//==================================================================================DEVICE_RUNNER
/// Transport loop of one device-role peripheral: keep a read armed, answer
/// what arrives, ask for a resend when a frame comes in corrupted.
pub struct MapleDevice<'a, 'f, P: MaplePhy> {
    bus: MapleBusTransport<'a, P>,
    dispatcher: PeripheralDispatcher<'f>,
}

impl<'a, 'f, P: MaplePhy> MapleDevice<'a, 'f, P> {
    pub fn new(bus: MapleBusTransport<'a, P>, dispatcher: PeripheralDispatcher<'f>) -> Self {
        Self { bus, dispatcher }
    }

    pub fn dispatcher(&self) -> &PeripheralDispatcher<'f> {
        &self.dispatcher
    }

    /// One cooperative tick. Returns once the transport state was advanced.
    pub fn tick(&mut self, now: Instant) {
        match self.bus.process_events(now) {
            BusEvent::Idle => {
                // The host decides when to talk; listen without a bound.
                if self.bus.start_read(None, now).is_err() {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("device receiver could not be armed");
                }
            }
            BusEvent::Pending => {}
            BusEvent::ReadComplete(packet) => {
                if let Some(reply) = self.dispatcher.handle_packet(&packet) {
                    self.send(&reply, now);
                }
            }
            BusEvent::ReadFailed(FailureReason::CrcInvalid) => {
                let resend = self.dispatcher.request_resend();
                self.send(&resend, now);
            }
            BusEvent::ReadFailed(_reason) => {}
            BusEvent::WriteComplete | BusEvent::WriteFailed(_) => {
                // Either way the reply window is over; the next tick
                // re-arms the receiver.
            }
        }
    }

    /// Drive the peripheral forever at the polling cadence.
    pub async fn run<T: MapleTimer>(mut self, timer: &mut T) -> ! {
        loop {
            let now = timer.now();
            self.tick(now);
            timer.delay_us(TICK_PERIOD.as_micros()).await;
        }
    }

    fn send(&mut self, reply: &Packet, now: Instant) {
        if self
            .bus
            .write(reply, false, RESPONSE_TIMEOUT, now)
            .is_err()
        {
            #[cfg(feature = "defmt")]
            defmt::warn!("device reply could not be started");
        }
    }
}
