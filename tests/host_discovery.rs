//! Host-side discovery scenarios driven tick by tick: device-info probe,
//! driver creation, sender-derived sub attach, and failure-driven
//! disconnect with rediscovery.
mod helpers;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Instant;
use helpers::{deliver_packet, MockPhy, RecordingFactory};
use maple_bus::core::{command, function};
use maple_bus::protocol::messages::DeviceInfo;
use maple_bus::protocol::node::host::MapleHostService;
use maple_bus::protocol::node::NodeEvent;
use maple_bus::protocol::transport::address::{MapleAddress, PlayerIndex};
use maple_bus::protocol::transport::bus::IsrBridge;
use maple_bus::protocol::transport::frame::Frame;
use maple_bus::protocol::transport::packet::Packet;

type Events = Channel<CriticalSectionRawMutex, NodeEvent, 8>;
type Service<'a> = MapleHostService<'a, MockPhy, RecordingFactory, 16, 4, 8>;

fn at(micros: u64) -> Instant {
    Instant::from_micros(micros)
}

fn player() -> PlayerIndex {
    PlayerIndex::new(0).unwrap()
}

fn main_addr() -> MapleAddress {
    MapleAddress::main_peripheral(player())
}

fn info_response(sender_byte: u8, functions: u32, definition: u32) -> Packet {
    let info = DeviceInfo::from_functions(functions, [definition, 0, 0]);
    let mut packet =
        Packet::from_frame(Frame::new(command::DEVICE_INFO_RESPONSE, 0x00, sender_byte));
    packet.set_payload(&info.to_words()).unwrap();
    packet
}

fn condition_response(sender_byte: u8, code: u32) -> Packet {
    let mut packet = Packet::from_frame(Frame::new(command::DATA_TRANSFER, 0x00, sender_byte));
    packet.set_payload(&[code, 0xFFFF_0000]).unwrap();
    packet
}

#[test]
fn discovery_polling_and_sub_attach() {
    let bridge = IsrBridge::new();
    let phy = MockPhy::default();
    let factory = RecordingFactory {
        poll_period_us: 1_000,
        ..RecordingFactory::default()
    };
    let created = factory.created.clone();
    let completions = factory.completions.clone();
    let events = Events::new();
    let mut service: Service =
        MapleHostService::new(player(), phy.clone(), &bridge, factory, None, Some(&events));
    service.start(at(0)).unwrap();

    // t=0: the device-info probe goes on the wire, response armed.
    service.tick(at(0));
    assert_eq!(phy.transmit_count(), 1);
    let probe = phy.last_frame().unwrap();
    assert_eq!(probe.command, command::DEVICE_INFO_REQUEST);
    assert_eq!(probe.recipient, main_addr().to_byte());

    // The controller answers, advertising sub slot 0 in its sender byte.
    bridge.write_complete();
    deliver_packet(&bridge, &info_response(0x21, function::CONTROLLER, 0xF060), at(200));

    // t=250: attach — driver created, probe cancelled, event emitted.
    service.tick(at(250));
    assert!(service.node().is_connected());
    assert_eq!(
        events.try_receive().ok(),
        Some(NodeEvent::PeripheralConnected {
            peripheral: main_addr(),
            functions: function::CONTROLLER,
        })
    );
    assert_eq!(
        *created.lock().unwrap(),
        [(0x20, function::CONTROLLER, 0xF060)]
    );
    assert!(service.node().sub_nodes()[0].attached());

    // t=260: the driver's first get-condition poll wins over the sub probe.
    service.tick(at(260));
    assert_eq!(phy.transmit_count(), 2);
    let poll = phy.last_frame().unwrap();
    assert_eq!(poll.command, command::GET_CONDITION);
    assert_eq!(poll.recipient, main_addr().to_byte());

    bridge.write_complete();
    deliver_packet(&bridge, &condition_response(0x21, function::CONTROLLER), at(300));
    service.tick(at(310));
    assert_eq!(*completions.lock().unwrap(), 1);

    // t=320: the sub slot's own device-info probe runs next.
    service.tick(at(320));
    assert_eq!(phy.transmit_count(), 3);
    let sub_probe = phy.last_frame().unwrap();
    assert_eq!(sub_probe.command, command::DEVICE_INFO_REQUEST);
    assert_eq!(sub_probe.recipient, 0x01);

    bridge.write_complete();
    deliver_packet(&bridge, &info_response(0x01, function::STORAGE, 0x0040), at(400));
    service.tick(at(410));
    assert!(service.node().sub_nodes()[0].has_functions());
    let sub0 = MapleAddress::sub_peripheral(player(), 0).unwrap();
    assert_eq!(
        events.try_receive().ok(),
        Some(NodeEvent::PeripheralConnected {
            peripheral: sub0,
            functions: function::STORAGE,
        })
    );
    assert_eq!(created.lock().unwrap().len(), 2);
}

#[test]
fn repeated_timeouts_disconnect_and_rediscover() {
    let bridge = IsrBridge::new();
    let phy = MockPhy::default();
    let factory = RecordingFactory {
        poll_period_us: 1_000,
        ..RecordingFactory::default()
    };
    let completions = factory.completions.clone();
    let events = Events::new();
    let mut service: Service =
        MapleHostService::new(player(), phy.clone(), &bridge, factory, None, Some(&events));
    service.start(at(0)).unwrap();

    // Attach a bare controller (no subs advertised).
    service.tick(at(0));
    bridge.write_complete();
    deliver_packet(&bridge, &info_response(0x20, function::CONTROLLER, 0), at(5));
    service.tick(at(10));
    assert!(service.node().is_connected());
    let _ = events.try_receive();

    // One answered poll to prove the loop is healthy.
    service.tick(at(20));
    bridge.write_complete();
    deliver_packet(&bridge, &condition_response(0x20, function::CONTROLLER), at(30));
    service.tick(at(40));
    assert_eq!(*completions.lock().unwrap(), 1);

    // The peripheral goes silent: three polls die on their kill-times.
    let mut tick_at = 1_010;
    for round in 0..3 {
        service.tick(at(tick_at)); // Write starts.
        service.tick(at(tick_at + 1_200)); // Kill-time passed, failure recorded.
        if round < 2 {
            assert!(service.node().is_connected(), "round {round}");
        }
        tick_at += 1_200 + 10;
    }
    assert!(!service.node().is_connected());
    assert_eq!(
        events.try_receive().ok(),
        Some(NodeEvent::PeripheralDisconnected {
            peripheral: main_addr(),
        })
    );

    // Rediscovery goes through the very same probe path.
    let before = phy.transmit_count();
    service.tick(at(tick_at));
    assert_eq!(phy.transmit_count(), before + 1);
    let probe = phy.last_frame().unwrap();
    assert_eq!(probe.command, command::DEVICE_INFO_REQUEST);

    bridge.write_complete();
    deliver_packet(
        &bridge,
        &info_response(0x20, function::CONTROLLER, 0),
        at(tick_at + 100),
    );
    service.tick(at(tick_at + 150));
    assert!(service.node().is_connected());
}
