//! Test doubles to simulate the Maple Bus PHY, clock, and peripheral
//! function drivers during integration tests.
// Each integration target pulls in a subset of these doubles.
#![allow(dead_code)]
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use embassy_time::Instant;
use maple_bus::core::command;
use maple_bus::protocol::node::function::{FunctionCode, HostFunction, HostFunctionFactory};
use maple_bus::protocol::scheduling::scheduler::TxQueue;
use maple_bus::protocol::scheduling::timeliner::TransferResult;
use maple_bus::protocol::scheduling::transmission::TransmissionRequest;
use maple_bus::protocol::transport::address::MapleAddress;
use maple_bus::protocol::transport::bus::IsrBridge;
use maple_bus::protocol::transport::frame::Frame;
use maple_bus::protocol::transport::packet::Packet;
use maple_bus::protocol::transport::traits::maple_phy::MaplePhy;
use maple_bus::protocol::transport::traits::maple_timer::MapleTimer;

//==================================================================================MOCK_PHY

#[derive(Default)]
pub struct PhyState {
    /// Every transmit start: the raw word buffer and the autostart flag.
    pub transmits: Vec<(Vec<u32>, bool)>,
    pub receives: usize,
    pub aborts: usize,
    pub line_busy: bool,
}

#[derive(Clone, Default)]
/// In-memory PHY recording everything the transport starts.
pub struct MockPhy {
    pub state: Arc<Mutex<PhyState>>,
}

impl MockPhy {
    pub fn transmit_count(&self) -> usize {
        self.state.lock().unwrap().transmits.len()
    }

    pub fn last_transmit(&self) -> Option<Vec<u32>> {
        self.state
            .lock()
            .unwrap()
            .transmits
            .last()
            .map(|(buffer, _)| buffer.clone())
    }

    /// Frame word of the last started transmit (after the bit-count header).
    pub fn last_frame(&self) -> Option<Frame> {
        self.last_transmit()
            .map(|buffer| Frame::from_word(buffer[1]))
    }
}

impl MaplePhy for MockPhy {
    type Error = ();

    fn line_is_occupied(&mut self, _window: embassy_time::Duration) -> bool {
        self.state.lock().unwrap().line_busy
    }

    fn start_transmit(&mut self, buffer: &[u32], autostart_read: bool) -> Result<(), ()> {
        self.state
            .lock()
            .unwrap()
            .transmits
            .push((buffer.to_vec(), autostart_read));
        Ok(())
    }

    fn start_receive(&mut self) -> Result<(), ()> {
        self.state.lock().unwrap().receives += 1;
        Ok(())
    }

    fn abort(&mut self) {
        self.state.lock().unwrap().aborts += 1;
    }
}

//==================================================================================MOCK_TIMER

#[derive(Clone, Default)]
/// Deterministic clock: `delay_us` advances it and yields to the runtime.
pub struct MockTimer {
    clock: Arc<AtomicU64>,
}

impl MockTimer {
    pub fn set(&self, micros: u64) {
        self.clock.store(micros, Ordering::SeqCst);
    }
}

impl MapleTimer for MockTimer {
    fn now(&self) -> Instant {
        Instant::from_micros(self.clock.load(Ordering::SeqCst))
    }

    async fn delay_us(&mut self, micros: u64) {
        self.clock.fetch_add(micros, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

//==================================================================================WIRE_SHUTTLE

/// Split a recorded transmit buffer into its on-wire span and CRC byte.
pub fn wire_span(buffer: &[u32]) -> (Vec<u32>, u8) {
    let words = buffer[1..buffer.len() - 1].to_vec();
    let crc = (buffer[buffer.len() - 1] >> 24) as u8;
    (words, crc)
}

/// Feed a word span through a bridge's interrupt entry points.
pub fn deliver(bridge: &IsrBridge, words: &[u32], crc: u8, now: Instant) {
    bridge.read_started(now);
    for word in words {
        bridge.read_word(*word, now);
    }
    bridge.read_complete(crc, now);
}

/// Deliver a well-formed packet as if a peer transmitted it.
pub fn deliver_packet(bridge: &IsrBridge, packet: &Packet, now: Instant) {
    let mut words = vec![packet.frame.to_word()];
    words.extend_from_slice(packet.payload());
    deliver(bridge, &words, packet.crc(), now);
}

//==================================================================================MOCK_FACTORY

#[derive(Clone, Default)]
/// Factory recording every driver it builds; drivers poll their function
/// with a repeating get-condition request.
pub struct RecordingFactory {
    pub created: Arc<Mutex<Vec<(u8, u32, u32)>>>,
    pub completions: Arc<Mutex<usize>>,
    /// Polling cadence handed to every driver, in microseconds.
    pub poll_period_us: u64,
}

impl HostFunctionFactory for RecordingFactory {
    type Driver = PollingDriver;

    fn create(
        &mut self,
        peripheral: MapleAddress,
        code: FunctionCode,
        definition: u32,
    ) -> Option<PollingDriver> {
        self.created
            .lock()
            .unwrap()
            .push((peripheral.to_byte(), code.bits(), definition));
        Some(PollingDriver {
            code,
            poll_period_us: self.poll_period_us,
            scheduled: false,
            completions: self.completions.clone(),
        })
    }
}

/// Driver double: queues one repeating get-condition poll on its first
/// tick and counts resolved exchanges.
pub struct PollingDriver {
    code: FunctionCode,
    poll_period_us: u64,
    scheduled: bool,
    completions: Arc<Mutex<usize>>,
}

impl HostFunction for PollingDriver {
    fn function_code(&self) -> FunctionCode {
        self.code
    }

    fn task<const CAP: usize>(
        &mut self,
        queue: &mut TxQueue<'_, CAP>,
        peripheral: MapleAddress,
        now: Instant,
    ) {
        if self.scheduled {
            return;
        }
        let mut packet = Packet::from_frame(Frame::new(
            command::GET_CONDITION,
            peripheral.to_byte(),
            0,
        ));
        packet.set_payload(&[self.code.bits()]).unwrap();
        let request = TransmissionRequest::new(1, now, packet)
            .with_response(2)
            .repeating(embassy_time::Duration::from_micros(self.poll_period_us));
        if queue.add(request).is_ok() {
            self.scheduled = true;
        }
    }

    fn transfer_complete<const CAP: usize>(
        &mut self,
        _result: &TransferResult,
        _queue: &mut TxQueue<'_, CAP>,
        _now: Instant,
    ) {
        *self.completions.lock().unwrap() += 1;
    }

    fn reset(&mut self) {
        self.scheduled = false;
    }
}
