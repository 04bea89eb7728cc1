//! Per-bus host service assembling scheduler, timeliner, and node
//! hierarchy.
//!
//! It drives the whole pipeline from one cooperative tick and optionally
//! offers:
//!
//! * a command channel to inject bus-steal traffic (storage accesses,
//!   screen pushes) at external priority;
//! * an event channel delivering connect/disconnect notifications.
//!
//! Firmware decides which features it needs by providing pre-allocated
//! [`embassy_sync::channel::Channel`] instances. No allocation is performed
//! by the library and there is no dependency on a particular BSP.
//! Independent buses are fully independent service instances; nothing is
//! shared between them.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Instant;
use futures_util::future::{select, Either};
use futures_util::pin_mut;

use crate::protocol::node::function::HostFunctionFactory;
use crate::protocol::node::main_node::MainNode;
use crate::protocol::node::NodeEvent;
use crate::protocol::scheduling::scheduler::{TransmissionScheduler, TxQueue};
use crate::protocol::scheduling::transmission::TransmissionRequest;
use crate::protocol::scheduling::PRIORITY_EXTERNAL;
use crate::protocol::scheduling::timeliner::TransmissionTimeliner;
use crate::protocol::transport::address::{MapleAddress, PlayerIndex};
use crate::protocol::transport::bus::{IsrBridge, MapleBusTransport};
use crate::protocol::transport::packet::Packet;
use crate::protocol::transport::traits::maple_phy::MaplePhy;
use crate::protocol::transport::traits::maple_timer::MapleTimer;
use crate::protocol::transport::TICK_PERIOD;
use crate::error::ScheduleError;

//==================================================================================COMMAND
#[derive(Clone, Debug)]
/// Commands queued by external collaborator tasks.
pub enum HostCommand {
    /// One bus-steal exchange at external priority. The sender byte is
    /// stamped by the scheduler.
    Send {
        packet: Packet,
        expect_response: bool,
        expected_response_words: u8,
    },
    /// Drop every queued entry addressed to a recipient.
    CancelRecipient(MapleAddress),
}

//==================================================================================SERVICE
/// One Maple Bus in host role.
pub struct MapleHostService<
    'a,
    P: MaplePhy,
    F: HostFunctionFactory,
    const CAP: usize,
    const CMD_CAP: usize,
    const EVT_CAP: usize,
> {
    scheduler: TransmissionScheduler<CAP>,
    timeliner: TransmissionTimeliner<'a, P>,
    node: MainNode<'a, F, EVT_CAP>,
    commands: Option<&'a Channel<CriticalSectionRawMutex, HostCommand, CMD_CAP>>,
}

impl<'a, P, F, const CAP: usize, const CMD_CAP: usize, const EVT_CAP: usize>
    MapleHostService<'a, P, F, CAP, CMD_CAP, EVT_CAP>
where
    P: MaplePhy,
    F: HostFunctionFactory,
{
    pub fn new(
        player: PlayerIndex,
        phy: P,
        bridge: &'a IsrBridge,
        factory: F,
        commands: Option<&'a Channel<CriticalSectionRawMutex, HostCommand, CMD_CAP>>,
        events: Option<&'a Channel<CriticalSectionRawMutex, NodeEvent, EVT_CAP>>,
    ) -> Self {
        Self {
            scheduler: TransmissionScheduler::new(MapleAddress::host(player)),
            timeliner: TransmissionTimeliner::new(MapleBusTransport::new(phy, bridge)),
            node: MainNode::new(player, factory, events),
            commands,
        }
    }

    /// Queue the initial device-info probe. Call once before ticking.
    pub fn start(&mut self, now: Instant) -> Result<(), ScheduleError> {
        self.node.start(&mut self.scheduler, now)
    }

    /// The node hierarchy, for structural inspection.
    pub fn node(&self) -> &MainNode<'a, F, EVT_CAP> {
        &self.node
    }

    /// Direct queue access for collaborators living on the same task.
    pub fn queue(&mut self) -> TxQueue<'_, CAP> {
        self.scheduler.queue()
    }

    /// One cooperative tick: drain commands, start the next due write, poll
    /// the transport, dispatch the resolved exchange, run the driver hooks.
    pub fn tick(&mut self, now: Instant) {
        if let Some(commands) = self.commands {
            while let Ok(command) = commands.try_receive() {
                self.apply_command(command, now);
            }
        }
        self.timeliner.write_task(&mut self.scheduler, now);
        if let Some(result) = self.timeliner.read_task(now) {
            self.node.handle_result(&mut self.scheduler, &result, now);
        }
        self.node.task(&mut self.scheduler, now);
    }

    /// Drive the bus forever: tick at [`TICK_PERIOD`], waking early when a
    /// command arrives.
    pub async fn run<T: MapleTimer>(mut self, timer: &mut T) -> ! {
        loop {
            let now = timer.now();
            self.tick(now);
            match self.commands {
                Some(channel) => {
                    let received = {
                        let delay = timer.delay_us(TICK_PERIOD.as_micros());
                        let command = channel.receive();
                        pin_mut!(delay);
                        pin_mut!(command);
                        match select(delay, command).await {
                            Either::Left(((), _)) => None,
                            Either::Right((command, pending_delay)) => {
                                drop(pending_delay);
                                Some(command)
                            }
                        }
                    };
                    if let Some(command) = received {
                        let now = timer.now();
                        self.apply_command(command, now);
                    }
                }
                None => timer.delay_us(TICK_PERIOD.as_micros()).await,
            }
        }
    }

    fn apply_command(&mut self, command: HostCommand, now: Instant) {
        match command {
            HostCommand::Send {
                packet,
                expect_response,
                expected_response_words,
            } => {
                let mut request = TransmissionRequest::new(PRIORITY_EXTERNAL, now, packet);
                if expect_response {
                    request = request.with_response(expected_response_words);
                }
                if self.scheduler.add(request).is_err() {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("host command dropped, scheduler full");
                }
            }
            HostCommand::CancelRecipient(recipient) => {
                self.scheduler.cancel_by_recipient(recipient);
            }
        }
    }
}
