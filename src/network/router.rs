//! Packet router state machine.
//!
//! The router owns every per-machine queue and never touches a port. The event
//! loop in [`server`](super::server) feeds it one event at a time and carries
//! out the action it returns, so all routing decisions are serialized here.
//!
//! Input requests are answered with a [`Delivery`]: a packet takes two input
//! reads, a boot address or an empty poll one. The router tracks how many
//! pushed values are still unclaimed per machine (its credit) and only pushes
//! again once every earlier value has a matching request, which keeps each
//! machine's input queue at two values or fewer.

use crate::network::config::{NetworkConfig, StopCondition};
use crate::network::errors::NetworkError;
use crate::network::message::{Delivery, Destination, Message, Packet};
use crate::{debug, info, warn};
use std::collections::VecDeque;

/// Routing state of one machine.
#[derive(Debug, Default)]
struct Nic {
    /// Packets waiting for the machine to ask for input.
    queue: VecDeque<Packet>,
    /// Values already pushed to the machine that no request has claimed yet.
    credit: usize,
    /// Consecutive requests answered with [`Delivery::Empty`].
    idle_polls: u32,
    booted: bool,
    exited: bool,
}

/// What the event loop must do after an event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RouterAction {
    /// Push the encoded delivery to the machine's input port.
    Deliver { machine: usize, delivery: Delivery },
    /// Nothing to do.
    Wait,
    /// Stop every machine and report `answer`.
    Done { answer: i64 },
}

/// Final result of a network run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NetworkOutcome {
    /// Value selected by the stop condition.
    pub answer: i64,
    /// `y` of the first packet sent to the NAT.
    pub first_broadcast: Option<i64>,
    /// Packets the NAT handed to machine 0.
    pub nat_deliveries: u64,
}

/// Serialized decision maker for a packet network.
#[derive(Debug)]
pub struct Router {
    config: NetworkConfig,
    nics: Vec<Nic>,
    /// Last packet captured by the NAT.
    nat: Option<Packet>,
    /// `y` of the previous NAT delivery.
    last_nat_y: Option<i64>,
    first_broadcast: Option<i64>,
    nat_deliveries: u64,
}

impl Router {
    /// Creates a router for `config.machines` machines.
    pub fn new(config: NetworkConfig) -> Self {
        let nics = (0..config.machines).map(|_| Nic::default()).collect();
        Self {
            config,
            nics,
            nat: None,
            last_nat_y: None,
            first_broadcast: None,
            nat_deliveries: 0,
        }
    }

    /// Routes one packet.
    ///
    /// Sending counts as activity, so the sender's idle streak restarts.
    pub fn on_packet(&mut self, msg: Message) -> Result<RouterAction, NetworkError> {
        if let Some(sender) = self.nics.get_mut(msg.from) {
            sender.idle_polls = 0;
        }

        match self.config.destination(msg.to) {
            Some(Destination::Machine(index)) => {
                debug!("nic-{} -> nic-{}: {}", msg.from, index, msg.packet);
                self.nics[index].queue.push_back(msg.packet);
                Ok(RouterAction::Wait)
            }
            Some(Destination::Nat) => {
                debug!("nic-{} -> NAT: {}", msg.from, msg.packet);
                self.nat = Some(msg.packet);
                if self.first_broadcast.is_none() {
                    info!("first packet to the NAT: {}", msg.packet);
                    self.first_broadcast = Some(msg.packet.y);
                }
                match self.config.stop_at {
                    StopCondition::FirstBroadcast => Ok(RouterAction::Done {
                        answer: msg.packet.y,
                    }),
                    StopCondition::IdleFixedPoint => Ok(RouterAction::Wait),
                }
            }
            None => Err(NetworkError::InvalidAddress {
                from: msg.from,
                to: msg.to,
            }),
        }
    }

    /// Answers one input request.
    pub fn on_input_request(&mut self, machine: usize) -> RouterAction {
        let boot = self.config.boot_with_address;
        let Some(nic) = self.nics.get_mut(machine) else {
            warn!("input request from unknown machine {machine}");
            return RouterAction::Wait;
        };
        if nic.credit > 0 {
            nic.credit -= 1;
            return RouterAction::Wait;
        }

        let delivery = if boot && !nic.booted {
            nic.booted = true;
            Delivery::Boot(machine)
        } else if let Some(packet) = nic.queue.pop_front() {
            nic.idle_polls = 0;
            Delivery::Packet(packet)
        } else {
            nic.idle_polls = nic.idle_polls.saturating_add(1);
            Delivery::Empty
        };
        nic.credit = delivery.requests() - 1;
        RouterAction::Deliver { machine, delivery }
    }

    /// Releases the NAT packet to machine 0 if the network is idle.
    ///
    /// Ends the run when the held `y` equals the previous release.
    pub fn on_idle_check(&mut self) -> Result<RouterAction, NetworkError> {
        if !self.is_idle() {
            return Ok(RouterAction::Wait);
        }
        let Some(packet) = self.nat else {
            return Err(NetworkError::IdleWithoutBroadcast);
        };
        if self.last_nat_y == Some(packet.y) {
            info!("NAT repeated y={} after {} deliveries", packet.y, self.nat_deliveries);
            return Ok(RouterAction::Done { answer: packet.y });
        }

        info!("network idle, NAT delivers {} to nic-0", packet);
        self.last_nat_y = Some(packet.y);
        self.nat_deliveries += 1;
        self.nics[0].queue.push_back(packet);
        for nic in &mut self.nics {
            nic.idle_polls = 0;
        }
        Ok(RouterAction::Wait)
    }

    /// Records that a machine's engine stopped.
    pub fn on_exit(&mut self, machine: usize) -> Result<RouterAction, NetworkError> {
        if let Some(nic) = self.nics.get_mut(machine) {
            nic.exited = true;
            if !nic.queue.is_empty() {
                warn!(
                    "nic-{machine} exited with {} undelivered packets",
                    nic.queue.len()
                );
            }
        }
        if self.nics.iter().all(|nic| nic.exited) {
            return Err(NetworkError::AllMachinesExited);
        }
        Ok(RouterAction::Wait)
    }

    /// Returns `true` when every running machine has polled an empty queue at
    /// least `idle_threshold` times in a row and nothing is in flight.
    pub fn is_idle(&self) -> bool {
        let threshold = self.config.idle_threshold;
        let mut running = self.nics.iter().filter(|nic| !nic.exited).peekable();
        running.peek().is_some()
            && running.all(|nic| {
                nic.queue.is_empty() && nic.credit == 0 && nic.idle_polls >= threshold
            })
    }

    pub fn queued(&self, machine: usize) -> usize {
        self.nics.get(machine).map_or(0, |nic| nic.queue.len())
    }

    pub fn idle_polls(&self, machine: usize) -> u32 {
        self.nics.get(machine).map_or(0, |nic| nic.idle_polls)
    }

    pub fn nat(&self) -> Option<Packet> {
        self.nat
    }

    pub fn first_broadcast(&self) -> Option<i64> {
        self.first_broadcast
    }

    pub fn nat_deliveries(&self) -> u64 {
        self.nat_deliveries
    }

    pub fn outcome(&self, answer: i64) -> NetworkOutcome {
        NetworkOutcome {
            answer,
            first_broadcast: self.first_broadcast,
            nat_deliveries: self.nat_deliveries,
        }
    }
}
