//! Values exchanged between machines and the router.

use std::fmt;

/// Value an empty poll decodes to on the machine side.
pub const EMPTY_SENTINEL: i64 = -1;

/// Payload of one packet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Packet {
    pub x: i64,
    pub y: i64,
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A packet in transit: three consecutive outputs `to, x, y` of machine `from`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub from: usize,
    pub to: i64,
    pub packet: Packet,
}

impl Message {
    /// Builds a message from one machine's output triplet.
    pub fn from_triplet(from: usize, [to, x, y]: [i64; 3]) -> Self {
        Self {
            from,
            to,
            packet: Packet { x, y },
        }
    }
}

/// Where a message goes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Destination {
    Machine(usize),
    Nat,
}

/// Answer to one input request.
///
/// Only the port encodes "no packet" as [`EMPTY_SENTINEL`]; everywhere else the
/// three cases stay distinct.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Delivery {
    /// The machine's own address, answered to its very first request.
    Boot(usize),
    /// The oldest queued packet.
    Packet(Packet),
    /// Nothing queued.
    Empty,
}

impl Delivery {
    /// Values pushed to the machine's input port, in order.
    pub fn encode(&self) -> Vec<i64> {
        match self {
            Delivery::Boot(address) => vec![*address as i64],
            Delivery::Packet(packet) => vec![packet.x, packet.y],
            Delivery::Empty => vec![EMPTY_SENTINEL],
        }
    }

    /// Number of input requests this delivery answers.
    pub fn requests(&self) -> usize {
        match self {
            Delivery::Packet(_) => 2,
            Delivery::Boot(_) | Delivery::Empty => 1,
        }
    }
}

/// Event forwarded from a machine's ports to the router loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RouterEvent {
    /// A machine finished emitting one packet.
    Packet(Message),
    /// A machine is about to read its input.
    InputWanted(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliveries_encode_to_port_values() {
        assert_eq!(Delivery::Boot(7).encode(), vec![7]);
        assert_eq!(Delivery::Packet(Packet { x: 3, y: -4 }).encode(), vec![3, -4]);
        assert_eq!(Delivery::Empty.encode(), vec![-1]);
        assert_eq!(Delivery::Packet(Packet { x: 0, y: 0 }).requests(), 2);
        assert_eq!(Delivery::Empty.requests(), 1);
    }

    #[test]
    fn triplet_becomes_message() {
        let msg = Message::from_triplet(4, [255, 10, 20]);
        assert_eq!(msg.from, 4);
        assert_eq!(msg.to, 255);
        assert_eq!(msg.packet.to_string(), "(10, 20)");
    }
}
