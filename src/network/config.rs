use crate::network::errors::NetworkError;
use crate::network::message::Destination;

/// Machines in the default network.
pub const DEFAULT_MACHINES: usize = 50;

/// Consecutive empty polls every machine must reach before the network counts
/// as idle.
pub const DEFAULT_IDLE_THRESHOLD: u32 = 100;

/// Address whose packets are held by the NAT instead of routed.
pub const NAT_ADDRESS: i64 = 255;

/// When a network run ends.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum StopCondition {
    /// The NAT delivers the same `y` to machine 0 twice in a row.
    #[default]
    IdleFixedPoint,
    /// The first packet reaches the NAT.
    FirstBroadcast,
}

/// Configuration options for a packet network.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkConfig {
    /// Number of machines, addressed `0..machines`.
    pub machines: usize,
    /// Empty polls per machine before the network is idle. Must exceed `machines`.
    pub idle_threshold: u32,
    /// Answer each machine's first input request with its own address.
    pub boot_with_address: bool,
    /// What ends the run.
    pub stop_at: StopCondition,
    /// Destination captured by the NAT.
    pub nat_address: i64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            machines: DEFAULT_MACHINES,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            boot_with_address: true,
            stop_at: StopCondition::IdleFixedPoint,
            nat_address: NAT_ADDRESS,
        }
    }
}

impl NetworkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_machines(mut self, machines: usize) -> Self {
        self.machines = machines;
        self
    }

    pub fn with_idle_threshold(mut self, threshold: u32) -> Self {
        self.idle_threshold = threshold;
        self
    }

    pub fn with_boot_address(mut self, enabled: bool) -> Self {
        self.boot_with_address = enabled;
        self
    }

    pub fn with_stop_at(mut self, stop_at: StopCondition) -> Self {
        self.stop_at = stop_at;
        self
    }

    pub fn with_nat_address(mut self, address: i64) -> Self {
        self.nat_address = address;
        self
    }

    /// Checks the invariants the router relies on.
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.machines == 0 {
            return Err(NetworkError::InvalidConfig(
                "at least one machine is required".into(),
            ));
        }
        if self.idle_threshold as usize <= self.machines {
            return Err(NetworkError::InvalidConfig(format!(
                "idle threshold {} must exceed the machine count {}",
                self.idle_threshold, self.machines
            )));
        }
        if usize::try_from(self.nat_address).is_ok_and(|nat| nat < self.machines) {
            return Err(NetworkError::InvalidConfig(format!(
                "NAT address {} collides with a machine address",
                self.nat_address
            )));
        }
        Ok(())
    }

    /// Classifies a destination address.
    pub fn destination(&self, to: i64) -> Option<Destination> {
        if to == self.nat_address {
            return Some(Destination::Nat);
        }
        usize::try_from(to)
            .ok()
            .filter(|&index| index < self.machines)
            .map(Destination::Machine)
    }
}
