use crate::virtual_machine::errors::VMError;
use thiserror::Error;

/// Errors that stop a network or an amplifier ring.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Configuration rejected before any engine started.
    #[error("invalid network configuration: {0}")]
    InvalidConfig(String),

    /// A machine addressed a packet outside the machine range and not to the NAT.
    #[error("machine {from} sent a packet to invalid address {to}")]
    InvalidAddress { from: usize, to: i64 },

    /// One engine faulted; the whole network is torn down.
    #[error("machine {index} failed: {source}")]
    MachineFailed {
        index: usize,
        #[source]
        source: VMError,
    },

    /// The network went idle before anything was sent to the NAT.
    #[error("network idle with no packet held by the NAT")]
    IdleWithoutBroadcast,

    /// Every engine stopped before the stop condition was met.
    #[error("all machines exited before an answer was produced")]
    AllMachinesExited,

    /// The final engine of a ring never produced a value.
    #[error("no output was produced")]
    NoOutput,

    /// A supporting task panicked or was aborted.
    #[error("task failed: {0}")]
    TaskFailed(String),
}
