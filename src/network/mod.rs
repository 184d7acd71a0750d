//! Multi-engine compositions.
//!
//! - [`config`]: Network configuration and stop conditions
//! - [`errors`]: Network and ring error types
//! - [`message`]: Packets, deliveries and router events
//! - [`router`]: Routing state machine with idle and NAT handling
//! - [`server`]: Router event loop owning every machine of a packet network
//! - [`ring`]: Amplifier ring, engines chained output to input

pub mod config;
pub mod errors;
pub mod message;
pub mod ring;
pub mod router;
pub mod server;
