//! Intcode library.
//!
//! Provides the Intcode virtual machine, the peripheral actor pattern used to drive
//! its ports, and the multi-machine packet network and amplifier ring built on top.

pub mod network;
pub mod peripheral;
pub mod utils;
pub mod virtual_machine;
