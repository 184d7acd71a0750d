//! Intcode engine.
//!
//! An engine executes one program over its own sparse memory and talks to the
//! outside world through a port pair: it reads values from its input port and
//! writes values to its output port, optionally announcing each input request
//! on a ready signal first.
//!
//! # Architecture
//!
//! - **Memory**: unbounded, sparse, zero-initialized beyond the program image
//! - **Instruction format**: opcode in the low two decimal digits, one mode digit
//!   per operand above it
//! - **Addressing**: position, immediate and relative (to the relative base)
//! - **Execution model**: synchronous between port operations, suspends only on
//!   `IN` and `OUT`, and every port wait races a shutdown signal
//! - **Arithmetic**: checked 64-bit; overflow stops the engine
//!
//! # Modules
//!
//! - [`config`]: Per-engine capabilities (ready signal, queue size, tracing)
//! - [`disassembler`]: Linear-sweep listing of a program
//! - [`errors`]: Engine fault types
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`memory`]: Sparse memory
//! - [`operand`]: Mode digit decoding
//! - [`port`]: Port pair, ready signal and shutdown signal
//! - [`program`]: Program text loading
//! - [`vm`]: Core engine implementation

pub mod config;
pub mod disassembler;
pub mod errors;
pub mod isa;
pub mod memory;
pub mod operand;
pub mod port;
pub mod program;
pub mod vm;
