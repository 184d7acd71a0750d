//! Core engine implementation.
//!
//! The engine is a fetch-decode-execute loop over sparse memory. It suspends
//! only on `IN` and `OUT`, where it waits on its ports; every other instruction
//! runs to completion without yielding. All arithmetic is checked 64-bit.

use crate::virtual_machine::config::EngineConfig;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Opcode;
use crate::virtual_machine::memory::Memory;
use crate::virtual_machine::operand::{Mode, Modes, decode_instruction};
use crate::virtual_machine::port::{EnginePorts, PeripheralPorts, ShutdownSignal, port_pair};
use crate::virtual_machine::program::Program;
use crate::{debug, error};
use tokio::task::JoinHandle;


/// Why an engine stopped without a fault.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Exit {
    /// Executed `HALT`.
    Halted,
    /// Input port reached end-of-stream while the engine waited on `IN`.
    InputClosed,
    /// The shutdown signal fired while the engine waited on a port.
    Cancelled,
}

/// Outcome of a completed run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RunSummary {
    /// How the run ended.
    pub exit: Exit,
    /// Instructions decoded, including the final one.
    pub instructions: u64,
}

/// Result of executing one instruction.
enum Flow {
    Continue,
    Stop(Exit),
}

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        opcode = $opcode:ident,
        modes = $modes:ident,
        sync { $( $variant:ident => $handler:ident ( $( $field:ident : $kind:ident ),* ) ),* $(,)? }
        async { $( $avariant:ident => $ahandler:ident ( $( $afield:ident : $akind:ident ),* ) ),* $(,)? }
    ) => {{
        match $opcode {
            $(
                Opcode::$variant => {
                    $( let $field = exec_vm!(@operand $vm, $modes, $kind)?; )*
                    $vm.$handler($( $field ),*)
                }
            )*
            $(
                Opcode::$avariant => {
                    $( let $afield = exec_vm!(@operand $vm, $modes, $akind)?; )*
                    $vm.$ahandler($( $afield ),*).await
                }
            )*
        }
    }};

    // Resolve an operand to its value
    (@operand $vm:ident, $modes:ident, Read) => {
        $vm.read_operand(&mut $modes)
    };

    // Resolve an operand to the address it names
    (@operand $vm:ident, $modes:ident, Write) => {
        $vm.write_target(&mut $modes)
    };
}

/// Intcode engine.
///
/// Owns its memory and the engine side of one port pair. Memory may be patched
/// before [`run`](Self::run) and inspected after it returns.
pub struct VM {
    /// Program image plus everything written since.
    memory: Memory,
    /// Address of the next cell to fetch.
    ip: usize,
    /// Base added to relative-mode operands.
    relative_base: i64,
    /// Terminal once set, whatever the reason.
    halted: bool,
    /// How the last run ended, fault included.
    outcome: Option<Result<Exit, VMError>>,
    /// Address of the instruction currently executing.
    instr_offset: usize,
    /// Mnemonic of the instruction currently executing.
    instr_name: &'static str,
    /// Instructions decoded so far.
    instructions: u64,
    ports: EnginePorts,
    shutdown: ShutdownSignal,
    config: EngineConfig,
}

impl VM {
    /// Creates an engine with `program` loaded at address zero.
    pub fn new(program: &Program, ports: EnginePorts, config: EngineConfig) -> Self {
        Self {
            memory: Memory::new(program.cells().to_vec()),
            ip: 0,
            relative_base: 0,
            halted: false,
            outcome: None,
            instr_offset: 0,
            instr_name: "",
            instructions: 0,
            ports,
            shutdown: ShutdownSignal::new(),
            config,
        }
    }

    /// Creates an engine together with a fresh port pair sized by `config`.
    pub fn with_ports(program: &Program, config: EngineConfig) -> (Self, PeripheralPorts) {
        let (engine_ports, peripheral_ports) = port_pair(config.port_capacity, config.ready_signal);
        (Self::new(program, engine_ports, config), peripheral_ports)
    }

    /// Replaces the shutdown signal, e.g. to share one signal across many engines.
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Returns a handle that cancels this engine's pending port waits.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn instruction_pointer(&self) -> usize {
        self.ip
    }

    pub fn relative_base(&self) -> i64 {
        self.relative_base
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Runs until `HALT`, end of input, cancellation, or a fault.
    ///
    /// Whatever the outcome, both ports are closed on return so a peripheral
    /// waiting on them observes end-of-stream. Calling `run` again after that
    /// returns the earlier outcome, fault included, without executing anything.
    pub async fn run(&mut self) -> Result<RunSummary, VMError> {
        if let Some(outcome) = self.outcome.clone() {
            return outcome.map(|exit| self.summary(exit));
        }
        debug!("{}: started", self.config.label);

        let result = self.run_loop().await;
        self.halted = true;
        self.ports.close();
        self.outcome = Some(result.clone());

        match result {
            Ok(exit) => {
                debug!(
                    "{}: stopped ({:?}) after {} instructions",
                    self.config.label, exit, self.instructions
                );
                Ok(self.summary(exit))
            }
            Err(err) => {
                error!("{}: {}", self.config.label, err);
                Err(err)
            }
        }
    }

    /// Moves the engine onto its own task.
    pub fn spawn(mut self) -> EngineHandle {
        let shutdown = self.shutdown.clone();
        let label = self.config.label.clone();
        let join = tokio::spawn(async move { self.run().await });
        EngineHandle {
            join,
            shutdown,
            label,
        }
    }

    /// Creates an engine with its own port pair and spawns it.
    pub fn launch(program: &Program, config: EngineConfig) -> (EngineHandle, PeripheralPorts) {
        let (vm, ports) = Self::with_ports(program, config);
        (vm.spawn(), ports)
    }

    fn summary(&self, exit: Exit) -> RunSummary {
        RunSummary {
            exit,
            instructions: self.instructions,
        }
    }

    async fn run_loop(&mut self) -> Result<Exit, VMError> {
        loop {
            if let Flow::Stop(exit) = self.step().await? {
                return Ok(exit);
            }
        }
    }

    /// Fetches, decodes and executes one instruction.
    async fn step(&mut self) -> Result<Flow, VMError> {
        self.instr_offset = self.ip;
        let word = self.fetch();
        let (opcode, modes) =
            decode_instruction(word).map_err(|err| err.at(self.instr_offset))?;
        self.instr_name = opcode.mnemonic();
        self.instructions += 1;
        if self.config.trace {
            debug!(
                "{}: {:>6}  {:<4} word={} rb={}",
                self.config.label, self.instr_offset, opcode, word, self.relative_base
            );
        }
        self.exec(opcode, modes).await
    }

    /// Executes a single decoded instruction.
    async fn exec(&mut self, opcode: Opcode, mut modes: Modes) -> Result<Flow, VMError> {
        exec_vm! {
            vm = self,
            opcode = opcode,
            modes = modes,
            sync {
                Add => op_add(a: Read, b: Read, dst: Write),
                Mul => op_mul(a: Read, b: Read, dst: Write),
                Jnz => op_jnz(a: Read, target: Read),
                Jz => op_jz(a: Read, target: Read),
                Lt => op_lt(a: Read, b: Read, dst: Write),
                Eq => op_eq(a: Read, b: Read, dst: Write),
                Arb => op_arb(a: Read),
                Halt => op_halt(),
            }
            async {
                In => op_in(dst: Write),
                Out => op_out(a: Read),
            }
        }
    }

    /// Reads the cell at the instruction pointer and advances it.
    #[inline]
    fn fetch(&mut self) -> i64 {
        let value = self.memory.read(self.ip);
        self.ip += 1;
        value
    }

    fn next_mode(&self, modes: &mut Modes) -> Result<Mode, VMError> {
        modes.next_mode().map_err(|mode| VMError::InvalidMode {
            instruction: self.instr_name,
            mode,
            offset: self.instr_offset,
        })
    }

    /// Converts a signed value into a memory address.
    fn address(&self, value: i64) -> Result<usize, VMError> {
        usize::try_from(value).map_err(|_| VMError::NegativeAddress {
            instruction: self.instr_name,
            address: value,
            offset: self.instr_offset,
        })
    }

    fn relative(&self, offset: i64) -> Result<i64, VMError> {
        self.relative_base
            .checked_add(offset)
            .ok_or_else(|| self.overflow())
    }

    fn overflow(&self) -> VMError {
        VMError::Overflow {
            instruction: self.instr_name,
            offset: self.instr_offset,
        }
    }

    /// Resolves the next operand to a value.
    fn read_operand(&mut self, modes: &mut Modes) -> Result<i64, VMError> {
        let mode = self.next_mode(modes)?;
        let raw = self.fetch();
        match mode {
            Mode::Position => Ok(self.memory.read(self.address(raw)?)),
            Mode::Immediate => Ok(raw),
            Mode::Relative => Ok(self.memory.read(self.address(self.relative(raw)?)?)),
        }
    }

    /// Resolves the next operand to the address it writes.
    fn write_target(&mut self, modes: &mut Modes) -> Result<usize, VMError> {
        let mode = self.next_mode(modes)?;
        let raw = self.fetch();
        match mode {
            Mode::Position => self.address(raw),
            Mode::Immediate => Err(VMError::ImmediateWrite {
                instruction: self.instr_name,
                offset: self.instr_offset,
            }),
            Mode::Relative => self.address(self.relative(raw)?),
        }
    }

    // ==================== Arithmetic / comparison ====================

    fn op_add(&mut self, a: i64, b: i64, dst: usize) -> Result<Flow, VMError> {
        let value = a.checked_add(b).ok_or_else(|| self.overflow())?;
        self.memory.write(dst, value);
        Ok(Flow::Continue)
    }

    fn op_mul(&mut self, a: i64, b: i64, dst: usize) -> Result<Flow, VMError> {
        let value = a.checked_mul(b).ok_or_else(|| self.overflow())?;
        self.memory.write(dst, value);
        Ok(Flow::Continue)
    }

    fn op_lt(&mut self, a: i64, b: i64, dst: usize) -> Result<Flow, VMError> {
        self.memory.write(dst, i64::from(a < b));
        Ok(Flow::Continue)
    }

    fn op_eq(&mut self, a: i64, b: i64, dst: usize) -> Result<Flow, VMError> {
        self.memory.write(dst, i64::from(a == b));
        Ok(Flow::Continue)
    }

    // ==================== Control flow ====================

    fn op_jnz(&mut self, a: i64, target: i64) -> Result<Flow, VMError> {
        if a != 0 {
            self.ip = self.address(target)?;
        }
        Ok(Flow::Continue)
    }

    fn op_jz(&mut self, a: i64, target: i64) -> Result<Flow, VMError> {
        if a == 0 {
            self.ip = self.address(target)?;
        }
        Ok(Flow::Continue)
    }

    fn op_arb(&mut self, a: i64) -> Result<Flow, VMError> {
        self.relative_base = self.relative(a)?;
        Ok(Flow::Continue)
    }

    fn op_halt(&mut self) -> Result<Flow, VMError> {
        Ok(Flow::Stop(Exit::Halted))
    }

    // ==================== Ports ====================

    async fn op_in(&mut self, dst: usize) -> Result<Flow, VMError> {
        if let Some(ready) = self.ports.ready.as_ref() {
            let announced = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => None,
                sent = ready.send(()) => Some(sent.is_ok()),
            };
            match announced {
                None => return Ok(Flow::Stop(Exit::Cancelled)),
                Some(true) => {}
                Some(false) => {
                    debug!("{}: ready signal dropped by peripheral", self.config.label);
                    self.ports.ready = None;
                }
            }
        }

        let received = tokio::select! {
            biased;
            _ = self.shutdown.triggered() => return Ok(Flow::Stop(Exit::Cancelled)),
            value = self.ports.input.recv() => value,
        };
        match received {
            Some(value) => {
                self.memory.write(dst, value);
                Ok(Flow::Continue)
            }
            None => Ok(Flow::Stop(Exit::InputClosed)),
        }
    }

    async fn op_out(&mut self, a: i64) -> Result<Flow, VMError> {
        let Some(output) = self.ports.output.as_ref() else {
            return Err(VMError::OutputClosed {
                value: a,
                offset: self.instr_offset,
            });
        };
        let sent = tokio::select! {
            biased;
            _ = self.shutdown.triggered() => None,
            sent = output.send(a) => Some(sent.is_ok()),
        };
        match sent {
            None => Ok(Flow::Stop(Exit::Cancelled)),
            Some(true) => Ok(Flow::Continue),
            Some(false) => Err(VMError::OutputClosed {
                value: a,
                offset: self.instr_offset,
            }),
        }
    }
}

/// Handle to an engine running on its own task.
#[derive(Debug)]
pub struct EngineHandle {
    join: JoinHandle<Result<RunSummary, VMError>>,
    shutdown: ShutdownSignal,
    label: String,
}

impl EngineHandle {
    /// Unblocks any pending port wait; the engine stops with [`Exit::Cancelled`].
    pub fn cancel(&self) {
        self.shutdown.trigger();
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the engine task to finish.
    pub async fn join(self) -> Result<RunSummary, VMError> {
        self.join
            .await
            .map_err(|e| VMError::TaskFailed(format!("{}: {e}", self.label)))?
    }
}
