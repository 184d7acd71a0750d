//! Peripheral actors.
//!
//! A peripheral is whatever drives an engine's ports: it feeds values to the
//! engine's input and consumes its output according to its own protocol. The
//! engine knows nothing about that protocol; it only sees blocking port
//! operations and closure.
//!
//! [`attach`] spawns an engine, drives it with a peripheral on the current task
//! and reports both outcomes together.
//!
//! # Modules
//!
//! - [`scripted`]: Fixed input list, collects every output
//! - [`ascii`]: Text in, text and non-ASCII values out
//! - [`interactive`]: Closure consulted at every input request

pub mod ascii;
pub mod interactive;
pub mod scripted;

use crate::virtual_machine::config::EngineConfig;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::port::{PeripheralPorts, PortError};
use crate::virtual_machine::program::Program;
use crate::virtual_machine::vm::{RunSummary, VM};
use crate::warn;
use thiserror::Error;

pub use ascii::{AsciiOutput, AsciiTerminal};
pub use interactive::Interactive;
pub use scripted::Scripted;

/// Errors raised by a peripheral while driving an engine.
#[derive(Debug, Error)]
pub enum PeripheralError {
    /// The engine terminated before the protocol was complete.
    #[error("engine terminated early: {0}")]
    EngineStopped(String),

    /// The engine produced something the protocol does not allow.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The peripheral needs input requests announced but the port has no ready signal.
    #[error("peripheral requires the ready signal")]
    MissingReadySignal,

    /// Output could not be split into whole records.
    #[error("{len} values do not form whole frames of {frame}")]
    PartialFrame { frame: usize, len: usize },

    #[error(transparent)]
    Port(#[from] PortError),
}

/// Failure of an attached engine/peripheral pair.
///
/// When both sides fail, the engine's error is reported: a peripheral failure
/// is usually just the consequence of the engine dying under it.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("engine failed: {0}")]
    Engine(#[from] VMError),

    #[error("peripheral failed: {0}")]
    Peripheral(#[from] PeripheralError),
}

/// Concurrent driver of one engine's port pair.
#[async_trait::async_trait]
pub trait Peripheral: Send + 'static {
    /// What the peripheral hands back once the protocol is finished.
    type Output: Send + 'static;

    /// Runs the protocol over `ports` until it completes or fails.
    ///
    /// Returning drops the ports, so an engine still waiting on them observes
    /// closure.
    async fn drive(self, ports: PeripheralPorts) -> Result<Self::Output, PeripheralError>;
}

/// Outcome of an [`attach`] session.
#[derive(Debug)]
pub struct Session<T> {
    /// What the peripheral returned.
    pub output: T,
    /// How the engine stopped.
    pub summary: RunSummary,
}

/// Spawns an engine for `program` and drives it with `peripheral`.
///
/// Once the peripheral returns, an engine that is still running is cancelled.
pub async fn attach<P: Peripheral>(
    program: &Program,
    config: EngineConfig,
    peripheral: P,
) -> Result<Session<P::Output>, SessionError> {
    let (handle, ports) = VM::launch(program, config);
    let driven = peripheral.drive(ports).await;
    handle.cancel();
    let label = handle.label().to_string();
    let engine = handle.join().await;
    settle(&label, engine, driven)
}

/// Drives an engine the caller owns, on the current task.
///
/// Unlike [`attach`], the engine is still available afterwards, so memory can
/// be patched before the session and inspected after it.
pub async fn drive<P: Peripheral>(
    vm: &mut VM,
    ports: PeripheralPorts,
    peripheral: P,
) -> Result<Session<P::Output>, SessionError> {
    let shutdown = vm.shutdown_signal();
    let peripheral_side = async move {
        let driven = peripheral.drive(ports).await;
        shutdown.trigger();
        driven
    };
    let (engine, driven) = tokio::join!(vm.run(), peripheral_side);
    settle(vm.label(), engine, driven)
}

/// Combines both outcomes; the engine's error wins.
fn settle<T>(
    label: &str,
    engine: Result<RunSummary, VMError>,
    driven: Result<T, PeripheralError>,
) -> Result<Session<T>, SessionError> {
    match (engine, driven) {
        (Err(err), driven) => {
            if let Err(peripheral_err) = driven {
                warn!("{label}: peripheral also failed: {peripheral_err}");
            }
            Err(SessionError::Engine(err))
        }
        (Ok(_), Err(err)) => Err(SessionError::Peripheral(err)),
        (Ok(summary), Ok(output)) => Ok(Session { output, summary }),
    }
}

/// Groups values into fixed-size records, e.g. `(x, y, tile)` display triples.
pub fn frames<const N: usize>(values: &[i64]) -> Result<Vec<[i64; N]>, PeripheralError> {
    if N == 0 || values.len() % N != 0 {
        return Err(PeripheralError::PartialFrame {
            frame: N,
            len: values.len(),
        });
    }
    Ok(values
        .chunks_exact(N)
        .map(|chunk| {
            let mut frame = [0; N];
            frame.copy_from_slice(chunk);
            frame
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::{program, within};
    use crate::virtual_machine::vm::Exit;

    #[test]
    fn frames_group_triples() {
        let frames = frames::<3>(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(frames, vec![[1, 2, 3], [4, 5, 6]]);
    }

    #[test]
    fn frames_reject_partial_records() {
        let err = frames::<3>(&[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, PeripheralError::PartialFrame { frame: 3, len: 4 }));
        assert!(frames::<0>(&[]).is_err());
    }

    #[tokio::test]
    async fn engine_error_takes_precedence() {
        // Outputs once, then hits opcode 42.
        let session = within(attach(
            &program("104,5,42"),
            EngineConfig::default(),
            Scripted::new([]),
        ))
        .await;
        assert!(matches!(
            session,
            Err(SessionError::Engine(VMError::UnknownOpcode { opcode: 42, offset: 2 }))
        ));
    }

    #[tokio::test]
    async fn peripheral_error_is_reported() {
        let session = within(attach(
            &program("3,0,99"),
            EngineConfig::default(),
            Interactive::new(|_: &[i64]| Some(1)),
        ))
        .await;
        assert!(matches!(
            session,
            Err(SessionError::Peripheral(PeripheralError::MissingReadySignal))
        ));
    }

    #[tokio::test]
    async fn drive_keeps_the_engine_for_inspection() {
        let (mut vm, ports) = VM::with_ports(&program("1,0,0,0,99"), EngineConfig::default());
        vm.memory_mut().write(1, 4);
        vm.memory_mut().write(2, 4);
        let session = within(drive(&mut vm, ports, Scripted::new([]))).await.unwrap();
        assert!(session.output.is_empty());
        assert_eq!(vm.memory().read(0), 198);
    }

    #[tokio::test]
    async fn drive_stops_the_engine_when_the_peripheral_fails() {
        let (mut vm, ports) = VM::with_ports(
            &program("104,1,104,2,104,3,99"),
            EngineConfig::default(),
        );
        let stop_early = Interactive::new(|_: &[i64]| None);
        let session = within(drive(&mut vm, ports, stop_early)).await;
        assert!(matches!(
            session,
            Err(SessionError::Peripheral(PeripheralError::MissingReadySignal))
        ));
        assert!(vm.is_halted());
    }

    #[tokio::test]
    async fn session_reports_summary() {
        let session = within(attach(
            &program("3,0,102,2,0,0,4,0,99"),
            EngineConfig::default(),
            Scripted::new([21]),
        ))
        .await
        .unwrap();
        assert_eq!(session.output, vec![42]);
        assert_eq!(session.summary.exit, Exit::Halted);
        assert_eq!(session.summary.instructions, 4);
    }
}
