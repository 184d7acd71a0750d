//! Amplifier ring: engines chained output to input.
//!
//! Engine `i` writes straight into the input channel of engine `i + 1`. Each
//! channel is preloaded with the receiving engine's phase setting, and the
//! first one also with the initial signal. The last engine writes into a tap
//! that records every value and, in feedback mode, passes it back to the first
//! engine until that engine stops reading.

use crate::network::errors::NetworkError;
use crate::virtual_machine::config::EngineConfig;
use crate::virtual_machine::port::{EnginePorts, ShutdownSignal};
use crate::virtual_machine::program::Program;
use crate::virtual_machine::vm::VM;
use crate::{debug, info};
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio::task::JoinSet;

/// Values queued on each link: a phase setting and one signal.
const LINK_CAPACITY: usize = 2;

/// A chain of engines running one program, each with its own phase setting.
#[derive(Clone, Debug)]
pub struct Ring {
    program: Program,
    phases: Vec<i64>,
    initial: i64,
    feedback: bool,
}

impl Ring {
    /// Creates a ring with one engine per phase setting.
    pub fn new(program: Program, phases: Vec<i64>) -> Self {
        Self {
            program,
            phases,
            initial: 0,
            feedback: false,
        }
    }

    /// Sets the signal fed to the first engine after its phase.
    pub fn with_initial(mut self, initial: i64) -> Self {
        self.initial = initial;
        self
    }

    /// Loops the last engine's output back into the first engine.
    pub fn with_feedback(mut self, feedback: bool) -> Self {
        self.feedback = feedback;
        self
    }

    /// Runs every engine to completion and returns the last value the final
    /// engine emitted.
    pub async fn run(self) -> Result<i64, NetworkError> {
        if self.phases.is_empty() {
            return Err(NetworkError::InvalidConfig(
                "a ring needs at least one phase setting".into(),
            ));
        }
        let count = self.phases.len();
        let shutdown = ShutdownSignal::new();

        let mut senders = Vec::with_capacity(count);
        let mut receivers = Vec::with_capacity(count);
        for phase in &self.phases {
            let (tx, rx) = channel(LINK_CAPACITY);
            preload(&tx, *phase)?;
            senders.push(tx);
            receivers.push(rx);
        }
        preload(&senders[0], self.initial)?;

        // Engine i feeds link i + 1; the last engine feeds the tap.
        let (tap_tx, tap_rx) = channel(LINK_CAPACITY);
        let mut outputs: Vec<Sender<i64>> = senders.drain(1..).collect();
        outputs.push(tap_tx);
        let feedback = senders.pop().filter(|_| self.feedback);

        let mut engines = JoinSet::new();
        for (index, (input, output)) in receivers.into_iter().zip(outputs).enumerate() {
            let config = EngineConfig::new().with_label(format!("amp-{index}"));
            let ports = EnginePorts::new(input, output);
            let mut vm = VM::new(&self.program, ports, config).with_shutdown(shutdown.clone());
            engines.spawn(async move { (index, vm.run().await) });
        }
        let tap_task = tokio::spawn(tap(tap_rx, feedback));

        let mut failure = None;
        while let Some(joined) = engines.join_next().await {
            match joined {
                Ok((index, Ok(summary))) => debug!("amp-{index} exited: {:?}", summary.exit),
                Ok((index, Err(source))) => {
                    shutdown.trigger();
                    failure.get_or_insert(NetworkError::MachineFailed { index, source });
                }
                Err(e) => {
                    shutdown.trigger();
                    failure.get_or_insert(NetworkError::TaskFailed(e.to_string()));
                }
            }
        }
        let last = tap_task
            .await
            .map_err(|e| NetworkError::TaskFailed(e.to_string()))?;
        if let Some(err) = failure {
            return Err(err);
        }

        let last = last.ok_or(NetworkError::NoOutput)?;
        info!("ring of {count} produced {last}");
        Ok(last)
    }
}

/// Queues a value on a freshly created link.
fn preload(link: &Sender<i64>, value: i64) -> Result<(), NetworkError> {
    link.try_send(value)
        .map_err(|e| NetworkError::TaskFailed(format!("cannot preload ring link: {e}")))
}

/// Drains the last engine's output, optionally feeding it back to the first.
///
/// Returns the last value seen.
async fn tap(mut rx: Receiver<i64>, mut feedback: Option<Sender<i64>>) -> Option<i64> {
    let mut last = None;
    while let Some(value) = rx.recv().await {
        last = Some(value);
        if let Some(tx) = feedback.as_ref() {
            if tx.send(value).await.is_err() {
                // The first engine halted; keep draining.
                feedback = None;
            }
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::{program, within};

    const SERIAL: &str = "3,15,3,16,1002,16,10,16,1,16,15,15,4,15,99,0,0";
    const SERIAL_LONGER: &str = "3,23,3,24,1002,24,10,24,1002,23,-1,23,101,5,23,23,1,24,23,23,4,23,99,0,0";
    const FEEDBACK: &str = "3,26,1001,26,-4,26,3,27,1002,27,2,27,1,27,26,27,4,27,1001,28,-1,28,1005,28,6,99,0,0,5";

    #[tokio::test]
    async fn serial_chain_builds_digits() {
        let ring = Ring::new(program(SERIAL), vec![4, 3, 2, 1, 0]);
        assert_eq!(within(ring.run()).await.unwrap(), 43210);

        let ring = Ring::new(program(SERIAL_LONGER), vec![0, 1, 2, 3, 4]);
        assert_eq!(within(ring.run()).await.unwrap(), 54321);
    }

    #[tokio::test]
    async fn feedback_loop_runs_until_halt() {
        let ring = Ring::new(program(FEEDBACK), vec![9, 8, 7, 6, 5]).with_feedback(true);
        assert_eq!(within(ring.run()).await.unwrap(), 139629729);
    }

    #[tokio::test]
    async fn initial_signal_reaches_the_first_engine() {
        // Adds its phase to the incoming signal.
        let adder = "3,20,3,21,1,20,21,20,4,20,99";
        let ring = Ring::new(program(adder), vec![1, 2, 3]).with_initial(100);
        assert_eq!(within(ring.run()).await.unwrap(), 106);
    }

    #[tokio::test]
    async fn empty_ring_is_rejected() {
        let err = Ring::new(program("99"), Vec::new()).run().await.unwrap_err();
        assert!(matches!(err, NetworkError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn silent_ring_has_no_output() {
        let err = within(Ring::new(program("3,0,3,0,99"), vec![0, 0]).run())
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::NoOutput));
    }

    #[tokio::test]
    async fn faulting_engine_is_reported() {
        let err = within(Ring::new(program("3,0,3,0,42"), vec![0]).run())
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::MachineFailed { index: 0, .. }));
    }
}
