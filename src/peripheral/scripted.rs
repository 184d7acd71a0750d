use crate::peripheral::{Peripheral, PeripheralError};
use crate::virtual_machine::port::{PeripheralPorts, PortEvent};
use std::collections::VecDeque;

/// Feeds a fixed list of inputs and collects every output.
///
/// Inputs are offered while outputs are drained, so an engine that emits before
/// it has consumed everything never stalls on a full port. Once the list is
/// exhausted the input port is dropped; an engine asking for more sees
/// end-of-stream.
#[derive(Clone, Debug, Default)]
pub struct Scripted {
    inputs: VecDeque<i64>,
}

impl Scripted {
    pub fn new(inputs: impl IntoIterator<Item = i64>) -> Self {
        Self {
            inputs: inputs.into_iter().collect(),
        }
    }

    /// Appends more inputs.
    pub fn then(mut self, inputs: impl IntoIterator<Item = i64>) -> Self {
        self.inputs.extend(inputs);
        self
    }
}

#[async_trait::async_trait]
impl Peripheral for Scripted {
    type Output = Vec<i64>;

    async fn drive(mut self, ports: PeripheralPorts) -> Result<Vec<i64>, PeripheralError> {
        let (input, mut output) = ports.split();
        let mut input = Some(input);
        let mut emitted = Vec::new();

        loop {
            let event = match (self.inputs.front().copied(), input.as_ref()) {
                (Some(value), Some(port)) => tokio::select! {
                    biased;
                    event = output.next_event() => event,
                    sent = port.send(value) => {
                        sent?;
                        self.inputs.pop_front();
                        continue;
                    }
                },
                _ => {
                    input = None;
                    output.next_event().await
                }
            };
            match event {
                PortEvent::Output(value) => emitted.push(value),
                PortEvent::InputWanted => {}
                PortEvent::Closed => return Ok(emitted),
            }
        }
    }
}
