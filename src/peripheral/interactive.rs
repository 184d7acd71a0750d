use crate::peripheral::{Peripheral, PeripheralError};
use crate::virtual_machine::port::{PeripheralPorts, PortEvent};

/// Decides each input from what the engine has printed so far.
///
/// The closure runs every time the engine announces an input request and sees
/// the full output transcript. Returning `None` ends the session. This is the
/// shape of joystick, maze-walker and robot peripherals, and it needs the ready
/// signal so that requests can be told apart from plain output.
pub struct Interactive<F> {
    decide: F,
}

impl<F> Interactive<F>
where
    F: FnMut(&[i64]) -> Option<i64> + Send + 'static,
{
    pub fn new(decide: F) -> Self {
        Self { decide }
    }
}

#[async_trait::async_trait]
impl<F> Peripheral for Interactive<F>
where
    F: FnMut(&[i64]) -> Option<i64> + Send + 'static,
{
    type Output = Vec<i64>;

    async fn drive(mut self, mut ports: PeripheralPorts) -> Result<Vec<i64>, PeripheralError> {
        if !ports.output.has_ready_signal() {
            return Err(PeripheralError::MissingReadySignal);
        }
        let mut transcript = Vec::new();
        loop {
            match ports.next_event().await {
                PortEvent::Output(value) => transcript.push(value),
                PortEvent::InputWanted => match (self.decide)(&transcript) {
                    Some(value) => ports.send(value).await?,
                    None => return Ok(transcript),
                },
                PortEvent::Closed => return Ok(transcript),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::attach;
    use crate::utils::test_utils::utils::{program, within};
    use crate::virtual_machine::config::EngineConfig;
    use crate::virtual_machine::vm::Exit;

    fn with_ready() -> EngineConfig {
        EngineConfig::default().with_ready_signal(true)
    }

    #[tokio::test]
    async fn answers_each_request_from_the_transcript() {
        // Doubles every input until it reads zero.
        let doubler = "3,100,1006,100,14,1002,100,2,101,4,101,1105,1,0,99";
        let mut queue = vec![3, 2, 1];
        let session = within(attach(
            &program(doubler),
            with_ready(),
            Interactive::new(move |_: &[i64]| Some(queue.pop().unwrap_or(0))),
        ))
        .await
        .unwrap();
        assert_eq!(session.output, vec![2, 4, 6]);
        assert_eq!(session.summary.exit, Exit::Halted);
    }

    #[tokio::test]
    async fn closure_sees_prior_output() {
        // Prints 5, then echoes one input.
        let session = within(attach(
            &program("104,5,3,0,4,0,99"),
            with_ready(),
            Interactive::new(|seen: &[i64]| seen.last().map(|v| v * 10)),
        ))
        .await
        .unwrap();
        assert_eq!(session.output, vec![5, 50]);
    }

    #[tokio::test]
    async fn returning_none_stops_the_engine() {
        let session = within(attach(
            &program("3,100,1105,1,0"),
            with_ready(),
            Interactive::new(|_: &[i64]| None),
        ))
        .await
        .unwrap();
        assert!(session.output.is_empty());
        assert_ne!(session.summary.exit, Exit::Halted);
    }
}
