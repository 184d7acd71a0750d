//! Port pair connecting an engine to whatever drives it.
//!
//! Each engine owns an [`EnginePorts`] and exactly one peripheral owns the
//! matching [`PeripheralPorts`]. Values travel over bounded FIFO channels; a
//! capacity of one approximates a rendezvous. The optional ready signal is sent
//! by the engine right before it waits on input, so a peripheral knows exactly
//! when the engine is about to stall. A peripheral that asks for the ready
//! signal must keep consuming it, otherwise the engine stalls on the signal.
//!
//! Closing is implicit: dropping a sender closes that direction for the reader.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};

/// Errors returned to a peripheral feeding an engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
    /// The engine stopped reading; the value was not delivered.
    #[error("port closed while sending {value}")]
    Closed { value: i64 },
    /// A non-blocking send found the queue full.
    #[error("port full while sending {value}")]
    Full { value: i64 },
}

/// Cloneable cancellation flag shared by an engine and whoever may stop it.
///
/// Every pending port wait inside the engine races against this signal, so a
/// triggered signal unblocks the engine even when its peer never closes.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
    notifier: Arc<Notify>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Idempotent.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::AcqRel) {
            self.notifier.notify_waiters();
        }
    }

    /// Returns `true` once [`trigger`](Self::trigger) has been called.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Completes once the signal is triggered.
    pub async fn triggered(&self) {
        loop {
            // Register before checking the flag so a concurrent trigger is not missed.
            let notified = self.notifier.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// Engine side of a port pair.
#[derive(Debug)]
pub struct EnginePorts {
    pub(crate) input: Receiver<i64>,
    pub(crate) output: Option<Sender<i64>>,
    pub(crate) ready: Option<Sender<()>>,
}

impl EnginePorts {
    /// Wraps existing channels, e.g. to chain engines output-to-input.
    pub fn new(input: Receiver<i64>, output: Sender<i64>) -> Self {
        Self {
            input,
            output: Some(output),
            ready: None,
        }
    }

    /// Adds a ready signal sender.
    pub fn with_ready(mut self, ready: Sender<()>) -> Self {
        self.ready = Some(ready);
        self
    }

    /// Returns `true` if the engine announces input requests.
    pub fn has_ready_signal(&self) -> bool {
        self.ready.is_some()
    }

    /// Returns `true` once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.output.is_none()
    }

    /// Closes the outbound port, then the ready signal, then stops accepting input.
    pub(crate) fn close(&mut self) {
        self.output.take();
        self.ready.take();
        self.input.close();
    }
}

/// Sending half held by a peripheral: values flow into the engine's input.
#[derive(Clone, Debug)]
pub struct InputPort {
    tx: Sender<i64>,
}

impl InputPort {
    /// Wraps a raw sender.
    pub fn new(tx: Sender<i64>) -> Self {
        Self { tx }
    }

    /// Sends a value, waiting for queue space.
    pub async fn send(&self, value: i64) -> Result<(), PortError> {
        self.tx
            .send(value)
            .await
            .map_err(|_| PortError::Closed { value })
    }

    /// Sends every value in order.
    pub async fn send_all<I>(&self, values: I) -> Result<(), PortError>
    where
        I: IntoIterator<Item = i64>,
    {
        for value in values {
            self.send(value).await?;
        }
        Ok(())
    }

    /// Sends without waiting.
    pub fn try_send(&self, value: i64) -> Result<(), PortError> {
        self.tx.try_send(value).map_err(|e| match e {
            TrySendError::Full(value) => PortError::Full { value },
            TrySendError::Closed(value) => PortError::Closed { value },
        })
    }

    /// Returns `true` once the engine stopped reading.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// What a peripheral observes next on the engine's outbound side.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PortEvent {
    /// The engine emitted a value.
    Output(i64),
    /// The engine is about to wait on input.
    InputWanted,
    /// The engine terminated and every emitted value has been read.
    Closed,
}

/// Receiving half held by a peripheral: engine output plus the ready signal.
#[derive(Debug)]
pub struct OutputPort {
    rx: Receiver<i64>,
    ready: Option<Receiver<()>>,
}

impl OutputPort {
    /// Wraps raw receivers.
    pub fn new(rx: Receiver<i64>, ready: Option<Receiver<()>>) -> Self {
        Self { rx, ready }
    }

    /// Receives the next output value, or `None` once the engine has terminated.
    pub async fn receive(&mut self) -> Option<i64> {
        self.rx.recv().await
    }

    /// Waits for the next ready signal.
    ///
    /// Returns `false` if there is no ready signal or the engine terminated.
    pub async fn ready(&mut self) -> bool {
        match self.ready.as_mut() {
            Some(ready) => ready.recv().await.is_some(),
            None => false,
        }
    }

    /// Returns `true` if this port carries a ready signal.
    pub fn has_ready_signal(&self) -> bool {
        self.ready.is_some()
    }

    /// Waits for whichever comes first: an output value or an input request.
    ///
    /// Pending output always wins, so a peripheral sees everything the engine
    /// emitted before the request that follows it.
    pub async fn next_event(&mut self) -> PortEvent {
        loop {
            let Some(ready) = self.ready.as_mut() else {
                return match self.rx.recv().await {
                    Some(value) => PortEvent::Output(value),
                    None => PortEvent::Closed,
                };
            };
            let event = tokio::select! {
                biased;
                value = self.rx.recv() => Some(match value {
                    Some(value) => PortEvent::Output(value),
                    None => PortEvent::Closed,
                }),
                signal = ready.recv() => signal.map(|()| PortEvent::InputWanted),
            };
            match event {
                Some(event) => return event,
                None => self.ready = None,
            }
        }
    }
}

/// Peripheral side of a port pair.
#[derive(Debug)]
pub struct PeripheralPorts {
    pub input: InputPort,
    pub output: OutputPort,
}

impl PeripheralPorts {
    /// Sends a value to the engine.
    pub async fn send(&self, value: i64) -> Result<(), PortError> {
        self.input.send(value).await
    }

    /// Receives the next engine output.
    pub async fn receive(&mut self) -> Option<i64> {
        self.output.receive().await
    }

    /// Waits for the next ready signal.
    pub async fn ready(&mut self) -> bool {
        self.output.ready().await
    }

    /// Waits for the next output value or input request.
    pub async fn next_event(&mut self) -> PortEvent {
        self.output.next_event().await
    }

    /// Splits into independently owned halves.
    pub fn split(self) -> (InputPort, OutputPort) {
        (self.input, self.output)
    }

    /// Drops the input half; the engine sees end-of-stream on its next read.
    pub fn close_input(self) -> OutputPort {
        self.output
    }
}

/// Creates a connected port pair.
///
/// `capacity` bounds both value queues (minimum one). The ready signal, when
/// requested, holds at most one pending notification.
pub fn port_pair(capacity: usize, ready_signal: bool) -> (EnginePorts, PeripheralPorts) {
    let capacity = capacity.max(1);
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let (ready_tx, ready_rx) = if ready_signal {
        let (tx, rx) = mpsc::channel(1);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let engine = EnginePorts {
        input: in_rx,
        output: Some(out_tx),
        ready: ready_tx,
    };
    let peripheral = PeripheralPorts {
        input: InputPort::new(in_tx),
        output: OutputPort::new(out_rx, ready_rx),
    };
    (engine, peripheral)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn values_are_fifo() {
        let (mut engine, peripheral) = port_pair(4, false);
        peripheral.send(1).await.unwrap();
        peripheral.send(2).await.unwrap();
        peripheral.send(3).await.unwrap();
        assert_eq!(engine.input.recv().await, Some(1));
        assert_eq!(engine.input.recv().await, Some(2));
        assert_eq!(engine.input.recv().await, Some(3));
    }

    #[tokio::test]
    async fn closing_engine_ports_ends_the_stream() {
        let (mut engine, mut peripheral) = port_pair(2, true);
        engine.output.as_ref().unwrap().send(7).await.unwrap();
        engine.close();
        assert!(engine.is_closed());

        assert_eq!(peripheral.receive().await, Some(7));
        assert_eq!(peripheral.receive().await, None);
        assert!(!peripheral.ready().await);
        assert_eq!(
            peripheral.send(5).await,
            Err(PortError::Closed { value: 5 })
        );
    }

    #[tokio::test]
    async fn next_event_prefers_pending_output() {
        let (engine, mut peripheral) = port_pair(2, true);
        engine.output.as_ref().unwrap().send(11).await.unwrap();
        engine.ready.as_ref().unwrap().send(()).await.unwrap();

        assert_eq!(peripheral.next_event().await, PortEvent::Output(11));
        assert_eq!(peripheral.next_event().await, PortEvent::InputWanted);
    }

    #[tokio::test]
    async fn next_event_without_ready_signal_reports_closure() {
        let (mut engine, mut peripheral) = port_pair(1, false);
        engine.close();
        assert_eq!(peripheral.next_event().await, PortEvent::Closed);
    }

    #[tokio::test]
    async fn try_send_reports_full_queue() {
        let (_engine, peripheral) = port_pair(1, false);
        peripheral.input.try_send(1).unwrap();
        assert_eq!(
            peripheral.input.try_send(2),
            Err(PortError::Full { value: 2 })
        );
    }

    #[tokio::test]
    async fn shutdown_signal_wakes_waiters() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.triggered().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn shutdown_signal_triggered_before_wait_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(100), signal.triggered())
            .await
            .expect("already triggered signal must not block");
    }
}
