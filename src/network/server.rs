//! Packet network orchestrating many engines through one router loop.
//!
//! Each machine runs on its own task, with a forwarding task beside it that
//! turns the machine's output into packets and its ready signal into input
//! requests. All forwarders feed one channel, so the router loop handles a
//! single serialized event stream whatever the machine count.

use crate::network::config::NetworkConfig;
use crate::network::errors::NetworkError;
use crate::network::message::{Message, RouterEvent};
use crate::network::router::{NetworkOutcome, Router, RouterAction};
use crate::virtual_machine::config::EngineConfig;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::port::{InputPort, OutputPort, PortError, PortEvent, ShutdownSignal};
use crate::virtual_machine::program::Program;
use crate::virtual_machine::vm::{RunSummary, VM};
use crate::{debug, info, warn};
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio::task::{JoinError, JoinSet};

/// Capacity of the shared event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Input queue size per machine. Holds one whole packet.
const NIC_PORT_CAPACITY: usize = 2;

type EngineResult = (usize, Result<RunSummary, VMError>);

/// Whatever woke the router loop.
enum Step {
    Event(Option<RouterEvent>),
    Joined(Result<EngineResult, JoinError>),
}

/// N engines exchanging packets through a central router.
///
/// Machines are only reachable through the router; the caller sees the final
/// [`NetworkOutcome`] and nothing else.
pub struct Network {
    config: NetworkConfig,
    programs: Vec<Program>,
}

impl Network {
    /// Creates a network where every machine runs `program`.
    pub fn new(program: Program, config: NetworkConfig) -> Result<Self, NetworkError> {
        config.validate()?;
        let programs = vec![program; config.machines];
        Ok(Self { config, programs })
    }

    /// Creates a network with one program per machine, in address order.
    pub fn with_programs(
        programs: Vec<Program>,
        config: NetworkConfig,
    ) -> Result<Self, NetworkError> {
        config.validate()?;
        if programs.len() != config.machines {
            return Err(NetworkError::InvalidConfig(format!(
                "{} programs given for {} machines",
                programs.len(),
                config.machines
            )));
        }
        Ok(Self { config, programs })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Starts every machine and routes packets until the stop condition holds.
    ///
    /// Whatever the outcome, all machines are cancelled and joined before this
    /// returns.
    pub async fn run(self) -> Result<NetworkOutcome, NetworkError> {
        let shutdown = ShutdownSignal::new();
        let (sx, mut rx) = channel::<RouterEvent>(EVENT_CHANNEL_CAPACITY);
        let mut engines = JoinSet::new();
        let mut nics = JoinSet::new();
        let mut inputs = Vec::with_capacity(self.programs.len());

        for (index, program) in self.programs.iter().enumerate() {
            let engine_config = EngineConfig::new()
                .with_label(format!("nic-{index}"))
                .with_ready_signal(true)
                .with_port_capacity(NIC_PORT_CAPACITY);
            let (vm, ports) = VM::with_ports(program, engine_config);
            let mut vm = vm.with_shutdown(shutdown.clone());
            engines.spawn(async move { (index, vm.run().await) });

            let (input, output) = ports.split();
            inputs.push(input);
            nics.spawn(forward_nic(index, output, sx.clone()));
        }
        // Only forwarders hold senders now; a closed channel means all of them stopped.
        drop(sx);
        info!("network started with {} machines", self.config.machines);

        let mut router = Router::new(self.config);
        let result = route(&mut router, &mut rx, &mut engines, &inputs).await;

        shutdown.trigger();
        drop(rx);
        while engines.join_next().await.is_some() {}
        nics.shutdown().await;

        let answer = result?;
        let outcome = router.outcome(answer);
        info!(
            "network stopped: answer={} first_broadcast={:?} nat_deliveries={}",
            outcome.answer, outcome.first_broadcast, outcome.nat_deliveries
        );
        Ok(outcome)
    }
}

/// Router loop. Returns the answer once the router reports one.
async fn route(
    router: &mut Router,
    events: &mut Receiver<RouterEvent>,
    engines: &mut JoinSet<EngineResult>,
    inputs: &[InputPort],
) -> Result<i64, NetworkError> {
    loop {
        let step = tokio::select! {
            event = events.recv() => Step::Event(event),
            Some(joined) = engines.join_next() => Step::Joined(joined),
        };
        let action = match step {
            Step::Event(Some(RouterEvent::Packet(msg))) => router.on_packet(msg)?,
            Step::Event(Some(RouterEvent::InputWanted(machine))) => {
                execute(router.on_input_request(machine), inputs);
                router.on_idle_check()?
            }
            Step::Event(None) => return Err(first_failure(engines).await),
            Step::Joined(joined) => on_engine_exit(router, joined)?,
        };
        if let Some(answer) = execute(action, inputs) {
            return Ok(answer);
        }
    }
}

/// Carries out a router action. Returns the answer for [`RouterAction::Done`].
fn execute(action: RouterAction, inputs: &[InputPort]) -> Option<i64> {
    match action {
        RouterAction::Deliver { machine, delivery } => {
            let Some(input) = inputs.get(machine) else {
                return None;
            };
            for value in delivery.encode() {
                match input.try_send(value) {
                    Ok(()) => {}
                    Err(PortError::Closed { .. }) => {
                        debug!("nic-{machine} stopped before {delivery:?} was delivered");
                        break;
                    }
                    Err(err @ PortError::Full { .. }) => {
                        warn!("nic-{machine}: {err}");
                        break;
                    }
                }
            }
            None
        }
        RouterAction::Wait => None,
        RouterAction::Done { answer } => Some(answer),
    }
}

fn on_engine_exit(
    router: &mut Router,
    joined: Result<EngineResult, JoinError>,
) -> Result<RouterAction, NetworkError> {
    match joined {
        Ok((index, Ok(summary))) => {
            debug!("nic-{index} exited: {:?}", summary.exit);
            router.on_exit(index)
        }
        Ok((index, Err(source))) => Err(NetworkError::MachineFailed { index, source }),
        Err(e) => Err(NetworkError::TaskFailed(e.to_string())),
    }
}

/// Waits for every remaining engine and reports the first failure, if any.
async fn first_failure(engines: &mut JoinSet<EngineResult>) -> NetworkError {
    let mut failure = None;
    while let Some(joined) = engines.join_next().await {
        let err = match joined {
            Ok((_, Ok(_))) => continue,
            Ok((index, Err(source))) => NetworkError::MachineFailed { index, source },
            Err(e) => NetworkError::TaskFailed(e.to_string()),
        };
        failure.get_or_insert(err);
    }
    failure.unwrap_or(NetworkError::AllMachinesExited)
}

/// Forwards one machine's port activity to the router loop.
///
/// Three consecutive outputs form one packet. Output always drains before the
/// input request that follows it, so the router sees a machine's packets in
/// the order it sent them relative to its requests.
async fn forward_nic(index: usize, mut output: OutputPort, events: Sender<RouterEvent>) {
    let mut triplet = [0i64; 3];
    let mut filled = 0;
    loop {
        let event = match output.next_event().await {
            PortEvent::Output(value) => {
                triplet[filled] = value;
                filled += 1;
                if filled < triplet.len() {
                    continue;
                }
                filled = 0;
                RouterEvent::Packet(Message::from_triplet(index, triplet))
            }
            PortEvent::InputWanted => RouterEvent::InputWanted(index),
            PortEvent::Closed => {
                if filled > 0 {
                    warn!("nic-{index} stopped in the middle of a packet");
                }
                break;
            }
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::config::StopCondition;
    use crate::utils::test_utils::utils::{NIC_BOOTED, NIC_RELAY, NIC_SENDER, program, within};

    fn small(machines: usize) -> NetworkConfig {
        NetworkConfig::new()
            .with_machines(machines)
            .with_idle_threshold(20)
            .with_boot_address(false)
    }

    #[tokio::test]
    async fn nat_value_repeats_and_ends_the_run() {
        let network = Network::with_programs(
            vec![program(NIC_SENDER), program(NIC_RELAY)],
            small(2),
        )
        .unwrap();
        let outcome = within(network.run()).await.unwrap();
        assert_eq!(
            outcome,
            NetworkOutcome {
                answer: 42,
                first_broadcast: Some(42),
                nat_deliveries: 1
            }
        );
    }

    #[tokio::test]
    async fn shared_program_boots_with_addresses() {
        let config = small(2).with_boot_address(true);
        let network = Network::new(program(NIC_BOOTED), config).unwrap();
        let outcome = within(network.run()).await.unwrap();
        assert_eq!(outcome.answer, 42);
    }

    #[tokio::test]
    async fn default_network_of_fifty() {
        let network = Network::new(program(NIC_BOOTED), NetworkConfig::default()).unwrap();
        let outcome = within(network.run()).await.unwrap();
        assert_eq!(outcome.answer, 42);
        assert_eq!(outcome.first_broadcast, Some(42));
    }

    #[tokio::test]
    async fn can_stop_at_first_broadcast() {
        let config = small(2).with_stop_at(StopCondition::FirstBroadcast);
        let network =
            Network::with_programs(vec![program(NIC_SENDER), program(NIC_RELAY)], config).unwrap();
        let outcome = within(network.run()).await.unwrap();
        assert_eq!(outcome.answer, 42);
        assert_eq!(outcome.nat_deliveries, 0);
    }

    #[tokio::test]
    async fn invalid_destination_stops_the_network() {
        // Sends {to: 7, x: 1, y: 2}, then polls forever.
        let network = Network::new(program("104,7,104,1,104,2,3,0,1105,1,6"), small(2)).unwrap();
        let err = within(network.run()).await.unwrap_err();
        assert!(matches!(err, NetworkError::InvalidAddress { to: 7, .. }));
    }

    #[tokio::test]
    async fn faulting_machine_is_reported() {
        let network = Network::with_programs(
            vec![program("3,100,1105,1,0"), program("42")],
            small(2),
        )
        .unwrap();
        let err = within(network.run()).await.unwrap_err();
        assert!(matches!(
            err,
            NetworkError::MachineFailed {
                index: 1,
                source: VMError::UnknownOpcode { opcode: 42, .. }
            }
        ));
    }

    #[tokio::test]
    async fn halting_everywhere_is_an_error() {
        let network = Network::new(program("99"), small(3)).unwrap();
        let err = within(network.run()).await.unwrap_err();
        assert!(matches!(err, NetworkError::AllMachinesExited));
    }

    #[tokio::test]
    async fn idle_before_any_broadcast_is_an_error() {
        let network = Network::new(program("3,100,1105,1,0"), small(2)).unwrap();
        let err = within(network.run()).await.unwrap_err();
        assert!(matches!(err, NetworkError::IdleWithoutBroadcast));
    }

    #[test]
    fn rejects_bad_configuration() {
        let err = Network::new(program("99"), small(2).with_idle_threshold(2)).err();
        assert!(matches!(err, Some(NetworkError::InvalidConfig(_))));

        let err = Network::with_programs(vec![program("99")], small(2)).err();
        assert!(matches!(err, Some(NetworkError::InvalidConfig(_))));
    }
}
