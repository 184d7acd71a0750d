/// Default label attached to engine log lines.
pub const DEFAULT_LABEL: &str = "engine";

/// Default port queue capacity. One slot approximates a rendezvous.
pub const DEFAULT_PORT_CAPACITY: usize = 1;

/// Capabilities and limits of one engine, fixed at construction.
///
/// The same interpreter serves every peripheral; what differs between them is
/// captured here instead of in per-use copies of the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Name used in log lines, e.g. `nic-7` or `amp-2`.
    pub label: String,
    /// Announce every input request on the ready signal before blocking.
    pub ready_signal: bool,
    /// Capacity of the input and output queues created by [`port_pair`](super::port::port_pair).
    pub port_capacity: usize,
    /// Log every executed instruction at debug level.
    pub trace: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            ready_signal: false,
            port_capacity: DEFAULT_PORT_CAPACITY,
            trace: false,
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_ready_signal(mut self, enabled: bool) -> Self {
        self.ready_signal = enabled;
        self
    }

    /// Sets the queue capacity; zero is raised to one.
    pub fn with_port_capacity(mut self, capacity: usize) -> Self {
        self.port_capacity = capacity.max(1);
        self
    }

    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.label, DEFAULT_LABEL);
        assert!(!config.ready_signal);
        assert_eq!(config.port_capacity, 1);
        assert!(!config.trace);
    }

    #[test]
    fn builder_sets_fields() {
        let config = EngineConfig::new()
            .with_label("nic-3")
            .with_ready_signal(true)
            .with_port_capacity(0)
            .with_trace(true);
        assert_eq!(config.label, "nic-3");
        assert!(config.ready_signal);
        assert_eq!(config.port_capacity, 1);
        assert!(config.trace);
    }
}
