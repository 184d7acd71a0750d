//! Test utilities shared by engine, peripheral and network tests.

#[cfg(test)]
pub mod utils {
    use crate::virtual_machine::program::Program;
    use std::future::Future;
    use std::time::Duration;

    /// Upper bound for any test that waits on spawned engines.
    pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Reads one value and writes it back, forever.
    pub const ECHO_LOOP: &str = "3,100,4,100,1105,1,0";

    /// Sends `{to: 1, x: 7, y: 9}`, then polls its input forever.
    pub const NIC_SENDER: &str = "104,1,104,7,104,9,3,100,1105,1,6";

    /// Polls until a packet arrives, then sends `{to: 255, x: 0, y: 42}` and
    /// returns to polling.
    pub const NIC_RELAY: &str =
        "3,100,1008,100,-1,101,1005,101,0,3,102,104,255,104,0,104,42,3,100,1105,1,17";

    /// Boots with its address, then behaves as [`NIC_SENDER`] on address 0 and
    /// as [`NIC_RELAY`] on any other address.
    pub const NIC_BOOTED: &str = "3,200,1005,200,16,104,1,104,7,104,9,3,201,1105,1,11,\
        3,100,1008,100,-1,101,1005,101,16,3,102,104,255,104,0,104,42,3,100,1105,1,33";

    /// Parses program text, panicking on malformed input.
    pub fn program(text: &str) -> Program {
        text.parse().expect("test program must parse")
    }

    /// Awaits `fut`, failing the test if it takes longer than [`TEST_TIMEOUT`].
    pub async fn within<F: Future>(fut: F) -> F::Output {
        tokio::time::timeout(TEST_TIMEOUT, fut)
            .await
            .expect("test timed out")
    }
}
