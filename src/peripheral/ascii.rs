use crate::peripheral::scripted::Scripted;
use crate::peripheral::{Peripheral, PeripheralError};
use crate::virtual_machine::port::PeripheralPorts;

/// Everything an ASCII-speaking engine printed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AsciiOutput {
    /// Outputs in the ASCII range, as text.
    pub text: String,
    /// Outputs outside the ASCII range, in emission order. Engines use these
    /// for their final answer.
    pub values: Vec<i64>,
}

impl AsciiOutput {
    /// Returns the last non-ASCII value, if any.
    pub fn answer(&self) -> Option<i64> {
        self.values.last().copied()
    }
}

/// Types lines of text into an engine and reads its console.
///
/// Each line is sent as character codes followed by a newline (10).
#[derive(Clone, Debug, Default)]
pub struct AsciiTerminal {
    lines: Vec<String>,
}

impl AsciiTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one line of input. The trailing newline is added on send.
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    /// Queues several lines.
    pub fn lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Encodes the queued lines as engine input.
    fn encode(&self) -> Result<Vec<i64>, PeripheralError> {
        let mut codes = Vec::new();
        for line in &self.lines {
            if let Some(c) = line.chars().find(|c| !c.is_ascii()) {
                return Err(PeripheralError::Protocol(format!(
                    "non-ASCII character {c:?} in input line {line:?}"
                )));
            }
            codes.extend(line.bytes().map(i64::from));
            codes.push(i64::from(b'\n'));
        }
        Ok(codes)
    }
}

#[async_trait::async_trait]
impl Peripheral for AsciiTerminal {
    type Output = AsciiOutput;

    async fn drive(self, ports: PeripheralPorts) -> Result<AsciiOutput, PeripheralError> {
        let codes = self.encode()?;
        let emitted = Scripted::new(codes).drive(ports).await?;

        let mut output = AsciiOutput::default();
        for value in emitted {
            match u8::try_from(value) {
                Ok(byte) if byte.is_ascii() => output.text.push(char::from(byte)),
                _ => output.values.push(value),
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::attach;
    use crate::utils::test_utils::utils::{ECHO_LOOP, program, within};
    use crate::virtual_machine::config::EngineConfig;

    #[test]
    fn encodes_lines_with_newlines() {
        let terminal = AsciiTerminal::new().line("NOT A J").line("WALK");
        let codes = terminal.encode().unwrap();
        assert_eq!(codes.len(), "NOT A J\nWALK\n".len());
        assert_eq!(codes[0], 78);
        assert_eq!(codes[7], 10);
    }

    #[test]
    fn rejects_non_ascii_input() {
        let terminal = AsciiTerminal::new().line("héllo");
        assert!(matches!(
            terminal.encode(),
            Err(PeripheralError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn echoed_text_comes_back() {
        let session = within(attach(
            &program(ECHO_LOOP),
            EngineConfig::default(),
            AsciiTerminal::new().lines(["OR A T", "RUN"]),
        ))
        .await
        .unwrap();
        assert_eq!(session.output.text, "OR A T\nRUN\n");
        assert_eq!(session.output.answer(), None);
    }

    #[tokio::test]
    async fn large_values_are_split_from_text() {
        // Prints "ok\n" followed by a large answer.
        let session = within(attach(
            &program("104,111,104,107,104,10,104,19358870,99"),
            EngineConfig::default(),
            AsciiTerminal::new(),
        ))
        .await
        .unwrap();
        assert_eq!(session.output.text, "ok\n");
        assert_eq!(session.output.answer(), Some(19358870));
    }
}
