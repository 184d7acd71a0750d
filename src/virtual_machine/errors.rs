use thiserror::Error;

/// Errors that stop an engine.
///
/// Every variant produced by the fetch-execute loop carries `offset`, the
/// address of the instruction word that was executing when the fault occurred.
#[derive(Clone, Debug, Error)]
pub enum VMError {
    /// Instruction word is negative and cannot carry an opcode.
    #[error("invalid instruction word {word} at {offset}")]
    InvalidInstruction { word: i64, offset: usize },
    /// Low two digits of the instruction word name no known opcode.
    #[error("unknown opcode {opcode} at {offset}")]
    UnknownOpcode { opcode: i64, offset: usize },
    /// Mode digit outside {0, 1, 2}.
    #[error("unknown addr mode {mode} for {instruction} at {offset}")]
    InvalidMode {
        instruction: &'static str,
        mode: i64,
        offset: usize,
    },
    /// Immediate mode used for an operand that is written to.
    #[error("unknown addr mode: {instruction} at {offset} writes through an immediate operand")]
    ImmediateWrite {
        instruction: &'static str,
        offset: usize,
    },
    /// Resolved address (or jump target) is below zero.
    #[error("negative address {address} in {instruction} at {offset}")]
    NegativeAddress {
        instruction: &'static str,
        address: i64,
        offset: usize,
    },
    /// Result does not fit in 64 bits.
    #[error("arithmetic overflow in {instruction} at {offset}")]
    Overflow {
        instruction: &'static str,
        offset: usize,
    },
    /// Output port was abandoned by its reader.
    #[error("output port closed while sending {value} at {offset}")]
    OutputClosed { value: i64, offset: usize },
    /// The task running the engine panicked or was aborted.
    #[error("engine task failed: {0}")]
    TaskFailed(String),
}

impl VMError {
    /// Returns `true` for faults raised while decoding an instruction.
    pub const fn is_decode_error(&self) -> bool {
        matches!(
            self,
            VMError::InvalidInstruction { .. }
                | VMError::UnknownOpcode { .. }
                | VMError::InvalidMode { .. }
                | VMError::ImmediateWrite { .. }
        )
    }

    /// Replaces the placeholder offset of a decode error with the real address.
    pub fn at(self, at: usize) -> Self {
        match self {
            VMError::InvalidInstruction { word, .. } => VMError::InvalidInstruction {
                word,
                offset: at,
            },
            VMError::UnknownOpcode { opcode, .. } => VMError::UnknownOpcode {
                opcode,
                offset: at,
            },
            other => other,
        }
    }

    /// Address of the faulting instruction, if the error came from the loop.
    pub const fn offset(&self) -> Option<usize> {
        match self {
            VMError::InvalidInstruction { offset, .. }
            | VMError::UnknownOpcode { offset, .. }
            | VMError::InvalidMode { offset, .. }
            | VMError::ImmediateWrite { offset, .. }
            | VMError::NegativeAddress { offset, .. }
            | VMError::Overflow { offset, .. }
            | VMError::OutputClosed { offset, .. } => Some(*offset),
            VMError::TaskFailed(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_are_classified() {
        assert!(VMError::UnknownOpcode { opcode: 42, offset: 0 }.is_decode_error());
        assert!(
            VMError::ImmediateWrite {
                instruction: "ADD",
                offset: 4
            }
            .is_decode_error()
        );
        assert!(!VMError::OutputClosed { value: 1, offset: 0 }.is_decode_error());
        assert!(!VMError::TaskFailed("boom".into()).is_decode_error());
    }

    #[test]
    fn offset_is_reported() {
        let err = VMError::InvalidMode {
            instruction: "MUL",
            mode: 7,
            offset: 12,
        };
        assert_eq!(err.offset(), Some(12));
        assert_eq!(VMError::TaskFailed("x".into()).offset(), None);
    }

    #[test]
    fn immediate_write_message_names_addr_mode() {
        let err = VMError::ImmediateWrite {
            instruction: "LT",
            offset: 3,
        };
        assert!(err.to_string().starts_with("unknown addr mode"));
    }
}
