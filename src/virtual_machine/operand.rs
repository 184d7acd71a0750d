use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Opcode;

/// Addressing mode selected by one mode digit.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Mode {
    /// Operand is an absolute address.
    #[default]
    Position = 0,
    /// Operand is the value itself. Never valid as a write target.
    Immediate = 1,
    /// Operand is an offset from the relative base.
    Relative = 2,
}

impl Mode {
    /// All modes, in digit order.
    pub const ALL: [Mode; 3] = [Mode::Position, Mode::Immediate, Mode::Relative];

    /// Returns the decimal digit encoding this mode.
    pub const fn digit(&self) -> i64 {
        *self as i64
    }

    /// Returns the prefix used by the disassembler.
    pub const fn sigil(&self) -> &'static str {
        match self {
            Mode::Position => "@",
            Mode::Immediate => "",
            Mode::Relative => "rb",
        }
    }
}

impl TryFrom<i64> for Mode {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Position),
            1 => Ok(Mode::Immediate),
            2 => Ok(Mode::Relative),
            other => Err(other),
        }
    }
}

/// Mode digits of one instruction, consumed least significant digit first.
///
/// Digits beyond those present in the instruction word read as [`Mode::Position`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Modes(i64);

impl Modes {
    /// Wraps the digits left after removing the opcode.
    pub const fn new(digits: i64) -> Self {
        Self(digits)
    }

    /// Takes the next raw digit without validating it.
    pub fn next_digit(&mut self) -> i64 {
        let digit = self.0 % 10;
        self.0 /= 10;
        digit
    }

    /// Takes the next digit and decodes it.
    ///
    /// Returns the offending digit if it is not a known mode.
    pub fn next_mode(&mut self) -> Result<Mode, i64> {
        Mode::try_from(self.next_digit())
    }

    /// Returns `true` once every digit has been consumed.
    pub const fn is_exhausted(&self) -> bool {
        self.0 == 0
    }
}

/// Splits an instruction word into its opcode and mode digits.
///
/// The returned errors carry `offset: 0`; the engine rewrites them with the
/// real instruction address.
pub fn decode_instruction(word: i64) -> Result<(Opcode, Modes), VMError> {
    if word < 0 {
        return Err(VMError::InvalidInstruction { word, offset: 0 });
    }
    let opcode = Opcode::try_from(word % 100)?;
    Ok((opcode, Modes::new(word / 100)))
}

/// Builds an instruction word from an opcode and per-operand modes.
///
/// `modes[i]` applies to operand `i`. Trailing position modes may be omitted.
pub fn encode_instruction(opcode: Opcode, modes: &[Mode]) -> i64 {
    let digits = modes
        .iter()
        .rev()
        .fold(0i64, |acc, mode| acc * 10 + mode.digit());
    digits * 100 + opcode.code()
}
