//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the engine's opcode table. The `for_each_opcode!` macro holds the
//! canonical opcode definitions and invokes a callback macro for code generation,
//! so the opcode list is written down exactly once.
//!
//! This module generates:
//! - The [`Opcode`] enum with its numeric encodings
//! - `TryFrom<i64>` for decoding opcodes
//! - Mnemonics and operand signatures used by the engine and the disassembler
//!
//! # Instruction Format
//!
//! An instruction is one memory cell followed by its operands, one cell each:
//! - Opcode: the low two decimal digits of the instruction word
//! - Mode digits: the remaining digits, one per operand, least significant first
//! - Operand: a raw cell resolved according to its mode digit

use crate::virtual_machine::errors::VMError;

/// How an instruction uses one of its operands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// Operand is resolved to a value.
    Read,
    /// Operand is resolved to an address that receives the result.
    Write,
}

/// Invokes a callback macro with the complete opcode definition list.
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            /// ADD a, b, dst ; dst = a + b
            Add = 1, "ADD" => [a: Read, b: Read, dst: Write],
            /// MUL a, b, dst ; dst = a * b
            Mul = 2, "MUL" => [a: Read, b: Read, dst: Write],
            /// IN dst ; dst = next value from the input port (signals ready first)
            In = 3, "IN" => [dst: Write],
            /// OUT a ; send a on the output port
            Out = 4, "OUT" => [a: Read],
            /// JNZ a, target ; if a != 0 then IP = target
            Jnz = 5, "JNZ" => [a: Read, target: Read],
            /// JZ a, target ; if a == 0 then IP = target
            Jz = 6, "JZ" => [a: Read, target: Read],
            /// LT a, b, dst ; dst = (a < b) as 1 or 0
            Lt = 7, "LT" => [a: Read, b: Read, dst: Write],
            /// EQ a, b, dst ; dst = (a == b) as 1 or 0
            Eq = 8, "EQ" => [a: Read, b: Read, dst: Write],
            /// ARB a ; relative base += a
            Arb = 9, "ARB" => [a: Read],
            /// HALT ; stop the engine
            Halt = 99, "HALT" => [],
        }
    };
}

macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /// Operation selected by the low two digits of an instruction word.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<i64> for Opcode {
            type Error = VMError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(VMError::UnknownOpcode {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Opcode {
            /// Every opcode, in encoding order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Returns the mnemonic used in listings and diagnostics.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns how each operand is used, in operand order.
            pub const fn operands(&self) -> &'static [OperandKind] {
                match self {
                    $( Opcode::$name => &[ $( OperandKind::$kind, )* ], )*
                }
            }

            /// Returns the numeric encoding of this opcode.
            pub const fn code(&self) -> i64 {
                *self as i64
            }
        }
    };
}

for_each_opcode!(define_opcodes);

impl Opcode {
    /// Number of operand cells following the instruction word.
    pub const fn arity(&self) -> usize {
        self.operands().len()
    }

    /// Total cells occupied by the instruction, including the word itself.
    pub const fn width(&self) -> usize {
        1 + self.arity()
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_try_from_valid() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::try_from(op.code()).unwrap(), *op);
        }
    }

    #[test]
    fn opcode_try_from_invalid() {
        for value in [0, 10, 42, 98, 100, -1] {
            assert!(matches!(
                Opcode::try_from(value),
                Err(VMError::UnknownOpcode { opcode, .. }) if opcode == value
            ));
        }
    }

    #[test]
    fn arity_matches_table() {
        assert_eq!(Opcode::Add.arity(), 3);
        assert_eq!(Opcode::In.arity(), 1);
        assert_eq!(Opcode::Jz.arity(), 2);
        assert_eq!(Opcode::Halt.arity(), 0);
        assert_eq!(Opcode::Eq.width(), 4);
    }

    #[test]
    fn write_operands_are_last() {
        for op in Opcode::ALL {
            let kinds = op.operands();
            let writes = kinds.iter().filter(|k| **k == OperandKind::Write).count();
            assert!(writes <= 1, "{op} has more than one write operand");
            if writes == 1 {
                assert_eq!(kinds.last(), Some(&OperandKind::Write), "{op}");
            }
        }
    }

    #[test]
    fn mnemonics_are_unique() {
        let mut names: Vec<_> = Opcode::ALL.iter().map(|op| op.mnemonic()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Opcode::ALL.len());
    }
}
