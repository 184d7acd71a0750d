//! Linear-sweep disassembler.
//!
//! Intcode does not separate code from data, so a listing is a best effort:
//! every cell that decodes as an instruction whose operands fit in the image is
//! printed as one, anything else as a `DATA` cell, and the sweep continues at
//! the next cell.

use crate::virtual_machine::isa::{OperandKind, Opcode};
use crate::virtual_machine::operand::{Mode, decode_instruction};
use crate::virtual_machine::program::Program;
use std::fmt;

/// One operand as written in the program.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Operand {
    pub mode: Mode,
    pub raw: i64,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Mode::Relative if self.raw < 0 => write!(f, "rb{}", self.raw),
            Mode::Relative => write!(f, "rb+{}", self.raw),
            mode => write!(f, "{}{}", mode.sigil(), self.raw),
        }
    }
}

/// One entry of a listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Line {
    Instruction {
        offset: usize,
        opcode: Opcode,
        operands: Vec<Operand>,
    },
    Data {
        offset: usize,
        value: i64,
    },
}

impl Line {
    /// Address of the first cell covered by this line.
    pub fn offset(&self) -> usize {
        match self {
            Line::Instruction { offset, .. } | Line::Data { offset, .. } => *offset,
        }
    }

    /// Number of cells covered by this line.
    pub fn width(&self) -> usize {
        match self {
            Line::Instruction { opcode, .. } => opcode.width(),
            Line::Data { .. } => 1,
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Instruction {
                offset,
                opcode,
                operands,
            } => {
                write!(f, "{offset:>6}: {:<4}", opcode.mnemonic())?;
                for (i, operand) in operands.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{sep}{operand}")?;
                }
                Ok(())
            }
            Line::Data { offset, value } => write!(f, "{offset:>6}: DATA {value}"),
        }
    }
}

/// Decodes the instruction at `offset`, if it is one that fits in `cells`.
fn decode_at(cells: &[i64], offset: usize) -> Option<Line> {
    let (opcode, mut modes) = decode_instruction(cells[offset]).ok()?;
    if offset + opcode.width() > cells.len() {
        return None;
    }
    let mut operands = Vec::with_capacity(opcode.arity());
    for (i, kind) in opcode.operands().iter().enumerate() {
        let mode = modes.next_mode().ok()?;
        if *kind == OperandKind::Write && mode == Mode::Immediate {
            return None;
        }
        operands.push(Operand {
            mode,
            raw: cells[offset + 1 + i],
        });
    }
    // Leftover mode digits mark the word as data.
    if !modes.is_exhausted() {
        return None;
    }
    Some(Line::Instruction {
        offset,
        opcode,
        operands,
    })
}

/// Disassembles raw cells.
pub fn disassemble(cells: &[i64]) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut offset = 0;
    while offset < cells.len() {
        let line = decode_at(cells, offset).unwrap_or(Line::Data {
            offset,
            value: cells[offset],
        });
        offset += line.width();
        lines.push(line);
    }
    lines
}

/// Renders a full listing, one line per entry.
pub fn listing(program: &Program) -> String {
    let mut out = String::new();
    for line in disassemble(program.cells()) {
        out.push_str(&line.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_mode() {
        let lines = disassemble(&[1002, 4, 3, 4, 22201, 1, -2, 3, 99]);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].to_string(), "     0: MUL  @4, 3, @4");
        assert_eq!(lines[1].to_string(), "     4: ADD  rb+1, rb-2, rb+3");
        assert_eq!(lines[2].to_string(), "     8: HALT");
    }

    #[test]
    fn undecodable_cells_become_data() {
        let lines = disassemble(&[104, 7, 42, -3, 11101, 1, 1, 1]);
        assert_eq!(lines[0].to_string(), "     0: OUT  7");
        assert_eq!(
            lines[1..],
            [
                Line::Data { offset: 2, value: 42 },
                Line::Data { offset: 3, value: -3 },
                Line::Data { offset: 4, value: 11101 },
                Line::Data { offset: 5, value: 1 },
                Line::Data { offset: 6, value: 1 },
                Line::Data { offset: 7, value: 1 },
            ]
        );
    }

    #[test]
    fn truncated_instruction_is_data() {
        let lines = disassemble(&[99, 1, 5]);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], Line::Data { offset: 1, value: 1 });
    }

    #[test]
    fn surplus_mode_digits_are_data() {
        let lines = disassemble(&[10099]);
        assert_eq!(lines, vec![Line::Data { offset: 0, value: 10099 }]);
    }

    #[test]
    fn listing_covers_every_cell() {
        let program: Program = "3,0,4,0,99,7".parse().unwrap();
        let text = listing(&program);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["     0: IN   @0", "     2: OUT  @0", "     4: HALT", "     5: DATA 7"]);
    }
}
