// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::addressing::{Operand, OperandResolver};
use crate::cpu::registers::RegisterFile;
use crate::decoder::{self, DecodeError, Instruction, Opcode};
use crate::{Bus, SimResult, SimulationError};
use std::fmt;

/// Human-readable decode of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    pub address: u16,
    /// Opcode word followed by any extension words.
    pub words: Vec<u16>,
    pub instruction: Instruction,
    pub text: String,
    /// Literal supplied by the constant generator, if it fired.
    pub constant: Option<u16>,
}

impl Disassembly {
    /// Address of the instruction that follows this one in memory.
    pub fn next_address(&self) -> u16 {
        self.address.wrapping_add(2 * self.words.len() as u16)
    }
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<String> = self.words.iter().map(|w| format!("{:04x}", w)).collect();
        write!(f, "{:#06x}: {:<15} {}", self.address, words.join(" "), self.text)
    }
}

fn push_extension(words: &mut Vec<u16>, operand: &Operand) {
    if let Some(ext) = operand.extension {
        words.push(ext);
    }
}

/// Decode the instruction at `addr` without touching the caller's state.
///
/// Operands are located by an [`OperandResolver`] running on a copy of
/// `regs` whose PC is moved to `addr`; nothing is loaded from operand
/// addresses and nothing is written anywhere.
pub fn disassemble(bus: &dyn Bus, regs: &RegisterFile, addr: u16) -> SimResult<Disassembly> {
    let word = bus.read_u16(addr)?;
    let instruction = decoder::decode(word).map_err(|DecodeError::UndefinedOpcode(word)| {
        SimulationError::UndefinedOpcode { pc: addr, word }
    })?;

    let mut scratch = *regs;
    scratch.set_pc(addr);
    let mut resolver = OperandResolver::new(bus, scratch);
    let mut words = vec![word];
    let mut constant = None;

    let text = match instruction {
        Instruction::TwoOperand {
            opcode,
            src,
            dst,
            as_bits,
            ad_bit,
            width,
        } => {
            let source = resolver.source(src, as_bits, width)?;
            let destination = resolver.destination(dst, ad_bit)?;
            push_extension(&mut words, &source);
            push_extension(&mut words, &destination);
            constant = source.constant();
            format!("{}{} {}, {}", opcode, width.suffix(), source, destination)
        }
        Instruction::SingleOperand {
            opcode: Opcode::Reti,
            ..
        } => Opcode::Reti.to_string(),
        Instruction::SingleOperand {
            opcode,
            reg,
            ad_bits,
            width,
        } => {
            let operand = resolver.source(reg, ad_bits, width)?;
            push_extension(&mut words, &operand);
            constant = operand.constant();
            format!("{}{} {}", opcode, width.suffix(), operand)
        }
        Instruction::Jump { opcode, offset } => {
            format!("{} {:#06x}", opcode, jump_target(addr, offset))
        }
    };

    Ok(Disassembly {
        address: addr,
        words,
        instruction,
        text,
        constant,
    })
}

/// Destination of a relative jump located at `pc`.
pub fn jump_target(pc: u16, offset: i16) -> u16 {
    pc.wrapping_add(2).wrapping_add((offset as u16).wrapping_mul(2))
}
