// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::registers::{register_name, RegisterFile, CG2, PC, SR};
use crate::decoder::Width;
use crate::{Bus, SimResult};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Register,
    /// Indexed, symbolic (base PC) and absolute (base SR) share one class.
    Indexed,
    IndirectRegister,
    IndirectAutoincrement,
    Immediate,
    None,
}

/// Source addressing: all four As encodings are meaningful.
pub fn source_mode(reg: u8, as_bits: u8) -> AddressingMode {
    match as_bits & 0b11 {
        0b00 => AddressingMode::Register,
        0b01 => AddressingMode::Indexed,
        0b10 => AddressingMode::IndirectRegister,
        _ if reg == PC => AddressingMode::Immediate,
        _ => AddressingMode::IndirectAutoincrement,
    }
}

/// Two-operand destinations only know Register and the Indexed family.
pub fn destination_mode(ad_bit: u8) -> AddressingMode {
    if ad_bit & 1 == 0 {
        AddressingMode::Register
    } else {
        AddressingMode::Indexed
    }
}

/// Literal produced by R2/R3 for the given addressing bits, if any.
pub fn constant_generator(reg: u8, bits: u8) -> Option<u16> {
    match (reg, bits & 0b11) {
        (SR, 0b10) => Some(4),
        (SR, 0b11) => Some(8),
        (CG2, 0b00) => Some(0),
        (CG2, 0b01) => Some(1),
        (CG2, 0b10) => Some(2),
        (CG2, 0b11) => Some(0xFFFF),
        _ => None,
    }
}

/// Where an operand lives once its addressing mode has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Register(u8),
    Memory(u16),
    Immediate(u16),
    Constant(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub mode: AddressingMode,
    pub register: u8,
    pub location: Location,
    /// Extension word consumed from the instruction stream.
    pub extension: Option<u16>,
}

impl Operand {
    /// Effective memory address for memory-resident operands.
    pub fn address(&self) -> Option<u16> {
        match self.location {
            Location::Memory(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn constant(&self) -> Option<u16> {
        match self.location {
            Location::Constant(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = register_name(self.register);
        match (self.mode, self.location) {
            (_, Location::Constant(value)) => write!(f, "#{}", value as i16),
            (_, Location::Immediate(value)) => write!(f, "#{:#06x}", value),
            (AddressingMode::Indexed, Location::Memory(addr)) => match self.register {
                SR => write!(f, "&{:#06x}", addr),
                PC => write!(f, "{:#06x}", addr),
                _ => write!(f, "{:#06x}({})", self.extension.unwrap_or(0), name),
            },
            (AddressingMode::IndirectRegister, _) => write!(f, "@{}", name),
            (AddressingMode::IndirectAutoincrement, _) => write!(f, "@{}+", name),
            _ => f.write_str(&name),
        }
    }
}

/// Locates operands against a scratch copy of the register file.
///
/// Every side effect of resolution (extension-word fetches moving the PC
/// cursor, autoincrement) lands in the scratch copy only. The execution path
/// takes the registers back with [`OperandResolver::into_registers`] once the
/// instruction has succeeded; the display path simply drops the resolver.
pub struct OperandResolver<'a> {
    bus: &'a dyn Bus,
    regs: RegisterFile,
}

impl<'a> OperandResolver<'a> {
    pub fn new(bus: &'a dyn Bus, regs: RegisterFile) -> Self {
        Self { bus, regs }
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn into_registers(self) -> RegisterFile {
        self.regs
    }

    /// Read the word after the one the PC currently points at and move the
    /// cursor onto it.
    fn fetch_extension(&mut self) -> SimResult<u16> {
        let addr = self.regs.pc().wrapping_add(2);
        let word = self.bus.read_u16(addr)?;
        self.regs.set_pc(addr);
        Ok(word)
    }

    fn indexed(&mut self, reg: u8, as_bits: u8) -> SimResult<Operand> {
        let extension = self.fetch_extension()?;
        // Symbolic mode is relative to the extension word itself
        let base = match reg {
            SR if as_bits == 0b01 => 0,
            _ => self.regs.read(reg),
        };
        Ok(Operand {
            mode: AddressingMode::Indexed,
            register: reg,
            location: Location::Memory(base.wrapping_add(extension)),
            extension: Some(extension),
        })
    }

    /// Resolve a source operand (also used for the single-operand format).
    pub fn source(&mut self, reg: u8, as_bits: u8, width: Width) -> SimResult<Operand> {
        let as_bits = as_bits & 0b11;

        if let Some(value) = constant_generator(reg, as_bits) {
            tracing::trace!("Constant generator R{} As={:02b} -> {:#06x}", reg, as_bits, value);
            return Ok(Operand {
                mode: AddressingMode::Immediate,
                register: reg,
                location: Location::Constant(value),
                extension: None,
            });
        }

        let mode = source_mode(reg, as_bits);
        let operand = match mode {
            AddressingMode::Register => Operand {
                mode,
                register: reg,
                location: Location::Register(reg),
                extension: None,
            },
            AddressingMode::Indexed => self.indexed(reg, as_bits)?,
            AddressingMode::IndirectRegister => Operand {
                mode,
                register: reg,
                location: Location::Memory(self.regs.read(reg)),
                extension: None,
            },
            AddressingMode::IndirectAutoincrement => {
                let addr = self.regs.read(reg);
                self.regs.write(reg, addr.wrapping_add(width.increment()));
                Operand {
                    mode,
                    register: reg,
                    location: Location::Memory(addr),
                    extension: None,
                }
            }
            AddressingMode::Immediate | AddressingMode::None => {
                let value = self.fetch_extension()?;
                Operand {
                    mode: AddressingMode::Immediate,
                    register: reg,
                    location: Location::Immediate(value),
                    extension: Some(value),
                }
            }
        };
        Ok(operand)
    }

    /// Resolve a two-operand destination. Must run after [`Self::source`] so
    /// the extension words are consumed in instruction-stream order.
    pub fn destination(&mut self, reg: u8, ad_bit: u8) -> SimResult<Operand> {
        match destination_mode(ad_bit) {
            AddressingMode::Register => Ok(Operand {
                mode: AddressingMode::Register,
                register: reg,
                location: Location::Register(reg),
                extension: None,
            }),
            _ => self.indexed(reg, 0b01),
        }
    }

    /// Current value of a resolved operand, masked to `width`.
    pub fn load(&self, operand: &Operand, width: Width) -> SimResult<u16> {
        let value = match operand.location {
            // Reading R0 yields the address of the next instruction word
            Location::Register(PC) => self.regs.pc().wrapping_add(2),
            Location::Register(reg) => self.regs.read(reg),
            Location::Memory(addr) => match width {
                Width::Byte => self.bus.read_u8(addr) as u16,
                Width::Word => self.bus.read_u16(addr)?,
            },
            Location::Immediate(value) | Location::Constant(value) => value,
        };
        Ok(value & width.mask())
    }
}
