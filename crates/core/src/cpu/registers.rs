// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use bitflags::bitflags;

pub const PC: u8 = 0;
pub const SP: u8 = 1;
pub const SR: u8 = 2;
/// Constant generator #2, never holds program state.
pub const CG2: u8 = 3;

pub const REGISTER_COUNT: usize = 16;

bitflags! {
    /// Status register (R2) bit layout. Bits 9..15 are reserved and are kept
    /// as written.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u16 {
        const CARRY = 1 << 0;
        const ZERO = 1 << 1;
        const NEGATIVE = 1 << 2;
        const GIE = 1 << 3;
        const CPUOFF = 1 << 4;
        const OSCOFF = 1 << 5;
        const SCG0 = 1 << 6;
        const SCG1 = 1 << 7;
        const OVERFLOW = 1 << 8;
    }
}

impl StatusFlags {
    /// Flags produced by the ALU.
    pub const ARITHMETIC: StatusFlags = StatusFlags::CARRY
        .union(StatusFlags::ZERO)
        .union(StatusFlags::NEGATIVE)
        .union(StatusFlags::OVERFLOW);
}

pub fn register_name(reg: u8) -> String {
    match reg {
        PC => "PC".to_string(),
        SP => "SP".to_string(),
        SR => "SR".to_string(),
        n => format!("R{}", n),
    }
}

/// Sixteen 16-bit registers. R0 (PC) always stays word aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterFile {
    regs: [u16; REGISTER_COUNT],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics if `reg` is not in 0..=15.
    pub fn read(&self, reg: u8) -> u16 {
        self.regs[reg as usize]
    }

    pub fn write(&mut self, reg: u8, value: u16) {
        let value = if reg == PC { value & !1 } else { value };
        self.regs[reg as usize] = value;
    }

    pub fn pc(&self) -> u16 {
        self.regs[PC as usize]
    }

    pub fn set_pc(&mut self, value: u16) {
        self.write(PC, value);
    }

    pub fn sp(&self) -> u16 {
        self.regs[SP as usize]
    }

    pub fn set_sp(&mut self, value: u16) {
        self.write(SP, value);
    }

    pub fn status(&self) -> StatusFlags {
        StatusFlags::from_bits_retain(self.regs[SR as usize])
    }

    pub fn set_status(&mut self, flags: StatusFlags) {
        self.regs[SR as usize] = flags.bits();
    }

    pub fn flag(&self, flag: StatusFlags) -> bool {
        self.status().contains(flag)
    }

    pub fn set_flag(&mut self, flag: StatusFlags, on: bool) {
        let mut status = self.status();
        status.set(flag, on);
        self.set_status(status);
    }

    /// Replace C/Z/N/V with `flags`, leaving the control bits untouched.
    pub fn set_arithmetic_flags(&mut self, flags: StatusFlags) {
        let mut status = self.status();
        status.remove(StatusFlags::ARITHMETIC);
        status.insert(flags & StatusFlags::ARITHMETIC);
        self.set_status(status);
    }

    pub fn as_array(&self) -> &[u16; REGISTER_COUNT] {
        &self.regs
    }
}
