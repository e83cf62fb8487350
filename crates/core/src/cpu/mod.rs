// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod addressing;
pub mod alu;
pub mod disasm;
pub mod msp430;
pub mod registers;

pub use disasm::Disassembly;
pub use msp430::Msp430;
pub use registers::{RegisterFile, StatusFlags};
