// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod msp430;

pub use msp430::{decode, DecodeError, Format, Instruction, Opcode, Width};
