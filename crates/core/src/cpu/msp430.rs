// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::addressing::{Location, OperandResolver};
use crate::cpu::alu;
use crate::cpu::disasm::{self, jump_target, Disassembly};
use crate::cpu::registers::{register_name, RegisterFile, StatusFlags, PC, REGISTER_COUNT};
use crate::decoder::{self, DecodeError, Instruction, Opcode, Width};
use crate::memory::{PERIPHERAL_LIMIT, RESET_VECTOR};
use crate::snapshot::CpuSnapshot;
use crate::{Bus, Cpu, SimResult, SimulationConfig, SimulationError, SimulationObserver};
use std::sync::Arc;

/// The instruction currently being executed.
#[derive(Debug, Clone, Copy)]
struct Fetched {
    pc: u16,
    word: u16,
}

impl Fetched {
    fn unimplemented(&self, opcode: Opcode) -> SimulationError {
        tracing::warn!(
            "Unimplemented opcode {} ({:#06x}) at {:#06x}",
            opcode,
            self.word,
            self.pc
        );
        SimulationError::UnimplementedOpcode {
            pc: self.pc,
            word: self.word,
            opcode,
        }
    }
}

/// Opcodes with an execution handler. Everything else is a named failure.
pub fn is_implemented(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Mov
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Cmp
            | Opcode::Bis
            | Opcode::Xor
            | Opcode::Call
            | Opcode::Jmp
            | Opcode::Jeq
    )
}

/// Store `value` to a resolved operand location. Returns true when the write
/// redirected control flow.
fn write_back(
    bus: &mut dyn Bus,
    regs: &mut RegisterFile,
    location: Location,
    value: u16,
    width: Width,
) -> SimResult<bool> {
    match location {
        Location::Register(reg) => {
            // Byte results clear the high byte of a register destination
            regs.write(reg, value & width.mask());
            Ok(reg == PC)
        }
        Location::Memory(addr) => {
            match width {
                Width::Byte => bus.write_u8(addr, value as u8),
                Width::Word => bus.write_u16(addr, value)?,
            }
            Ok(false)
        }
        Location::Immediate(_) | Location::Constant(_) => Ok(false),
    }
}

#[derive(Debug, Default)]
pub struct Msp430 {
    regs: RegisterFile,
    config: SimulationConfig,
    last_constant: Option<u16>,
}

impl Msp430 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SimulationConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn flag(&self, flag: StatusFlags) -> bool {
        self.regs.flag(flag)
    }

    /// Literal produced by the constant generator during the last step.
    pub fn last_constant(&self) -> Option<u16> {
        self.last_constant
    }

    fn fetch(&self, bus: &dyn Bus) -> SimResult<Fetched> {
        let pc = self.regs.pc();
        if self.config.peripheral_fetch_guard && pc <= PERIPHERAL_LIMIT {
            tracing::warn!("Instruction fetch from peripheral region at {:#06x}", pc);
            return Err(SimulationError::PeripheralFetchFault { pc });
        }
        let word = bus.read_u16(pc)?;
        Ok(Fetched { pc, word })
    }

    fn decode(&self, fetched: Fetched) -> SimResult<Instruction> {
        decoder::decode(fetched.word).map_err(|DecodeError::UndefinedOpcode(word)| {
            tracing::warn!("Undefined opcode {:#06x} at {:#06x}", word, fetched.pc);
            SimulationError::UndefinedOpcode {
                pc: fetched.pc,
                word,
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn execute_two_operand(
        &mut self,
        bus: &mut dyn Bus,
        fetched: Fetched,
        opcode: Opcode,
        src: u8,
        dst: u8,
        as_bits: u8,
        ad_bit: u8,
        width: Width,
    ) -> SimResult<()> {
        let mut resolver = OperandResolver::new(&*bus, self.regs);
        let source = resolver.source(src, as_bits, width)?;
        let destination = resolver.destination(dst, ad_bit)?;

        let src_val = resolver.load(&source, width)?;
        // MOV never reads its destination
        let dst_val = match opcode {
            Opcode::Mov => 0,
            _ => resolver.load(&destination, width)?,
        };
        let mut regs = resolver.into_registers();
        self.last_constant = source.constant();

        let (result, flags) = match opcode {
            Opcode::Mov => (Some(src_val), None),
            Opcode::Add => {
                let r = alu::add(src_val, dst_val, false, width);
                (Some(r.value), Some(r.flags))
            }
            Opcode::Sub => {
                let r = alu::sub(dst_val, src_val, width);
                (Some(r.value), Some(r.flags))
            }
            Opcode::Cmp => (None, Some(alu::sub(dst_val, src_val, width).flags)),
            Opcode::Bis => (Some(src_val | dst_val), None),
            Opcode::Xor => {
                let r = alu::xor(src_val, dst_val, width);
                (Some(r.value), Some(r.flags))
            }
            other => return Err(fetched.unimplemented(other)),
        };

        let mut redirected = false;
        if let Some(value) = result {
            redirected = write_back(bus, &mut regs, destination.location, value, width)?;
        }
        if let Some(flags) = flags {
            regs.set_arithmetic_flags(flags);
        }

        if redirected {
            tracing::trace!("{} redirected PC to {:#06x}", opcode, regs.pc());
        } else {
            regs.set_pc(regs.pc().wrapping_add(2));
        }
        self.regs = regs;
        Ok(())
    }

    fn execute_single_operand(
        &mut self,
        bus: &mut dyn Bus,
        fetched: Fetched,
        opcode: Opcode,
        reg: u8,
        ad_bits: u8,
        width: Width,
    ) -> SimResult<()> {
        if opcode != Opcode::Call {
            return Err(fetched.unimplemented(opcode));
        }

        let mut resolver = OperandResolver::new(&*bus, self.regs);
        let operand = resolver.source(reg, ad_bits, width)?;
        let target = resolver.load(&operand, Width::Word)?;
        let mut regs = resolver.into_registers();
        self.last_constant = operand.constant();

        let return_addr = regs.pc().wrapping_add(2);
        let sp = regs.sp().wrapping_sub(2);
        bus.write_u16(sp, return_addr)?;
        regs.set_sp(sp);
        regs.set_pc(target);

        tracing::trace!(
            "CALL {:#06x}, return address {:#06x} pushed at {:#06x}",
            target,
            return_addr,
            sp
        );
        self.regs = regs;
        Ok(())
    }

    fn execute_jump(&mut self, fetched: Fetched, opcode: Opcode, offset: i16) -> SimResult<()> {
        let taken = match opcode {
            Opcode::Jmp => true,
            Opcode::Jeq => self.regs.flag(StatusFlags::ZERO),
            other => return Err(fetched.unimplemented(other)),
        };

        if taken {
            let target = jump_target(fetched.pc, offset);
            tracing::trace!("{} taken to {:#06x}", opcode, target);
            self.regs.set_pc(target);
        } else {
            self.regs.set_pc(fetched.pc.wrapping_add(2));
        }
        Ok(())
    }
}

impl Cpu for Msp430 {
    fn reset(&mut self, bus: &mut dyn Bus) -> SimResult<()> {
        self.regs = RegisterFile::new();
        self.last_constant = None;
        let pc = bus.read_u16(RESET_VECTOR)?;
        self.regs.set_pc(pc);
        tracing::info!("Reset: PC={:#06x}", pc);
        Ok(())
    }

    fn step(
        &mut self,
        bus: &mut dyn Bus,
        observers: &[Arc<dyn SimulationObserver>],
    ) -> SimResult<()> {
        self.last_constant = None;
        let fetched = self.fetch(&*bus)?;

        for observer in observers {
            observer.on_step_start(fetched.pc, fetched.word);
        }

        if self.config.trace_disassembly {
            if let Ok(dis) = disasm::disassemble(&*bus, &self.regs, fetched.pc) {
                tracing::debug!("{}", dis);
            }
        }

        let instruction = self.decode(fetched)?;
        let opcode = instruction.opcode();
        tracing::debug!(
            "PC={:#06x} word={:#06x} {:?}",
            fetched.pc,
            fetched.word,
            instruction
        );

        // Reject before any operand is resolved
        if !is_implemented(opcode) {
            return Err(fetched.unimplemented(opcode));
        }

        let result = match instruction {
            Instruction::TwoOperand {
                opcode,
                src,
                dst,
                as_bits,
                ad_bit,
                width,
            } => self.execute_two_operand(bus, fetched, opcode, src, dst, as_bits, ad_bit, width),
            Instruction::SingleOperand {
                opcode,
                reg,
                ad_bits,
                width,
            } => self.execute_single_operand(bus, fetched, opcode, reg, ad_bits, width),
            Instruction::Jump { opcode, offset } => self.execute_jump(fetched, opcode, offset),
        };

        if let Err(e) = result {
            tracing::warn!("Step at {:#06x} failed: {}", fetched.pc, e);
            return Err(e);
        }

        for observer in observers {
            observer.on_step_end(fetched.pc, opcode);
        }
        Ok(())
    }

    fn disassemble(&self, bus: &dyn Bus, addr: u16) -> SimResult<Disassembly> {
        disasm::disassemble(bus, &self.regs, addr)
    }

    fn set_pc(&mut self, val: u16) {
        self.regs.set_pc(val);
    }

    fn get_pc(&self) -> u16 {
        self.regs.pc()
    }

    fn set_sp(&mut self, val: u16) {
        self.regs.set_sp(val);
    }

    fn get_sp(&self) -> u16 {
        self.regs.sp()
    }

    fn get_register(&self, id: u8) -> u16 {
        self.regs.read(id)
    }

    fn set_register(&mut self, id: u8, val: u16) {
        self.regs.write(id, val);
    }

    fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            registers: self.regs.as_array().to_vec(),
            pc: self.regs.pc(),
            sp: self.regs.sp(),
            sr: self.regs.status().bits(),
        }
    }

    fn apply_snapshot(&mut self, snapshot: &CpuSnapshot) {
        for (i, &val) in snapshot.registers.iter().enumerate().take(REGISTER_COUNT) {
            self.regs.write(i as u8, val);
        }
        self.regs.set_pc(snapshot.pc);
        self.regs.set_sp(snapshot.sp);
        self.regs.set_status(StatusFlags::from_bits_retain(snapshot.sr));
    }

    fn get_register_names(&self) -> Vec<String> {
        (0..REGISTER_COUNT as u8)
            .map(|i| match i {
                3 => "CG2".to_string(),
                _ => register_name(i),
            })
            .collect()
    }
}
