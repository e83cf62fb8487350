// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod config;
pub mod cpu;
pub mod decoder;
pub mod memory;
pub mod metrics;
pub mod peripherals;
pub mod snapshot;

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

pub use config::SimulationConfig;
pub use cpu::{Disassembly, Msp430};
pub use decoder::Opcode;
pub use memory::Memory;


#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("Undefined opcode {word:#06x} at {pc:#06x}")]
    UndefinedOpcode { pc: u16, word: u16 },
    #[error("Unimplemented opcode {opcode} ({word:#06x}) at {pc:#06x}")]
    UnimplementedOpcode { pc: u16, word: u16, opcode: Opcode },
    #[error("Unaligned word access at {addr:#06x}")]
    AlignmentFault { addr: u16 },
    #[error("Instruction fetch from peripheral address space at {pc:#06x}")]
    PeripheralFetchFault { pc: u16 },
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait for observing simulation events in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self) {}
    fn on_simulation_stop(&self) {}
    fn on_step_start(&self, _pc: u16, _word: u16) {}
    fn on_step_end(&self, _pc: u16, _opcode: Opcode) {}
}

/// Trait representing a CPU architecture
pub trait Cpu: Send {
    fn reset(&mut self, bus: &mut dyn Bus) -> SimResult<()>;
    fn step(
        &mut self,
        bus: &mut dyn Bus,
        observers: &[Arc<dyn SimulationObserver>],
    ) -> SimResult<()>;
    /// Decode the instruction at `addr` for display. Never commits state.
    fn disassemble(&self, bus: &dyn Bus, addr: u16) -> SimResult<Disassembly>;
    fn set_pc(&mut self, val: u16);
    fn get_pc(&self) -> u16;
    fn set_sp(&mut self, val: u16);
    fn get_sp(&self) -> u16;

    // Debug Access
    fn get_register(&self, id: u8) -> u16;
    fn set_register(&mut self, id: u8, val: u16);
    fn snapshot(&self) -> snapshot::CpuSnapshot;
    fn apply_snapshot(&mut self, snapshot: &snapshot::CpuSnapshot);
    fn get_register_names(&self) -> Vec<String>;
}

/// Side channel notified after a byte lands in a watched address range.
pub trait MemoryWriteHook: std::fmt::Debug + Send {
    fn on_write(&mut self, addr: u16, value: u8);
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
}

/// Trait representing the 16-bit data bus
pub trait Bus {
    fn read_u8(&self, addr: u16) -> u8;
    fn write_u8(&mut self, addr: u16, value: u8);

    fn read_u16(&self, addr: u16) -> SimResult<u16> {
        if addr & 1 != 0 {
            return Err(SimulationError::AlignmentFault { addr });
        }
        let lo = self.read_u8(addr) as u16;
        let hi = self.read_u8(addr + 1) as u16;
        // Little Endian
        Ok(lo | (hi << 8))
    }

    fn write_u16(&mut self, addr: u16, value: u16) -> SimResult<()> {
        if addr & 1 != 0 {
            return Err(SimulationError::AlignmentFault { addr });
        }
        self.write_u8(addr, (value & 0xFF) as u8);
        self.write_u8(addr + 1, (value >> 8) as u8);
        Ok(())
    }
}

/// Trait for controlling the machine in debug mode
pub trait DebugControl {
    fn add_breakpoint(&mut self, addr: u16);
    fn remove_breakpoint(&mut self, addr: u16);
    fn clear_breakpoints(&mut self);

    /// Run until breakpoint or steps limit
    fn run(&mut self, max_steps: Option<u64>) -> SimResult<StopReason>;

    /// Step a single instruction
    fn step_single(&mut self) -> SimResult<StopReason>;

    fn read_core_reg(&self, id: u8) -> u16;
    fn write_core_reg(&mut self, id: u8, val: u16);

    fn read_memory(&self, addr: u16, len: usize) -> Vec<u8>;
    fn write_memory(&mut self, addr: u16, data: &[u8]);
    fn read_byte(&self, addr: u16) -> u8;
    fn read_word(&self, addr: u16) -> SimResult<u16>;

    fn get_pc(&self) -> u16;
    fn set_pc(&mut self, addr: u16);
    fn get_sp(&self) -> u16;
    fn reset_vector(&self) -> SimResult<u16>;
    fn get_register_names(&self) -> Vec<String>;
    fn get_step_count(&self) -> u64;
    fn reset(&mut self) -> SimResult<()>;
    fn disassemble(&self, addr: u16) -> SimResult<Disassembly>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    Breakpoint(u16),
    StepDone,
    MaxStepsReached,
}

pub struct Machine<C: Cpu> {
    pub cpu: C,
    pub bus: Memory,
    pub observers: Vec<Arc<dyn SimulationObserver>>,

    // Debug state
    pub breakpoints: HashSet<u16>,
    pub total_steps: u64,
}

impl<C: Cpu> Machine<C> {
    pub fn new(cpu: C, bus: Memory) -> Self {
        Self {
            cpu,
            bus,
            observers: Vec::new(),
            breakpoints: HashSet::new(),
            total_steps: 0,
        }
    }

    pub fn load_firmware(&mut self, image: &memory::ProgramImage) -> SimResult<()> {
        for segment in &image.segments {
            if !self.bus.load_from_segment(segment) {
                tracing::warn!(
                    "Failed to load segment at {:#06x} ({} bytes) - outside of address space",
                    segment.start_addr,
                    segment.data.len()
                );
            }
        }

        for observer in &self.observers {
            observer.on_simulation_start();
        }
        self.reset()?;

        // Fallback if the reset vector was never programmed
        if self.cpu.get_pc() == 0 && image.entry_point != 0 {
            tracing::warn!(
                "Reset vector is empty, starting at ELF entry point {:#06x}",
                image.entry_point
            );
            self.cpu.set_pc(image.entry_point);
        }

        Ok(())
    }

    pub fn reset(&mut self) -> SimResult<()> {
        self.cpu.reset(&mut self.bus)
    }

    pub fn step(&mut self) -> SimResult<()> {
        let res = self.cpu.step(&mut self.bus, &self.observers);
        if res.is_ok() {
            self.total_steps += 1;
        }
        res
    }

    pub fn stop(&self) {
        for observer in &self.observers {
            observer.on_simulation_stop();
        }
    }

    pub fn snapshot(&self) -> snapshot::MachineSnapshot {
        snapshot::MachineSnapshot {
            cpu: self.cpu.snapshot(),
            steps: self.total_steps,
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &snapshot::MachineSnapshot) {
        self.cpu.apply_snapshot(&snapshot.cpu);
        self.total_steps = snapshot.steps;
    }

    pub fn peek_hook<T: 'static>(&self, name: &str) -> Option<&T> {
        self.bus.hook::<T>(name)
    }
}

impl<C: Cpu> DebugControl for Machine<C> {
    fn add_breakpoint(&mut self, addr: u16) {
        self.breakpoints.insert(addr);
    }

    fn remove_breakpoint(&mut self, addr: u16) {
        self.breakpoints.remove(&addr);
    }

    fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    fn run(&mut self, max_steps: Option<u64>) -> SimResult<StopReason> {
        let mut steps = 0;
        loop {
            // A breakpoint at the current PC only stops us once we have moved
            // away from it, so resuming from a hit makes progress.
            let pc = self.cpu.get_pc();
            if steps > 0 && self.breakpoints.contains(&pc) {
                return Ok(StopReason::Breakpoint(pc));
            }

            if let Some(max) = max_steps {
                if steps >= max {
                    return Ok(StopReason::MaxStepsReached);
                }
            }

            self.step()?;
            steps += 1;
        }
    }

    fn step_single(&mut self) -> SimResult<StopReason> {
        self.step()?;
        Ok(StopReason::StepDone)
    }

    fn read_core_reg(&self, id: u8) -> u16 {
        self.cpu.get_register(id)
    }

    fn write_core_reg(&mut self, id: u8, val: u16) {
        self.cpu.set_register(id, val);
    }

    fn read_memory(&self, addr: u16, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.bus.read_u8(addr.wrapping_add(i as u16)))
            .collect()
    }

    fn write_memory(&mut self, addr: u16, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.bus.write_u8(addr.wrapping_add(i as u16), *byte);
        }
    }

    fn read_byte(&self, addr: u16) -> u8 {
        self.bus.read_u8(addr)
    }

    fn read_word(&self, addr: u16) -> SimResult<u16> {
        self.bus.read_u16(addr)
    }

    fn get_pc(&self) -> u16 {
        self.cpu.get_pc()
    }

    fn set_pc(&mut self, addr: u16) {
        self.cpu.set_pc(addr);
    }

    fn get_sp(&self) -> u16 {
        self.cpu.get_sp()
    }

    fn reset_vector(&self) -> SimResult<u16> {
        self.bus.read_u16(memory::RESET_VECTOR)
    }

    fn get_register_names(&self) -> Vec<String> {
        self.cpu.get_register_names()
    }

    fn get_step_count(&self) -> u64 {
        self.total_steps
    }

    fn reset(&mut self) -> SimResult<()> {
        self.cpu.reset(&mut self.bus)
    }

    fn disassemble(&self, addr: u16) -> SimResult<Disassembly> {
        self.cpu.disassemble(&self.bus, addr)
    }
}
