// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{Bus, MemoryWriteHook};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Size of the flat address space in bytes.
pub const MEMORY_SIZE: usize = 0x1_0000;
/// Highest address of the peripheral-mapped I/O region.
pub const PERIPHERAL_LIMIT: u16 = 0x01FF;
/// Address of the word holding the initial program counter.
pub const RESET_VECTOR: u16 = 0xFFFE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start_addr: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramImage {
    pub entry_point: u16,
    pub segments: Vec<Segment>,
}

impl ProgramImage {
    pub fn new(entry_point: u16) -> Self {
        Self {
            entry_point,
            segments: Vec::new(),
        }
    }

    /// Wrap a raw binary blob that should be placed at `base`.
    pub fn from_raw(base: u16, data: Vec<u8>) -> Self {
        let mut image = Self::new(base);
        image.add_segment(base, data);
        image
    }

    pub fn add_segment(&mut self, start_addr: u16, data: Vec<u8>) {
        self.segments.push(Segment { start_addr, data });
    }
}

#[derive(Debug)]
pub struct HookEntry {
    pub name: String,
    pub range: RangeInclusive<u16>,
    pub hook: Box<dyn MemoryWriteHook>,
}

/// 64 KiB byte-addressable store shared by code and data.
pub struct Memory {
    data: Box<[u8]>,
    hooks: Vec<HookEntry>,
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("size", &self.data.len())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Self {
            data: vec![0; MEMORY_SIZE].into_boxed_slice(),
            hooks: Vec::new(),
        }
    }

    /// Register a write side channel for every byte stored inside `range`.
    pub fn attach_hook(
        &mut self,
        name: impl Into<String>,
        range: RangeInclusive<u16>,
        hook: Box<dyn MemoryWriteHook>,
    ) {
        self.hooks.push(HookEntry {
            name: name.into(),
            range,
            hook,
        });
    }

    pub fn hook<T: 'static>(&self, name: &str) -> Option<&T> {
        self.hooks
            .iter()
            .find(|entry| entry.name == name)
            .and_then(|entry| entry.hook.as_any())
            .and_then(|any| any.downcast_ref::<T>())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Copy a loadable segment into place. Segments that would run past the
    /// top of the address space are rejected without writing anything.
    pub fn load_from_segment(&mut self, segment: &Segment) -> bool {
        let start = segment.start_addr as usize;
        let end = start + segment.data.len();
        if end > MEMORY_SIZE {
            return false;
        }

        self.data[start..end].copy_from_slice(&segment.data);
        tracing::debug!(
            "Loaded {} bytes at {:#06x}",
            segment.data.len(),
            segment.start_addr
        );
        true
    }
}

impl Bus for Memory {
    fn read_u8(&self, addr: u16) -> u8 {
        self.data[addr as usize]
    }

    fn write_u8(&mut self, addr: u16, value: u8) {
        self.data[addr as usize] = value;
        for entry in &mut self.hooks {
            if entry.range.contains(&addr) {
                entry.hook.on_write(addr, value);
            }
        }
    }
}
