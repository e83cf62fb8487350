// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{anyhow, bail, Context, Result};
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::sym::{STT_FUNC, STT_NOTYPE, STT_OBJECT};
use goblin::elf::Elf;
use msp430sim_core::memory::{ProgramImage, MEMORY_SIZE};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// `e_machine` value assigned to the TI MSP430 family.
pub const EM_MSP430: u16 = 105;

pub fn load_elf(path: &Path) -> Result<ProgramImage> {
    let buffer = fs::read(path).with_context(|| format!("Failed to read ELF file: {:?}", path))?;
    load_elf_bytes(&buffer)
}

pub fn load_elf_bytes(buffer: &[u8]) -> Result<ProgramImage> {
    let elf = Elf::parse(buffer).context("Failed to parse ELF binary")?;

    info!("ELF Entry Point: {:#x}", elf.entry);

    if elf.header.e_machine != EM_MSP430 {
        warn!(
            "ELF machine type {} is not MSP430 ({}), loading anyway",
            elf.header.e_machine, EM_MSP430
        );
    }

    let entry = u16::try_from(elf.entry)
        .map_err(|_| anyhow!("Entry point {:#x} is outside the 16-bit address space", elf.entry))?;
    let mut program_image = ProgramImage::new(entry);

    for ph in &elf.program_headers {
        if ph.p_type != PT_LOAD || ph.p_filesz == 0 {
            continue;
        }

        // Load by physical address so initialised data lands in its flash image
        let start_addr = ph.p_paddr as usize;
        let size = ph.p_filesz as usize;
        let offset = ph.p_offset as usize;

        debug!(
            "Found Loadable Segment: Addr={:#06x}, Size={} bytes, Offset={:#x}",
            start_addr, size, offset
        );

        if offset.checked_add(size).map_or(true, |end| end > buffer.len()) {
            bail!("Segment at {:#x} is out of bounds in ELF file", start_addr);
        }
        if start_addr.checked_add(size).map_or(true, |end| end > MEMORY_SIZE) {
            bail!(
                "Segment at {:#x} ({} bytes) does not fit in the 64 KiB address space",
                start_addr,
                size
            );
        }

        program_image.add_segment(start_addr as u16, buffer[offset..offset + size].to_vec());
    }

    if program_image.segments.is_empty() {
        warn!("No loadable segments found in ELF file");
    }

    Ok(program_image)
}

/// Load a flat binary to be placed at `base`.
pub fn load_raw(path: &Path, base: u16) -> Result<ProgramImage> {
    let buffer = fs::read(path).with_context(|| format!("Failed to read binary: {:?}", path))?;
    load_raw_bytes(buffer, base)
}

pub fn load_raw_bytes(buffer: Vec<u8>, base: u16) -> Result<ProgramImage> {
    if base as usize + buffer.len() > MEMORY_SIZE {
        bail!(
            "Binary of {} bytes at {:#06x} does not fit in the 64 KiB address space",
            buffer.len(),
            base
        );
    }
    info!("Raw image: {} bytes at {:#06x}", buffer.len(), base);
    Ok(ProgramImage::from_raw(base, buffer))
}

/// Function and data labels from the ELF symbol table.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    by_name: HashMap<String, u16>,
    by_addr: BTreeMap<u16, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, addr: u16) {
        let name = name.into();
        // Keep the first label seen for an address
        self.by_addr.entry(addr).or_insert_with(|| name.clone());
        self.by_name.insert(name, addr);
    }

    pub fn address_of(&self, name: &str) -> Option<u16> {
        self.by_name.get(name).copied()
    }

    pub fn label_at(&self, addr: u16) -> Option<&str> {
        self.by_addr.get(&addr).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

pub fn load_symbols(path: &Path) -> Result<SymbolTable> {
    let buffer =
        fs::read(path).with_context(|| format!("Failed to read ELF for symbols: {:?}", path))?;
    load_symbols_bytes(&buffer)
}

pub fn load_symbols_bytes(buffer: &[u8]) -> Result<SymbolTable> {
    let elf = Elf::parse(buffer).context("Failed to parse ELF for symbols")?;
    let mut table = SymbolTable::new();

    for sym in elf.syms.iter() {
        if !matches!(sym.st_type(), STT_FUNC | STT_OBJECT | STT_NOTYPE) {
            continue;
        }
        let Some(name) = elf.strtab.get_at(sym.st_name) else {
            continue;
        };
        if name.is_empty() || name.starts_with('$') || name.starts_with(".L") {
            continue;
        }
        if let Ok(addr) = u16::try_from(sym.st_value) {
            table.insert(name, addr);
        }
    }

    debug!("Loaded {} symbols", table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal little-endian ELF32 executable with one program header per
    /// `(paddr, data)` pair and no section headers.
    fn build_elf(machine: u16, entry: u32, segments: &[(u32, &[u8])]) -> Vec<u8> {
        const EHSIZE: usize = 52;
        const PHENTSIZE: usize = 32;

        let mut out = Vec::new();
        out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0]);
        out.extend_from_slice(&[0; 8]);
        out.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        out.extend_from_slice(&machine.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&entry.to_le_bytes());
        out.extend_from_slice(&(EHSIZE as u32).to_le_bytes()); // e_phoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&(EHSIZE as u16).to_le_bytes());
        out.extend_from_slice(&(PHENTSIZE as u16).to_le_bytes());
        out.extend_from_slice(&(segments.len() as u16).to_le_bytes());
        out.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
        assert_eq!(out.len(), EHSIZE);

        let mut offset = EHSIZE + PHENTSIZE * segments.len();
        for (paddr, data) in segments {
            out.extend_from_slice(&PT_LOAD.to_le_bytes());
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            out.extend_from_slice(&paddr.to_le_bytes()); // p_vaddr
            out.extend_from_slice(&paddr.to_le_bytes()); // p_paddr
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&5u32.to_le_bytes()); // R+X
            out.extend_from_slice(&2u32.to_le_bytes());
            offset += data.len();
        }
        for (_, data) in segments {
            out.extend_from_slice(data);
        }
        out
    }

    #[test]
    fn test_load_segments_by_physical_address() {
        let code = [0x31, 0x40, 0x00, 0x04];
        let vector = [0x00, 0xF8];
        let elf = build_elf(EM_MSP430, 0xF800, &[(0xF800, &code), (0xFFFE, &vector)]);

        let image = load_elf_bytes(&elf).unwrap();

        assert_eq!(image.entry_point, 0xF800);
        assert_eq!(image.segments.len(), 2);
        assert_eq!(image.segments[0].start_addr, 0xF800);
        assert_eq!(image.segments[0].data, code);
        assert_eq!(image.segments[1].start_addr, 0xFFFE);
        assert_eq!(image.segments[1].data, vector);
    }

    #[test]
    fn test_empty_segments_are_skipped() {
        let elf = build_elf(EM_MSP430, 0xF800, &[(0x0200, &[]), (0xF800, &[0x03, 0x43])]);
        let image = load_elf_bytes(&elf).unwrap();
        assert_eq!(image.segments.len(), 1);
        assert_eq!(image.segments[0].start_addr, 0xF800);
    }

    #[test]
    fn test_foreign_machine_still_loads() {
        let elf = build_elf(40, 0xF800, &[(0xF800, &[0x03, 0x43])]);
        assert!(load_elf_bytes(&elf).is_ok());
    }

    #[test]
    fn test_segment_past_top_of_memory_is_rejected() {
        let elf = build_elf(EM_MSP430, 0xF800, &[(0xFFFE, &[1, 2, 3, 4])]);
        let err = load_elf_bytes(&elf).unwrap_err();
        assert!(err.to_string().contains("64 KiB"), "{}", err);
    }

    #[test]
    fn test_segment_at_huge_physical_address_is_rejected() {
        let elf = build_elf(EM_MSP430, 0xF800, &[(0xFFFF_FFFF, &[0x03, 0x43])]);
        let err = load_elf_bytes(&elf).unwrap_err();
        assert!(err.to_string().contains("64 KiB"), "{}", err);
    }

    #[test]
    fn test_truncated_segment_is_rejected() {
        let mut elf = build_elf(EM_MSP430, 0xF800, &[(0xF800, &[0x03, 0x43, 0x03, 0x43])]);
        elf.truncate(elf.len() - 2);
        assert!(load_elf_bytes(&elf).is_err());
    }

    #[test]
    fn test_garbage_is_not_elf() {
        assert!(load_elf_bytes(b"not an elf file at all").is_err());
    }

    #[test]
    fn test_raw_image() {
        let image = load_raw_bytes(vec![0xFF, 0x3F], 0xC000).unwrap();
        assert_eq!(image.entry_point, 0xC000);
        assert_eq!(image.segments[0].start_addr, 0xC000);

        assert!(load_raw_bytes(vec![0; 4], 0xFFFE).is_err());
    }

    #[test]
    fn test_symbols_without_symtab_is_empty() {
        let elf = build_elf(EM_MSP430, 0xF800, &[(0xF800, &[0x03, 0x43])]);
        let table = load_symbols_bytes(&elf).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_symbol_table_lookup() {
        let mut table = SymbolTable::new();
        table.insert("main", 0xF800);
        table.insert("_start", 0xF800);
        table.insert("toggle", 0xF820);

        assert_eq!(table.address_of("toggle"), Some(0xF820));
        assert_eq!(table.label_at(0xF800), Some("main"));
        assert_eq!(table.label_at(0xF802), None);
        assert_eq!(table.len(), 3);
    }
}
