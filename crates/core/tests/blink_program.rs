// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use msp430sim_core::memory::ProgramImage;
use msp430sim_core::metrics::PerformanceMetrics;
use msp430sim_core::peripherals::Port1Monitor;
use msp430sim_core::{DebugControl, Machine, Memory, Msp430, Opcode, StopReason};
use std::sync::Arc;

const DONE: u16 = 0xF818;

/// Toggles P1.0 five times through a subroutine, then parks on `JMP $`.
fn blink_image() -> ProgramImage {
    let main: [u16; 13] = [
        0x4031, 0x0400, // MOV #0x0400, SP
        0x4304, // MOV #0, R4
        0xD3D2, 0x0022, // BIS.B #1, &P1DIR
        0x12B0, 0xF820, // loop: CALL #toggle
        0x5314, // ADD #1, R4
        0x9034, 0x0005, // CMP #5, R4
        0x2401, // JEQ done
        0x3FF9, // JMP loop
        0x3FFF, // done: JMP $
    ];
    let toggle: [u16; 3] = [
        0xE3D2, 0x0021, // XOR.B #1, &P1OUT
        0x4130, // RET
    ];

    let bytes = |words: &[u16]| -> Vec<u8> { words.iter().flat_map(|w| w.to_le_bytes()).collect() };

    let mut image = ProgramImage::new(0xF800);
    image.add_segment(0xF800, bytes(&main));
    image.add_segment(0xF820, bytes(&toggle));
    image.add_segment(0xFFFE, vec![0x00, 0xF8]);
    image
}

fn blink_machine() -> Machine<Msp430> {
    let mut bus = Memory::new();
    bus.attach_hook("port1", Port1Monitor::range(), Box::new(Port1Monitor::new()));
    let mut machine = Machine::new(Msp430::new(), bus);
    machine.load_firmware(&blink_image()).unwrap();
    machine
}

#[test]
fn test_blink_runs_to_completion() {
    let mut machine = blink_machine();
    machine.add_breakpoint(DONE);

    let reason = machine.run(Some(1_000)).unwrap();

    assert_eq!(reason, StopReason::Breakpoint(DONE));
    assert_eq!(machine.read_core_reg(4), 5);
    assert_eq!(machine.get_sp(), 0x0400);
    assert_eq!(machine.read_byte(0x0022), 0x01);

    let port = machine.peek_hook::<Port1Monitor>("port1").unwrap();
    assert_eq!(port.history(), &[1, 0, 1, 0, 1]);
    assert!(port.pin_driven_high(0));
}

#[test]
fn test_blink_instruction_mix() {
    let metrics = Arc::new(PerformanceMetrics::new());
    let mut machine = blink_machine();
    machine.observers.push(metrics.clone());
    machine.add_breakpoint(DONE);

    machine.run(Some(1_000)).unwrap();

    // Prologue of 3, then 5 iterations of CALL/XOR/RET/ADD/CMP/JEQ plus 4 back jumps
    assert_eq!(machine.get_step_count(), 3 + 5 * 6 + 4);
    assert_eq!(metrics.get_opcode_count(Opcode::Call), 5);
    assert_eq!(metrics.get_opcode_count(Opcode::Xor), 5);
    assert_eq!(metrics.get_opcode_count(Opcode::Jeq), 5);
    assert_eq!(metrics.get_opcode_count(Opcode::Jmp), 4);
    // MOV covers the two prologue moves and every RET
    assert_eq!(metrics.get_opcode_count(Opcode::Mov), 2 + 5);
}

#[test]
fn test_listing_walks_the_program() {
    let machine = blink_machine();
    let mut addr = 0xF800;
    let mut lines = Vec::new();
    while addr < DONE + 2 {
        let dis = machine.disassemble(addr).unwrap();
        addr = dis.next_address();
        lines.push(dis.text);
    }

    assert_eq!(
        lines,
        vec![
            "MOV #0x0400, SP",
            "MOV #0, R4",
            "BIS.B #1, &0x0022",
            "CALL #0xf820",
            "ADD #1, R4",
            "CMP #0x0005, R4",
            "JEQ 0xf818",
            "JMP 0xf80a",
            "JMP 0xf818",
        ]
    );
    assert_eq!(machine.get_pc(), 0xF800);
}
