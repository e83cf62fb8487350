// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::registers::StatusFlags;
use crate::decoder::Width;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluResult {
    pub value: u16,
    pub flags: StatusFlags,
}

fn sign(value: u16, width: Width) -> bool {
    value & width.sign_bit() != 0
}

fn zn(value: u16, width: Width) -> StatusFlags {
    let mut flags = StatusFlags::empty();
    flags.set(StatusFlags::ZERO, value == 0);
    flags.set(StatusFlags::NEGATIVE, sign(value, width));
    flags
}

/// `a + b + carry_in` at `width`, with carry out of the top bit and signed
/// overflow computed on the masked operands.
pub fn add(a: u16, b: u16, carry_in: bool, width: Width) -> AluResult {
    let mask = width.mask();
    let (a, b) = (a & mask, b & mask);
    let sum = a as u32 + b as u32 + carry_in as u32;
    let value = (sum & mask as u32) as u16;

    let mut flags = zn(value, width);
    flags.set(StatusFlags::CARRY, sum > mask as u32);
    flags.set(
        StatusFlags::OVERFLOW,
        sign(a, width) == sign(b, width) && sign(value, width) != sign(a, width),
    );
    AluResult { value, flags }
}

/// `dst - src` as `dst + !src + 1`; carry set means no borrow.
pub fn sub(dst: u16, src: u16, width: Width) -> AluResult {
    add(dst, !src, true, width)
}

/// Exclusive or: C = !Z, V = both operands negative.
pub fn xor(src: u16, dst: u16, width: Width) -> AluResult {
    let mask = width.mask();
    let value = (src ^ dst) & mask;
    let mut flags = zn(value, width);
    flags.set(StatusFlags::CARRY, value != 0);
    flags.set(StatusFlags::OVERFLOW, sign(src, width) && sign(dst, width));
    AluResult { value, flags }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has(result: &AluResult, flag: StatusFlags) -> bool {
        result.flags.contains(flag)
    }

    #[test]
    fn test_add_signed_overflow() {
        let r = add(0x7000, 0x1000, false, Width::Word);
        assert_eq!(r.value, 0x8000);
        assert!(!has(&r, StatusFlags::ZERO));
        assert!(has(&r, StatusFlags::NEGATIVE));
        assert!(has(&r, StatusFlags::OVERFLOW));
        assert!(!has(&r, StatusFlags::CARRY));
    }

    #[test]
    fn test_add_carry_out_to_zero() {
        let r = add(0xF000, 0x1000, false, Width::Word);
        assert_eq!(r.value, 0x0000);
        assert!(has(&r, StatusFlags::ZERO));
        assert!(has(&r, StatusFlags::CARRY));
        assert!(!has(&r, StatusFlags::OVERFLOW));
        assert!(!has(&r, StatusFlags::NEGATIVE));
    }

    #[test]
    fn test_add_byte_width_uses_low_byte() {
        // High bytes are ignored; 0x7F + 0x01 overflows a signed byte
        let r = add(0x127F, 0x3401, false, Width::Byte);
        assert_eq!(r.value, 0x0080);
        assert!(has(&r, StatusFlags::NEGATIVE));
        assert!(has(&r, StatusFlags::OVERFLOW));
        assert!(!has(&r, StatusFlags::CARRY));

        let r = add(0x00FF, 0x0001, false, Width::Byte);
        assert_eq!(r.value, 0);
        assert!(has(&r, StatusFlags::CARRY));
        assert!(has(&r, StatusFlags::ZERO));
    }

    #[test]
    fn test_sub_carry_means_no_borrow() {
        let r = sub(5, 3, Width::Word);
        assert_eq!(r.value, 2);
        assert!(has(&r, StatusFlags::CARRY));

        let r = sub(3, 5, Width::Word);
        assert_eq!(r.value, 0xFFFE);
        assert!(!has(&r, StatusFlags::CARRY));
        assert!(has(&r, StatusFlags::NEGATIVE));

        let r = sub(0x1234, 0, Width::Word);
        assert_eq!(r.value, 0x1234);
        assert!(has(&r, StatusFlags::CARRY));
    }

    #[test]
    fn test_sub_equal_operands_sets_zero() {
        let r = sub(0x4242, 0x4242, Width::Word);
        assert_eq!(r.value, 0);
        assert!(has(&r, StatusFlags::ZERO));
        assert!(has(&r, StatusFlags::CARRY));
        assert!(!has(&r, StatusFlags::OVERFLOW));
    }

    #[test]
    fn test_sub_overflow_with_most_negative_source() {
        // 0 - (-32768) does not fit in a signed word
        let r = sub(0x0000, 0x8000, Width::Word);
        assert_eq!(r.value, 0x8000);
        assert!(has(&r, StatusFlags::OVERFLOW));

        // -32768 - 1
        let r = sub(0x8000, 0x0001, Width::Word);
        assert_eq!(r.value, 0x7FFF);
        assert!(has(&r, StatusFlags::OVERFLOW));
        assert!(has(&r, StatusFlags::CARRY));
    }

    #[test]
    fn test_xor_flags() {
        let r = xor(0x8001, 0x8001, Width::Word);
        assert_eq!(r.value, 0);
        assert!(has(&r, StatusFlags::ZERO));
        assert!(!has(&r, StatusFlags::CARRY));
        assert!(has(&r, StatusFlags::OVERFLOW));

        let r = xor(0x00F0, 0x8000, Width::Word);
        assert_eq!(r.value, 0x80F0);
        assert!(has(&r, StatusFlags::NEGATIVE));
        assert!(has(&r, StatusFlags::CARRY));
        assert!(!has(&r, StatusFlags::OVERFLOW));
    }
}
