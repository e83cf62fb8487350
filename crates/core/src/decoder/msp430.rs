// MSP430Sim - Instruction Set Simulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::fmt;

/// MSP430 base instruction set mnemonics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    // Two-operand (Format I)
    Mov,
    Add,
    Addc,
    Subc,
    Sub,
    Cmp,
    Dadd,
    Bit,
    Bic,
    Bis,
    Xor,
    And,
    // Single-operand (Format II)
    Rrc,
    Swpb,
    Rra,
    Sxt,
    Push,
    Call,
    Reti,
    // Conditional jumps
    Jne,
    Jeq,
    Jnc,
    Jc,
    Jn,
    Jge,
    Jl,
    Jmp,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Mov => "MOV",
            Opcode::Add => "ADD",
            Opcode::Addc => "ADDC",
            Opcode::Subc => "SUBC",
            Opcode::Sub => "SUB",
            Opcode::Cmp => "CMP",
            Opcode::Dadd => "DADD",
            Opcode::Bit => "BIT",
            Opcode::Bic => "BIC",
            Opcode::Bis => "BIS",
            Opcode::Xor => "XOR",
            Opcode::And => "AND",
            Opcode::Rrc => "RRC",
            Opcode::Swpb => "SWPB",
            Opcode::Rra => "RRA",
            Opcode::Sxt => "SXT",
            Opcode::Push => "PUSH",
            Opcode::Call => "CALL",
            Opcode::Reti => "RETI",
            Opcode::Jne => "JNE",
            Opcode::Jeq => "JEQ",
            Opcode::Jnc => "JNC",
            Opcode::Jc => "JC",
            Opcode::Jn => "JN",
            Opcode::Jge => "JGE",
            Opcode::Jl => "JL",
            Opcode::Jmp => "JMP",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    TwoOperand,
    SingleOperand,
    Jump,
}

/// Operation width selected by the B/W bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Width {
    #[default]
    Word,
    Byte,
}

impl Width {
    fn from_bit(bit: u16) -> Self {
        if bit & 1 == 1 {
            Width::Byte
        } else {
            Width::Word
        }
    }

    pub fn mask(self) -> u16 {
        match self {
            Width::Word => 0xFFFF,
            Width::Byte => 0x00FF,
        }
    }

    pub fn sign_bit(self) -> u16 {
        match self {
            Width::Word => 0x8000,
            Width::Byte => 0x0080,
        }
    }

    /// Step applied to a register by the autoincrement mode.
    pub fn increment(self) -> u16 {
        match self {
            Width::Word => 2,
            Width::Byte => 1,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Width::Word => "",
            Width::Byte => ".B",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// `opcode[15:12] src[11:8] Ad[7] B/W[6] As[5:4] dst[3:0]`
    TwoOperand {
        opcode: Opcode,
        src: u8,
        dst: u8,
        as_bits: u8,
        ad_bit: u8,
        width: Width,
    },
    /// `opcode[15:7] B/W[6] Ad[5:4] reg[3:0]`
    SingleOperand {
        opcode: Opcode,
        reg: u8,
        ad_bits: u8,
        width: Width,
    },
    /// `001[15:13] cond[12:10] offset[9:0]`, offset counted in words
    Jump { opcode: Opcode, offset: i16 },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match *self {
            Instruction::TwoOperand { opcode, .. }
            | Instruction::SingleOperand { opcode, .. }
            | Instruction::Jump { opcode, .. } => opcode,
        }
    }

    pub fn format(&self) -> Format {
        match self {
            Instruction::TwoOperand { .. } => Format::TwoOperand,
            Instruction::SingleOperand { .. } => Format::SingleOperand,
            Instruction::Jump { .. } => Format::Jump,
        }
    }

    pub fn width(&self) -> Width {
        match *self {
            Instruction::TwoOperand { width, .. } | Instruction::SingleOperand { width, .. } => {
                width
            }
            Instruction::Jump { .. } => Width::Word,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Undefined opcode {0:#06x}")]
    UndefinedOpcode(u16),
}

pub fn decode(word: u16) -> Result<Instruction, DecodeError> {
    let nibble = word >> 12;

    match nibble {
        0x4..=0xF => {
            let opcode = match nibble {
                0x4 => Opcode::Mov,
                0x5 => Opcode::Add,
                0x6 => Opcode::Addc,
                0x7 => Opcode::Subc,
                0x8 => Opcode::Sub,
                0x9 => Opcode::Cmp,
                0xA => Opcode::Dadd,
                0xB => Opcode::Bit,
                0xC => Opcode::Bic,
                0xD => Opcode::Bis,
                0xE => Opcode::Xor,
                _ => Opcode::And,
            };
            Ok(Instruction::TwoOperand {
                opcode,
                src: ((word >> 8) & 0xF) as u8,
                dst: (word & 0xF) as u8,
                as_bits: ((word >> 4) & 0x3) as u8,
                ad_bit: ((word >> 7) & 0x1) as u8,
                width: Width::from_bit(word >> 6),
            })
        }
        0x1 => {
            // Seven 0x080-wide slots; everything above RETI is unassigned
            let opcode = match word & 0x0FFF {
                0x000..=0x07F => Opcode::Rrc,
                0x080..=0x0FF => Opcode::Swpb,
                0x100..=0x17F => Opcode::Rra,
                0x180..=0x1FF => Opcode::Sxt,
                0x200..=0x27F => Opcode::Push,
                0x280..=0x2FF => Opcode::Call,
                0x300..=0x37F => Opcode::Reti,
                _ => return Err(DecodeError::UndefinedOpcode(word)),
            };
            Ok(Instruction::SingleOperand {
                opcode,
                reg: (word & 0xF) as u8,
                ad_bits: ((word >> 4) & 0x3) as u8,
                width: Width::from_bit(word >> 6),
            })
        }
        0x2 | 0x3 => {
            let high = word & 0x0800 != 0;
            let low = word & 0x0400 != 0;
            let opcode = match (nibble, high, low) {
                (0x2, true, true) => Opcode::Jc,
                (0x2, true, false) => Opcode::Jnc,
                (0x2, false, true) => Opcode::Jeq,
                (0x2, false, false) => Opcode::Jne,
                (_, true, true) => Opcode::Jmp,
                (_, true, false) => Opcode::Jl,
                (_, false, true) => Opcode::Jge,
                (_, false, false) => Opcode::Jn,
            };
            // Sign-extend the 10-bit word offset
            let offset = (((word & 0x03FF) << 6) as i16) >> 6;
            Ok(Instruction::Jump { opcode, offset })
        }
        _ => Err(DecodeError::UndefinedOpcode(word)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_two_operand_fields() {
        // ADD.B @R4+, 0x0020(R5)
        let instr = decode(0x54F5).unwrap();
        assert_eq!(
            instr,
            Instruction::TwoOperand {
                opcode: Opcode::Add,
                src: 4,
                dst: 5,
                as_bits: 0b11,
                ad_bit: 1,
                width: Width::Byte,
            }
        );
        assert_eq!(instr.format(), Format::TwoOperand);
    }

    #[test]
    fn test_decode_every_two_operand_nibble() {
        let expected = [
            Opcode::Mov,
            Opcode::Add,
            Opcode::Addc,
            Opcode::Subc,
            Opcode::Sub,
            Opcode::Cmp,
            Opcode::Dadd,
            Opcode::Bit,
            Opcode::Bic,
            Opcode::Bis,
            Opcode::Xor,
            Opcode::And,
        ];
        for (i, opcode) in expected.iter().enumerate() {
            let word = ((i as u16) + 4) << 12 | 0x0405;
            assert_eq!(decode(word).unwrap().opcode(), *opcode);
        }
    }

    #[test]
    fn test_decode_single_operand_ranges() {
        let cases = [
            (0x1004, Opcode::Rrc),
            (0x1084, Opcode::Swpb),
            (0x1104, Opcode::Rra),
            (0x1184, Opcode::Sxt),
            (0x1204, Opcode::Push),
            (0x1284, Opcode::Call),
            (0x12B0, Opcode::Call),
            (0x1300, Opcode::Reti),
        ];
        for (word, opcode) in cases {
            assert_eq!(decode(word).unwrap().opcode(), opcode, "{:#06x}", word);
        }

        assert_eq!(
            decode(0x12B0).unwrap(),
            Instruction::SingleOperand {
                opcode: Opcode::Call,
                reg: 0,
                ad_bits: 0b11,
                width: Width::Word,
            }
        );
    }

    #[test]
    fn test_decode_single_operand_gap_is_undefined() {
        assert_eq!(decode(0x1380), Err(DecodeError::UndefinedOpcode(0x1380)));
        assert_eq!(decode(0x1FFF), Err(DecodeError::UndefinedOpcode(0x1FFF)));
    }

    #[test]
    fn test_decode_jump_conditions() {
        let cases = [
            (0x2000, Opcode::Jne),
            (0x2400, Opcode::Jeq),
            (0x2800, Opcode::Jnc),
            (0x2C00, Opcode::Jc),
            (0x3000, Opcode::Jn),
            (0x3400, Opcode::Jge),
            (0x3800, Opcode::Jl),
            (0x3C00, Opcode::Jmp),
        ];
        for (word, opcode) in cases {
            assert_eq!(decode(word).unwrap().opcode(), opcode, "{:#06x}", word);
        }
    }

    #[test]
    fn test_decode_jump_offset_sign_extension() {
        assert_eq!(
            decode(0x3FFF).unwrap(),
            Instruction::Jump {
                opcode: Opcode::Jmp,
                offset: -1
            }
        );
        assert_eq!(
            decode(0x3DFF).unwrap(),
            Instruction::Jump {
                opcode: Opcode::Jmp,
                offset: 511
            }
        );
        assert_eq!(
            decode(0x2600).unwrap(),
            Instruction::Jump {
                opcode: Opcode::Jeq,
                offset: -512
            }
        );
    }

    #[test]
    fn test_decode_top_nibble_zero_is_undefined() {
        for word in [0x0000, 0x0123, 0x0FFF] {
            assert_eq!(decode(word), Err(DecodeError::UndefinedOpcode(word)));
        }
    }

    #[test]
    fn test_width_helpers() {
        assert_eq!(Width::Byte.mask(), 0xFF);
        assert_eq!(Width::Word.sign_bit(), 0x8000);
        assert_eq!(Width::Byte.increment(), 1);
        assert_eq!(Width::Word.increment(), 2);
    }
}
