//! Instruction encoding.
//!
//! Every instruction is an opcode word followed by zero to two operand
//! words. Operands are either immediates or register indices; memory is
//! only ever reached through the value held in a register.
//!
//! | tag | form            | words |
//! |-----|-----------------|-------|
//! | 1   | MOVI imm rd     | 3     |
//! | 2-6 | MOV/ADD/SUB/MUL/IDIV rs rd | 3 |
//! | 7   | JMP ra          | 2     |
//! | 8   | JNZ rs ra       | 3     |
//! | 9   | OUT rs          | 2     |
//! | 10  | HALT            | 1     |
//! | 11  | LD ra rd        | 3     |
//! | 12  | ST ra rs        | 3     |
//! | 13  | JAL ra          | 2     |
//! | 14  | RET             | 1     |
//! | 15  | PUSH rs         | 2     |
//! | 16  | POP rd          | 2     |
//! | 17  | LDLO imm rd     | 3     |
//! | 18  | STLO imm rs     | 3     |

use crate::config;
use crate::processor::{checked_address, Fault};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Movi { imm: i32, rd: usize },
    Mov { rs: usize, rd: usize },
    Add { rs: usize, rd: usize },
    Sub { rs: usize, rd: usize },
    Mul { rs: usize, rd: usize },
    Idiv { rs: usize, rd: usize },
    Jmp { ra: usize },
    Jnz { rs: usize, ra: usize },
    Out { rs: usize },
    Halt,
    Ld { ra: usize, rd: usize },
    St { ra: usize, rs: usize },
    Jal { ra: usize },
    Ret,
    Push { rs: usize },
    Pop { rd: usize },
    Ldlo { imm: i32, rd: usize },
    Stlo { imm: i32, rs: usize },
    /// Tag outside 1-18. Carried through decode so execution reports it.
    Invalid { tag: i32 },
}

impl Instruction {
    /// Decodes the instruction at `ip`, returning it with its length in words.
    ///
    /// Every operand fetch is bounds-checked and every register operand must
    /// name one of the 32 registers. Nothing is written.
    pub fn decode(memory: &[i32], ip: i32) -> Result<(Instruction, i32), Fault> {
        let word = |offset: i32| -> Result<i32, Fault> {
            let addr = checked_address(ip.wrapping_add(offset), ip)?;
            Ok(memory[addr])
        };
        let reg = |offset: i32| -> Result<usize, Fault> {
            let index = word(offset)?;
            register_index(index, ip)
        };

        let decoded = match word(0)? {
            1 => (Instruction::Movi { imm: word(1)?, rd: reg(2)? }, 3),
            2 => (Instruction::Mov { rs: reg(1)?, rd: reg(2)? }, 3),
            3 => (Instruction::Add { rs: reg(1)?, rd: reg(2)? }, 3),
            4 => (Instruction::Sub { rs: reg(1)?, rd: reg(2)? }, 3),
            5 => (Instruction::Mul { rs: reg(1)?, rd: reg(2)? }, 3),
            6 => (Instruction::Idiv { rs: reg(1)?, rd: reg(2)? }, 3),
            7 => (Instruction::Jmp { ra: reg(1)? }, 2),
            8 => (Instruction::Jnz { rs: reg(1)?, ra: reg(2)? }, 3),
            9 => (Instruction::Out { rs: reg(1)? }, 2),
            10 => (Instruction::Halt, 1),
            11 => (Instruction::Ld { ra: reg(1)?, rd: reg(2)? }, 3),
            12 => (Instruction::St { ra: reg(1)?, rs: reg(2)? }, 3),
            13 => (Instruction::Jal { ra: reg(1)? }, 2),
            14 => (Instruction::Ret, 1),
            15 => (Instruction::Push { rs: reg(1)? }, 2),
            16 => (Instruction::Pop { rd: reg(1)? }, 2),
            17 => (Instruction::Ldlo { imm: word(1)?, rd: reg(2)? }, 3),
            18 => (Instruction::Stlo { imm: word(1)?, rs: reg(2)? }, 3),
            tag => (Instruction::Invalid { tag }, 1),
        };
        Ok(decoded)
    }
}

fn register_index(index: i32, ip: i32) -> Result<usize, Fault> {
    match usize::try_from(index) {
        Ok(reg) if reg < config::NUM_REGISTERS => Ok(reg),
        _ => Err(Fault::BadRegister { index, ip }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with(words: &[i32]) -> Vec<i32> {
        let mut memory = vec![0; config::MEMORY_SIZE];
        memory[..words.len()].copy_from_slice(words);
        memory
    }

    #[test]
    fn test_decode_movi() {
        let memory = memory_with(&[1, -7, 3]);
        assert_eq!(Instruction::decode(&memory, 0), Ok((Instruction::Movi { imm: -7, rd: 3 }, 3)));
    }

    #[test]
    fn test_decode_lengths() {
        let memory = memory_with(&[10, 14, 7, 31, 9, 29]);
        assert_eq!(Instruction::decode(&memory, 0), Ok((Instruction::Halt, 1)));
        assert_eq!(Instruction::decode(&memory, 1), Ok((Instruction::Ret, 1)));
        assert_eq!(Instruction::decode(&memory, 2), Ok((Instruction::Jmp { ra: 31 }, 2)));
        assert_eq!(Instruction::decode(&memory, 4), Ok((Instruction::Out { rs: 29 }, 2)));
    }

    #[test]
    fn test_decode_stack_and_frame_forms() {
        let memory = memory_with(&[15, 4, 16, 5, 17, -2, 6, 18, 1, 7]);
        assert_eq!(Instruction::decode(&memory, 0), Ok((Instruction::Push { rs: 4 }, 2)));
        assert_eq!(Instruction::decode(&memory, 2), Ok((Instruction::Pop { rd: 5 }, 2)));
        assert_eq!(Instruction::decode(&memory, 4), Ok((Instruction::Ldlo { imm: -2, rd: 6 }, 3)));
        assert_eq!(Instruction::decode(&memory, 7), Ok((Instruction::Stlo { imm: 1, rs: 7 }, 3)));
    }

    #[test]
    fn test_decode_invalid_tag() {
        let memory = memory_with(&[10, 99]);
        assert_eq!(Instruction::decode(&memory, 1), Ok((Instruction::Invalid { tag: 99 }, 1)));
        let memory = memory_with(&[0]);
        assert_eq!(Instruction::decode(&memory, 0), Ok((Instruction::Invalid { tag: 0 }, 1)));
    }

    #[test]
    fn test_decode_bad_register() {
        let memory = memory_with(&[2, 1, 32]);
        assert_eq!(Instruction::decode(&memory, 0), Err(Fault::BadRegister { index: 32, ip: 0 }));
        let memory = memory_with(&[9, -1]);
        assert_eq!(Instruction::decode(&memory, 0), Err(Fault::BadRegister { index: -1, ip: 0 }));
    }

    #[test]
    fn test_decode_operand_past_end_of_memory() {
        let mut memory = memory_with(&[]);
        let last = (config::MEMORY_SIZE - 1) as i32;
        memory[config::MEMORY_SIZE - 1] = 1; // MOVI with no room for operands
        assert_eq!(
            Instruction::decode(&memory, last),
            Err(Fault::AddressOutOfRange { addr: last + 1, ip: last })
        );
    }

    #[test]
    fn test_decode_ip_out_of_range() {
        let memory = memory_with(&[]);
        assert_eq!(Instruction::decode(&memory, -1), Err(Fault::AddressOutOfRange { addr: -1, ip: -1 }));
        assert_eq!(Instruction::decode(&memory, 500), Err(Fault::AddressOutOfRange { addr: 500, ip: 500 }));
    }
}
