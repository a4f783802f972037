use thiserror::Error;
use tracing::trace;

use crate::config::{self, FP, IP, MEMORY_SIZE, NUM_REGISTERS, RP, SP};
use crate::isa::Instruction;
use crate::loader::ProgramImage;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("invalid opcode: {opcode} at address {addr}")]
    InvalidOpcode { opcode: i32, addr: i32 },
    #[error("memory address {addr} out of range (instruction at {ip})")]
    AddressOutOfRange { addr: i32, ip: i32 },
    #[error("register index {index} out of range (instruction at {ip})")]
    BadRegister { index: i32, ip: i32 },
    #[error("division by zero (instruction at {ip})")]
    DivisionByZero { ip: i32 },
}

/// What a successful step asks of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// `OUT` executed; the value belongs on the program output channel.
    Output(i32),
    Halt,
}

pub(crate) fn checked_address(addr: i32, ip: i32) -> Result<usize, Fault> {
    match usize::try_from(addr) {
        Ok(index) if index < MEMORY_SIZE => Ok(index),
        _ => Err(Fault::AddressOutOfRange { addr, ip }),
    }
}

/// Register file plus memory: the complete machine snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processor {
    registers: [i32; NUM_REGISTERS],
    memory: [i32; MEMORY_SIZE],
}

impl Processor {
    pub fn new() -> Self {
        Processor {
            registers: [0; NUM_REGISTERS],
            memory: [0; MEMORY_SIZE],
        }
    }

    pub fn with_image(image: &ProgramImage) -> Self {
        let mut processor = Processor::new();
        processor.load(image);
        processor
    }

    /// Replaces the whole snapshot: image at address 0, zero fill after it,
    /// IP at 0 and an empty stack frame right after the code.
    pub fn load(&mut self, image: &ProgramImage) {
        let words = image.words();
        self.registers = [0; NUM_REGISTERS];
        self.memory = [0; MEMORY_SIZE];
        self.memory[..words.len()].copy_from_slice(words);

        let code_size = words.len() as i32;
        self.registers[IP] = 0;
        self.registers[FP] = code_size;
        self.registers[SP] = code_size;
    }

    pub fn ip(&self) -> i32 {
        self.registers[IP]
    }

    pub fn registers(&self) -> &[i32; NUM_REGISTERS] {
        &self.registers
    }

    pub fn memory(&self) -> &[i32; MEMORY_SIZE] {
        &self.memory
    }

    /// Executes exactly one instruction.
    ///
    /// A fault leaves registers and memory untouched, with IP still pointing
    /// at the offending instruction.
    pub fn step(&mut self) -> Result<Outcome, Fault> {
        let ip = self.registers[IP];
        let (instruction, length) = Instruction::decode(&self.memory, ip)?;
        trace!(ip, ?instruction, "step");

        let regs = &mut self.registers;
        let mut next = ip.wrapping_add(length);
        let mut outcome = Outcome::Continue;

        match instruction {
            Instruction::Movi { imm, rd } => regs[rd] = imm,
            Instruction::Mov { rs, rd } => regs[rd] = regs[rs],
            Instruction::Add { rs, rd } => regs[rd] = regs[rd].wrapping_add(regs[rs]),
            Instruction::Sub { rs, rd } => regs[rd] = regs[rd].wrapping_sub(regs[rs]),
            Instruction::Mul { rs, rd } => regs[rd] = regs[rd].wrapping_mul(regs[rs]),
            Instruction::Idiv { rs, rd } => {
                let divisor = regs[rs];
                if divisor == 0 {
                    return Err(Fault::DivisionByZero { ip });
                }
                regs[rd] = regs[rd].wrapping_div(divisor);
            }
            Instruction::Jmp { ra } => next = regs[ra],
            Instruction::Jnz { rs, ra } => {
                if regs[rs] != 0 {
                    next = regs[ra];
                }
            }
            Instruction::Out { rs } => outcome = Outcome::Output(regs[rs]),
            Instruction::Halt => return Ok(Outcome::Halt),
            Instruction::Ld { ra, rd } => {
                let addr = checked_address(regs[ra], ip)?;
                regs[rd] = self.memory[addr];
            }
            Instruction::St { ra, rs } => {
                let addr = checked_address(regs[ra], ip)?;
                self.memory[addr] = regs[rs];
            }
            Instruction::Jal { ra } => {
                regs[RP] = next;
                next = regs[ra];
            }
            Instruction::Ret => next = regs[RP],
            Instruction::Push { rs } => {
                let sp = regs[SP];
                let addr = checked_address(sp, ip)?;
                self.memory[addr] = regs[rs];
                regs[SP] = sp.wrapping_add(1);
            }
            Instruction::Pop { rd } => {
                let sp = regs[SP].wrapping_sub(1);
                let addr = checked_address(sp, ip)?;
                regs[SP] = sp;
                regs[rd] = self.memory[addr];
            }
            Instruction::Ldlo { imm, rd } => {
                let addr = checked_address(regs[FP].wrapping_add(imm), ip)?;
                regs[rd] = self.memory[addr];
            }
            Instruction::Stlo { imm, rs } => {
                let addr = checked_address(regs[FP].wrapping_add(imm), ip)?;
                self.memory[addr] = regs[rs];
            }
            Instruction::Invalid { tag } => {
                return Err(Fault::InvalidOpcode { opcode: tag, addr: ip });
            }
        }

        // Non-control writes to IP are superseded here
        regs[IP] = next;
        Ok(outcome)
    }
}

/// Register listing for status displays, e.g. `ip=3 r1=7 ... sp=12`.
pub fn format_registers(processor: &Processor) -> String {
    processor
        .registers()
        .iter()
        .enumerate()
        .map(|(index, value)| format!("{}={}", config::register_name(index), value))
        .collect::<Vec<_>>()
        .join(" ")
}
