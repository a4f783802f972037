use thiserror::Error;

use crate::config::{FP, IP, MEMORY_SIZE, NUM_REGISTERS, RP, SP};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("address argument is required")]
    Missing,
    #[error("bad address: `{0}'")]
    Malformed(String),
    #[error("address {0} out of range")]
    OutOfRange(String),
}

/// Maps `ip`/`rp`/`fp`/`sp` or `rN` (case-insensitive, N < 32) to a register index.
pub fn resolve_register(token: &str) -> Option<usize> {
    let token = token.trim();
    let special = [("ip", IP), ("rp", RP), ("fp", FP), ("sp", SP)];
    if let Some(&(_, index)) = special.iter().find(|(name, _)| token.eq_ignore_ascii_case(name)) {
        return Some(index);
    }

    let digits = token.strip_prefix('r').or_else(|| token.strip_prefix('R'))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match digits.parse::<usize>() {
        Ok(index) if index < NUM_REGISTERS => Some(index),
        _ => None,
    }
}

/// Resolves an address argument.
///
/// A register name stands for the value currently held in that register;
/// a token made only of decimal digits is a literal address. Either way the result
/// must fall inside memory.
pub fn resolve_address(token: &str, registers: &[i32; NUM_REGISTERS]) -> Result<usize, ResolveError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ResolveError::Missing);
    }

    if let Some(index) = resolve_register(token) {
        let value = registers[index];
        return match usize::try_from(value) {
            Ok(addr) if addr < MEMORY_SIZE => Ok(addr),
            _ => Err(ResolveError::OutOfRange(value.to_string())),
        };
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ResolveError::Malformed(token.to_string()));
    }
    // Literals too long for usize are reported as typed
    match token.parse::<usize>() {
        Ok(addr) if addr < MEMORY_SIZE => Ok(addr),
        _ => Err(ResolveError::OutOfRange(token.to_string())),
    }
}
