pub const NUM_REGISTERS: usize = 32;
pub const MEMORY_SIZE: usize = 500;

// Special-purpose registers share the general register file
pub const IP: usize = 0;
pub const RP: usize = 29;
pub const FP: usize = 30;
pub const SP: usize = 31;

pub fn register_name(index: usize) -> String {
    match index {
        IP => "ip".to_string(),
        RP => "rp".to_string(),
        FP => "fp".to_string(),
        SP => "sp".to_string(),
        _ => format!("r{}", index),
    }
}
