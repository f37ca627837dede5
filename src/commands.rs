pub mod fan;
pub mod mode;
pub mod read;
pub mod registers;
pub mod status;
pub mod write;

use crate::registers::RegisterIndex;

/// Commands talk to the device over the shared connection worker; a small
/// current-thread runtime is enough for that.
fn runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

/// Registers are addressable by name (case-insensitive) or by decimal or
/// `0x`-prefixed address.
fn parse_register(argument: &str) -> Option<RegisterIndex> {
    if let Some(register) = RegisterIndex::from_name(&argument.to_uppercase()) {
        return Some(register);
    }
    let address = match argument.strip_prefix("0x").or_else(|| argument.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok()?,
        None => argument.parse::<u16>().ok()?,
    };
    RegisterIndex::from_address(address)
}
