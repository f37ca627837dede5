//! Write a raw value into a single writable register.

use crate::connection::Connection;
use crate::device::{Device, RegisterIo as _};
use crate::{connection, output};
use std::sync::Arc;

/// Write a raw value to a register, by name or address.
///
/// The higher level `fan` and `mode` commands should be preferred; this one
/// performs no unit conversion and no power-state checks.
#[derive(clap::Parser)]
pub struct Args {
    /// Register to write, e.g. `POWER`, `0x05` or `5`.
    register: String,
    /// The raw 16-bit value, decimal or `0x`-prefixed.
    value: String,
    #[clap(flatten)]
    connection: connection::Args,
    #[clap(flatten)]
    output: output::Args,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not create the async runtime")]
    CreateRuntime(#[source] std::io::Error),
    #[error("`{0}` does not name a known register")]
    UnknownRegister(String),
    #[error("`{0}` is not a 16-bit register value")]
    InvalidValue(String),
    #[error("register `{0}` is read-only")]
    ReadOnlyRegister(&'static str),
    #[error("the device did not accept the write")]
    WriteRejected,
    #[error(transparent)]
    Output(#[from] output::Error),
}

#[derive(serde::Serialize)]
struct WriteRecord {
    address: u16,
    name: &'static str,
    value: u16,
}

pub fn run(args: Args) -> Result<(), Error> {
    let register = super::parse_register(&args.register)
        .ok_or_else(|| Error::UnknownRegister(args.register.clone()))?;
    if !register.mode().is_writable() {
        return Err(Error::ReadOnlyRegister(register.name()));
    }
    let value = parse_value(&args.value).ok_or_else(|| Error::InvalidValue(args.value.clone()))?;
    let mut output = args.output.to_output()?;
    output.table_headers(vec!["Address", "Name", "Written"])?;
    super::runtime().map_err(Error::CreateRuntime)?.block_on(async move {
        let device = Device::new(Arc::new(Connection::new(args.connection)));
        if !device.write_register(register, value).await {
            return Err(Error::WriteRejected);
        }
        output.result(
            || {
                vec![
                    format!("0x{:04X}", register.address()),
                    register.name().to_string(),
                    format!("0x{value:04X}"),
                ]
            },
            || WriteRecord { address: register.address(), name: register.name(), value },
        )?;
        output.commit()?;
        Ok(())
    })
}

fn parse_value(argument: &str) -> Option<u16> {
    match argument.strip_prefix("0x").or_else(|| argument.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => argument.parse::<u16>().ok(),
    }
}
