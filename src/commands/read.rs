//! Read registers from the device and output their decoded values.

use crate::connection::Connection;
use crate::device::{Device, RegisterIo as _};
use crate::registers::{RegisterIndex, Value};
use crate::{connection, output};
use std::sync::Arc;

/// Read one or more registers, by name or address.
#[derive(clap::Parser)]
pub struct Args {
    /// Registers to read, e.g. `POWER`, `0x11` or `17`.
    #[arg(required = true)]
    registers: Vec<String>,
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
    #[error(transparent)]
    Output(#[from] output::Error),
}

#[derive(serde::Serialize)]
struct ReadRecord {
    address: u16,
    name: &'static str,
    value: Option<Value>,
    raw: Option<u16>,
}

pub fn run(args: Args) -> Result<(), Error> {
    let registers = args
        .registers
        .iter()
        .map(|argument| {
            super::parse_register(argument)
                .ok_or_else(|| Error::UnknownRegister(argument.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut output = args.output.to_output()?;
    output.table_headers(vec!["Address", "Name", "Value", "Raw"])?;
    super::runtime().map_err(Error::CreateRuntime)?.block_on(async move {
        let device = Device::new(Arc::new(Connection::new(args.connection)));
        for register in registers {
            let word = device.read_register(register).await;
            emit(&mut output, register, word)?;
        }
        output.commit()?;
        Ok::<_, Error>(())
    })?;
    Ok(())
}

fn emit(
    output: &mut output::Output,
    register: RegisterIndex,
    word: Option<u16>,
) -> Result<(), Error> {
    let value = word.map(|w| register.data_type().from_word(w));
    output.result(
        || {
            vec![
                format!("0x{:04X}", register.address()),
                register.name().to_string(),
                value.map(|v| v.to_string()).unwrap_or_else(|| "<unavailable>".to_string()),
                word.map(|w| format!("0x{w:04X}")).unwrap_or_default(),
            ]
        },
        || ReadRecord { address: register.address(), name: register.name(), value, raw: word },
    )?;
    Ok(())
}
