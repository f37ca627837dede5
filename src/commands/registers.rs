//! Search and output the known modbus registers, without a device.

use crate::output;
use crate::registers::{ADDRESSES, DATA_TYPES, DESCRIPTIONS, MODES, NAMES, DataType, Mode};

/// Search and output the known modbus registers.
#[derive(clap::Parser)]
pub struct Args {
    /// Show only registers whose name, description or address contains this.
    filter: Option<String>,
    #[clap(flatten)]
    output: output::Args,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Output(#[from] output::Error),
}

#[derive(serde::Serialize)]
pub struct RegisterSchema {
    pub address: u16,
    pub name: &'static str,
    pub mode: Mode,
    pub data_type: DataType,
    pub description: &'static str,
}

impl RegisterSchema {
    pub fn all_registers() -> impl Iterator<Item = Self> {
        use std::iter::zip;
        zip(zip(zip(zip(ADDRESSES, NAMES), MODES), DATA_TYPES), DESCRIPTIONS).map(
            |((((&address, &name), &mode), &data_type), &description)| RegisterSchema {
                address,
                name,
                mode,
                data_type,
                description,
            },
        )
    }

    pub fn is_match(&self, pattern: &str) -> bool {
        let pattern = pattern.to_uppercase();
        self.name.contains(&pattern)
            || self.description.to_uppercase().contains(&pattern)
            || self.address.to_string().contains(&pattern)
    }
}

pub fn run(args: Args) -> Result<(), Error> {
    let mut output = args.output.to_output()?;
    output.table_headers(vec!["Address", "Name", "Mode", "Type", "Description"])?;
    for register in RegisterSchema::all_registers() {
        if let Some(pattern) = &args.filter {
            if !register.is_match(pattern) {
                continue;
            }
        }
        output.result(
            || {
                vec![
                    format!("0x{:04X}", register.address),
                    register.name.to_string(),
                    register.mode.to_string(),
                    register.data_type.to_string(),
                    register.description.to_string(),
                ]
            },
            || &register,
        )?;
    }
    output.commit()?;
    Ok(())
}
