//! Control the ventilation fans as a single percentage-controlled fan.

use crate::connection::Connection;
use crate::device::Device;
use crate::entities::fan::{FanController, FanState};
use crate::entities::{Availability, CommandError};
use crate::{connection, output};
use std::sync::Arc;

/// Query or set the fan speed.
#[derive(clap::Parser)]
pub struct Args {
    #[clap(subcommand)]
    action: Action,
    #[clap(flatten)]
    connection: connection::Args,
    #[clap(flatten)]
    output: output::Args,
}

#[derive(clap::Subcommand)]
enum Action {
    /// Show the current power state and fan percentage.
    Status,
    /// Run the fans at the given percentage (0 turns the unit off.)
    Set { percentage: u16 },
    /// Power the unit on, restoring the previous speed where known.
    On {
        /// Percentage to turn on at instead of the restored one.
        percentage: Option<u16>,
    },
    /// Power the unit off.
    Off,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not create the async runtime")]
    CreateRuntime(#[source] std::io::Error),
    #[error("the fan state could not be read from the device")]
    Unavailable,
    #[error("the command was not applied")]
    Command(#[from] CommandError),
    #[error(transparent)]
    Output(#[from] output::Error),
}

#[derive(serde::Serialize)]
struct FanRecord {
    is_on: bool,
    percentage: u16,
}

pub fn run(args: Args) -> Result<(), Error> {
    let mut output = args.output.to_output()?;
    output.table_headers(vec!["Power", "Speed"])?;
    super::runtime().map_err(Error::CreateRuntime)?.block_on(async move {
        let device = Device::new(Arc::new(Connection::new(args.connection)));
        let mut fan = FanController::new(device);
        let state = match args.action {
            Action::Status => {
                fan.update().await;
                fan.state().ok_or(Error::Unavailable)?
            }
            Action::Set { percentage } => {
                // Refresh first so a known-on device skips the power write
                // and `0` can restore its percentage later.
                fan.update().await;
                fan.set_percentage(percentage).await?;
                fan.state().ok_or(Error::Unavailable)?
            }
            Action::On { percentage } => {
                if fan.availability() == Availability::Unknown {
                    fan.update().await;
                }
                fan.turn_on(percentage).await?;
                fan.state().ok_or(Error::Unavailable)?
            }
            Action::Off => {
                fan.update().await;
                fan.turn_off().await?;
                fan.state().ok_or(Error::Unavailable)?
            }
        };
        emit(&mut output, state)?;
        output.commit()?;
        Ok(())
    })
}

fn emit(output: &mut output::Output, state: FanState) -> Result<(), Error> {
    output.result(
        || {
            vec![
                if state.is_on { "On".to_string() } else { "Off".to_string() },
                format!("{}%", state.percentage),
            ]
        },
        || FanRecord { is_on: state.is_on, percentage: state.percentage },
    )?;
    Ok(())
}
