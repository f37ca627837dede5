//! Query or change the bypass and internal-circulation mode selectors.

use crate::connection::Connection;
use crate::conversion::{AirflowLevel, BypassMode, CirculationMode, ModeOption};
use crate::device::Device;
use crate::entities::{CommandError, SelectController};
use crate::{connection, output};
use std::sync::Arc;

/// Query or set one of the mode selectors.
#[derive(clap::Parser)]
pub struct Args {
    /// Which selector to act on.
    #[arg(value_enum)]
    selector: Selector,
    /// The option to select, e.g. `Auto`; omit to show the current one.
    option: Option<String>,
    #[clap(flatten)]
    connection: connection::Args,
    #[clap(flatten)]
    output: output::Args,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Selector {
    /// The heat exchanger bypass (Heat Exchange, Bypass, Auto.)
    Bypass,
    /// The air path (Heat Exchange, Internal Circulation.)
    Circulation,
    /// The airflow level (Low, Medium, High); `fan set` keeps it at Low.
    Airflow,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not create the async runtime")]
    CreateRuntime(#[source] std::io::Error),
    #[error("the mode could not be read from the device")]
    Unavailable,
    #[error("the command was not applied")]
    Command(#[from] CommandError),
    #[error(transparent)]
    Output(#[from] output::Error),
}

#[derive(serde::Serialize)]
struct ModeRecord {
    selector: &'static str,
    mode: String,
    options: &'static [&'static str],
}

pub fn run(args: Args) -> Result<(), Error> {
    let mut output = args.output.to_output()?;
    output.table_headers(vec!["Selector", "Mode", "Options"])?;
    super::runtime().map_err(Error::CreateRuntime)?.block_on(async move {
        let device = Device::new(Arc::new(Connection::new(args.connection)));
        match args.selector {
            Selector::Bypass => {
                drive::<BypassMode>(device, "bypass", args.option, &mut output).await?
            }
            Selector::Circulation => {
                drive::<CirculationMode>(device, "circulation", args.option, &mut output).await?
            }
            Selector::Airflow => {
                drive::<AirflowLevel>(device, "airflow", args.option, &mut output).await?
            }
        }
        output.commit()?;
        Ok(())
    })
}

async fn drive<M: ModeOption>(
    device: Device,
    selector: &'static str,
    option: Option<String>,
    output: &mut output::Output,
) -> Result<(), Error> {
    let mut select = SelectController::<_, M>::new(device);
    let mode = match option {
        Some(label) => select.select_label(&label).await?,
        None => select.update().await.ok_or(Error::Unavailable)?,
    };
    output.result(
        || {
            vec![
                selector.to_string(),
                mode.to_string(),
                SelectController::<Device, M>::options().join(", "),
            ]
        },
        || ModeRecord {
            selector,
            mode: mode.to_string(),
            options: SelectController::<Device, M>::options(),
        },
    )?;
    Ok(())
}
