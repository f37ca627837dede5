//! One-shot overview of the unit's telemetry.

use crate::connection::Connection;
use crate::conversion::{AbnormalStatus, SystemStatus};
use crate::device::Device;
use crate::entities::{SpeedSensor, StatusSensor, TemperatureSensor};
use crate::registers::RegisterIndex;
use crate::{connection, output};
use std::sync::Arc;

/// Show temperatures, measured fan speeds and the status registers.
#[derive(clap::Parser)]
pub struct Args {
    #[clap(flatten)]
    connection: connection::Args,
    #[clap(flatten)]
    output: output::Args,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not create the async runtime")]
    CreateRuntime(#[source] std::io::Error),
    #[error(transparent)]
    Output(#[from] output::Error),
}

#[derive(serde::Serialize)]
struct MetricRecord {
    metric: &'static str,
    value: serde_json::Value,
}

pub fn run(args: Args) -> Result<(), Error> {
    let mut output = args.output.to_output()?;
    output.table_headers(vec!["Metric", "Value"])?;
    super::runtime().map_err(Error::CreateRuntime)?.block_on(async move {
        let device = Device::new(Arc::new(Connection::new(args.connection)));

        let mut outdoor = TemperatureSensor::new(&device, RegisterIndex::OUTDOOR_TEMP);
        let mut indoor = TemperatureSensor::new(&device, RegisterIndex::INDOOR_RETURN_TEMP);
        let mut supply_rpm = SpeedSensor::new(&device, RegisterIndex::SUPPLY_FAN_RPM);
        let mut exhaust_rpm = SpeedSensor::new(&device, RegisterIndex::EXHAUST_FAN_RPM);
        let mut abnormal = StatusSensor::<_, AbnormalStatus>::new(&device);
        let mut system = StatusSensor::<_, SystemStatus>::new(&device);

        emit(&mut output, "Outdoor temperature", outdoor.update().await.map(celsius))?;
        emit(&mut output, "Indoor return temperature", indoor.update().await.map(celsius))?;
        emit(&mut output, "Supply fan", supply_rpm.update().await.map(rpm))?;
        emit(&mut output, "Exhaust fan", exhaust_rpm.update().await.map(rpm))?;
        emit(
            &mut output,
            "Abnormal status",
            abnormal.update().await.map(|s| (s.to_string(), to_json(&s))),
        )?;
        emit(
            &mut output,
            "System status",
            system.update().await.map(|s| (s.to_string(), to_json(&s))),
        )?;

        output.commit()?;
        Ok(())
    })
}

fn celsius(value: i16) -> (String, serde_json::Value) {
    (format!("{value} °C"), value.into())
}

fn rpm(value: u16) -> (String, serde_json::Value) {
    (format!("{value} rpm"), value.into())
}

fn to_json<S: serde::Serialize>(snapshot: &S) -> serde_json::Value {
    serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)
}

fn emit(
    output: &mut output::Output,
    metric: &'static str,
    reading: Option<(String, serde_json::Value)>,
) -> Result<(), Error> {
    let (cell, value) = reading
        .unwrap_or_else(|| ("<unavailable>".to_string(), serde_json::Value::Null));
    output.result(
        || vec![metric.to_string(), cell.clone()],
        || MetricRecord { metric, value },
    )?;
    Ok(())
}
