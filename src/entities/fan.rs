//! The ventilation fan pair presented as a single percentage-controlled fan.

use super::{Availability, Cached, CommandError};
use crate::conversion::{self, DEFAULT_TURN_ON_PERCENTAGE};
use crate::device::RegisterIo;
use crate::registers::{
    FAN_SPEED_PERCENTAGE_CONTROL, POWER_OFF, POWER_ON, RegisterIndex,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FanState {
    pub is_on: bool,
    /// User-facing percentage recovered from the exhaust channel.
    pub percentage: u16,
}

pub struct FanController<D> {
    device: D,
    state: Cached<FanState>,
}

impl<D: RegisterIo> FanController<D> {
    pub fn new(device: D) -> Self {
        Self { device, state: Cached::default() }
    }

    pub fn state(&self) -> Option<FanState> {
        self.state.current()
    }

    pub fn availability(&self) -> Availability {
        self.state.availability()
    }

    /// Refresh the cached state from the device.
    ///
    /// The supply percentage is read along with the exhaust one so that a
    /// partially readable device still registers as unavailable, but only the
    /// exhaust value feeds the reverse conversion. Supply-side drift does not
    /// change the reported percentage.
    pub async fn update(&mut self) -> Option<FanState> {
        let power = self.device.read_register(RegisterIndex::POWER).await;
        let supply = self.device.read_register(RegisterIndex::SUPPLY_AIR_1_PCT).await;
        let exhaust = self.device.read_register(RegisterIndex::EXHAUST_AIR_1_PCT).await;
        let (Some(power), Some(_), Some(exhaust)) = (power, supply, exhaust) else {
            self.state.mark_failed();
            return None;
        };
        let state = FanState {
            is_on: power == POWER_ON,
            percentage: conversion::user_percentage(exhaust),
        };
        self.state.set(state);
        Some(state)
    }

    /// Run the fan at the given percentage, powering the device on if needed.
    ///
    /// Writes land in dependency order: both channel percentages first, then
    /// the airflow level selecting percentage control, then power. The cache
    /// is updated only when every write succeeded.
    pub async fn set_percentage(&mut self, percentage: u16) -> Result<(), CommandError> {
        let percentage = percentage.min(100);
        if percentage == 0 {
            return self.turn_off().await;
        }
        let (supply, exhaust) = conversion::register_percentages(percentage);
        let mut wrote_any = false;
        self.write_step(RegisterIndex::SUPPLY_AIR_1_PCT, supply, &mut wrote_any).await?;
        self.write_step(RegisterIndex::EXHAUST_AIR_1_PCT, exhaust, &mut wrote_any).await?;
        self.write_step(
            RegisterIndex::FAN_SPEED_SETTING,
            FAN_SPEED_PERCENTAGE_CONTROL,
            &mut wrote_any,
        )
        .await?;
        let known_on = matches!(self.state.current(), Some(state) if state.is_on);
        if !known_on {
            self.write_step(RegisterIndex::POWER, POWER_ON, &mut wrote_any).await?;
        }
        self.state.set(FanState { is_on: true, percentage });
        Ok(())
    }

    /// Power on, restoring the cached percentage when one is known, else the
    /// factory-suggested default.
    pub async fn turn_on(&mut self, percentage: Option<u16>) -> Result<(), CommandError> {
        let percentage = percentage
            .or_else(|| {
                self.state.last_known().map(|state| state.percentage).filter(|p| *p > 0)
            })
            .unwrap_or(DEFAULT_TURN_ON_PERCENTAGE);
        self.set_percentage(percentage).await
    }

    pub async fn turn_off(&mut self) -> Result<(), CommandError> {
        if !self.device.write_register(RegisterIndex::POWER, POWER_OFF).await {
            return Err(CommandError::WriteFailed { register: RegisterIndex::POWER.name() });
        }
        let percentage = self.state.last_known().map_or(0, |state| state.percentage);
        self.state.set(FanState { is_on: false, percentage });
        Ok(())
    }

    async fn write_step(
        &mut self,
        register: RegisterIndex,
        value: u16,
        wrote_any: &mut bool,
    ) -> Result<(), CommandError> {
        if self.device.write_register(register, value).await {
            *wrote_any = true;
            Ok(())
        } else if *wrote_any {
            Err(CommandError::PartialWrite { register: register.name() })
        } else {
            Err(CommandError::WriteFailed { register: register.name() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::FakeDevice;

    #[tokio::test]
    async fn update_recovers_percentage_from_the_exhaust_channel() {
        let device = FakeDevice::with_registers(&[
            (RegisterIndex::POWER, POWER_ON),
            (RegisterIndex::SUPPLY_AIR_1_PCT, 27),
            (RegisterIndex::EXHAUST_AIR_1_PCT, 22),
        ]);
        let mut fan = FanController::new(&device);
        let state = fan.update().await.unwrap();
        assert!(state.is_on);
        assert_eq!(state.percentage, 43); // floor of 1 + 21/49 * 99
        assert_eq!(fan.availability(), Availability::Available);
    }

    #[tokio::test]
    async fn supply_drift_does_not_change_the_reported_percentage() {
        let device = FakeDevice::with_registers(&[
            (RegisterIndex::POWER, POWER_ON),
            (RegisterIndex::SUPPLY_AIR_1_PCT, 27),
            (RegisterIndex::EXHAUST_AIR_1_PCT, 22),
        ]);
        let mut fan = FanController::new(&device);
        let baseline = fan.update().await.unwrap().percentage;

        device.registers.borrow_mut().insert(RegisterIndex::SUPPLY_AIR_1_PCT.address(), 55);
        assert_eq!(fan.update().await.unwrap().percentage, baseline);
    }

    #[tokio::test]
    async fn failed_update_keeps_the_stale_value_but_hides_it() {
        let device = FakeDevice::with_registers(&[
            (RegisterIndex::POWER, POWER_ON),
            (RegisterIndex::SUPPLY_AIR_1_PCT, 27),
            (RegisterIndex::EXHAUST_AIR_1_PCT, 22),
        ]);
        let mut fan = FanController::new(&device);
        fan.update().await.unwrap();

        device.fail_reads_of(RegisterIndex::EXHAUST_AIR_1_PCT);
        assert!(fan.update().await.is_none());
        assert_eq!(fan.availability(), Availability::Unavailable);
        assert_eq!(fan.state(), None);
    }

    #[tokio::test]
    async fn set_percentage_writes_the_full_sequence() {
        let device = FakeDevice::with_registers(&[(RegisterIndex::POWER, POWER_OFF)]);
        let mut fan = FanController::new(&device);
        fan.set_percentage(45).await.unwrap();
        assert_eq!(
            device.recorded_writes(),
            vec![
                (RegisterIndex::SUPPLY_AIR_1_PCT.address(), 27),
                (RegisterIndex::EXHAUST_AIR_1_PCT.address(), 22),
                (RegisterIndex::FAN_SPEED_SETTING.address(), FAN_SPEED_PERCENTAGE_CONTROL),
                (RegisterIndex::POWER.address(), POWER_ON),
            ]
        );
        let state = fan.state().unwrap();
        assert!(state.is_on);
        assert_eq!(state.percentage, 45);
    }

    #[tokio::test]
    async fn set_percentage_skips_the_power_write_when_known_on() {
        let device = FakeDevice::with_registers(&[
            (RegisterIndex::POWER, POWER_ON),
            (RegisterIndex::SUPPLY_AIR_1_PCT, 1),
            (RegisterIndex::EXHAUST_AIR_1_PCT, 1),
        ]);
        let mut fan = FanController::new(&device);
        fan.update().await.unwrap();
        device.writes.borrow_mut().clear();

        fan.set_percentage(100).await.unwrap();
        let writes = device.recorded_writes();
        assert_eq!(writes.len(), 3);
        assert!(!writes.iter().any(|(address, _)| *address == RegisterIndex::POWER.address()));
    }

    #[tokio::test]
    async fn first_write_failure_is_not_partial() {
        let device = FakeDevice::default();
        device.fail_writes_of(RegisterIndex::SUPPLY_AIR_1_PCT);
        let mut fan = FanController::new(&device);
        assert_eq!(
            fan.set_percentage(45).await,
            Err(CommandError::WriteFailed {
                register: RegisterIndex::SUPPLY_AIR_1_PCT.name()
            })
        );
        assert!(device.recorded_writes().is_empty());
    }

    #[tokio::test]
    async fn partial_failure_leaves_the_cache_untouched() {
        let device = FakeDevice::with_registers(&[
            (RegisterIndex::POWER, POWER_ON),
            (RegisterIndex::SUPPLY_AIR_1_PCT, 27),
            (RegisterIndex::EXHAUST_AIR_1_PCT, 22),
        ]);
        let mut fan = FanController::new(&device);
        let before = fan.update().await.unwrap();

        device.fail_writes_of(RegisterIndex::EXHAUST_AIR_1_PCT);
        assert_eq!(
            fan.set_percentage(80).await,
            Err(CommandError::PartialWrite {
                register: RegisterIndex::EXHAUST_AIR_1_PCT.name()
            })
        );
        assert_eq!(fan.state(), Some(before));
    }

    #[tokio::test]
    async fn turn_on_prefers_requested_then_cached_then_default() {
        let device = FakeDevice::with_registers(&[
            (RegisterIndex::POWER, POWER_ON),
            (RegisterIndex::SUPPLY_AIR_1_PCT, 27),
            (RegisterIndex::EXHAUST_AIR_1_PCT, 22),
        ]);
        let mut fan = FanController::new(&device);
        fan.update().await.unwrap();

        fan.turn_on(Some(60)).await.unwrap();
        assert_eq!(fan.state().unwrap().percentage, 60);

        fan.turn_off().await.unwrap();
        fan.turn_on(None).await.unwrap();
        assert_eq!(fan.state().unwrap().percentage, 60);

        let fresh_device = FakeDevice::default();
        let mut fresh = FanController::new(&fresh_device);
        fresh.turn_on(None).await.unwrap();
        assert_eq!(fresh.state().unwrap().percentage, DEFAULT_TURN_ON_PERCENTAGE);
    }

    #[tokio::test]
    async fn zero_percentage_powers_off() {
        let device = FakeDevice::with_registers(&[
            (RegisterIndex::POWER, POWER_ON),
            (RegisterIndex::SUPPLY_AIR_1_PCT, 27),
            (RegisterIndex::EXHAUST_AIR_1_PCT, 22),
        ]);
        let mut fan = FanController::new(&device);
        fan.update().await.unwrap();

        fan.set_percentage(0).await.unwrap();
        assert_eq!(
            device.recorded_writes(),
            vec![(RegisterIndex::POWER.address(), POWER_OFF)]
        );
        let state = fan.state().unwrap();
        assert!(!state.is_on);
        // The percentage survives power-off for the next turn_on.
        assert_eq!(state.percentage, 43);
    }
}
