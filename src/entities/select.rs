//! Mode selectors backed by a single enumerated-code register.

use super::{Availability, Cached, CommandError};
use crate::conversion::ModeOption;
use crate::device::RegisterIo;

/// Drives one of the closed mode enumerations (bypass, internal circulation.)
pub struct SelectController<D, M> {
    device: D,
    mode: Cached<M>,
}

impl<D: RegisterIo, M: ModeOption> SelectController<D, M> {
    pub fn new(device: D) -> Self {
        Self { device, mode: Cached::default() }
    }

    pub fn current(&self) -> Option<M> {
        self.mode.current()
    }

    pub fn availability(&self) -> Availability {
        self.mode.availability()
    }

    /// The selectable labels, in declaration order.
    pub fn options() -> &'static [&'static str] {
        M::VARIANTS
    }

    pub async fn update(&mut self) -> Option<M> {
        match self.device.read_register(M::REGISTER).await {
            Some(code) => {
                // Out-of-range codes decode to the documented default rather
                // than making the entity unavailable.
                let mode = M::from_register(code);
                self.mode.set(mode);
                Some(mode)
            }
            None => {
                self.mode.mark_failed();
                None
            }
        }
    }

    /// Change the mode. The device ignores mode writes while powered off, so
    /// the power state is checked first and an off or unknown device is a
    /// rejection, not a write attempt.
    pub async fn select(&mut self, option: M) -> Result<(), CommandError> {
        match self.device.is_powered_on().await {
            None => return Err(CommandError::PowerStateUnknown),
            Some(false) => return Err(CommandError::DeviceOff),
            Some(true) => {}
        }
        if !self.device.write_register(M::REGISTER, option.to_register()).await {
            return Err(CommandError::WriteFailed { register: M::REGISTER.name() });
        }
        self.mode.set(option);
        Ok(())
    }

    pub async fn select_label(&mut self, label: &str) -> Result<M, CommandError> {
        let option =
            label.parse::<M>().map_err(|_| CommandError::UnknownOption(label.to_owned()))?;
        self.select(option).await?;
        Ok(option)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::{BypassMode, CirculationMode};
    use crate::entities::testing::FakeDevice;
    use crate::registers::{POWER_OFF, POWER_ON, RegisterIndex};

    #[tokio::test]
    async fn update_decodes_and_falls_back() {
        let device = FakeDevice::with_registers(&[(RegisterIndex::BYPASS_FUNCTION, 2)]);
        let mut select = SelectController::<_, BypassMode>::new(&device);
        assert_eq!(select.update().await, Some(BypassMode::Auto));

        device.registers.borrow_mut().insert(RegisterIndex::BYPASS_FUNCTION.address(), 9);
        assert_eq!(select.update().await, Some(BypassMode::HeatExchange));
        assert_eq!(select.availability(), Availability::Available);
    }

    #[tokio::test]
    async fn select_requires_a_powered_on_device() {
        let device = FakeDevice::with_registers(&[
            (RegisterIndex::POWER, POWER_OFF),
            (RegisterIndex::BYPASS_FUNCTION, 0),
        ]);
        let mut select = SelectController::<_, BypassMode>::new(&device);
        assert_eq!(select.select(BypassMode::Bypass).await, Err(CommandError::DeviceOff));
        assert!(device.recorded_writes().is_empty());

        device.fail_reads_of(RegisterIndex::POWER);
        assert_eq!(
            select.select(BypassMode::Bypass).await,
            Err(CommandError::PowerStateUnknown)
        );
    }

    #[tokio::test]
    async fn select_label_parses_and_writes() {
        let device = FakeDevice::with_registers(&[(RegisterIndex::POWER, POWER_ON)]);
        let mut select = SelectController::<_, CirculationMode>::new(&device);
        let mode = select.select_label("Internal Circulation").await.unwrap();
        assert_eq!(mode, CirculationMode::InternalCirculation);
        assert_eq!(
            device.recorded_writes(),
            vec![(RegisterIndex::INTERNAL_CIRCULATION.address(), 1)]
        );
        assert_eq!(select.current(), Some(CirculationMode::InternalCirculation));

        assert_eq!(
            select.select_label("Turbo").await,
            Err(CommandError::UnknownOption("Turbo".to_owned()))
        );
    }

    #[tokio::test]
    async fn failed_write_does_not_update_the_cache() {
        let device = FakeDevice::with_registers(&[
            (RegisterIndex::POWER, POWER_ON),
            (RegisterIndex::BYPASS_FUNCTION, 0),
        ]);
        let mut select = SelectController::<_, BypassMode>::new(&device);
        select.update().await.unwrap();

        device.fail_writes_of(RegisterIndex::BYPASS_FUNCTION);
        assert_eq!(
            select.select(BypassMode::Auto).await,
            Err(CommandError::WriteFailed {
                register: RegisterIndex::BYPASS_FUNCTION.name()
            })
        );
        assert_eq!(select.current(), Some(BypassMode::HeatExchange));
    }

    #[test]
    fn options_list_the_labels() {
        assert_eq!(
            SelectController::<crate::device::Device, BypassMode>::options(),
            ["Heat Exchange", "Bypass", "Auto"]
        );
    }
}
