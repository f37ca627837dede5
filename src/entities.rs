//! Controllable entities layered over the register gate.
//!
//! Each controller owns a small cache of the last device state it observed
//! and an availability flag. Reads refresh the cache; commands write the
//! device first and update the cache only once every write in the sequence
//! succeeded, so a half-applied command leaves the cache describing the last
//! state actually confirmed by the device.

pub mod fan;
pub mod select;
pub mod sensor;

pub use fan::FanController;
pub use select::SelectController;
pub use sensor::{SpeedSensor, StatusSensor, TemperatureSensor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Availability {
    /// No read has completed yet.
    Unknown,
    Available,
    Unavailable,
}

/// The last observed value of an entity together with its availability.
///
/// A failed read marks the entity unavailable but keeps the stale value
/// around; `current` only reports it while the entity is available.
pub struct Cached<T> {
    value: Option<T>,
    availability: Availability,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self { value: None, availability: Availability::Unknown }
    }
}

impl<T: Copy> Cached<T> {
    pub fn set(&mut self, value: T) {
        self.value = Some(value);
        self.availability = Availability::Available;
    }

    pub fn mark_failed(&mut self) {
        self.availability = Availability::Unavailable;
    }

    pub fn current(&self) -> Option<T> {
        match self.availability {
            Availability::Available => self.value,
            Availability::Unknown | Availability::Unavailable => None,
        }
    }

    /// The stale value too, for fallbacks that outlive an outage.
    pub fn last_known(&self) -> Option<T> {
        self.value
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("the device's power state could not be determined")]
    PowerStateUnknown,
    #[error("the device is powered off")]
    DeviceOff,
    #[error("writing the `{register}` register failed")]
    WriteFailed { register: &'static str },
    #[error("writing the `{register}` register failed after earlier writes had been applied")]
    PartialWrite { register: &'static str },
    #[error("`{0}` is not one of the selectable options")]
    UnknownOption(String),
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::device::RegisterIo;
    use crate::registers::RegisterIndex;
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};

    /// A scripted in-memory device. Reads and writes can be failed per
    /// register address; successful writes are recorded in order.
    #[derive(Default)]
    pub(crate) struct FakeDevice {
        pub registers: RefCell<HashMap<u16, u16>>,
        pub fail_reads: RefCell<HashSet<u16>>,
        pub fail_writes: RefCell<HashSet<u16>>,
        pub writes: RefCell<Vec<(u16, u16)>>,
    }

    impl FakeDevice {
        pub fn with_registers(values: &[(RegisterIndex, u16)]) -> Self {
            let device = Self::default();
            for &(register, value) in values {
                device.registers.borrow_mut().insert(register.address(), value);
            }
            device
        }

        pub fn fail_reads_of(&self, register: RegisterIndex) {
            self.fail_reads.borrow_mut().insert(register.address());
        }

        pub fn fail_writes_of(&self, register: RegisterIndex) {
            self.fail_writes.borrow_mut().insert(register.address());
        }

        pub fn recorded_writes(&self) -> Vec<(u16, u16)> {
            self.writes.borrow().clone()
        }
    }

    impl RegisterIo for FakeDevice {
        async fn read_register(&self, register: RegisterIndex) -> Option<u16> {
            if self.fail_reads.borrow().contains(&register.address()) {
                return None;
            }
            self.registers.borrow().get(&register.address()).copied()
        }

        async fn write_register(&self, register: RegisterIndex, value: u16) -> bool {
            if self.fail_writes.borrow().contains(&register.address()) {
                return false;
            }
            self.writes.borrow_mut().push((register.address(), value));
            self.registers.borrow_mut().insert(register.address(), value);
            true
        }
    }
}
