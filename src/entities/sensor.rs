//! Read-only telemetry entities.

use super::{Availability, Cached};
use crate::conversion::StatusWord;
use crate::device::RegisterIo;
use crate::registers::RegisterIndex;

/// A temperature register, decoded as two's-complement whole degrees.
pub struct TemperatureSensor<D> {
    device: D,
    register: RegisterIndex,
    reading: Cached<i16>,
}

impl<D: RegisterIo> TemperatureSensor<D> {
    pub fn new(device: D, register: RegisterIndex) -> Self {
        Self { device, register, reading: Cached::default() }
    }

    pub fn celsius(&self) -> Option<i16> {
        self.reading.current()
    }

    pub fn availability(&self) -> Availability {
        self.reading.availability()
    }

    pub async fn update(&mut self) -> Option<i16> {
        match self.device.read_register(self.register).await {
            Some(word) => {
                let celsius = word as i16;
                self.reading.set(celsius);
                Some(celsius)
            }
            None => {
                self.reading.mark_failed();
                None
            }
        }
    }
}

/// A measured fan speed register, in RPM.
pub struct SpeedSensor<D> {
    device: D,
    register: RegisterIndex,
    reading: Cached<u16>,
}

impl<D: RegisterIo> SpeedSensor<D> {
    pub fn new(device: D, register: RegisterIndex) -> Self {
        Self { device, register, reading: Cached::default() }
    }

    pub fn rpm(&self) -> Option<u16> {
        self.reading.current()
    }

    pub fn availability(&self) -> Availability {
        self.reading.availability()
    }

    pub async fn update(&mut self) -> Option<u16> {
        match self.device.read_register(self.register).await {
            Some(rpm) => {
                self.reading.set(rpm);
                Some(rpm)
            }
            None => {
                self.reading.mark_failed();
                None
            }
        }
    }
}

/// A status bitfield register decoded into a named-flag snapshot.
pub struct StatusSensor<D, S> {
    device: D,
    snapshot: Cached<S>,
}

impl<D: RegisterIo, S: StatusWord> StatusSensor<D, S> {
    pub fn new(device: D) -> Self {
        Self { device, snapshot: Cached::default() }
    }

    pub fn snapshot(&self) -> Option<S> {
        self.snapshot.current()
    }

    pub fn availability(&self) -> Availability {
        self.snapshot.availability()
    }

    pub async fn update(&mut self) -> Option<S> {
        match self.device.read_register(S::REGISTER).await {
            Some(word) => {
                let snapshot = S::decode(word);
                self.snapshot.set(snapshot);
                Some(snapshot)
            }
            None => {
                self.snapshot.mark_failed();
                None
            }
        }
    }
}
