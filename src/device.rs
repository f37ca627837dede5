//! The single gate through which all register traffic flows.
//!
//! Failures here are deliberately lossy: a timeout, transport error or modbus
//! exception becomes `None` (reads) or `false` (writes) after a diagnostic.
//! Callers treat either as "device state unknown" and recover on the next
//! poll; nothing retries internally.

use crate::connection::Connection;
use crate::modbus::{Operation, ResponseKind};
use crate::registers::{POWER_ON, RegisterIndex};
use std::sync::Arc;
use tracing::warn;

#[allow(async_fn_in_trait)]
pub trait RegisterIo {
    async fn read_register(&self, register: RegisterIndex) -> Option<u16>;
    async fn write_register(&self, register: RegisterIndex, value: u16) -> bool;

    /// `None` when the power state could not be determined.
    async fn is_powered_on(&self) -> Option<bool> {
        Some(self.read_register(RegisterIndex::POWER).await? == POWER_ON)
    }
}

impl<T: RegisterIo> RegisterIo for &T {
    async fn read_register(&self, register: RegisterIndex) -> Option<u16> {
        (**self).read_register(register).await
    }

    async fn write_register(&self, register: RegisterIndex, value: u16) -> bool {
        (**self).write_register(register, value).await
    }
}

#[derive(Clone)]
pub struct Device {
    connection: Arc<Connection>,
}

impl Device {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }
}

impl RegisterIo for Device {
    async fn read_register(&self, register: RegisterIndex) -> Option<u16> {
        let operation = Operation::GetHoldings { address: register.address(), count: 1 };
        let response = match self.connection.send(operation).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                warn!(message = "register read timed out", register = register.name());
                return None;
            }
            Err(error) => {
                warn!(
                    message = "register read failed",
                    register = register.name(),
                    error = (&error as &dyn std::error::Error)
                );
                return None;
            }
        };
        match response.kind {
            ResponseKind::GetHoldings { values } => {
                let Some(&[high, low]) = values.first_chunk::<2>() else {
                    warn!(
                        message = "register read returned a short payload",
                        register = register.name()
                    );
                    return None;
                };
                Some(u16::from_be_bytes([high, low]))
            }
            ResponseKind::ErrorCode(code) => {
                warn!(
                    message = "device rejected the register read",
                    register = register.name(),
                    code
                );
                None
            }
            ResponseKind::SetHolding { .. } => {
                warn!(message = "mismatched response kind", register = register.name());
                None
            }
        }
    }

    async fn write_register(&self, register: RegisterIndex, value: u16) -> bool {
        let operation = Operation::SetHolding { address: register.address(), value };
        match self.connection.send(operation).await {
            Ok(Some(response)) => match response.kind {
                ResponseKind::SetHolding { .. } => true,
                ResponseKind::ErrorCode(code) => {
                    warn!(
                        message = "device rejected the register write",
                        register = register.name(),
                        value,
                        code
                    );
                    false
                }
                ResponseKind::GetHoldings { .. } => {
                    warn!(message = "mismatched response kind", register = register.name());
                    false
                }
            },
            Ok(None) => {
                warn!(
                    message = "register write timed out",
                    register = register.name(),
                    value
                );
                false
            }
            Err(error) => {
                warn!(
                    message = "register write failed",
                    register = register.name(),
                    value,
                    error = (&error as &dyn std::error::Error)
                );
                false
            }
        }
    }
}
