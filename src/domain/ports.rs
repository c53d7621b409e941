//! Port between the device controller and the platform BLE stack.
//!
//! ```text
//!   DeviceController ──requests──▶ BleCentral ──PlatformEvent──▶ event loop
//! ```
//!
//! Every request returns as soon as it has been handed to the platform.
//! Outcomes arrive later as [`PlatformEvent`](super::models::PlatformEvent)s
//! on the channel the central was built with.

use crate::domain::models::{CharacteristicRef, DeviceHandle, DeviceId, RadioState};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BleError {
    #[error("Bluetooth adapter unavailable: {0}")]
    Unavailable(String),
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),
    #[error("unknown characteristic {0}")]
    UnknownCharacteristic(Uuid),
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),
    #[error("platform error: {0}")]
    Platform(String),
}

pub type BleResult<T> = Result<T, BleError>;

/// Central-role operations the controller needs from a BLE stack
pub trait BleCentral: Send {
    /// Last radio state known to the adapter
    fn radio_state(&self) -> RadioState;

    /// Begin scanning for peripherals advertising `service`
    fn start_scan(&mut self, service: Uuid) -> BleResult<()>;

    fn stop_scan(&mut self) -> BleResult<()>;

    fn connect(&mut self, device: &DeviceHandle) -> BleResult<()>;

    /// Tear down the link; a `Disconnected` event follows
    fn cancel_connection(&mut self, id: DeviceId) -> BleResult<()>;

    fn discover_services(&mut self, id: DeviceId, services: &[Uuid]) -> BleResult<()>;

    fn discover_characteristics(
        &mut self,
        id: DeviceId,
        service: Uuid,
        characteristics: &[Uuid],
    ) -> BleResult<()>;

    /// Acknowledged write; the result arrives as `WriteCompleted`
    fn write_with_response(
        &mut self,
        id: DeviceId,
        characteristic: CharacteristicRef,
        value: &[u8],
    ) -> BleResult<()>;

    /// Enable notifications; values arrive as `ValueUpdated`
    fn subscribe(&mut self, id: DeviceId, characteristic: CharacteristicRef) -> BleResult<()>;
}
