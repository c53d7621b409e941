//! Live BLE central on the Windows Runtime Bluetooth APIs.
//!
//! Requests are started on tokio tasks; WinRT callbacks and task results
//! come back as [`PlatformEvent`]s.

use crate::domain::models::{
    CharacteristicRef, DeviceHandle, DeviceId, PlatformEvent, RadioState,
};
use crate::domain::ports::{BleCentral, BleError, BleResult};
use crate::infrastructure::bluetooth::connection::{self, GattLink};
use crate::infrastructure::bluetooth::scanner::BleScanner;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;
use windows::core::GUID;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattValueChangedEventArgs,
};
use windows::Devices::Bluetooth::{BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Devices::Radios::{self, Radio, RadioAccessStatus, RadioKind};
use windows::Foundation::TypedEventHandler;

pub fn guid_from_uuid(uuid: Uuid) -> GUID {
    GUID::from_u128(uuid.as_u128())
}

pub fn uuid_from_guid(guid: GUID) -> Uuid {
    Uuid::from_u128(guid.to_u128())
}

pub fn platform_error(e: windows::core::Error) -> BleError {
    BleError::Platform(e.to_string())
}

fn map_radio_state(state: Radios::RadioState) -> RadioState {
    match state {
        Radios::RadioState::On => RadioState::PoweredOn,
        Radios::RadioState::Off => RadioState::PoweredOff,
        Radios::RadioState::Disabled => RadioState::Unauthorized,
        _ => RadioState::Unknown,
    }
}

#[derive(Default)]
struct LiveState {
    radio_state: Option<RadioState>,
    radio: Option<Radio>,
    pending: Option<DeviceId>,
    link: Option<GattLink>,
}

type Shared = Arc<Mutex<LiveState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, LiveState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct WinRtCentral {
    shared: Shared,
    scanner: BleScanner,
    event_sender: mpsc::UnboundedSender<PlatformEvent>,
}

impl WinRtCentral {
    /// Must be called from within a tokio runtime; the radio is queried in
    /// the background and reported as `RadioStateChanged`.
    pub fn new(event_sender: mpsc::UnboundedSender<PlatformEvent>) -> Self {
        let shared = Shared::default();
        tokio::spawn(watch_radio(shared.clone(), event_sender.clone()));
        Self {
            shared,
            scanner: BleScanner::new(event_sender.clone()),
            event_sender,
        }
    }

    fn link_objects<T>(
        &self,
        id: DeviceId,
        pick: impl FnOnce(&GattLink) -> Option<T>,
        missing: BleError,
    ) -> BleResult<T> {
        let state = lock(&self.shared);
        let link = state
            .link
            .as_ref()
            .filter(|l| l.id == id)
            .ok_or(BleError::UnknownDevice(id))?;
        pick(link).ok_or(missing)
    }
}

async fn watch_radio(shared: Shared, sender: mpsc::UnboundedSender<PlatformEvent>) {
    let state = match find_bluetooth_radio().await {
        Ok(Some(radio)) => {
            let state = radio
                .State()
                .map(map_radio_state)
                .unwrap_or(RadioState::Unknown);

            let handler_shared = shared.clone();
            let handler_sender = sender.clone();
            let handler = TypedEventHandler::new(
                move |radio: windows::core::Ref<Radio>, _| {
                    if let Some(radio) = radio.as_ref() {
                        let state = map_radio_state(radio.State()?);
                        lock(&handler_shared).radio_state = Some(state);
                        let _ = handler_sender.send(PlatformEvent::RadioStateChanged(state));
                    }
                    Ok(())
                },
            );
            if let Err(e) = radio.StateChanged(&handler) {
                warn!("Radio state changes will not be reported: {}", e);
            }
            lock(&shared).radio = Some(radio);
            state
        }
        Ok(None) => RadioState::Unsupported,
        Err(state) => state,
    };

    info!("Bluetooth radio state: {:?}", state);
    lock(&shared).radio_state = Some(state);
    let _ = sender.send(PlatformEvent::RadioStateChanged(state));
}

async fn find_bluetooth_radio() -> Result<Option<Radio>, RadioState> {
    let access = async { Radio::RequestAccessAsync()?.await };
    match access.await {
        Ok(RadioAccessStatus::Allowed) => {}
        Ok(status) => {
            warn!("Radio access: {:?}", status);
            return Err(RadioState::Unauthorized);
        }
        Err(e) => {
            error!("Radio access request failed: {}", e);
            return Err(RadioState::Unknown);
        }
    }

    let radios = async {
        let radios = Radio::GetRadiosAsync()?.await?;
        for i in 0..radios.Size()? {
            let radio = radios.GetAt(i)?;
            if radio.Kind()? == RadioKind::Bluetooth {
                return windows::core::Result::Ok(Some(radio));
            }
        }
        Ok(None)
    };

    radios.await.map_err(|e| {
        error!("Failed to enumerate radios: {}", e);
        RadioState::Unknown
    })
}

async fn open_link(
    shared: Shared,
    sender: mpsc::UnboundedSender<PlatformEvent>,
    id: DeviceId,
) -> anyhow::Result<()> {
    let device = connection::open_device(id.0).await?;
    let session = connection::maintain_connection(&device).await;

    let status_shared = shared.clone();
    let status_sender = sender.clone();
    let handler = TypedEventHandler::new(
        move |device: windows::core::Ref<BluetoothLEDevice>, _| {
            if let Some(device) = device.as_ref() {
                if device.ConnectionStatus()? == BluetoothConnectionStatus::Disconnected {
                    if let Some(link) = take_link(&status_shared, id) {
                        link.close();
                    }
                    let _ = status_sender.send(PlatformEvent::Disconnected {
                        id,
                        error: Some("Connection lost".to_string()),
                    });
                }
            }
            Ok(())
        },
    );
    let status_token = device.ConnectionStatusChanged(&handler)?;

    let link = GattLink {
        id,
        device,
        session,
        status_token,
        services: HashMap::new(),
        characteristics: HashMap::new(),
        value_tokens: Vec::new(),
    };

    let mut state = lock(&shared);
    if state.pending != Some(id) {
        // Cancelled while the device was opening
        drop(state);
        link.close();
        return Ok(());
    }
    state.pending = None;
    if let Some(previous) = state.link.replace(link) {
        previous.close();
    }
    drop(state);

    let _ = sender.send(PlatformEvent::Connected(id));
    Ok(())
}

/// Remove the active link if it belongs to `id`
fn take_link(shared: &Shared, id: DeviceId) -> Option<GattLink> {
    let mut state = lock(shared);
    match state.link.take() {
        Some(link) if link.id == id => Some(link),
        other => {
            state.link = other;
            None
        }
    }
}

impl BleCentral for WinRtCentral {
    fn radio_state(&self) -> RadioState {
        lock(&self.shared).radio_state.unwrap_or(RadioState::Unknown)
    }

    fn start_scan(&mut self, service: Uuid) -> BleResult<()> {
        self.scanner.start(service)
    }

    fn stop_scan(&mut self) -> BleResult<()> {
        if self.scanner.is_scanning() {
            self.scanner.stop()?;
        }
        Ok(())
    }

    fn connect(&mut self, device: &DeviceHandle) -> BleResult<()> {
        let id = device.id;
        lock(&self.shared).pending = Some(id);

        let shared = self.shared.clone();
        let sender = self.event_sender.clone();
        tokio::spawn(async move {
            if let Err(e) = open_link(shared.clone(), sender.clone(), id).await {
                error!("Connection to {} failed: {}", id, e);
                lock(&shared).pending = None;
                let _ = sender.send(PlatformEvent::ConnectFailed {
                    id,
                    error: Some(e.to_string()),
                });
            }
        });
        Ok(())
    }

    fn cancel_connection(&mut self, id: DeviceId) -> BleResult<()> {
        {
            let mut state = lock(&self.shared);
            if state.pending == Some(id) {
                state.pending = None;
            }
        }

        if let Some(link) = take_link(&self.shared, id) {
            link.close();
        }
        let _ = self
            .event_sender
            .send(PlatformEvent::Disconnected { id, error: None });
        Ok(())
    }

    fn discover_services(&mut self, id: DeviceId, services: &[Uuid]) -> BleResult<()> {
        let device = self.link_objects(
            id,
            |link| Some(link.device.clone()),
            BleError::UnknownDevice(id),
        )?;
        let wanted = services.to_vec();
        let shared = self.shared.clone();
        let sender = self.event_sender.clone();

        tokio::spawn(async move {
            match connection::services_for(&device, &wanted).await {
                Ok(found) => {
                    let mut uuids = Vec::new();
                    let mut state = lock(&shared);
                    for service in found {
                        let Ok(guid) = service.Uuid() else { continue };
                        let uuid = uuid_from_guid(guid);
                        uuids.push(uuid);
                        if let Some(link) = state.link.as_mut().filter(|l| l.id == id) {
                            link.services.insert(uuid, service);
                        }
                    }
                    drop(state);
                    let _ = sender.send(PlatformEvent::ServicesDiscovered {
                        id,
                        services: uuids,
                    });
                }
                Err(e) => {
                    warn!("Service discovery on {} failed: {}", id, e);
                    let _ = sender.send(PlatformEvent::DiscoveryFailed {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        });
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        id: DeviceId,
        service: Uuid,
        characteristics: &[Uuid],
    ) -> BleResult<()> {
        let gatt_service = self.link_objects(
            id,
            |link| link.services.get(&service).cloned(),
            BleError::Platform(format!("service {} not discovered", service)),
        )?;
        let wanted = characteristics.to_vec();
        let shared = self.shared.clone();
        let sender = self.event_sender.clone();

        tokio::spawn(async move {
            match connection::characteristics_for(&gatt_service, &wanted).await {
                Ok(found) => {
                    let mut uuids = Vec::new();
                    let mut state = lock(&shared);
                    for characteristic in found {
                        let Ok(guid) = characteristic.Uuid() else { continue };
                        let uuid = uuid_from_guid(guid);
                        uuids.push(uuid);
                        if let Some(link) = state.link.as_mut().filter(|l| l.id == id) {
                            link.characteristics.insert(uuid, characteristic);
                        }
                    }
                    drop(state);
                    let _ = sender.send(PlatformEvent::CharacteristicsDiscovered {
                        id,
                        service,
                        characteristics: uuids,
                    });
                }
                Err(e) => {
                    warn!("Characteristic discovery on {} failed: {}", id, e);
                    let _ = sender.send(PlatformEvent::DiscoveryFailed {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        });
        Ok(())
    }

    fn write_with_response(
        &mut self,
        id: DeviceId,
        characteristic: CharacteristicRef,
        value: &[u8],
    ) -> BleResult<()> {
        let gatt = self.link_objects(
            id,
            |link| link.characteristics.get(&characteristic.uuid).cloned(),
            BleError::UnknownCharacteristic(characteristic.uuid),
        )?;
        let value = value.to_vec();
        let sender = self.event_sender.clone();

        tokio::spawn(async move {
            let error = connection::write_with_response(&gatt, &value)
                .await
                .err()
                .map(|e| e.to_string());
            let _ = sender.send(PlatformEvent::WriteCompleted {
                id,
                characteristic,
                error,
            });
        });
        Ok(())
    }

    fn subscribe(&mut self, id: DeviceId, characteristic: CharacteristicRef) -> BleResult<()> {
        let gatt = self.link_objects(
            id,
            |link| link.characteristics.get(&characteristic.uuid).cloned(),
            BleError::UnknownCharacteristic(characteristic.uuid),
        )?;

        let value_sender = self.event_sender.clone();
        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<GattCharacteristic>,
                  args: windows::core::Ref<GattValueChangedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    if let Ok(value) = connection::read_buffer(&args.CharacteristicValue()?) {
                        let _ = value_sender.send(PlatformEvent::ValueUpdated {
                            id,
                            characteristic,
                            value,
                        });
                    }
                }
                Ok(())
            },
        );
        let token = gatt.ValueChanged(&handler).map_err(platform_error)?;
        if let Some(link) = lock(&self.shared).link.as_mut().filter(|l| l.id == id) {
            link.value_tokens.push((gatt.clone(), token));
        }

        tokio::spawn(async move {
            if let Err(e) = connection::enable_notifications(&gatt).await {
                warn!("Could not enable notifications: {}", e);
            }
        });
        Ok(())
    }
}
