//! Simulated BLE central
//!
//! Stands in for the platform stack when no live adapter is available and in
//! tests. Each request is answered immediately by queueing the matching
//! [`PlatformEvent`], so ordering matches what a real stack would deliver.

use crate::domain::models::{CharacteristicRef, DeviceHandle, DeviceId, PlatformEvent, RadioState};
use crate::domain::ports::{BleCentral, BleError, BleResult};
use crate::domain::protocol;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// A fake peripheral and how it behaves
#[derive(Debug, Clone)]
pub struct SimulatedPeripheral {
    pub id: DeviceId,
    pub name: Option<String>,
    pub services: Vec<Uuid>,
    pub characteristics: Vec<Uuid>,
    pub battery_voltage: Option<String>,
    pub connect_error: Option<String>,
    pub write_error: Option<String>,
}

impl SimulatedPeripheral {
    /// An LED peripheral exposing the stock service and LED characteristic
    pub fn new(address: u64, name: Option<&str>) -> Self {
        Self {
            id: DeviceId(address),
            name: name.map(str::to_string),
            services: vec![protocol::SERVICE_UUID],
            characteristics: vec![protocol::LED_CHAR_UUID],
            battery_voltage: None,
            connect_error: None,
            write_error: None,
        }
    }

    pub fn with_battery(mut self, voltage: &str) -> Self {
        self.characteristics.push(protocol::BATTERY_CHAR_UUID);
        self.battery_voltage = Some(voltage.to_string());
        self
    }

    pub fn refusing(mut self, error: &str) -> Self {
        self.connect_error = Some(error.to_string());
        self
    }

    pub fn failing_writes(mut self, error: &str) -> Self {
        self.write_error = Some(error.to_string());
        self
    }

    fn handle(&self) -> DeviceHandle {
        DeviceHandle::new(self.id, self.name.clone())
    }
}

#[derive(Debug)]
struct SimState {
    radio: RadioState,
    peripherals: Vec<SimulatedPeripheral>,
    scanning: bool,
    connected: Option<DeviceId>,
    written: Vec<(CharacteristicRef, Vec<u8>)>,
    service_filters: Vec<Vec<Uuid>>,
}

impl SimState {
    fn peripheral(&self, id: DeviceId) -> BleResult<&SimulatedPeripheral> {
        self.peripherals
            .iter()
            .find(|p| p.id == id)
            .ok_or(BleError::UnknownDevice(id))
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SimulatedCentral {
    state: Arc<Mutex<SimState>>,
    event_sender: mpsc::UnboundedSender<PlatformEvent>,
}

impl SimulatedCentral {
    /// Create a central with a powered-on radio; the initial radio state is
    /// reported right away, like a platform stack does on startup.
    pub fn new(
        peripherals: Vec<SimulatedPeripheral>,
        event_sender: mpsc::UnboundedSender<PlatformEvent>,
    ) -> Self {
        info!("Using simulated BLE central with {} peripheral(s)", peripherals.len());
        let _ = event_sender.send(PlatformEvent::RadioStateChanged(RadioState::PoweredOn));
        Self {
            state: Arc::new(Mutex::new(SimState {
                radio: RadioState::PoweredOn,
                peripherals,
                scanning: false,
                connected: None,
                written: Vec::new(),
                service_filters: Vec::new(),
            })),
            event_sender,
        }
    }

    /// Handle for driving and inspecting the simulation from outside
    pub fn probe(&self) -> SimulatorProbe {
        SimulatorProbe {
            state: self.state.clone(),
            event_sender: self.event_sender.clone(),
        }
    }

    fn send(&self, event: PlatformEvent) {
        debug!("Simulated event: {:?}", event);
        let _ = self.event_sender.send(event);
    }
}

impl BleCentral for SimulatedCentral {
    fn radio_state(&self) -> RadioState {
        lock(&self.state).radio
    }

    fn start_scan(&mut self, service: Uuid) -> BleResult<()> {
        let found: Vec<DeviceHandle> = {
            let mut state = lock(&self.state);
            if state.radio != RadioState::PoweredOn {
                return Err(BleError::Unavailable(format!("radio is {:?}", state.radio)));
            }
            state.scanning = true;
            state
                .peripherals
                .iter()
                .filter(|p| p.services.contains(&service))
                .map(SimulatedPeripheral::handle)
                .collect()
        };

        for device in found {
            self.send(PlatformEvent::DeviceDiscovered(device));
        }
        Ok(())
    }

    fn stop_scan(&mut self) -> BleResult<()> {
        lock(&self.state).scanning = false;
        Ok(())
    }

    fn connect(&mut self, device: &DeviceHandle) -> BleResult<()> {
        let event = {
            let mut state = lock(&self.state);
            let refusal = state.peripheral(device.id)?.connect_error.clone();
            match refusal {
                Some(error) => PlatformEvent::ConnectFailed {
                    id: device.id,
                    error: Some(error),
                },
                None => {
                    state.connected = Some(device.id);
                    PlatformEvent::Connected(device.id)
                }
            }
        };
        self.send(event);
        Ok(())
    }

    fn cancel_connection(&mut self, id: DeviceId) -> BleResult<()> {
        {
            let mut state = lock(&self.state);
            state.peripheral(id)?;
            if state.connected == Some(id) {
                state.connected = None;
            }
        }
        self.send(PlatformEvent::Disconnected { id, error: None });
        Ok(())
    }

    fn discover_services(&mut self, id: DeviceId, services: &[Uuid]) -> BleResult<()> {
        let found = {
            let mut state = lock(&self.state);
            state.service_filters.push(services.to_vec());
            state
                .peripheral(id)?
                .services
                .iter()
                .filter(|s| services.is_empty() || services.contains(s))
                .copied()
                .collect()
        };
        self.send(PlatformEvent::ServicesDiscovered {
            id,
            services: found,
        });
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        id: DeviceId,
        service: Uuid,
        characteristics: &[Uuid],
    ) -> BleResult<()> {
        let found = {
            let state = lock(&self.state);
            state
                .peripheral(id)?
                .characteristics
                .iter()
                .filter(|c| characteristics.contains(c))
                .copied()
                .collect()
        };
        self.send(PlatformEvent::CharacteristicsDiscovered {
            id,
            service,
            characteristics: found,
        });
        Ok(())
    }

    fn write_with_response(
        &mut self,
        id: DeviceId,
        characteristic: CharacteristicRef,
        value: &[u8],
    ) -> BleResult<()> {
        let error = {
            let mut state = lock(&self.state);
            if state.connected != Some(id) {
                return Err(BleError::UnknownDevice(id));
            }
            let peripheral = state.peripheral(id)?;
            if !peripheral.characteristics.contains(&characteristic.uuid) {
                return Err(BleError::UnknownCharacteristic(characteristic.uuid));
            }
            let error = peripheral.write_error.clone();
            state.written.push((characteristic, value.to_vec()));
            error
        };
        self.send(PlatformEvent::WriteCompleted {
            id,
            characteristic,
            error,
        });
        Ok(())
    }

    fn subscribe(&mut self, id: DeviceId, characteristic: CharacteristicRef) -> BleResult<()> {
        let voltage = {
            let state = lock(&self.state);
            let peripheral = state.peripheral(id)?;
            if !peripheral.characteristics.contains(&characteristic.uuid) {
                return Err(BleError::UnknownCharacteristic(characteristic.uuid));
            }
            peripheral.battery_voltage.clone()
        };

        if let Some(voltage) = voltage {
            self.send(PlatformEvent::ValueUpdated {
                id,
                characteristic,
                value: voltage.into_bytes(),
            });
        }
        Ok(())
    }
}

/// Shared view into a [`SimulatedCentral`] that outlives handing the
/// central to a controller
#[derive(Clone)]
pub struct SimulatorProbe {
    state: Arc<Mutex<SimState>>,
    event_sender: mpsc::UnboundedSender<PlatformEvent>,
}

impl SimulatorProbe {
    pub fn set_radio_state(&self, radio: RadioState) {
        lock(&self.state).radio = radio;
        let _ = self
            .event_sender
            .send(PlatformEvent::RadioStateChanged(radio));
    }

    pub fn is_scanning(&self) -> bool {
        lock(&self.state).scanning
    }

    /// Payloads written so far, oldest first
    pub fn written(&self) -> Vec<Vec<u8>> {
        lock(&self.state)
            .written
            .iter()
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// Service filters passed to each discovery request
    pub fn service_filters(&self) -> Vec<Vec<Uuid>> {
        lock(&self.state).service_filters.clone()
    }

    /// Simulate the peripheral going out of range
    pub fn drop_link(&self, id: DeviceId, reason: &str) {
        lock(&self.state).connected = None;
        let _ = self.event_sender.send(PlatformEvent::Disconnected {
            id,
            error: Some(reason.to_string()),
        });
    }

    /// Push a battery notification as the firmware would
    pub fn notify_battery(&self, id: DeviceId, voltage: &str) {
        let _ = self.event_sender.send(PlatformEvent::ValueUpdated {
            id,
            characteristic: CharacteristicRef {
                service: protocol::SERVICE_UUID,
                uuid: protocol::BATTERY_CHAR_UUID,
            },
            value: voltage.as_bytes().to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn central(peripherals: Vec<SimulatedPeripheral>) -> (SimulatedCentral, mpsc::UnboundedReceiver<PlatformEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SimulatedCentral::new(peripherals, tx), rx)
    }

    #[test]
    fn test_reports_radio_on_startup() {
        let (_central, mut rx) = central(Vec::new());
        assert_eq!(
            rx.try_recv().unwrap(),
            PlatformEvent::RadioStateChanged(RadioState::PoweredOn)
        );
    }

    #[test]
    fn test_scan_filters_by_service() {
        let mut other = SimulatedPeripheral::new(2, Some("Heart Rate"));
        other.services = vec![Uuid::from_u128(0x180d)];
        let (mut central, mut rx) = central(vec![SimulatedPeripheral::new(1, None), other]);
        let _ = rx.try_recv();

        central.start_scan(protocol::SERVICE_UUID).unwrap();
        match rx.try_recv().unwrap() {
            PlatformEvent::DeviceDiscovered(device) => assert_eq!(device.id, DeviceId(1)),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_scan_refused_when_radio_off() {
        let (mut central, _rx) = central(Vec::new());
        central.probe().set_radio_state(RadioState::PoweredOff);
        assert!(matches!(
            central.start_scan(protocol::SERVICE_UUID),
            Err(BleError::Unavailable(_))
        ));
    }

    #[test]
    fn test_write_requires_link() {
        let (mut central, _rx) = central(vec![SimulatedPeripheral::new(1, None)]);
        let led = CharacteristicRef {
            service: protocol::SERVICE_UUID,
            uuid: protocol::LED_CHAR_UUID,
        };
        assert!(central.write_with_response(DeviceId(1), led, &[1]).is_err());
        assert!(central.probe().written().is_empty());
    }

    #[test]
    fn test_unknown_device() {
        let (mut central, _rx) = central(Vec::new());
        let ghost = DeviceHandle::new(DeviceId(5), None);
        assert!(matches!(
            central.connect(&ghost),
            Err(BleError::UnknownDevice(DeviceId(5)))
        ));
    }
}
