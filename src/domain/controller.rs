//! Device controller: the connection lifecycle state machine.
//!
//! Owns [`ControllerState`] and the active connection context. Every
//! mutation goes through one of the five intent methods or through
//! [`DeviceController::handle_event`], both driven from a single thread.

use crate::domain::battery;
use crate::domain::models::{
    CharacteristicRef, ConnectionPhase, ControllerState, DeviceHandle, DeviceId, PlatformEvent,
    RadioState, NO_BATTERY_READING,
};
use crate::domain::ports::BleCentral;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default automatic scan stop
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifiers and timing the controller works with
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub service_uuid: Uuid,
    pub led_char_uuid: Uuid,
    pub battery_char_uuid: Option<Uuid>,
    pub scan_timeout: Duration,
}

/// One-byte LED command written to the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedCommand {
    Off,
    On,
}

impl LedCommand {
    pub fn from_state(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Off => &[0x00],
            Self::On => &[0x01],
        }
    }
}

pub struct DeviceController {
    central: Box<dyn BleCentral>,
    config: ControllerConfig,
    state: ControllerState,
    radio_state: RadioState,
    peripheral: Option<DeviceHandle>,
    led_characteristic: Option<CharacteristicRef>,
    battery_characteristic: Option<CharacteristicRef>,
    scan_deadline: Option<Instant>,
}

impl DeviceController {
    pub fn new(central: Box<dyn BleCentral>, config: ControllerConfig) -> Self {
        let radio_state = central.radio_state();
        Self {
            central,
            config,
            state: ControllerState::default(),
            radio_state,
            peripheral: None,
            led_characteristic: None,
            battery_characteristic: None,
            scan_deadline: None,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn led_characteristic(&self) -> Option<CharacteristicRef> {
        self.led_characteristic
    }

    /// When the running scan stops on its own, if one is running
    pub fn scan_deadline(&self) -> Option<Instant> {
        self.scan_deadline
    }

    pub fn phase(&self) -> ConnectionPhase {
        if self.state.is_connected {
            ConnectionPhase::Connected
        } else if self.peripheral.is_some() {
            ConnectionPhase::Connecting
        } else if self.state.is_scanning {
            ConnectionPhase::Scanning
        } else {
            ConnectionPhase::Idle
        }
    }

    pub fn start_scanning(&mut self) {
        if self.radio_state != RadioState::PoweredOn {
            warn!("Scan requested while radio is {:?}", self.radio_state);
            self.set_status("Bluetooth is not available");
            return;
        }

        self.state.discovered_devices.clear();
        self.state.is_scanning = true;
        self.set_status("Scanning for ESP32-LED...");

        if let Err(e) = self.central.start_scan(self.config.service_uuid) {
            warn!("Failed to start scan: {}", e);
            self.state.is_scanning = false;
            self.scan_deadline = None;
            self.set_status(format!("Scan failed: {}", e));
            return;
        }

        self.scan_deadline = Some(Instant::now() + self.config.scan_timeout);
        info!(
            "Scanning for service {} ({:?} window)",
            self.config.service_uuid, self.config.scan_timeout
        );
    }

    pub fn stop_scanning(&mut self) {
        self.state.is_scanning = false;
        self.scan_deadline = None;
        if let Err(e) = self.central.stop_scan() {
            warn!("Failed to stop scan: {}", e);
        }

        if !self.state.is_connected {
            let status = if self.state.discovered_devices.is_empty() {
                "No devices found"
            } else {
                "Scan complete"
            };
            self.set_status(status);
        }
    }

    /// Stop the scan once its deadline has passed
    pub fn on_scan_timeout(&mut self, now: Instant) {
        match self.scan_deadline {
            Some(deadline) if now >= deadline => {
                debug!("Scan window elapsed");
                self.stop_scanning();
            }
            _ => {}
        }
    }

    pub fn connect(&mut self, device: &DeviceHandle) {
        self.stop_scanning();
        if let Some(previous) = self.peripheral.take() {
            if previous.id != device.id {
                info!("Dropping {} in favour of {}", previous.id, device.id);
                if let Err(e) = self.central.cancel_connection(previous.id) {
                    warn!("Failed to release {}: {}", previous.id, e);
                }
            }
            self.reset_connection();
        }
        self.peripheral = Some(device.clone());
        self.set_status(format!("Connecting to {}...", connection_name(device)));
        info!("Connecting to {} ({})", connection_name(device), device.id);

        if let Err(e) = self.central.connect(device) {
            self.fail_connection(device.id, Some(e.to_string()));
        }
    }

    pub fn disconnect(&mut self) {
        let Some(peripheral) = &self.peripheral else {
            return;
        };

        let id = peripheral.id;
        info!("Disconnect requested for {}", id);
        if let Err(e) = self.central.cancel_connection(id) {
            warn!("Failed to request disconnect: {}", e);
            self.set_status(format!("Disconnect failed: {}", e));
        }
    }

    pub fn set_led_state(&mut self, on: bool) {
        let (Some(characteristic), Some(peripheral)) =
            (self.led_characteristic, self.peripheral.as_ref())
        else {
            self.set_status("Not connected to device");
            return;
        };

        let id = peripheral.id;
        let command = LedCommand::from_state(on);
        if let Err(e) = self
            .central
            .write_with_response(id, characteristic, command.as_bytes())
        {
            warn!("LED write could not be issued: {}", e);
            self.set_status(format!("Write error: {}", e));
            return;
        }

        self.state.led_state = on;
        self.set_status(format!("LED turned {}", if on { "ON" } else { "OFF" }));
    }

    /// Apply one asynchronous result from the platform
    pub fn handle_event(&mut self, event: PlatformEvent) {
        debug!("Platform event: {:?}", event);
        match event {
            PlatformEvent::RadioStateChanged(radio) => {
                self.radio_state = radio;
                self.set_status(radio.status_text());
            }
            PlatformEvent::DeviceDiscovered(device) => self.on_discovered(device),
            PlatformEvent::Connected(id) => self.on_connected(id),
            PlatformEvent::ConnectFailed { id, error } => {
                if self.is_active(id) {
                    self.fail_connection(id, error);
                } else {
                    debug!("Ignoring connect failure for inactive {}", id);
                }
            }
            PlatformEvent::Disconnected { id, error } => self.on_disconnected(id, error),
            PlatformEvent::ServicesDiscovered { id, services } => {
                self.on_services_discovered(id, &services)
            }
            PlatformEvent::CharacteristicsDiscovered {
                id,
                service,
                characteristics,
            } => self.on_characteristics_discovered(id, service, &characteristics),
            PlatformEvent::DiscoveryFailed { id, error } => {
                if self.is_active(id) {
                    warn!("Discovery on {} failed: {}", id, error);
                    self.set_status(format!("Discovery failed: {}", error));
                }
            }
            PlatformEvent::WriteCompleted {
                characteristic,
                error,
                ..
            } => {
                if let Some(error) = error {
                    warn!("Write to {} failed: {}", characteristic.uuid, error);
                    self.set_status(format!("Write error: {}", error));
                }
            }
            PlatformEvent::ValueUpdated {
                id,
                characteristic,
                value,
            } => self.on_value_updated(id, characteristic, &value),
        }
    }

    fn on_discovered(&mut self, device: DeviceHandle) {
        if self.state.is_connected {
            return;
        }
        if self.state.discovered_devices.contains(&device) {
            return;
        }

        info!("Discovered {} ({})", device.display_name(), device.id);
        self.set_status(format!(
            "Found {}",
            device.name.as_deref().unwrap_or("Unknown")
        ));
        self.state.discovered_devices.push(device);
    }

    fn on_connected(&mut self, id: DeviceId) {
        let Some(peripheral) = self.peripheral.clone() else {
            warn!("Connected event for {} without a pending connection", id);
            return;
        };
        if peripheral.id != id {
            warn!("Ignoring connection to {}, expected {}", id, peripheral.id);
            return;
        }

        self.state.is_connected = true;
        self.state.connected_device = Some(peripheral.clone());
        self.set_status(format!("Connected to {}", connection_name(&peripheral)));

        if let Err(e) = self
            .central
            .discover_services(id, &[self.config.service_uuid])
        {
            warn!("Service discovery could not start: {}", e);
            self.set_status(format!("Service discovery failed: {}", e));
        }
    }

    fn on_services_discovered(&mut self, id: DeviceId, services: &[Uuid]) {
        if !self.is_active(id) {
            return;
        }

        let service = self.config.service_uuid;
        if !services.contains(&service) {
            warn!("Peripheral {} does not expose service {}", id, service);
            self.set_status("LED service not found");
            return;
        }

        let mut wanted = vec![self.config.led_char_uuid];
        wanted.extend(self.config.battery_char_uuid);
        if let Err(e) = self.central.discover_characteristics(id, service, &wanted) {
            warn!("Characteristic discovery could not start: {}", e);
            self.set_status(format!("Characteristic discovery failed: {}", e));
        }
    }

    fn on_characteristics_discovered(
        &mut self,
        id: DeviceId,
        service: Uuid,
        characteristics: &[Uuid],
    ) {
        if !self.is_active(id) || !self.state.is_connected {
            return;
        }

        if characteristics.contains(&self.config.led_char_uuid) {
            self.led_characteristic = Some(CharacteristicRef {
                service,
                uuid: self.config.led_char_uuid,
            });
            self.set_status("Ready to control LED");
        } else {
            warn!("Peripheral {} has no LED characteristic", id);
            self.set_status("LED characteristic not found");
        }

        if let Some(battery_uuid) = self.config.battery_char_uuid {
            if characteristics.contains(&battery_uuid) {
                let battery = CharacteristicRef {
                    service,
                    uuid: battery_uuid,
                };
                self.battery_characteristic = Some(battery);
                if let Err(e) = self.central.subscribe(id, battery) {
                    warn!("Battery notifications unavailable: {}", e);
                }
            }
        }
    }

    fn on_value_updated(&mut self, id: DeviceId, characteristic: CharacteristicRef, value: &[u8]) {
        if !self.is_active(id) || self.battery_characteristic != Some(characteristic) {
            return;
        }

        let voltage = String::from_utf8_lossy(value).trim().to_string();
        match battery::percentage_from_voltage(&voltage) {
            Some(percentage) => self.state.battery_percentage = percentage,
            None => warn!("Unreadable battery voltage {:?}", voltage),
        }
        self.state.battery_voltage = voltage;
    }

    fn on_disconnected(&mut self, id: DeviceId, error: Option<String>) {
        if !self.is_active(id) {
            debug!("Ignoring disconnect of inactive {}", id);
            return;
        }
        match error {
            Some(error) => warn!("Disconnected from {}: {}", id, error),
            None => info!("Disconnected from {}", id),
        }

        self.reset_connection();
        self.peripheral = None;
        self.set_status("Disconnected");
    }

    fn reset_connection(&mut self) {
        self.state.is_connected = false;
        self.state.connected_device = None;
        self.state.led_state = false;
        self.state.battery_percentage = 0;
        self.state.battery_voltage = NO_BATTERY_READING.to_string();
        self.led_characteristic = None;
        self.battery_characteristic = None;
    }

    fn fail_connection(&mut self, id: DeviceId, error: Option<String>) {
        let error = error.unwrap_or_else(|| "Unknown error".to_string());
        warn!("Failed to connect to {}: {}", id, error);
        self.peripheral = None;
        self.set_status(format!("Failed to connect: {}", error));
    }

    fn is_active(&self, id: DeviceId) -> bool {
        self.peripheral.as_ref().is_some_and(|p| p.id == id)
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.state.status_message = message.into();
    }
}

fn connection_name(device: &DeviceHandle) -> &str {
    device.name.as_deref().unwrap_or("device")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol;
    use crate::infrastructure::bluetooth::simulated::{
        SimulatedCentral, SimulatedPeripheral, SimulatorProbe,
    };
    use tokio::sync::mpsc;

    struct Harness {
        controller: DeviceController,
        events: mpsc::UnboundedReceiver<PlatformEvent>,
        probe: SimulatorProbe,
    }

    impl Harness {
        fn new(peripherals: Vec<SimulatedPeripheral>) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let central = SimulatedCentral::new(peripherals, tx);
            let probe = central.probe();
            let controller = DeviceController::new(Box::new(central), protocol::default_config());
            Self {
                controller,
                events: rx,
                probe,
            }
        }

        fn pump(&mut self) {
            while let Ok(event) = self.events.try_recv() {
                self.controller.handle_event(event);
            }
        }

        fn state(&self) -> &ControllerState {
            self.controller.state()
        }

        fn connect_first(&mut self) -> DeviceHandle {
            self.controller.start_scanning();
            self.pump();
            let device = self.state().discovered_devices[0].clone();
            self.controller.connect(&device);
            self.pump();
            device
        }
    }

    fn led(address: u64) -> SimulatedPeripheral {
        SimulatedPeripheral::new(address, Some("ESP32-LED"))
    }

    #[test]
    fn test_scan_requires_powered_radio() {
        let mut h = Harness::new(vec![led(1)]);
        h.probe.set_radio_state(RadioState::PoweredOff);
        h.pump();
        assert_eq!(h.state().status_message, "Bluetooth is powered off");

        h.controller.start_scanning();
        assert!(!h.state().is_scanning);
        assert_eq!(h.state().status_message, "Bluetooth is not available");
        assert!(h.controller.scan_deadline().is_none());
    }

    #[test]
    fn test_discovery_deduplicates_by_identity() {
        let mut h = Harness::new(vec![led(1), led(2)]);
        h.controller.start_scanning();
        h.pump();

        for (address, name) in [(1, None), (2, Some("renamed")), (3, None), (1, Some("x"))] {
            h.controller.handle_event(PlatformEvent::DeviceDiscovered(DeviceHandle::new(
                DeviceId(address),
                name.map(String::from),
            )));
        }

        let ids: Vec<u64> = h.state().discovered_devices.iter().map(|d| d.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(h.state().status_message, "Found Unknown");
    }

    #[test]
    fn test_restart_clears_list() {
        let mut h = Harness::new(vec![led(1)]);
        h.controller.start_scanning();
        h.pump();
        h.controller.handle_event(PlatformEvent::DeviceDiscovered(DeviceHandle::new(
            DeviceId(9),
            None,
        )));
        assert_eq!(h.state().discovered_devices.len(), 2);

        h.controller.start_scanning();
        assert!(h.state().discovered_devices.is_empty());
        h.pump();
        assert_eq!(h.state().discovered_devices.len(), 1);
    }

    #[test]
    fn test_timeout_without_devices() {
        let mut h = Harness::new(Vec::new());
        h.controller.start_scanning();
        h.pump();
        let deadline = h.controller.scan_deadline().expect("scan armed");

        h.controller.on_scan_timeout(deadline - Duration::from_millis(1));
        assert!(h.state().is_scanning);

        h.controller.on_scan_timeout(deadline);
        assert!(!h.state().is_scanning);
        assert_eq!(h.state().status_message, "No devices found");
        assert!(!h.probe.is_scanning());
    }

    #[test]
    fn test_stop_with_devices_reports_complete() {
        let mut h = Harness::new(vec![led(1)]);
        h.controller.start_scanning();
        h.pump();
        assert_eq!(h.controller.phase(), ConnectionPhase::Scanning);

        h.controller.stop_scanning();
        assert_eq!(h.state().status_message, "Scan complete");
        assert_eq!(h.controller.phase(), ConnectionPhase::Idle);
    }

    #[test]
    fn test_connect_flow_reaches_ready() {
        let mut h = Harness::new(vec![led(1)]);
        h.controller.start_scanning();
        h.pump();
        let device = h.state().discovered_devices[0].clone();

        h.controller.connect(&device);
        assert!(!h.state().is_scanning);
        assert_eq!(h.state().status_message, "Connecting to ESP32-LED...");
        assert_eq!(h.controller.phase(), ConnectionPhase::Connecting);

        h.pump();
        let config = protocol::default_config();
        assert!(h.state().is_connected);
        assert_eq!(h.state().status_message, "Ready to control LED");
        assert_eq!(h.probe.service_filters(), vec![vec![config.service_uuid]]);
        assert_eq!(
            h.controller.led_characteristic(),
            Some(CharacteristicRef {
                service: config.service_uuid,
                uuid: config.led_char_uuid,
            })
        );
        assert_eq!(h.controller.phase(), ConnectionPhase::Connected);
    }

    #[test]
    fn test_led_write_is_optimistic() {
        let mut h = Harness::new(vec![led(1)]);
        h.connect_first();

        h.controller.set_led_state(true);
        assert!(h.state().led_state);
        assert_eq!(h.state().status_message, "LED turned ON");
        assert_eq!(h.probe.written(), vec![vec![0x01]]);

        h.pump();
        h.controller.set_led_state(false);
        assert!(!h.state().led_state);
        assert_eq!(h.probe.written(), vec![vec![0x01], vec![0x00]]);
    }

    #[test]
    fn test_led_requires_connection() {
        let mut h = Harness::new(vec![led(1)]);
        h.controller.set_led_state(true);
        assert!(!h.state().led_state);
        assert_eq!(h.state().status_message, "Not connected to device");
        assert!(h.probe.written().is_empty());
    }

    #[test]
    fn test_write_error_keeps_optimistic_state() {
        let mut h = Harness::new(vec![led(1).failing_writes("GATT busy")]);
        h.connect_first();

        h.controller.set_led_state(true);
        h.pump();
        assert!(h.state().led_state);
        assert_eq!(h.state().status_message, "Write error: GATT busy");
    }

    #[test]
    fn test_disconnect_clears_context() {
        let mut h = Harness::new(vec![led(1)]);
        h.connect_first();
        h.controller.set_led_state(true);
        h.pump();

        h.controller.disconnect();
        assert!(h.state().is_connected);
        h.pump();

        assert!(!h.state().is_connected);
        assert!(!h.state().led_state);
        assert!(h.controller.led_characteristic().is_none());
        assert_eq!(h.state().status_message, "Disconnected");
        assert_eq!(h.controller.phase(), ConnectionPhase::Idle);
    }

    #[test]
    fn test_link_loss_clears_context() {
        let mut h = Harness::new(vec![led(1)]);
        let device = h.connect_first();
        h.controller.set_led_state(true);

        h.probe.drop_link(device.id, "connection timed out");
        h.pump();
        assert!(!h.state().led_state);
        assert!(h.controller.led_characteristic().is_none());

        h.controller.set_led_state(true);
        assert_eq!(h.state().status_message, "Not connected to device");
    }

    #[test]
    fn test_disconnect_without_connection_is_noop() {
        let mut h = Harness::new(vec![led(1)]);
        h.pump();
        h.controller.disconnect();
        h.pump();
        assert_eq!(h.state().status_message, "Bluetooth is ready");
        assert!(!h.state().is_connected);
    }

    #[test]
    fn test_connect_failure() {
        let mut h = Harness::new(vec![led(1).refusing("Peer removed pairing")]);
        let device = h.connect_first();
        assert!(!h.state().is_connected);
        assert_eq!(
            h.state().status_message,
            "Failed to connect: Peer removed pairing"
        );
        assert_eq!(h.controller.phase(), ConnectionPhase::Idle);

        h.controller.connect(&device);
        h.controller.handle_event(PlatformEvent::ConnectFailed {
            id: DeviceId(1),
            error: None,
        });
        assert_eq!(h.state().status_message, "Failed to connect: Unknown error");
        assert_eq!(h.controller.phase(), ConnectionPhase::Idle);
    }

    #[test]
    fn test_failure_for_other_device_keeps_link() {
        let mut h = Harness::new(vec![led(1)]);
        h.connect_first();

        h.controller.handle_event(PlatformEvent::ConnectFailed {
            id: DeviceId(99),
            error: Some("timed out".to_string()),
        });
        assert!(h.state().is_connected);
        assert_eq!(h.state().status_message, "Ready to control LED");
        assert_eq!(h.controller.phase(), ConnectionPhase::Connected);

        h.controller.set_led_state(true);
        assert_eq!(h.state().status_message, "LED turned ON");
        assert_eq!(h.probe.written(), vec![vec![0x01]]);

        h.pump();
        h.controller.disconnect();
        h.pump();
        assert!(!h.state().is_connected);
        assert_eq!(h.state().status_message, "Disconnected");
    }

    #[test]
    fn test_connect_while_pending_replaces_peripheral() {
        let mut h = Harness::new(vec![led(1), SimulatedPeripheral::new(2, Some("Desk"))]);
        h.controller.start_scanning();
        h.pump();
        let first = h.state().discovered_devices[0].clone();
        let second = h.state().discovered_devices[1].clone();

        h.controller.connect(&first);
        h.controller.connect(&second);
        assert_eq!(h.state().status_message, "Connecting to Desk...");
        assert_eq!(h.controller.phase(), ConnectionPhase::Connecting);

        h.pump();
        assert!(h.state().is_connected);
        assert_eq!(h.state().connected_device, Some(second));
        assert_eq!(h.state().status_message, "Ready to control LED");

        h.controller.set_led_state(true);
        assert_eq!(h.probe.written(), vec![vec![0x01]]);
    }

    #[test]
    fn test_stale_disconnect_is_ignored() {
        let mut h = Harness::new(vec![led(1)]);
        h.connect_first();

        h.probe.drop_link(DeviceId(7), "gone");
        h.pump();
        assert!(h.state().is_connected);
        assert!(h.controller.led_characteristic().is_some());
    }

    #[test]
    fn test_scan_refused_by_adapter() {
        let mut h = Harness::new(vec![led(1)]);
        h.pump();
        // adapter goes down before the controller hears about it
        h.probe.set_radio_state(RadioState::PoweredOff);

        h.controller.start_scanning();
        assert!(!h.state().is_scanning);
        assert!(h.controller.scan_deadline().is_none());
        assert!(h.state().status_message.starts_with("Scan failed: "));
        assert!(h.state().discovered_devices.is_empty());
    }

    #[test]
    fn test_missing_led_characteristic() {
        let mut bare = led(1);
        bare.characteristics.clear();
        let mut h = Harness::new(vec![bare]);
        h.connect_first();

        assert!(h.state().is_connected);
        assert!(h.controller.led_characteristic().is_none());
        assert_eq!(h.state().status_message, "LED characteristic not found");
    }

    #[test]
    fn test_discovery_failure_reported() {
        let mut h = Harness::new(vec![led(1)]);
        h.connect_first();

        h.controller.handle_event(PlatformEvent::DiscoveryFailed {
            id: DeviceId(1),
            error: "GATT unreachable".to_string(),
        });
        assert_eq!(h.state().status_message, "Discovery failed: GATT unreachable");

        h.controller.handle_event(PlatformEvent::DiscoveryFailed {
            id: DeviceId(5),
            error: "other".to_string(),
        });
        assert_eq!(h.state().status_message, "Discovery failed: GATT unreachable");
    }

    #[test]
    fn test_battery_notifications() {
        let mut h = Harness::new(vec![led(1).with_battery("3.70")]);
        h.connect_first();
        assert_eq!(h.state().battery_voltage, "3.70");
        assert_eq!(h.state().battery_percentage, 58);

        h.probe.notify_battery(DeviceId(1), "bogus");
        h.pump();
        assert_eq!(h.state().battery_voltage, "bogus");
        assert_eq!(h.state().battery_percentage, 58);

        h.probe.drop_link(DeviceId(1), "gone");
        h.pump();
        assert_eq!(h.state().battery_voltage, NO_BATTERY_READING);
        assert_eq!(h.state().battery_percentage, 0);
    }

    #[test]
    fn test_discovery_ignored_while_connected() {
        let mut h = Harness::new(vec![led(1)]);
        h.connect_first();
        h.controller
            .handle_event(PlatformEvent::DeviceDiscovered(DeviceHandle::new(
                DeviceId(42),
                None,
            )));
        assert_eq!(h.state().discovered_devices.len(), 1);
    }

    #[test]
    fn test_led_command_bytes() {
        assert_eq!(LedCommand::On.as_bytes(), &[0x01]);
        assert_eq!(LedCommand::from_state(false).as_bytes(), &[0x00]);
    }
}
