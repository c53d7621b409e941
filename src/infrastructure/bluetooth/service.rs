//! Controller Service Module
//!
//! Runs the [`DeviceController`] on its own thread and single-threaded tokio
//! runtime. User intents and platform events are funneled into one loop, so
//! every state mutation happens in one place; the resulting state is
//! published to the UI through a watch channel.

use crate::domain::controller::DeviceController;
use crate::domain::models::{ControllerCommand, ControllerState, PlatformEvent};
use crate::domain::ports::BleCentral;
use crate::domain::settings::{Backend, Settings, SimulatedDeviceSettings};
use crate::infrastructure::bluetooth::simulated::{SimulatedCentral, SimulatedPeripheral};
use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// UI-side handle to the running controller
pub struct ControllerHandle {
    command_sender: mpsc::UnboundedSender<ControllerCommand>,
    state_receiver: watch::Receiver<ControllerState>,
    backend: Backend,
}

impl ControllerHandle {
    /// Forward a user intent; returns false once the controller has stopped
    pub fn send(&self, command: ControllerCommand) -> bool {
        self.command_sender.send(command).is_ok()
    }

    /// Latest published state
    pub fn state(&self) -> ControllerState {
        self.state_receiver.borrow().clone()
    }

    /// Backend actually in use (after platform fallback)
    pub fn backend(&self) -> Backend {
        self.backend
    }
}

/// Start the controller thread for the configured backend
pub fn spawn(settings: &Settings) -> Result<ControllerHandle> {
    let config = settings.controller_config()?;
    let backend = effective_backend(settings.backend);
    let peripherals = simulated_peripherals(&settings.simulated_devices);

    let (command_sender, command_receiver) = mpsc::unbounded_channel();
    let (state_sender, state_receiver) = watch::channel(ControllerState::default());

    std::thread::Builder::new()
        .name("ble-controller".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create tokio runtime for Bluetooth: {}", e);
                    return;
                }
            };

            rt.block_on(async move {
                let (event_sender, event_receiver) = mpsc::unbounded_channel();
                let central = build_central(backend, peripherals, event_sender);
                let controller = DeviceController::new(central, config);
                run(controller, command_receiver, event_receiver, state_sender).await;
            });
        })?;

    info!("Controller started with {:?} backend", backend);
    Ok(ControllerHandle {
        command_sender,
        state_receiver,
        backend,
    })
}

fn effective_backend(requested: Backend) -> Backend {
    if requested == Backend::Live && !cfg!(windows) {
        warn!("Live Bluetooth backend is not available on this platform, using simulated devices");
        return Backend::Simulated;
    }
    requested
}

/// Fake peripherals described in the settings file
fn simulated_peripherals(devices: &[SimulatedDeviceSettings]) -> Vec<SimulatedPeripheral> {
    devices
        .iter()
        .map(|device| {
            let peripheral = SimulatedPeripheral::new(device.address, device.name.as_deref());
            match &device.battery_voltage {
                Some(voltage) => peripheral.with_battery(voltage),
                None => peripheral,
            }
        })
        .collect()
}

fn build_central(
    backend: Backend,
    peripherals: Vec<SimulatedPeripheral>,
    event_sender: mpsc::UnboundedSender<PlatformEvent>,
) -> Box<dyn BleCentral> {
    match backend {
        #[cfg(windows)]
        Backend::Live => Box::new(super::live::WinRtCentral::new(event_sender)),
        _ => Box::new(SimulatedCentral::new(peripherals, event_sender)),
    }
}

/// Event loop: platform events first, then user intents, then the scan
/// deadline. Returns when every command sender is gone.
pub async fn run(
    mut controller: DeviceController,
    mut commands: mpsc::UnboundedReceiver<ControllerCommand>,
    mut events: mpsc::UnboundedReceiver<PlatformEvent>,
    state: watch::Sender<ControllerState>,
) {
    publish(&state, controller.state());

    loop {
        let deadline = controller.scan_deadline();
        tokio::select! {
            biased;

            Some(event) = events.recv() => controller.handle_event(event),
            command = commands.recv() => match command {
                Some(command) => apply(&mut controller, command),
                None => break,
            },
            _ = wait_until(deadline) => controller.on_scan_timeout(Instant::now()),
        }

        publish(&state, controller.state());
    }

    info!("Controller loop stopped");
}

fn apply(controller: &mut DeviceController, command: ControllerCommand) {
    debug!("Command: {:?}", command);
    match command {
        ControllerCommand::StartScan => controller.start_scanning(),
        ControllerCommand::StopScan => controller.stop_scanning(),
        ControllerCommand::Connect(device) => controller.connect(&device),
        ControllerCommand::Disconnect => controller.disconnect(),
        ControllerCommand::SetLed(on) => controller.set_led_state(on),
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn publish(sender: &watch::Sender<ControllerState>, state: &ControllerState) {
    sender.send_if_modified(|current| {
        if current == state {
            return false;
        }
        if current.status_message != state.status_message {
            info!("Status: {}", state.status_message);
        }
        *current = state.clone();
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    struct Running {
        commands: mpsc::UnboundedSender<ControllerCommand>,
        state: watch::Receiver<ControllerState>,
        task: JoinHandle<()>,
    }

    fn start(peripherals: Vec<SimulatedPeripheral>) -> Running {
        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let central = SimulatedCentral::new(peripherals, event_sender);
        let controller = DeviceController::new(Box::new(central), protocol::default_config());
        let (state_sender, state_receiver) = watch::channel(ControllerState::default());
        let task = tokio::spawn(run(
            controller,
            command_receiver,
            event_receiver,
            state_sender,
        ));
        Running {
            commands: command_sender,
            state: state_receiver,
            task,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_stops_after_window() {
        let running = start(Vec::new());
        running.commands.send(ControllerCommand::StartScan).unwrap();

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(running.state.borrow().is_scanning);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let state = running.state.borrow().clone();
        assert!(!state.is_scanning);
        assert_eq!(state.status_message, "No devices found");

        drop(running.commands);
        running.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescan_rearms_window() {
        let running = start(Vec::new());
        running.commands.send(ControllerCommand::StartScan).unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        running.commands.send(ControllerCommand::StartScan).unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(running.state.borrow().is_scanning);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!running.state.borrow().is_scanning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_led_end_to_end() {
        let mut running = start(vec![SimulatedPeripheral::new(0x42, Some("ESP32-LED"))]);
        running.commands.send(ControllerCommand::StartScan).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let device = running.state.borrow().discovered_devices[0].clone();
        running.commands.send(ControllerCommand::Connect(device)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(running.state.borrow().status_message, "Ready to control LED");

        let _ = running.state.borrow_and_update();
        running.commands.send(ControllerCommand::SetLed(true)).unwrap();
        running.state.changed().await.unwrap();
        let state = running.state.borrow_and_update().clone();
        assert!(state.led_state);
        assert_eq!(state.status_message, "LED turned ON");

        running.commands.send(ControllerCommand::Disconnect).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = running.state.borrow().clone();
        assert!(!state.is_connected);
        assert!(!state.led_state);
        assert_eq!(state.status_message, "Disconnected");
    }

    #[test]
    fn test_simulated_peripherals_from_settings() {
        let devices = vec![
            SimulatedDeviceSettings {
                address: 0x10,
                name: Some("ESP32-LED".to_string()),
                battery_voltage: Some("3.92".to_string()),
            },
            SimulatedDeviceSettings {
                address: 0x11,
                name: None,
                battery_voltage: None,
            },
        ];

        let peripherals = simulated_peripherals(&devices);
        assert_eq!(peripherals.len(), 2);
        assert_eq!(peripherals[0].battery_voltage.as_deref(), Some("3.92"));
        assert!(peripherals[0]
            .characteristics
            .contains(&protocol::BATTERY_CHAR_UUID));
        assert_eq!(peripherals[1].name, None);
        assert_eq!(peripherals[1].characteristics, vec![protocol::LED_CHAR_UUID]);
    }

    #[test]
    fn test_live_falls_back_off_windows() {
        let backend = effective_backend(Backend::Live);
        if cfg!(windows) {
            assert_eq!(backend, Backend::Live);
        } else {
            assert_eq!(backend, Backend::Simulated);
        }
        assert_eq!(effective_backend(Backend::Simulated), Backend::Simulated);
    }
}
