use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Platform identity token of a peripheral (48-bit Bluetooth address)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// A discovered peripheral. Equality is by identity only, the advertised
/// name is informational.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    pub id: DeviceId,
    pub name: Option<String>,
}

impl DeviceHandle {
    pub fn new(id: DeviceId, name: Option<String>) -> Self {
        Self { id, name }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Device")
    }
}

impl PartialEq for DeviceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeviceHandle {}

impl Hash for DeviceHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Reference to a GATT characteristic within a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub uuid: Uuid,
}

/// Power/availability state reported by the local Bluetooth radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl RadioState {
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::PoweredOn => "Bluetooth is ready",
            Self::PoweredOff => "Bluetooth is powered off",
            Self::Unauthorized => "Bluetooth permission denied",
            Self::Unsupported => "Bluetooth not supported",
            Self::Unknown | Self::Resetting => "Bluetooth unavailable",
        }
    }
}

/// Asynchronous results delivered by the platform BLE stack
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    RadioStateChanged(RadioState),
    DeviceDiscovered(DeviceHandle),
    Connected(DeviceId),
    ConnectFailed {
        id: DeviceId,
        error: Option<String>,
    },
    Disconnected {
        id: DeviceId,
        error: Option<String>,
    },
    ServicesDiscovered {
        id: DeviceId,
        services: Vec<Uuid>,
    },
    CharacteristicsDiscovered {
        id: DeviceId,
        service: Uuid,
        characteristics: Vec<Uuid>,
    },
    DiscoveryFailed {
        id: DeviceId,
        error: String,
    },
    WriteCompleted {
        id: DeviceId,
        characteristic: CharacteristicRef,
        error: Option<String>,
    },
    ValueUpdated {
        id: DeviceId,
        characteristic: CharacteristicRef,
        value: Vec<u8>,
    },
}

/// User intents forwarded from the presentation layer
#[derive(Debug, Clone)]
pub enum ControllerCommand {
    StartScan,
    StopScan,
    Connect(DeviceHandle),
    Disconnect,
    SetLed(bool),
}

/// Observable controller state, published to the UI as snapshots
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub is_scanning: bool,
    pub is_connected: bool,
    pub discovered_devices: Vec<DeviceHandle>,
    pub status_message: String,
    pub led_state: bool,
    pub battery_percentage: u8,
    pub battery_voltage: String,
    pub connected_device: Option<DeviceHandle>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            is_scanning: false,
            is_connected: false,
            discovered_devices: Vec::new(),
            status_message: "Ready to scan".to_string(),
            led_state: false,
            battery_percentage: 0,
            battery_voltage: NO_BATTERY_READING.to_string(),
            connected_device: None,
        }
    }
}

/// Voltage text shown before the first battery notification
pub const NO_BATTERY_READING: &str = "--";

/// Coarse lifecycle phase, derived from the controller's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Idle,
    Scanning,
    Connecting,
    Connected,
}
