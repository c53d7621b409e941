//! ESP32-LED peripheral protocol
//!
//! The peripheral advertises one service holding a write-with-response LED
//! characteristic (one byte, `0x01` on / `0x00` off) and an optional
//! notifying battery characteristic carrying the cell voltage as ASCII text.

use crate::domain::controller::{ControllerConfig, DEFAULT_SCAN_TIMEOUT};
use crate::domain::ports::BleError;
use uuid::Uuid;

/// LED controller service UUID
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// LED command characteristic UUID
pub const LED_CHAR_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// Battery voltage characteristic UUID
pub const BATTERY_CHAR_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a9);

/// Configuration matching the stock firmware
pub fn default_config() -> ControllerConfig {
    ControllerConfig {
        service_uuid: SERVICE_UUID,
        led_char_uuid: LED_CHAR_UUID,
        battery_char_uuid: Some(BATTERY_CHAR_UUID),
        scan_timeout: DEFAULT_SCAN_TIMEOUT,
    }
}

/// Parse a UUID string as found in the settings file
pub fn parse_uuid(uuid_str: &str) -> Result<Uuid, BleError> {
    Uuid::parse_str(uuid_str.trim()).map_err(|_| BleError::InvalidUuid(uuid_str.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uuid() {
        let uuid = parse_uuid("4fafc201-1fb5-459e-8fcc-c5c9c331914b").unwrap();
        assert_eq!(uuid, SERVICE_UUID);
        assert_eq!(uuid.as_fields().0, 0x4fafc201);
    }

    #[test]
    fn test_parse_uuid_rejects_garbage() {
        assert!(matches!(
            parse_uuid("4fafc201-1fb5"),
            Err(BleError::InvalidUuid(_))
        ));
    }

    #[test]
    fn test_uuid_constants_render() {
        assert_eq!(
            LED_CHAR_UUID.to_string(),
            "beb5483e-36e1-4688-b7f5-ea07361b26a8"
        );
    }
}
