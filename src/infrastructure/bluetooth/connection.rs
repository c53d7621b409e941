//! BLE Connection Module
//!
//! GATT access for one connected peripheral: opening the device, service
//! and characteristic lookup, acknowledged writes and notifications.

use crate::domain::models::DeviceId;
use crate::infrastructure::bluetooth::live::{guid_from_uuid, uuid_from_guid};
use anyhow::Result;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattClientCharacteristicConfigurationDescriptorValue,
    GattCommunicationStatus, GattDeviceService, GattSession, GattWriteOption,
};
use windows::Devices::Bluetooth::BluetoothLEDevice;
use windows::Storage::Streams::{DataReader, DataWriter, IBuffer};

/// Everything the live central keeps for the active link
pub struct GattLink {
    pub id: DeviceId,
    pub device: BluetoothLEDevice,
    pub session: Option<GattSession>,
    pub status_token: i64,
    pub services: HashMap<Uuid, GattDeviceService>,
    pub characteristics: HashMap<Uuid, GattCharacteristic>,
    pub value_tokens: Vec<(GattCharacteristic, i64)>,
}

impl GattLink {
    /// Release platform handlers and close the device
    pub fn close(self) {
        for (characteristic, token) in self.value_tokens {
            let _ = characteristic.RemoveValueChanged(token);
        }
        let _ = self.device.RemoveConnectionStatusChanged(self.status_token);
        if let Some(session) = self.session {
            let _ = session.Close();
        }
        for service in self.services.into_values() {
            let _ = service.Close();
        }
        let _ = self.device.Close();
        info!("Closed link to {}", self.id);
    }
}

/// Open a device by Bluetooth address
pub async fn open_device(address: u64) -> Result<BluetoothLEDevice> {
    let device = BluetoothLEDevice::FromBluetoothAddressAsync(address)?.await?;
    info!("Device opened: {:?}", device.Name()?);
    Ok(device)
}

/// Create a GattSession that keeps the link up between GATT operations
pub async fn maintain_connection(device: &BluetoothLEDevice) -> Option<GattSession> {
    let session = async {
        let device_id = device.BluetoothDeviceId()?;
        let session = GattSession::FromDeviceIdAsync(&device_id)?.await?;
        session.SetMaintainConnection(true)?;
        windows::core::Result::Ok(session)
    };

    match session.await {
        Ok(session) => {
            info!("GattSession created, MaintainConnection set to true");
            Some(session)
        }
        Err(e) => {
            warn!("Failed to create GattSession, continuing anyway: {}", e);
            None
        }
    }
}

/// Look up the requested services on the device
pub async fn services_for(
    device: &BluetoothLEDevice,
    wanted: &[Uuid],
) -> Result<Vec<GattDeviceService>> {
    let mut found = Vec::new();
    for uuid in wanted {
        let result = device
            .GetGattServicesForUuidAsync(guid_from_uuid(*uuid))?
            .await?;
        if result.Status()? != GattCommunicationStatus::Success {
            anyhow::bail!("Failed to get GATT services: {:?}", result.Status()?);
        }

        let services = result.Services()?;
        for i in 0..services.Size()? {
            found.push(services.GetAt(i)?);
        }
    }
    info!("Found {} matching service(s)", found.len());
    Ok(found)
}

/// Look up the requested characteristics within a service
pub async fn characteristics_for(
    service: &GattDeviceService,
    wanted: &[Uuid],
) -> Result<Vec<GattCharacteristic>> {
    let mut found = Vec::new();
    for uuid in wanted {
        let result = service
            .GetCharacteristicsForUuidAsync(guid_from_uuid(*uuid))?
            .await?;
        if result.Status()? != GattCommunicationStatus::Success {
            anyhow::bail!("Failed to get characteristics: {:?}", result.Status()?);
        }

        let characteristics = result.Characteristics()?;
        for i in 0..characteristics.Size()? {
            let c = characteristics.GetAt(i)?;
            info!("Found characteristic {}", uuid_from_guid(c.Uuid()?));
            found.push(c);
        }
    }
    Ok(found)
}

/// Acknowledged write
pub async fn write_with_response(characteristic: &GattCharacteristic, value: &[u8]) -> Result<()> {
    let writer = DataWriter::new()?;
    writer.WriteBytes(value)?;
    let buffer = writer.DetachBuffer()?;

    let status = characteristic
        .WriteValueWithOptionAsync(&buffer, GattWriteOption::WriteWithResponse)?
        .await?;
    if status != GattCommunicationStatus::Success {
        anyhow::bail!("{:?}", status);
    }
    Ok(())
}

/// Enable notifications on a characteristic
pub async fn enable_notifications(characteristic: &GattCharacteristic) -> Result<()> {
    let status = characteristic
        .WriteClientCharacteristicConfigurationDescriptorAsync(
            GattClientCharacteristicConfigurationDescriptorValue::Notify,
        )?
        .await?;
    if status != GattCommunicationStatus::Success {
        anyhow::bail!("Notification subscription returned status: {:?}", status);
    }
    Ok(())
}

/// Copy a WinRT buffer into a byte vector
pub fn read_buffer(buffer: &IBuffer) -> Result<Vec<u8>> {
    let reader = DataReader::FromBuffer(buffer)?;
    let mut bytes = vec![0u8; reader.UnconsumedBufferLength()? as usize];
    reader.ReadBytes(&mut bytes)?;
    Ok(bytes)
}
