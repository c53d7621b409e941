//! BLE Scanner Module
//!
//! Advertisement watcher that reports peripherals advertising the LED
//! service.

use crate::domain::models::{DeviceHandle, DeviceId, PlatformEvent};
use crate::domain::ports::BleResult;
use crate::infrastructure::bluetooth::live::{guid_from_uuid, platform_error};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Foundation::TypedEventHandler;

pub struct BleScanner {
    watcher: Option<BluetoothLEAdvertisementWatcher>,
    event_sender: mpsc::UnboundedSender<PlatformEvent>,
}

impl BleScanner {
    pub fn new(event_sender: mpsc::UnboundedSender<PlatformEvent>) -> Self {
        Self {
            watcher: None,
            event_sender,
        }
    }

    /// Start watching for advertisements carrying `service`
    pub fn start(&mut self, service: Uuid) -> BleResult<()> {
        // A restart replaces the running watcher
        self.stop()?;

        info!("Starting BLE scan for service UUID: {}", service);
        let watcher = BluetoothLEAdvertisementWatcher::new().map_err(platform_error)?;
        watcher
            .SetScanningMode(BluetoothLEScanningMode::Active)
            .map_err(platform_error)?;

        let sender = self.event_sender.clone();
        let target = guid_from_uuid(service);

        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let adv = args.Advertisement()?;
                    let service_uuids = adv.ServiceUuids()?;

                    let mut found = false;
                    for i in 0..service_uuids.Size()? {
                        if service_uuids.GetAt(i)? == target {
                            found = true;
                            break;
                        }
                    }

                    if found {
                        let name = adv.LocalName()?.to_string();
                        let device = DeviceHandle::new(
                            DeviceId(args.BluetoothAddress()?),
                            (!name.is_empty()).then_some(name),
                        );
                        let _ = sender.send(PlatformEvent::DeviceDiscovered(device));
                    }
                }
                Ok(())
            },
        );

        watcher.Received(&handler).map_err(platform_error)?;
        watcher.Start().map_err(platform_error)?;
        self.watcher = Some(watcher);

        Ok(())
    }

    pub fn stop(&mut self) -> BleResult<()> {
        if let Some(watcher) = self.watcher.take() {
            info!("Stopping BLE scan...");
            watcher.Stop().map_err(platform_error)?;
        }
        Ok(())
    }

    pub fn is_scanning(&self) -> bool {
        self.watcher.is_some()
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
