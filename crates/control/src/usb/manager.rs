//! USB device manager
//!
//! Enumerates devices through a libusb context and opens them as
//! `RusbHandle`s.

use super::device::RusbHandle;
use super::transfers::map_rusb_error;
use protocol::{DeviceInfo, UsbBus, UsbError};
use rusb::{Context, Device, UsbContext};
use std::time::Duration;
use tracing::{debug, warn};

/// libusb-backed bus
pub struct RusbBus {
    /// USB context for device operations
    context: Context,
    /// Per-transfer timeout handed to opened handles
    timeout: Duration,
}

impl RusbBus {
    /// Create a new libusb context
    pub fn new(timeout: Duration) -> Result<Self, rusb::Error> {
        let context = Context::new()?;
        Ok(Self { context, timeout })
    }

    fn find(&self, info: &DeviceInfo) -> Result<Device<Context>, UsbError> {
        let devices = self.context.devices().map_err(map_rusb_error)?;
        devices
            .iter()
            .find(|device| {
                device.bus_number() == info.bus_number && device.address() == info.device_address
            })
            .ok_or(UsbError::NoDevice)
    }
}

impl UsbBus for RusbBus {
    type Handle = RusbHandle;

    fn devices(&self) -> Result<Vec<DeviceInfo>, UsbError> {
        let devices = self.context.devices().map_err(map_rusb_error)?;

        let mut infos = Vec::with_capacity(devices.len());
        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(
                        "Failed to read device descriptor at bus {:03} address {:03}: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };

            // libusb only lists attached devices
            infos.push(DeviceInfo {
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
                bus_number: device.bus_number(),
                device_address: device.address(),
                connected: true,
            });
        }

        debug!("Enumerated {} devices", infos.len());
        Ok(infos)
    }

    fn open(&self, info: &DeviceInfo) -> Result<RusbHandle, UsbError> {
        let device = self.find(info)?;
        let handle = device.open().map_err(|e| {
            warn!("Failed to open device: {}", e);
            map_rusb_error(e)
        })?;

        debug!(
            "Opened device {:04x}:{:04x} at bus {:03} address {:03}",
            info.vendor_id, info.product_id, info.bus_number, info.device_address
        );
        Ok(RusbHandle::new(handle, info.clone(), self.timeout))
    }
}
