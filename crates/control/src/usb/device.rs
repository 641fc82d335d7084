//! USB device handle
//!
//! Wraps an open rusb handle as a protocol `Transport`.

use super::transfers::{execute_control_transfer, map_rusb_error, read_descriptor};
use protocol::{DeviceInfo, SetupPacket, Transport, UsbError};
use rusb::{Context, DeviceHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Open Audio-Widget handle
pub struct RusbHandle {
    /// Underlying rusb handle
    handle: DeviceHandle<Context>,
    /// Enumeration record the handle was opened from
    info: DeviceInfo,
    /// Per-transfer timeout
    timeout: Duration,
}

impl RusbHandle {
    /// Wrap an opened handle
    ///
    /// Enables automatic kernel driver detach so claiming an interface
    /// bound to a kernel driver succeeds on Linux.
    pub fn new(mut handle: DeviceHandle<Context>, info: DeviceInfo, timeout: Duration) -> Self {
        match handle.set_auto_detach_kernel_driver(true) {
            Ok(()) => debug!("Automatic kernel driver detach enabled"),
            Err(rusb::Error::NotSupported) => {
                debug!("Kernel driver detach not supported on this platform")
            }
            Err(e) => warn!("Failed to enable kernel driver detach: {}", e),
        }

        Self {
            handle,
            info,
            timeout,
        }
    }
}

impl Transport for RusbHandle {
    fn claim_interface(&mut self, interface: u8) -> Result<(), UsbError> {
        self.handle
            .claim_interface(interface)
            .map_err(map_rusb_error)?;
        debug!("Claimed interface {}", interface);
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), UsbError> {
        self.handle
            .release_interface(interface)
            .map_err(map_rusb_error)?;
        debug!("Released interface {}", interface);
        Ok(())
    }

    fn control_transfer(
        &mut self,
        setup: SetupPacket,
        buffer: &mut [u8],
    ) -> Result<usize, UsbError> {
        execute_control_transfer(&self.handle, setup, buffer, self.timeout)
    }

    fn get_descriptor(
        &mut self,
        descriptor_type: u8,
        index: u8,
        lang_id: u16,
        buffer: &mut [u8],
    ) -> Result<usize, UsbError> {
        read_descriptor(
            &self.handle,
            descriptor_type,
            index,
            lang_id,
            buffer,
            self.timeout,
        )
    }
}

impl Drop for RusbHandle {
    fn drop(&mut self) {
        debug!(
            "Closed device {:04x}:{:04x} at bus {:03} address {:03}",
            self.info.vendor_id,
            self.info.product_id,
            self.info.bus_number,
            self.info.device_address
        );
    }
}
