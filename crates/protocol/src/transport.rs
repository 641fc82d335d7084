//! Transport boundary
//!
//! The catalog protocol talks to hardware only through these two traits.
//! `UsbBus` enumerates and opens devices; `Transport` is one open handle
//! that can claim an interface and run synchronous control transfers.

use crate::error::{ProtocolError, Result};
use crate::types::{
    DESCRIPTOR_CONFIGURATION, DESCRIPTOR_DEVICE, DESCRIPTOR_STRING, DeviceInfo, DeviceMatcher,
    SetupPacket, TRANSFER_BUFFER_SIZE, UsbError, VendorCommand,
};
use tracing::{debug, warn};

/// Interface claimed around every vendor transfer
pub const CONTROL_INTERFACE: u8 = 0;

/// Standard GET_DESCRIPTOR request code
pub const GET_DESCRIPTOR: u8 = 0x06;

/// An open USB device handle
pub trait Transport {
    /// Claim an interface for exclusive use
    fn claim_interface(&mut self, interface: u8) -> std::result::Result<(), UsbError>;

    /// Release a previously claimed interface
    fn release_interface(&mut self, interface: u8) -> std::result::Result<(), UsbError>;

    /// Execute one control transfer, returning the number of bytes transferred
    fn control_transfer(
        &mut self,
        setup: SetupPacket,
        buffer: &mut [u8],
    ) -> std::result::Result<usize, UsbError>;

    /// Issue a standard GET_DESCRIPTOR request
    fn get_descriptor(
        &mut self,
        descriptor_type: u8,
        index: u8,
        lang_id: u16,
        buffer: &mut [u8],
    ) -> std::result::Result<usize, UsbError>;
}

/// Device enumeration and opening
pub trait UsbBus {
    /// Handle type produced by `open`
    type Handle: Transport;

    /// List attached devices in enumeration order
    fn devices(&self) -> std::result::Result<Vec<DeviceInfo>, UsbError>;

    /// Open a device from the enumeration
    fn open(&self, info: &DeviceInfo) -> std::result::Result<Self::Handle, UsbError>;
}

/// First enumerated device accepted by the matcher
pub fn find_device<B: UsbBus>(bus: &B, matcher: &DeviceMatcher) -> Result<DeviceInfo> {
    let devices = bus.devices().map_err(|source| {
        warn!("Failed to enumerate USB devices: {}", source);
        ProtocolError::Enumerate { source }
    })?;

    devices
        .into_iter()
        .find(|info| matcher.matches(info))
        .ok_or(ProtocolError::DeviceNotFound)
}

/// Find and open the first matching device
pub fn open_device<B: UsbBus>(bus: &B, matcher: &DeviceMatcher) -> Result<B::Handle> {
    let info = find_device(bus, matcher)?;
    debug!(
        "Opening {:04x}:{:04x} at bus {:03} address {:03}",
        info.vendor_id, info.product_id, info.bus_number, info.device_address
    );

    bus.open(&info).map_err(|source| {
        warn!("Failed to open device: {}", source);
        ProtocolError::Open {
            bus: info.bus_number,
            address: info.device_address,
            source,
        }
    })
}

/// Run one vendor command with the control interface claimed
///
/// The interface is released on both success and failure. The response
/// buffer is zeroed before every transfer.
pub fn vendor_request<T: Transport + ?Sized>(
    transport: &mut T,
    command: VendorCommand,
    buffer: &mut [u8; TRANSFER_BUFFER_SIZE],
) -> Result<usize> {
    let setup = command.setup();
    buffer.fill(0);

    let to_error = |source: UsbError| ProtocolError::Transport {
        request: setup.request,
        value: setup.value,
        index: setup.index,
        source,
    };

    transport.claim_interface(CONTROL_INTERFACE).map_err(to_error)?;
    let result = transport.control_transfer(setup, buffer);
    if let Err(e) = transport.release_interface(CONTROL_INTERFACE) {
        warn!("Failed to release interface {}: {}", CONTROL_INTERFACE, e);
    }

    match result {
        Ok(len) => {
            let len = len.min(buffer.len());
            debug!(
                "Vendor request {:#04x}/{}/{}: {} bytes",
                setup.request, setup.value, setup.index, len
            );
            Ok(len)
        }
        Err(e) => {
            warn!(
                "Vendor request {:#04x}/{}/{} failed: {}",
                setup.request, setup.value, setup.index, e
            );
            Err(to_error(e))
        }
    }
}

/// Read a descriptor into a fresh buffer, returning the transferred bytes
pub fn read_descriptor<T: Transport + ?Sized>(
    transport: &mut T,
    descriptor_type: u8,
    index: u8,
    lang_id: u16,
) -> Result<Vec<u8>> {
    let mut buffer = [0u8; TRANSFER_BUFFER_SIZE];
    let len = transport
        .get_descriptor(descriptor_type, index, lang_id, &mut buffer)
        .map_err(|source| ProtocolError::Transport {
            request: GET_DESCRIPTOR,
            value: (u16::from(descriptor_type) << 8) | u16::from(index),
            index: lang_id,
            source,
        })?;

    Ok(buffer[..len.min(buffer.len())].to_vec())
}

/// Read the device descriptor bytes
pub fn read_device_descriptor<T: Transport + ?Sized>(transport: &mut T) -> Result<Vec<u8>> {
    read_descriptor(transport, DESCRIPTOR_DEVICE, 0, 0)
}

/// Read the first configuration descriptor bytes
pub fn read_configuration_descriptor<T: Transport + ?Sized>(
    transport: &mut T,
) -> Result<Vec<u8>> {
    read_descriptor(transport, DESCRIPTOR_CONFIGURATION, 0, 0)
}

/// Read a string descriptor's raw bytes
pub fn read_string_descriptor<T: Transport + ?Sized>(
    transport: &mut T,
    index: u8,
) -> Result<Vec<u8>> {
    read_descriptor(transport, DESCRIPTOR_STRING, index, 0)
}
