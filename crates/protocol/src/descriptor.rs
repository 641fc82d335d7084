//! Descriptor reader
//!
//! Reads the standard device and configuration descriptors of an opened
//! device and its product, manufacturer and serial number strings.

use crate::codec::{
    decode_string_descriptor, parse_configuration_descriptor, parse_device_descriptor,
};
use crate::error::Result;
use crate::transport::{
    Transport, read_configuration_descriptor, read_device_descriptor, read_string_descriptor,
};
use crate::types::DeviceIdentity;
use tracing::{debug, warn};

/// Read and decode the identity of an opened device
///
/// Fails if the device or configuration descriptor cannot be read. String
/// descriptors are best effort: an unreadable string is reported as `None`.
pub fn read_identity<T: Transport + ?Sized>(transport: &mut T) -> Result<DeviceIdentity> {
    let device = parse_device_descriptor(&read_device_descriptor(transport)?)?;
    let configuration =
        parse_configuration_descriptor(&read_configuration_descriptor(transport)?)?;

    let product = read_string(transport, device.product_index);
    let manufacturer = read_string(transport, device.manufacturer_index);
    let serial_number = read_string(transport, device.serial_number_index);

    Ok(DeviceIdentity {
        device,
        configuration,
        product,
        manufacturer,
        serial_number,
    })
}

fn read_string<T: Transport + ?Sized>(transport: &mut T, index: u8) -> Option<String> {
    // index 0 means the device has no such string
    if index == 0 {
        return None;
    }

    match read_string_descriptor(transport, index) {
        Ok(bytes) => {
            let text = decode_string_descriptor(&bytes);
            debug!("String descriptor {}: {:?}", index, text);
            Some(text)
        }
        Err(e) => {
            warn!("Failed to read string descriptor {}: {}", index, e);
            None
        }
    }
}
