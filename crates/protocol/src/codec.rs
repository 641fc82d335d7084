//! Wire decoding for the catalog protocol and the descriptor reader
//!
//! The device streams value strings with their bytes in reverse order, and
//! string descriptors come back as UTF-16LE text behind a two-byte header.
//! Both formats are fixed by the firmware and are decoded here bit-for-bit.

use crate::error::{ProtocolError, Result};
use crate::types::{ConfigurationDescriptor, DeviceDescriptor};
use byteorder::{ByteOrder, LittleEndian};

/// Length of a standard device descriptor
pub const DEVICE_DESCRIPTOR_LEN: usize = 18;
/// Length of a configuration descriptor header
pub const CONFIGURATION_DESCRIPTOR_LEN: usize = 9;

/// Decode a value-string response
///
/// The transferred bytes are read from last to first, each byte becoming one
/// character (Latin-1).
pub fn decode_value_string(response: &[u8]) -> String {
    response.iter().rev().map(|&b| char::from(b)).collect()
}

/// Decode a string descriptor response
///
/// The whole buffer is decoded as UTF-16LE and the first decoded character
/// (the bLength/bDescriptorType header unit) is dropped. A trailing odd byte
/// is ignored; unpaired surrogates become U+FFFD.
pub fn decode_string_descriptor(response: &[u8]) -> String {
    let units = response.chunks_exact(2).map(LittleEndian::read_u16);

    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .skip(1)
        .collect()
}

/// Parse a standard device descriptor
pub fn parse_device_descriptor(data: &[u8]) -> Result<DeviceDescriptor> {
    ensure_len("device", data, DEVICE_DESCRIPTOR_LEN)?;

    Ok(DeviceDescriptor {
        usb_version: LittleEndian::read_u16(&data[2..4]),
        class: data[4],
        subclass: data[5],
        protocol: data[6],
        max_packet_size: data[7],
        vendor_id: LittleEndian::read_u16(&data[8..10]),
        product_id: LittleEndian::read_u16(&data[10..12]),
        device_version: LittleEndian::read_u16(&data[12..14]),
        manufacturer_index: data[14],
        product_index: data[15],
        serial_number_index: data[16],
        num_configurations: data[17],
    })
}

/// Parse the header of a configuration descriptor
pub fn parse_configuration_descriptor(data: &[u8]) -> Result<ConfigurationDescriptor> {
    ensure_len("configuration", data, CONFIGURATION_DESCRIPTOR_LEN)?;

    Ok(ConfigurationDescriptor {
        total_length: LittleEndian::read_u16(&data[2..4]),
        num_interfaces: data[4],
        configuration_value: data[5],
        configuration_index: data[6],
        attributes: data[7],
        max_power: data[8],
    })
}

fn ensure_len(kind: &'static str, data: &[u8], needed: usize) -> Result<()> {
    if data.len() < needed {
        return Err(ProtocolError::ShortDescriptor {
            kind,
            needed,
            actual: data.len(),
        });
    }
    Ok(())
}
