//! USB transfer execution
//!
//! Synchronous control transfers over rusb with error mapping onto the
//! protocol's `UsbError`.

use protocol::transport::GET_DESCRIPTOR;
use protocol::types::{Direction, Recipient, RequestKind, request_type};
use protocol::{SetupPacket, UsbError};
use rusb::{Context, DeviceHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for control transfers
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// bmRequestType of GET_DESCRIPTOR (0x80)
const STANDARD_IN: u8 = request_type(
    Direction::DeviceToHost,
    RequestKind::Standard,
    Recipient::Device,
);

/// Execute a control transfer
///
/// Device-to-host setups read up to `buffer.len()` bytes into `buffer`;
/// host-to-device setups send `buffer` as the data stage.
pub fn execute_control_transfer(
    handle: &DeviceHandle<Context>,
    setup: SetupPacket,
    buffer: &mut [u8],
    timeout: Duration,
) -> Result<usize, UsbError> {
    debug!(
        "Control transfer: request_type={:#x}, request={:#x}, value={:#x}, index={:#x}, len={}",
        setup.request_type,
        setup.request,
        setup.value,
        setup.index,
        buffer.len()
    );

    let result = if setup.is_in() {
        handle.read_control(
            setup.request_type,
            setup.request,
            setup.value,
            setup.index,
            buffer,
            timeout,
        )
    } else {
        handle.write_control(
            setup.request_type,
            setup.request,
            setup.value,
            setup.index,
            buffer,
            timeout,
        )
    };

    result.map_err(|e| {
        warn!("Control transfer failed: {}", e);
        map_rusb_error(e)
    })
}

/// Read a standard descriptor with GET_DESCRIPTOR
pub fn read_descriptor(
    handle: &DeviceHandle<Context>,
    descriptor_type: u8,
    index: u8,
    lang_id: u16,
    buffer: &mut [u8],
    timeout: Duration,
) -> Result<usize, UsbError> {
    let setup = SetupPacket {
        request_type: STANDARD_IN,
        request: GET_DESCRIPTOR,
        value: descriptor_value(descriptor_type, index),
        index: lang_id,
    };
    execute_control_transfer(handle, setup, buffer, timeout)
}

/// wValue of GET_DESCRIPTOR: type in the high byte, index in the low byte
fn descriptor_value(descriptor_type: u8, index: u8) -> u16 {
    (u16::from(descriptor_type) << 8) | u16::from(index)
}

/// Map rusb::Error to protocol::UsbError
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::Pipe => UsbError::Pipe,
        rusb::Error::NoDevice => UsbError::NoDevice,
        rusb::Error::NotFound => UsbError::NotFound,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Overflow => UsbError::Overflow,
        rusb::Error::Io => UsbError::Io,
        rusb::Error::InvalidParam => UsbError::InvalidParam,
        rusb::Error::Access => UsbError::Access,
        _ => UsbError::Other {
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert_eq!(map_rusb_error(rusb::Error::Timeout), UsbError::Timeout);
        assert_eq!(map_rusb_error(rusb::Error::Pipe), UsbError::Pipe);
        assert_eq!(map_rusb_error(rusb::Error::NoDevice), UsbError::NoDevice);
        assert_eq!(map_rusb_error(rusb::Error::Access), UsbError::Access);
        assert!(matches!(
            map_rusb_error(rusb::Error::NotSupported),
            UsbError::Other { .. }
        ));
    }

    #[test]
    fn test_get_descriptor_setup() {
        assert_eq!(STANDARD_IN, 0x80);
        assert_eq!(GET_DESCRIPTOR, 0x06);
        assert_eq!(descriptor_value(0x03, 2), 0x0302);
        assert_eq!(descriptor_value(0x01, 0), 0x0100);
    }
}
