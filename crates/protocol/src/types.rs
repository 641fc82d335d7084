//! USB and protocol type definitions
//!
//! This module defines the feature table, the setup packet encoding, the
//! vendor command table and the device identity types shared by the catalog
//! protocol, the transport shim and the presentation layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the response buffer used for every control transfer
pub const TRANSFER_BUFFER_SIZE: usize = 256;

/// Vendor request carrying the catalog commands (size, value string, read, write)
pub const REQUEST_FEATURE: u8 = 0x71;
/// Vendor request for a soft reset
pub const REQUEST_RESET: u8 = 0x0F;
/// Vendor request for a factory reset
pub const REQUEST_FACTORY_RESET: u8 = 0x41;

/// wValue of the catalog "get" commands (catalog size and current selection)
pub const FEATURE_VALUE_GET: u16 = 4;
/// wValue of the catalog "get value string" command
pub const FEATURE_VALUE_STRING: u16 = 8;
/// wValue of the catalog "set" command
pub const FEATURE_VALUE_SET: u16 = 3;

/// wIndex offset of per-feature addressing; indices below it are catalog metadata
pub const FEATURE_INDEX_BASE: u16 = 2;

/// First byte of a value-string response that ends the catalog stream
pub const END_OF_STREAM: u8 = 63;
/// Decoded value string that advances to the next feature
pub const FEATURE_SEPARATOR: &str = "end";
/// Highest global value index the catalog scan will request
pub const SCAN_CAP: u16 = 100;

/// Vendor IDs accepted during device discovery
pub const ACCEPTED_VENDOR_IDS: [u16; 2] = [0x16c0, 0xfffe];
/// Product IDs accepted during device discovery
pub const ACCEPTED_PRODUCT_IDS: [u16; 4] = [0x05dc, 0x03e8, 0x0007, 0x03e9];

/// Standard descriptor types used by the descriptor reader
pub const DESCRIPTOR_DEVICE: u8 = 0x01;
pub const DESCRIPTOR_CONFIGURATION: u8 = 0x02;
pub const DESCRIPTOR_STRING: u8 = 0x03;

/// Feature identifier
///
/// Small integer id the device uses to address one configurable attribute.
/// The device may advertise ids beyond the compiled-in table; those have no
/// name and no slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureId(pub u8);

impl FeatureId {
    /// Canonical name from the feature table, if the id is known
    pub fn name(self) -> Option<&'static str> {
        FEATURES
            .iter()
            .find(|descriptor| descriptor.id == self)
            .map(|descriptor| descriptor.name)
    }

    /// Next feature id in catalog-stream order
    pub fn next(self) -> Self {
        FeatureId(self.0.saturating_add(1))
    }

    /// wIndex used to read this feature's current value index
    pub fn read_index(self) -> u16 {
        FEATURE_INDEX_BASE + u16::from(self.0)
    }

    /// wIndex used to set this feature to the given global value index
    ///
    /// The value index occupies the high byte of the 16-bit wIndex field.
    pub fn write_index(self, value_index: u16) -> u16 {
        self.read_index()
            .wrapping_add(value_index.wrapping_mul(256))
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "feature#{}", self.0),
        }
    }
}

/// Static feature table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureDescriptor {
    pub id: FeatureId,
    pub name: &'static str,
}

/// Compiled-in feature table, in id order
pub const FEATURES: [FeatureDescriptor; 10] = [
    FeatureDescriptor { id: FeatureId(0), name: "BoardType" },
    FeatureDescriptor { id: FeatureId(1), name: "ImageType" },
    FeatureDescriptor { id: FeatureId(2), name: "InType" },
    FeatureDescriptor { id: FeatureId(3), name: "OutType" },
    FeatureDescriptor { id: FeatureId(4), name: "AdcType" },
    FeatureDescriptor { id: FeatureId(5), name: "DacType" },
    FeatureDescriptor { id: FeatureId(6), name: "LcdType" },
    FeatureDescriptor { id: FeatureId(7), name: "LogType" },
    FeatureDescriptor { id: FeatureId(8), name: "FilterType" },
    FeatureDescriptor { id: FeatureId(9), name: "LQuirkType" },
];

/// Resolve a feature name (case-insensitive) to its id
pub fn feature_by_name(name: &str) -> Option<FeatureId> {
    let wanted = name.to_uppercase();
    FEATURES
        .iter()
        .find(|descriptor| descriptor.name.to_uppercase() == wanted)
        .map(|descriptor| descriptor.id)
}

/// bmRequestType direction bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToDevice = 0,
    DeviceToHost = 1,
}

/// bmRequestType type field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Standard = 0,
    Class = 1,
    Vendor = 2,
}

/// bmRequestType recipient field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Device = 0,
    Interface = 1,
    Endpoint = 2,
    Other = 3,
}

/// Encode bmRequestType as `(direction << 7) | (type << 5) | recipient`
pub const fn request_type(direction: Direction, kind: RequestKind, recipient: Recipient) -> u8 {
    ((direction as u8) << 7) | ((kind as u8) << 5) | (recipient as u8)
}

/// Request type used by every vendor command of the catalog protocol (0xC0)
pub const VENDOR_IN: u8 = request_type(Direction::DeviceToHost, RequestKind::Vendor, Recipient::Device);

/// Control transfer setup packet (without wLength, which is the buffer size)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetupPacket {
    /// Request type byte (bmRequestType)
    pub request_type: u8,
    /// Request byte (bRequest)
    pub request: u8,
    /// Value parameter (wValue)
    pub value: u16,
    /// Index parameter (wIndex)
    pub index: u16,
}

impl SetupPacket {
    /// Whether data flows from device to host
    pub fn is_in(&self) -> bool {
        self.request_type & 0x80 != 0
    }
}

/// Vendor command table of the catalog protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorCommand {
    /// `0x71/4/1`: number of value entries the device will stream
    CatalogSize,
    /// `0x71/8/i`: value string at global index `i`
    ValueString(u16),
    /// `0x71/4/(2+f)`: current global value index of feature `f`
    CurrentValue(FeatureId),
    /// `0x71/3/(2+f+idx*256)`: set feature `f` to global value index `idx`
    SetValue { feature: FeatureId, value_index: u16 },
    /// `0x0F/0/0`
    Reset,
    /// `0x41/0xFF/0`
    FactoryReset,
}

impl VendorCommand {
    /// Setup packet for this command
    pub fn setup(self) -> SetupPacket {
        let (request, value, index) = match self {
            VendorCommand::CatalogSize => (REQUEST_FEATURE, FEATURE_VALUE_GET, 1),
            VendorCommand::ValueString(i) => (REQUEST_FEATURE, FEATURE_VALUE_STRING, i),
            VendorCommand::CurrentValue(feature) => {
                (REQUEST_FEATURE, FEATURE_VALUE_GET, feature.read_index())
            }
            VendorCommand::SetValue {
                feature,
                value_index,
            } => (REQUEST_FEATURE, FEATURE_VALUE_SET, feature.write_index(value_index)),
            VendorCommand::Reset => (REQUEST_RESET, 0, 0),
            VendorCommand::FactoryReset => (REQUEST_FACTORY_RESET, 0xFF, 0),
        };

        SetupPacket {
            request_type: VENDOR_IN,
            request,
            value,
            index,
        }
    }
}

/// Enumeration record for one attached USB device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Whether the device is currently connected
    pub connected: bool,
}

/// Accepted VID/PID sets for device discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatcher {
    pub vendor_ids: Vec<u16>,
    pub product_ids: Vec<u16>,
}

impl Default for DeviceMatcher {
    fn default() -> Self {
        Self {
            vendor_ids: ACCEPTED_VENDOR_IDS.to_vec(),
            product_ids: ACCEPTED_PRODUCT_IDS.to_vec(),
        }
    }
}

impl DeviceMatcher {
    /// Vendor and product are in the accepted sets and the device is connected
    pub fn matches(&self, info: &DeviceInfo) -> bool {
        self.vendor_ids.contains(&info.vendor_id)
            && self.product_ids.contains(&info.product_id)
            && info.connected
    }
}

/// Decoded standard device descriptor fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub usb_version: u16,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub max_packet_size: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_version: u16,
    pub manufacturer_index: u8,
    pub product_index: u8,
    pub serial_number_index: u8,
    pub num_configurations: u8,
}

/// Decoded configuration descriptor header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationDescriptor {
    pub total_length: u16,
    pub num_interfaces: u8,
    pub configuration_value: u8,
    pub configuration_index: u8,
    pub attributes: u8,
    pub max_power: u8,
}

/// Identity of the opened device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device: DeviceDescriptor,
    pub configuration: ConfigurationDescriptor,
    pub product: Option<String>,
    pub manufacturer: Option<String>,
    pub serial_number: Option<String>,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Device: VID=0x{:04X}/PID=0x{:04X}",
            self.device.vendor_id, self.device.product_id
        )?;
        writeln!(f, "Product: {}", self.product.as_deref().unwrap_or(""))?;
        writeln!(f, "Manufacturer: {}", self.manufacturer.as_deref().unwrap_or(""))?;
        write!(f, "Serial number: {}", self.serial_number.as_deref().unwrap_or(""))
    }
}

/// USB transport errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsbError {
    /// Transfer timed out
    Timeout,
    /// Pipe error (endpoint stalled)
    Pipe,
    /// Device was disconnected
    NoDevice,
    /// Entity not found
    NotFound,
    /// Resource busy
    Busy,
    /// Overflow
    Overflow,
    /// I/O error
    Io,
    /// Invalid parameter
    InvalidParam,
    /// Access denied
    Access,
    /// Other error
    Other { message: String },
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::Timeout => write!(f, "transfer timed out"),
            UsbError::Pipe => write!(f, "pipe error"),
            UsbError::NoDevice => write!(f, "device disconnected"),
            UsbError::NotFound => write!(f, "entity not found"),
            UsbError::Busy => write!(f, "resource busy"),
            UsbError::Overflow => write!(f, "overflow"),
            UsbError::Io => write!(f, "I/O error"),
            UsbError::InvalidParam => write!(f, "invalid parameter"),
            UsbError::Access => write!(f, "access denied"),
            UsbError::Other { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for UsbError {}
