//! Test utilities for widget-control
//!
//! Provides a scripted Audio-Widget that implements the transport traits,
//! so the catalog protocol can be exercised without hardware.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{DeviceScript, MockBus};
//! use protocol::{DeviceSession, FeatureId};
//!
//! let script = DeviceScript::new()
//!     .with_feature(&["AB-1.x", "USB9023"])
//!     .with_current(FeatureId(0), 1);
//! let bus = MockBus::new(script);
//!
//! let mut session = DeviceSession::default();
//! session.initialize(&bus).unwrap();
//!
//! let slot = session.catalog().slot(FeatureId(0)).unwrap();
//! assert_eq!(slot.selected.as_deref(), Some("USB9023"));
//! ```

use protocol::types::{
    DESCRIPTOR_CONFIGURATION, DESCRIPTOR_DEVICE, DESCRIPTOR_STRING, END_OF_STREAM,
    FEATURE_INDEX_BASE, FEATURE_VALUE_GET, FEATURE_VALUE_SET, FEATURE_VALUE_STRING,
    REQUEST_FACTORY_RESET, REQUEST_FEATURE, REQUEST_RESET,
};
use protocol::{DeviceInfo, FeatureId, SetupPacket, Transport, UsbBus, UsbError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Vendor ID of the scripted device
pub const MOCK_VENDOR_ID: u16 = 0x16c0;
/// Product ID of the scripted device
pub const MOCK_PRODUCT_ID: u16 = 0x03e8;

/// Something the scripted device observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// Interface claimed
    Claim(u8),
    /// Interface released
    Release(u8),
    /// Control transfer received
    Control(SetupPacket),
    /// GET_DESCRIPTOR received
    Descriptor { descriptor_type: u8, index: u8 },
}

/// Behavior of the scripted device
///
/// Value strings are stored in wire order (bytes reversed), exactly as the
/// firmware sends them.
#[derive(Debug, Clone, Default)]
pub struct DeviceScript {
    /// Wire responses of the value-string command, by global index
    pub entries: Vec<Vec<u8>>,
    /// Catalog size override; defaults to `entries.len()`
    pub advertised: Option<u8>,
    /// Current global value index per feature id
    pub current: HashMap<u8, u8>,
    /// Setups (request, value, index) that fail with `UsbError::Pipe`
    pub failing: HashSet<(u8, u16, u16)>,
    /// Claiming the interface fails with `UsbError::Busy`
    pub fail_claim: bool,
    /// Product string descriptor
    pub product: String,
    /// Manufacturer string descriptor
    pub manufacturer: String,
    /// Serial number string descriptor
    pub serial_number: String,
}

impl DeviceScript {
    /// Empty catalog with the default identity strings
    pub fn new() -> Self {
        Self {
            product: "Audio-Widget".to_string(),
            manufacturer: "SDR-Widget".to_string(),
            serial_number: "0001".to_string(),
            ..Self::default()
        }
    }

    /// Realistic four-feature catalog with a current value for each feature
    pub fn audio_widget() -> Self {
        Self::new()
            .with_feature(&["AB-1.x", "USB9023", "QNKTC_future"])
            .with_feature(&["uac1_audio", "uac2_audio", "uac1_dg8saq", "uac2_dg8saq"])
            .with_feature(&["in_normal", "in_swapped"])
            .with_feature(&["out_normal", "out_swapped"])
            .with_current(FeatureId(0), 0)
            .with_current(FeatureId(1), 5)
            .with_current(FeatureId(2), 9)
            .with_current(FeatureId(3), 12)
    }

    /// Append one feature's values followed by the `"end"` marker
    pub fn with_feature(mut self, values: &[&str]) -> Self {
        for value in values {
            self.entries.push(wire_string(value));
        }
        self.entries.push(wire_string("end"));
        self
    }

    /// Append one raw wire response
    pub fn with_raw_entry(mut self, bytes: &[u8]) -> Self {
        self.entries.push(bytes.to_vec());
        self
    }

    /// Override the advertised catalog size
    pub fn with_advertised(mut self, count: u8) -> Self {
        self.advertised = Some(count);
        self
    }

    /// Set the current global value index of a feature
    pub fn with_current(mut self, feature: FeatureId, index: u8) -> Self {
        self.current.insert(feature.0, index);
        self
    }

    /// Make a specific setup fail
    pub fn failing_on(mut self, request: u8, value: u16, index: u16) -> Self {
        self.failing.insert((request, value, index));
        self
    }

    fn device_descriptor(&self) -> Vec<u8> {
        let vid = MOCK_VENDOR_ID.to_le_bytes();
        let pid = MOCK_PRODUCT_ID.to_le_bytes();
        vec![
            18, DESCRIPTOR_DEVICE, 0x00, 0x02, 0xEF, 0x02, 0x01, 64, vid[0], vid[1], pid[0],
            pid[1], 0x00, 0x01, 1, 2, 3, 1,
        ]
    }

    fn configuration_descriptor(&self) -> Vec<u8> {
        vec![9, DESCRIPTOR_CONFIGURATION, 0xC8, 0x00, 3, 1, 0, 0x80, 0xFA]
    }

    fn string_descriptor(&self, index: u8) -> Option<Vec<u8>> {
        let text = match index {
            1 => &self.manufacturer,
            2 => &self.product,
            3 => &self.serial_number,
            _ => return None,
        };
        Some(string_descriptor_bytes(text))
    }
}

/// Encode a value string the way the firmware sends it (bytes reversed)
pub fn wire_string(value: &str) -> Vec<u8> {
    value.bytes().rev().collect()
}

/// Encode a string descriptor (two-byte header + UTF-16LE text)
pub fn string_descriptor_bytes(text: &str) -> Vec<u8> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut bytes = vec![(2 + units.len() * 2) as u8, DESCRIPTOR_STRING];
    bytes.extend(units.iter().flat_map(|unit| unit.to_le_bytes()));
    bytes
}

/// Shared record of everything the scripted device saw
#[derive(Debug, Clone, Default)]
pub struct MockLog {
    events: Arc<Mutex<Vec<MockEvent>>>,
}

impl MockLog {
    fn push(&self, event: MockEvent) {
        lock(&self.events).push(event);
    }

    /// All recorded events in order
    pub fn events(&self) -> Vec<MockEvent> {
        lock(&self.events).clone()
    }

    /// Control transfer setups in order
    pub fn setups(&self) -> Vec<SetupPacket> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                MockEvent::Control(setup) => Some(*setup),
                _ => None,
            })
            .collect()
    }

    /// Setups with the given request and value
    pub fn setups_for(&self, request: u8, value: u16) -> Vec<SetupPacket> {
        self.setups()
            .into_iter()
            .filter(|setup| setup.request == request && setup.value == value)
            .collect()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One open handle to the scripted device
pub struct MockDevice {
    script: Arc<Mutex<DeviceScript>>,
    log: MockLog,
    claimed: HashSet<u8>,
}

impl MockDevice {
    /// Interfaces currently claimed
    pub fn claimed(&self) -> &HashSet<u8> {
        &self.claimed
    }

    fn respond(&self, setup: SetupPacket) -> Result<Vec<u8>, UsbError> {
        let mut script = lock(&self.script);
        if script
            .failing
            .contains(&(setup.request, setup.value, setup.index))
        {
            return Err(UsbError::Pipe);
        }

        match (setup.request, setup.value) {
            (REQUEST_FEATURE, FEATURE_VALUE_GET) if setup.index == 1 => {
                let count = script
                    .advertised
                    .unwrap_or(script.entries.len().min(255) as u8);
                Ok(vec![count])
            }
            (REQUEST_FEATURE, FEATURE_VALUE_GET) => {
                let feature = setup.index.wrapping_sub(FEATURE_INDEX_BASE) as u8;
                Ok(vec![script.current.get(&feature).copied().unwrap_or(0xFF)])
            }
            (REQUEST_FEATURE, FEATURE_VALUE_STRING) => Ok(script
                .entries
                .get(usize::from(setup.index))
                .cloned()
                .unwrap_or_else(|| vec![END_OF_STREAM])),
            (REQUEST_FEATURE, FEATURE_VALUE_SET) => {
                let feature = (setup.index & 0xFF).wrapping_sub(FEATURE_INDEX_BASE) as u8;
                let value_index = (setup.index >> 8) as u8;
                script.current.insert(feature, value_index);
                Ok(Vec::new())
            }
            (REQUEST_RESET, _) | (REQUEST_FACTORY_RESET, _) => Ok(Vec::new()),
            _ => Err(UsbError::Pipe),
        }
    }
}

impl Transport for MockDevice {
    fn claim_interface(&mut self, interface: u8) -> Result<(), UsbError> {
        self.log.push(MockEvent::Claim(interface));
        if lock(&self.script).fail_claim {
            return Err(UsbError::Busy);
        }
        self.claimed.insert(interface);
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), UsbError> {
        self.log.push(MockEvent::Release(interface));
        if self.claimed.remove(&interface) {
            Ok(())
        } else {
            Err(UsbError::NotFound)
        }
    }

    fn control_transfer(
        &mut self,
        setup: SetupPacket,
        buffer: &mut [u8],
    ) -> Result<usize, UsbError> {
        self.log.push(MockEvent::Control(setup));
        let response = self.respond(setup)?;
        let len = response.len().min(buffer.len());
        buffer[..len].copy_from_slice(&response[..len]);
        Ok(len)
    }

    fn get_descriptor(
        &mut self,
        descriptor_type: u8,
        index: u8,
        _lang_id: u16,
        buffer: &mut [u8],
    ) -> Result<usize, UsbError> {
        self.log.push(MockEvent::Descriptor {
            descriptor_type,
            index,
        });

        let script = lock(&self.script);
        let response = match descriptor_type {
            DESCRIPTOR_DEVICE => script.device_descriptor(),
            DESCRIPTOR_CONFIGURATION => script.configuration_descriptor(),
            DESCRIPTOR_STRING => script.string_descriptor(index).ok_or(UsbError::Pipe)?,
            _ => return Err(UsbError::Pipe),
        };

        let len = response.len().min(buffer.len());
        buffer[..len].copy_from_slice(&response[..len]);
        Ok(len)
    }
}

/// Bus holding the scripted device
///
/// Every `open` hands out a new `MockDevice` sharing the same script and
/// log, so state written by one session is visible after re-initialize.
#[derive(Clone)]
pub struct MockBus {
    devices: Vec<DeviceInfo>,
    script: Arc<Mutex<DeviceScript>>,
    log: MockLog,
}

impl MockBus {
    /// Bus with one connected Audio-Widget running `script`
    pub fn new(script: DeviceScript) -> Self {
        Self::with_devices(vec![mock_device_info(1)], script)
    }

    /// Bus with no attached devices
    pub fn empty() -> Self {
        Self::with_devices(Vec::new(), DeviceScript::new())
    }

    /// Bus with an explicit enumeration
    pub fn with_devices(devices: Vec<DeviceInfo>, script: DeviceScript) -> Self {
        Self {
            devices,
            script: Arc::new(Mutex::new(script)),
            log: MockLog::default(),
        }
    }

    /// Record of everything every opened handle saw
    pub fn log(&self) -> &MockLog {
        &self.log
    }

    /// Inspect or change the script between operations
    pub fn script(&self) -> MutexGuard<'_, DeviceScript> {
        lock(&self.script)
    }
}

impl UsbBus for MockBus {
    type Handle = MockDevice;

    fn devices(&self) -> Result<Vec<DeviceInfo>, UsbError> {
        Ok(self.devices.clone())
    }

    fn open(&self, info: &DeviceInfo) -> Result<MockDevice, UsbError> {
        if !self.devices.contains(info) {
            return Err(UsbError::NoDevice);
        }

        Ok(MockDevice {
            script: Arc::clone(&self.script),
            log: self.log.clone(),
            claimed: HashSet::new(),
        })
    }
}

/// Enumeration record of a connected Audio-Widget at the given address
pub fn mock_device_info(address: u8) -> DeviceInfo {
    DeviceInfo {
        vendor_id: MOCK_VENDOR_ID,
        product_id: MOCK_PRODUCT_ID,
        bus_number: 1,
        device_address: address,
        connected: true,
    }
}
