//! Device session and the feature catalog protocol
//!
//! A `DeviceSession` owns at most one open device handle together with the
//! catalog tables built from it. Every protocol operation requires an open
//! session and fails fast with `ProtocolError::NotOpen` otherwise.
//!
//! # Catalog scan
//!
//! 1. `0x71/4/1` returns the number of value entries the device will stream.
//! 2. `0x71/8/i` returns the value string at global index `i`, bytes
//!    reversed. A first byte of 63 ends the stream; the string `"end"`
//!    advances to the next feature. The scan never requests an index
//!    above [`SCAN_CAP`].
//! 3. `0x71/4/(2+f)` returns the current global value index of feature `f`.

use crate::catalog::FeatureCatalog;
use crate::codec::decode_value_string;
use crate::descriptor::read_identity;
use crate::error::{ProtocolError, Result};
use crate::transport::{Transport, UsbBus, open_device, vendor_request};
use crate::types::{
    DeviceIdentity, DeviceMatcher, END_OF_STREAM, FEATURE_SEPARATOR, FeatureId, SCAN_CAP,
    TRANSFER_BUFFER_SIZE, VendorCommand,
};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// State bound to one open device
pub struct DeviceSession<T: Transport> {
    /// Open device handle, if any
    transport: Option<T>,
    /// Identity read when the device was opened
    identity: Option<DeviceIdentity>,
    /// Tables of the current catalog generation
    catalog: FeatureCatalog,
    /// Accepted VID/PID sets used by `initialize`
    matcher: DeviceMatcher,
    /// Response buffer shared by all vendor requests
    buffer: [u8; TRANSFER_BUFFER_SIZE],
}

impl<T: Transport> Default for DeviceSession<T> {
    fn default() -> Self {
        Self::new(DeviceMatcher::default())
    }
}

impl<T: Transport> DeviceSession<T> {
    /// Create a closed session
    pub fn new(matcher: DeviceMatcher) -> Self {
        Self {
            transport: None,
            identity: None,
            catalog: FeatureCatalog::new(),
            matcher,
            buffer: [0; TRANSFER_BUFFER_SIZE],
        }
    }

    /// Check if a device is open
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Identity of the open device
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Catalog tables and feature slots
    pub fn catalog(&self) -> &FeatureCatalog {
        &self.catalog
    }

    /// Open device handle
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Release the device handle and clear all tables
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!("Closed device session");
        }
        self.identity = None;
        self.catalog.clear();
    }

    /// Tear down, then open the first matching device, read its identity and
    /// scan the catalog
    pub fn initialize<B>(&mut self, bus: &B) -> Result<()>
    where
        B: UsbBus<Handle = T>,
    {
        self.close();

        let mut handle = open_device(bus, &self.matcher)?;
        let identity = read_identity(&mut handle)?;
        info!(
            "Opened {} ({:04x}:{:04x})",
            identity.product.as_deref().unwrap_or("Unknown Product"),
            identity.device.vendor_id,
            identity.device.product_id
        );

        self.transport = Some(handle);
        self.identity = Some(identity);
        self.scan_catalog()
    }

    /// Rebuild the catalog from the device
    ///
    /// Any transfer failure aborts the scan; the tables keep whatever was
    /// recorded up to that point until the next scan or `close`.
    pub fn scan_catalog(&mut self) -> Result<()> {
        let Self {
            transport,
            catalog,
            buffer,
            ..
        } = self;
        let transport = transport.as_mut().ok_or(ProtocolError::NotOpen)?;

        catalog.clear();

        vendor_request(transport, VendorCommand::CatalogSize, buffer)?;
        let advertised = u16::from(buffer[0]);
        debug!("Device advertises {} catalog entries", advertised);

        let mut feature = FeatureId(0);
        let mut index: u16 = 0;
        while index < advertised && index <= SCAN_CAP {
            let len = vendor_request(transport, VendorCommand::ValueString(index), buffer)?;
            if buffer[0] == END_OF_STREAM {
                debug!("End of catalog stream at index {}", index);
                break;
            }

            let text = decode_value_string(&buffer[..len]);
            if text == FEATURE_SEPARATOR {
                feature = feature.next();
            } else if !catalog.insert(feature, index, text) {
                debug!("Dropping value at index {} for unknown {}", index, feature);
            }

            index += 1;
        }

        let features: Vec<FeatureId> = catalog.slots().map(|(id, _)| id).collect();
        for feature in features {
            vendor_request(transport, VendorCommand::CurrentValue(feature), buffer)?;
            let value_index = u16::from(buffer[0]);

            match catalog.value(value_index).map(str::to_owned) {
                Some(value) => {
                    if !catalog.select(feature, &value) {
                        debug!("{}: current value {:?} belongs to another feature", feature, value);
                    }
                }
                None => debug!("{}: no catalog entry at index {}", feature, value_index),
            }
        }

        info!("Catalog scan complete: {} values", catalog.len());
        Ok(())
    }

    /// Set a feature's selection to one of its values
    pub fn select(&mut self, feature: FeatureId, value: &str) -> bool {
        self.catalog.select(feature, value)
    }

    /// Write every selected value back to the device
    ///
    /// Features without a selection, or whose selection has no catalog entry,
    /// are skipped. Every remaining feature is attempted even after a failure;
    /// failures are collected into `ProtocolError::SaveFailed`.
    pub fn save(&mut self) -> Result<()> {
        let Self {
            transport,
            catalog,
            buffer,
            ..
        } = self;
        let transport = transport.as_mut().ok_or(ProtocolError::NotOpen)?;

        let mut failed = Vec::new();
        let mut sent = 0;
        for (feature, slot) in catalog.slots() {
            let Some(selected) = slot.selected.as_deref() else {
                continue;
            };
            let Some(value_index) = catalog.index_of(feature, selected) else {
                debug!("{}: no catalog entry for {:?}, skipping", feature, selected);
                continue;
            };

            let command = VendorCommand::SetValue {
                feature,
                value_index,
            };
            match vendor_request(transport, command, buffer) {
                Ok(_) => sent += 1,
                Err(e) => {
                    warn!("Failed to save {}: {}", feature, e);
                    failed.push(feature);
                }
            }
        }

        if failed.is_empty() {
            info!("Saved {} feature values", sent);
            Ok(())
        } else {
            Err(ProtocolError::SaveFailed { failed })
        }
    }

    /// Send the soft reset command
    pub fn reset(&mut self) -> Result<()> {
        self.send(VendorCommand::Reset)
    }

    /// Send the factory reset command
    pub fn factory_reset(&mut self) -> Result<()> {
        self.send(VendorCommand::FactoryReset)
    }

    /// Soft reset, wait `settle`, then re-initialize
    pub fn reset_and_reinitialize<B>(&mut self, bus: &B, settle: Duration) -> Result<()>
    where
        B: UsbBus<Handle = T>,
    {
        self.restart(bus, VendorCommand::Reset, settle)
    }

    /// Factory reset, wait `settle`, then re-initialize
    pub fn factory_reset_and_reinitialize<B>(&mut self, bus: &B, settle: Duration) -> Result<()>
    where
        B: UsbBus<Handle = T>,
    {
        self.restart(bus, VendorCommand::FactoryReset, settle)
    }

    fn restart<B>(&mut self, bus: &B, command: VendorCommand, settle: Duration) -> Result<()>
    where
        B: UsbBus<Handle = T>,
    {
        if !self.is_open() {
            return Err(ProtocolError::NotOpen);
        }

        // The device may drop off the bus before acknowledging
        if let Err(e) = self.send(command) {
            warn!("{:?} not acknowledged: {}", command, e);
        }

        info!("Waiting {:?} for device to settle", settle);
        thread::sleep(settle);
        self.initialize(bus)
    }

    fn send(&mut self, command: VendorCommand) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(ProtocolError::NotOpen)?;
        vendor_request(transport, command, &mut self.buffer)?;
        info!("Sent {:?}", command);
        Ok(())
    }
}
