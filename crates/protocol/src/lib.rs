//! Feature catalog protocol for Audio-Widget devices
//!
//! This crate implements the vendor control-transfer protocol used to read
//! and write the configurable "features" of an Audio-Widget: discovering the
//! value catalog, reading the current selections, committing new selections
//! and resetting the device. Hardware access goes through the [`Transport`]
//! and [`UsbBus`] traits so the protocol runs the same against libusb or a
//! scripted test device.
//!
//! # Example
//!
//! ```no_run
//! use protocol::{DeviceSession, FeatureId, UsbBus};
//!
//! fn set_board<B: UsbBus>(bus: &B) -> protocol::Result<()> {
//!     let mut session = DeviceSession::default();
//!     session.initialize(bus)?;
//!
//!     if session.select(FeatureId(0), "AB-1.x") {
//!         session.save()?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod catalog;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod session;
pub mod transport;
pub mod types;

pub use batch::{ApplyReport, Directive, apply_config, parse_directive};
pub use catalog::{FeatureCatalog, FeatureSlot, ValueKey};
pub use codec::{decode_string_descriptor, decode_value_string};
pub use descriptor::read_identity;
pub use error::{ConfigError, ProtocolError, Result};
pub use session::DeviceSession;
pub use transport::{Transport, UsbBus, find_device, open_device, vendor_request};
pub use types::{
    ConfigurationDescriptor, DeviceDescriptor, DeviceIdentity, DeviceInfo, DeviceMatcher,
    FEATURES, FeatureDescriptor, FeatureId, SCAN_CAP, SetupPacket, TRANSFER_BUFFER_SIZE,
    UsbError, VENDOR_IN, VendorCommand, feature_by_name,
};
