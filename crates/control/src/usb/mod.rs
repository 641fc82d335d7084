//! USB subsystem
//!
//! libusb implementation of the protocol's `UsbBus` and `Transport` traits.
//! All transfers are synchronous and run on the calling thread.

pub mod device;
pub mod manager;
pub mod transfers;

pub use device::RusbHandle;
pub use manager::RusbBus;
