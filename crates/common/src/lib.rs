//! Common utilities for widget-control
//!
//! This crate provides shared functionality between the protocol crate's
//! tests and the control application: error handling, logging setup and a
//! scripted USB device for exercising the catalog protocol without hardware.

pub mod error;
pub mod logging;
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::{setup_file_logging, setup_logging};
