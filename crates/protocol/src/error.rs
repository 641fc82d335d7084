//! Protocol error types

use crate::types::{FeatureId, UsbError};
use thiserror::Error;

/// Catalog protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// No attached device matched the accepted VID/PID sets
    #[error("Audio-Widget device not found")]
    DeviceNotFound,

    /// The bus could not list attached devices
    #[error("Failed to enumerate USB devices: {source}")]
    Enumerate {
        #[source]
        source: UsbError,
    },

    /// A matching device was found but could not be opened
    #[error("Failed to open Audio-Widget at bus {bus:03} address {address:03}: {source}")]
    Open {
        bus: u8,
        address: u8,
        #[source]
        source: UsbError,
    },

    /// An operation was attempted without an open device
    #[error("No device is open")]
    NotOpen,

    /// A control transfer did not complete
    #[error("Control transfer {request:#04x}/{value}/{index} failed: {source}")]
    Transport {
        request: u8,
        value: u16,
        index: u16,
        #[source]
        source: UsbError,
    },

    /// A descriptor response was shorter than its fixed layout
    #[error("Short {kind} descriptor: needed {needed} bytes, got {actual}")]
    ShortDescriptor {
        kind: &'static str,
        needed: usize,
        actual: usize,
    },

    /// One or more set-value transfers failed during save
    #[error("Failed to save {}", format_features(.failed))]
    SaveFailed { failed: Vec<FeatureId> },
}

/// Batch configuration errors
///
/// Line numbers are 1-based positions in the input.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Line is not a `key=value` pair
    #[error("Error in line {line}: '{text}' is not a feature=value pair")]
    Parse { line: usize, text: String },

    /// Key does not name a known feature
    #[error("Error in line {line}: feature {name} not found in possible features")]
    FeatureNotFound { line: usize, name: String },

    /// Value is not among the feature's values reported by the device
    #[error("Error in line {line}: feature value {value} for feature {feature} not found in device")]
    ValueNotFound {
        line: usize,
        feature: String,
        value: String,
    },

    /// Save or reset failed after all lines were applied
    #[error(transparent)]
    Device(#[from] ProtocolError),
}

fn format_features(features: &[FeatureId]) -> String {
    features
        .iter()
        .map(|feature| feature.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = ProtocolError::Transport {
            request: 0x71,
            value: 8,
            index: 12,
            source: UsbError::Timeout,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("0x71/8/12"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_open_error_keeps_cause() {
        let err = ProtocolError::Open {
            bus: 1,
            address: 4,
            source: UsbError::Access,
        };
        assert_eq!(
            err.to_string(),
            "Failed to open Audio-Widget at bus 001 address 004: access denied"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_save_failed_names_features() {
        let err = ProtocolError::SaveFailed {
            failed: vec![FeatureId(0), FeatureId(5)],
        };
        assert_eq!(err.to_string(), "Failed to save BoardType, DacType");
    }

    #[test]
    fn test_config_errors_identify_line() {
        let err = ConfigError::ValueNotFound {
            line: 3,
            feature: "BoardType".to_string(),
            value: "X9".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 3"));
        assert!(msg.contains("X9"));
        assert!(msg.contains("BoardType"));

        let err = ConfigError::FeatureNotFound {
            line: 2,
            name: "Foo".to_string(),
        };
        assert!(err.to_string().contains("Foo"));
    }
}
