//! Batch configuration
//!
//! Plain-text `feature=value` directives applied to an open session. Blank
//! lines and lines starting with `;` are ignored. Keys and values match
//! case-insensitively. The special key `needreset` requests a soft reset
//! after the values are saved.
//!
//! ```text
//! ; Audio-Widget profile
//! BoardType=AB-1.x
//! DacType=AK4430
//! needreset=1
//! ```

use crate::error::{ConfigError, ProtocolError};
use crate::session::DeviceSession;
use crate::transport::Transport;
use crate::types::{FeatureId, feature_by_name};
use tracing::{debug, info, warn};

/// Key of the deferred reset directive
pub const NEED_RESET_KEY: &str = "needreset";

/// One classified input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    /// Blank or comment line
    Skip,
    /// `needreset=<value>`; true only for the exact value `1`
    NeedReset(bool),
    /// `feature=value`
    Assign { name: &'a str, value: &'a str },
}

/// Classify one line
///
/// `line_no` is only used for the error message.
pub fn parse_directive(line_no: usize, line: &str) -> Result<Directive<'_>, ConfigError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(';') {
        return Ok(Directive::Skip);
    }

    let mut parts = line.split('=');
    let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ConfigError::Parse {
            line: line_no,
            text: line.to_string(),
        });
    };

    if key.to_uppercase() == NEED_RESET_KEY.to_uppercase() {
        return Ok(Directive::NeedReset(value == "1"));
    }

    Ok(Directive::Assign { name: key, value })
}

/// Outcome of a successful batch apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Features set by the input, in line order, with the stored value string
    pub applied: Vec<(FeatureId, String)>,
    /// Whether the input asked for a reset
    pub reset_requested: bool,
    /// Whether the reset command was acknowledged
    pub reset_sent: bool,
}

/// Apply directives to the session, save, and reset if requested
///
/// Each assignment is validated against the feature table and the feature's
/// values and applied to the in-memory selection as it is read. The first
/// bad line aborts before anything is saved; selections from earlier lines
/// stay in the session unsaved. A requested reset is sent after save even
/// when save reports a failure, which is then returned.
pub fn apply_config<T: Transport>(
    session: &mut DeviceSession<T>,
    input: &str,
) -> Result<ApplyReport, ConfigError> {
    if !session.is_open() {
        return Err(ProtocolError::NotOpen.into());
    }

    let mut report = ApplyReport::default();
    for (i, line) in input.lines().enumerate() {
        let line_no = i + 1;

        match parse_directive(line_no, line)? {
            Directive::Skip => {}
            Directive::NeedReset(flag) => {
                if flag {
                    report.reset_requested = true;
                }
            }
            Directive::Assign { name, value } => {
                let feature =
                    feature_by_name(name).ok_or_else(|| ConfigError::FeatureNotFound {
                        line: line_no,
                        name: name.to_string(),
                    })?;

                let stored = session
                    .catalog()
                    .slot(feature)
                    .and_then(|slot| slot.find_value(value))
                    .map(str::to_owned)
                    .ok_or_else(|| ConfigError::ValueNotFound {
                        line: line_no,
                        feature: name.to_string(),
                        value: value.to_string(),
                    })?;

                session.select(feature, &stored);
                debug!("Line {}: {} = {}", line_no, feature, stored);
                report.applied.push((feature, stored));
            }
        }
    }

    let saved = session.save();

    if report.reset_requested {
        match session.reset() {
            Ok(()) => report.reset_sent = true,
            Err(e) => warn!("Reset not acknowledged: {}", e),
        }
    }

    saved?;
    info!(
        "Applied {} feature values{}",
        report.applied.len(),
        if report.reset_requested { ", reset requested" } else { "" }
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_lines() {
        assert_eq!(parse_directive(1, "").unwrap(), Directive::Skip);
        assert_eq!(parse_directive(1, "   \t").unwrap(), Directive::Skip);
        assert_eq!(parse_directive(1, "; comment=1").unwrap(), Directive::Skip);
        assert_eq!(parse_directive(1, "  ;indented").unwrap(), Directive::Skip);
    }

    #[test]
    fn test_assignment_is_trimmed_as_a_line() {
        assert_eq!(
            parse_directive(1, "  BoardType=AB-1.x  ").unwrap(),
            Directive::Assign {
                name: "BoardType",
                value: "AB-1.x"
            }
        );
    }

    #[test]
    fn test_need_reset() {
        assert_eq!(parse_directive(1, "needreset=1").unwrap(), Directive::NeedReset(true));
        assert_eq!(parse_directive(1, "NeedReset=1").unwrap(), Directive::NeedReset(true));
        assert_eq!(parse_directive(1, "needreset=0").unwrap(), Directive::NeedReset(false));
        assert_eq!(parse_directive(1, "needreset=yes").unwrap(), Directive::NeedReset(false));
    }

    #[test]
    fn test_malformed_lines() {
        for line in ["BoardType", "a=b=c", "==", "x=1=2"] {
            let err = parse_directive(7, line).unwrap_err();
            match err {
                ConfigError::Parse { line: 7, text } => assert_eq!(text, line),
                other => panic!("unexpected error for {:?}: {:?}", line, other),
            }
        }
    }

    #[test]
    fn test_empty_key_or_value_still_parses() {
        assert_eq!(
            parse_directive(1, "=x").unwrap(),
            Directive::Assign { name: "", value: "x" }
        );
        assert_eq!(
            parse_directive(1, "DacType=").unwrap(),
            Directive::Assign {
                name: "DacType",
                value: ""
            }
        );
    }
}
