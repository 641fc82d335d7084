//! Batch configuration tests
//!
//! Applies `feature=value` inputs to a session opened on the scripted
//! device and checks both the outcome and the transfers that reached it.
//!
//! Run with: `cargo test -p protocol --test batch_tests`

use common::test_utils::{DeviceScript, MockBus, MockDevice};
use protocol::types::{FEATURE_VALUE_SET, REQUEST_FEATURE, REQUEST_RESET};
use protocol::{ConfigError, DeviceSession, FeatureId, ProtocolError, apply_config};

fn open_session(bus: &MockBus) -> DeviceSession<MockDevice> {
    let mut session = DeviceSession::default();
    session.initialize(bus).expect("initialize failed");
    bus.log().clear();
    session
}

fn set_value_count(bus: &MockBus) -> usize {
    bus.log().setups_for(REQUEST_FEATURE, FEATURE_VALUE_SET).len()
}

// ============================================================================
// Successful Apply
// ============================================================================

mod apply {
    use super::*;

    #[test]
    fn test_apply_selects_and_saves() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        let report = apply_config(&mut session, "BoardType=USB9023\nImageType=uac1_dg8saq\n").unwrap();

        assert_eq!(
            report.applied,
            vec![
                (FeatureId(0), "USB9023".to_string()),
                (FeatureId(1), "uac1_dg8saq".to_string()),
            ]
        );
        assert!(!report.reset_requested);
        assert!(!report.reset_sent);
        assert_eq!(set_value_count(&bus), 4);
        assert_eq!(bus.script().current.get(&0), Some(&1));
        assert_eq!(bus.script().current.get(&1), Some(&6));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        let report = apply_config(&mut session, "boardtype=usb9023\nINTYPE=IN_SWAPPED").unwrap();

        // stored strings keep the device's spelling
        assert_eq!(report.applied[0], (FeatureId(0), "USB9023".to_string()));
        assert_eq!(report.applied[1], (FeatureId(2), "in_swapped".to_string()));
        assert_eq!(
            session.catalog().slot(FeatureId(2)).unwrap().selected.as_deref(),
            Some("in_swapped")
        );
    }

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        let input = "; profile\n\n   \n  ; BoardType=nope\nOutType=out_swapped\n";
        let report = apply_config(&mut session, input).unwrap();

        assert_eq!(report.applied, vec![(FeatureId(3), "out_swapped".to_string())]);
    }

    #[test]
    fn test_empty_input_saves_current_selections() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        let report = apply_config(&mut session, "").unwrap();

        assert!(report.applied.is_empty());
        assert_eq!(set_value_count(&bus), 4);
    }

    #[test]
    fn test_later_line_overrides_earlier() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        apply_config(&mut session, "BoardType=USB9023\nBoardType=QNKTC_future").unwrap();

        assert_eq!(bus.script().current.get(&0), Some(&2));
    }

    #[test]
    fn test_crlf_input() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        let report = apply_config(&mut session, "BoardType=USB9023\r\nneedreset=1\r\n").unwrap();

        assert_eq!(report.applied.len(), 1);
        assert!(report.reset_requested);
    }
}

// ============================================================================
// Reset Directive
// ============================================================================

mod reset {
    use super::*;

    #[test]
    fn test_reset_follows_save() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        let input = "needreset=1\nBoardType=USB9023\nInType=in_swapped\nOutType=out_swapped\n";
        let report = apply_config(&mut session, input).unwrap();

        assert!(report.reset_requested);
        assert!(report.reset_sent);

        let setups = bus.log().setups();
        let requests: Vec<(u8, u16)> = setups.iter().map(|s| (s.request, s.value)).collect();
        assert_eq!(
            requests,
            vec![
                (REQUEST_FEATURE, FEATURE_VALUE_SET),
                (REQUEST_FEATURE, FEATURE_VALUE_SET),
                (REQUEST_FEATURE, FEATURE_VALUE_SET),
                (REQUEST_FEATURE, FEATURE_VALUE_SET),
                (REQUEST_RESET, 0),
            ]
        );
    }

    #[test]
    fn test_reset_flag_is_sticky() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        let report = apply_config(&mut session, "needreset=1\nneedreset=0").unwrap();
        assert!(report.reset_requested);
    }

    #[test]
    fn test_only_exact_one_requests_reset() {
        for value in ["0", "true", "yes", " 1", "11"] {
            let bus = MockBus::new(DeviceScript::audio_widget());
            let mut session = open_session(&bus);

            let report = apply_config(&mut session, &format!("NEEDRESET={}", value)).unwrap();
            assert!(!report.reset_requested, "value {:?}", value);
            assert!(bus.log().setups_for(REQUEST_RESET, 0).is_empty());
        }
    }

    #[test]
    fn test_reset_sent_even_when_save_fails() {
        let script = DeviceScript::audio_widget().failing_on(0x71, 3, 2);
        let bus = MockBus::new(script);
        let mut session = open_session(&bus);

        let err = apply_config(&mut session, "needreset=1").unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Device(ProtocolError::SaveFailed { .. })
        ));
        assert_eq!(bus.log().setups_for(REQUEST_RESET, 0).len(), 1);
    }

    #[test]
    fn test_unacknowledged_reset_is_not_an_error() {
        let script = DeviceScript::audio_widget().failing_on(0x0F, 0, 0);
        let bus = MockBus::new(script);
        let mut session = open_session(&bus);

        let report = apply_config(&mut session, "needreset=1").unwrap();
        assert!(report.reset_requested);
        assert!(!report.reset_sent);
    }
}

// ============================================================================
// Errors
// ============================================================================

mod errors {
    use super::*;

    #[test]
    fn test_unknown_feature_aborts_before_save() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        let err = apply_config(&mut session, "BoardType=USB9023\nFoo=Bar\n").unwrap_err();

        match err {
            ConfigError::FeatureNotFound { line, name } => {
                assert_eq!(line, 2);
                assert_eq!(name, "Foo");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(set_value_count(&bus), 0);
    }

    #[test]
    fn test_unknown_value_aborts_before_save() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        let err = apply_config(&mut session, "; header\nDacType=AK4430\nneedreset=1").unwrap_err();

        match err {
            ConfigError::ValueNotFound {
                line,
                feature,
                value,
            } => {
                assert_eq!(line, 2);
                assert_eq!(feature, "DacType");
                assert_eq!(value, "AK4430");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(bus.log().setups().is_empty());
    }

    #[test]
    fn test_value_of_other_feature_is_not_found() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        let err = apply_config(&mut session, "BoardType=uac2_audio").unwrap_err();
        assert!(matches!(err, ConfigError::ValueNotFound { line: 1, .. }));
    }

    #[test]
    fn test_malformed_line_aborts() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        let err = apply_config(&mut session, "BoardType=USB9023\n\nBoardType\n").unwrap_err();

        assert!(matches!(err, ConfigError::Parse { line: 3, .. }));
        assert!(bus.log().setups().is_empty());
    }

    #[test]
    fn test_errors_keep_earlier_selections_unsaved() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        assert!(apply_config(&mut session, "BoardType=USB9023\nFoo=Bar").is_err());

        assert_eq!(
            session.catalog().slot(FeatureId(0)).unwrap().selected.as_deref(),
            Some("USB9023")
        );
        assert_eq!(bus.script().current.get(&0), Some(&0));
    }

    #[test]
    fn test_closed_session_is_rejected() {
        let mut session: DeviceSession<MockDevice> = DeviceSession::default();

        let err = apply_config(&mut session, "BoardType=USB9023").unwrap_err();
        assert!(matches!(err, ConfigError::Device(ProtocolError::NotOpen)));
    }

    #[test]
    fn test_error_messages_name_the_line() {
        let bus = MockBus::new(DeviceScript::audio_widget());
        let mut session = open_session(&bus);

        let err = apply_config(&mut session, "\nFoo=Bar").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error in line 2: feature Foo not found in possible features"
        );
    }
}
