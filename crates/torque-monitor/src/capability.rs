//! Capability Gate

use obd_protocol::ObdSession;
use tracing::info;

use crate::error::MonitorError;
use crate::torque::{required_commands, ACTUAL_ENGINE_PERCENT_TORQUE, ENGINE_REF_TORQUE};

/// Register the torque commands and make sure the vehicle supports every
/// command horsepower depends on
pub fn check(session: &mut dyn ObdSession) -> Result<(), MonitorError> {
    session.register(ACTUAL_ENGINE_PERCENT_TORQUE);
    session.register(ENGINE_REF_TORQUE);

    let unsupported: Vec<&'static str> = required_commands()
        .iter()
        .filter(|cmd| !session.supports(cmd))
        .map(|cmd| cmd.name)
        .collect();

    if unsupported.is_empty() {
        info!("All required PIDs supported ({})", session.protocol());
        Ok(())
    } else {
        Err(MonitorError::Unsupported(unsupported))
    }
}

/// Operator-facing listing of unsupported commands
pub fn unsupported_report(names: &[&str]) -> String {
    let mut report = String::from("The following required PIDs are not supported by your vehicle:\n");
    for name in names {
        report.push_str(&format!("- {}\n", name));
    }
    report.push_str("Cannot calculate horsepower based on RPM and Torque.\n");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::mock::MockSession;

    #[test]
    fn test_all_supported() {
        let mut session = MockSession::connected().with_supported(&[0x62, 0x63]);
        check(&mut session).unwrap();
        assert!(session.supports(&ENGINE_REF_TORQUE));
    }

    #[test]
    fn test_reference_torque_missing() {
        let mut session = MockSession::connected().with_supported(&[0x62]);
        match check(&mut session) {
            Err(MonitorError::Unsupported(names)) => assert_eq!(names, ["ENGINE_REF_TORQUE"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_every_missing_command_is_listed() {
        let mut session = MockSession::disconnected();
        match check(&mut session) {
            Err(MonitorError::Unsupported(names)) => {
                assert_eq!(names, ["RPM", "ACTUAL_ENGINE_PERCENT_TORQUE", "ENGINE_REF_TORQUE"])
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_report() {
        let report = unsupported_report(&["ENGINE_REF_TORQUE"]);
        assert_eq!(
            report,
            "The following required PIDs are not supported by your vehicle:\n\
             - ENGINE_REF_TORQUE\n\
             Cannot calculate horsepower based on RPM and Torque.\n"
        );
    }
}
