//! Horsepower Calculator

use std::fmt;

/// Nm x RPM -> HP conversion factor
pub const HP_CONVERSION: f64 = 7127.0;

/// Inputs used by `--self-test`
const SELF_TEST_RPM: f64 = 3000.0;
const SELF_TEST_TORQUE_PERCENT: f64 = 50.0;
const SELF_TEST_REFERENCE_TORQUE_NM: f64 = 300.0;

/// Figures derived from one complete telemetry snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMetric {
    /// Engine speed the figures were computed at
    pub rpm: f64,
    /// Actual engine torque (Nm)
    pub actual_torque_nm: f64,
    /// Engine output (HP)
    pub horsepower_hp: f64,
}

/// Combine percent torque, reference torque and RPM
///
/// Negative torque (engine braking) yields negative horsepower.
pub fn compute(rpm: f64, torque_percent: f64, reference_torque_nm: f64) -> DerivedMetric {
    let actual_torque_nm = (torque_percent / 100.0) * reference_torque_nm;
    DerivedMetric {
        rpm,
        actual_torque_nm,
        horsepower_hp: (actual_torque_nm * rpm) / HP_CONVERSION,
    }
}

impl fmt::Display for DerivedMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RPM: {:.2} RPM", self.rpm)?;
        writeln!(f, "Torque: {:.2} Nm", self.actual_torque_nm)?;
        writeln!(f, "Horsepower: {:.2} HP", self.horsepower_hp)?;
        writeln!(f, "{}", "-".repeat(30))
    }
}

/// Run the calculator on fixed inputs, without touching any transport
pub fn self_test_report() -> String {
    let metric = compute(
        SELF_TEST_RPM,
        SELF_TEST_TORQUE_PERCENT,
        SELF_TEST_REFERENCE_TORQUE_NM,
    );

    format!(
        "Self-test results:\n\
         RPM: {:.2} RPM\n\
         Torque Percent: {:.2}%\n\
         Reference Torque: {:.2} Nm\n\
         Actual Torque: {:.2} Nm\n\
         Horsepower: {:.2} HP\n",
        metric.rpm,
        SELF_TEST_TORQUE_PERCENT,
        SELF_TEST_REFERENCE_TORQUE_NM,
        metric.actual_torque_nm,
        metric.horsepower_hp,
    )
}
