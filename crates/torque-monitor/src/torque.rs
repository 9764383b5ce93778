//! Engine Torque PIDs
//!
//! Decoders and command entries for mode 01 PIDs 0x62 (actual engine percent
//! torque) and 0x63 (engine reference torque). Neither is part of the
//! standard catalog, so both are registered with the session at startup.

use obd_protocol::{rpm, CommandDescriptor, ObdMessage};

/// Offset of the raw percent-torque byte
const PERCENT_TORQUE_OFFSET: f64 = 125.0;

/// Actual engine percent torque: A - 125
///
/// The raw byte spans [-125, 130] even though the standard documents
/// -125..125; the top of the range is kept as encoded.
pub fn decode_percent_torque(messages: &[ObdMessage]) -> Option<f64> {
    let a = *messages.first()?.data.first()?;
    Some(a as f64 - PERCENT_TORQUE_OFFSET)
}

/// Engine reference torque in Nm: (A*256)+B
pub fn decode_reference_torque(messages: &[ObdMessage]) -> Option<f64> {
    match messages.first()?.data.as_slice() {
        [a, b, ..] => Some((*a as f64 * 256.0) + *b as f64),
        _ => None,
    }
}

/// Mode 01 PID 0x62
pub const ACTUAL_ENGINE_PERCENT_TORQUE: CommandDescriptor = CommandDescriptor::new(
    "ACTUAL_ENGINE_PERCENT_TORQUE",
    "Actual Engine Percent Torque",
    0x62,
    1,
    decode_percent_torque,
)
.with_priority(true);

/// Mode 01 PID 0x63
pub const ENGINE_REF_TORQUE: CommandDescriptor = CommandDescriptor::new(
    "ENGINE_REF_TORQUE",
    "Engine Reference Torque",
    0x63,
    2,
    decode_reference_torque,
)
.with_priority(true);

/// Commands needed to compute horsepower, in reporting order
pub fn required_commands() -> [CommandDescriptor; 3] {
    [rpm(), ACTUAL_ENGINE_PERCENT_TORQUE, ENGINE_REF_TORQUE]
}
