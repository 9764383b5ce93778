//! Standard OBD-II PIDs and Supported-PID Bitmaps
//!
//! Only the engine speed PID is part of the standard catalog shipped here.
//! Callers register anything else as a custom [`CommandDescriptor`].

use std::collections::BTreeSet;

use crate::command::{CommandDescriptor, ObdMessage};

/// Engine RPM (0x0C)
const PID_RPM: u8 = 0x0C;

/// Decode engine speed: ((A*256)+B)/4
pub fn decode_rpm(messages: &[ObdMessage]) -> Option<f64> {
    match messages.first()?.data.as_slice() {
        [a, b, ..] => Some(((*a as f64 * 256.0) + *b as f64) / 4.0),
        _ => None,
    }
}

/// The standard engine speed command
pub fn rpm() -> CommandDescriptor {
    CommandDescriptor::new("RPM", "Engine RPM", PID_RPM, 2, decode_rpm)
}

/// PIDs the vehicle advertises through the mode 01 bitmap PIDs
/// (0x00, 0x20, 0x40, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedPids {
    pids: BTreeSet<u8>,
}

impl SupportedPids {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the 4-byte bitmap returned for bitmap PID `base`
    ///
    /// Bit 7 of the first byte stands for `base + 1`, bit 0 of the last
    /// byte for `base + 0x20`.
    pub fn merge_bitmap(&mut self, base: u8, bitmap: &[u8]) {
        for (byte_index, byte) in bitmap.iter().take(4).enumerate() {
            for bit in 0..8 {
                if byte & (0x80 >> bit) != 0 {
                    let offset = (byte_index * 8 + bit + 1) as u16;
                    if let Ok(pid) = u8::try_from(base as u16 + offset) {
                        self.pids.insert(pid);
                    }
                }
            }
        }
    }

    /// Whether the bitmap for `base` says the next range is also available
    pub fn has_next_range(&self, base: u8) -> bool {
        base.checked_add(0x20).is_some_and(|next| self.contains(next))
    }

    /// Mark a PID as supported
    pub fn insert(&mut self, pid: u8) {
        self.pids.insert(pid);
    }

    /// Whether the vehicle supports `pid`
    pub fn contains(&self, pid: u8) -> bool {
        self.pids.contains(&pid)
    }

    /// Number of supported PIDs
    pub fn len(&self) -> usize {
        self.pids.len()
    }

    /// Whether no PID is supported
    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }
}

impl FromIterator<u8> for SupportedPids {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        Self {
            pids: iter.into_iter().collect(),
        }
    }
}
