use serde::{Deserialize, Serialize};

use crate::constants::GUARD_BITS;

const LOG2_10: f64 = std::f64::consts::LOG2_10;

/// Number of significant decimal digits a computation must deliver.
///
/// Threaded explicitly through every arbitrary-precision routine; nothing in
/// the crate reads a global precision setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Precision {
    digits: u32,
}

impl Precision {
    /// What `f64` arithmetic delivers.
    pub const DOUBLE: Self = Self { digits: 15 };

    /// Precision of `digits` decimal digits (at least one).
    pub fn new(digits: u32) -> Self {
        Self {
            digits: digits.max(1),
        }
    }

    pub fn digits(self) -> u32 {
        self.digits
    }

    /// Binary digits after the point, including guard bits.
    pub fn bits(self) -> u32 {
        (f64::from(self.digits) * LOG2_10).ceil() as u32 + GUARD_BITS
    }

    /// A working precision `extra` digits finer than this one.
    pub fn with_extra_digits(self, extra: u32) -> Self {
        Self::new(self.digits + extra)
    }
}
