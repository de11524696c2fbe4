// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Brightness type for bulbs.
//!
//! Brightness is always within 0-100. Writes coming from the network are
//! clamped rather than rejected, so [`Brightness::clamped`] is the usual
//! constructor; [`Brightness::new`] is the strict variant used by callers
//! that want to refuse out-of-range input up front.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Brightness level as a percentage (0-100).
///
/// # Examples
///
/// ```
/// use homesync_lib::types::Brightness;
///
/// assert_eq!(Brightness::clamped(150).value(), 100);
/// assert_eq!(Brightness::clamped(-20).value(), 0);
/// assert!(Brightness::new(101).is_err());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(from = "i64", into = "u8")]
pub struct Brightness(u8);

impl Brightness {
    /// Minimum brightness (0%).
    pub const MIN: Self = Self(0);

    /// Maximum brightness (100%).
    pub const MAX: Self = Self(100);

    /// Creates a brightness value, refusing anything outside 0-100.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if value is outside 0-100.
    pub fn new(value: i64) -> Result<Self, ValueError> {
        if !(0..=100).contains(&value) {
            return Err(ValueError::OutOfRange {
                min: 0,
                max: 100,
                actual: value,
            });
        }
        Ok(Self::clamped(value))
    }

    /// Creates a brightness value, clamping to the valid range.
    #[must_use]
    pub fn clamped(value: i64) -> Self {
        // Safe: clamped to 0..=100 first
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = value.clamp(0, 100) as u8;
        Self(value)
    }

    /// Returns the percentage value.
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for Brightness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl From<i64> for Brightness {
    fn from(value: i64) -> Self {
        Self::clamped(value)
    }
}

impl From<Brightness> for u8 {
    fn from(value: Brightness) -> Self {
        value.0
    }
}
