// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state models and snapshots.
//!
//! Each device kind has a state struct implementing [`DeviceModel`]. A model
//! knows its defaults, how to validate a JSON patch into a typed update, how
//! to map control commands onto updates, and how to merge an update.
//!
//! Updates are validated as a whole before anything is written, so a
//! rejected payload never leaves a device half-modified.

mod bulb;
pub(crate) mod fields;
mod lock;
mod sensor;
mod snapshot;

use std::fmt::Debug;

use serde::Serialize;

pub use bulb::{BulbState, BulbUpdate, DEFAULT_COLOR};
pub use fields::Payload;
pub use lock::{LockState, LockUpdate};
pub use sensor::{SensorState, SensorUpdate};
pub use snapshot::{DeviceSnapshot, Snapshot};

use crate::command::ControlCommand;
use crate::error::{DeviceError, ValueError};
use crate::types::DeviceKind;

/// The state model of one device kind.
pub trait DeviceModel:
    Debug + Clone + Default + PartialEq + Serialize + Send + Sync + 'static
{
    /// A partial mutation of this model.
    type Update: Debug + Clone + Send + Sync + 'static;

    /// The kind of device this model describes.
    const KIND: DeviceKind;

    /// Validates a JSON patch. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError`] if any known field has an invalid value.
    fn parse_update(payload: &Payload) -> Result<Self::Update, ValueError>;

    /// Maps a control command onto an update. `Ok(None)` means the command
    /// only asks for the current state.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnsupportedOperation`] if this kind cannot
    /// perform the command.
    fn update_for(command: &ControlCommand) -> Result<Option<Self::Update>, DeviceError>;

    /// Returns `true` if the update would write nothing.
    fn is_empty(update: &Self::Update) -> bool;

    /// Merges the update into the state.
    fn apply(&mut self, update: &Self::Update);
}
