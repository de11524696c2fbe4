// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lock state.

use serde::Serialize;

use crate::command::ControlCommand;
use crate::error::{DeviceError, ValueError};
use crate::types::DeviceKind;

use super::DeviceModel;
use super::fields::{self, Payload};

/// Canonical state of a door lock. New locks start locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockState {
    /// Whether the bolt is engaged.
    pub locked: bool,
}

impl Default for LockState {
    fn default() -> Self {
        Self { locked: true }
    }
}

/// A partial lock mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockUpdate {
    /// New bolt position.
    pub locked: Option<bool>,
}

impl DeviceModel for LockState {
    type Update = LockUpdate;

    const KIND: DeviceKind = DeviceKind::Lock;

    fn parse_update(payload: &Payload) -> Result<Self::Update, ValueError> {
        Ok(LockUpdate {
            locked: fields::locked(payload)?,
        })
    }

    fn update_for(command: &ControlCommand) -> Result<Option<Self::Update>, DeviceError> {
        match command {
            ControlCommand::SetLock(locked) => Ok(Some(LockUpdate {
                locked: Some(*locked),
            })),
            ControlCommand::GetState => Ok(None),
            ControlCommand::SetPower(_)
            | ControlCommand::SetBrightness(_)
            | ControlCommand::SetColor(_) => Err(DeviceError::UnsupportedOperation {
                kind: Self::KIND,
                operation: command.name().to_string(),
            }),
        }
    }

    fn is_empty(update: &Self::Update) -> bool {
        update.locked.is_none()
    }

    fn apply(&mut self, update: &Self::Update) {
        if let Some(locked) = update.locked {
            self.locked = locked;
        }
    }
}
