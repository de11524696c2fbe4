// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Control commands and acknowledgement tracking.
//!
//! A control command travels on `home/{category}/{id}/control/{name}` with a
//! JSON payload holding the command's fields and an injected
//! `correlation_id`.
//!
//! | Command | Topic suffix | Payload |
//! |---------|--------------|---------|
//! | [`ControlCommand::SetPower`] | `set_state` | `{"power": "on"}` |
//! | [`ControlCommand::SetBrightness`] | `set_brightness` | `{"brightness": 75}` |
//! | [`ControlCommand::SetColor`] | `set_color` | `{"color": "blue"}` |
//! | [`ControlCommand::SetLock`] | `set_lock` | `{"locked": true}` |
//! | [`ControlCommand::GetState`] | `get_state` | `{}` |
//!
//! # Examples
//!
//! ```
//! use homesync_lib::command::ControlCommand;
//! use homesync_lib::types::PowerState;
//!
//! let cmd = ControlCommand::SetPower(PowerState::On);
//! assert_eq!(cmd.name(), "set_state");
//! assert_eq!(cmd.payload()["power"], "on");
//! ```

mod control;
mod correlation;
mod pending;

pub use control::ControlCommand;
pub use correlation::{CORRELATION_KEY, next_correlation_id};
pub use pending::{PendingCommand, PendingCommands};
