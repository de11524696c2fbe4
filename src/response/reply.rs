// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::state::DeviceSnapshot;

/// Success flag, message, and optional state.
///
/// # Examples
///
/// ```
/// use homesync_lib::Error;
/// use homesync_lib::response::Reply;
///
/// let reply = Reply::failure(&Error::DeviceNotFound("bulb_9".into()));
/// assert!(!reply.success);
/// assert_eq!(reply.message, "device not found: bulb_9");
/// assert!(reply.state.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Outcome description.
    pub message: String,
    /// The device's state after the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

impl Reply {
    /// A successful reply without state.
    #[must_use]
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            state: None,
        }
    }

    /// A successful reply carrying a snapshot.
    #[must_use]
    pub fn with_state(message: impl Into<String>, snapshot: &DeviceSnapshot) -> Self {
        Self {
            success: true,
            message: message.into(),
            state: Some(snapshot.to_json()),
        }
    }

    /// A failed reply describing `error`.
    #[must_use]
    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            state: None,
        }
    }

    /// Builds a reply from an operation result, using `message` on success.
    #[must_use]
    pub fn from_result(result: &Result<DeviceSnapshot>, message: impl Into<String>) -> Self {
        match result {
            Ok(snapshot) => Self::with_state(message, snapshot),
            Err(e) => Self::failure(e),
        }
    }
}

impl From<Result<DeviceSnapshot>> for Reply {
    fn from(result: Result<DeviceSnapshot>) -> Self {
        Self::from_result(&result, "ok")
    }
}

impl From<Result<()>> for Reply {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::done("ok"),
            Err(e) => Self::failure(&e),
        }
    }
}
