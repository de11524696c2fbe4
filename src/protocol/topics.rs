// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic layout and wildcard matching.
//!
//! ```text
//! home/{category}/{device_id}/state              retained snapshot
//! home/{category}/{device_id}/control/{command}  transient command
//! ```
//!
//! `category` is `lights`, `locks` or `sensors`.

use crate::types::DeviceKind;

/// First level of every device topic.
pub const TOPIC_ROOT: &str = "home";

/// The topics owned by one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    base: String,
}

impl DeviceTopics {
    /// Builds the topic set for a device.
    #[must_use]
    pub fn new(kind: DeviceKind, device_id: &str) -> Self {
        Self {
            base: format!("{TOPIC_ROOT}/{}/{device_id}", kind.category()),
        }
    }

    /// `home/{category}/{device_id}`.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The retained state topic.
    #[must_use]
    pub fn state(&self) -> String {
        format!("{}/state", self.base)
    }

    /// The control topic of one command.
    #[must_use]
    pub fn control(&self, command: &str) -> String {
        format!("{}/control/{command}", self.base)
    }

    /// Filters the session subscribes to: every control command and the
    /// state topic.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        vec![self.control("+"), self.state()]
    }

    /// Classifies a topic under this device's base.
    #[must_use]
    pub fn route<'a>(&self, topic: &'a str) -> Option<Route<'a>> {
        let rest = topic.strip_prefix(self.base.as_str())?.strip_prefix('/')?;
        match rest.split_once('/') {
            None if rest == "state" => Some(Route::State),
            Some(("control", command)) if !command.is_empty() && !command.contains('/') => {
                Some(Route::Control(command))
            }
            _ => None,
        }
    }
}

/// What a topic under a device base addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// The state topic.
    State,
    /// A control topic carrying the named command.
    Control(&'a str),
}

/// A device topic split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTopic<'a> {
    /// Device kind, from the category level.
    pub kind: DeviceKind,
    /// Device identifier.
    pub device_id: &'a str,
    /// State or control.
    pub route: Route<'a>,
}

impl<'a> ParsedTopic<'a> {
    /// Parses `home/{category}/{device_id}/...`. Returns `None` for topics
    /// outside the layout.
    #[must_use]
    pub fn parse(topic: &'a str) -> Option<Self> {
        let mut parts = topic.splitn(4, '/');
        if parts.next()? != TOPIC_ROOT {
            return None;
        }
        let kind = DeviceKind::from_category(parts.next()?)?;
        let device_id = parts.next().filter(|id| !id.is_empty())?;
        let route = match parts.next()? {
            "state" => Route::State,
            rest => {
                let command = rest.strip_prefix("control/")?;
                if command.is_empty() || command.contains('/') {
                    return None;
                }
                Route::Control(command)
            }
        };
        Some(Self {
            kind,
            device_id,
            route,
        })
    }
}

/// Returns `true` if `topic` matches the subscription `filter`.
///
/// `+` matches exactly one level, and `#` as the last level matches the
/// parent level and everything below it.
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
