// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structured results for the façade layer.
//!
//! A façade (HTTP routes, a WebSocket server) never sees a panic or a raw
//! error: every registry operation can be turned into a [`Reply`] carrying
//! a success flag, a human readable message and, when there is one, the
//! device's state.

mod reply;

pub use reply::Reply;
