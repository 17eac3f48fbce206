// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleet-core: Leaf types shared by the fleet provisioning coordinator

pub mod macros;

pub mod clock;
pub mod id;
pub mod resource;
pub mod session;
pub mod tags;
pub mod time_fmt;
pub mod version;

pub use clock::{Clock, FakeClock, SystemClock};
pub use id::RunId;
pub use resource::{BackendType, LifecycleState, Resource, ResourceKind, ResourceRef};
pub use session::SessionToken;
pub use tags::{TagFilter, Tags};
pub use time_fmt::{format_duration, parse_duration, DurationParseError};
pub use version::{VersionKey, VersionKeyError};
