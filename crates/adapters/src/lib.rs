// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for the coordinator's external collaborators
//!
//! - [`BackendDriver`]: per-provider resource CRUD and the tag store
//! - [`RemoteExec`]: command execution and file transfer on instances
//! - [`SessionStore`]: local persistence of session tokens

pub mod backend;
pub mod remote;
pub mod session;

pub use backend::{
    BackendDriver, BackendError, DnsRecordSpec, FirewallSpec, ImageSpec, InstanceSpec, MountSpec,
    VolumeSpec,
};
pub use remote::{shell, ExecOutput, RemoteError, RemoteExec};
pub use session::{FileSessionStore, SessionError, SessionStore};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use backend::{BackendCall, BackendOp, FakeBackend};
#[cfg(any(test, feature = "test-support"))]
pub use remote::{FakeRemote, RemoteCall};
#[cfg(any(test, feature = "test-support"))]
pub use session::MemorySessionStore;
