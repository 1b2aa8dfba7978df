// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CCCC daemon library.
//!
//! Exposes the IPC protocol types for clients plus the listener/lifecycle
//! machinery the `ccccd` binary assembles.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod lifecycle;
pub mod listener;
pub mod protocol;

pub use lifecycle::{BoundListener, Config, LifecycleError, Transport};
pub use listener::{DaemonCtx, Listener};
pub use protocol::{
    codes, DaemonError, ProtocolError, Request, Response, DAEMON_VERSION, IPC_VERSION,
    MAX_LINE_BYTES,
};
