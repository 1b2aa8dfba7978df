// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Behavioral specifications for the CCCC daemon.
//!
//! These tests are black-box at the IPC boundary: they bind a daemon
//! listener on a temp socket, speak line-delimited JSON over it, and
//! verify responses, ledger contents, and stream framing.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

// daemon/
#[path = "specs/daemon/ipc.rs"]
mod daemon_ipc;
#[path = "specs/daemon/chat.rs"]
mod daemon_chat;
#[path = "specs/daemon/stream.rs"]
mod daemon_stream;
