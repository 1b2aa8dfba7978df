// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cccc-runner: actor session supervision.
//!
//! Two runner flavours share one surface: the PTY supervisor drives an
//! interactive terminal session (tmux-backed) with transcript capture and
//! idle detection; the headless supervisor tracks state for actors driven
//! by an external MCP loop and never spawns a process.

pub mod env_merge;
pub mod headless;
pub mod pty;
pub mod session;

pub use env_merge::{merge_actor_env, normalize_runtime_command, prepare_pty_env};
pub use headless::HeadlessSupervisor;
pub use pty::{PtySupervisor, RunnerError, StartOutcome};
pub use session::{SessionAdapter, SessionError, TmuxAdapter};

#[cfg(any(test, feature = "test-support"))]
pub use session::FakeSessionAdapter;

/// Whether this platform can host PTY sessions at all. Non-unix builds
/// resolve every `pty` request to `headless` (`runner_effective`).
pub fn pty_supported() -> bool {
    cfg!(unix)
}

/// The runner kind that will actually be used for a request.
pub fn effective_runner_kind(requested: cccc_core::RunnerKind) -> cccc_core::RunnerKind {
    match requested {
        cccc_core::RunnerKind::Headless => cccc_core::RunnerKind::Headless,
        cccc_core::RunnerKind::Pty if pty_supported() => cccc_core::RunnerKind::Pty,
        cccc_core::RunnerKind::Pty => cccc_core::RunnerKind::Headless,
    }
}
