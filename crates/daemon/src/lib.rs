// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! parlor-daemon: hosts sandboxed interactive rooms behind WebSocket pages.
//!
//! Sessions joining the same room name on a page share one sandbox: a data
//! volume plus a set of container executors. The first session to attach
//! instantiates the sandbox; the last one to leave tears it down. Executor
//! output fans out to every attached session.
//!
//! # Module layout
//!
//! - [`server`] — boot sequence, listener, signal handling
//! - [`page`] — per-URL-prefix WebSocket surface and room registry
//! - [`rooms`] — room lifecycle core and the scoped room connection
//! - [`executors`] — container workload variants (once/prologue/epilogue/always)
//! - [`session`] — attached-session bookkeeping and fan-out
//! - [`shield`] — cancellation-resistant cleanup

pub mod executors;
pub mod page;
pub mod rooms;
pub mod server;
pub mod session;
pub mod shield;

pub use server::{run, Server, ServerError};
