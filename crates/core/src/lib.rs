// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! parlor-core: leaf types shared by the parlor daemon and adapters.
//!
//! Holds the configuration model, the deterministic backend resource
//! naming scheme, and the session wire protocol payloads. No I/O here.

pub mod config;
pub mod names;
pub mod protocol;

pub use config::{
    ConfigError, ContextConfig, ContextKind, ExecutorConfig, ExecutorKind, PageConfig, PageKind,
    ServerConfig,
};
pub use names::{container_name, volume_name};
pub use protocol::{Inbound, Outbound, StreamKind};
