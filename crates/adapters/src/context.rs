// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scoped acquisition of a container backend handle.
//!
//! One context exists per server lifetime: acquired before any page accepts
//! traffic, released after the server stops. Acquisition probes the engine
//! so an unreachable backend fails the boot instead of the first room.

use std::sync::Arc;

use parlor_core::config::{ContextConfig, ContextKind};
use tracing::debug;

use crate::backend::{BackendError, ContainerBackend};
use crate::docker::DockerBackend;

/// A live backend handle. Cheap to clone; the backend is shared.
#[derive(Clone)]
pub struct Context {
    backend: Arc<dyn ContainerBackend>,
}

impl Context {
    /// Build the backend named by the configuration and probe its liveness.
    pub async fn acquire(config: &ContextConfig) -> Result<Self, BackendError> {
        match config.kind {
            ContextKind::Docker => {
                let backend = DockerBackend::new(config.url.as_deref())?;
                let version = backend.version().await?;
                debug!(%version, "container engine reachable");
                Ok(Self { backend: Arc::new(backend) })
            }
        }
    }

    /// Wrap an existing backend (used by tests to inject a fake).
    pub fn with_backend(backend: Arc<dyn ContainerBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn ContainerBackend> {
        &self.backend
    }

    /// Drop the backend handle. All exit paths of the server go through here.
    pub fn release(self) {
        debug!("releasing container engine handle");
        drop(self.backend);
    }
}
