// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker Engine API backend.
//!
//! Talks HTTP/1.1 directly to the engine socket (default
//! `unix:///var/run/docker.sock`; `tcp://host:port` supported). Plain
//! operations use one connection per request; `attach` upgrades its
//! connection to the raw multiplexed stream.

mod frames;
mod http;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::backend::{
    AttachOptions, AttachedIo, BackendError, ContainerBackend, ContainerSpec,
};

pub struct DockerBackend {
    transport: http::Transport,
}

impl DockerBackend {
    /// `url` selects the engine endpoint; `None` means the local socket.
    pub fn new(url: Option<&str>) -> Result<Self, BackendError> {
        Ok(Self { transport: http::Transport::parse(url)? })
    }

    async fn call(
        &self,
        method: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<http::Response, BackendError> {
        let response = http::request(&self.transport, method, path, body.as_ref()).await?;
        if response.status >= 400 {
            return Err(api_error(&response));
        }
        Ok(response)
    }
}

fn api_error(response: &http::Response) -> BackendError {
    let message = serde_json::from_str::<serde_json::Value>(&response.body)
        .ok()
        .and_then(|value| value.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| response.body.trim().to_string());
    BackendError::Api { status: response.status, message }
}

fn flag(enabled: bool) -> &'static str {
    if enabled {
        "1"
    } else {
        "0"
    }
}

fn create_body(spec: &ContainerSpec) -> serde_json::Value {
    let mut host_config = serde_json::Map::new();
    if let Some(volume) = &spec.volume {
        host_config.insert(
            "Mounts".to_string(),
            json!([{ "Target": "/data", "Source": volume, "Type": "volume" }]),
        );
    }
    if let Some(memory) = spec.memory_limit_bytes {
        host_config.insert("Memory".to_string(), json!(memory));
        host_config.insert("MemorySwap".to_string(), json!(memory));
    }
    if let Some(quota) = spec.cpu_quota {
        host_config.insert("CpuQuota".to_string(), json!(quota));
    }
    if let Some(pids) = spec.pids_limit {
        host_config.insert("PidsLimit".to_string(), json!(pids));
    }
    if spec.drop_capabilities {
        host_config.insert("Capabilities".to_string(), json!([]));
    }

    let mut body = json!({
        "Image": spec.image,
        "Cmd": spec.command,
        "AttachStdin": spec.attach_stdin,
        "OpenStdin": spec.open_stdin,
        "StdinOnce": spec.stdin_once,
        "Tty": spec.tty,
        "NetworkDisabled": spec.network_disabled,
        "HostConfig": serde_json::Value::Object(host_config),
    });
    if let Some(directory) = &spec.working_directory {
        body["WorkingDir"] = json!(directory);
    }
    body
}

#[async_trait]
impl ContainerBackend for DockerBackend {
    async fn version(&self) -> Result<String, BackendError> {
        let response = self.call("GET", "/version", None).await?;
        let value: serde_json::Value = serde_json::from_str(&response.body)
            .map_err(|error| BackendError::Protocol(format!("bad version response: {error}")))?;
        Ok(value
            .get("Version")
            .and_then(|version| version.as_str())
            .unwrap_or("unknown")
            .to_string())
    }

    async fn create_volume(&self, name: &str) -> Result<(), BackendError> {
        debug!(volume = %name, "creating volume");
        self.call("POST", "/volumes/create", Some(json!({ "Name": name }))).await?;
        Ok(())
    }

    async fn delete_volume(&self, name: &str) -> Result<(), BackendError> {
        debug!(volume = %name, "deleting volume");
        self.call("DELETE", &format!("/volumes/{name}"), None).await?;
        Ok(())
    }

    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> Result<(), BackendError> {
        debug!(container = %name, image = %spec.image, "creating container");
        self.call("POST", &format!("/containers/create?name={name}"), Some(create_body(spec)))
            .await?;
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<(), BackendError> {
        debug!(container = %name, "starting container");
        self.call("POST", &format!("/containers/{name}/start"), None).await?;
        Ok(())
    }

    async fn stop_container(&self, name: &str) -> Result<(), BackendError> {
        debug!(container = %name, "stopping container");
        self.call("POST", &format!("/containers/{name}/stop"), None).await?;
        Ok(())
    }

    async fn delete_container(&self, name: &str, force: bool) -> Result<(), BackendError> {
        debug!(container = %name, force, "deleting container");
        self.call("DELETE", &format!("/containers/{name}?force={force}"), None).await?;
        Ok(())
    }

    async fn attach(
        &self,
        name: &str,
        options: AttachOptions,
        tty: bool,
    ) -> Result<AttachedIo, BackendError> {
        debug!(container = %name, "attaching to container");
        let path = format!(
            "/containers/{name}/attach?stream=1&stdin={}&stdout={}&stderr={}&logs={}",
            flag(options.stdin),
            flag(options.stdout),
            flag(options.stderr),
            flag(options.logs),
        );
        let stream = http::upgrade(&self.transport, "POST", &path).await?;
        let (read_half, write_half) = tokio::io::split(stream);
        Ok(AttachedIo {
            reader: Box::new(frames::DockerFrameReader::new(read_half, tty)),
            writer: Box::new(frames::DockerStdinWriter::new(write_half)),
        })
    }

    async fn resize_tty(&self, name: &str, rows: u32, cols: u32) -> Result<(), BackendError> {
        debug!(container = %name, rows, cols, "resizing tty");
        self.call("POST", &format!("/containers/{name}/resize?h={rows}&w={cols}"), None).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
