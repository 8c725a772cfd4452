// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Instance commands
//!
//! Commands: start, stop, list, get

use anyhow::Result;
use clap::Subcommand;

use simfleet_core::domain::instance::{InstanceId, ProcessHandle};
use simfleet_sdk::{ControllerClient, StartOnNodeRequest, StopRequest};

use super::node::fail;
use super::render;

#[derive(Subcommand)]
pub enum InstanceCommand {
    /// Start a simulation instance on a node
    Start {
        /// Target node id
        #[arg(long)]
        node: String,

        /// Vehicle type
        #[arg(long, default_value = "copter")]
        vehicle_type: String,

        /// Instance name (generated when omitted)
        #[arg(long)]
        name: Option<String>,

        /// Gazebo model (defaults to iris)
        #[arg(long)]
        model: Option<String>,

        /// Explicit MAVLink UDP port; must lie in the node's pool
        #[arg(long)]
        mav_udp: Option<u16>,
    },

    /// Stop an instance by its id, or by container id on a given node
    Stop {
        /// Instance id
        #[arg(required_unless_present = "container")]
        instance_id: Option<String>,

        /// Node to address directly; required with --container
        #[arg(long, requires = "container")]
        node: Option<String>,

        /// Container id on the Agent
        #[arg(long, requires = "node")]
        container: Option<String>,
    },

    /// List every instance the Controller knows of
    List {
        /// Only instances on this node
        #[arg(long)]
        node: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show one instance
    Get {
        instance_id: String,

        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: InstanceCommand, controller_url: &str) -> Result<()> {
    let client = ControllerClient::new(controller_url);
    let output = run(command, &client).await?;
    print!("{}", output);
    Ok(())
}

pub async fn run(command: InstanceCommand, client: &ControllerClient) -> Result<String> {
    let text = match command {
        InstanceCommand::Start {
            node,
            vehicle_type,
            name,
            model,
            mav_udp,
        } => {
            let request = StartOnNodeRequest {
                vehicle_type,
                name,
                model,
                mav_udp,
            };
            let descriptor = client.start_on_node(&node, &request).await.map_err(fail)?;
            render::started(&descriptor, &node)
        }
        InstanceCommand::Stop {
            instance_id,
            node: Some(node),
            container,
        } => {
            let request = StopRequest {
                container_id: container.map(ProcessHandle::new),
                instance_id: instance_id.map(InstanceId::new),
            };
            render::stopped(&client.stop_on_node(&node, &request).await.map_err(fail)?)
        }
        InstanceCommand::Stop {
            instance_id: Some(id),
            node: None,
            ..
        } => render::stopped(&client.stop_instance(&id).await.map_err(fail)?),
        InstanceCommand::Stop { .. } => anyhow::bail!("Either an instance id or --node with --container is required"),
        InstanceCommand::List { node, json } => {
            let mut instances = client.list_instances().await.map_err(fail)?;
            if let Some(node) = node {
                instances.retain(|i| i.node_id.as_str() == node);
            }
            if json {
                serde_json::to_string_pretty(&instances)? + "\n"
            } else {
                render::instance_table(&instances)
            }
        }
        InstanceCommand::Get { instance_id, json } => {
            let instance = client.get_instance(&instance_id).await.map_err(fail)?;
            if json {
                serde_json::to_string_pretty(&instance)? + "\n"
            } else {
                render::instance_detail(&instance)
            }
        }
    };
    Ok(text)
}
