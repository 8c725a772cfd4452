// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Node commands
//!
//! Commands: list, get, probe, reconcile

use anyhow::Result;
use clap::Subcommand;

use simfleet_sdk::ControllerClient;

use super::render;

#[derive(Subcommand)]
pub enum NodeCommand {
    /// List registered nodes in registration order
    List {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one node
    Get {
        node_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Call the node's Agent health endpoint and update its status
    Probe { node_id: String },

    /// Compare the Controller's records for a node against its Agent
    Reconcile { node_id: String },
}

pub async fn handle_command(command: NodeCommand, controller_url: &str) -> Result<()> {
    let client = ControllerClient::new(controller_url);
    let output = run(command, &client).await?;
    print!("{}", output);
    Ok(())
}

/// Execute against `client` and return what would be printed.
pub async fn run(command: NodeCommand, client: &ControllerClient) -> Result<String> {
    let text = match command {
        NodeCommand::List { json } => {
            let nodes = client.list_nodes().await.map_err(fail)?;
            if json {
                serde_json::to_string_pretty(&nodes)? + "\n"
            } else {
                render::node_table(&nodes)
            }
        }
        NodeCommand::Get { node_id, json } => {
            let node = client.get_node(&node_id).await.map_err(fail)?;
            if json {
                serde_json::to_string_pretty(&node)? + "\n"
            } else {
                render::node_detail(&node)
            }
        }
        NodeCommand::Probe { node_id } => render::probe(&client.probe_node(&node_id).await.map_err(fail)?),
        NodeCommand::Reconcile { node_id } => {
            render::reconcile(&client.reconcile_node(&node_id).await.map_err(fail)?)
        }
    };
    Ok(text)
}

pub(crate) fn fail(e: simfleet_sdk::SdkError) -> anyhow::Error {
    anyhow::anyhow!(render::sdk_error(&e))
}
