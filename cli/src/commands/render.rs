// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Terminal rendering for operator commands.

use colored::{ColoredString, Colorize};

use simfleet_core::domain::instance::InstanceState;
use simfleet_core::domain::node::NodeStatus;
use simfleet_sdk::{InstanceDescriptor, InstanceView, NodeView, ProbeReport, ReconcileReport, SdkError, StopAck};

pub fn node_status(status: NodeStatus) -> ColoredString {
    match status {
        NodeStatus::Online => status.as_str().green(),
        NodeStatus::Offline => status.as_str().dimmed(),
        NodeStatus::Error => status.as_str().red(),
    }
}

pub fn instance_state(state: InstanceState) -> ColoredString {
    match state {
        InstanceState::Running => state.as_str().green(),
        InstanceState::Starting | InstanceState::Stopping => state.as_str().yellow(),
        InstanceState::Stopped => state.as_str().dimmed(),
        InstanceState::Error => state.as_str().red(),
    }
}

fn port(mav_udp: Option<u16>) -> String {
    mav_udp.map_or_else(|| "-".to_string(), |p| p.to_string())
}

pub fn node_table(nodes: &[NodeView]) -> String {
    if nodes.is_empty() {
        return "No nodes registered.".dimmed().to_string();
    }
    let mut out = format!(
        "{:<24} {:<20} {:<24} {:<8} {:>4} {:>6} {:>6}  {}\n",
        "ID", "NAME", "ADDRESS", "STATUS", "CPU", "MEM", "DISK", "TAGS"
    )
    .bold()
    .to_string();
    for n in nodes {
        let tags: Vec<&str> = n.tags.iter().map(String::as_str).collect();
        out.push_str(&format!(
            "{:<24} {:<20} {:<24} {:<8} {:>4} {:>6} {:>6}  {}\n",
            n.id,
            n.name,
            n.address,
            node_status(n.status),
            n.cpu_cores,
            format!("{}G", n.memory_gb),
            format!("{}G", n.disk_gb),
            tags.join(",")
        ));
    }
    out
}

pub fn node_detail(n: &NodeView) -> String {
    let tags: Vec<&str> = n.tags.iter().map(String::as_str).collect();
    format!(
        "{}\n  Name: {}\n  Address: {}\n  Status: {}\n  Last seen: {}\n  Capacity: {} cores, {} GB memory, {} GB disk\n  Tags: {}\n",
        format!("Node {}", n.id).bold(),
        n.name,
        n.address,
        node_status(n.status),
        n.last_seen.to_rfc3339(),
        n.cpu_cores,
        n.memory_gb,
        n.disk_gb,
        if tags.is_empty() { "(none)".to_string() } else { tags.join(", ") }
    )
}

pub fn instance_table(instances: &[InstanceView]) -> String {
    if instances.is_empty() {
        return "No instances.".dimmed().to_string();
    }
    let mut out = format!(
        "{:<36} {:<20} {:<16} {:<8} {:<8} {:>6}  {}\n",
        "ID", "NODE", "NAME", "MODEL", "STATE", "PORT", "CREATED"
    )
    .bold()
    .to_string();
    for i in instances {
        out.push_str(&format!(
            "{:<36} {:<20} {:<16} {:<8} {:<8} {:>6}  {}\n",
            i.id,
            i.node_id,
            i.name,
            i.model,
            instance_state(i.status),
            port(i.mav_udp),
            i.created_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    out
}

pub fn instance_detail(i: &InstanceView) -> String {
    format!(
        "{}\n  Node: {}\n  Name: {}\n  Vehicle: {} ({})\n  State: {}\n  MAVLink UDP: {}\n  Container: {}\n  Created: {}\n  Updated: {}\n",
        format!("Instance {}", i.id).bold(),
        i.node_id,
        i.name,
        i.vehicle_type,
        i.model,
        instance_state(i.status),
        port(i.mav_udp),
        i.container_id.as_ref().map_or_else(|| "-".to_string(), |h| h.to_string()),
        i.created_at.to_rfc3339(),
        i.updated_at.to_rfc3339()
    )
}

pub fn started(d: &InstanceDescriptor, node_id: &str) -> String {
    format!(
        "{}\n  Instance: {}\n  Node: {}\n  MAVLink UDP: {}\n",
        format!("✓ Started '{}' ({})", d.name, d.model).green(),
        d.instance_id,
        node_id,
        port(d.mav_udp)
    )
}

pub fn stopped(ack: &StopAck) -> String {
    let what = ack
        .instance_id
        .as_ref()
        .map(|id| id.to_string())
        .or_else(|| ack.container_id.as_ref().map(|h| h.to_string()))
        .unwrap_or_else(|| "instance".to_string());
    format!("{}\n", format!("✓ {} is {}", what, ack.status).green())
}

pub fn reconcile(report: &ReconcileReport) -> String {
    let mut out = format!(
        "{}\n  Checked: {}\n",
        format!("Reconciled node {}", report.node_id).bold(),
        report.checked
    );
    for (label, ids) in [
        ("Marked stopped", &report.marked_stopped),
        ("Marked error", &report.marked_error),
        ("Promoted to running", &report.promoted_running),
        ("Untracked on agent", &report.untracked),
    ] {
        if !ids.is_empty() {
            out.push_str(&format!("  {}: {}\n", label, ids.len()));
            for id in ids {
                out.push_str(&format!("    - {}\n", id));
            }
        }
    }
    out
}

pub fn probe(report: &ProbeReport) -> String {
    let verdict = if report.healthy {
        "healthy".green()
    } else {
        "unhealthy".red()
    };
    format!(
        "Node {} is {} (status: {})\n",
        report.node_id.to_string().bold(),
        verdict,
        node_status(report.status)
    )
}

/// One-line description of a Controller failure, including the Agent's
/// kind when the Controller relayed a rejection.
pub fn sdk_error(e: &SdkError) -> String {
    let mut line = format!("[{}] {}", e.kind(), e);
    if let Some(remote) = e.remote_kind() {
        line.push_str(&format!(" (agent reported {})", remote));
    }
    line
}
