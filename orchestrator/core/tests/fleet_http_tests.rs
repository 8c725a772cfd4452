// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end fleet tests over real HTTP.
//!
//! An Agent router is served on a loopback port with a scripted launcher in
//! place of Docker; the Controller talks to it through `HttpAgentClient`,
//! exactly as it would to a remote host.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use simfleet_core::application::{
    AgentService, ControllerService, NodeRegistry, SharedSecretVerifier, StandardAgentService,
    StandardControllerService,
};
use simfleet_core::domain::error::ErrorKind;
use simfleet_core::domain::instance::{InstanceSpec, InstanceState, ProcessHandle, StopTarget};
use simfleet_core::domain::launcher::{HostResources, InstanceLauncher, LaunchSpec, LauncherError, StaticHostProbe};
use simfleet_core::domain::node::{NodeCapacity, NodeId, NodeRegistration};
use simfleet_core::domain::port_pool::{PortPool, PortRange};
use simfleet_core::infrastructure::repositories::{InMemoryInstanceRepository, InMemoryNodeRepository};
use simfleet_core::infrastructure::HttpAgentClient;
use simfleet_core::presentation::agent_router;

const KEY: &str = "fleet-test-key";

#[derive(Default)]
struct ScriptedLauncher {
    alive: Mutex<HashSet<String>>,
    launches: Mutex<u32>,
}

#[async_trait]
impl InstanceLauncher for ScriptedLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandle, LauncherError> {
        let mut launches = self.launches.lock();
        *launches += 1;
        let handle = format!("px4_{}_{}", spec.name, launches);
        self.alive.lock().insert(handle.clone());
        Ok(ProcessHandle::new(handle))
    }

    async fn terminate(&self, handle: &ProcessHandle, _grace: Duration) -> Result<(), LauncherError> {
        self.alive.lock().remove(handle.as_str());
        Ok(())
    }

    async fn is_alive(&self, handle: &ProcessHandle) -> Result<bool, LauncherError> {
        Ok(self.alive.lock().contains(handle.as_str()))
    }
}

struct Fleet {
    agent: Arc<StandardAgentService>,
    agent_addr: SocketAddr,
    server: JoinHandle<()>,
    controller: StandardControllerService,
}

async fn fleet() -> Fleet {
    let agent = Arc::new(StandardAgentService::new(
        NodeId::new("node-a"),
        "alpha",
        PortPool::new(PortRange::new(14560, 14562).unwrap()),
        Arc::new(InMemoryInstanceRepository::new()),
        Arc::new(ScriptedLauncher::default()),
        Arc::new(StaticHostProbe(HostResources { cpu_cores: 8, memory_gb: 16, disk_gb: 100 })),
        Duration::from_secs(1),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let agent_addr = listener.local_addr().unwrap();
    let app = agent_router(agent.clone());
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let registry = Arc::new(NodeRegistry::new(
        Arc::new(InMemoryNodeRepository::new()),
        Arc::new(SharedSecretVerifier::new(KEY)),
        chrono::Duration::seconds(90),
    ));
    let client = HttpAgentClient::new("http", 8443, Duration::from_secs(2), Duration::from_secs(1));
    let controller =
        StandardControllerService::new(registry, Arc::new(InMemoryInstanceRepository::new()), Arc::new(client));

    controller
        .register_node(KEY, registration(&agent_addr.to_string()))
        .await
        .unwrap();

    Fleet {
        agent,
        agent_addr,
        server,
        controller,
    }
}

fn registration(address: &str) -> NodeRegistration {
    NodeRegistration {
        node_id: NodeId::new("node-a"),
        name: "alpha".to_string(),
        address: address.to_string(),
        tags: BTreeSet::from(["px4-agent".to_string()]),
        capacity: NodeCapacity { cpu_cores: 8, memory_gb: 16, disk_gb: 100 },
    }
}

fn spec(name: &str) -> InstanceSpec {
    InstanceSpec {
        name: name.to_string(),
        model: "iris".to_string(),
        vehicle_type: "copter".to_string(),
        mav_udp: None,
    }
}

#[tokio::test]
async fn test_start_and_stop_through_the_agent_api() {
    let fleet = fleet().await;
    let node = NodeId::new("node-a");

    let instance = fleet.controller.start_instance(&node, spec("alpha")).await.unwrap();
    assert_eq!(instance.state(), InstanceState::Running);
    assert_eq!(instance.mav_udp, Some(14560));
    assert_eq!(instance.node_id, node);
    assert_eq!(fleet.agent.available_ports(), vec![14561, 14562]);

    let ack = fleet
        .controller
        .stop_instance(StopTarget::ByInstanceId(instance.id.clone()))
        .await
        .unwrap();
    assert_eq!(ack.status, InstanceState::Stopped);
    assert_eq!(fleet.agent.available_ports(), vec![14560, 14561, 14562]);
    assert_eq!(
        fleet.controller.get_instance(&instance.id).await.unwrap().state(),
        InstanceState::Stopped
    );
}

#[tokio::test]
async fn test_restart_under_same_name_gets_new_identifier() {
    let fleet = fleet().await;
    let node = NodeId::new("node-a");

    let first = fleet.controller.start_instance(&node, spec("alpha")).await.unwrap();
    fleet
        .controller
        .stop_instance(StopTarget::ByInstanceId(first.id.clone()))
        .await
        .unwrap();
    let second = fleet.controller.start_instance(&node, spec("alpha")).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(fleet.controller.list_instances().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_exhausted_agent_pool_is_relayed_with_remote_kind() {
    let fleet = fleet().await;
    let node = NodeId::new("node-a");

    for name in ["a", "b", "c"] {
        fleet.controller.start_instance(&node, spec(name)).await.unwrap();
    }
    let err = fleet.controller.start_instance(&node, spec("d")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AgentError);
    match err {
        simfleet_core::application::ControllerError::Rpc(rpc) => {
            assert_eq!(rpc.remote_kind(), Some(ErrorKind::Exhausted));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fleet.controller.list_instances().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_dead_agent_is_unreachable_and_leaves_no_record() {
    let fleet = fleet().await;
    let node = NodeId::new("node-a");

    let running = fleet.controller.start_instance(&node, spec("alpha")).await.unwrap();
    fleet.server.abort();
    let _ = fleet.server.await;

    let err = fleet.controller.start_instance(&node, spec("beta")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unreachable);
    assert_eq!(fleet.controller.list_instances().await.unwrap().len(), 1);

    // the stop outcome is unknown, so the record is left as it was
    let err = fleet
        .controller
        .stop_instance(StopTarget::ByInstanceId(running.id.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unreachable);
    assert_eq!(
        fleet.controller.get_instance(&running.id).await.unwrap().state(),
        InstanceState::Running
    );
}

#[tokio::test]
async fn test_reconcile_and_probe_over_http() {
    let fleet = fleet().await;
    let node = NodeId::new("node-a");

    let kept = fleet.controller.start_instance(&node, spec("kept")).await.unwrap();
    let gone = fleet.controller.start_instance(&node, spec("gone")).await.unwrap();

    // stopped behind the Controller's back
    fleet
        .agent
        .stop(StopTarget::ByInstanceId(gone.id.clone()))
        .await
        .unwrap();

    let report = fleet.controller.reconcile_node(&node).await.unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.marked_stopped, vec![gone.id.clone()]);
    assert_eq!(
        fleet.controller.get_instance(&kept.id).await.unwrap().state(),
        InstanceState::Running
    );

    let probe = fleet.controller.probe_node(&node).await.unwrap();
    assert!(probe.healthy);
}

#[tokio::test]
async fn test_reregistration_moves_node_without_duplicating_it() {
    let fleet = fleet().await;

    fleet
        .controller
        .register_node(KEY, registration(&format!("http://{}", fleet.agent_addr)))
        .await
        .unwrap();

    let nodes = fleet.controller.list_nodes().await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].address, format!("http://{}", fleet.agent_addr));

    let instance = fleet
        .controller
        .start_instance(&NodeId::new("node-a"), spec("alpha"))
        .await
        .unwrap();
    assert_eq!(instance.state(), InstanceState::Running);
}
