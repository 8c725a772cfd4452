// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent RPC Client
//!
//! `reqwest` implementation of the Controller's [`AgentRpc`] port. Requests
//! go to the Agent's HTTP API at the node's registered address:
//!
//! - `http://` / `https://` addresses are used as given
//! - `host:port` gets the configured scheme prepended
//! - a bare host gets the scheme and the default Agent port
//!
//! Transport failures (connect, timeout, reset before a status line) become
//! `Unreachable`; a non-2xx answer becomes `AgentError` carrying the raw
//! body; a 2xx answer that does not decode becomes `ProtocolError`.
//! Nothing is retried.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::application::agent_rpc::{AgentRpc, RpcError};
use crate::domain::node::Node;
use crate::domain::node_config::ControllerConfig;
use crate::domain::protocol::{
    AgentStatusReport, HealthReport, InstanceDescriptor, StartInstanceRequest, StopAck, StopRequest,
};

pub struct HttpAgentClient {
    client: Client,
    scheme: String,
    default_port: u16,
    timeout: Duration,
    health_timeout: Duration,
}

impl HttpAgentClient {
    pub fn new(scheme: impl Into<String>, default_port: u16, timeout: Duration, health_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            scheme: scheme.into(),
            default_port,
            timeout,
            health_timeout,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.agent_scheme.clone(),
            config.default_agent_port,
            config.agent_timeout(),
            config.health_timeout(),
        )
    }

    /// Base URL of the Agent API for a registered address.
    pub fn base_url(&self, address: &str) -> String {
        let address = address.trim().trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            return address.to_string();
        }
        if has_port(address) {
            return format!("{}://{}", self.scheme, address);
        }
        if address.contains(':') && !address.starts_with('[') {
            // bare IPv6 literal
            return format!("{}://[{}]:{}", self.scheme, address, self.default_port);
        }
        format!("{}://{}:{}", self.scheme, address, self.default_port)
    }

    fn url(&self, node: &Node, path: &str) -> String {
        format!("{}{}", self.base_url(&node.address), path)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        node: &Node,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<T, RpcError> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| unreachable(node, &e))?;

        let status = response.status();
        if !status.is_success() {
            // a rejection whose body cannot be read is a transport failure
            let body = response.text().await.map_err(|e| unreachable(node, &e))?;
            debug!(node_id = %node.id, status = status.as_u16(), "Agent rejected call");
            return Err(RpcError::AgentError {
                node_id: node.id.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| unreachable(node, &e))?;
        serde_json::from_slice(&bytes).map_err(|e| RpcError::ProtocolError {
            node_id: node.id.clone(),
            reason: e.to_string(),
        })
    }
}

fn has_port(address: &str) -> bool {
    let Some((host, port)) = address.rsplit_once(':') else {
        return false;
    };
    let bracketed_or_plain = host.ends_with(']') || !host.contains(':');
    bracketed_or_plain && port.parse::<u16>().is_ok()
}

fn unreachable(node: &Node, err: &reqwest::Error) -> RpcError {
    let reason = if err.is_timeout() {
        format!("timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    };
    RpcError::Unreachable {
        node_id: node.id.clone(),
        reason,
    }
}

#[async_trait]
impl AgentRpc for HttpAgentClient {
    async fn start(&self, node: &Node, request: &StartInstanceRequest) -> Result<InstanceDescriptor, RpcError> {
        let req = self.client.post(self.url(node, "/agent/start")).json(request);
        self.call(node, req, self.timeout).await
    }

    async fn stop(&self, node: &Node, request: &StopRequest) -> Result<StopAck, RpcError> {
        let req = self.client.post(self.url(node, "/agent/stop")).json(request);
        self.call(node, req, self.timeout).await
    }

    async fn status(&self, node: &Node) -> Result<AgentStatusReport, RpcError> {
        let req = self.client.get(self.url(node, "/agent/status"));
        self.call(node, req, self.timeout).await
    }

    async fn instances(&self, node: &Node) -> Result<Vec<InstanceDescriptor>, RpcError> {
        let req = self.client.get(self.url(node, "/agent/instances"));
        self.call(node, req, self.timeout).await
    }

    async fn health(&self, node: &Node) -> Result<bool, RpcError> {
        let req = self.client.get(self.url(node, "/health"));
        match self.call::<HealthReport>(node, req, self.health_timeout).await {
            Ok(report) => Ok(report.status == "healthy"),
            Err(RpcError::AgentError { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;
    use crate::domain::instance::{InstanceId, InstanceState};
    use crate::domain::node::{NodeCapacity, NodeId, NodeRegistration};
    use chrono::Utc;
    use mockito::Matcher;
    use std::collections::BTreeSet;

    fn client() -> HttpAgentClient {
        HttpAgentClient::new("http", 8443, Duration::from_secs(5), Duration::from_millis(300))
    }

    fn node(address: &str) -> Node {
        Node::register(
            NodeRegistration {
                node_id: NodeId::new("node-a"),
                name: "alpha".to_string(),
                address: address.to_string(),
                tags: BTreeSet::new(),
                capacity: NodeCapacity::default(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_truncated_rejection_body_is_unreachable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/agent/stop")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_chunked_body(|w| {
                std::io::Write::write_all(w, br#"{"kind":"exha"#)?;
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "connection dropped"))
            })
            .create_async()
            .await;

        let request = StopRequest::by_instance(InstanceId::new("i-1"));
        let err = client().stop(&node(&server.url()), &request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
        assert_eq!(err.remote_kind(), None);
    }

    #[test]
    fn test_base_url_rules() {
        let c = client();
        assert_eq!(c.base_url("http://10.0.0.5:9000/"), "http://10.0.0.5:9000");
        assert_eq!(c.base_url("https://agent.local"), "https://agent.local");
        assert_eq!(c.base_url("10.0.0.5:9000"), "http://10.0.0.5:9000");
        assert_eq!(c.base_url("10.0.0.5"), "http://10.0.0.5:8443");
        assert_eq!(c.base_url("gpu-box"), "http://gpu-box:8443");
        assert_eq!(c.base_url("[::1]:9000"), "http://[::1]:9000");
        assert_eq!(c.base_url("fe80::1"), "http://[fe80::1]:8443");
    }

    #[tokio::test]
    async fn test_start_posts_request_and_decodes_descriptor() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/agent/start")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "name": "alpha",
                "model": "iris",
                "vehicle_type": "copter"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"instance_id":"i-1","container_id":"c-1","name":"alpha","model":"iris",
                    "vehicle_type":"copter","mav_udp":14560,"status":"running"}"#,
            )
            .create_async()
            .await;

        let request = StartInstanceRequest {
            name: "alpha".to_string(),
            model: "iris".to_string(),
            vehicle_type: "copter".to_string(),
            mav_udp: None,
        };
        let descriptor = client().start(&node(&server.url()), &request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(descriptor.instance_id, InstanceId::new("i-1"));
        assert_eq!(descriptor.mav_udp, Some(14560));
        assert_eq!(descriptor.status, InstanceState::Running);
    }

    #[tokio::test]
    async fn test_rejection_is_agent_error_with_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/agent/stop")
            .with_status(404)
            .with_body(r#"{"kind":"not_found","message":"Instance i-9 not found"}"#)
            .create_async()
            .await;

        let err = client()
            .stop(&node(&server.url()), &StopRequest::by_instance(InstanceId::new("i-9")))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AgentError);
        assert_eq!(err.remote_kind(), Some(ErrorKind::NotFound));
        assert!(matches!(err, RpcError::AgentError { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_undecodable_success_is_protocol_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/agent/instances")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let err = client().instances(&node(&server.url())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client().status(&node(&addr.to_string())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }

    #[tokio::test]
    async fn test_silent_agent_times_out_as_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let c = HttpAgentClient::new("http", 8443, Duration::from_millis(200), Duration::from_millis(200));
        let err = c.health(&node(&addr.to_string())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }

    #[tokio::test]
    async fn test_health_answers() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"healthy","node_id":"node-a","timestamp":"2026-01-01T00:00:00Z"}"#)
            .create_async()
            .await;
        assert!(client().health(&node(&server.url())).await.unwrap());

        let mut degraded = mockito::Server::new_async().await;
        degraded
            .mock("GET", "/health")
            .with_status(503)
            .with_body("starting up")
            .create_async()
            .await;
        assert!(!client().health(&node(&degraded.url())).await.unwrap());
    }
}
