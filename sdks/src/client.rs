// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::types::{
    ApiErrorBody, InstanceDescriptor, InstanceView, NodeView, ProbeReport, ReconcileReport, RegisterNodeRequest,
    RegisterNodeResponse, SdkError, StartOnNodeRequest, StopAck, StopRequest,
};

/// Client for the simfleet Controller API.
#[derive(Clone)]
pub struct ControllerClient {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl ControllerClient {
    /// Create a client for the Controller at `base_url` (e.g. `http://controller:8000`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Per-request timeout, 30 seconds unless set.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SdkError> {
        let mut url = Url::parse(&self.base_url).map_err(|_| SdkError::InvalidUrl(self.base_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| SdkError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T, SdkError> {
        let url = self.url(segments)?;
        debug!(%method, %url, "Calling controller");

        let mut request = self.client.request(method, url).timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let parsed = serde_json::from_slice::<ApiErrorBody>(&bytes).ok();
            return Err(match parsed {
                Some(body) => SdkError::Api {
                    status: status.as_u16(),
                    kind: Some(body.kind),
                    remote_kind: body.remote_kind,
                    message: body.message,
                },
                None => SdkError::Api {
                    status: status.as_u16(),
                    kind: None,
                    remote_kind: None,
                    message: String::from_utf8_lossy(&bytes).into_owned(),
                },
            });
        }
        serde_json::from_slice(&bytes).map_err(|e| SdkError::Decode(e.to_string()))
    }

    /// Register (or refresh) an Agent node. Also the Agent heartbeat.
    pub async fn register(&self, request: &RegisterNodeRequest) -> Result<RegisterNodeResponse, SdkError> {
        self.send(Method::POST, &["api", "v1", "register"], Some(request)).await
    }

    pub async fn list_nodes(&self) -> Result<Vec<NodeView>, SdkError> {
        self.send::<(), _>(Method::GET, &["api", "v1", "nodes"], None).await
    }

    pub async fn get_node(&self, node_id: &str) -> Result<NodeView, SdkError> {
        self.send::<(), _>(Method::GET, &["api", "v1", "nodes", node_id], None).await
    }

    pub async fn start_on_node(
        &self,
        node_id: &str,
        request: &StartOnNodeRequest,
    ) -> Result<InstanceDescriptor, SdkError> {
        self.send(Method::POST, &["api", "v1", "nodes", node_id, "start"], Some(request))
            .await
    }

    pub async fn stop_on_node(&self, node_id: &str, request: &StopRequest) -> Result<StopAck, SdkError> {
        self.send(Method::POST, &["api", "v1", "nodes", node_id, "stop"], Some(request))
            .await
    }

    pub async fn reconcile_node(&self, node_id: &str) -> Result<ReconcileReport, SdkError> {
        self.send::<(), _>(Method::POST, &["api", "v1", "nodes", node_id, "reconcile"], None)
            .await
    }

    pub async fn probe_node(&self, node_id: &str) -> Result<ProbeReport, SdkError> {
        self.send::<(), _>(Method::POST, &["api", "v1", "nodes", node_id, "probe"], None)
            .await
    }

    pub async fn list_instances(&self) -> Result<Vec<InstanceView>, SdkError> {
        self.send::<(), _>(Method::GET, &["api", "v1", "instances"], None).await
    }

    pub async fn get_instance(&self, instance_id: &str) -> Result<InstanceView, SdkError> {
        self.send::<(), _>(Method::GET, &["api", "v1", "instances", instance_id], None)
            .await
    }

    pub async fn stop_instance(&self, instance_id: &str) -> Result<StopAck, SdkError> {
        self.send::<(), _>(Method::POST, &["api", "v1", "instances", instance_id, "stop"], None)
            .await
    }

    /// `true` when the Controller answers its liveness probe.
    pub async fn health(&self) -> Result<bool, SdkError> {
        let status: serde_json::Value = self.send::<(), _>(Method::GET, &["health"], None).await?;
        Ok(status.get("status").and_then(|s| s.as_str()) == Some("healthy"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use mockito::Matcher;
    use simfleet_core::domain::node::NodeId;
    use std::collections::BTreeSet;

    #[test]
    fn test_url_joins_and_escapes_segments() {
        let client = ControllerClient::new("http://controller:8000/");
        let url = client.url(&["api", "v1", "nodes", "rack 1/a"]).unwrap();
        assert_eq!(url.as_str(), "http://controller:8000/api/v1/nodes/rack%201%2Fa");

        assert!(matches!(
            ControllerClient::new("not a url").url(&["x"]),
            Err(SdkError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_register_sends_credential() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/register")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "node_id": "node-a",
                "credential": "k"
            })))
            .with_status(200)
            .with_body(r#"{"status":"registered","node_id":"node-a"}"#)
            .create_async()
            .await;

        let request = RegisterNodeRequest {
            node_id: NodeId::new("node-a"),
            name: "alpha".to_string(),
            address: "10.0.0.1:8443".to_string(),
            tags: BTreeSet::new(),
            credential: "k".to_string(),
            cpu_cores: 4,
            memory_gb: 8,
            disk_gb: 50,
        };
        let ack = ControllerClient::new(server.url()).register(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(ack.node_id, NodeId::new("node-a"));
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced_with_kinds() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/nodes/node-a/start")
            .with_status(502)
            .with_body(r#"{"kind":"agent_error","message":"rejected","remote_kind":"exhausted"}"#)
            .create_async()
            .await;

        let request = StartOnNodeRequest {
            vehicle_type: "copter".to_string(),
            name: None,
            model: None,
            mav_udp: None,
        };
        let err = ControllerClient::new(server.url())
            .start_on_node("node-a", &request)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AgentError);
        assert_eq!(err.remote_kind(), Some(ErrorKind::Exhausted));
        assert!(matches!(err, SdkError::Api { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_opaque_failure_and_bad_payload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/nodes")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/instances")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = ControllerClient::new(server.url());
        let err = client.list_nodes().await.unwrap_err();
        assert!(matches!(err, SdkError::Api { kind: None, .. }));
        assert_eq!(client.list_instances().await.unwrap_err().kind(), ErrorKind::ProtocolError);
    }
}
