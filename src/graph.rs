//! Client for an external graph service.
//!
//! The service stores nodes and weighted edges and answers shortest-path
//! queries. vdb does not implement it; this module only speaks its HTTP
//! protocol:
//!
//! | Request                          | Body / response                     |
//! |----------------------------------|-------------------------------------|
//! | `POST /node`                     | `{id, properties}`                  |
//! | `POST /edge`                     | `{from, to, weight, properties}`    |
//! | `GET /shortest_path/{from}/{to}` | `{nodes, total_weight}`, 404 = none |
//! | `GET /graph`                     | `{nodes, edges}`                    |
//!
//! Failures come back as `{"status": "error", "message": ...}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, VdbError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

fn default_weight() -> f64 {
    1.0
}

impl GraphEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, weight: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            weight,
            properties: Map::new(),
        }
    }
}

/// A shortest path, as node ids from source to target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    pub nodes: Vec<String>,
    pub total_weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDump {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[async_trait]
pub trait GraphClient: Send + Sync {
    async fn create_node(&self, node: &GraphNode) -> Result<()>;

    async fn create_edge(&self, edge: &GraphEdge) -> Result<()>;

    /// `None` when no path connects the two nodes.
    async fn shortest_path(&self, from: &str, to: &str) -> Result<Option<GraphPath>>;

    async fn dump_graph(&self) -> Result<GraphDump>;
}

/// [`GraphClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGraphClient {
    base: Url,
    client: Client,
}

impl HttpGraphClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| VdbError::graph(format!("invalid base url {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(VdbError::graph(format!("{base_url} cannot be a base url")));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VdbError::graph(e.to_string()))?;
        Ok(Self { base, client })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| VdbError::graph("base url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| VdbError::graph(format!("request failed: {e}")))?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }
}

async fn error_from_response(response: reqwest::Response) -> VdbError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    VdbError::graph(format!("status {status}: {message}"))
}

#[async_trait]
impl GraphClient for HttpGraphClient {
    async fn create_node(&self, node: &GraphNode) -> Result<()> {
        let url = self.endpoint(&["node"])?;
        let response = self.send(self.client.post(url).json(node)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    async fn create_edge(&self, edge: &GraphEdge) -> Result<()> {
        let url = self.endpoint(&["edge"])?;
        let response = self.send(self.client.post(url).json(edge)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    async fn shortest_path(&self, from: &str, to: &str) -> Result<Option<GraphPath>> {
        let url = self.endpoint(&["shortest_path", from, to])?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let path = response
            .json()
            .await
            .map_err(|e| VdbError::graph(format!("invalid shortest path response: {e}")))?;
        Ok(Some(path))
    }

    async fn dump_graph(&self) -> Result<GraphDump> {
        let url = self.endpoint(&["graph"])?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(error_from_response(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| VdbError::graph(format!("invalid graph response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned HTTP response and hand back the request line.
    async fn serve_once(status: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            let text = String::from_utf8_lossy(&request).into_owned();
            text.lines().next().unwrap_or_default().to_string()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = HttpGraphClient::new("http://localhost:8080/api/").unwrap();
        let url = client.endpoint(&["shortest_path", "a b", "c/d"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/shortest_path/a%20b/c%2Fd"
        );
        assert!(HttpGraphClient::new("not a url").is_err());
        assert!(HttpGraphClient::new("mailto:someone@example.com").is_err());
    }

    #[test]
    fn test_wire_shapes() {
        let edge = GraphEdge::new("a", "b", 2.5);
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"from": "a", "to": "b", "weight": 2.5, "properties": {}})
        );

        let node = GraphNode::new("a").with_property("label", "start");
        assert_eq!(node.properties["label"], "start");
    }

    #[tokio::test]
    async fn test_shortest_path_found() {
        let (base, server) =
            serve_once("200 OK", r#"{"nodes":["a","c","b"],"total_weight":3.0}"#).await;
        let client = HttpGraphClient::new(&base).unwrap();
        let path = client.shortest_path("a", "b").await.unwrap().unwrap();
        assert_eq!(path.nodes, vec!["a", "c", "b"]);
        assert_eq!(path.total_weight, 3.0);
        assert_eq!(server.await.unwrap(), "GET /shortest_path/a/b HTTP/1.1");
    }

    #[tokio::test]
    async fn test_shortest_path_missing() {
        let (base, _server) = serve_once(
            "404 Not Found",
            r#"{"status":"error","message":"no path"}"#,
        )
        .await;
        let client = HttpGraphClient::new(&base).unwrap();
        assert_eq!(client.shortest_path("a", "z").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let (base, _server) = serve_once(
            "500 Internal Server Error",
            r#"{"status":"error","message":"graph store offline"}"#,
        )
        .await;
        let client = HttpGraphClient::new(&base).unwrap();
        let err = client.dump_graph().await.unwrap_err();
        match err {
            VdbError::Graph(message) => assert!(message.contains("graph store offline")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
