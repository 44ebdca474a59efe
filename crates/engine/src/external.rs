//! External tool discovery over HTTP.
//!
//! Tool servers advertise callables at `GET {server}/tools` and execute
//! them at `POST {server}/invoke`. Discovery failures are logged and
//! skipped; a dead tool server must never break startup.

use crate::tools::{Tool, ToolInvocation, ToolOutput, ToolRegistry};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tome_core::{AppError, AppResult};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
const INVOKE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct AdvertisedTool {
    name: String,
    #[serde(default)]
    #[allow(dead_code)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    result: Option<Value>,
}

/// A tool living on a remote server, dispatched by its advertised name.
pub struct ExternalTool {
    server: String,
    name: String,
    client: reqwest::Client,
}

#[async_trait::async_trait]
impl Tool for ExternalTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, invocation: &ToolInvocation) -> AppResult<ToolOutput> {
        let mut params = match &invocation.params {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        params.insert("query".to_string(), json!(invocation.query));
        if let Some(document_id) = invocation.document_ids.first() {
            params.insert("document_id".to_string(), json!(document_id));
        }
        params.insert("k".to_string(), json!(invocation.k));

        let response = self
            .client
            .post(format!("{}/invoke", self.server))
            .timeout(INVOKE_TIMEOUT)
            .json(&json!({ "tool": self.name, "params": params }))
            .send()
            .await
            .map_err(|e| AppError::Tool {
                tool: self.name.clone(),
                message: format!("request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(AppError::Tool {
                tool: self.name.clone(),
                message: format!("server returned {}", response.status()),
            });
        }

        let body: InvokeResponse = response.json().await.map_err(|e| AppError::Tool {
            tool: self.name.clone(),
            message: format!("invalid response body: {}", e),
        })?;

        match body.result {
            Some(Value::Array(items)) => Ok(ToolOutput::Records(items)),
            Some(value) => Ok(ToolOutput::Record(value)),
            None => Ok(ToolOutput::Record(Value::Null)),
        }
    }
}

/// Discover tools from the configured servers and register them.
///
/// Each server is asked once; unreachable servers or malformed listings
/// contribute nothing.
pub async fn discover_tools(registry: &mut ToolRegistry, servers: &[String]) {
    let client = reqwest::Client::new();

    for server in servers {
        let server = server.trim_end_matches('/');
        if server.is_empty() {
            continue;
        }

        let listing = client
            .get(format!("{}/tools", server))
            .timeout(DISCOVERY_TIMEOUT)
            .send()
            .await;

        let advertised: Vec<AdvertisedTool> = match listing {
            Ok(response) => match response.json().await {
                Ok(tools) => tools,
                Err(e) => {
                    tracing::warn!("Tool listing from {} unparseable: {}", server, e);
                    continue;
                }
            },
            Err(e) => {
                tracing::warn!("Tool server {} unreachable: {}", server, e);
                continue;
            }
        };

        for tool in advertised {
            if tool.name.is_empty() {
                continue;
            }
            registry.register_external(std::sync::Arc::new(ExternalTool {
                server: server.to_string(),
                name: tool.name,
                client: client.clone(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discovery_survives_dead_server() {
        let mut registry = ToolRegistry::empty();
        discover_tools(
            &mut registry,
            &["http://127.0.0.1:1/".to_string(), "".to_string()],
        )
        .await;
        assert!(registry.external_tool_names().is_empty());
    }
}
