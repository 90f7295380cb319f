//! One-shot HTTP request node.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use weft_core::error::{Result, WeftError};
use weft_core::registry::NodeFactory;
use weft_core::schema::{AtomType, PortSchema};
use weft_core::traits::{Node, NodeContext, NodeDescriptor, NodeFuture};

/// Sends one HTTP request and latches the response.
///
/// Request parameters come from the (templated) config and may be
/// overridden per-invocation through the `request` input.
///
/// ```yaml
/// nodes:
///   - id: fetch
///     type: http
///     config:
///       url: "{{ base_url }}/users"
///       method: GET
///       headers: { accept: application/json }
///       timeout: 10
/// ```
pub struct HttpNode {
    client: reqwest::Client,
}

impl HttpNode {
    /// Create a node with a fresh client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn fail(ctx: &NodeContext, cause: String) -> WeftError {
        WeftError::NodeExecution {
            node_id: ctx.node_id().to_string(),
            cause,
        }
    }
}

impl Default for HttpNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for HttpNode {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new("http")
            .with_description("Performs a single HTTP request")
            .with_input(
                "request",
                PortSchema::value_struct([
                    ("url", AtomType::String),
                    ("method", AtomType::String),
                    ("headers", AtomType::Dict),
                    ("body", AtomType::Any),
                ]),
            )
            .with_output(
                "response",
                PortSchema::value_struct([
                    ("status", AtomType::Integer),
                    ("body", AtomType::Any),
                    ("success", AtomType::Boolean),
                ]),
            )
    }

    fn run<'a>(&'a self, ctx: NodeContext) -> NodeFuture<'a> {
        Box::pin(async move {
            let override_request = ctx.get_value("request").ok();
            let pick = |key: &str| -> Option<Value> {
                override_request
                    .as_ref()
                    .and_then(|r| r.get(key))
                    .filter(|v| !v.is_null())
                    .cloned()
                    .or_else(|| ctx.get_config(key))
            };

            let url = pick("url")
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| Self::fail(&ctx, "missing 'url'".to_string()))?;
            let method = pick("method")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "GET".to_string())
                .to_uppercase();
            let timeout = ctx.config_f64("timeout").unwrap_or(30.0);

            let method = reqwest::Method::from_bytes(method.as_bytes())
                .map_err(|_| Self::fail(&ctx, format!("invalid method '{method}'")))?;

            let mut request = self
                .client
                .request(method.clone(), &url)
                .timeout(Duration::from_secs_f64(timeout.max(0.0)));

            if let Some(headers) = pick("headers").and_then(|v| v.as_object().cloned()) {
                for (name, value) in &headers {
                    if let Some(text) = value.as_str() {
                        request = request.header(name.as_str(), text);
                    }
                }
            }
            if let Some(body) = pick("body").filter(|v| !v.is_null()) {
                request = request.json(&body);
            }

            ctx.log_info(format!("{method} {url}"));
            let response = request
                .send()
                .await
                .map_err(|e| Self::fail(&ctx, format!("request failed: {e}")))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| Self::fail(&ctx, format!("reading body failed: {e}")))?;
            let body: Value =
                serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text));

            let output = json!({
                "status": status.as_u16(),
                "body": body,
                "success": status.is_success(),
            });
            ctx.set_value("response", output.clone())?;
            Ok(output)
        })
    }
}

/// Factory for [`HttpNode`].
pub struct HttpFactory;

impl NodeFactory for HttpFactory {
    fn type_name(&self) -> &str {
        "http"
    }

    fn create(&self, _node_id: &str, _config: &Value) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(HttpNode::new()))
    }
}
