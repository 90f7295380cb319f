//! Periodic tick source node.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use weft_core::error::{Result, WeftError};
use weft_core::registry::NodeFactory;
use weft_core::schema::{AtomType, PortSchema};
use weft_core::traits::{Node, NodeContext, NodeDescriptor, NodeFuture};

/// Emits tick chunks on a fixed interval.
///
/// The interval accepts `"250ms"`, `"5s"`, `"2m"`, or a bare number of
/// seconds. With `count` set, the node closes its output after that many
/// ticks and returns; without it, it ticks until cancelled.
///
/// ```yaml
/// nodes:
///   - id: heartbeat
///     type: timer
///     config:
///       interval: 5s
///       count: 10
///       data: { source: heartbeat }
/// ```
pub struct TimerNode;

/// Parse an interval spec into a duration.
fn parse_interval(value: &Value) -> Option<Duration> {
    if let Some(secs) = value.as_f64() {
        return (secs > 0.0).then(|| Duration::from_secs_f64(secs));
    }
    let text = value.as_str()?.trim();
    let (number, unit) = match text.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(split) => text.split_at(split),
        None => (text, "s"),
    };
    let amount: f64 = number.parse().ok()?;
    let duration = match unit.trim() {
        "ms" => Duration::from_secs_f64(amount / 1000.0),
        "s" | "" => Duration::from_secs_f64(amount),
        "m" => Duration::from_secs_f64(amount * 60.0),
        "h" => Duration::from_secs_f64(amount * 3600.0),
        _ => return None,
    };
    (amount > 0.0).then_some(duration)
}

fn unix_seconds() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    format!("{secs:.3}")
}

impl Node for TimerNode {
    fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor::new("timer")
            .with_mode(weft_core::traits::ExecutionMode::Streaming)
            .with_description("Emits periodic tick chunks")
            .with_output(
                "tick",
                PortSchema::streaming_struct([
                    ("timestamp", AtomType::String),
                    ("sequence", AtomType::Integer),
                    ("data", AtomType::Dict),
                ]),
            )
    }

    fn run<'a>(&'a self, ctx: NodeContext) -> NodeFuture<'a> {
        Box::pin(async move {
            let interval = ctx
                .get_config("interval")
                .as_ref()
                .and_then(parse_interval)
                .ok_or_else(|| WeftError::NodeExecution {
                    node_id: ctx.node_id().to_string(),
                    cause: "missing or invalid 'interval'".to_string(),
                })?;
            let count = ctx.config_i64("count").filter(|&n| n > 0);
            let data = ctx.get_config_or("data", json!({}));

            ctx.log_info(format!(
                "ticking every {:?}{}",
                interval,
                count.map(|n| format!(" for {n} tick(s)")).unwrap_or_default()
            ));

            let mut sequence: i64 = 0;
            loop {
                tokio::time::sleep(interval).await;
                sequence += 1;
                ctx.emit(
                    "tick",
                    json!({
                        "timestamp": unix_seconds(),
                        "sequence": sequence,
                        "data": data.clone(),
                    }),
                )
                .await?;
                if count.is_some_and(|n| sequence >= n) {
                    break;
                }
            }

            ctx.close_output("tick").await?;
            Ok(json!({"ticks": sequence}))
        })
    }
}

/// Factory for [`TimerNode`].
pub struct TimerFactory;

impl NodeFactory for TimerFactory {
    fn type_name(&self) -> &str {
        "timer"
    }

    fn create(&self, _node_id: &str, _config: &Value) -> Result<Arc<dyn Node>> {
        Ok(Arc::new(TimerNode))
    }
}
