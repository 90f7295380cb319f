//! End-to-end run of a workflow built purely from builtin node types.

use serde_json::{json, Map};
use std::sync::Arc;
use weft_core::registry::NodeRegistry;
use weft_executor::Engine;

#[tokio::test]
async fn variable_start_timer_collect_pipeline() {
    let registry = Arc::new(NodeRegistry::new());
    weft_nodes::register_builtins(&registry).unwrap();
    let engine = Engine::with_registry(registry);

    engine
        .load_yaml(
            r#"
workflow:
  name: builtin_pipeline
  config:
    stream_timeout: 5
  nodes:
    - id: env
      type: variable
      config:
        base: "https://svc"
    - id: entry
      type: start
      config:
        data:
          url: "{{ base }}/v1"
    - id: beat
      type: timer
      config:
        interval: 30ms
        count: 3
    - id: log
      type: collect
      config:
        global_key: ticks
  connections:
    - from: beat.tick
      to: log.in
"#,
        )
        .unwrap();

    let ctx = engine.start(Map::new()).await.unwrap();

    // The variable node published its config before anything ran, so the
    // start node's templated config resolved against it.
    let entry = ctx.output("entry").unwrap();
    assert_eq!(entry["data"]["url"], json!("https://svc/v1"));
    assert_eq!(entry["source"], json!("config"));

    // Three ticks were collected, in order, and the timer reported them.
    let ticks = ctx.global("ticks").unwrap();
    let ticks = ticks.as_array().unwrap();
    assert_eq!(ticks.len(), 3);
    for (i, tick) in ticks.iter().enumerate() {
        assert_eq!(tick["sequence"], json!(i as i64 + 1));
    }
    assert_eq!(*ctx.output("beat").unwrap(), json!({"ticks": 3}));
}

#[tokio::test]
async fn relay_fans_a_timer_out_to_two_collectors() {
    let registry = Arc::new(NodeRegistry::new());
    weft_nodes::register_builtins(&registry).unwrap();
    let engine = Engine::with_registry(registry);

    engine
        .load_yaml(
            r#"
workflow:
  name: relay_fanout
  config:
    stream_timeout: 0.7
  nodes:
    - id: beat
      type: timer
      config: { interval: 20ms, count: 2 }
    - id: hub
      type: relay
    - id: left
      type: collect
      config: { global_key: left }
    - id: right
      type: collect
      config: { global_key: right }
  connections:
    - from: beat.tick
      to: hub.in
    - from: hub.out
      to: left.in
    - from: hub.out
      to: right.in
"#,
        )
        .unwrap();

    // The relay never closes its own output, so the collectors' consumers
    // stay parked after the last chunk and the invocation winds down
    // through the stream timeout.
    let err = engine.start(Map::new()).await.unwrap_err();
    assert_eq!(err.code(), "E302");

    let ctx = engine.context().unwrap();
    let left = ctx.global("left").unwrap();
    let right = ctx.global("right").unwrap();
    assert_eq!(left.as_array().unwrap().len(), 2);
    assert_eq!(left, right);
}
