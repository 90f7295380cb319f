//! The workflow engine: loading, validation, and hybrid execution.
//!
//! One engine owns a loaded workflow and runs it to completion per
//! invocation. Execution is hybrid: task-driven nodes (`sequential` and
//! `hybrid`) are walked in a value-edge topological order, while streaming
//! nodes and per-port consumer tasks run as long-lived cooperative tasks
//! that react to chunks. After the walk, the scheduler supervises the
//! outstanding tasks under the configured stream timeout and shuts
//! everything down — no task from an invocation survives `start` returning.

use crate::graph::ValueGraph;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use weft_core::chunk::StreamEntry;
use weft_core::connection::{Connection, ConnectionManager, EdgeKind, Endpoint};
use weft_core::context::WorkflowContext;
use weft_core::error::{Result, WeftError};
use weft_core::flow::{WorkflowConfig, WorkflowDefinition, WorkflowDocument};
use weft_core::instance::NodeInstance;
use weft_core::logging::LogLevel;
use weft_core::registry::{self, NodeFactory, NodeRegistry};
use weft_core::template::TemplateResolver;
use weft_core::traits::{ExecutionMode, NodeContext, NodeStatus};

/// A workflow after `load`: instantiated nodes, wired edges, and the
/// precomputed task-driven order.
struct LoadedWorkflow {
    definition: WorkflowDefinition,
    nodes: HashMap<String, Arc<NodeInstance>>,
    /// Node ids in declaration order.
    order: Vec<String>,
    /// Task-driven ids in topological (value-edge) order.
    topo: Vec<String>,
    connections: Arc<ConnectionManager>,
}

impl LoadedWorkflow {
    fn node(&self, id: &str) -> Option<&Arc<NodeInstance>> {
        self.nodes.get(id)
    }
}

/// Identifies a spawned background task for diagnostics and cancellation.
enum TaskKind {
    /// A `run` task for a streaming or hybrid node.
    Runner(String),
    /// A per-port consumer task `C(node, port)`.
    Consumer(String, String),
}

impl TaskKind {
    fn node_id(&self) -> &str {
        match self {
            Self::Runner(id) => id,
            Self::Consumer(id, _) => id,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runner(id) => write!(f, "runner '{id}'"),
            Self::Consumer(id, port) => write!(f, "consumer '{id}.{port}'"),
        }
    }
}

type TaskHandle = (TaskKind, JoinHandle<Result<()>>);
type FaultSlot = Arc<Mutex<Option<WeftError>>>;

fn record_fault(fault: &FaultSlot, node_id: &str, cause: &str) {
    let mut slot = fault.lock();
    if slot.is_none() {
        *slot = Some(WeftError::NodeExecution {
            node_id: node_id.to_string(),
            cause: cause.to_string(),
        });
    }
}

fn take_fault(fault: &FaultSlot) -> Option<WeftError> {
    fault.lock().take()
}

/// Snapshot of engine and per-node state.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Whether an invocation is in flight.
    pub running: bool,
    /// Name of the loaded workflow, if any.
    pub workflow: Option<String>,
    /// Per-node reports, in declaration order.
    pub nodes: Vec<NodeReport>,
}

/// One node's status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    /// Node id.
    pub id: String,
    /// Registered type name.
    pub type_name: String,
    /// Declared execution mode.
    pub mode: ExecutionMode,
    /// Current lifecycle status.
    pub status: NodeStatus,
}

/// The workflow engine.
pub struct Engine {
    registry: Arc<NodeRegistry>,
    loaded: RwLock<Option<Arc<LoadedWorkflow>>>,
    context: RwLock<Option<Arc<WorkflowContext>>>,
    running: AtomicBool,
}

impl Engine {
    /// Create an engine with its own empty registry. Types registered on
    /// the process-global registry remain visible as a fallback.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(NodeRegistry::new()))
    }

    /// Create an engine over an existing registry.
    pub fn with_registry(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            loaded: RwLock::new(None),
            context: RwLock::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Register a node type factory on this engine.
    pub fn register_type<F: NodeFactory>(&self, factory: F) -> Result<()> {
        self.registry.register(factory)
    }

    /// This engine's registry.
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// The context of the current (or last) invocation.
    pub fn context(&self) -> Option<Arc<WorkflowContext>> {
        self.context.read().clone()
    }

    /// Load a workflow description: instantiate nodes, build and validate
    /// the connection graph, and precompute the task-driven order. Every
    /// configuration error is fatal here.
    pub fn load(&self, definition: WorkflowDefinition) -> Result<()> {
        definition.validate()?;

        let mut nodes: HashMap<String, Arc<NodeInstance>> = HashMap::new();
        let mut order = Vec::with_capacity(definition.nodes.len());
        for spec in &definition.nodes {
            let behavior = if self.registry.contains(&spec.type_name) {
                self.registry.create(&spec.type_name, &spec.id, &spec.config)?
            } else {
                registry::global().create(&spec.type_name, &spec.id, &spec.config)?
            };
            let node = Arc::new(NodeInstance::new(
                &spec.id,
                spec.name.clone(),
                spec.config.clone(),
                behavior,
            ));
            order.push(spec.id.clone());
            nodes.insert(spec.id.clone(), node);
        }

        let mut connections = ConnectionManager::new();
        for edge in &definition.connections {
            let (src_node, src_port) = edge.source()?;
            let (dst_node, dst_port) = edge.target()?;

            let source = nodes.get(src_node).ok_or_else(|| WeftError::UnknownEndpoint {
                node_id: src_node.to_string(),
                port: src_port.to_string(),
                cause: "unknown source node".to_string(),
            })?;
            let target = nodes.get(dst_node).ok_or_else(|| WeftError::UnknownEndpoint {
                node_id: dst_node.to_string(),
                port: dst_port.to_string(),
                cause: "unknown target node".to_string(),
            })?;
            let source_schema = source
                .output(src_port)
                .map(|p| p.schema().clone())
                .ok_or_else(|| WeftError::UnknownEndpoint {
                    node_id: src_node.to_string(),
                    port: src_port.to_string(),
                    cause: "no such output port".to_string(),
                })?;
            let target_schema = target
                .input(dst_port)
                .map(|p| p.schema().clone())
                .ok_or_else(|| WeftError::UnknownEndpoint {
                    node_id: dst_node.to_string(),
                    port: dst_port.to_string(),
                    cause: "no such input port".to_string(),
                })?;

            connections.add(Connection::new(
                Endpoint::new(src_node, src_port),
                Endpoint::new(dst_node, dst_port),
                source_schema,
                target_schema,
            )?);
        }

        // Task-driven order: value edges restricted to task-driven endpoints.
        // Streaming edges contribute zero ordering constraints.
        let task_ids: Vec<String> = order
            .iter()
            .filter(|id| {
                nodes
                    .get(id.as_str())
                    .map(|n| n.mode().is_task_driven())
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        let task_set: HashSet<&str> = task_ids.iter().map(|s| s.as_str()).collect();
        let value_edges: Vec<(String, String)> = connections
            .value_edges()
            .filter(|c| {
                task_set.contains(c.source.node.as_str()) && task_set.contains(c.target.node.as_str())
            })
            .map(|c| (c.source.node.clone(), c.target.node.clone()))
            .collect();
        let topo = ValueGraph::new(task_ids, &value_edges).order()?;

        *self.loaded.write() = Some(Arc::new(LoadedWorkflow {
            definition,
            nodes,
            order,
            topo,
            connections: Arc::new(connections),
        }));
        Ok(())
    }

    /// Load a workflow from YAML text.
    pub fn load_yaml(&self, text: &str) -> Result<()> {
        self.load(WorkflowDocument::from_yaml(text)?.workflow)
    }

    /// Run the loaded workflow once to completion.
    ///
    /// Launches consumers and streaming runners, walks the task-driven
    /// nodes in topological order, then awaits outstanding tasks under the
    /// stream timeout. When this returns, no task from the invocation is
    /// still running.
    pub async fn start(&self, initial_globals: Map<String, Value>) -> Result<Arc<WorkflowContext>> {
        let loaded = self.loaded.read().clone().ok_or_else(|| WeftError::State {
            cause: "no workflow loaded".to_string(),
        })?;
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(WeftError::State {
                cause: "workflow already running".to_string(),
            });
        }
        let result = self.run_invocation(&loaded, initial_globals).await;
        self.running.store(false, Ordering::Release);
        result
    }

    async fn run_invocation(
        &self,
        wf: &Arc<LoadedWorkflow>,
        initial_globals: Map<String, Value>,
    ) -> Result<Arc<WorkflowContext>> {
        let ctx = Arc::new(WorkflowContext::new());
        for (key, value) in initial_globals {
            ctx.set_global(&key, value);
        }
        *self.context.write() = Some(Arc::clone(&ctx));

        let cfg = wf.definition.config.clone();
        ctx.log_info(format!("starting workflow '{}'", wf.definition.name));

        // Allocate streaming FIFOs and bind every destination port as a
        // sink, before any consumer launches.
        for id in &wf.order {
            let Some(node) = wf.node(id) else { continue };
            node.allocate_fifos(cfg.stream_buffer);
            for port in node.streaming_input_names() {
                if let Some(sender) = node.input_sender(&port) {
                    wf.connections.bind_sink(Endpoint::new(id.clone(), port), sender);
                }
            }
        }

        // Initialization hooks, in declaration order.
        for id in &wf.order {
            let Some(node) = wf.node(id) else { continue };
            let behavior = Arc::clone(node.behavior());
            let nctx = self.node_context(wf, node, &ctx);
            if let Err(e) = behavior.initialize(nctx).await {
                ctx.log_node(LogLevel::Error, id, format!("initialization failed: {e}"));
                self.finish(wf, &ctx).await;
                return Err(e.for_node(id));
            }
        }

        let fault: FaultSlot = Arc::new(Mutex::new(None));
        let mut handles: Vec<TaskHandle> = Vec::new();

        // Runners for data-driven nodes.
        for id in &wf.order {
            let Some(node) = wf.node(id) else { continue };
            if node.mode() != ExecutionMode::Streaming {
                continue;
            }
            self.resolve_config(node, &ctx);
            let handle = self.spawn_runner(wf, node, &ctx, &fault, cfg.continue_on_error);
            handles.push((TaskKind::Runner(id.clone()), handle));
        }

        // One consumer task per streaming input port, for nodes of every mode.
        for id in &wf.order {
            let Some(node) = wf.node(id) else { continue };
            for port in node.streaming_input_names() {
                let Some(rx) = node.take_receiver(&port) else {
                    continue;
                };
                let handle =
                    self.spawn_consumer(wf, node, port.clone(), rx, &ctx, &fault, cfg.continue_on_error);
                handles.push((TaskKind::Consumer(id.clone(), port), handle));
            }
        }

        // Task-driven walk.
        if let Err(e) = self.walk(wf, &ctx, &cfg, &fault, &mut handles).await {
            self.cooperative_close(wf);
            abort_tasks(&mut handles, wf, &ctx).await;
            self.finish(wf, &ctx).await;
            return Err(e);
        }

        // Termination: drain outstanding tasks under the stream timeout.
        let outcome = self.await_outstanding(wf, &ctx, &cfg, handles, &fault).await;
        self.finish(wf, &ctx).await;
        match outcome {
            Ok(()) => {
                ctx.log_success(format!("workflow '{}' complete", wf.definition.name));
                Ok(ctx)
            }
            Err(e) => Err(e),
        }
    }

    /// Walk task-driven nodes in topological order: render config, run,
    /// propagate value outputs.
    async fn walk(
        &self,
        wf: &Arc<LoadedWorkflow>,
        ctx: &Arc<WorkflowContext>,
        cfg: &WorkflowConfig,
        fault: &FaultSlot,
        handles: &mut Vec<TaskHandle>,
    ) -> Result<()> {
        let deadline = tokio::time::Instant::now() + cfg.stream_timeout();
        for id in &wf.topo {
            if !cfg.continue_on_error {
                if let Some(err) = take_fault(fault) {
                    return Err(err);
                }
            }
            let Some(node) = wf.node(id) else { continue };
            self.resolve_config(node, ctx);
            node.set_status(NodeStatus::Running);
            ctx.log_node(LogLevel::Info, id, format!("executing [{}]", node.mode()));

            match node.mode() {
                ExecutionMode::Sequential => {
                    let behavior = Arc::clone(node.behavior());
                    let nctx = self.node_context(wf, node, ctx);
                    match behavior.run(nctx).await {
                        Ok(value) => {
                            node.set_status(NodeStatus::Succeeded);
                            if !value.is_null() {
                                ctx.set_output(id.clone(), Arc::new(value));
                            }
                            self.propagate_values(wf, node, ctx, cfg)?;
                            ctx.log_node(LogLevel::Success, id, "node complete");
                        }
                        Err(e) => {
                            node.set_status(NodeStatus::Failed);
                            ctx.log_node(LogLevel::Error, id, format!("run failed: {e}"));
                            if !cfg.continue_on_error {
                                return Err(e.for_node(id));
                            }
                            ctx.log_node(LogLevel::Warning, id, "continuing after failure");
                        }
                    }
                }
                ExecutionMode::Hybrid => {
                    let has_value_outputs = node
                        .descriptor()
                        .outputs
                        .iter()
                        .any(|d| !d.schema.is_streaming());
                    let mut runner =
                        self.spawn_runner(wf, node, ctx, fault, cfg.continue_on_error);
                    let mut finished = false;

                    if has_value_outputs {
                        // Ready once every declared value output is written,
                        // or as soon as `run` returns — whichever happens
                        // first. The stream timeout bounds the wait so a
                        // node that never signals cannot stall the walk.
                        loop {
                            let mut notified = std::pin::pin!(node.value_ready().notified());
                            notified.as_mut().enable();
                            if node.value_outputs_ready() {
                                break;
                            }
                            tokio::select! {
                                outcome = tokio::time::timeout_at(deadline, &mut runner) => {
                                    match outcome {
                                        Ok(join_res) => {
                                            finished = true;
                                            let kind = TaskKind::Runner(id.clone());
                                            if let Err(e) = flatten_join(join_res, &kind) {
                                                if !cfg.continue_on_error {
                                                    return Err(e);
                                                }
                                                ctx.log_node(
                                                    LogLevel::Warning,
                                                    id,
                                                    "continuing after failure",
                                                );
                                            }
                                            break;
                                        }
                                        Err(_elapsed) => {
                                            runner.abort();
                                            let _ = (&mut runner).await;
                                            node.set_status(NodeStatus::Cancelled);
                                            return Err(WeftError::Timeout {
                                                timeout_secs: cfg.stream_timeout.max(0.0),
                                                outstanding: 1,
                                            });
                                        }
                                    }
                                }
                                _ = notified.as_mut() => {}
                            }
                        }
                    }

                    if !finished {
                        handles.push((TaskKind::Runner(id.clone()), runner));
                    }
                    if node.status() != NodeStatus::Failed {
                        self.propagate_values(wf, node, ctx, cfg)?;
                    }
                }
                // Streaming nodes never enter the topological order.
                ExecutionMode::Streaming => {}
            }
        }
        Ok(())
    }

    /// Propagate every non-null value output along its value edges. The
    /// destination cell receives the same shared payload, never a copy.
    /// Fan-in is last-writer-wins in topological order.
    fn propagate_values(
        &self,
        wf: &LoadedWorkflow,
        node: &Arc<NodeInstance>,
        ctx: &Arc<WorkflowContext>,
        cfg: &WorkflowConfig,
    ) -> Result<()> {
        for decl in &node.descriptor().outputs {
            if decl.schema.is_streaming() {
                continue;
            }
            let Some(value) = node.output_value(&decl.name) else {
                continue;
            };
            let source = Endpoint::new(node.id().to_string(), decl.name.clone());
            for conn in wf.connections.edges_from(&source) {
                if conn.kind != EdgeKind::Value {
                    continue;
                }
                let Some(target) = wf.node(&conn.target.node) else {
                    continue;
                };
                if let Err(e) = target.set_input_value(&conn.target.port, Arc::clone(&value)) {
                    ctx.log_node(
                        LogLevel::Error,
                        node.id(),
                        format!("propagation to {} failed: {e}", conn.target),
                    );
                    if !cfg.continue_on_error {
                        return Err(e.for_node(node.id()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Await every outstanding background task, bounded by the stream
    /// timeout. On timeout: cooperative EOS to all streaming inputs, then
    /// cancellation with acknowledgment.
    async fn await_outstanding(
        &self,
        wf: &Arc<LoadedWorkflow>,
        ctx: &Arc<WorkflowContext>,
        cfg: &WorkflowConfig,
        mut handles: Vec<TaskHandle>,
        fault: &FaultSlot,
    ) -> Result<()> {
        if handles.is_empty() {
            return match take_fault(fault) {
                Some(err) if !cfg.continue_on_error => Err(err),
                _ => Ok(()),
            };
        }

        ctx.log_info(format!(
            "waiting up to {:.1}s for {} outstanding task(s)",
            cfg.stream_timeout.max(0.0),
            handles.len()
        ));
        let deadline = tokio::time::Instant::now() + cfg.stream_timeout();
        let mut first_error: Option<WeftError> = None;

        while !handles.is_empty() {
            if !cfg.continue_on_error {
                if let Some(err) = take_fault(fault).or_else(|| first_error.take()) {
                    self.cooperative_close(wf);
                    abort_tasks(&mut handles, wf, ctx).await;
                    return Err(err);
                }
            }

            let (kind, mut handle) = handles.remove(0);
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(join_res) => {
                    if let Err(e) = flatten_join(join_res, &kind) {
                        if cfg.continue_on_error {
                            ctx.log_warning(format!("background task failed: {e}"));
                        } else {
                            first_error = Some(e);
                        }
                    }
                }
                Err(_elapsed) => {
                    let outstanding = handles.len() + 1;
                    ctx.log_warning(format!(
                        "stream timeout after {:.1}s; cancelling {} task(s)",
                        cfg.stream_timeout.max(0.0),
                        outstanding
                    ));
                    self.cooperative_close(wf);
                    handles.insert(0, (kind, handle));
                    abort_tasks(&mut handles, wf, ctx).await;
                    return Err(WeftError::Timeout {
                        timeout_secs: cfg.stream_timeout.max(0.0),
                        outstanding,
                    });
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        match take_fault(fault) {
            Some(err) if !cfg.continue_on_error => Err(err),
            _ => Ok(()),
        }
    }

    /// Spawn a `run` task for a streaming or hybrid node.
    fn spawn_runner(
        &self,
        wf: &Arc<LoadedWorkflow>,
        node: &Arc<NodeInstance>,
        ctx: &Arc<WorkflowContext>,
        fault: &FaultSlot,
        continue_on_error: bool,
    ) -> JoinHandle<Result<()>> {
        let node = Arc::clone(node);
        let nctx = self.node_context(wf, &node, ctx);
        let ctx = Arc::clone(ctx);
        let fault = Arc::clone(fault);
        tokio::spawn(async move {
            node.set_status(NodeStatus::Running);
            let behavior = Arc::clone(node.behavior());
            match behavior.run(nctx).await {
                Ok(value) => {
                    node.set_status(NodeStatus::Succeeded);
                    if !value.is_null() {
                        ctx.set_output(node.id().to_string(), Arc::new(value));
                    }
                    Ok(())
                }
                Err(e) => {
                    let cause = e.to_string();
                    node.set_status(NodeStatus::Failed);
                    ctx.log_node(LogLevel::Error, node.id(), format!("run failed: {cause}"));
                    if !continue_on_error {
                        record_fault(&fault, node.id(), &cause);
                    }
                    Err(e.for_node(node.id()))
                }
            }
        })
    }

    /// Spawn the consumer task `C(node, port)` for one streaming input.
    fn spawn_consumer(
        &self,
        wf: &Arc<LoadedWorkflow>,
        node: &Arc<NodeInstance>,
        port: String,
        mut rx: tokio::sync::mpsc::Receiver<StreamEntry>,
        ctx: &Arc<WorkflowContext>,
        fault: &FaultSlot,
        continue_on_error: bool,
    ) -> JoinHandle<Result<()>> {
        let node = Arc::clone(node);
        let nctx = self.node_context(wf, &node, ctx);
        let ctx = Arc::clone(ctx);
        let fault = Arc::clone(fault);
        tokio::spawn(async move {
            let behavior = Arc::clone(node.behavior());
            loop {
                let entry = match rx.recv().await {
                    Some(entry) => entry,
                    None => break,
                };
                let chunk = match entry {
                    StreamEntry::End => break,
                    StreamEntry::Chunk(chunk) => chunk,
                };
                if let Err(e) = behavior.on_chunk(nctx.clone(), &port, chunk).await {
                    let cause = e.to_string();
                    ctx.log_node(
                        LogLevel::Error,
                        node.id(),
                        format!("chunk handler failed on '{port}': {cause}"),
                    );
                    if continue_on_error {
                        // Per-chunk isolation: keep consuming.
                        continue;
                    }
                    node.set_status(NodeStatus::Failed);
                    record_fault(&fault, node.id(), &cause);
                    return Err(e.for_node(node.id()));
                }
            }
            tracing::debug!(node_id = %node.id(), port = %port, "consumer drained");
            Ok(())
        })
    }

    /// Render a node's configuration against the current context. A render
    /// failure falls back to the raw configuration with a warning.
    fn resolve_config(&self, node: &Arc<NodeInstance>, ctx: &Arc<WorkflowContext>) {
        let resolver = TemplateResolver::new(ctx);
        match resolver.resolve(node.raw_config()) {
            Ok(config) => node.set_resolved_config(config),
            Err(e) => {
                ctx.log_node(
                    LogLevel::Warning,
                    node.id(),
                    format!("config resolution failed, using raw config: {e}"),
                );
                node.set_resolved_config(node.raw_config().clone());
            }
        }
    }

    fn node_context(
        &self,
        wf: &Arc<LoadedWorkflow>,
        node: &Arc<NodeInstance>,
        ctx: &Arc<WorkflowContext>,
    ) -> NodeContext {
        NodeContext::new(
            Arc::clone(node),
            Arc::clone(&wf.connections),
            Arc::clone(ctx),
        )
    }

    /// Enqueue EOS on every streaming input that is still open (the clean
    /// shutdown path). Queues that are full are skipped — their tasks get
    /// aborted right after.
    fn cooperative_close(&self, wf: &LoadedWorkflow) {
        for node in wf.nodes.values() {
            for port in node.streaming_input_names() {
                let Some(fifo) = node.input(&port).and_then(|p| p.fifo()) else {
                    continue;
                };
                if !fifo.is_allocated() || !fifo.close() {
                    continue;
                }
                if let Some(sender) = fifo.sender() {
                    let _ = sender.try_send(StreamEntry::End);
                }
            }
        }
    }

    /// Shutdown hooks plus sink teardown, in declaration order.
    async fn finish(&self, wf: &LoadedWorkflow, ctx: &Arc<WorkflowContext>) {
        for id in &wf.order {
            let Some(node) = wf.node(id) else { continue };
            let behavior = Arc::clone(node.behavior());
            if let Err(e) = behavior.shutdown().await {
                ctx.log_node(LogLevel::Warning, id, format!("shutdown failed: {e}"));
            }
        }
        wf.connections.clear_sinks();
    }

    /// External producer contract: enqueue a payload on a node's streaming
    /// input. Awaits FIFO space under back-pressure.
    pub async fn feed(&self, node_id: &str, port: &str, payload: Value) -> Result<()> {
        let node = self.find_node(node_id, port)?;
        node.feed(port, payload).await
    }

    /// External producer contract: close a node's streaming input.
    pub async fn close_input(&self, node_id: &str, port: &str) -> Result<()> {
        let node = self.find_node(node_id, port)?;
        node.close_input(port).await
    }

    /// Render a template string against the current invocation's context.
    pub fn render(&self, template: &str) -> Result<String> {
        let ctx = self.context.read().clone().ok_or_else(|| WeftError::State {
            cause: "workflow not started".to_string(),
        })?;
        TemplateResolver::new(&ctx).render(template)
    }

    /// Request a clean stop: EOS on every open streaming input. Consumers
    /// drain and the running invocation winds down through its normal
    /// termination path.
    pub fn stop(&self) {
        if let Some(wf) = self.loaded.read().clone() {
            self.cooperative_close(&wf);
        }
    }

    /// Snapshot engine and node states.
    pub fn status(&self) -> EngineStatus {
        let loaded = self.loaded.read().clone();
        let (workflow, nodes) = match &loaded {
            Some(wf) => (
                Some(wf.definition.name.clone()),
                wf.order
                    .iter()
                    .filter_map(|id| wf.node(id))
                    .map(|n| NodeReport {
                        id: n.id().to_string(),
                        type_name: n.type_name().to_string(),
                        mode: n.mode(),
                        status: n.status(),
                    })
                    .collect(),
            ),
            None => (None, Vec::new()),
        };
        EngineStatus {
            running: self.running.load(Ordering::Acquire),
            workflow,
            nodes,
        }
    }

    fn find_node(&self, node_id: &str, port: &str) -> Result<Arc<NodeInstance>> {
        let loaded = self.loaded.read();
        loaded
            .as_ref()
            .and_then(|wf| wf.node(node_id))
            .cloned()
            .ok_or_else(|| WeftError::UnknownEndpoint {
                node_id: node_id.to_string(),
                port: port.to_string(),
                cause: "unknown node".to_string(),
            })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel every remaining task and await its acknowledgment. Runner nodes
/// still in flight are marked cancelled.
async fn abort_tasks(
    handles: &mut Vec<TaskHandle>,
    wf: &LoadedWorkflow,
    ctx: &Arc<WorkflowContext>,
) {
    for (kind, handle) in handles.drain(..) {
        let was_running = !handle.is_finished();
        handle.abort();
        let _ = handle.await;
        if was_running {
            if let TaskKind::Runner(id) = &kind {
                if let Some(node) = wf.node(id) {
                    if node.set_status(NodeStatus::Cancelled) {
                        ctx.log_node(LogLevel::Warning, id, "cancelled");
                    }
                }
            }
            tracing::debug!(task = %kind, "task cancelled");
        }
    }
}

/// Collapse a join result into the task's own result.
fn flatten_join(
    join_res: std::result::Result<Result<()>, tokio::task::JoinError>,
    kind: &TaskKind,
) -> Result<()> {
    match join_res {
        Ok(inner) => inner,
        Err(join) if join.is_cancelled() => Err(WeftError::Cancelled {
            node_id: Some(kind.node_id().to_string()),
        }),
        Err(_) => Err(WeftError::NodeExecution {
            node_id: kind.node_id().to_string(),
            cause: "task panicked".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::flow::{EdgeSpec, NodeSpec};
    use weft_core::schema::{AtomType, PortSchema};
    use weft_core::traits::{Node, NodeDescriptor, NodeFuture};

    struct Pass;

    impl Node for Pass {
        fn descriptor(&self) -> NodeDescriptor {
            NodeDescriptor::new("pass")
                .with_input("in", PortSchema::value(AtomType::Any))
                .with_output("out", PortSchema::value(AtomType::Any))
        }

        fn run<'a>(&'a self, _ctx: NodeContext) -> NodeFuture<'a> {
            Box::pin(async { Ok(Value::Null) })
        }
    }

    struct PassFactory;

    impl NodeFactory for PassFactory {
        fn type_name(&self) -> &str {
            "pass"
        }

        fn create(&self, _node_id: &str, _config: &Value) -> Result<Arc<dyn weft_core::traits::Node>> {
            Ok(Arc::new(Pass))
        }
    }

    fn engine() -> Engine {
        let engine = Engine::new();
        engine.register_type(PassFactory).unwrap();
        engine
    }

    #[test]
    fn load_rejects_unknown_types() {
        let engine = engine();
        let wf = WorkflowDefinition::new("w").with_node(NodeSpec::new("a", "ghost"));
        let err = engine.load(wf).unwrap_err();
        assert_eq!(err.code(), "E102");
    }

    #[test]
    fn load_rejects_unknown_endpoints() {
        let engine = engine();
        let wf = WorkflowDefinition::new("w")
            .with_node(NodeSpec::new("a", "pass"))
            .with_node(NodeSpec::new("b", "pass"))
            .with_connection(EdgeSpec::new("a.nope", "b.in"));
        let err = engine.load(wf).unwrap_err();
        assert_eq!(err.code(), "E104");
    }

    #[test]
    fn load_precomputes_topological_order() {
        let engine = engine();
        let wf = WorkflowDefinition::new("w")
            .with_node(NodeSpec::new("b", "pass"))
            .with_node(NodeSpec::new("a", "pass"))
            .with_connection(EdgeSpec::new("a.out", "b.in"));
        engine.load(wf).unwrap();
        let loaded = engine.loaded.read().clone().unwrap();
        assert_eq!(loaded.topo, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn rebuilding_the_graph_is_deterministic() {
        let definition = || {
            WorkflowDefinition::new("w")
                .with_node(NodeSpec::new("a", "pass"))
                .with_node(NodeSpec::new("b", "pass"))
                .with_node(NodeSpec::new("c", "pass"))
                .with_connection(EdgeSpec::new("a.out", "b.in"))
                .with_connection(EdgeSpec::new("b.out", "c.in"))
        };

        let render = |engine: &Engine| -> (Vec<String>, Vec<String>) {
            let loaded = engine.loaded.read().clone().unwrap();
            let streaming = loaded
                .connections
                .streaming_edges()
                .map(|c| c.to_string())
                .collect();
            let value = loaded
                .connections
                .value_edges()
                .map(|c| c.to_string())
                .collect();
            (streaming, value)
        };

        let first = engine();
        first.load(definition()).unwrap();
        let second = engine();
        second.load(definition()).unwrap();
        assert_eq!(render(&first), render(&second));
    }

    #[tokio::test]
    async fn start_without_load_is_a_state_error() {
        let engine = engine();
        let err = engine.start(Map::new()).await.unwrap_err();
        assert_eq!(err.code(), "E306");
    }

    #[test]
    fn render_requires_a_started_workflow() {
        let engine = engine();
        let err = engine.render("{{ x }}").unwrap_err();
        assert_eq!(err.code(), "E306");
    }
}
