//! Runtime port instances.
//!
//! A port instance binds a declared schema to per-invocation state: value
//! ports latch a single payload, streaming ports own a bounded FIFO that is
//! allocated lazily during node initialization, before the scheduler
//! launches consumers.

use crate::chunk::StreamEntry;
use crate::schema::{PortKind, PortSchema};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// Input port.
    Input,
    /// Output port.
    Output,
}

/// A latched single-value cell.
///
/// Written by the owning node (outputs) or by scheduler propagation
/// (inputs); a read marks the cell consumed, later re-writes are allowed but
/// the engine never re-propagates them.
#[derive(Debug, Default)]
pub struct ValueCell {
    slot: Mutex<Option<Arc<Value>>>,
    consumed: AtomicBool,
}

impl ValueCell {
    /// Create an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload, replacing any previous one.
    pub fn set(&self, value: Arc<Value>) {
        *self.slot.lock() = Some(value);
    }

    /// Read the payload, marking the cell consumed.
    pub fn get(&self) -> Option<Arc<Value>> {
        let value = self.slot.lock().clone();
        if value.is_some() {
            self.consumed.store(true, Ordering::Release);
        }
        value
    }

    /// Read the payload without marking it consumed.
    pub fn peek(&self) -> Option<Arc<Value>> {
        self.slot.lock().clone()
    }

    /// Check whether a payload has been written.
    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Check whether a downstream read has happened.
    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Acquire)
    }
}

/// The FIFO backing a streaming input port.
///
/// Allocation is lazy: the channel exists only after [`StreamFifo::allocate`]
/// runs, which the engine guarantees happens before any consumer launches.
/// The single receiver is claimed once by the port's consumer task.
#[derive(Debug, Default)]
pub struct StreamFifo {
    sender: Mutex<Option<mpsc::Sender<StreamEntry>>>,
    receiver: Mutex<Option<mpsc::Receiver<StreamEntry>>>,
    closed: AtomicBool,
}

impl StreamFifo {
    /// Create an unallocated FIFO.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the channel with the given high-water mark.
    ///
    /// Idempotent: a second call on an allocated FIFO is a no-op, so
    /// repeated initialization never drops queued entries.
    pub fn allocate(&self, capacity: usize) {
        let mut sender = self.sender.lock();
        if sender.is_none() {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            *sender = Some(tx);
            *self.receiver.lock() = Some(rx);
            self.closed.store(false, Ordering::Release);
        }
    }

    /// Check whether the channel has been allocated.
    pub fn is_allocated(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Clone the producer handle, if allocated.
    pub fn sender(&self) -> Option<mpsc::Sender<StreamEntry>> {
        self.sender.lock().clone()
    }

    /// Claim the single consumer handle. Returns `None` on the second call.
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<StreamEntry>> {
        self.receiver.lock().take()
    }

    /// Mark end-of-stream observed on the producing side.
    ///
    /// Returns `false` if the FIFO was already closed: at most one EOS may
    /// enter a stream, nothing may be enqueued after it.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Check whether end-of-stream has been enqueued.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Per-kind state of an input port.
#[derive(Debug)]
pub enum InputState {
    /// Latched cell for value ports.
    Value(ValueCell),
    /// FIFO for streaming ports.
    Stream(StreamFifo),
}

/// Runtime state of an input port on a specific node.
#[derive(Debug)]
pub struct InputPort {
    name: String,
    schema: PortSchema,
    state: InputState,
}

impl InputPort {
    /// Create an input port instance from its declaration.
    pub fn new(name: impl Into<String>, schema: PortSchema) -> Self {
        let state = match schema.kind {
            PortKind::Value => InputState::Value(ValueCell::new()),
            PortKind::Streaming => InputState::Stream(StreamFifo::new()),
        };
        Self {
            name: name.into(),
            schema,
            state,
        }
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared schema. Never changes after declaration.
    pub fn schema(&self) -> &PortSchema {
        &self.schema
    }

    /// Check whether this port carries streams.
    pub fn is_streaming(&self) -> bool {
        self.schema.is_streaming()
    }

    /// The latched cell, for value ports.
    pub fn cell(&self) -> Option<&ValueCell> {
        match &self.state {
            InputState::Value(cell) => Some(cell),
            InputState::Stream(_) => None,
        }
    }

    /// The FIFO, for streaming ports.
    pub fn fifo(&self) -> Option<&StreamFifo> {
        match &self.state {
            InputState::Stream(fifo) => Some(fifo),
            InputState::Value(_) => None,
        }
    }
}

/// Per-kind state of an output port.
#[derive(Debug)]
pub enum OutputState {
    /// Latched cell for value ports.
    Value(ValueCell),
    /// Streaming outputs hold no local queue — chunks route straight to
    /// downstream FIFOs — only the closed flag.
    Stream { closed: AtomicBool },
}

/// Runtime state of an output port on a specific node.
#[derive(Debug)]
pub struct OutputPort {
    name: String,
    schema: PortSchema,
    state: OutputState,
}

impl OutputPort {
    /// Create an output port instance from its declaration.
    pub fn new(name: impl Into<String>, schema: PortSchema) -> Self {
        let state = match schema.kind {
            PortKind::Value => OutputState::Value(ValueCell::new()),
            PortKind::Streaming => OutputState::Stream {
                closed: AtomicBool::new(false),
            },
        };
        Self {
            name: name.into(),
            schema,
            state,
        }
    }

    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared schema. Never changes after declaration.
    pub fn schema(&self) -> &PortSchema {
        &self.schema
    }

    /// Check whether this port carries streams.
    pub fn is_streaming(&self) -> bool {
        self.schema.is_streaming()
    }

    /// The latched cell, for value ports.
    pub fn cell(&self) -> Option<&ValueCell> {
        match &self.state {
            OutputState::Value(cell) => Some(cell),
            OutputState::Stream { .. } => None,
        }
    }

    /// Mark the stream closed. Returns `false` if it already was.
    pub fn close_stream(&self) -> bool {
        match &self.state {
            OutputState::Stream { closed } => !closed.swap(true, Ordering::AcqRel),
            OutputState::Value(_) => false,
        }
    }

    /// Check whether the stream has been closed.
    pub fn is_stream_closed(&self) -> bool {
        match &self.state {
            OutputState::Stream { closed } => closed.load(Ordering::Acquire),
            OutputState::Value(_) => false,
        }
    }
}
