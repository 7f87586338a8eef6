use super::error::StreamError;
use crate::collections::DequeSet;
use crate::common::*;
use crate::language::eval::{StreamId, Value};
use crate::language::types::Type;
use std::sync::mpsc::Sender;

/// Source of values for a stream, typically running on its own thread.
/// Producers only ever enqueue through their `Recorder`; the evaluator
/// drains the queue on its own turn.
pub trait StreamProducer: Send {
    fn start(&mut self, recorder: Recorder);
    fn stop(&mut self);
}

/// Thread-safe handle through which a producer records values.
#[derive(Debug, Clone)]
pub struct Recorder {
    stream: StreamId,
    sender: Sender<(StreamId, Value)>,
}

impl Recorder {
    pub(crate) fn new(stream: StreamId, sender: Sender<(StreamId, Value)>) -> Self {
        Self { stream, sender }
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn record(&self, value: Value) -> Result<(), StreamError> {
        self.sender.send((self.stream, value)).map_err(|_| StreamError::EvaluatorGone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Accepted,
    /// The stream is stopped.
    Dropped,
}

/// A time-varying value: the most recent values it received, oldest first,
/// and the reactors listening to it. It starts with its first reactor and
/// stops after its last one leaves.
pub struct Stream {
    pub(crate) id: StreamId,
    pub(crate) name: String,
    /// Node that created the stream.
    pub(crate) creator: NodeId,
    ty: Type,
    values: VecDeque<Value>,
    capacity: usize,
    reactors: DequeSet<NodeId>,
    producer: Option<Box<dyn StreamProducer>>,
    recorder: Recorder,
    on: bool,
}

impl Debug for Stream {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("len", &self.values.len())
            .field("reactors", &self.reactors.len())
            .field("on", &self.on)
            .finish()
    }
}

impl Stream {
    /// A stopped stream holding `initial`. It starts when its first
    /// reactor listens.
    pub fn new(name: &str, creator: NodeId, ty: Type, initial: Value, capacity: usize, recorder: Recorder) -> Self {
        let id = recorder.stream();
        let mut values = VecDeque::with_capacity(capacity.min(64));
        values.push_back(initial);
        Self {
            id,
            name: name.to_string(),
            creator,
            ty,
            values,
            capacity: capacity.max(1),
            reactors: DequeSet::new(),
            producer: None,
            recorder,
            on: false,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &Type {
        &self.ty
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn latest(&self) -> Option<&Value> {
        self.values.back()
    }

    /// Value `offset` records before the latest one, which is at 0. None
    /// past the oldest retained value.
    pub fn at(&self, offset: usize) -> Value {
        offset
            .checked_add(1)
            .and_then(|back| self.values.len().checked_sub(back))
            .and_then(|index| self.values.get(index))
            .cloned()
            .unwrap_or_else(Value::none)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Appends a value, evicting the oldest one at capacity.
    pub fn add(&mut self, value: Value) -> RecordOutcome {
        if !self.on {
            return RecordOutcome::Dropped;
        }
        if self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
        RecordOutcome::Accepted
    }

    /// Subscribes a reactor. The first subscriber starts the stream.
    pub fn listen(&mut self, reactor: NodeId) {
        self.reactors.push_back(reactor);
        self.start();
    }

    /// Unsubscribes a reactor. The stream stops when the last one leaves.
    /// Returns whether any reactor remains.
    pub fn ignore(&mut self, reactor: NodeId) -> bool {
        self.reactors.remove(&reactor);
        if self.reactors.is_empty() {
            self.stop();
            return false;
        }
        true
    }

    pub fn reactors(&self) -> Vec<NodeId> {
        self.reactors.iter().copied().collect()
    }

    pub fn is_listened_to(&self) -> bool {
        !self.reactors.is_empty()
    }

    pub(crate) fn set_producer(&mut self, producer: Box<dyn StreamProducer>) {
        self.producer = Some(producer);
    }

    /// Turns the stream on and starts its producer. Starting a started
    /// stream does nothing.
    pub fn start(&mut self) {
        if self.on {
            return;
        }
        self.on = true;
        let recorder = self.recorder.clone();
        if let Some(producer) = self.producer.as_mut() {
            producer.start(recorder);
        }
    }

    /// Turns the stream off. Stopping a stopped stream does nothing.
    pub fn stop(&mut self) {
        if !self.on {
            return;
        }
        self.on = false;
        if let Some(producer) = self.producer.as_mut() {
            producer.stop();
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.stop();
    }
}
