/// runtime
///
/// Drives the step executor of `language::eval` over time. An `Evaluator`
/// owns one run of a program at a time and either plays it to completion
/// or advances it one step at a time. Streams created during a run live as
/// long as the evaluator; producers feed them from other threads through
/// `Recorder`s, and every value the evaluator accepts while playing causes
/// exactly one re-evaluation of the program. Values recorded while the
/// evaluator is stepping, paused or still evaluating are ignored. A stream
/// runs while the program or one of its reactions listens to it.
pub mod config;
pub mod error;
pub mod logging;
pub mod stream;

#[cfg(test)]
mod tests;

use crate::common::*;
use crate::language::context::Context;
use crate::language::eval::{EvalContinuation, Prompt, RunContext, StreamId, Value};
use config::Config;
use error::{StreamError, WrongStateError};
use std::sync::mpsc::{channel, Receiver, Sender};
use stream::{RecordOutcome, Recorder, Stream};

pub trait Logger: Debug {
    fn line_writer(&mut self) -> Option<&mut dyn Write>;
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EvaluatorState {
    /// Nothing evaluated yet.
    Ready,
    /// Evaluating without pausing.
    Running,
    /// Evaluating one step per request.
    Stepping,
    Done,
    Faulted,
}

#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The evaluation has more steps.
    Stepped,
    Done(Value),
    Faulted(Value),
}

/// What runs of a program share: streams, the prior values of reactions and
/// the values the program shared.
#[derive(Debug)]
struct RunState {
    context: Rc<Context>,
    capacity: usize,
    streams: Vec<Stream>,
    by_creator: HashMap<NodeId, StreamId>,
    priors: HashMap<NodeId, Value>,
    /// Subscriptions made by the evaluation in progress.
    listened: HashSet<(StreamId, NodeId)>,
    changed: Option<StreamId>,
    shared: HashMap<String, Value>,
    sender: Sender<(StreamId, Value)>,
    logger: Box<dyn Logger>,
}

impl RunState {
    /// Unsubscribes the reactors the last evaluation did not reach. Streams
    /// left without reactors stop.
    fn ignore_unreached(&mut self) {
        for stream in self.streams.iter_mut() {
            let id = stream.id();
            for reactor in stream.reactors() {
                if !self.listened.contains(&(id, reactor)) && !stream.ignore(reactor) {
                    log!(self.logger, "Stopped stream {:?}", id);
                }
            }
        }
    }

    fn get(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(id.0 as usize)
    }

    fn get_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(id.0 as usize)
    }
}

impl RunContext for RunState {
    fn stream(&mut self, creator: NodeId, name: &str) -> Option<StreamId> {
        let id = match self.by_creator.get(&creator) {
            Some(id) => *id,
            None => {
                let native = self.context.natives().stream(name)?;
                let id = StreamId(self.streams.len() as u32);
                let recorder = Recorder::new(id, self.sender.clone());
                let mut stream =
                    Stream::new(name, creator, native.ty.clone(), native.initial.clone(), self.capacity, recorder);
                if let Some(factory) = &native.producer {
                    stream.set_producer(factory());
                }
                log!(self.logger, "Created stream {} as {:?}", name, id);
                self.streams.push(stream);
                self.by_creator.insert(creator, id);
                id
            },
        };
        // The program itself depends on every stream it references
        self.listen(id, creator);
        Some(id)
    }

    fn latest(&self, stream: StreamId) -> Option<Value> {
        self.get(stream).and_then(|s| s.latest()).cloned()
    }

    fn changed(&self, stream: StreamId) -> bool {
        self.changed == Some(stream)
    }

    fn listen(&mut self, stream: StreamId, reaction: NodeId) {
        self.listened.insert((stream, reaction));
        if let Some(found) = self.get_mut(stream) {
            let was_on = found.is_on();
            found.listen(reaction);
            if !was_on {
                log!(self.logger, "Started stream {:?}", stream);
            }
        }
    }

    fn prior(&self, reaction: NodeId) -> Option<Value> {
        self.priors.get(&reaction).cloned()
    }

    fn remember(&mut self, reaction: NodeId, value: Value) {
        self.priors.insert(reaction, value);
    }

    fn share(&mut self, name: &str, value: Value) {
        self.shared.insert(name.to_string(), value);
    }
}

/// Evaluates a program under play/step control.
#[derive(Debug)]
pub struct Evaluator {
    context: Rc<Context>,
    config: Config,
    state: EvaluatorState,
    playing: bool,
    prompt: Option<Prompt>,
    value: Option<Value>,
    run: RunState,
    receiver: Receiver<(StreamId, Value)>,
    ignored: usize,
    evaluations: usize,
}

impl Evaluator {
    pub fn new(context: Rc<Context>, config: Config, logger: Box<dyn Logger>) -> Self {
        let (sender, receiver) = channel();
        let run = RunState {
            context: context.clone(),
            capacity: config.stream_capacity,
            streams: Vec::new(),
            by_creator: HashMap::new(),
            priors: HashMap::new(),
            listened: HashSet::new(),
            changed: None,
            shared: HashMap::new(),
            sender,
            logger,
        };
        Self {
            context,
            config,
            state: EvaluatorState::Ready,
            playing: true,
            prompt: None,
            value: None,
            run,
            receiver,
            ignored: 0,
            evaluations: 0,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> EvaluatorState {
        self.state
    }

    pub fn is_stepping(&self) -> bool {
        self.state == EvaluatorState::Stepping
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_done(&self) -> bool {
        self.state == EvaluatorState::Done
    }

    pub fn is_faulted(&self) -> bool {
        self.state == EvaluatorState::Faulted
    }

    /// Value of the latest completed evaluation. An exception if it faulted.
    pub fn current_value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Number of evaluations started, re-evaluations included.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Records that arrived while the evaluator could not accept them.
    pub fn ignored_records(&self) -> usize {
        self.ignored
    }

    pub fn shared(&self) -> &HashMap<String, Value> {
        &self.run.shared
    }

    pub fn streams(&self) -> &[Stream] {
        &self.run.streams
    }

    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.run.get(id)
    }

    pub fn stream_named(&self, name: &str) -> Option<&Stream> {
        self.run.streams.iter().find(|s| s.name() == name)
    }

    /// Node of the next step, while an evaluation is in progress.
    pub fn current_node(&self) -> Option<NodeId> {
        self.prompt.as_ref().and_then(|p| p.current_node())
    }

    pub fn depth(&self) -> usize {
        self.prompt.as_ref().map(|p| p.depth()).unwrap_or(0)
    }

    /// Starts the first evaluation. Plays it to the end unless paused.
    pub fn start(&mut self) -> Result<(), WrongStateError> {
        if self.state != EvaluatorState::Ready {
            return Err(WrongStateError);
        }
        log!(self.run.logger, "Starting {}", self.context.source().name);
        self.begin();
        if self.playing {
            self.run_to_end();
        }
        Ok(())
    }

    /// Switches to playing: finishes the evaluation in progress and handles
    /// the records that are waiting.
    pub fn play(&mut self) {
        if !self.playing {
            // Records that arrived while time was frozen
            self.ignore_queued();
        }
        self.playing = true;
        match self.state {
            EvaluatorState::Stepping => {
                self.state = EvaluatorState::Running;
                self.run_to_end();
            },
            EvaluatorState::Ready => {
                let _ = self.start();
            },
            _ => {},
        }
        self.flush();
    }

    /// Switches to stepping. An evaluation in progress waits for `step`.
    /// Records that arrived before the pause are handled first.
    pub fn pause(&mut self) {
        if self.playing {
            self.flush();
        }
        self.playing = false;
        if self.state == EvaluatorState::Running {
            self.state = EvaluatorState::Stepping;
        }
    }

    /// Advances one step, starting an evaluation first when none ran yet.
    pub fn step(&mut self) -> Result<StepOutcome, WrongStateError> {
        match self.state {
            EvaluatorState::Ready => {
                self.playing = false;
                self.ignore_queued();
                log!(self.run.logger, "Stepping into {}", self.context.source().name);
                self.begin();
            },
            EvaluatorState::Stepping => {},
            _ => return Err(WrongStateError),
        }
        Ok(self.advance())
    }

    /// Steps until the current function returns, or the evaluation ends
    /// when stepping at the top level.
    pub fn step_out(&mut self) -> Result<StepOutcome, WrongStateError> {
        let depth = self.depth();
        let mut outcome = self.step()?;
        while matches!(outcome, StepOutcome::Stepped) && (depth <= 1 || self.depth() >= depth) {
            outcome = self.advance();
        }
        Ok(outcome)
    }

    /// Abandons the evaluation in progress, unsubscribes every reaction and
    /// stops the streams nobody listens to anymore.
    pub fn stop(&mut self) {
        for stream in self.run.streams.iter_mut() {
            for reactor in stream.reactors() {
                stream.ignore(reactor);
            }
            stream.stop();
        }
        if self.prompt.take().is_some() {
            self.state = EvaluatorState::Done;
        }
        self.ignore_queued();
        log!(self.run.logger, "Stopped with {} ignored records", self.ignored);
    }

    /// Handle through which a producer records values into `stream`.
    pub fn recorder(&self, stream: StreamId) -> Result<Recorder, StreamError> {
        match self.run.get(stream) {
            Some(_) => Ok(Recorder::new(stream, self.run.sender.clone())),
            None => Err(StreamError::UnknownStream(stream)),
        }
    }

    /// Records a value directly, as a producer on this thread would.
    pub fn record(&mut self, stream: StreamId, value: Value) -> Result<RecordOutcome, StreamError> {
        self.accept(stream, value)
    }

    /// Handles every record producers enqueued since the last flush.
    /// Returns how many were accepted.
    pub fn flush(&mut self) -> usize {
        let mut accepted = 0;
        while let Ok((stream, value)) = self.receiver.try_recv() {
            if let Ok(RecordOutcome::Accepted) = self.accept(stream, value) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Drops every queued record, counting each as ignored.
    fn ignore_queued(&mut self) -> usize {
        let mut count = 0;
        while self.receiver.try_recv().is_ok() {
            count += 1;
        }
        if count > 0 {
            self.ignored += count;
            log!(self.run.logger, "Ignored {} queued records", count);
        }
        count
    }

    fn accept(&mut self, id: StreamId, value: Value) -> Result<RecordOutcome, StreamError> {
        let idle = matches!(self.state, EvaluatorState::Done | EvaluatorState::Faulted);
        let stream = self.run.get_mut(id).ok_or(StreamError::UnknownStream(id))?;
        if !(self.playing && idle) {
            self.ignored += 1;
            log!(self.run.logger, "Ignored record on {:?} while {:?}", id, self.state);
            return Ok(RecordOutcome::Dropped);
        }
        match stream.add(value) {
            RecordOutcome::Accepted => {
                log!(self.run.logger, "Accepted record on {:?}", id);
                self.run.changed = Some(id);
                self.begin();
                self.run_to_end();
                self.run.changed = None;
                Ok(RecordOutcome::Accepted)
            },
            RecordOutcome::Dropped => {
                self.ignored += 1;
                log!(self.run.logger, "Dropped record on stopped {:?}", id);
                Ok(RecordOutcome::Dropped)
            },
        }
    }

    fn begin(&mut self) {
        self.run.listened.clear();
        self.prompt = Some(Prompt::new(&self.context, self.config.step_limit));
        self.evaluations += 1;
        self.state = if self.playing { EvaluatorState::Running } else { EvaluatorState::Stepping };
    }

    fn run_to_end(&mut self) {
        while let StepOutcome::Stepped = self.advance() {}
    }

    fn advance(&mut self) -> StepOutcome {
        let continuation = match self.prompt.as_mut() {
            Some(prompt) => prompt.step(&self.context, &mut self.run),
            None => {
                return match (&self.state, &self.value) {
                    (EvaluatorState::Faulted, Some(value)) => StepOutcome::Faulted(value.clone()),
                    (_, value) => StepOutcome::Done(value.clone().unwrap_or_else(Value::none)),
                }
            },
        };
        match continuation {
            EvalContinuation::Stepping => StepOutcome::Stepped,
            EvalContinuation::Finished(value) => {
                self.prompt = None;
                self.state = EvaluatorState::Done;
                self.run.ignore_unreached();
                self.value = Some(value.clone());
                log!(self.run.logger, "Done with {}", value.to_display_text());
                StepOutcome::Done(value)
            },
            EvalContinuation::Faulted(value) => {
                self.prompt = None;
                self.state = EvaluatorState::Faulted;
                self.value = Some(value.clone());
                log!(self.run.logger, "Faulted: {}", value);
                StepOutcome::Faulted(value)
            },
        }
    }
}
