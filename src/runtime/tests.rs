use super::logging::{DummyLogger, VecLogger};
use super::stream::{RecordOutcome, Recorder, Stream, StreamProducer};
use super::*;
use crate::language::context::Shares;
use crate::language::eval::{ExceptionKind, NativeRegistry};
use crate::language::types::Type;
use crate::parse;
use crossbeam_utils::thread::scope;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};

lazy_static::lazy_static! {
    static ref TICKING: Arc<NativeRegistry> = {
        let mut natives = NativeRegistry::with_defaults();
        natives.register_stream("Tick", Type::number(), Value::number(0.), None);
        Arc::new(natives)
    };
}

fn evaluator_with(code: &str, natives: Arc<NativeRegistry>, config: Config) -> Evaluator {
    let context = Context::new(Rc::new(parse(code)), Shares::new(), natives);
    Evaluator::new(Rc::new(context), config, Box::new(DummyLogger))
}

fn evaluator(code: &str) -> Evaluator {
    evaluator_with(code, TICKING.clone(), Config::default())
}

fn number(evaluator: &Evaluator) -> Option<f64> {
    evaluator.current_value().and_then(|v| v.as_number())
}

fn tick(evaluator: &Evaluator) -> StreamId {
    evaluator.stream_named("Tick").map(|s| s.id()).unwrap()
}

/// Records `count` values on the calling thread as soon as it starts and
/// notes when it is stopped.
struct Burst {
    count: usize,
    stopped: Arc<AtomicBool>,
}

impl StreamProducer for Burst {
    fn start(&mut self, recorder: Recorder) {
        for i in 0..self.count {
            recorder.record(Value::number(i as f64 + 1.)).unwrap();
        }
    }
    fn stop(&mut self) {
        self.stopped.store(true, SeqCst);
    }
}

fn bursting(count: usize, stopped: Arc<AtomicBool>) -> Arc<NativeRegistry> {
    let mut natives = NativeRegistry::with_defaults();
    natives.register_stream(
        "Tick",
        Type::number(),
        Value::number(0.),
        Some(Arc::new(move || Box::new(Burst { count, stopped: stopped.clone() }) as Box<dyn StreamProducer>)),
    );
    Arc::new(natives)
}

#[test]
fn evaluates_to_done() {
    let mut e = evaluator("1 + 2");
    assert_eq!(e.state(), EvaluatorState::Ready);
    e.start().unwrap();
    assert!(e.is_done());
    assert_eq!(number(&e), Some(3.));
    assert_eq!(e.start(), Err(WrongStateError));
}

#[test]
fn blocking_conflict_faults() {
    let mut e = evaluator("1 + 'one'");
    e.start().unwrap();
    assert!(e.is_faulted());
    match e.current_value() {
        Some(Value::Exception(exception)) => assert_eq!(exception.kind, ExceptionKind::BlockingConflict),
        other => panic!("expected an exception, got {:?}", other),
    }
}

#[test]
fn step_limit_faults() {
    let mut e = evaluator_with("ƒ f(n•#) f(n + 1)\nf(1)", TICKING.clone(), Config::default().with_step_limit(1_000));
    e.start().unwrap();
    assert!(e.is_faulted());
    assert!(e.current_value().map(|v| v.is_exception()).unwrap_or(false));
}

#[test]
fn stream_keeps_the_last_thousand() {
    let mut e = evaluator("Tick");
    e.start().unwrap();
    let id = tick(&e);
    for i in 1..=1500 {
        assert_eq!(e.record(id, Value::number(i as f64)), Ok(RecordOutcome::Accepted));
    }
    let stream = e.stream(id).unwrap();
    assert_eq!(stream.len(), 1000);
    assert_eq!(stream.values().next().and_then(|v| v.as_number()), Some(501.));
    assert_eq!(stream.latest().and_then(|v| v.as_number()), Some(1500.));
    assert_eq!(stream.at(999).as_number(), Some(501.));
    assert_eq!(number(&e), Some(1500.));
}

#[test]
fn stream_at_counts_back_from_the_latest() {
    let mut e = evaluator("Tick");
    e.start().unwrap();
    let id = tick(&e);
    for i in 1..=3 {
        e.record(id, Value::number(i as f64)).unwrap();
    }
    let stream = e.stream(id).unwrap();
    assert_eq!(stream.at(0).as_number(), Some(3.));
    assert_eq!(stream.at(1).as_number(), Some(2.));
    assert_eq!(stream.at(3).as_number(), Some(0.));
    assert!(matches!(stream.at(4), Value::None(_)));
    assert!(matches!(stream.at(usize::MAX), Value::None(_)));
}

#[test]
fn stream_capacity_is_configurable() {
    let mut e = evaluator_with("Tick", TICKING.clone(), Config::default().with_stream_capacity(3));
    e.start().unwrap();
    let id = tick(&e);
    for i in 1..=5 {
        e.record(id, Value::number(i as f64)).unwrap();
    }
    let kept: Vec<f64> = e.stream(id).unwrap().values().filter_map(|v| v.as_number()).collect();
    assert_eq!(kept, vec![3., 4., 5.]);
}

#[test]
fn reaction_runs_once_per_record() {
    let mut e = evaluator("count: 0 ∆ Tick count + 1\ncount");
    e.start().unwrap();
    assert_eq!(number(&e), Some(0.));
    let id = tick(&e);
    for _ in 0..3 {
        e.record(id, Value::number(1.)).unwrap();
    }
    assert_eq!(number(&e), Some(3.));
    assert_eq!(e.evaluations(), 4);
    // The reference to the stream and the reaction
    assert_eq!(e.stream(id).unwrap().reactors().len(), 2);
}

#[test]
fn unchanged_reaction_keeps_its_value() {
    let mut natives = NativeRegistry::with_defaults();
    natives.register_stream("Tick", Type::number(), Value::number(0.), None);
    natives.register_stream("Tock", Type::number(), Value::number(0.), None);
    let mut e = evaluator_with(
        "ticks: 0 ∆ Tick ticks + 1\ntocks: 0 ∆ Tock tocks + 1\nticks · 10 + tocks",
        Arc::new(natives),
        Config::default(),
    );
    e.start().unwrap();
    let tick = tick(&e);
    let tock = e.stream_named("Tock").map(|s| s.id()).unwrap();
    e.record(tick, Value::number(1.)).unwrap();
    e.record(tick, Value::number(1.)).unwrap();
    e.record(tock, Value::number(1.)).unwrap();
    assert_eq!(number(&e), Some(21.));
}

#[test]
fn records_are_ignored_while_paused() {
    let mut e = evaluator("count: 0 ∆ Tick count + 1\ncount");
    e.start().unwrap();
    let id = tick(&e);
    e.pause();
    assert_eq!(e.record(id, Value::number(1.)), Ok(RecordOutcome::Dropped));
    assert_eq!(e.ignored_records(), 1);
    assert_eq!(number(&e), Some(0.));
    e.play();
    assert_eq!(e.record(id, Value::number(1.)), Ok(RecordOutcome::Accepted));
    assert_eq!(number(&e), Some(1.));
}

#[test]
fn queued_records_are_ignored_while_paused() {
    let mut e = evaluator("count: 0 ∆ Tick count + 1\ncount");
    e.start().unwrap();
    let recorder = e.recorder(tick(&e)).unwrap();
    recorder.record(Value::number(1.)).unwrap();
    e.pause();
    // Handled before time froze
    assert_eq!(number(&e), Some(1.));
    for _ in 0..3 {
        recorder.record(Value::number(1.)).unwrap();
    }
    e.play();
    assert_eq!(number(&e), Some(1.));
    assert_eq!(e.ignored_records(), 3);
    recorder.record(Value::number(1.)).unwrap();
    assert_eq!(e.flush(), 1);
    assert_eq!(number(&e), Some(2.));
}

#[test]
fn records_are_ignored_while_stepping() {
    let mut e = evaluator("count: 0 ∆ Tick count + 1\ncount");
    while e.stream_named("Tick").is_none() {
        assert!(matches!(e.step(), Ok(StepOutcome::Stepped)));
    }
    assert!(e.is_stepping());
    let id = tick(&e);
    assert_eq!(e.record(id, Value::number(1.)), Ok(RecordOutcome::Dropped));
    e.play();
    assert!(e.is_done());
    assert_eq!(number(&e), Some(0.));
    assert_eq!(e.ignored_records(), 1);
}

#[test]
fn stepping_is_deterministic() {
    let code = "ƒ double(a•#) a · 2\nx: [1 2 3]\ndouble(x[2]) + 1";
    let trace = || {
        let mut e = evaluator(code);
        let mut nodes = Vec::new();
        loop {
            nodes.push(e.current_node());
            match e.step().unwrap() {
                StepOutcome::Stepped => {},
                StepOutcome::Done(value) => return (nodes, value.as_number()),
                StepOutcome::Faulted(value) => panic!("faulted: {}", value),
            }
        }
    };
    let (first, value) = trace();
    let (second, again) = trace();
    assert_eq!(first, second);
    assert_eq!(value, Some(5.));
    assert_eq!(again, Some(5.));

    let mut played = evaluator(code);
    played.start().unwrap();
    assert_eq!(number(&played), Some(5.));
}

#[test]
fn step_out_leaves_the_function() {
    let mut e = evaluator("ƒ double(a•#) a · 2\ndouble(4) + 1");
    e.step().unwrap();
    while e.depth() < 2 {
        assert!(matches!(e.step(), Ok(StepOutcome::Stepped)));
    }
    e.step_out().unwrap();
    assert!(e.depth() < 2);
    match e.step_out().unwrap() {
        StepOutcome::Done(value) => assert_eq!(value.as_number(), Some(9.)),
        other => panic!("expected done, got {:?}", other),
    }
    assert_eq!(e.step().err(), Some(WrongStateError));
}

#[test]
fn producer_records_are_queued_until_flush() {
    let stopped = Arc::new(AtomicBool::new(false));
    let mut e = evaluator_with("count: 0 ∆ Tick count + 1\ncount", bursting(4, stopped.clone()), Config::default());
    e.start().unwrap();
    assert_eq!(number(&e), Some(0.));
    assert_eq!(e.flush(), 4);
    assert_eq!(number(&e), Some(4.));
    assert!(!stopped.load(SeqCst));
    e.stop();
    assert!(stopped.load(SeqCst));
    assert!(!e.stream_named("Tick").unwrap().is_on());
    let id = tick(&e);
    assert_eq!(e.record(id, Value::number(1.)), Ok(RecordOutcome::Dropped));
    e.stop();
}

/// Counts how often it was started and stopped.
struct Switch {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl StreamProducer for Switch {
    fn start(&mut self, _: Recorder) {
        self.starts.fetch_add(1, SeqCst);
    }
    fn stop(&mut self) {
        self.stops.fetch_add(1, SeqCst);
    }
}

#[test]
fn streams_run_while_listened_to() {
    let (sender, _receiver) = std::sync::mpsc::channel();
    let recorder = Recorder::new(StreamId(0), sender);
    let starts = Arc::new(AtomicUsize::new(0));
    let stops = Arc::new(AtomicUsize::new(0));
    let source = parse("Tick");
    let (first, second) = (source.program, source.heap.descendants(source.program)[1]);
    let mut stream = Stream::new("Tick", first, Type::number(), Value::number(0.), 10, recorder);
    stream.set_producer(Box::new(Switch { starts: starts.clone(), stops: stops.clone() }));
    assert!(!stream.is_on());

    stream.listen(first);
    stream.listen(second);
    assert!(stream.is_on());
    assert_eq!(starts.load(SeqCst), 1);

    assert!(stream.ignore(first));
    assert!(stream.is_on());
    assert!(!stream.ignore(second));
    assert!(!stream.is_on());
    assert_eq!(stops.load(SeqCst), 1);
    assert_eq!(stream.add(Value::number(1.)), RecordOutcome::Dropped);

    stream.listen(first);
    assert_eq!(starts.load(SeqCst), 2);
}

#[test]
fn unreached_reactions_unsubscribe() {
    let mut natives = NativeRegistry::with_defaults();
    natives.register_stream("Tick", Type::number(), Value::number(0.), None);
    natives.register_stream("Tock", Type::number(), Value::number(0.), None);
    let mut e = evaluator_with(
        "count: 0 ∆ Tick count + 1\ncount < 2 ? (0 ∆ Tock 1) count",
        Arc::new(natives),
        Config::default(),
    );
    e.start().unwrap();
    let tick = tick(&e);
    let tock = e.stream_named("Tock").map(|s| s.id()).unwrap();
    assert!(e.stream(tock).unwrap().is_on());
    assert_eq!(e.stream(tock).unwrap().reactors().len(), 2);

    e.record(tick, Value::number(1.)).unwrap();
    assert!(e.stream(tock).unwrap().is_on());
    e.record(tick, Value::number(1.)).unwrap();
    assert_eq!(number(&e), Some(2.));
    assert!(!e.stream(tock).unwrap().is_on());
    assert!(e.stream(tock).unwrap().reactors().is_empty());
    assert_eq!(e.record(tock, Value::number(1.)), Ok(RecordOutcome::Dropped));
    assert!(e.stream(tick).unwrap().is_on());
}

#[test]
fn producer_threads_only_enqueue() {
    let mut e = evaluator("count: 0 ∆ Tick count + 1\ncount");
    e.start().unwrap();
    let recorder = e.recorder(tick(&e)).unwrap();
    let sent = AtomicUsize::new(0);
    scope(|s| {
        for _ in 0..4 {
            let recorder = recorder.clone();
            let sent = &sent;
            s.spawn(move |_| {
                for i in 0..25 {
                    recorder.record(Value::number(i as f64)).unwrap();
                    sent.fetch_add(1, SeqCst);
                }
            });
        }
    })
    .unwrap();
    assert_eq!(number(&e), Some(0.));
    assert_eq!(e.flush(), sent.load(SeqCst));
    assert_eq!(number(&e), Some(100.));
}

#[test]
fn recorder_for_unknown_stream() {
    let e = evaluator("1");
    assert_eq!(e.recorder(StreamId(7)).err(), Some(StreamError::UnknownStream(StreamId(7))));
}

#[test]
fn recording_after_drop_fails() {
    let mut e = evaluator("Tick");
    e.start().unwrap();
    let recorder = e.recorder(tick(&e)).unwrap();
    drop(e);
    assert_eq!(recorder.record(Value::number(1.)), Err(StreamError::EvaluatorGone));
}

#[test]
fn shares_are_collected() {
    let mut e = evaluator("↑ total: 2 + 3\ntotal");
    e.start().unwrap();
    assert_eq!(e.shared().get("total").and_then(|v| v.as_number()), Some(5.));
}

#[test]
fn evaluator_logs() {
    let context = Context::new(Rc::new(parse("Tick")), Shares::new(), TICKING.clone());
    let mut e = Evaluator::new(Rc::new(context), Config::default(), Box::new(VecLogger::new("main")));
    e.start().unwrap();
    e.pause();
    let id = tick(&e);
    e.record(id, Value::number(2.)).unwrap();
    println!("{:#?}", e);
}

#[test]
fn evaluator_logs_to_file() {
    let path = std::env::temp_dir().join(format!("cadence_log_{}.txt", std::process::id()));
    let file = std::fs::File::create(&path).unwrap();
    let context = Context::new(Rc::new(parse("1 + 2")), Shares::new(), TICKING.clone());
    let mut e = Evaluator::new(Rc::new(context), Config::default(), Box::new(super::logging::FileLogger::new("main", file)));
    e.start().unwrap();
    drop(e);
    let written = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    if cfg!(not(feature = "no_logging")) {
        assert!(written.contains("SRC(main)"));
        assert!(written.contains("Done with 3"));
    }
}
