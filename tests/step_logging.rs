//! 步骤日志的观测事件测试

use parking_lot::Mutex;
use relaycast::{
    build, build_with_step_logging, predicate, NamedStep, PipelinePhase, Step, StepRegistry,
    Traced,
};
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Span, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Captured {
    level: Level,
    step: String,
    event: String,
}

#[derive(Clone, Default)]
struct CaptureLayer {
    events: Arc<Mutex<Vec<Captured>>>,
}

#[derive(Default)]
struct FieldVisitor {
    step: Option<String>,
    event: Option<String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "event" {
            self.event = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "step" => self.step = Some(format!("{value:?}")),
            "event" => self.event = Some(format!("{value:?}")),
            _ => {}
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        if let (Some(step), Some(kind)) = (visitor.step, visitor.event) {
            self.events.lock().push(Captured {
                level: *event.metadata().level(),
                step,
                event: kind,
            });
        }
    }
}

fn capture<F: FnOnce()>(f: F) -> Vec<Captured> {
    let layer = CaptureLayer::default();
    let events = Arc::clone(&layer.events);
    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::with_default(subscriber, f);
    let captured = events.lock().clone();
    captured
}

#[derive(Debug, Clone)]
struct Tally {
    value: i64,
    span: Span,
}

impl Traced for Tally {
    fn span(&self) -> &Span {
        &self.span
    }
}

fn tally(value: i64) -> Tally {
    Tally {
        value,
        span: tracing::info_span!("tally"),
    }
}

fn add(n: i64) -> Step<Tally, Tally> {
    Step::from_fn(move |t: Tally| Tally {
        value: t.value + n,
        ..t
    })
}

fn pairs(events: &[Captured]) -> Vec<(String, String)> {
    events
        .iter()
        .map(|e| (e.step.clone(), e.event.clone()))
        .collect()
}

#[test]
fn emits_entered_exited_and_terminated() {
    let stop = predicate(|t: &Tally| t.value >= 3);
    let pipeline = build_with_step_logging(
        Level::INFO,
        Some(stop),
        vec![
            NamedStep::new("one", add(1)),
            NamedStep::new("two", add(2)),
            NamedStep::new("three", add(3)),
        ],
    )
    .unwrap();

    let mut out = None;
    let events = capture(|| {
        out = Some(futures::executor::block_on(pipeline.evaluate(tally(0))).value);
    });

    assert_eq!(out, Some(3));
    assert_eq!(
        pairs(&events),
        vec![
            ("one".to_string(), "entered".to_string()),
            ("one".to_string(), "exited".to_string()),
            ("two".to_string(), "entered".to_string()),
            ("two".to_string(), "terminated".to_string()),
        ]
    );
    assert!(events.iter().all(|e| e.level == Level::INFO));
}

#[test]
fn logging_level_is_chosen_at_runtime() {
    let pipeline = build_with_step_logging(
        Level::WARN,
        None,
        vec![NamedStep::new(42u64, add(1))],
    )
    .unwrap();
    let events = capture(|| {
        futures::executor::block_on(pipeline.evaluate(tally(0)));
    });
    assert_eq!(
        pairs(&events),
        vec![
            ("event#42".to_string(), "entered".to_string()),
            ("event#42".to_string(), "exited".to_string()),
        ]
    );
    assert!(events.iter().all(|e| e.level == Level::WARN));
}

#[test]
fn logged_and_plain_pipelines_agree() {
    for start in [-5, 0, 1, 2, 10] {
        let stop = predicate(|t: &Tally| t.value % 4 == 0);
        let plain = build(Some(stop.clone()), vec![add(1), add(2), add(3)]).unwrap();
        let logged = build_with_step_logging(
            Level::DEBUG,
            Some(stop),
            vec![
                NamedStep::new("a", add(1)),
                NamedStep::new("b", add(2)),
                NamedStep::new("c", add(3)),
            ],
        )
        .unwrap();
        let plain_out = futures::executor::block_on(plain.evaluate(tally(start))).value;
        let logged_out = futures::executor::block_on(logged.evaluate(tally(start))).value;
        assert_eq!(plain_out, logged_out, "start={start}");
    }
}

#[test]
fn registry_logs_in_registration_order() {
    let mut registry = StepRegistry::new("tally", vec![NamedStep::new("core", add(10))]);
    registry
        .register(NamedStep::new("pre", add(1)), PipelinePhase::First, 0)
        .unwrap();
    let pipeline = registry.build_with_step_logging(Level::INFO, None).unwrap();

    let mut out = None;
    let events = capture(|| {
        out = Some(futures::executor::block_on(pipeline.evaluate(tally(0))).value);
    });
    assert_eq!(out, Some(11));
    let entered: Vec<String> = events
        .iter()
        .filter(|e| e.event == "entered")
        .map(|e| e.step.clone())
        .collect();
    assert_eq!(entered, vec!["pre", "core"]);
}
