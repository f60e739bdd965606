use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use vqpy::{
    BBox, Detection, EngineConfig, Frame, ReplayDetector, Result, Tracker, VObj, Value, Vqpy,
};

fn person(x: f32) -> Detection {
    Detection::new(BBox::new(x, 0.0, x + 40.0, 100.0), "person", 0.85)
}

fn is_person(_: &Frame, args: &[Value]) -> Result<Value> {
    match args.first() {
        Some(Value::Object(obj)) => Ok(Value::Boolean(obj.label == "person")),
        _ => Ok(Value::Null),
    }
}

/// Every detection gets a fresh id, starting at 100
struct FreshIds {
    next: u64,
}

impl Tracker for FreshIds {
    fn assign(&mut self, frame: &Frame, detections: Vec<Detection>) -> Vec<VObj> {
        detections
            .into_iter()
            .map(|d| {
                self.next += 1;
                VObj::from_detection(d, self.next + 99, frame)
            })
            .collect()
    }
}

const LOITERING: &str = "
    MODEL is_person(VOBJ) -> BOOL;
    CLASS Person WHERE is_person(self) {
        HISTORY(8) PROPERTY seen = coalesce(seen[-2], 0) + 1;
    }
    QUERY loitering SELECT track_id, seen FROM Person WHERE seen >= 3;
";

#[test]
fn test_sessions_run_in_parallel() {
    let vqpy = Vqpy::new();
    let detector = (0..6u64).fold(ReplayDetector::new(), |d, i| {
        d.with_frame(i, vec![person(i as f32), person(300.0)])
    });
    vqpy.register_detector(Arc::new(detector)).unwrap();
    vqpy.register_model("is_person", is_person).unwrap();
    let program = Arc::new(vqpy.compile(LOITERING).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let vqpy = vqpy.clone();
            let program = Arc::clone(&program);
            thread::spawn(move || {
                let mut session = vqpy.session(&program).unwrap();
                let frames: Vec<Frame> = (0..6).map(|i| Frame::new(i, i as f64)).collect();
                session.run(&frames).unwrap()
            })
        })
        .collect();

    let runs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for run in &runs {
        assert_eq!(run, &runs[0]);
    }

    let last = runs[0].last().unwrap();
    let rows = last.rows("loitering");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.get("seen") == Some(&Value::Integer(6))));
}

#[test]
fn test_custom_tracker_breaks_identity() {
    let vqpy = Vqpy::new();
    let detector = (0..4u64).fold(ReplayDetector::new(), |d, i| {
        d.with_frame(i, vec![person(0.0)])
    });
    vqpy.register_detector(Arc::new(detector)).unwrap();
    vqpy.register_model("is_person", is_person).unwrap();
    let program = vqpy.compile(LOITERING).unwrap();

    let frames: Vec<Frame> = (0..4).map(|i| Frame::new(i, i as f64)).collect();

    // The built-in tracker follows the standing person
    let mut session = vqpy.session(&program).unwrap();
    let results = session.run(&frames).unwrap();
    assert_eq!(results[3].rows("loitering").len(), 1);

    // New ids every frame: no history accumulates
    let mut session = vqpy
        .session_with_tracker(&program, Box::new(FreshIds { next: 0 }))
        .unwrap();
    let results = session.run(&frames).unwrap();
    assert!(results.iter().all(|r| r.rows("loitering").is_empty()));
}

#[test]
fn test_upstream_track_ids_are_kept() {
    let vqpy = Vqpy::new();
    let detector = ReplayDetector::new()
        .with_frame(0, vec![person(0.0).with_track_id(42)])
        .with_frame(1, vec![person(500.0).with_track_id(42), person(0.0)]);
    vqpy.register_detector(Arc::new(detector)).unwrap();

    let program = vqpy
        .compile("QUERY ids SELECT track_id FROM VObj ORDER BY track_id;")
        .unwrap();
    let mut session = vqpy.session(&program).unwrap();

    let first = session.process(&Frame::new(0, 0.0)).unwrap();
    assert_eq!(first.rows("ids")[0].values, vec![Value::Integer(42)]);

    // The untracked detection overlaps track 42's old box, but 42 is taken
    let second = session.process(&Frame::new(1, 1.0)).unwrap();
    let ids: Vec<&Value> = second
        .rows("ids")
        .iter()
        .filter_map(|r| r.get("track_id"))
        .collect();
    assert_eq!(ids, vec![&Value::Integer(42), &Value::Integer(43)]);
}

#[test]
fn test_model_calls_are_shared_within_a_frame() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let vqpy = Vqpy::new();
    vqpy.register_detector(Arc::new(
        ReplayDetector::new().with_frame(0, vec![person(0.0), person(200.0)]),
    ))
    .unwrap();
    vqpy.register_model("pose", move |_: &Frame, _: &[Value]| -> Result<Value> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::String("standing".into()))
    })
    .unwrap();

    let program = vqpy
        .compile(
            "MODEL pose(VOBJ) -> STRING;
             CLASS Standing WHERE pose(self) = 'standing' { }
             QUERY a SELECT pose(self) AS p FROM Standing;
             QUERY b SELECT COUNT(*) AS n FROM Standing WHERE pose(self) LIKE 'stand%';",
        )
        .unwrap();
    let mut session = vqpy.session(&program).unwrap();
    let result = session.process(&Frame::new(0, 0.0)).unwrap();

    assert_eq!(result.rows("a").len(), 2);
    assert_eq!(result.rows("b")[0].get("n"), Some(&Value::Integer(2)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Without memoization every call site invokes the model
    calls.store(0, Ordering::SeqCst);
    let uncached = Vqpy::with_config(EngineConfig::default().with_memoize_models(false)).unwrap();
    uncached
        .register_detector(Arc::new(
            ReplayDetector::new().with_frame(0, vec![person(0.0), person(200.0)]),
        ))
        .unwrap();
    let counter = Arc::clone(&calls);
    uncached
        .register_model("pose", move |_: &Frame, _: &[Value]| -> Result<Value> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::String("standing".into()))
        })
        .unwrap();
    uncached
        .session(&program)
        .unwrap()
        .process(&Frame::new(0, 0.0))
        .unwrap();
    assert!(calls.load(Ordering::SeqCst) > 2);
}
