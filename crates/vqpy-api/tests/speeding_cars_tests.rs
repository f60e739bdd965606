use std::sync::Arc;
use vqpy::{BBox, Detection, Error, Frame, ReplayDetector, Result, Value, Vqpy};

const SPEEDING: &str = "
    MODEL is_car(VOBJ) -> BOOL;
    MODEL plate(VOBJ) -> STRING;
    CLASS Car WHERE is_car(self) {
        HISTORY(5) PROPERTY cx = center_x(bbox);
        PROPERTY velocity = abs(cx[-1] - cx[-2]);
    }
    QUERY speeding SELECT track_id, plate(self) AS plate, velocity FROM Car
        WHERE velocity > 5 ORDER BY velocity DESC;
    QUERY traffic SELECT COUNT(*) AS cars FROM Car;
";

fn car(x: f32) -> Detection {
    Detection::new(BBox::new(x, 0.0, x + 100.0, 40.0), "car", 0.9)
}

// Car 1 moves 30px per frame, car 2 10px, car 3 2px to the left
fn street(frames: u64) -> ReplayDetector {
    let mut detector = ReplayDetector::new();
    for i in 0..frames {
        let t = i as f32;
        detector.insert(
            i,
            vec![
                car(30.0 * t),
                car(400.0 + 10.0 * t),
                car(800.0 - 2.0 * t),
                Detection::new(BBox::new(1200.0, 0.0, 1204.0, 12.0), "person", 0.8),
            ],
        );
    }
    detector
}

fn is_car(_: &Frame, args: &[Value]) -> Result<Value> {
    match args.first() {
        Some(Value::Object(obj)) => Ok(Value::Boolean(obj.label == "car")),
        _ => Ok(Value::Null),
    }
}

fn plate(_: &Frame, args: &[Value]) -> Result<Value> {
    match args.first() {
        Some(Value::Object(obj)) => Ok(Value::String(format!("CAR-{}", obj.track_id))),
        _ => Ok(Value::Null),
    }
}

fn setup(frames: u64) -> Vqpy {
    let vqpy = Vqpy::new();
    vqpy.register_detector(Arc::new(street(frames))).unwrap();
    vqpy.register_model("is_car", is_car).unwrap();
    vqpy.register_model("plate", plate).unwrap();
    vqpy
}

fn frames(count: u64) -> Vec<Frame> {
    (0..count).map(|i| Frame::new(i, i as f64 / 30.0)).collect()
}

#[test]
fn test_speeding_cars_end_to_end() {
    let vqpy = setup(4);
    let program = vqpy.compile(SPEEDING).unwrap();
    let mut session = vqpy.session(&program).unwrap();

    let results = session.run(&frames(4)).unwrap();
    assert_eq!(results.len(), 4);

    // No history on the first frame
    assert!(results[0].rows("speeding").is_empty());

    for result in &results {
        assert_eq!(result.rows("traffic").len(), 1);
        assert_eq!(result.rows("traffic")[0].get("cars"), Some(&Value::Integer(3)));
    }

    for result in &results[1..] {
        let rows = result.rows("speeding");
        assert_eq!(rows.len(), 2, "frame {}", result.frame_index);
        assert_eq!(rows[0].get("track_id"), Some(&Value::Integer(1)));
        assert_eq!(rows[0].get("plate"), Some(&Value::String("CAR-1".into())));
        assert_eq!(rows[0].get("velocity"), Some(&Value::Float(30.0)));
        assert_eq!(rows[1].get("track_id"), Some(&Value::Integer(2)));
        assert_eq!(rows[1].get("velocity"), Some(&Value::Float(10.0)));
    }

    assert_eq!(session.frames_processed(), 4);
    // One `cx` series per car
    assert_eq!(session.history_len(), 3);
}

#[test]
fn test_outputs_follow_declaration_order() {
    let vqpy = setup(1);
    let program = vqpy.compile(SPEEDING).unwrap();
    let mut session = vqpy.session(&program).unwrap();

    let result = session.process(&Frame::new(0, 0.0)).unwrap();
    let names: Vec<&str> = result.outputs.iter().map(|o| o.query.as_str()).collect();
    assert_eq!(names, vec!["speeding", "traffic"]);
    assert!(result.output("missing").is_none());
    assert!(result.rows("missing").is_empty());
}

#[test]
fn test_explain() {
    let plans = Vqpy::new().explain(SPEEDING).unwrap();
    let lines: Vec<&str> = plans.lines().collect();
    assert_eq!(
        lines,
        vec![
            "speeding: Project(track_id, plate, velocity) -> Sort(velocity DESC) -> \
             Filter((velocity > 5)) -> Materialize(cx) -> ClassFilter(Car) -> ObjectScan",
            "traffic: Aggregate(cars) -> Materialize(cx) -> ClassFilter(Car) -> ObjectScan",
        ]
    );
}

#[test]
fn test_unbound_model_is_rejected() {
    let vqpy = Vqpy::new();
    vqpy.register_detector(Arc::new(street(1))).unwrap();
    vqpy.register_model("is_car", is_car).unwrap();

    let program = vqpy.compile(SPEEDING).unwrap();
    match vqpy.session(&program) {
        Err(Error::UnboundModel(name)) => assert_eq!(name, "plate"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("session should not start with an unbound model"),
    }

    // Registering the missing model later is enough
    vqpy.register_model("plate", plate).unwrap();
    assert!(vqpy.session(&program).is_ok());
}

#[test]
fn test_unused_model_may_stay_unbound() {
    let vqpy = setup(1);
    let program = vqpy
        .compile(
            "MODEL color(VOBJ) -> STRING;
             QUERY labels SELECT label FROM VObj ORDER BY label;",
        )
        .unwrap();
    assert_eq!(program.reachable_models(), Vec::<&str>::new());

    let mut session = vqpy.session(&program).unwrap();
    let result = session.process(&Frame::new(0, 0.0)).unwrap();
    let labels: Vec<&Value> = result
        .rows("labels")
        .iter()
        .filter_map(|r| r.get("label"))
        .collect();
    assert_eq!(labels.len(), 4);
    assert_eq!(labels[3], &Value::String("person".into()));
}

#[test]
fn test_model_failure_stops_processing() {
    let vqpy = setup(2);
    vqpy.register_model("plate", |_: &Frame, _: &[Value]| -> Result<Value> {
        Err(Error::InvalidOperation("OCR backend offline".to_string()))
    })
    .unwrap();

    let program = vqpy.compile(SPEEDING).unwrap();
    let mut session = vqpy.session(&program).unwrap();

    // Frame 0 has no speeding rows, so plate() is never called
    assert!(session.process(&Frame::new(0, 0.0)).is_ok());
    match session.process(&Frame::new(1, 0.1)) {
        Err(Error::Model { name, message }) => {
            assert_eq!(name, "plate");
            assert!(message.contains("OCR backend offline"));
        }
        other => panic!("unexpected result: {:?}", other.map(|r| r.frame_index)),
    }
}

#[test]
fn test_detector_failure_is_reported() {
    let vqpy = Vqpy::new();
    vqpy.register_detector(Arc::new(|_: &Frame| -> Result<Vec<Detection>> {
        Err(Error::InvalidOperation("camera offline".to_string()))
    }))
    .unwrap();

    let program = vqpy.compile("QUERY all SELECT label FROM VObj;").unwrap();
    let mut session = vqpy.session(&program).unwrap();
    assert!(matches!(
        session.process(&Frame::new(0, 0.0)),
        Err(Error::Model { ref name, .. }) if name == "objects_in_frame"
    ));
}

#[test]
fn test_compile_errors() {
    let vqpy = Vqpy::new();

    assert!(matches!(
        vqpy.compile("QUERY q SELECT FROM VObj;"),
        Err(Error::Parse(_))
    ));
    assert!(matches!(
        vqpy.compile("QUERY q SELECT speed FROM VObj;"),
        Err(Error::Compile(_))
    ));
    assert!(matches!(
        vqpy.compile("QUERY q SELECT label FROM Truck;"),
        Err(Error::Compile(_))
    ));
    assert!(matches!(
        vqpy.compile("CLASS C { HISTORY(2) PROPERTY x = score; PROPERTY y = x[-3]; }"),
        Err(Error::Compile(_))
    ));
    assert!(matches!(
        vqpy.compile("CLASS C { PROPERTY a = b; PROPERTY b = a; }"),
        Err(Error::Compile(_))
    ));
}

#[test]
fn test_history_limit_follows_config() {
    let vqpy = Vqpy::with_config(vqpy::EngineConfig::default().with_max_history_length(4)).unwrap();
    assert!(vqpy
        .compile("CLASS C { HISTORY(4) PROPERTY x = score; }")
        .is_ok());
    assert!(matches!(
        vqpy.compile("CLASS C { HISTORY(5) PROPERTY x = score; }"),
        Err(Error::Compile(_))
    ));
}
