use std::sync::Arc;
use vqpy::{BBox, Detection, Frame, ReplayDetector, Value, Vqpy};

const PROGRAM: &str = "
    -- Abstract functions, bound to concrete models below
    MODEL is_car(VOBJ) -> BOOL;
    MODEL plate(VOBJ) -> STRING;

    CLASS Car WHERE is_car(self) {
        HISTORY(5) PROPERTY cx = center_x(bbox);
        PROPERTY velocity = abs(cx[-1] - cx[-2]);
    }

    QUERY speeding SELECT track_id, plate(self) AS plate, velocity FROM Car
        WHERE velocity > 15 ORDER BY velocity DESC LIMIT 3;
    QUERY traffic SELECT COUNT(*) AS cars, AVG(velocity) AS mean_velocity FROM Car;
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== VQPy Speeding Cars Demo ===\n");

    // Pre-recorded detections stand in for a real detector
    let mut detector = ReplayDetector::new();
    for i in 0..10u64 {
        let t = i as f32;
        detector.insert(
            i,
            vec![
                Detection::new(BBox::new(25.0 * t, 10.0, 25.0 * t + 120.0, 60.0), "car", 0.92),
                Detection::new(BBox::new(600.0 + 6.0 * t, 80.0, 720.0 + 6.0 * t, 130.0), "car", 0.88),
                Detection::new(BBox::new(400.0, 200.0, 440.0, 300.0), "person", 0.75),
            ],
        );
    }

    let vqpy = Vqpy::new();
    vqpy.register_detector(Arc::new(detector))?;
    vqpy.register_model("is_car", |_: &Frame, args: &[Value]| -> vqpy::Result<Value> {
        Ok(Value::Boolean(
            matches!(args.first(), Some(Value::Object(obj)) if obj.label == "car"),
        ))
    })?;
    vqpy.register_model("plate", |_: &Frame, args: &[Value]| -> vqpy::Result<Value> {
        Ok(match args.first() {
            Some(Value::Object(obj)) => Value::String(format!("ABC-{:03}", obj.track_id)),
            _ => Value::Null,
        })
    })?;

    println!("1. Query plans:");
    for line in vqpy.explain(PROGRAM)?.lines() {
        println!("   {}", line);
    }

    let program = vqpy.compile(PROGRAM)?;
    let mut session = vqpy.session(&program)?;

    println!("\n2. Processing frames...");
    let frames: Vec<Frame> = (0..10).map(|i| Frame::new(i, i as f64 / 30.0)).collect();
    for result in session.run(&frames)? {
        let traffic = &result.rows("traffic")[0];
        println!(
            "   frame {:>2}: {} cars, mean velocity {}",
            result.frame_index,
            traffic.get("cars").unwrap_or(&Value::Null),
            traffic.get("mean_velocity").unwrap_or(&Value::Null),
        );
        for row in result.rows("speeding") {
            println!(
                "      speeding: track {} plate {} at {} px/frame",
                row.get("track_id").unwrap_or(&Value::Null),
                row.get("plate").unwrap_or(&Value::Null),
                row.get("velocity").unwrap_or(&Value::Null),
            );
        }
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}
