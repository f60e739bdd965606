use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use vqpy::{BBox, Detection, Frame, ReplayDetector, Value, Vqpy};

const FRAMES: u64 = 30;

const PROGRAM: &str = "
    MODEL is_car(VOBJ) -> BOOL;
    CLASS Car WHERE is_car(self) {
        HISTORY(5) PROPERTY cx = center_x(bbox);
        PROPERTY velocity = abs(cx[-1] - cx[-2]);
    }
    QUERY speeding SELECT track_id, velocity FROM Car
        WHERE velocity > 4 ORDER BY velocity DESC LIMIT 10;
    QUERY traffic SELECT COUNT(*) AS cars, AVG(score) AS confidence FROM Car;
";

// `objects` boxes per frame, each moving a few pixels to the right
fn mock_detector(objects: usize) -> ReplayDetector {
    let mut detector = ReplayDetector::new();
    for frame in 0..FRAMES {
        let detections = (0..objects)
            .map(|i| {
                let x = (i * 150) as f32 + frame as f32 * (1 + i % 8) as f32;
                let y = (i / 10) as f32 * 60.0;
                let label = if i % 3 == 0 { "person" } else { "car" };
                Detection::new(BBox::new(x, y, x + 100.0, y + 40.0), label, 0.8)
            })
            .collect();
        detector.insert(frame, detections);
    }
    detector
}

fn setup(objects: usize) -> Vqpy {
    let vqpy = Vqpy::new();
    vqpy.register_detector(Arc::new(mock_detector(objects)))
        .unwrap();
    vqpy.register_model("is_car", |_: &Frame, args: &[Value]| -> vqpy::Result<Value> {
        Ok(Value::Boolean(matches!(&args[0], Value::Object(obj) if obj.label == "car")))
    })
    .unwrap();
    vqpy
}

fn benchmark_compile(c: &mut Criterion) {
    let vqpy = Vqpy::new();
    c.bench_function("compile_program", |b| {
        b.iter(|| black_box(vqpy.compile(black_box(PROGRAM)).unwrap()))
    });
}

fn benchmark_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_throughput");
    let frames: Vec<Frame> = (0..FRAMES)
        .map(|i| Frame::new(i, i as f64 / 30.0))
        .collect();

    for objects in [1usize, 10, 50].iter() {
        let vqpy = setup(*objects);
        let program = vqpy.compile(PROGRAM).unwrap();

        group.bench_with_input(BenchmarkId::new("objects", objects), objects, |b, _| {
            b.iter(|| {
                let mut session = vqpy.session(&program).unwrap();
                black_box(session.run(&frames).unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_compile, benchmark_session);
criterion_main!(benches);
