use std::sync::Arc;
use vqpy::{BBox, Detection, Frame, ReplayDetector, ResultLogReader, ResultLogWriter, Vqpy};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== VQPy Result Log Demo ===\n");

    let path = std::env::temp_dir().join("vqpy_demo.vqrl");

    let mut detector = ReplayDetector::new();
    for i in 0..5u64 {
        let x = 10.0 * i as f32;
        detector.insert(
            i,
            vec![Detection::new(BBox::new(x, 0.0, x + 80.0, 40.0), "bus", 0.9)],
        );
    }

    let vqpy = Vqpy::new();
    vqpy.register_detector(Arc::new(detector))?;
    let program = vqpy.compile(
        "CLASS Bus WHERE label = 'bus' { HISTORY(2) PROPERTY x = center_x(bbox); }
         QUERY buses SELECT track_id, x, x[-2] AS previous FROM Bus;",
    )?;

    println!("1. Writing results to {}", path.display());
    let mut writer = ResultLogWriter::create(&path)?;
    let frames: Vec<Frame> = (0..5).map(|i| Frame::new(i, i as f64 / 25.0)).collect();
    let written = vqpy.session(&program)?.run_to_log(&frames, &mut writer)?;
    drop(writer);
    println!("   {} frames written", written);

    println!("\n2. Reading them back...");
    let reader = ResultLogReader::open(&path)?;
    println!("   format version {}", reader.version());
    for result in reader {
        let result = result?;
        for row in result.rows("buses") {
            println!("   frame {}: {:?}", result.frame_index, row.values);
        }
    }

    std::fs::remove_file(&path)?;
    println!("\n=== Demo Complete ===");
    Ok(())
}
