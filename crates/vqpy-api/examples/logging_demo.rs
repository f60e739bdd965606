use std::sync::Arc;
use vqpy::logging::LogConfig;
use vqpy::{BBox, Detection, Frame, ReplayDetector, Vqpy};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Debug level on stdout; try RUST_LOG=vqpy_core::query::executor=trace
    let _guard = LogConfig::debug().init()?;

    println!("=== VQPy Logging Demo ===\n");

    let vqpy = Vqpy::new();
    vqpy.register_detector(Arc::new(
        ReplayDetector::new()
            .with_frame(0, vec![Detection::new(BBox::new(0.0, 0.0, 50.0, 50.0), "dog", 0.8)])
            .with_frame(1, vec![Detection::new(BBox::new(4.0, 0.0, 54.0, 50.0), "dog", 0.8)]),
    ))?;

    // Compiling logs the planned queries; `breed` is never called and only warns
    println!("1. Compiling...");
    let program = vqpy.compile(
        "MODEL breed(VOBJ) -> STRING;
         CLASS Animal { HISTORY(2) PROPERTY x = center_x(bbox); }
         QUERY dogs SELECT track_id, x FROM Animal WHERE label = 'dog';",
    )?;

    println!("\n2. Starting a session...");
    let mut session = vqpy.session(&program)?;

    println!("\n3. Processing frames...");
    session.process(&Frame::new(0, 0.0))?;
    session.process(&Frame::new(1, 0.04))?;

    println!("\n=== Demo Complete ===");
    println!("Check the logs above to see tracing output!");
    Ok(())
}
