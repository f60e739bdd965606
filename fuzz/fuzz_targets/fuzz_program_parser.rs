#![no_main]

use libfuzzer_sys::fuzz_target;
use vqpy_core::query::{Compiler, Parser};

fuzz_target!(|data: &[u8]| {
    // Ignore invalid UTF-8
    if let Ok(source) = std::str::from_utf8(data) {
        // Limit program length to prevent timeout
        if source.len() > 10_000 {
            return;
        }

        // Parsing and compiling should never panic
        if let Ok(mut parser) = Parser::new(source) {
            if let Ok(program) = parser.parse() {
                let _ = Compiler::new().compile(&program);
            }
        }
    }
});
