//! Query engine module
//!
//! VQL parsing, semantic analysis, planning, and per-frame execution.

/// Abstract Syntax Tree types
pub mod ast;
/// Built-in scalar functions
pub mod builtins;
/// Name binding, type checking and model resolution
pub mod compiler;
/// Query executor
pub mod executor;
/// VQL lexer
pub mod lexer;
/// VQL parser
pub mod parser;
/// Query planner
pub mod planner;
/// Runtime values and rows
pub mod value;

// Re-export main types
pub use ast::*;
pub use builtins::Builtin;
pub use compiler::{
    Attribute, BoundExpr, ClassId, ClassInfo, CompileError, CompiledProgram, CompiledQuery,
    Compiler, ModelId, ModelSig, OutputColumn, Projection, PropId, PropertyInfo, ResolvedProgram,
    SortKey, OBJECTS_IN_FRAME, ROOT_CLASS, ROOT_CLASS_NAME,
};
pub use executor::{Executor, FrameResult, QueryOutput};
pub use lexer::{Lexer, LexerError, Token};
pub use parser::{ParseError, Parser};
pub use planner::{PhysicalOperator, PhysicalPlan, Planner};
pub use value::{Column, Row, Value};

/// Parse and compile VQL source in one step
pub fn compile_source(source: &str, config: &crate::EngineConfig) -> crate::Result<CompiledProgram> {
    let program = Parser::new(source)?.parse()?;
    Ok(Compiler::with_config(config).compile(&program)?)
}
