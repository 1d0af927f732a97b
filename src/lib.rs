//! Reactive expression engine.
//!
//! Expression trees (built in code, parsed from text or loaded from JSON)
//! compile to compact stack bytecode, run on a small VM against a host
//! [`EvalContext`], and are cached by structural hash so re-evaluating the
//! same shape skips compilation. Results of pure expressions are memoized
//! until a variable they read changes.
//!
//! ```
//! use reactive_expr::{Engine, Store, Value};
//!
//! let engine = Engine::default();
//! let mut store = Store::with_cache(engine.cache().unwrap().clone());
//! store.set("price", 25);
//! store.set("qty", 4);
//! let v = engine.evaluate_source("(price * qty) >= 100", &mut store).unwrap();
//! assert_eq!(v, Value::Bool(true));
//! ```

pub mod ast;
pub mod cache;
pub mod compiler;
pub mod diagnostic;
pub mod engine;
pub mod lexer;
pub mod parser;
pub mod store;
pub mod value;
pub mod vm;

pub use ast::{BinOp, Expr, Stmt, UnaryOp};
pub use cache::{CacheStats, ExprCache, SharedCache};
pub use compiler::{CompileError, CompileOptions, CompiledExpr, compile, compile_block};
pub use engine::{Engine, EngineConfig, is_pure};
pub use store::Store;
pub use value::Value;
pub use vm::{EvalContext, VmError, execute};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] lexer::LexError),
    #[error(transparent)]
    Parse(#[from] parser::ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
