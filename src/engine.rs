//! Evaluation pipeline: memo check, cached compile, execute, memoize.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::ast::{Expr, Stmt};
use crate::cache::{self, CacheStats, SharedCache};
use crate::compiler::{self, CompileError, CompileOptions, CompiledExpr};
use crate::parser;
use crate::value::Value;
use crate::vm::{self, EvalContext, builtins};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache_capacity: usize,
    /// Keep results of pure expressions until a variable they read changes.
    /// Only sound when the context reports changes, as [`crate::Store`] does.
    /// A result is not kept when any invalidation on the cache lands while
    /// the expression runs.
    pub memoize: bool,
    pub compile: CompileOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { cache_capacity: cache::DEFAULT_CAPACITY, memoize: true, compile: CompileOptions::default() }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    cache: Option<SharedCache>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineConfig::default())
    }
}

impl Engine {
    /// Engine with its own cache sized from the config.
    pub fn new(config: EngineConfig) -> Self {
        let cache = SharedCache::new(config.cache_capacity);
        Engine { config, cache: Some(cache) }
    }

    pub fn with_cache(config: EngineConfig, cache: SharedCache) -> Self {
        Engine { config, cache: Some(cache) }
    }

    /// Engine backed by the process-wide cache, or compiling on every call
    /// when none is installed.
    pub fn with_global_cache(config: EngineConfig) -> Self {
        Engine { config, cache: cache::global::get() }
    }

    pub fn uncached(config: EngineConfig) -> Self {
        Engine { config, cache: None }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&SharedCache> {
        self.cache.as_ref()
    }

    pub fn stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(SharedCache::stats)
    }

    /// Cached program for `expr`, compiling and inserting it on a miss.
    pub fn compile(&self, expr: &Expr) -> Result<Arc<CompiledExpr>, CompileError> {
        let Some(cache) = &self.cache else {
            return compiler::compile_with(expr, &self.config.compile).map(Arc::new);
        };
        if let Some(program) = cache.lookup(expr) {
            return Ok(program);
        }
        tracing::debug!(expr = %expr, "compiling on cache miss");
        let program = compiler::compile_with(expr, &self.config.compile)?;
        Ok(cache.insert(expr, program))
    }

    pub fn evaluate(&self, expr: &Expr, ctx: &mut dyn EvalContext) -> Result<Value, Error> {
        let memoize = self.config.memoize && self.cache.is_some() && is_pure(expr);
        if memoize {
            if let Some(v) = self.cache.as_ref().and_then(|c| c.get_memoized_result(expr)) {
                return Ok(v);
            }
        }

        let program = self.compile(expr)?;
        let generation = self.cache.as_ref().map_or(0, SharedCache::generation);
        let value = vm::execute(&program, ctx)?;

        if memoize {
            if let Some(cache) = &self.cache {
                cache.store_result_if_current(expr, value.clone(), generation);
            }
        }
        Ok(value)
    }

    /// Parse and evaluate expression text.
    pub fn evaluate_source(&self, source: &str, ctx: &mut dyn EvalContext) -> Result<Value, Error> {
        let expr = parser::expression(source)?;
        self.evaluate(&expr, ctx)
    }

    /// Compile and run a statement block. Blocks are not cached.
    pub fn run(&self, stmts: &[Stmt], ctx: &mut dyn EvalContext) -> Result<Value, Error> {
        let program = compiler::compile_block(stmts, &self.config.compile)?;
        Ok(vm::execute(&program, ctx)?)
    }
}

/// Whether repeated evaluation with unchanged variables always gives the
/// same result. Context functions, impure builtins and methods outside the
/// builtin set make an expression impure.
pub fn is_pure(expr: &Expr) -> bool {
    match expr {
        Expr::Int { .. }
        | Expr::Float { .. }
        | Expr::String { .. }
        | Expr::Bool { .. }
        | Expr::Null
        | Expr::Var { .. }
        | Expr::Property { .. } => true,
        Expr::Arrow { .. } => false,
        Expr::Call { function, args } => builtins::is_pure(function) && args.iter().all(is_pure),
        Expr::MethodCall { receiver, method, args } => {
            builtins::is_builtin_method(method) && is_pure(receiver) && args.iter().all(is_pure)
        }
        Expr::Member { object, .. } => is_pure(object),
        Expr::Computed { object, key } => is_pure(object) && is_pure(key),
        Expr::Index { array, index } => is_pure(array) && is_pure(index),
        Expr::Binary { left, right, .. } => is_pure(left) && is_pure(right),
        Expr::Unary { operand, .. } => is_pure(operand),
        Expr::Ternary { condition, then, otherwise } => is_pure(condition) && is_pure(then) && is_pure(otherwise),
        Expr::Group { inner } => is_pure(inner),
        Expr::Array { elements } => elements.iter().all(is_pure),
        Expr::Object { values, .. } => values.iter().all(is_pure),
    }
}
