//! Variable store that keeps an expression cache coherent.
//!
//! Every write, from the host or from a running program, drops memoized
//! results of expressions that read the variable.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::cache::SharedCache;
use crate::value::Value;
use crate::vm::{EvalContext, VmError, VmResult, builtins};

pub type HostFn = Box<dyn Fn(&[Value]) -> VmResult<Value> + Send + Sync>;

#[derive(Default)]
pub struct Store {
    vars: FxHashMap<String, Value>,
    functions: FxHashMap<String, HostFn>,
    cache: Option<SharedCache>,
}

fn key(name: &str, scope: Option<&str>) -> String {
    match scope {
        Some(scope) => format!("{scope}:{name}"),
        None => name.to_string(),
    }
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    pub fn with_cache(cache: SharedCache) -> Self {
        Store { cache: Some(cache), ..Store::default() }
    }

    pub fn attach_cache(&mut self, cache: SharedCache) {
        self.cache = Some(cache);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn get_scoped(&self, scope: &str, name: &str) -> Option<&Value> {
        self.vars.get(&key(name, Some(scope)))
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.write(name, None, value.into());
    }

    pub fn set_scoped(&mut self, scope: &str, name: &str, value: impl Into<Value>) {
        self.write(name, Some(scope), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let old = self.vars.remove(name);
        if old.is_some() {
            self.changed(name);
        }
        old
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Register a function callable from expressions as `name(args)`.
    pub fn define_function(
        &mut self,
        name: &str,
        f: impl Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    ) {
        self.functions.insert(name.to_string(), Box::new(f));
    }

    fn write(&mut self, name: &str, scope: Option<&str>, value: Value) {
        let k = key(name, scope);
        if self.vars.get(&k) == Some(&value) {
            return;
        }
        self.vars.insert(k, value);
        self.changed(name);
    }

    // Dependencies are tracked by bare name, so a scoped write invalidates
    // every expression reading that name in any scope.
    fn changed(&self, name: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(name);
        }
    }
}

impl EvalContext for Store {
    fn resolve(&self, name: &str, scope: Option<&str>) -> Option<Value> {
        self.vars.get(&key(name, scope)).cloned()
    }

    fn invoke(&mut self, name: &str, receiver: Option<&Value>, args: &[Value]) -> VmResult<Value> {
        match (receiver, self.functions.get(name)) {
            (Some(r), _) => builtins::call_method(r, name, args),
            (None, Some(f)) => f(args),
            (None, None) => Err(VmError::UndefinedFunction { name: name.to_string() }),
        }
    }

    fn assign(&mut self, name: &str, scope: Option<&str>, value: Value) -> VmResult<()> {
        self.write(name, scope, value);
        Ok(())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("Store").field("vars", &self.vars).field("functions", &names).finish()
    }
}
