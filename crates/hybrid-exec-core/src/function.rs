//! Named task functions.
//!
//! A task function travels as a [`TaskFunction`]: the registry name of the
//! code to run plus its bound (captured) state. Host and worker resolve the
//! name against a [`FunctionRegistry`] built from the same code.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ExecutorError, ExecutorResult};

/// Keyword arguments.
pub type Kwargs = Map<String, Value>;

/// Signature of a registered task function: `(bound, args, kwargs) -> output`.
pub type TaskFn = dyn Fn(&Value, &[Value], &Kwargs) -> Result<Value, String> + Send + Sync;

/// A reference to a registered function together with its bound state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFunction {
    /// Registry name.
    pub name: String,
    /// Captured state handed to the function on every call.
    #[serde(default)]
    pub bound: Value,
}

impl TaskFunction {
    /// Reference a function with no bound state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound: Value::Null,
        }
    }

    /// Bind captured state.
    pub fn with_bound(mut self, bound: Value) -> Self {
        self.bound = bound;
        self
    }
}

/// Name → function table.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<String, Arc<TaskFn>>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Value, &[Value], &Kwargs) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &[Value], &Kwargs) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(name, f);
        self
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Call `function` with `args` and `kwargs`.
    pub fn invoke(
        &self,
        function: &TaskFunction,
        args: &[Value],
        kwargs: &Kwargs,
    ) -> ExecutorResult<Value> {
        let f = self.functions.get(&function.name).ok_or_else(|| {
            ExecutorError::Function(format!("no function registered as '{}'", function.name))
        })?;
        f(&function.bound, args, kwargs)
            .map_err(|e| ExecutorError::Function(format!("{}: {e}", function.name)))
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> FunctionRegistry {
        FunctionRegistry::new().with("scale", |bound, args, _| {
            let factor = bound.as_f64().ok_or("bound factor missing")?;
            let x = args.first().and_then(Value::as_f64).ok_or("x missing")?;
            Ok(json!(x * factor))
        })
    }

    #[test]
    fn test_invoke_uses_bound_state() {
        let f = TaskFunction::new("scale").with_bound(json!(3.0));
        let out = registry().invoke(&f, &[json!(2.0)], &Kwargs::new()).unwrap();
        assert_eq!(out, json!(6.0));
    }

    #[test]
    fn test_invoke_unknown_function() {
        let err = registry()
            .invoke(&TaskFunction::new("missing"), &[], &Kwargs::new())
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_invoke_propagates_function_error() {
        let f = TaskFunction::new("scale");
        let err = registry().invoke(&f, &[json!(1)], &Kwargs::new()).unwrap_err();
        assert!(err.to_string().contains("bound factor missing"));
    }

    #[test]
    fn test_names_sorted() {
        let reg = registry().with("add", |_, _, _| Ok(Value::Null));
        assert_eq!(reg.names(), vec!["add", "scale"]);
        assert!(reg.contains("add"));
    }
}
