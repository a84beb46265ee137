//! Functions shipped with the worker image.
//!
//! | Name | Output |
//! |------|--------|
//! | `identity` | first positional argument, or the bound state when there is none |
//! | `sum` | sum of all numeric arguments, arrays flattened, plus `offset` kwarg |
//! | `echo` | `{"bound", "args", "kwargs"}` as received |

use hybrid_exec_core::{FunctionRegistry, Kwargs};
use serde_json::{Value, json};

/// Registry holding every builtin.
pub fn registry() -> FunctionRegistry {
    FunctionRegistry::new()
        .with("identity", identity)
        .with("sum", sum)
        .with("echo", echo)
}

fn identity(bound: &Value, args: &[Value], _kwargs: &Kwargs) -> Result<Value, String> {
    Ok(args.first().cloned().unwrap_or_else(|| bound.clone()))
}

fn sum(_bound: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value, String> {
    let mut total = match kwargs.get("offset") {
        Some(v) => v.as_f64().ok_or("offset must be a number")?,
        None => 0.0,
    };
    for arg in args {
        total += add_numbers(arg)?;
    }
    Ok(json!(total))
}

fn add_numbers(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not representable")),
        Value::Array(items) => items.iter().map(add_numbers).sum(),
        other => Err(format!("cannot add {other}")),
    }
}

fn echo(bound: &Value, args: &[Value], kwargs: &Kwargs) -> Result<Value, String> {
    Ok(json!({
        "bound": bound,
        "args": args,
        "kwargs": kwargs,
    }))
}
