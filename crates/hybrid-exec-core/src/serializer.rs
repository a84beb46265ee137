//! Task packaging and the result envelope.
//!
//! The packaged artifact is a [`TaskPackage`] (function, positional args,
//! keyword args); the result artifact is always a [`ResultEnvelope`]. Both
//! are JSON on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ExecutorError, ExecutorResult};
use crate::function::{Kwargs, TaskFunction};

/// A function plus the arguments to call it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPackage {
    /// Function to run.
    pub function: TaskFunction,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: Kwargs,
}

impl TaskPackage {
    /// Create a package.
    pub fn new(function: TaskFunction, args: Vec<Value>, kwargs: Kwargs) -> Self {
        Self {
            function,
            args,
            kwargs,
        }
    }
}

/// The single result format uploaded by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Task that produced the value.
    pub task_id: String,
    /// Function output.
    pub value: Value,
}

/// Encodes and decodes task packages and result envelopes.
pub trait TaskSerializer: Send + Sync {
    /// Encode a task package.
    fn serialize(&self, package: &TaskPackage) -> ExecutorResult<Vec<u8>>;

    /// Decode a task package.
    fn deserialize(&self, bytes: &[u8]) -> ExecutorResult<TaskPackage>;

    /// Encode a result envelope.
    fn serialize_result(&self, envelope: &ResultEnvelope) -> ExecutorResult<Vec<u8>>;

    /// Decode a result envelope.
    fn deserialize_result(&self, bytes: &[u8]) -> ExecutorResult<ResultEnvelope>;
}

/// JSON serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl TaskSerializer for JsonSerializer {
    fn serialize(&self, package: &TaskPackage) -> ExecutorResult<Vec<u8>> {
        serde_json::to_vec(package).map_err(|e| ExecutorError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> ExecutorResult<TaskPackage> {
        serde_json::from_slice(bytes).map_err(|e| ExecutorError::Serialization(e.to_string()))
    }

    fn serialize_result(&self, envelope: &ResultEnvelope) -> ExecutorResult<Vec<u8>> {
        serde_json::to_vec(envelope).map_err(|e| ExecutorError::Serialization(e.to_string()))
    }

    fn deserialize_result(&self, bytes: &[u8]) -> ExecutorResult<ResultEnvelope> {
        serde_json::from_slice(bytes).map_err(|e| ExecutorError::Serialization(e.to_string()))
    }
}

/// Serialize `(function, args, kwargs)` with the JSON serializer.
pub fn serialize(function: &TaskFunction, args: &[Value], kwargs: &Kwargs) -> ExecutorResult<Vec<u8>> {
    JsonSerializer.serialize(&TaskPackage::new(
        function.clone(),
        args.to_vec(),
        kwargs.clone(),
    ))
}

/// Deserialize a package produced by [`serialize`].
pub fn deserialize(bytes: &[u8]) -> ExecutorResult<TaskPackage> {
    JsonSerializer.deserialize(bytes)
}
