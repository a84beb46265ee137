//! Task identity and the resource names derived from it.
//!
//! Every remote resource touched by one invocation is named from the
//! `(dispatch_id, node_id)` pair, so the worker inside the container can
//! recompute the same keys and concurrent invocations never share an object.
//!
//! | Resource | Name |
//! |----------|------|
//! | input artifact | `inputs/func-{task_id}.json` |
//! | result artifact | `outputs/result-{task_id}.json` |
//! | job name | `covalent-{task_id}` (`[A-Za-z0-9-]`, at most 50 chars) |
//! | log stream prefix | `{job name}/` |
//! | image tag | `{task_id}` (docker-tag safe) |

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Prefix for Braket job names.
pub const JOB_NAME_PREFIX: &str = "covalent-";

/// CloudWatch log group Braket writes job logs to.
pub const LOG_GROUP: &str = "/aws/braket/jobs";

/// Longest job name Braket accepts.
pub const MAX_JOB_NAME_LEN: usize = 50;

/// Hex digits of the task-id digest appended to rewritten job names.
const NAME_DIGEST_LEN: usize = 8;

/// Namespace for packaged task inputs.
pub const INPUT_PREFIX: &str = "inputs/";

/// Namespace for task results.
pub const OUTPUT_PREFIX: &str = "outputs/";

/// Identity of one task invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskIdentity {
    dispatch_id: String,
    node_id: u64,
}

impl TaskIdentity {
    /// Create a task identity.
    pub fn new(dispatch_id: impl Into<String>, node_id: u64) -> Self {
        Self {
            dispatch_id: dispatch_id.into(),
            node_id,
        }
    }

    /// Dispatch (workflow run) identifier.
    pub fn dispatch_id(&self) -> &str {
        &self.dispatch_id
    }

    /// Node identifier within the dispatch.
    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    /// `{dispatch_id}-{node_id}`.
    ///
    /// Unambiguous because the node id never contains a `-`.
    pub fn task_id(&self) -> String {
        format!("{}-{}", self.dispatch_id, self.node_id)
    }

    /// Object key of the packaged task.
    pub fn input_key(&self) -> String {
        format!("{INPUT_PREFIX}func-{}.json", self.task_id())
    }

    /// Object key of the result envelope.
    pub fn result_key(&self) -> String {
        format!("{OUTPUT_PREFIX}result-{}.json", self.task_id())
    }

    /// Braket job name, restricted to `[A-Za-z0-9-]` and 50 characters.
    ///
    /// Names that had to be rewritten or shortened carry a suffix derived
    /// from the task id, so two tasks never share a job name or log prefix.
    pub fn job_name(&self) -> String {
        let raw = format!("{JOB_NAME_PREFIX}{}", self.task_id());
        let sanitized: String = raw
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        if sanitized == raw && raw.len() <= MAX_JOB_NAME_LEN {
            return raw;
        }

        let digest = self.name_digest();
        let head: String = sanitized
            .chars()
            .take(MAX_JOB_NAME_LEN - NAME_DIGEST_LEN - 1)
            .collect();
        format!("{}-{digest}", head.trim_end_matches('-'))
    }

    /// Prefix shared by every log stream of this task's job.
    pub fn log_stream_prefix(&self) -> String {
        format!("{}/", self.job_name())
    }

    /// Container image tag.
    pub fn image_tag(&self) -> String {
        sanitize_tag(&self.task_id())
    }

    /// Idempotency token for job creation.
    pub fn client_token(&self) -> String {
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, self.task_id().as_bytes()).to_string()
    }

    fn name_digest(&self) -> String {
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, self.task_id().as_bytes())
            .simple()
            .to_string()
            .chars()
            .take(NAME_DIGEST_LEN)
            .collect()
    }
}

impl fmt::Display for TaskIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.task_id())
    }
}

/// Replace characters docker rejects in tags and cap the length at 128.
fn sanitize_tag(raw: &str) -> String {
    let mut tag: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .take(128)
        .collect();
    if tag.starts_with(['.', '-']) {
        tag.replace_range(0..1, "_");
    }
    tag
}

/// Per-invocation metadata supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Task identity.
    pub identity: TaskIdentity,
    /// Host results directory.
    pub results_dir: PathBuf,
}

impl TaskMetadata {
    /// Create task metadata.
    pub fn new(dispatch_id: impl Into<String>, node_id: u64, results_dir: impl AsRef<Path>) -> Self {
        Self {
            identity: TaskIdentity::new(dispatch_id, node_id),
            results_dir: results_dir.as_ref().to_path_buf(),
        }
    }

    /// Directory holding this dispatch's local results.
    pub fn task_results_dir(&self) -> PathBuf {
        self.results_dir.join(self.identity.dispatch_id())
    }

    /// Local path the result artifact is downloaded to.
    pub fn local_result_path(&self) -> PathBuf {
        self.task_results_dir()
            .join(format!("result-{}.json", self.identity.task_id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_derived_names() {
        let id = TaskIdentity::new("abc", 3);
        assert_eq!(id.task_id(), "abc-3");
        assert_eq!(id.input_key(), "inputs/func-abc-3.json");
        assert_eq!(id.result_key(), "outputs/result-abc-3.json");
        assert_eq!(id.job_name(), "covalent-abc-3");
        assert_eq!(id.log_stream_prefix(), "covalent-abc-3/");
        assert_eq!(id.image_tag(), "abc-3");
    }

    #[test]
    fn test_job_name_restricted_for_braket() {
        let id = TaskIdentity::new("run_2024.05", 7);
        let name = id.job_name();
        assert!(name.starts_with("covalent-run-2024-05-7-"), "{name}");
        assert_eq!(name.len(), "covalent-run-2024-05-7-".len() + NAME_DIGEST_LEN);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));

        let long = TaskIdentity::new("0b5e6a4c-3f9e-4d1c-9a51-6c2d9e8f1a7b", 12345);
        let name = long.job_name();
        assert!(name.len() <= MAX_JOB_NAME_LEN);
        assert!(!name.ends_with('-'));
        assert!(long.log_stream_prefix().starts_with(&name));
    }

    #[test]
    fn test_rewritten_job_names_stay_distinct() {
        // Punctuation that maps onto '-' must not merge two tasks.
        let underscore = TaskIdentity::new("run_1", 2);
        let dash = TaskIdentity::new("run-1", 2);
        assert_eq!(dash.job_name(), "covalent-run-1-2");
        assert_ne!(underscore.job_name(), dash.job_name());
        assert_ne!(underscore.log_stream_prefix(), dash.log_stream_prefix());

        // Neither may truncation of long dispatch ids.
        let dispatch = "0b5e6a4c-3f9e-4d1c-9a51-6c2d9e8f1a7b";
        let names: Vec<_> = [12345, 12346, 1234]
            .into_iter()
            .map(|node| TaskIdentity::new(dispatch, node).job_name())
            .collect();
        assert_ne!(names[0], names[1]);
        assert_ne!(names[0], names[2]);
        assert_ne!(names[1], names[2]);
        assert!(names.iter().all(|n| n.len() <= MAX_JOB_NAME_LEN));
    }

    #[test]
    fn test_image_tag_sanitized() {
        let id = TaskIdentity::new("-disp/atch:1", 0);
        assert_eq!(id.image_tag(), "_disp-atch-1-0");
    }

    #[test]
    fn test_client_token_is_stable() {
        let a = TaskIdentity::new("abc", 1).client_token();
        let b = TaskIdentity::new("abc", 1).client_token();
        let c = TaskIdentity::new("abc", 2).client_token();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_local_result_path() {
        let meta = TaskMetadata::new("d1", 4, "/tmp/results");
        assert_eq!(meta.task_results_dir(), PathBuf::from("/tmp/results/d1"));
        assert_eq!(
            meta.local_result_path(),
            PathBuf::from("/tmp/results/d1/result-d1-4.json")
        );
    }

    proptest! {
        #[test]
        fn keys_are_deterministic(dispatch in "[a-z0-9-]{1,36}", node in any::<u64>()) {
            let a = TaskIdentity::new(dispatch.clone(), node);
            let b = TaskIdentity::new(dispatch, node);
            prop_assert_eq!(a.input_key(), b.input_key());
            prop_assert_eq!(a.result_key(), b.result_key());
            prop_assert_eq!(a.job_name(), b.job_name());
        }

        #[test]
        fn distinct_identities_never_collide(
            d1 in "[a-z0-9-]{1,24}",
            n1 in 0u64..10_000,
            d2 in "[a-z0-9-]{1,24}",
            n2 in 0u64..10_000,
        ) {
            let a = TaskIdentity::new(d1, n1);
            let b = TaskIdentity::new(d2, n2);
            prop_assume!(a != b);
            prop_assert_ne!(a.input_key(), b.input_key());
            prop_assert_ne!(a.result_key(), b.result_key());
            prop_assert_ne!(a.input_key(), b.result_key());
        }

        #[test]
        fn distinct_identities_get_distinct_jobs(
            d1 in "[a-z0-9_.-]{1,60}",
            n1 in 0u64..100_000,
            d2 in "[a-z0-9_.-]{1,60}",
            n2 in 0u64..100_000,
        ) {
            let a = TaskIdentity::new(d1, n1);
            let b = TaskIdentity::new(d2, n2);
            prop_assume!(a != b);
            prop_assert!(a.job_name().len() <= MAX_JOB_NAME_LEN);
            prop_assert_ne!(a.job_name(), b.job_name());
            prop_assert!(!a.log_stream_prefix().starts_with(&b.log_stream_prefix()));
        }
    }
}
