//! Result and log retrieval.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{ExecutorError, ExecutorResult};
use crate::identity::{LOG_GROUP, TaskIdentity};
use crate::job::JobHandle;
use crate::serializer::TaskSerializer;
use crate::service::LogService;
use crate::store::ArtifactStore;

/// Input to [`ResultFetcher::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Task whose result is fetched.
    pub identity: TaskIdentity,
    /// Where the result artifact is downloaded to.
    pub local_result_path: PathBuf,
    /// Completed job.
    pub job_handle: JobHandle,
}

/// Output value plus captured job output.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBundle {
    /// Function output.
    pub value: Value,
    /// Job log text.
    pub stdout: String,
    /// Reserved for a separate error stream; always empty.
    pub stderr: String,
}

/// Downloads results and job logs.
#[derive(Clone)]
pub struct ResultFetcher {
    store: ArtifactStore,
    logs: Arc<dyn LogService>,
    serializer: Arc<dyn TaskSerializer>,
}

impl ResultFetcher {
    /// Create a fetcher.
    pub fn new(
        store: ArtifactStore,
        logs: Arc<dyn LogService>,
        serializer: Arc<dyn TaskSerializer>,
    ) -> Self {
        Self {
            store,
            logs,
            serializer,
        }
    }

    /// Download and decode the result envelope, then collect the job logs.
    ///
    /// The value is the source of truth: a log service failure is logged and
    /// leaves `stdout` empty.
    #[instrument(skip(self, request), fields(task = %request.identity))]
    pub async fn fetch(&self, request: &QueryRequest) -> ExecutorResult<ResultBundle> {
        let key = request.identity.result_key();
        let bytes = self.store.download(&key, &request.local_result_path).await?;

        let serializer = self.serializer.clone();
        let envelope =
            tokio::task::spawn_blocking(move || serializer.deserialize_result(&bytes)).await??;
        if envelope.task_id != request.identity.task_id() {
            return Err(ExecutorError::Serialization(format!(
                "result envelope belongs to task {}, expected {}",
                envelope.task_id,
                request.identity.task_id()
            )));
        }

        let stdout = match self.fetch_logs(&request.identity).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not retrieve logs for {}: {}", request.identity, e);
                String::new()
            }
        };
        Ok(ResultBundle {
            value: envelope.value,
            stdout,
            stderr: String::new(),
        })
    }

    /// Concatenate every event of the task's first log stream, each message
    /// followed by `\n`. Missing streams yield an empty string.
    #[instrument(skip(self), fields(task = %identity))]
    pub async fn fetch_logs(&self, identity: &TaskIdentity) -> ExecutorResult<String> {
        let prefix = identity.log_stream_prefix();
        let streams = self
            .logs
            .describe_log_streams(LOG_GROUP, &prefix)
            .await
            .map_err(ExecutorError::LogRetrieval)?;

        let Some(stream) = streams.first() else {
            warn!("No log stream found with prefix {}", prefix);
            return Ok(String::new());
        };

        let mut text = String::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let page = self
                .logs
                .get_log_events(LOG_GROUP, stream, token.as_deref())
                .await
                .map_err(ExecutorError::LogRetrieval)?;
            pages += 1;

            for message in &page.messages {
                text.push_str(message);
                text.push('\n');
            }

            // The service signals the end by echoing the token it was given.
            match page.next_token {
                Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
                _ => break,
            }
        }
        debug!(stream = %stream, pages, "collected job logs");

        Ok(text)
    }
}

impl std::fmt::Debug for ResultFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultFetcher")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::{JsonSerializer, ResultEnvelope};
    use crate::service::{LogEventsPage, ObjectStore, ServiceError, ServiceResult};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    struct PagedLogs {
        streams: Vec<String>,
        pages: Vec<LogEventsPage>,
        requested: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl LogService for PagedLogs {
        async fn describe_log_streams(&self, group: &str, prefix: &str) -> ServiceResult<Vec<String>> {
            assert_eq!(group, LOG_GROUP);
            Ok(self
                .streams
                .iter()
                .filter(|s| s.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn get_log_events(
            &self,
            _group: &str,
            stream: &str,
            next_token: Option<&str>,
        ) -> ServiceResult<LogEventsPage> {
            assert_eq!(stream, self.streams[0]);
            let mut requested = self.requested.lock().unwrap();
            let index = requested.len();
            requested.push(next_token.map(str::to_string));
            Ok(self.pages[index].clone())
        }
    }

    struct NoObjects;

    #[async_trait]
    impl ObjectStore for NoObjects {
        async fn upload_file(&self, _: &Path, _: &str, _: &str) -> ServiceResult<()> {
            Ok(())
        }
        async fn download_file(&self, _: &str, _: &str, _: &Path) -> ServiceResult<()> {
            Ok(())
        }
        async fn delete_object(&self, _: &str, _: &str) -> ServiceResult<()> {
            Ok(())
        }
    }

    struct UnreachableLogs;

    #[async_trait]
    impl LogService for UnreachableLogs {
        async fn describe_log_streams(&self, _: &str, _: &str) -> ServiceResult<Vec<String>> {
            Err(ServiceError::new("logs", "throttled").with_code("ThrottlingException"))
        }

        async fn get_log_events(
            &self,
            _: &str,
            _: &str,
            _: Option<&str>,
        ) -> ServiceResult<LogEventsPage> {
            unreachable!("no stream was listed")
        }
    }

    /// Serves one result artifact for every download.
    struct OneResult(Vec<u8>);

    #[async_trait]
    impl ObjectStore for OneResult {
        async fn upload_file(&self, _: &Path, _: &str, _: &str) -> ServiceResult<()> {
            Ok(())
        }
        async fn download_file(&self, _: &str, _: &str, path: &Path) -> ServiceResult<()> {
            std::fs::write(path, &self.0).map_err(|e| ServiceError::new("s3", e.to_string()))
        }
        async fn delete_object(&self, _: &str, _: &str) -> ServiceResult<()> {
            Ok(())
        }
    }

    fn fetcher(logs: PagedLogs) -> ResultFetcher {
        let store = ArtifactStore::new(Arc::new(NoObjects), "b", std::env::temp_dir());
        ResultFetcher::new(store, Arc::new(logs), Arc::new(crate::serializer::JsonSerializer))
    }

    fn page(messages: &[&str], next: &str) -> LogEventsPage {
        LogEventsPage {
            messages: messages.iter().map(|m| m.to_string()).collect(),
            next_token: Some(next.to_string()),
        }
    }

    #[tokio::test]
    async fn test_logs_paginated_in_order() {
        let logs = PagedLogs {
            streams: vec!["covalent-d-1/algo-1-1700000000".into()],
            pages: vec![page(&["a", "b"], "t1"), page(&["c"], "t2"), page(&[], "t2")],
            requested: Mutex::new(Vec::new()),
        };
        let f = fetcher(logs);
        let text = f.fetch_logs(&TaskIdentity::new("d", 1)).await.unwrap();
        assert_eq!(text, "a\nb\nc\n");
    }

    #[tokio::test]
    async fn test_first_matching_stream_used() {
        let logs = PagedLogs {
            streams: vec!["covalent-d-1/first".into(), "covalent-d-1/second".into()],
            pages: vec![LogEventsPage {
                messages: vec!["only".into()],
                next_token: None,
            }],
            requested: Mutex::new(Vec::new()),
        };
        let text = fetcher(logs)
            .fetch_logs(&TaskIdentity::new("d", 1))
            .await
            .unwrap();
        assert_eq!(text, "only\n");
    }

    #[tokio::test]
    async fn test_missing_stream_is_empty() {
        let logs = PagedLogs {
            streams: vec!["covalent-other-9/x".into()],
            pages: vec![],
            requested: Mutex::new(Vec::new()),
        };
        let text = fetcher(logs)
            .fetch_logs(&TaskIdentity::new("d", 1))
            .await
            .unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_log_failure_keeps_result() {
        let identity = TaskIdentity::new("d", 1);
        let envelope = JsonSerializer
            .serialize_result(&ResultEnvelope {
                task_id: identity.task_id(),
                value: serde_json::json!({"energy": -1.5}),
            })
            .unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(Arc::new(OneResult(envelope)), "b", scratch.path());
        let f = ResultFetcher::new(store, Arc::new(UnreachableLogs), Arc::new(JsonSerializer));

        let bundle = f
            .fetch(&QueryRequest {
                identity: identity.clone(),
                local_result_path: scratch.path().join("result-d-1.json"),
                job_handle: JobHandle::new("arn:job"),
            })
            .await
            .unwrap();

        assert_eq!(bundle.value, serde_json::json!({"energy": -1.5}));
        assert!(bundle.stdout.is_empty());
        assert!(matches!(
            f.fetch_logs(&identity).await,
            Err(ExecutorError::LogRetrieval(_))
        ));
    }
}
