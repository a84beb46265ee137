//! CloudWatch Logs.

use std::fmt;

use async_trait::async_trait;
use hybrid_exec_core::ServiceResult;
use hybrid_exec_core::service::{LogEventsPage, LogService};
use tracing::instrument;

use crate::error::service_error;
use crate::session::AwsSession;

/// [`LogService`] backed by CloudWatch Logs.
#[derive(Clone)]
pub struct CloudWatchLogs {
    client: aws_sdk_cloudwatchlogs::Client,
}

impl CloudWatchLogs {
    /// Create a log service from a session.
    pub fn new(session: &AwsSession) -> Self {
        Self {
            client: aws_sdk_cloudwatchlogs::Client::new(session.sdk_config()),
        }
    }
}

impl fmt::Debug for CloudWatchLogs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudWatchLogs")
            .field("credentials", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl LogService for CloudWatchLogs {
    #[instrument(skip(self))]
    async fn describe_log_streams(&self, group: &str, prefix: &str) -> ServiceResult<Vec<String>> {
        let resp = self
            .client
            .describe_log_streams()
            .log_group_name(group)
            .log_stream_name_prefix(prefix)
            .send()
            .await
            .map_err(|e| service_error("logs", e))?;

        Ok(resp
            .log_streams()
            .iter()
            .filter_map(|s| s.log_stream_name().map(str::to_string))
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        next_token: Option<&str>,
    ) -> ServiceResult<LogEventsPage> {
        let resp = self
            .client
            .get_log_events()
            .log_group_name(group)
            .log_stream_name(stream)
            .start_from_head(true)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| service_error("logs", e))?;

        Ok(LogEventsPage {
            messages: resp
                .events()
                .iter()
                .map(|e| e.message().unwrap_or_default().to_string())
                .collect(),
            next_token: resp.next_forward_token().map(str::to_string),
        })
    }
}
