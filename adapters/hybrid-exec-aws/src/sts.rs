//! STS caller identity.

use async_trait::async_trait;
use hybrid_exec_core::ServiceResult;
use hybrid_exec_core::service::{CallerIdentity, IdentityService};
use tracing::instrument;

use crate::error::service_error;
use crate::session::AwsSession;

/// [`IdentityService`] backed by STS.
#[derive(Debug, Clone)]
pub struct StsIdentity {
    client: aws_sdk_sts::Client,
}

impl StsIdentity {
    /// Create an identity service from a session.
    pub fn new(session: &AwsSession) -> Self {
        Self {
            client: aws_sdk_sts::Client::new(session.sdk_config()),
        }
    }
}

#[async_trait]
impl IdentityService for StsIdentity {
    #[instrument(skip(self))]
    async fn caller_identity(&self) -> ServiceResult<CallerIdentity> {
        let resp = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| service_error("sts", e))?;

        Ok(CallerIdentity {
            account: resp.account().map(str::to_string),
            arn: resp.arn().map(str::to_string),
            raw: format!("{resp:?}"),
        })
    }
}
