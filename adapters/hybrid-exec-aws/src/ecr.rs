//! ECR registry authorization.

use async_trait::async_trait;
use hybrid_exec_core::service::{RegistryAuth, RegistryToken};
use hybrid_exec_core::{ServiceError, ServiceResult};
use tracing::instrument;

use crate::error::service_error;
use crate::session::AwsSession;

/// [`RegistryAuth`] backed by ECR.
#[derive(Debug, Clone)]
pub struct EcrAuth {
    client: aws_sdk_ecr::Client,
}

impl EcrAuth {
    /// Create a registry authorizer from a session.
    pub fn new(session: &AwsSession) -> Self {
        Self {
            client: aws_sdk_ecr::Client::new(session.sdk_config()),
        }
    }
}

#[async_trait]
impl RegistryAuth for EcrAuth {
    #[instrument(skip(self))]
    async fn authorization_token(&self) -> ServiceResult<RegistryToken> {
        let resp = self
            .client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| service_error("ecr", e))?;

        let data = resp
            .authorization_data()
            .first()
            .ok_or_else(|| ServiceError::new("ecr", "no authorization data returned"))?;
        let token = data
            .authorization_token()
            .ok_or_else(|| ServiceError::new("ecr", "authorization data has no token"))?;
        let endpoint = data
            .proxy_endpoint()
            .ok_or_else(|| ServiceError::new("ecr", "authorization data has no endpoint"))?;

        Ok(RegistryToken {
            token: token.to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}
