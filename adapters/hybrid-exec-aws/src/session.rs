//! Shared AWS SDK configuration.

use std::fmt;
use std::time::Duration;

use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use hybrid_exec_core::ExecutorConfig;
use tracing::{debug, warn};

use crate::error::{AwsError, AwsResult};

/// Loaded SDK configuration shared by every client.
#[derive(Clone)]
pub struct AwsSession {
    sdk_config: SdkConfig,
    profile: String,
}

impl AwsSession {
    /// Load credentials and region for `config`.
    ///
    /// The configured credentials file is consulted when it exists; otherwise
    /// the SDK's default chain (environment, SSO, IAM role) applies.
    pub async fn load(config: &ExecutorConfig) -> AwsResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(&config.profile)
            .timeout_config(
                aws_config::timeout::TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(60))
                    .connect_timeout(Duration::from_secs(10))
                    .build(),
            );

        if config.credentials_file.exists() {
            let files = ProfileFiles::builder()
                .include_default_config_file(true)
                .with_file(ProfileFileKind::Credentials, &config.credentials_file)
                .build();
            loader = loader.profile_files(files);
        } else {
            warn!(
                "Credentials file {} not found, using the default credential chain",
                config.credentials_file.display()
            );
        }

        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }

        let sdk_config = loader.load().await;
        if sdk_config.region().is_none() {
            return Err(AwsError::MissingRegion);
        }
        debug!(region = ?sdk_config.region(), profile = %config.profile, "loaded AWS session");

        Ok(Self {
            sdk_config,
            profile: config.profile.clone(),
        })
    }

    /// SDK configuration.
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.sdk_config
    }

    /// Resolved region.
    pub fn region(&self) -> Option<&str> {
        self.sdk_config.region().map(|r| r.as_ref())
    }
}

impl fmt::Debug for AwsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsSession")
            .field("region", &self.region())
            .field("profile", &self.profile)
            .field("credentials", &"[REDACTED]")
            .finish()
    }
}
