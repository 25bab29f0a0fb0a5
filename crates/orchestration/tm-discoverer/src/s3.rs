//! S3 client configuration and creation.

use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use tm_error::Result;

/// Configuration for S3 access.
#[derive(Debug, Clone, Default)]
pub struct S3ClientConfig {
    /// AWS region; falls back to the default provider chain when unset.
    pub region: Option<String>,

    /// Custom endpoint URL (for LocalStack).
    pub endpoint: Option<String>,

    /// Per-request timeout.
    pub operation_timeout: Option<Duration>,

    /// Connection establishment timeout.
    pub connect_timeout: Option<Duration>,
}

impl S3ClientConfig {
    /// Create a new config with no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the AWS region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set a custom endpoint (for LocalStack).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the per-request and connect timeouts.
    pub fn with_timeouts(mut self, operation: Duration, connect: Duration) -> Self {
        self.operation_timeout = Some(operation);
        self.connect_timeout = Some(connect);
        self
    }
}

/// Create an S3 client from configuration.
///
/// Credentials come from the standard provider chain (env vars, shared
/// config, instance metadata).
pub async fn create_s3_client(config: &S3ClientConfig) -> Result<Client> {
    use aws_config::Region;

    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }

    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let mut timeouts = TimeoutConfig::builder();
    if let Some(operation) = config.operation_timeout {
        timeouts = timeouts.operation_timeout(operation);
    }
    if let Some(connect) = config.connect_timeout {
        timeouts = timeouts.connect_timeout(connect);
    }
    loader = loader.timeout_config(timeouts.build());

    let aws_config = loader.load().await;

    let builder = aws_sdk_s3::config::Builder::from(&aws_config);

    // Path-style access for custom endpoints (LocalStack)
    let s3_config = if config.endpoint.is_some() {
        builder.force_path_style(true).build()
    } else {
        builder.build()
    };

    Ok(Client::from_conf(s3_config))
}
