use clap::Parser;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

use crate::{consts, locator::RetryPolicy};

#[derive(Debug, Clone, Parser)]
pub struct OperatorConfig {
    /// Access key ID used to sign SLB requests.
    #[arg(long, env = "KUBESLB_ACCESS_KEY_ID")]
    pub access_key_id: String,

    /// Access key secret used to sign SLB requests.
    #[arg(long, env = "KUBESLB_ACCESS_KEY_SECRET", hide_env_values = true)]
    pub access_key_secret: String,

    /// Region where load balancers are looked up and created.
    #[arg(short = 'r', long, env = "KUBESLB_REGION")]
    pub region: String,

    /// Name of the cluster, handed to the load balancer provider.
    #[arg(long, env = "KUBESLB_CLUSTER_NAME", default_value = "kubernetes")]
    pub cluster_name: String,

    /// SLB API endpoint.
    #[arg(long, env = "KUBESLB_ENDPOINT", default_value = "https://slb.aliyuncs.com")]
    pub endpoint: String,

    /// How many times to look for a freshly created load balancer
    /// before giving up.
    #[arg(
        long,
        env = "KUBESLB_CREATE_POLL_ATTEMPTS",
        default_value_t = consts::DEFAULT_CREATE_POLL_ATTEMPTS
    )]
    pub create_poll_attempts: u32,

    /// Seconds to wait before each lookup of a freshly created load balancer.
    #[arg(
        long,
        env = "KUBESLB_CREATE_POLL_INTERVAL",
        default_value_t = consts::DEFAULT_CREATE_POLL_INTERVAL_SECS
    )]
    pub create_poll_interval: u64,

    /// Seconds between two reconciliations of the same service.
    #[arg(long, env = "KUBESLB_REQUEUE_INTERVAL", default_value = "30")]
    pub requeue_interval: u64,

    // Log level of the operator.
    #[arg(long, env = "KUBESLB_LOG_LEVEL", default_value = "INFO")]
    pub log_level: LevelFilter,
}

impl OperatorConfig {
    #[must_use]
    pub const fn create_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.create_poll_attempts,
            delay: Duration::from_secs(self.create_poll_interval),
        }
    }

    #[must_use]
    pub const fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_interval)
    }
}
