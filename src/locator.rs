use std::time::Duration;

use crate::{
    consts,
    error::{SlbError, SlbResult},
    options::SlbOptions,
    slb::{CreateLoadBalancerArgs, LoadBalancer, SlbClient},
};

/// How a freshly created balancer is waited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Lookups to try before giving up.
    pub attempts: u32,
    /// Sleep before every lookup.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: consts::DEFAULT_CREATE_POLL_ATTEMPTS,
            delay: Duration::from_secs(consts::DEFAULT_CREATE_POLL_INTERVAL_SECS),
        }
    }
}

/// Derive the balancer name from a service UID.
///
/// The name is `a` followed by the UID without dashes, cut to
/// [`consts::MAX_LB_NAME_LEN`] characters. Very long UIDs may collide
/// after truncation.
#[must_use]
pub fn balancer_name(service_uid: &str) -> String {
    std::iter::once('a')
        .chain(service_uid.chars().filter(|c| *c != '-'))
        .take(consts::MAX_LB_NAME_LEN)
        .collect()
}

/// Resolves balancers by name within a single region.
pub struct Locator<'a, C: ?Sized> {
    client: &'a C,
    region: &'a str,
}

impl<'a, C: SlbClient + ?Sized> Locator<'a, C> {
    pub const fn new(client: &'a C, region: &'a str) -> Self {
        Self { client, region }
    }

    /// Find the balancer called `name` and fetch its full attributes.
    ///
    /// Absence is not an error, `Ok(None)` is returned instead.
    pub async fn find(&self, name: &str) -> SlbResult<Option<LoadBalancer>> {
        let summaries = self
            .client
            .list_load_balancers(self.region)
            .await
            .inspect_err(|err| tracing::error!("Error describing load balancers: {}", err))?;
        let Some(summary) = summaries
            .into_iter()
            .find(|summary| summary.load_balancer_name == name)
        else {
            return Ok(None);
        };
        let balancer = self
            .client
            .describe_load_balancer(&summary.load_balancer_id)
            .await?;
        Ok(Some(balancer))
    }

    /// Create the balancer `name` and wait until lookups can see it.
    ///
    /// Creation is asynchronous on the remote side. After the create call
    /// the balancer is looked up `policy.attempts` times, sleeping
    /// `policy.delay` before each lookup. If it never shows up, the error
    /// of the last lookup is returned, or [`SlbError::BalancerNotMaterialized`]
    /// if the last lookup simply found nothing.
    #[tracing::instrument(skip(self, options, policy))]
    pub async fn create(
        &self,
        name: &str,
        options: &SlbOptions,
        policy: &RetryPolicy,
    ) -> SlbResult<LoadBalancer> {
        let args = CreateLoadBalancerArgs {
            region: self.region.to_string(),
            name: name.to_string(),
            address_type: consts::LB_ADDRESS_TYPE.to_string(),
            internet_charge_type: options.internet_charge_type.clone(),
            bandwidth: options.bandwidth,
            client_token: uuid::Uuid::new_v4().to_string(),
        };
        let id = self
            .client
            .create_load_balancer(&args)
            .await
            .inspect_err(|err| tracing::error!("Error creating load balancer {}: {}", name, err))?;
        tracing::info!("Requested load balancer {} with id {}", name, id);

        let mut last_error = None;
        for attempt in 1..=policy.attempts {
            tokio::time::sleep(policy.delay).await;
            match self.find(name).await {
                Ok(Some(balancer)) => {
                    tracing::info!("Created load balancer {:?}", balancer);
                    return Ok(balancer);
                }
                Ok(None) => {
                    tracing::debug!(
                        "Load balancer {} is not visible yet (attempt {})",
                        name,
                        attempt
                    );
                    last_error = None;
                }
                Err(err) => {
                    tracing::warn!(
                        "Error checking if creating load balancer has succeeded: {}. Will retry",
                        err
                    );
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => {
                tracing::error!("Load balancer {} just doesn't exist", name);
                Err(SlbError::BalancerNotMaterialized(name.to_string()))
            }
        }
    }
}
