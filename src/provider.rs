use async_trait::async_trait;
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, Node, Service};
use kube::ResourceExt;

use crate::{
    backends::reconcile_backends,
    error::{SlbError, SlbResult},
    instances::InstanceResolver,
    listeners::ListenerReconciler,
    locator::{balancer_name, Locator, RetryPolicy},
    options::SlbOptions,
    slb::{LoadBalancer, SlbClient},
};

/// Load balancer half of a cloud provider.
///
/// Calls for the same service must not overlap. Nothing here locks, the
/// caller is expected to serialize work per balancer.
#[async_trait]
pub trait LoadBalancerProvider: Send + Sync {
    /// Name of the balancer backing `svc`.
    fn name(&self, svc: &Service) -> SlbResult<String>;

    /// Current status of the balancer, `None` if there is none.
    async fn get(&self, cluster_name: &str, svc: &Service) -> SlbResult<Option<LoadBalancerStatus>>;

    /// Create the balancer if needed and converge it to `svc` and `nodes`.
    async fn ensure(
        &self,
        cluster_name: &str,
        svc: &Service,
        nodes: &[Node],
    ) -> SlbResult<LoadBalancerStatus>;

    /// Converge an existing balancer. Fails if there is none.
    async fn update(&self, cluster_name: &str, svc: &Service, nodes: &[Node]) -> SlbResult<()>;

    /// Delete the balancer. A missing balancer counts as deleted.
    async fn ensure_deleted(&self, cluster_name: &str, svc: &Service) -> SlbResult<()>;
}

/// Ingress status pointing at the balancer's address.
#[must_use]
pub fn balancer_status(balancer: &LoadBalancer) -> LoadBalancerStatus {
    LoadBalancerStatus {
        ingress: Some(vec![LoadBalancerIngress {
            ip: Some(balancer.address.clone()),
            ..Default::default()
        }]),
    }
}

/// Check that `svc` can be served by a balancer at all.
///
/// Runs before any remote call is made.
pub fn validate_service(svc: &Service) -> SlbResult<()> {
    let Some(spec) = svc.spec.as_ref() else {
        return Ok(());
    };
    let affinity = spec.session_affinity.as_deref().unwrap_or("None");
    if affinity != "None" {
        return Err(SlbError::UnsupportedAffinity(affinity.to_string()));
    }
    for port in spec.ports.iter().flatten() {
        let protocol = port.protocol.as_deref().unwrap_or("TCP");
        if protocol != "TCP" && protocol != "UDP" {
            return Err(SlbError::UnsupportedPortProtocol(protocol.to_string()));
        }
    }
    if spec
        .load_balancer_ip
        .as_deref()
        .is_some_and(|ip| !ip.is_empty())
    {
        return Err(SlbError::LoadBalancerIpNotSupported);
    }
    Ok(())
}

/// [`LoadBalancerProvider`] backed by the remote SLB service.
pub struct SlbProvider<C, R> {
    client: C,
    resolver: R,
    region: String,
    create_policy: RetryPolicy,
}

impl<C: SlbClient, R: InstanceResolver> SlbProvider<C, R> {
    pub fn new(
        client: C,
        resolver: R,
        region: impl Into<String>,
        create_policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            resolver,
            region: region.into(),
            create_policy,
        }
    }

    pub const fn client(&self) -> &C {
        &self.client
    }

    fn locator(&self) -> Locator<'_, C> {
        Locator::new(&self.client, &self.region)
    }

    async fn sync(
        &self,
        balancer: &LoadBalancer,
        svc: &Service,
        options: &SlbOptions,
        instances: &[String],
    ) -> SlbResult<()> {
        let ports = svc
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_deref())
            .unwrap_or_default();
        ListenerReconciler::new(&self.client, balancer, options)
            .reconcile(ports)
            .await?;
        reconcile_backends(&self.client, balancer, instances).await
    }
}

#[async_trait]
impl<C: SlbClient, R: InstanceResolver> LoadBalancerProvider for SlbProvider<C, R> {
    fn name(&self, svc: &Service) -> SlbResult<String> {
        let uid = svc.uid().ok_or(SlbError::ServiceWithoutUid)?;
        Ok(balancer_name(&uid))
    }

    async fn get(
        &self,
        _cluster_name: &str,
        svc: &Service,
    ) -> SlbResult<Option<LoadBalancerStatus>> {
        let name = self.name(svc)?;
        Ok(self
            .locator()
            .find(&name)
            .await?
            .as_ref()
            .map(balancer_status))
    }

    #[tracing::instrument(skip_all, fields(service = svc.name_any()))]
    async fn ensure(
        &self,
        _cluster_name: &str,
        svc: &Service,
        nodes: &[Node],
    ) -> SlbResult<LoadBalancerStatus> {
        validate_service(svc)?;
        let name = self.name(svc)?;
        let instances = self.resolver.instances_for_nodes(nodes).await?;
        tracing::info!("Ensuring load balancer {} with backends {:?}", name, instances);
        let options = SlbOptions::from_service(svc);

        let balancer = match self.locator().find(&name).await? {
            Some(balancer) => balancer,
            None => {
                self.locator()
                    .create(&name, &options, &self.create_policy)
                    .await?
            }
        };

        self.sync(&balancer, svc, &options, &instances).await?;
        Ok(balancer_status(&balancer))
    }

    #[tracing::instrument(skip_all, fields(service = svc.name_any()))]
    async fn update(&self, _cluster_name: &str, svc: &Service, nodes: &[Node]) -> SlbResult<()> {
        validate_service(svc)?;
        let name = self.name(svc)?;
        let balancer = self
            .locator()
            .find(&name)
            .await?
            .ok_or(SlbError::BalancerNotFound(name))?;
        let instances = self.resolver.instances_for_nodes(nodes).await?;
        let options = SlbOptions::from_service(svc);
        tracing::info!("Updating load balancer {}", balancer.name);
        self.sync(&balancer, svc, &options, &instances).await
    }

    #[tracing::instrument(skip_all, fields(service = svc.name_any()))]
    async fn ensure_deleted(&self, _cluster_name: &str, svc: &Service) -> SlbResult<()> {
        let name = self.name(svc)?;
        tracing::info!("Deleting load balancer {}", name);
        let Some(balancer) = self.locator().find(&name).await? else {
            tracing::info!("Load balancer {} is probably already gone. Ignoring", name);
            return Ok(());
        };
        self.client.delete_load_balancer(&balancer.id).await
    }
}
