#![warn(
    // Base lints.
    clippy::all,
    // Some pedantic lints.
    clippy::pedantic,
    // New lints which are cool.
    clippy::nursery,
)]
#![
    allow(
        // I don't care about this.
        clippy::module_name_repetitions,
        // Yo, the hell you should put
        // it in docs, if signature is clear as sky.
        clippy::missing_errors_doc
    )
]

use clap::Parser;
use config::OperatorConfig;
use error::{SlbError, SlbResult};
use futures::StreamExt;
use instances::ProviderIdResolver;
use k8s_openapi::api::core::v1::{Node, Service};
use kube::{
    api::{ListParams, Patch, PatchParams},
    runtime::{controller::Action, watcher, Controller},
    Resource, ResourceExt,
};
use provider::{LoadBalancerProvider, SlbProvider};
use rpc::RpcSlbClient;
use serde_json::json;
use std::sync::Arc;

pub mod backends;
pub mod config;
pub mod consts;
pub mod error;
pub mod finalizers;
pub mod instances;
pub mod listeners;
pub mod locator;
pub mod options;
pub mod provider;
pub mod rpc;
pub mod slb;
#[cfg(test)]
mod testing;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> SlbResult<()> {
    dotenvy::dotenv().ok();
    let operator_config = config::OperatorConfig::parse();
    tracing_subscriber::fmt()
        .with_max_level(operator_config.log_level)
        .init();

    tracing::info!("Starting kubeslb operator v{}", env!("CARGO_PKG_VERSION"));
    let kube_client = kube::Client::try_default().await?;
    tracing::info!("Kube client is connected");

    let slb_client = RpcSlbClient::new(
        operator_config.endpoint.clone(),
        operator_config.access_key_id.clone(),
        operator_config.access_key_secret.clone(),
    );
    let provider = SlbProvider::new(
        slb_client,
        ProviderIdResolver,
        operator_config.region.clone(),
        operator_config.create_retry_policy(),
    );
    let context = Arc::new(CurrentContext::new(
        kube_client.clone(),
        operator_config,
        provider,
    ));
    tracing::info!("Starting the controller");
    // The controller never runs two reconciliations of the same service at
    // once, which is what the provider expects from its callers.
    Controller::new(
        kube::Api::<Service>::all(kube_client),
        watcher::Config::default(),
    )
    .run(reconcile_service, on_error, context)
    .for_each(|reconcilation_result| async move {
        match reconcilation_result {
            Ok((service, _action)) => {
                tracing::info!("Reconcilation of a service {} was successful", service.name);
            }
            Err(err) => match err {
                // During reconcilation process,
                // the controller has decided to skip the service.
                kube::runtime::controller::Error::ReconcilerFailed(SlbError::SkipService, _) => {}
                _ => {
                    tracing::error!("Error reconciling service: {:#?}", err);
                }
            },
        }
    })
    .await;
    Ok(())
}

pub type OperatorProvider = SlbProvider<RpcSlbClient, ProviderIdResolver>;

pub struct CurrentContext {
    pub client: kube::Client,
    pub config: OperatorConfig,
    pub provider: OperatorProvider,
}

impl CurrentContext {
    #[must_use]
    pub const fn new(
        client: kube::Client,
        config: OperatorConfig,
        provider: OperatorProvider,
    ) -> Self {
        Self {
            client,
            config,
            provider,
        }
    }
}

fn is_load_balancer(svc: &Service) -> bool {
    svc.spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .unwrap_or("ClusterIP")
        == "LoadBalancer"
}

/// Reconcile the service.
/// This function is called by the controller for each service.
/// It will create or update the load balancer based on the service.
/// If the service is being deleted, or is no longer of type
/// `LoadBalancer`, the balancer is deleted.
#[tracing::instrument(skip(svc, context), fields(service = svc.name_any()))]
pub async fn reconcile_service(
    svc: Arc<Service>,
    context: Arc<CurrentContext>,
) -> SlbResult<Action> {
    let cluster_name = context.config.cluster_name.as_str();
    let deleting = svc.meta().deletion_timestamp.is_some();

    if !is_load_balancer(&svc) || deleting {
        if !finalizers::check(&svc) {
            tracing::debug!("Service has no balancer to clean up. Skipping...");
            return Err(SlbError::SkipService);
        }
        tracing::info!("Cleaning up load balancer of the service");
        context.provider.ensure_deleted(cluster_name, &svc).await?;
        finalizers::remove(context.client.clone(), &svc).await?;
        return Ok(Action::await_change());
    }

    tracing::info!("Starting service reconcilation");

    // Add finalizer if it's not there yet.
    if !finalizers::check(&svc) {
        finalizers::add(context.client.clone(), &svc).await?;
    }

    let nodes = target_nodes(&context).await?;
    let status = context.provider.ensure(cluster_name, &svc, &nodes).await?;

    let svc_api = kube::Api::<Service>::namespaced(
        context.client.clone(),
        svc.namespace()
            .unwrap_or_else(|| context.client.default_namespace().to_string())
            .as_str(),
    );
    svc_api
        .patch_status(
            svc.name_any().as_str(),
            &PatchParams::default(),
            &Patch::Merge(json!({
                "status": {
                    "loadBalancer": status
                }
            })),
        )
        .await?;

    Ok(Action::requeue(context.config.requeue_after()))
}

/// Nodes that should receive traffic from balancers.
async fn target_nodes(context: &CurrentContext) -> SlbResult<Vec<Node>> {
    let nodes_api = kube::Api::<Node>::all(context.client.clone());
    let nodes = nodes_api
        .list(&ListParams::default())
        .await?
        .into_iter()
        .filter(is_target_node)
        .collect::<Vec<_>>();
    Ok(nodes)
}

/// A node is a target if it is ready and not explicitly excluded.
fn is_target_node(node: &Node) -> bool {
    if node.labels().contains_key(consts::EXCLUDE_LB_NODE_LABEL) {
        return false;
    }
    node.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == "Ready" && condition.status == "True")
        })
}

/// Handle the error during reconcilation.
#[allow(clippy::needless_pass_by_value)]
fn on_error(_: Arc<Service>, error: &SlbError, context: Arc<CurrentContext>) -> Action {
    match error {
        SlbError::SkipService => Action::await_change(),
        _ => Action::requeue(context.config.requeue_after()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus, ServiceSpec};
    use std::collections::BTreeMap;

    fn node(ready: &str, labels: &[(&str, &str)]) -> Node {
        let mut node = testing::node("worker");
        node.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        );
        node.status = Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: ready.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        node
    }

    #[test]
    fn only_ready_nodes_are_targets() {
        assert!(is_target_node(&node("True", &[])));
        assert!(!is_target_node(&node("False", &[])));
        assert!(!is_target_node(&node("Unknown", &[])));
        assert!(!is_target_node(&testing::node("fresh")));
    }

    #[test]
    fn excluded_nodes_are_not_targets() {
        assert!(!is_target_node(&node("True", &[(consts::EXCLUDE_LB_NODE_LABEL, "")])));
    }

    #[test]
    fn detects_load_balancer_services() {
        let mut svc = Service::default();
        assert!(!is_load_balancer(&svc));
        svc.spec = Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            ..Default::default()
        });
        assert!(is_load_balancer(&svc));
    }
}
