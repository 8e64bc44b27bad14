use std::collections::BTreeSet;

use crate::{
    consts,
    error::SlbResult,
    slb::{BackendServer, LoadBalancer, SlbClient},
};

/// Backend membership changes, removals applied first.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BackendPlan {
    pub remove: Vec<String>,
    pub add: Vec<BackendServer>,
}

/// Diff registered backend servers against the desired instance ids.
///
/// Membership is a set: duplicates in `instances` collapse, and every
/// new server is registered at full weight.
#[must_use]
pub fn plan_backends(current: &[BackendServer], instances: &[String]) -> BackendPlan {
    let desired = instances.iter().map(String::as_str).collect::<BTreeSet<_>>();
    let mut registered = BTreeSet::new();
    let mut remove = Vec::new();
    for server in current {
        if !registered.insert(server.server_id.as_str()) {
            continue;
        }
        if !desired.contains(server.server_id.as_str()) {
            remove.push(server.server_id.clone());
        }
    }
    let add = desired
        .into_iter()
        .filter(|server_id| !registered.contains(server_id))
        .map(|server_id| BackendServer {
            server_id: server_id.to_string(),
            weight: consts::MAX_BACKEND_WEIGHT,
        })
        .collect();
    BackendPlan { remove, add }
}

/// Converge the backend servers of `balancer` to `instances`.
///
/// Each direction is a single batch call and is skipped when empty.
#[tracing::instrument(skip_all, fields(lb_id = balancer.id))]
pub async fn reconcile_backends<C: SlbClient + ?Sized>(
    client: &C,
    balancer: &LoadBalancer,
    instances: &[String],
) -> SlbResult<()> {
    let plan = plan_backends(&balancer.backend_servers, instances);
    tracing::debug!("Backend servers plan: {:?}", plan);

    if !plan.remove.is_empty() {
        tracing::info!("Removing backend servers {:?}", plan.remove);
        client
            .remove_backend_servers(&balancer.id, &plan.remove)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    "Error removing backend servers from load balancer {}: {}",
                    balancer.id,
                    err
                );
            })?;
    }

    if !plan.add.is_empty() {
        tracing::info!(
            "Adding backend servers {:?}",
            plan.add.iter().map(|s| s.server_id.as_str()).collect::<Vec<_>>()
        );
        client
            .add_backend_servers(&balancer.id, &plan.add)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    "Error adding backend servers to load balancer {}: {}",
                    balancer.id,
                    err
                );
            })?;
    }
    Ok(())
}
