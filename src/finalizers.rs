use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde_json::json;

use crate::{
    consts,
    error::{SlbError, SlbResult},
};

fn service_api(client: Client, svc: &Service) -> SlbResult<Api<Service>> {
    let namespace = svc.namespace().ok_or(SlbError::SkipService)?;
    Ok(Api::namespaced(client, &namespace))
}

/// Add finalizer to the service.
/// The balancer is only deleted once the service is gone,
/// so the service must wait for it.
pub async fn add(client: Client, svc: &Service) -> SlbResult<()> {
    let mut finalizers = svc.finalizers().to_vec();
    finalizers.push(consts::FINALIZER_NAME.to_string());
    service_api(client, svc)?
        .patch(
            svc.name_any().as_str(),
            &PatchParams::default(),
            &Patch::Merge(json!({
                "metadata": {
                    "finalizers": finalizers
                }
            })),
        )
        .await?;
    Ok(())
}

/// Check if service has the finalizer.
#[must_use]
pub fn check(svc: &Service) -> bool {
    svc.finalizers()
        .iter()
        .any(|finalizer| finalizer == consts::FINALIZER_NAME)
}

/// Remove finalizer from the service, keeping foreign ones.
///
/// Does nothing if the service does not have the finalizer.
pub async fn remove(client: Client, svc: &Service) -> SlbResult<()> {
    if !check(svc) {
        return Ok(());
    }
    let finalizers = svc
        .finalizers()
        .iter()
        .filter(|finalizer| finalizer.as_str() != consts::FINALIZER_NAME)
        .collect::<Vec<_>>();
    service_api(client, svc)?
        .patch(
            svc.name_any().as_str(),
            &PatchParams::default(),
            &Patch::Merge(json!({
                "metadata": {
                    "finalizers": finalizers
                }
            })),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_looks_for_own_finalizer_only() {
        let mut svc = Service::default();
        assert!(!check(&svc));
        svc.metadata.finalizers = Some(vec!["other/finalizer".to_string()]);
        assert!(!check(&svc));
        svc.metadata.finalizers = Some(vec![
            "other/finalizer".to_string(),
            consts::FINALIZER_NAME.to_string(),
        ]);
        assert!(check(&svc));
    }
}
