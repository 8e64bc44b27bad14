use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

use crate::error::{SlbError, SlbResult};

/// Maps cluster nodes to the compute instances backing them.
#[async_trait]
pub trait InstanceResolver: Send + Sync {
    async fn instances_for_nodes(&self, nodes: &[Node]) -> SlbResult<Vec<String>>;
}

/// Reads instance ids from the node's provider ID.
///
/// Provider IDs look like `<region>.<instance-id>`, optionally behind a
/// `scheme://` prefix. Nodes without one are assumed to be named after
/// their instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderIdResolver;

impl ProviderIdResolver {
    pub fn instance_id(node: &Node) -> SlbResult<String> {
        let provider_id = node
            .spec
            .as_ref()
            .and_then(|spec| spec.provider_id.as_deref())
            .filter(|id| !id.is_empty());
        if let Some(provider_id) = provider_id {
            let id = provider_id
                .rsplit_once("://")
                .map_or(provider_id, |(_, rest)| rest);
            let id = id.rsplit_once('.').map_or(id, |(_, instance)| instance);
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
        let name = node.name_any();
        if name.is_empty() {
            return Err(SlbError::InstanceNotResolved(
                provider_id.unwrap_or_default().to_string(),
            ));
        }
        tracing::debug!("Node {} has no provider ID, using its name", name);
        Ok(name)
    }
}

#[async_trait]
impl InstanceResolver for ProviderIdResolver {
    async fn instances_for_nodes(&self, nodes: &[Node]) -> SlbResult<Vec<String>> {
        nodes.iter().map(Self::instance_id).collect()
    }
}
