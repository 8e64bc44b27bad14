use thiserror::Error;

pub type SlbResult<T> = Result<T, SlbError>;

#[derive(Debug, Error)]
pub enum SlbError {
    #[error("Service was skipped")]
    SkipService,
    #[error("Service has no UID")]
    ServiceWithoutUid,
    #[error("Unsupported load balancer affinity: {0}")]
    UnsupportedAffinity(String),
    #[error("Unsupported service port protocol for load balancers: {0}")]
    UnsupportedPortProtocol(String),
    #[error("LoadBalancerIP can't be set for SLB load balancers")]
    LoadBalancerIpNotSupported,
    #[error("Unsupported listener protocol: {0}")]
    UnsupportedListenerProtocol(String),
    #[error("Load balancer {0} is not found")]
    BalancerNotFound(String),
    #[error("Load balancer {0} was created but never became visible")]
    BalancerNotMaterialized(String),
    #[error("Cannot find instance for node {0}")]
    InstanceNotResolved(String),
    #[error("Cannot parse integer value: {0}")]
    ParseIntError(#[from] std::num::ParseIntError),
    #[error("Cannot parse boolean value: {0}")]
    ParseBoolError(#[from] std::str::ParseBoolError),
    #[error("SLB error {code}: {message}")]
    Api { code: String, message: String },
    #[error("Cannot sign SLB request: {0}")]
    Signature(String),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Kube error: {0}")]
    KubeError(#[from] kube::Error),
}
