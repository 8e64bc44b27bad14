use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use std::{collections::BTreeMap, str::FromStr};

use crate::{consts, error::SlbResult, slb::HttpHealthCheck};

/// Load balancer options read from service annotations.
///
/// Zero numbers and empty strings mean "not set": they are omitted from
/// remote requests, so the remote service picks its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlbOptions {
    pub internet_charge_type: String,
    pub bandwidth: i32,
    pub healthy_threshold: i32,
    pub unhealthy_threshold: i32,
    pub health_check_connect_timeout: i32,
    pub health_check_interval: i32,
    pub backend_protocol: String,
    pub http_health_check: bool,
    pub http_health_check_uri: String,
    pub http_health_check_timeout: i32,
}

impl SlbOptions {
    /// Decode options from the annotations of a service.
    ///
    /// Malformed annotations never block a reconciliation: the error is
    /// logged and default options are used instead.
    #[must_use]
    pub fn from_service(svc: &Service) -> Self {
        match Self::from_annotations(svc.annotations()) {
            Ok(options) => options,
            Err(err) => {
                tracing::warn!(
                    "Unable to extract load balancer options from service annotations: {}",
                    err
                );
                Self::default()
            }
        }
    }

    /// Decode options from an annotation map.
    /// Only keys under [`consts::ANNOTATION_PREFIX`] are considered.
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> SlbResult<Self> {
        let get = |key: &str| {
            annotations
                .get(&format!("{}{key}", consts::ANNOTATION_PREFIX))
                .map(|value| value.trim())
        };
        let get_int = |key: &str| -> SlbResult<i32> {
            Ok(get(key).map(i32::from_str).transpose()?.unwrap_or_default())
        };

        Ok(Self {
            internet_charge_type: get(consts::INTERNET_CHARGE_TYPE_ANN_NAME)
                .map(str::to_lowercase)
                .unwrap_or_default(),
            bandwidth: get_int(consts::BANDWIDTH_ANN_NAME)?,
            healthy_threshold: get_int(consts::HEALTHY_THRESHOLD_ANN_NAME)?,
            unhealthy_threshold: get_int(consts::UNHEALTHY_THRESHOLD_ANN_NAME)?,
            health_check_connect_timeout: get_int(consts::HEALTH_CHECK_CONNECT_TIMEOUT_ANN_NAME)?,
            health_check_interval: get_int(consts::HEALTH_CHECK_INTERVAL_ANN_NAME)?,
            backend_protocol: get(consts::BACKEND_PROTOCOL_ANN_NAME)
                .map(str::to_string)
                .unwrap_or_default(),
            http_health_check: get(consts::HTTP_HEALTH_CHECK_ANN_NAME)
                .map(bool::from_str)
                .transpose()?
                .unwrap_or_default(),
            http_health_check_uri: get(consts::HTTP_HEALTH_CHECK_URI_ANN_NAME)
                .map(str::to_string)
                .unwrap_or_default(),
            http_health_check_timeout: get_int(consts::HTTP_HEALTH_CHECK_TIMEOUT_ANN_NAME)?,
        })
    }

    /// TCP service ports are served by HTTP listeners when the backend
    /// protocol is `http` (case-insensitive).
    #[must_use]
    pub fn is_http_backend(&self) -> bool {
        self.backend_protocol.eq_ignore_ascii_case("http")
    }

    /// Health check for an HTTP listener forwarding to `node_port`.
    ///
    /// Returns `None` if HTTP health checking is disabled. Unset fields are
    /// filled with defaults on the returned value, `self` is left as is.
    #[must_use]
    pub fn http_health_check(&self, node_port: i32) -> Option<HttpHealthCheck> {
        if !self.http_health_check {
            return None;
        }
        let or_default = |value: i32, default: i32| if value == 0 { default } else { value };
        let uri = if self.http_health_check_uri.is_empty() {
            consts::DEFAULT_HTTP_HEALTH_CHECK_URI.to_string()
        } else {
            self.http_health_check_uri.clone()
        };
        Some(HttpHealthCheck {
            connect_port: node_port,
            http_code: consts::HTTP_HEALTHY_CODES.to_string(),
            uri,
            timeout: or_default(
                self.http_health_check_timeout,
                consts::DEFAULT_HTTP_HEALTH_CHECK_TIMEOUT,
            ),
            interval: or_default(
                self.health_check_interval,
                consts::DEFAULT_HTTP_HEALTH_CHECK_INTERVAL,
            ),
            healthy_threshold: or_default(
                self.healthy_threshold,
                consts::DEFAULT_HTTP_HEALTHY_THRESHOLD,
            ),
            unhealthy_threshold: or_default(
                self.unhealthy_threshold,
                consts::DEFAULT_HTTP_UNHEALTHY_THRESHOLD,
            ),
        })
    }
}
