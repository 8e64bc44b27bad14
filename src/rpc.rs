//! RPC-style HTTP client for the SLB API.
//!
//! Requests are plain `GET`s whose query carries the action, its
//! parameters and an HMAC-SHA1 signature over all of them.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{de::DeserializeOwned, Deserialize};
use sha1::Sha1;
use std::collections::BTreeMap;

use crate::{
    error::{SlbError, SlbResult},
    slb::{
        BackendServer, CreateLoadBalancerArgs, HttpListenerArgs, ListenerAttributes,
        ListenerPortAndProtocol, LoadBalancer, LoadBalancerSummary, SlbClient, TcpListenerArgs,
        UdpListenerArgs,
    },
};

const API_VERSION: &str = "2014-05-15";
const PAGE_SIZE: usize = 100;

/// Everything but `A-Z a-z 0-9 - _ . ~` gets escaped.
const RPC_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

type Params = BTreeMap<String, String>;

#[must_use]
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, RPC_ENCODE_SET).to_string()
}

/// Sorted, encoded `key=value` pairs joined by `&`.
#[must_use]
pub fn canonical_query(params: &Params) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", percent_encode(key), percent_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

#[must_use]
pub fn string_to_sign(canonical_query: &str) -> String {
    format!("GET&{}&{}", percent_encode("/"), percent_encode(canonical_query))
}

pub fn sign(secret: &str, string_to_sign: &str) -> SlbResult<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(format!("{secret}&").as_bytes())
        .map_err(|err| SlbError::Signature(err.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Parameters of a single API call. Zero numbers and empty strings are
/// left out.
#[derive(Debug, Default)]
struct Request {
    params: Params,
}

impl Request {
    fn new(action: &str) -> Self {
        let mut params = Params::new();
        params.insert("Action".to_string(), action.to_string());
        Self { params }
    }

    fn str(mut self, key: &str, value: &str) -> Self {
        if !value.is_empty() {
            self.params.insert(key.to_string(), value.to_string());
        }
        self
    }

    fn int(mut self, key: &str, value: i32) -> Self {
        if value != 0 {
            self.params.insert(key.to_string(), value.to_string());
        }
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeLoadBalancersResponse {
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    load_balancers: LoadBalancerList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LoadBalancerList {
    #[serde(default)]
    load_balancer: Vec<LoadBalancerSummary>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListenerList {
    #[serde(default)]
    listener_port_and_protocol: Vec<ListenerPortAndProtocol>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BackendServerList {
    #[serde(default)]
    backend_server: Vec<BackendServer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeLoadBalancerAttributeResponse {
    load_balancer_id: String,
    load_balancer_name: String,
    #[serde(default)]
    region_id: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    internet_charge_type: String,
    #[serde(default)]
    bandwidth: i32,
    #[serde(default)]
    listener_ports_and_protocol: ListenerList,
    #[serde(default)]
    backend_servers: BackendServerList,
}

impl From<DescribeLoadBalancerAttributeResponse> for LoadBalancer {
    fn from(value: DescribeLoadBalancerAttributeResponse) -> Self {
        Self {
            id: value.load_balancer_id,
            name: value.load_balancer_name,
            region: value.region_id,
            address: value.address,
            internet_charge_type: value.internet_charge_type,
            bandwidth: value.bandwidth,
            listeners: value.listener_ports_and_protocol.listener_port_and_protocol,
            backend_servers: value.backend_servers.backend_server,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateLoadBalancerResponse {
    load_balancer_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListenerAttributeResponse {
    backend_server_port: i32,
    status: String,
}

/// Response body is not needed, only success.
#[derive(Debug, Deserialize)]
struct Empty {}

/// [`SlbClient`] talking to the SLB HTTP API.
#[derive(Debug, Clone)]
pub struct RpcSlbClient {
    http: reqwest::Client,
    endpoint: String,
    access_key_id: String,
    access_key_secret: String,
}

impl RpcSlbClient {
    pub fn new(
        endpoint: impl Into<String>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }

    /// Add the common parameters and the signature to `request`.
    fn signed_query(&self, request: Request) -> SlbResult<String> {
        let mut params = request.params;
        let common = [
            ("Format", "JSON".to_string()),
            ("Version", API_VERSION.to_string()),
            ("AccessKeyId", self.access_key_id.clone()),
            ("SignatureMethod", "HMAC-SHA1".to_string()),
            ("SignatureVersion", "1.0".to_string()),
            ("SignatureNonce", uuid::Uuid::new_v4().to_string()),
            (
                "Timestamp",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ),
        ];
        for (key, value) in common {
            params.insert(key.to_string(), value);
        }
        let query = canonical_query(&params);
        let signature = sign(&self.access_key_secret, &string_to_sign(&query))?;
        Ok(format!("{query}&Signature={}", percent_encode(&signature)))
    }

    async fn call<T: DeserializeOwned>(&self, request: Request) -> SlbResult<T> {
        let action = request.params.get("Action").cloned().unwrap_or_default();
        let url = format!("{}/?{}", self.endpoint, self.signed_query(request)?);
        tracing::debug!("Calling SLB action {}", action);
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let error = match serde_json::from_str::<ApiError>(&body) {
                Ok(error) => error,
                Err(_) => ApiError {
                    code: status.to_string(),
                    message: body,
                },
            };
            return Err(SlbError::Api {
                code: error.code,
                message: error.message,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn call_empty(&self, request: Request) -> SlbResult<()> {
        self.call::<Empty>(request).await.map(|_| ())
    }

    async fn describe_listener(
        &self,
        action: &str,
        load_balancer_id: &str,
        port: i32,
    ) -> SlbResult<ListenerAttributes> {
        let response: ListenerAttributeResponse = self
            .call(
                Request::new(action)
                    .str("LoadBalancerId", load_balancer_id)
                    .int("ListenerPort", port),
            )
            .await?;
        Ok(ListenerAttributes {
            backend_server_port: response.backend_server_port,
            status: response.status.as_str().into(),
        })
    }
}

#[async_trait]
impl SlbClient for RpcSlbClient {
    async fn list_load_balancers(&self, region: &str) -> SlbResult<Vec<LoadBalancerSummary>> {
        let mut balancers = Vec::new();
        for page in 1.. {
            let response: DescribeLoadBalancersResponse = self
                .call(
                    Request::new("DescribeLoadBalancers")
                        .str("RegionId", region)
                        .int("PageNumber", page)
                        .int("PageSize", PAGE_SIZE as i32),
                )
                .await?;
            let fetched = response.load_balancers.load_balancer.len();
            balancers.extend(response.load_balancers.load_balancer);
            if fetched < PAGE_SIZE || balancers.len() >= response.total_count {
                break;
            }
        }
        Ok(balancers)
    }

    async fn describe_load_balancer(&self, load_balancer_id: &str) -> SlbResult<LoadBalancer> {
        let response: DescribeLoadBalancerAttributeResponse = self
            .call(
                Request::new("DescribeLoadBalancerAttribute")
                    .str("LoadBalancerId", load_balancer_id),
            )
            .await?;
        Ok(response.into())
    }

    async fn create_load_balancer(&self, args: &CreateLoadBalancerArgs) -> SlbResult<String> {
        let response: CreateLoadBalancerResponse = self
            .call(
                Request::new("CreateLoadBalancer")
                    .str("RegionId", &args.region)
                    .str("LoadBalancerName", &args.name)
                    .str("AddressType", &args.address_type)
                    .str("InternetChargeType", &args.internet_charge_type)
                    .int("Bandwidth", args.bandwidth)
                    .str("ClientToken", &args.client_token),
            )
            .await?;
        Ok(response.load_balancer_id)
    }

    async fn delete_load_balancer(&self, load_balancer_id: &str) -> SlbResult<()> {
        self.call_empty(Request::new("DeleteLoadBalancer").str("LoadBalancerId", load_balancer_id))
            .await
    }

    async fn start_listener(&self, load_balancer_id: &str, port: i32) -> SlbResult<()> {
        self.call_empty(
            Request::new("StartLoadBalancerListener")
                .str("LoadBalancerId", load_balancer_id)
                .int("ListenerPort", port),
        )
        .await
    }

    async fn delete_listener(&self, load_balancer_id: &str, port: i32) -> SlbResult<()> {
        self.call_empty(
            Request::new("DeleteLoadBalancerListener")
                .str("LoadBalancerId", load_balancer_id)
                .int("ListenerPort", port),
        )
        .await
    }

    async fn create_tcp_listener(&self, args: &TcpListenerArgs) -> SlbResult<()> {
        self.call_empty(
            Request::new("CreateLoadBalancerTCPListener")
                .str("LoadBalancerId", &args.load_balancer_id)
                .int("ListenerPort", args.listener_port)
                .int("BackendServerPort", args.backend_server_port)
                .int("Bandwidth", args.bandwidth)
                .str("HealthCheckType", "tcp")
                .int("HealthCheckConnectPort", args.health_check_connect_port)
                .int("HealthyThreshold", args.healthy_threshold)
                .int("UnhealthyThreshold", args.unhealthy_threshold)
                .int("HealthCheckConnectTimeout", args.health_check_connect_timeout)
                .int("HealthCheckInterval", args.health_check_interval),
        )
        .await
    }

    async fn create_udp_listener(&self, args: &UdpListenerArgs) -> SlbResult<()> {
        self.call_empty(
            Request::new("CreateLoadBalancerUDPListener")
                .str("LoadBalancerId", &args.load_balancer_id)
                .int("ListenerPort", args.listener_port)
                .int("BackendServerPort", args.backend_server_port)
                .int("Bandwidth", args.bandwidth)
                .int("HealthCheckConnectPort", args.health_check_connect_port)
                .int("HealthyThreshold", args.healthy_threshold)
                .int("UnhealthyThreshold", args.unhealthy_threshold)
                .int("HealthCheckConnectTimeout", args.health_check_connect_timeout)
                .int("HealthCheckInterval", args.health_check_interval),
        )
        .await
    }

    async fn create_http_listener(&self, args: &HttpListenerArgs) -> SlbResult<()> {
        let mut request = Request::new("CreateLoadBalancerHTTPListener")
            .str("LoadBalancerId", &args.load_balancer_id)
            .int("ListenerPort", args.listener_port)
            .int("BackendServerPort", args.backend_server_port)
            .int("Bandwidth", args.bandwidth)
            .str("StickySession", if args.sticky_session { "on" } else { "off" });
        request = match &args.health_check {
            Some(check) => request
                .str("HealthCheck", "on")
                .int("HealthCheckConnectPort", check.connect_port)
                .str("HealthCheckHttpCode", &check.http_code)
                .str("HealthCheckURI", &check.uri)
                .int("HealthCheckTimeout", check.timeout)
                .int("HealthCheckInterval", check.interval)
                .int("HealthyThreshold", check.healthy_threshold)
                .int("UnhealthyThreshold", check.unhealthy_threshold),
            None => request.str("HealthCheck", "off"),
        };
        self.call_empty(request).await
    }

    async fn describe_tcp_listener(
        &self,
        load_balancer_id: &str,
        port: i32,
    ) -> SlbResult<ListenerAttributes> {
        self.describe_listener("DescribeLoadBalancerTCPListenerAttribute", load_balancer_id, port)
            .await
    }

    async fn describe_udp_listener(
        &self,
        load_balancer_id: &str,
        port: i32,
    ) -> SlbResult<ListenerAttributes> {
        self.describe_listener("DescribeLoadBalancerUDPListenerAttribute", load_balancer_id, port)
            .await
    }

    async fn describe_http_listener(
        &self,
        load_balancer_id: &str,
        port: i32,
    ) -> SlbResult<ListenerAttributes> {
        self.describe_listener("DescribeLoadBalancerHTTPListenerAttribute", load_balancer_id, port)
            .await
    }

    async fn add_backend_servers(
        &self,
        load_balancer_id: &str,
        servers: &[BackendServer],
    ) -> SlbResult<()> {
        self.call_empty(
            Request::new("AddBackendServers")
                .str("LoadBalancerId", load_balancer_id)
                .str("BackendServers", &serde_json::to_string(servers)?),
        )
        .await
    }

    async fn remove_backend_servers(
        &self,
        load_balancer_id: &str,
        server_ids: &[String],
    ) -> SlbResult<()> {
        self.call_empty(
            Request::new("RemoveBackendServers")
                .str("LoadBalancerId", load_balancer_id)
                .str("BackendServers", &serde_json::to_string(server_ids)?),
        )
        .await
    }
}
