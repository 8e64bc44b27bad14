//! Models and client interface of the remote load-balancing service.
//!
//! Everything the reconcilers know about the remote side goes through
//! [`SlbClient`]. The HTTP implementation lives in [`crate::rpc`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SlbResult;

/// Entry returned by the region-wide listing. Carries summary data only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancerSummary {
    pub load_balancer_id: String,
    pub load_balancer_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListenerPortAndProtocol {
    pub listener_port: i32,
    pub listener_protocol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackendServer {
    pub server_id: String,
    #[serde(default)]
    pub weight: i32,
}

/// Full attribute set of a balancer, listeners and backends included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    pub region: String,
    pub address: String,
    pub internet_charge_type: String,
    pub bandwidth: i32,
    pub listeners: Vec<ListenerPortAndProtocol>,
    pub backend_servers: Vec<BackendServer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerStatus {
    Running,
    Stopped,
    Other(String),
}

impl From<&str> for ListenerStatus {
    fn from(value: &str) -> Self {
        match value {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Live attributes of a single listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerAttributes {
    pub backend_server_port: i32,
    pub status: ListenerStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateLoadBalancerArgs {
    pub region: String,
    pub name: String,
    pub address_type: String,
    pub internet_charge_type: String,
    pub bandwidth: i32,
    pub client_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TcpListenerArgs {
    pub load_balancer_id: String,
    pub listener_port: i32,
    pub backend_server_port: i32,
    pub bandwidth: i32,
    pub health_check_connect_port: i32,
    pub healthy_threshold: i32,
    pub unhealthy_threshold: i32,
    pub health_check_connect_timeout: i32,
    pub health_check_interval: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UdpListenerArgs {
    pub load_balancer_id: String,
    pub listener_port: i32,
    pub backend_server_port: i32,
    pub bandwidth: i32,
    pub health_check_connect_port: i32,
    pub healthy_threshold: i32,
    pub unhealthy_threshold: i32,
    pub health_check_connect_timeout: i32,
    pub health_check_interval: i32,
}

/// Health check part of an HTTP listener. `None` on the listener
/// disables checking entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHealthCheck {
    pub connect_port: i32,
    pub http_code: String,
    pub uri: String,
    pub timeout: i32,
    pub interval: i32,
    pub healthy_threshold: i32,
    pub unhealthy_threshold: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpListenerArgs {
    pub load_balancer_id: String,
    pub listener_port: i32,
    pub backend_server_port: i32,
    pub bandwidth: i32,
    pub sticky_session: bool,
    pub health_check: Option<HttpHealthCheck>,
}

/// Listener to create, one variant per request shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerSpec {
    Tcp(TcpListenerArgs),
    Udp(UdpListenerArgs),
    Http(HttpListenerArgs),
}

impl ListenerSpec {
    #[must_use]
    pub const fn listener_port(&self) -> i32 {
        match self {
            Self::Tcp(args) => args.listener_port,
            Self::Udp(args) => args.listener_port,
            Self::Http(args) => args.listener_port,
        }
    }

    #[must_use]
    pub const fn backend_server_port(&self) -> i32 {
        match self {
            Self::Tcp(args) => args.backend_server_port,
            Self::Udp(args) => args.backend_server_port,
            Self::Http(args) => args.backend_server_port,
        }
    }

    /// Protocol the remote service reports for a listener of this kind.
    #[must_use]
    pub const fn flavor(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Udp(_) => "udp",
            Self::Http(_) => "http",
        }
    }
}

/// Balancer registry client.
///
/// Each method is a single synchronous request/response against the
/// remote service. Errors are passed through untouched.
#[async_trait]
pub trait SlbClient: Send + Sync {
    async fn list_load_balancers(&self, region: &str) -> SlbResult<Vec<LoadBalancerSummary>>;

    async fn describe_load_balancer(&self, load_balancer_id: &str) -> SlbResult<LoadBalancer>;

    /// Returns the id of the new balancer. The balancer may not be
    /// visible to lookups for a while after this returns.
    async fn create_load_balancer(&self, args: &CreateLoadBalancerArgs) -> SlbResult<String>;

    async fn delete_load_balancer(&self, load_balancer_id: &str) -> SlbResult<()>;

    async fn start_listener(&self, load_balancer_id: &str, port: i32) -> SlbResult<()>;

    async fn delete_listener(&self, load_balancer_id: &str, port: i32) -> SlbResult<()>;

    async fn create_tcp_listener(&self, args: &TcpListenerArgs) -> SlbResult<()>;

    async fn create_udp_listener(&self, args: &UdpListenerArgs) -> SlbResult<()>;

    async fn create_http_listener(&self, args: &HttpListenerArgs) -> SlbResult<()>;

    async fn describe_tcp_listener(
        &self,
        load_balancer_id: &str,
        port: i32,
    ) -> SlbResult<ListenerAttributes>;

    async fn describe_udp_listener(
        &self,
        load_balancer_id: &str,
        port: i32,
    ) -> SlbResult<ListenerAttributes>;

    async fn describe_http_listener(
        &self,
        load_balancer_id: &str,
        port: i32,
    ) -> SlbResult<ListenerAttributes>;

    async fn add_backend_servers(
        &self,
        load_balancer_id: &str,
        servers: &[BackendServer],
    ) -> SlbResult<()>;

    async fn remove_backend_servers(
        &self,
        load_balancer_id: &str,
        server_ids: &[String],
    ) -> SlbResult<()>;
}
