use k8s_openapi::api::core::v1::ServicePort;
use std::{collections::BTreeMap, fmt};

use crate::{
    error::{SlbError, SlbResult},
    options::SlbOptions,
    slb::{
        HttpListenerArgs, ListenerAttributes, ListenerPortAndProtocol, ListenerSpec,
        ListenerStatus, LoadBalancer, SlbClient, TcpListenerArgs, UdpListenerArgs,
    },
};

/// Identity of a listener: its port and protocol.
///
/// Remote-assigned identifiers never reach the desired state, so this
/// is the only way to correlate a service port with a remote listener.
/// HTTP listeners are keyed as `tcp`, since HTTP runs on top of it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerKey {
    pub port: i32,
    pub protocol: String,
}

impl ListenerKey {
    #[must_use]
    pub fn new(port: i32, protocol: &str) -> Self {
        let protocol = protocol.to_lowercase();
        let protocol = if protocol == "http" {
            "tcp".to_string()
        } else {
            protocol
        };
        Self { port, protocol }
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.port, self.protocol)
    }
}

/// Remote calls needed to converge listeners, in application order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListenerPlan {
    pub start: Vec<i32>,
    pub delete: Vec<i32>,
    pub create: Vec<ListenerSpec>,
}

impl ListenerPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start.is_empty() && self.delete.is_empty() && self.create.is_empty()
    }
}

/// Build the listener that should serve a service port.
///
/// TCP ports become HTTP listeners when the backend protocol option is
/// `http`. Health checks connect to the node port.
pub fn listener_spec(
    load_balancer_id: &str,
    port: i32,
    protocol: &str,
    node_port: i32,
    options: &SlbOptions,
) -> SlbResult<ListenerSpec> {
    let spec = match protocol.to_lowercase().as_str() {
        "udp" => ListenerSpec::Udp(UdpListenerArgs {
            load_balancer_id: load_balancer_id.to_string(),
            listener_port: port,
            backend_server_port: node_port,
            bandwidth: options.bandwidth,
            health_check_connect_port: node_port,
            healthy_threshold: options.healthy_threshold,
            unhealthy_threshold: options.unhealthy_threshold,
            health_check_connect_timeout: options.health_check_connect_timeout,
            health_check_interval: options.health_check_interval,
        }),
        "tcp" if options.is_http_backend() => ListenerSpec::Http(HttpListenerArgs {
            load_balancer_id: load_balancer_id.to_string(),
            listener_port: port,
            backend_server_port: node_port,
            bandwidth: options.bandwidth,
            sticky_session: false,
            health_check: options.http_health_check(node_port),
        }),
        "tcp" => ListenerSpec::Tcp(TcpListenerArgs {
            load_balancer_id: load_balancer_id.to_string(),
            listener_port: port,
            backend_server_port: node_port,
            bandwidth: options.bandwidth,
            health_check_connect_port: node_port,
            healthy_threshold: options.healthy_threshold,
            unhealthy_threshold: options.unhealthy_threshold,
            health_check_connect_timeout: options.health_check_connect_timeout,
            health_check_interval: options.health_check_interval,
        }),
        _ => return Err(SlbError::UnsupportedListenerProtocol(protocol.to_string())),
    };
    Ok(spec)
}

/// Index the listeners wanted by `ports` by their key.
///
/// Ports without a node port have nothing to forward to and are skipped.
pub fn desired_listeners(
    load_balancer_id: &str,
    ports: &[ServicePort],
    options: &SlbOptions,
) -> SlbResult<BTreeMap<ListenerKey, ListenerSpec>> {
    let mut desired = BTreeMap::new();
    for port in ports {
        let protocol = port.protocol.as_deref().unwrap_or("TCP");
        let node_port = port.node_port.unwrap_or_default();
        if node_port == 0 {
            tracing::info!(
                "Ignored service port {}/{} with no node port while syncing listeners",
                port.port,
                protocol
            );
            continue;
        }
        desired.insert(
            ListenerKey::new(port.port, protocol),
            listener_spec(load_balancer_id, port.port, protocol, node_port, options)?,
        );
    }
    Ok(desired)
}

/// Converges the listeners of one balancer.
pub struct ListenerReconciler<'a, C: ?Sized> {
    client: &'a C,
    balancer: &'a LoadBalancer,
    options: &'a SlbOptions,
}

impl<'a, C: SlbClient + ?Sized> ListenerReconciler<'a, C> {
    pub const fn new(client: &'a C, balancer: &'a LoadBalancer, options: &'a SlbOptions) -> Self {
        Self {
            client,
            balancer,
            options,
        }
    }

    /// Bring the balancer's listeners in line with `ports`.
    ///
    /// Stopped listeners are started, stale ones deleted, missing ones
    /// created and started, in that order. A listener whose backend port
    /// changed is deleted and created again, together with any other
    /// listener on the same port. The first failing remote call aborts
    /// the pass.
    #[tracing::instrument(skip_all, fields(lb_id = self.balancer.id))]
    pub async fn reconcile(&self, ports: &[ServicePort]) -> SlbResult<()> {
        let plan = self.plan(ports).await?;
        tracing::info!(
            "Existing listeners: {:?}, removing {:?}, starting {:?}, creating {:?}",
            self.balancer.listeners,
            plan.delete,
            plan.start,
            plan.create
                .iter()
                .map(|spec| spec.listener_port())
                .collect::<Vec<_>>(),
        );
        self.apply(plan).await
    }

    /// Diff current listeners against `ports`.
    ///
    /// Only reads from the remote service.
    pub async fn plan(&self, ports: &[ServicePort]) -> SlbResult<ListenerPlan> {
        let mut desired = desired_listeners(&self.balancer.id, ports, self.options)?;
        let mut plan = ListenerPlan::default();
        let mut kept = Vec::new();

        for listener in &self.balancer.listeners {
            let key = ListenerKey::new(listener.listener_port, &listener.listener_protocol);
            tracing::debug!("Existing listener: {}", key);
            if let Some(spec) = desired.get(&key) {
                let attributes = self.attributes(listener).await.inspect_err(|err| {
                    tracing::error!(
                        "Error getting backend server port while syncing listeners: {}",
                        err
                    );
                })?;
                let same_flavor = listener.listener_protocol.eq_ignore_ascii_case(spec.flavor());
                if same_flavor && attributes.backend_server_port == spec.backend_server_port() {
                    kept.push((key, attributes.status == ListenerStatus::Stopped));
                    continue;
                }
            }
            if !plan.delete.contains(&listener.listener_port) {
                plan.delete.push(listener.listener_port);
            }
        }

        for (key, stopped) in kept {
            // Deletion removes every listener on the port, so a kept
            // neighbour stays desired and is created again.
            if plan.delete.contains(&key.port) {
                tracing::debug!("Listener {} shares a deleted port, recreating", key);
                continue;
            }
            if stopped {
                plan.start.push(key.port);
            }
            desired.remove(&key);
        }

        plan.create = desired.into_values().collect();
        Ok(plan)
    }

    pub async fn apply(&self, plan: ListenerPlan) -> SlbResult<()> {
        let lb_id = &self.balancer.id;
        for port in plan.start {
            tracing::info!("Starting stopped listener on port {}", port);
            self.client
                .start_listener(lb_id, port)
                .await
                .inspect_err(|err| tracing::error!("Error starting listener: {}", err))?;
        }

        for port in plan.delete {
            tracing::info!("Deleting listener on port {}", port);
            self.client
                .delete_listener(lb_id, port)
                .await
                .inspect_err(|err| tracing::error!("Error deleting listener: {}", err))?;
        }

        for spec in plan.create {
            let port = spec.listener_port();
            tracing::info!(
                "Creating {} listener on port {} forwarding to {}",
                spec.flavor(),
                port,
                spec.backend_server_port()
            );
            let created = match &spec {
                ListenerSpec::Tcp(args) => self.client.create_tcp_listener(args).await,
                ListenerSpec::Udp(args) => self.client.create_udp_listener(args).await,
                ListenerSpec::Http(args) => self.client.create_http_listener(args).await,
            };
            created.inspect_err(|err| {
                tracing::error!("Error creating listener for port {}: {}", port, err);
            })?;
            self.client
                .start_listener(lb_id, port)
                .await
                .inspect_err(|err| {
                    tracing::error!("Error starting listener for port {}: {}", port, err);
                })?;
        }
        Ok(())
    }

    async fn attributes(
        &self,
        listener: &ListenerPortAndProtocol,
    ) -> SlbResult<ListenerAttributes> {
        let lb_id = &self.balancer.id;
        let port = listener.listener_port;
        match listener.listener_protocol.to_lowercase().as_str() {
            "tcp" => self.client.describe_tcp_listener(lb_id, port).await,
            "udp" => self.client.describe_udp_listener(lb_id, port).await,
            "http" => self.client.describe_http_listener(lb_id, port).await,
            _ => Err(SlbError::UnsupportedListenerProtocol(
                listener.listener_protocol.clone(),
            )),
        }
    }
}
