//! In-memory test doubles for the remote service and the instance resolver.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Mutex,
};

use crate::{
    error::{SlbError, SlbResult},
    instances::InstanceResolver,
    slb::{
        BackendServer, CreateLoadBalancerArgs, HttpListenerArgs, ListenerAttributes,
        ListenerPortAndProtocol, ListenerSpec, LoadBalancer, LoadBalancerSummary, SlbClient,
        TcpListenerArgs, UdpListenerArgs,
    },
};

#[derive(Debug, Clone)]
struct MockListener {
    backend_port: i32,
    status: String,
}

#[derive(Debug, Clone, Default)]
struct MockBalancer {
    name: String,
    region: String,
    address: String,
    internet_charge_type: String,
    bandwidth: i32,
    listeners: BTreeMap<(i32, String), MockListener>,
    backends: Vec<BackendServer>,
}

#[derive(Debug, Default)]
struct MockState {
    balancers: BTreeMap<String, MockBalancer>,
    hidden: HashSet<String>,
    hide_for: usize,
    failing: HashSet<String>,
    calls: Vec<String>,
    mutations: Vec<String>,
    created_balancers: Vec<CreateLoadBalancerArgs>,
    created_listeners: Vec<ListenerSpec>,
}

/// Remote service double. Every call is recorded, mutating calls are
/// additionally kept in [`MockSlb::mutations`].
pub struct MockSlb {
    region: String,
    state: Mutex<MockState>,
}

impl MockSlb {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            state: Mutex::default(),
        }
    }

    pub fn add_balancer(&self, id: &str, name: &str, address: &str) {
        self.state.lock().unwrap().balancers.insert(
            id.to_string(),
            MockBalancer {
                name: name.to_string(),
                region: self.region.clone(),
                address: address.to_string(),
                ..Default::default()
            },
        );
    }

    pub fn add_listener(
        &self,
        lb_id: &str,
        port: i32,
        protocol: &str,
        backend_port: i32,
        status: &str,
    ) {
        let mut state = self.state.lock().unwrap();
        let balancer = state.balancers.get_mut(lb_id).unwrap();
        balancer.listeners.insert(
            (port, protocol.to_string()),
            MockListener {
                backend_port,
                status: status.to_string(),
            },
        );
    }

    pub fn add_backend(&self, lb_id: &str, server_id: &str) {
        let mut state = self.state.lock().unwrap();
        let balancer = state.balancers.get_mut(lb_id).unwrap();
        balancer.backends.push(BackendServer {
            server_id: server_id.to_string(),
            weight: 100,
        });
    }

    /// Keep newly created balancers out of the next `lookups` listings.
    pub fn hide_created_for(&self, lookups: usize) {
        self.state.lock().unwrap().hide_for = lookups;
    }

    /// Make every call of `method` fail with an API error coded `method`.
    pub fn fail_on(&self, method: &str) {
        self.state.lock().unwrap().failing.insert(method.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.as_str() == "list_load_balancers")
            .count()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.state.lock().unwrap().mutations.clear();
    }

    pub fn created_balancers(&self) -> Vec<CreateLoadBalancerArgs> {
        self.state.lock().unwrap().created_balancers.clone()
    }

    pub fn created_listeners(&self) -> Vec<ListenerSpec> {
        self.state.lock().unwrap().created_listeners.clone()
    }

    pub fn balancer_count(&self) -> usize {
        self.state.lock().unwrap().balancers.len()
    }

    /// Snapshot of a balancer, listeners sorted by port and protocol.
    pub fn snapshot(&self, lb_id: &str) -> LoadBalancer {
        let state = self.state.lock().unwrap();
        to_model(lb_id, &state.balancers[lb_id])
    }

    pub fn listener_status(&self, lb_id: &str, port: i32, protocol: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.balancers[lb_id]
            .listeners
            .get(&(port, protocol.to_string()))
            .map(|listener| listener.status.clone())
    }

    fn enter(&self, method: &str) -> SlbResult<std::sync::MutexGuard<'_, MockState>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(method.to_string());
        if state.failing.contains(method) {
            return Err(SlbError::Api {
                code: method.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(state)
    }

    fn describe_listener(
        &self,
        method: &str,
        lb_id: &str,
        port: i32,
        protocol: &str,
    ) -> SlbResult<ListenerAttributes> {
        let state = self.enter(method)?;
        let listener = state
            .balancers
            .get(lb_id)
            .and_then(|balancer| balancer.listeners.get(&(port, protocol.to_string())))
            .ok_or_else(|| not_found("ListenerNotExist"))?;
        Ok(ListenerAttributes {
            backend_server_port: listener.backend_port,
            status: listener.status.as_str().into(),
        })
    }

    fn insert_listener(
        &self,
        method: &str,
        spec: ListenerSpec,
        lb_id: &str,
        backend_port: i32,
    ) -> SlbResult<()> {
        let mut state = self.enter(method)?;
        let port = spec.listener_port();
        let flavor = spec.flavor();
        let balancer = state
            .balancers
            .get_mut(lb_id)
            .ok_or_else(|| not_found("InvalidLoadBalancerId.NotFound"))?;
        let transport = |protocol: &str| if protocol == "udp" { "udp" } else { "tcp" };
        if balancer
            .listeners
            .keys()
            .any(|(p, protocol)| *p == port && transport(protocol) == transport(flavor))
        {
            return Err(SlbError::Api {
                code: "ListenerAlreadyExists".to_string(),
                message: format!("listener {port} already exists"),
            });
        }
        balancer.listeners.insert(
            (port, flavor.to_string()),
            MockListener {
                backend_port,
                status: "stopped".to_string(),
            },
        );
        state.mutations.push(format!("{method} {port}->{backend_port}"));
        state.created_listeners.push(spec);
        Ok(())
    }
}

fn not_found(code: &str) -> SlbError {
    SlbError::Api {
        code: code.to_string(),
        message: "not found".to_string(),
    }
}

fn to_model(id: &str, balancer: &MockBalancer) -> LoadBalancer {
    LoadBalancer {
        id: id.to_string(),
        name: balancer.name.clone(),
        region: balancer.region.clone(),
        address: balancer.address.clone(),
        internet_charge_type: balancer.internet_charge_type.clone(),
        bandwidth: balancer.bandwidth,
        listeners: balancer
            .listeners
            .keys()
            .map(|(port, protocol)| ListenerPortAndProtocol {
                listener_port: *port,
                listener_protocol: protocol.clone(),
            })
            .collect(),
        backend_servers: balancer.backends.clone(),
    }
}

#[async_trait]
impl SlbClient for MockSlb {
    async fn list_load_balancers(&self, region: &str) -> SlbResult<Vec<LoadBalancerSummary>> {
        let mut state = self.enter("list_load_balancers")?;
        let hidden = if state.hide_for > 0 {
            state.hide_for -= 1;
            state.hidden.clone()
        } else {
            HashSet::new()
        };
        Ok(state
            .balancers
            .iter()
            .filter(|(id, balancer)| balancer.region == region && !hidden.contains(*id))
            .map(|(id, balancer)| LoadBalancerSummary {
                load_balancer_id: id.clone(),
                load_balancer_name: balancer.name.clone(),
            })
            .collect())
    }

    async fn describe_load_balancer(&self, load_balancer_id: &str) -> SlbResult<LoadBalancer> {
        let state = self.enter("describe_load_balancer")?;
        let balancer = state
            .balancers
            .get(load_balancer_id)
            .ok_or_else(|| not_found("InvalidLoadBalancerId.NotFound"))?;
        Ok(to_model(load_balancer_id, balancer))
    }

    async fn create_load_balancer(&self, args: &CreateLoadBalancerArgs) -> SlbResult<String> {
        let mut state = self.enter("create_load_balancer")?;
        let seq = state.balancers.len() + 1;
        let id = format!("lb-{seq}");
        state.balancers.insert(
            id.clone(),
            MockBalancer {
                name: args.name.clone(),
                region: args.region.clone(),
                address: format!("47.0.0.{seq}"),
                internet_charge_type: args.internet_charge_type.clone(),
                bandwidth: args.bandwidth,
                ..Default::default()
            },
        );
        state.hidden.insert(id.clone());
        state.mutations.push(format!("create_load_balancer {}", args.name));
        state.created_balancers.push(args.clone());
        Ok(id)
    }

    async fn delete_load_balancer(&self, load_balancer_id: &str) -> SlbResult<()> {
        let mut state = self.enter("delete_load_balancer")?;
        state
            .balancers
            .remove(load_balancer_id)
            .ok_or_else(|| not_found("InvalidLoadBalancerId.NotFound"))?;
        state.mutations.push(format!("delete_load_balancer {load_balancer_id}"));
        Ok(())
    }

    async fn start_listener(&self, load_balancer_id: &str, port: i32) -> SlbResult<()> {
        let mut state = self.enter("start_listener")?;
        let balancer = state
            .balancers
            .get_mut(load_balancer_id)
            .ok_or_else(|| not_found("InvalidLoadBalancerId.NotFound"))?;
        let mut found = false;
        for ((listener_port, _), listener) in &mut balancer.listeners {
            if *listener_port == port {
                listener.status = "running".to_string();
                found = true;
            }
        }
        if !found {
            return Err(not_found("ListenerNotExist"));
        }
        state.mutations.push(format!("start_listener {port}"));
        Ok(())
    }

    async fn delete_listener(&self, load_balancer_id: &str, port: i32) -> SlbResult<()> {
        let mut state = self.enter("delete_listener")?;
        let balancer = state
            .balancers
            .get_mut(load_balancer_id)
            .ok_or_else(|| not_found("InvalidLoadBalancerId.NotFound"))?;
        balancer.listeners.retain(|(listener_port, _), _| *listener_port != port);
        state.mutations.push(format!("delete_listener {port}"));
        Ok(())
    }

    async fn create_tcp_listener(&self, args: &TcpListenerArgs) -> SlbResult<()> {
        self.insert_listener(
            "create_tcp_listener",
            ListenerSpec::Tcp(args.clone()),
            &args.load_balancer_id,
            args.backend_server_port,
        )
    }

    async fn create_udp_listener(&self, args: &UdpListenerArgs) -> SlbResult<()> {
        self.insert_listener(
            "create_udp_listener",
            ListenerSpec::Udp(args.clone()),
            &args.load_balancer_id,
            args.backend_server_port,
        )
    }

    async fn create_http_listener(&self, args: &HttpListenerArgs) -> SlbResult<()> {
        self.insert_listener(
            "create_http_listener",
            ListenerSpec::Http(args.clone()),
            &args.load_balancer_id,
            args.backend_server_port,
        )
    }

    async fn describe_tcp_listener(
        &self,
        load_balancer_id: &str,
        port: i32,
    ) -> SlbResult<ListenerAttributes> {
        self.describe_listener("describe_tcp_listener", load_balancer_id, port, "tcp")
    }

    async fn describe_udp_listener(
        &self,
        load_balancer_id: &str,
        port: i32,
    ) -> SlbResult<ListenerAttributes> {
        self.describe_listener("describe_udp_listener", load_balancer_id, port, "udp")
    }

    async fn describe_http_listener(
        &self,
        load_balancer_id: &str,
        port: i32,
    ) -> SlbResult<ListenerAttributes> {
        self.describe_listener("describe_http_listener", load_balancer_id, port, "http")
    }

    async fn add_backend_servers(
        &self,
        load_balancer_id: &str,
        servers: &[BackendServer],
    ) -> SlbResult<()> {
        let mut state = self.enter("add_backend_servers")?;
        let balancer = state
            .balancers
            .get_mut(load_balancer_id)
            .ok_or_else(|| not_found("InvalidLoadBalancerId.NotFound"))?;
        for server in servers {
            if !balancer.backends.iter().any(|b| b.server_id == server.server_id) {
                balancer.backends.push(server.clone());
            }
        }
        let ids = servers.iter().map(|s| s.server_id.as_str()).collect::<Vec<_>>();
        state.mutations.push(format!("add_backend_servers {}", ids.join(",")));
        Ok(())
    }

    async fn remove_backend_servers(
        &self,
        load_balancer_id: &str,
        server_ids: &[String],
    ) -> SlbResult<()> {
        let mut state = self.enter("remove_backend_servers")?;
        let balancer = state
            .balancers
            .get_mut(load_balancer_id)
            .ok_or_else(|| not_found("InvalidLoadBalancerId.NotFound"))?;
        balancer.backends.retain(|b| !server_ids.contains(&b.server_id));
        state.mutations.push(format!("remove_backend_servers {}", server_ids.join(",")));
        Ok(())
    }
}

/// Resolves nodes through a fixed node name to instance id table.
#[derive(Default)]
pub struct StaticResolver {
    instances: HashMap<String, String>,
    calls: Mutex<usize>,
}

impl StaticResolver {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            instances: pairs
                .iter()
                .map(|(node, instance)| ((*node).to_string(), (*instance).to_string()))
                .collect(),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl InstanceResolver for StaticResolver {
    async fn instances_for_nodes(&self, nodes: &[Node]) -> SlbResult<Vec<String>> {
        *self.calls.lock().unwrap() += 1;
        nodes
            .iter()
            .map(|node| {
                self.instances
                    .get(&node.name_any())
                    .cloned()
                    .ok_or_else(|| SlbError::InstanceNotResolved(node.name_any()))
            })
            .collect()
    }
}

pub fn node(name: &str) -> Node {
    let mut node = Node::default();
    node.metadata.name = Some(name.to_string());
    node
}
