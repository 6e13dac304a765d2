//! Translates decoded wire commands (spec §6) into `Broker` calls and
//! encodes the result back into a `Response`. One `Dispatcher` is shared
//! across every connection; per-connection state lives in the session id
//! the transport hands back from `open_session`.

use vizstack_proto::{Command, PeerIdentity, Response};
use vizstack_types::xml::Element;
use vizstack_types::{Allocation, RequestItem, Resource, Server, VizError, VizErrorKind, VizResult, XmlCodec};

use crate::broker::Broker;
use crate::inventory::ResourceGroupTemplate;

/// Dispatches decoded commands against a `Broker`. `reload_resource_groups`
/// is a callback rather than a fixed path so the dispatcher stays testable
/// without touching the filesystem: the `vizstack-broker` binary supplies
/// one that re-reads `rgConfigFile` from disk.
pub struct Dispatcher<'a> {
    broker: &'a Broker,
    reload_resource_groups: Box<dyn Fn() -> VizResult<Vec<ResourceGroupTemplate>> + Send + Sync + 'a>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        broker: &'a Broker,
        reload_resource_groups: impl Fn() -> VizResult<Vec<ResourceGroupTemplate>> + Send + Sync + 'a,
    ) -> Self {
        Self { broker, reload_resource_groups: Box::new(reload_resource_groups) }
    }

    pub fn open_session(&self, peer: Option<PeerIdentity>) -> u64 {
        self.broker.open_session(peer)
    }

    pub fn close_session(&self, session_id: u64) {
        self.broker.close_session(session_id);
    }

    /// Handles one decoded command for `session_id`. `requires_peer` comes
    /// from the transport: TCP connections must already carry a munge-
    /// verified peer before `hello` succeeds; the local socket is trusted
    /// without one (spec §4.2).
    pub fn dispatch(&self, session_id: u64, requires_peer: bool, command: Command) -> Response {
        match self.handle(session_id, requires_peer, command) {
            Ok(children) => Response::ok(children),
            Err(e) => Response::err(e),
        }
    }

    fn handle(&self, session_id: u64, requires_peer: bool, command: Command) -> VizResult<Vec<Element>> {
        match command {
            Command::Hello { cleanup_on_disconnect } => {
                self.broker.hello(session_id, cleanup_on_disconnect, requires_peer)?;
                Ok(Vec::new())
            }
            Command::Allocate(request) => {
                let allocation = self.broker.allocate(session_id, &request)?;
                Ok(vec![allocation.to_xml()])
            }
            Command::Attach { alloc_id } => {
                let allocation = self.broker.attach(session_id, alloc_id)?;
                Ok(vec![allocation.to_xml()])
            }
            Command::Deallocate { alloc_id } => {
                self.broker.deallocate(session_id, alloc_id)?;
                Ok(Vec::new())
            }
            Command::QueryResource { query } => {
                let template = query.as_ref().map(|e| Resource::from_xml(e)).transpose()?;
                let matches = self.broker.query_resource(template.as_ref());
                Ok(matches.into_iter().map(|r| r.to_xml()).collect())
            }
            Command::QueryAllocation { alloc_id } => {
                let allocation = self.broker.query_allocation(alloc_id)?;
                Ok(vec![allocation.to_xml()])
            }
            Command::GetTemplates { search: _ } => {
                // spec §6: get_templates's template argument narrows by
                // model/vendor, but the catalog is small enough that the
                // original always returned the full list; we match that.
                let templates = self.broker.get_templates();
                Ok(templates.into_iter().map(|t| t.to_xml()).collect())
            }
            Command::GetServerConfig { search } => {
                let template = Server::from_xml(&search)?;
                let host = template
                    .host
                    .ok_or_else(|| VizError::incorrect_value("get_serverconfig requires a host"))?;
                let index = template
                    .index
                    .ok_or_else(|| VizError::incorrect_value("get_serverconfig requires an index"))?;
                let server = self.broker.get_serverconfig(&host, index)?;
                Ok(vec![server.to_xml()])
            }
            Command::UpdateServerConfig { alloc_id, servers } => {
                let updates: Vec<Server> = servers.iter().map(Server::from_xml).collect::<VizResult<_>>()?;
                self.broker.update_serverconfig(alloc_id, &updates)?;
                Ok(Vec::new())
            }
            Command::WaitXState { alloc_id, new_state, timeout_secs, servers } => {
                let targets = self.servers_for(alloc_id, &servers)?;
                if new_state {
                    let launcher = self.broker.launcher_for(alloc_id)?;
                    for (host, display) in &targets {
                        match self.broker.start_x_server(launcher.as_ref(), host, *display) {
                            Ok(()) => {}
                            Err(e) if e.kind == VizErrorKind::ResourceBusy => {}
                            Err(e) => return Err(e),
                        }
                    }
                }
                for (host, display) in &targets {
                    self.broker.wait_x_state(host, *display, new_state, timeout_secs)?;
                }
                Ok(Vec::new())
            }
            Command::StopXServer { alloc_id, servers } => {
                let targets = self.servers_for(alloc_id, &servers)?;
                let launcher = self.broker.launcher_for(alloc_id)?;
                for (host, display) in &targets {
                    self.broker.stop_x_server(launcher.as_ref(), host, *display)?;
                }
                Ok(Vec::new())
            }
            Command::RefreshResourceGroups => {
                self.broker.require_root(session_id)?;
                let groups = (self.reload_resource_groups)()?;
                self.broker.refresh_resource_groups(groups);
                Ok(Vec::new())
            }
        }
    }

    /// Resolves the `(host, display)` pairs a `wait_x_state`/`stop_x_server`
    /// call should act on: the explicitly named servers, or — if none were
    /// given — every server in the allocation with a valid runtime
    /// configuration (spec §4.8: "for each allocated Server ... with at
    /// least one configured Screen").
    fn servers_for(&self, alloc_id: u64, explicit: &[Element]) -> VizResult<Vec<(String, u32)>> {
        if !explicit.is_empty() {
            return explicit
                .iter()
                .map(|e| {
                    let server = Server::from_xml(e)?;
                    let host = server
                        .host
                        .ok_or_else(|| VizError::incorrect_value("server template is missing a host"))?;
                    let display = server
                        .index
                        .ok_or_else(|| VizError::incorrect_value("server template is missing an index"))?;
                    Ok((host, display))
                })
                .collect();
        }
        let allocation = self.broker.query_allocation(alloc_id)?;
        Ok(allocated_servers(&allocation)
            .into_iter()
            .filter(Server::has_runtime_configuration)
            .filter_map(|s| Some((s.host?, s.index?)))
            .collect())
    }
}

fn allocated_servers(allocation: &Allocation) -> Vec<Server> {
    let mut out = Vec::new();
    for item in &allocation.items {
        collect_servers(item, &mut out);
    }
    out
}

fn collect_servers(item: &RequestItem, out: &mut Vec<Server>) {
    match item {
        RequestItem::Single(Resource::Server(s)) => out.push(s.clone()),
        RequestItem::Single(_) => {}
        RequestItem::CoLocated(list) => {
            for r in list {
                if let Resource::Server(s) = r {
                    out.push(s.clone());
                }
            }
        }
        RequestItem::Node(n) => {
            for r in &n.resources {
                if let Resource::Server(s) = r {
                    out.push(s.clone());
                }
            }
        }
        RequestItem::Group(g) => {
            for list in &g.resource_lists {
                for r in list {
                    if let Resource::Server(s) = r {
                        out.push(s.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Inventory, NodeInventory};
    use crate::scheduler::{LocalSchedulerAdapter, MetaScheduler};
    use vizstack_types::{AllocationRequest, Gpu};

    fn broker_with_one_gpu() -> Broker {
        let mut inv = Inventory::new();
        let mut node = NodeInventory::new("n0");
        let mut gpu = Gpu::new();
        gpu.host = Some("n0".into());
        gpu.index = Some(0);
        node.gpus.insert(0, gpu);
        inv.add_node(node);
        let adapter = Box::new(LocalSchedulerAdapter { nodes: vec!["n0".into()] });
        let scheduler = MetaScheduler::new(vec![adapter], &["n0".to_string()]).unwrap();
        Broker::new(inv, scheduler)
    }

    #[test]
    fn hello_then_allocate_round_trips_through_xml() {
        let broker = broker_with_one_gpu();
        let dispatcher = Dispatcher::new(&broker, || Ok(Vec::new()));
        let session = dispatcher.open_session(Some(PeerIdentity { uid: 1000, gid: None }));

        let hello = dispatcher.dispatch(session, false, Command::Hello { cleanup_on_disconnect: true });
        assert!(hello.status.is_ok());

        let request = AllocationRequest { items: vec![RequestItem::Single(Resource::Gpu(Gpu::new()))], search_node: None };
        let response = dispatcher.dispatch(session, false, Command::Allocate(request));
        let children = response.status.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "allocation");
    }

    #[test]
    fn refresh_resource_groups_requires_root() {
        let broker = broker_with_one_gpu();
        let dispatcher = Dispatcher::new(&broker, || Ok(Vec::new()));
        let session = dispatcher.open_session(Some(PeerIdentity { uid: 1000, gid: None }));
        dispatcher.dispatch(session, false, Command::Hello { cleanup_on_disconnect: true });

        let response = dispatcher.dispatch(session, false, Command::RefreshResourceGroups);
        assert_eq!(response.status.unwrap_err().kind, VizErrorKind::AccessDenied);
    }

    #[test]
    fn root_can_refresh_resource_groups() {
        let broker = broker_with_one_gpu();
        let dispatcher = Dispatcher::new(&broker, || Ok(Vec::new()));
        let session = dispatcher.open_session(Some(PeerIdentity { uid: 0, gid: None }));
        dispatcher.dispatch(session, false, Command::Hello { cleanup_on_disconnect: true });

        let response = dispatcher.dispatch(session, false, Command::RefreshResourceGroups);
        assert!(response.status.is_ok());
    }

    #[test]
    fn allocate_before_hello_is_not_connected() {
        let broker = broker_with_one_gpu();
        let dispatcher = Dispatcher::new(&broker, || Ok(Vec::new()));
        let session = dispatcher.open_session(None);
        let request = AllocationRequest { items: vec![RequestItem::Single(Resource::Gpu(Gpu::new()))], search_node: None };
        let response = dispatcher.dispatch(session, false, Command::Allocate(request));
        assert_eq!(response.status.unwrap_err().kind, VizErrorKind::NotConnected);
    }
}
