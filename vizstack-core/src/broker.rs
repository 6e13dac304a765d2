//! The broker's global state: one `parking_lot::Mutex` wrapping the
//! inventory, session table, and X-server bookkeeping (spec §4.9), mirroring
//! the single coarse lock `wgpu-core`'s registries use around mutable state.
//! Every operation except `wait_x_state` holds the lock for its duration;
//! `wait_x_state` must drop and reacquire it while it sleeps, so it is
//! implemented as a loop around short locked polls rather than one long hold.

use std::thread;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use vizstack_proto::PeerIdentity;
use vizstack_types::{Allocation, AllocationRequest, DisplayDevice, Resource, Server, VizError, VizErrorKind, VizResult};

use crate::allocator::{self, AllocationBinding};
use crate::inventory::Inventory;
use crate::scheduler::MetaScheduler;
use crate::session::Session;
use crate::x_lifecycle::{clamp_timeout, XLifecycle};

pub struct BrokerState {
    pub inventory: Inventory,
    pub scheduler: MetaScheduler,
    pub allocations: IndexMap<u64, AllocationBinding>,
    pub next_alloc_id: u64,
    pub sessions: IndexMap<u64, Session>,
    pub next_session_id: u64,
    pub x: XLifecycle,
}

impl BrokerState {
    pub fn new(inventory: Inventory, scheduler: MetaScheduler) -> Self {
        Self {
            inventory,
            scheduler,
            allocations: IndexMap::new(),
            next_alloc_id: 1,
            sessions: IndexMap::new(),
            next_session_id: 1,
            x: XLifecycle::new(),
        }
    }
}

pub struct Broker {
    state: parking_lot::Mutex<BrokerState>,
}

impl Broker {
    pub fn new(inventory: Inventory, scheduler: MetaScheduler) -> Self {
        Self { state: parking_lot::Mutex::new(BrokerState::new(inventory, scheduler)) }
    }

    pub fn open_session(&self, peer: Option<PeerIdentity>) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_session_id;
        state.next_session_id += 1;
        state.sessions.insert(id, Session::new(id, peer));
        id
    }

    /// spec §4.8: if the session requested cleanup, release every
    /// allocation it still owns (batch reservations and X servers included,
    /// via `deallocate`'s normal path) before dropping the session record.
    pub fn close_session(&self, session_id: u64) {
        let mut state = self.state.lock();
        let Some(session) = state.sessions.get(&session_id) else { return };
        if session.cleanup_on_disconnect {
            let owned: Vec<u64> = session.owned_allocations.clone();
            for alloc_id in owned {
                release_allocation(&mut state, alloc_id);
            }
        }
        state.sessions.shift_remove(&session_id);
    }

    pub fn hello(&self, session_id: u64, cleanup_on_disconnect: bool, requires_peer: bool) -> VizResult<()> {
        let mut state = self.state.lock();
        let session = require_session_mut(&mut state, session_id)?;
        session.accept_hello(cleanup_on_disconnect, requires_peer)
    }

    pub fn allocate(&self, session_id: u64, request: &AllocationRequest) -> VizResult<Allocation> {
        let mut state = self.state.lock();
        require_session_mut(&mut state, session_id)?.require_active()?;
        let alloc_id = state.next_alloc_id;

        let binding = allocator::allocate(&mut state.inventory, &state.scheduler, alloc_id, session_id, request)?;
        let allocation = binding.allocation.clone();
        state.next_alloc_id += 1;
        state.allocations.insert(alloc_id, binding);
        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.record_allocation(alloc_id);
        }
        Ok(allocation)
    }

    /// spec §4.7: attach succeeds for the allocation's owning session or
    /// for a peer with uid 0, regardless of which session originally made
    /// the request.
    pub fn attach(&self, session_id: u64, alloc_id: u64) -> VizResult<Allocation> {
        let mut state = self.state.lock();
        require_session_mut(&mut state, session_id)?.require_active()?;
        let owner_session = state
            .allocations
            .get(&alloc_id)
            .map(|b| b.allocation.owner_session)
            .ok_or_else(|| VizError::new(VizErrorKind::ResourceUnspecified, format!("no allocation with id {alloc_id}")))?;
        let owner_uid = state
            .sessions
            .get(&owner_session)
            .and_then(|s| s.peer)
            .map(|p| p.uid);
        let allowed = {
            let session = state.sessions.get(&session_id).expect("checked by require_session_mut");
            session_id == owner_session || session.owns(owner_uid)
        };
        if !allowed {
            return Err(VizError::access_denied(format!("session does not own allocation {alloc_id}")));
        }
        let allocation = state.allocations.get(&alloc_id).unwrap().allocation.clone();
        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.record_allocation(alloc_id);
        }
        Ok(allocation)
    }

    pub fn deallocate(&self, session_id: u64, alloc_id: u64) -> VizResult<()> {
        let mut state = self.state.lock();
        require_session_mut(&mut state, session_id)?.require_active()?;
        if !state.allocations.contains_key(&alloc_id) {
            return Err(VizError::new(VizErrorKind::ResourceUnspecified, format!("no allocation with id {alloc_id}")));
        }
        release_allocation(&mut state, alloc_id);
        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.forget_allocation(alloc_id);
        }
        Ok(())
    }

    pub fn query_allocation(&self, alloc_id: u64) -> VizResult<Allocation> {
        let state = self.state.lock();
        state
            .allocations
            .get(&alloc_id)
            .map(|b| b.allocation.clone())
            .ok_or_else(|| VizError::new(VizErrorKind::ResourceUnspecified, format!("no allocation with id {alloc_id}")))
    }

    /// spec §4.3: search every configured resource against an optional
    /// template, returning every match (or everything, if no template was
    /// given).
    pub fn query_resource(&self, template: Option<&Resource>) -> Vec<Resource> {
        let state = self.state.lock();
        let mut out = Vec::new();
        for node in state.inventory.nodes.values() {
            for gpu in node.gpus.values() {
                push_if_match(&mut out, Resource::Gpu(gpu.clone()), template);
            }
            for sli in node.slis.values() {
                push_if_match(&mut out, Resource::Sli(sli.clone()), template);
            }
            for server in node.servers.values() {
                push_if_match(&mut out, Resource::Server(server.clone()), template);
            }
            for kbd in node.keyboards.values() {
                push_if_match(&mut out, Resource::Keyboard(kbd.clone()), template);
            }
            for mouse in node.mice.values() {
                push_if_match(&mut out, Resource::Mouse(mouse.clone()), template);
            }
        }
        out
    }

    pub fn get_templates(&self) -> Vec<DisplayDevice> {
        let state = self.state.lock();
        state.inventory.display_devices.values().cloned().collect()
    }

    pub fn get_serverconfig(&self, host: &str, index: u32) -> VizResult<Server> {
        let state = self.state.lock();
        state
            .inventory
            .nodes
            .get(host)
            .and_then(|n| n.servers.get(&index))
            .cloned()
            .ok_or_else(|| VizError::new(VizErrorKind::ResourceUnspecified, format!("no server {index} on host '{host}'")))
    }

    /// spec §6 `update_serverconfig`: replaces the live configuration of
    /// every server the allocation holds that matches one of the supplied
    /// elements by `(host, index)`.
    pub fn update_serverconfig(&self, alloc_id: u64, updates: &[Server]) -> VizResult<()> {
        let mut state = self.state.lock();
        if !state.allocations.contains_key(&alloc_id) {
            return Err(VizError::new(VizErrorKind::ResourceUnspecified, format!("no allocation with id {alloc_id}")));
        }
        for update in updates {
            let (host, index) = (
                update.host.clone().ok_or_else(|| VizError::incorrect_value("serverconfig update is missing a host"))?,
                update.index.ok_or_else(|| VizError::incorrect_value("serverconfig update is missing an index"))?,
            );
            let node = state
                .inventory
                .nodes
                .get_mut(&host)
                .ok_or_else(|| VizError::bad_resource(format!("no such host '{host}'")))?;
            let server = node
                .servers
                .get_mut(&index)
                .ok_or_else(|| VizError::bad_resource(format!("no server {index} on host '{host}'")))?;
            *server = update.clone();
        }
        Ok(())
    }

    pub fn stop_x_server(&self, launcher: &dyn vizstack_launcher::Launcher, host: &str, display: u32) -> VizResult<()> {
        let mut state = self.state.lock();
        state.x.stop(launcher, host, display)
    }

    pub fn start_x_server(&self, launcher: &dyn vizstack_launcher::Launcher, host: &str, display: u32) -> VizResult<()> {
        let mut state = self.state.lock();
        state.x.start(launcher, host, display)
    }

    /// spec §4.4, §4.9: polls `host:display`'s running state until it
    /// matches `new_state` or `timeout` elapses, dropping the lock between
    /// polls so other requests are not blocked for the whole wait.
    pub fn wait_x_state(&self, host: &str, display: u32, new_state: bool, timeout_secs: Option<u32>) -> VizResult<()> {
        let deadline = Instant::now() + clamp_timeout(timeout_secs);
        loop {
            let matches = {
                let mut state = self.state.lock();
                state.x.is_running(host, display) == new_state
            };
            if matches {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(VizError::new(
                    VizErrorKind::ResourceUnavailable,
                    format!("timed out waiting for {host}:{display} to reach running={new_state}"),
                ));
            }
            thread::sleep(Duration::from_millis(200));
        }
    }

    pub fn refresh_resource_groups(&self, groups: Vec<crate::inventory::ResourceGroupTemplate>) {
        let mut state = self.state.lock();
        state.inventory.resource_groups.clear();
        for group in groups {
            state.inventory.resource_groups.insert(group.name.clone(), group);
        }
    }

    /// spec §6: `refresh_resource_groups` requires uid 0.
    pub fn require_root(&self, session_id: u64) -> VizResult<()> {
        let state = self.state.lock();
        let session = state
            .sessions
            .get(&session_id)
            .ok_or_else(|| VizError::new(VizErrorKind::NotConnected, "session is no longer known to the broker"))?;
        match session.peer {
            Some(peer) if peer.is_root() => Ok(()),
            _ => Err(VizError::access_denied("this operation requires uid 0")),
        }
    }

    /// The launcher bound to an allocation's reservation, used by the
    /// dispatcher to start/stop/wait on that allocation's X servers through
    /// the same node set the scheduler granted (spec §4.5, §4.8).
    pub fn launcher_for(&self, alloc_id: u64) -> VizResult<Box<dyn vizstack_launcher::Launcher>> {
        let state = self.state.lock();
        state
            .allocations
            .get(&alloc_id)
            .map(|b| b.reservation.launcher())
            .ok_or_else(|| VizError::new(VizErrorKind::ResourceUnspecified, format!("no allocation with id {alloc_id}")))
    }
}

fn push_if_match(out: &mut Vec<Resource>, candidate: Resource, template: Option<&Resource>) {
    match template {
        Some(t) if Resource::search_match(t, &candidate) => out.push(candidate),
        Some(_) => {}
        None => out.push(candidate),
    }
}

fn require_session_mut<'a>(state: &'a mut BrokerState, session_id: u64) -> VizResult<&'a mut Session> {
    state
        .sessions
        .get_mut(&session_id)
        .ok_or_else(|| VizError::new(VizErrorKind::NotConnected, "session is no longer known to the broker"))
}

fn release_allocation(state: &mut BrokerState, alloc_id: u64) {
    if let Some(binding) = state.allocations.shift_remove(&alloc_id) {
        drop(binding);
    }
    allocator::deallocate(&mut state.inventory, alloc_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::NodeInventory;
    use crate::scheduler::LocalSchedulerAdapter;
    use vizstack_types::{Gpu, RequestItem};

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
    fn full_allocate_attach_deallocate_cycle() {
        let broker = broker_with_one_gpu();
        let session = broker.open_session(Some(PeerIdentity { uid: 1000, gid: None }));
        broker.hello(session, true, false).unwrap();

        let request = AllocationRequest { items: vec![RequestItem::Single(Resource::Gpu(Gpu::new()))], search_node: None };
        let allocation = broker.allocate(session, &request).unwrap();

        let attached = broker.attach(session, allocation.id).unwrap();
        assert_eq!(attached.id, allocation.id);

        broker.deallocate(session, allocation.id).unwrap();
        assert!(broker.query_allocation(allocation.id).is_err());
    }

    #[test]
    fn disconnect_with_cleanup_releases_owned_allocations() {
        let broker = broker_with_one_gpu();
        let session = broker.open_session(Some(PeerIdentity { uid: 1000, gid: None }));
        broker.hello(session, true, false).unwrap();
        let request = AllocationRequest { items: vec![RequestItem::Single(Resource::Gpu(Gpu::new()))], search_node: None };
        let allocation = broker.allocate(session, &request).unwrap();

        broker.close_session(session);
        assert!(broker.query_allocation(allocation.id).is_err());
    }

    #[test]
    fn other_uid_cannot_attach_to_someone_elses_allocation() {
        let broker = broker_with_one_gpu();
        let owner = broker.open_session(Some(PeerIdentity { uid: 1000, gid: None }));
        broker.hello(owner, true, false).unwrap();
        let request = AllocationRequest { items: vec![RequestItem::Single(Resource::Gpu(Gpu::new()))], search_node: None };
        let allocation = broker.allocate(owner, &request).unwrap();

        let stranger = broker.open_session(Some(PeerIdentity { uid: 2000, gid: None }));
        broker.hello(stranger, true, false).unwrap();
        let err = broker.attach(stranger, allocation.id).unwrap_err();
        assert_eq!(err.kind, VizErrorKind::AccessDenied);
    }
}
