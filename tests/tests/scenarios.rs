//! End-to-end scenarios against `Broker`/`Dispatcher`, no real sockets or
//! external processes involved (`vizstack_launcher::MemoryLauncher` stands
//! in for the real X-server/launch binaries).

use indexmap::IndexMap;

use vizstack_core::inventory::{Inventory, NodeInventory, ResourceGroupTemplate};
use vizstack_core::scheduler::{LocalSchedulerAdapter, MetaScheduler};
use vizstack_core::{Broker, Dispatcher};
use vizstack_launcher::MemoryLauncher;
use vizstack_proto::{Command, PeerIdentity};
use vizstack_types::{AllocationRequest, Gpu, RequestItem, Resource, ResourceGroup, Server, VizErrorKind};

fn two_gpu_one_server_broker() -> Broker {
    let mut inventory = Inventory::new();
    let mut node = NodeInventory::new("n0");
    for index in 0..2 {
        let mut gpu = Gpu::new();
        gpu.host = Some("n0".into());
        gpu.index = Some(index);
        node.gpus.insert(index, gpu);
    }
    let mut server = Server::new();
    server.host = Some("n0".into());
    server.index = Some(0);
    node.servers.insert(0, server);
    inventory.add_node(node);

    let adapter = Box::new(LocalSchedulerAdapter { nodes: vec!["n0".to_string()] });
    let scheduler = MetaScheduler::new(vec![adapter], &["n0".to_string()]).unwrap();
    Broker::new(inventory, scheduler)
}

/// Scenario 1: a client connects, allocates a GPU, runs with it, and
/// releases it; the allocation is gone afterward.
#[test]
fn single_node_allocate_run_release() {
    let broker = two_gpu_one_server_broker();
    let dispatcher = Dispatcher::new(&broker, || Ok(Vec::new()));
    let session = dispatcher.open_session(Some(PeerIdentity { uid: 1000, gid: None }));
    assert!(dispatcher.dispatch(session, false, Command::Hello { cleanup_on_disconnect: false }).status.is_ok());

    let request = AllocationRequest { items: vec![RequestItem::Single(Resource::Gpu(Gpu::new()))], search_node: None };
    let allocate = dispatcher.dispatch(session, false, Command::Allocate(request));
    let allocation_xml = allocate.status.unwrap();
    let alloc_id: u64 = allocation_xml[0].require_child("id").unwrap().parse_int().unwrap() as u64;

    let dealloc = dispatcher.dispatch(session, false, Command::Deallocate { alloc_id });
    assert!(dealloc.status.is_ok());

    let query = dispatcher.dispatch(session, false, Command::QueryAllocation { alloc_id });
    assert_eq!(query.status.unwrap_err().kind, VizErrorKind::ResourceUnspecified);
}

/// Scenario 2: a client disconnects without explicitly deallocating;
/// `cleanupOnDisconnect` releases everything it held.
#[test]
fn disconnect_cleanup_releases_allocations() {
    let broker = two_gpu_one_server_broker();
    let dispatcher = Dispatcher::new(&broker, || Ok(Vec::new()));
    let session = dispatcher.open_session(Some(PeerIdentity { uid: 1000, gid: None }));
    dispatcher.dispatch(session, false, Command::Hello { cleanup_on_disconnect: true });

    let request = AllocationRequest { items: vec![RequestItem::Single(Resource::Gpu(Gpu::new()))], search_node: None };
    let allocate = dispatcher.dispatch(session, false, Command::Allocate(request));
    let allocation_xml = allocate.status.unwrap();
    let alloc_id: u64 = allocation_xml[0].require_child("id").unwrap().parse_int().unwrap() as u64;

    dispatcher.close_session(session);

    assert!(broker.query_allocation(alloc_id).is_err());
}

/// Scenario 3: a second connection from the same uid can attach to an
/// allocation it did not itself create; an unrelated uid cannot.
#[test]
fn attach_by_owner_across_connections() {
    let broker = two_gpu_one_server_broker();
    let owner_a = Dispatcher::new(&broker, || Ok(Vec::new()));
    let session_a = owner_a.open_session(Some(PeerIdentity { uid: 1000, gid: None }));
    owner_a.dispatch(session_a, false, Command::Hello { cleanup_on_disconnect: true });
    let request = AllocationRequest { items: vec![RequestItem::Single(Resource::Gpu(Gpu::new()))], search_node: None };
    let allocate = owner_a.dispatch(session_a, false, Command::Allocate(request));
    let alloc_id: u64 = allocate.status.unwrap()[0].require_child("id").unwrap().parse_int().unwrap() as u64;

    let session_b = owner_a.open_session(Some(PeerIdentity { uid: 1000, gid: None }));
    owner_a.dispatch(session_b, false, Command::Hello { cleanup_on_disconnect: true });
    let attach = owner_a.dispatch(session_b, false, Command::Attach { alloc_id });
    assert!(attach.status.is_ok());

    let stranger = owner_a.open_session(Some(PeerIdentity { uid: 2000, gid: None }));
    owner_a.dispatch(stranger, false, Command::Hello { cleanup_on_disconnect: true });
    let denied = owner_a.dispatch(stranger, false, Command::Attach { alloc_id });
    assert_eq!(denied.status.unwrap_err().kind, VizErrorKind::AccessDenied);
}

/// Scenario 4: a request for more co-located GPUs than a node has fails
/// entirely, and leaves no partial hold behind for a later request to trip
/// over.
#[test]
fn all_or_nothing_leaves_no_partial_hold() {
    let broker = two_gpu_one_server_broker();
    let session = broker.open_session(Some(PeerIdentity { uid: 1000, gid: None }));
    broker.hello(session, true, false).unwrap();

    let too_many = AllocationRequest {
        items: vec![RequestItem::CoLocated(vec![Resource::Gpu(Gpu::new()), Resource::Gpu(Gpu::new()), Resource::Gpu(Gpu::new())])],
        search_node: None,
    };
    let err = broker.allocate(session, &too_many).unwrap_err();
    assert_eq!(err.kind, VizErrorKind::UserError);

    let both = AllocationRequest {
        items: vec![RequestItem::CoLocated(vec![Resource::Gpu(Gpu::new()), Resource::Gpu(Gpu::new())])],
        search_node: None,
    };
    let allocation = broker.allocate(session, &both).unwrap();
    assert_eq!(allocation.items.len(), 1);
}

/// Scenario 5: a named resource group backed by the `tiled_display` handler
/// expands to its catalog template and lays out one screen per GPU.
#[test]
fn tiled_display_group_request_lays_out_screens() {
    let mut inventory = Inventory::new();
    let mut node = NodeInventory::new("n0");
    for index in 0..2 {
        let mut gpu = Gpu::new();
        gpu.host = Some("n0".into());
        gpu.index = Some(index);
        node.gpus.insert(index, gpu);
    }
    let mut server = Server::new();
    server.host = Some("n0".into());
    server.index = Some(0);
    node.servers.insert(0, server);
    inventory.add_node(node);

    let mut params = IndexMap::new();
    params.insert("num_blocks".to_string(), "2,1".to_string());
    params.insert("block_type".to_string(), "gpu".to_string());
    params.insert("block_display_layout".to_string(), "1,1".to_string());
    params.insert("display_device".to_string(), "HP_LP2065".to_string());
    params.insert("tile_resolution".to_string(), "1600,1200".to_string());
    inventory.resource_groups.insert(
        "wall".to_string(),
        ResourceGroupTemplate {
            name: "wall".to_string(),
            handler: "tiled_display".to_string(),
            params,
            resource_lists: vec![vec![Resource::Server(Server::new()), Resource::Gpu(Gpu::new()), Resource::Gpu(Gpu::new())]],
        },
    );

    let adapter = Box::new(LocalSchedulerAdapter { nodes: vec!["n0".to_string()] });
    let scheduler = MetaScheduler::new(vec![adapter], &["n0".to_string()]).unwrap();
    let broker = Broker::new(inventory, scheduler);
    let session = broker.open_session(Some(PeerIdentity { uid: 1000, gid: None }));
    broker.hello(session, true, false).unwrap();

    let mut requested_group = ResourceGroup::new();
    requested_group.name = Some("wall".to_string());
    let request = AllocationRequest { items: vec![RequestItem::Group(requested_group)], search_node: None };
    let allocation = broker.allocate(session, &request).unwrap();

    let RequestItem::Group(group) = &allocation.items[0] else { panic!("expected a resolved resource group") };
    let resolved = &group.resource_lists[0];
    let Resource::Server(server) = resolved.iter().find(|r| matches!(r, Resource::Server(_))).unwrap() else {
        panic!("expected a server in the resolved group")
    };
    assert_eq!(server.screens.len(), 2);
}

/// Scenario 6: starting an X server twice on the same host within the rate
/// limit window is rejected, but stopping is always accepted.
#[test]
fn x_start_is_rate_limited_per_host() {
    let broker = two_gpu_one_server_broker();
    let launcher = MemoryLauncher::new();

    broker.start_x_server(&launcher, "n0", 0).unwrap();
    let err = broker.start_x_server(&launcher, "n0", 0).unwrap_err();
    assert_eq!(err.kind, VizErrorKind::ResourceBusy);

    assert_eq!(launcher.recorded_runs().len(), 1);
    broker.stop_x_server(&launcher, "n0", 0).unwrap();
    assert_eq!(launcher.recorded_runs().len(), 2);
}
