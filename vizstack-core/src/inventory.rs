//! The in-memory resource inventory (spec §3): nodes and the concrete
//! resources living on them, plus the catalogs (`ResourceGroup` templates,
//! `DisplayDevice` templates) configuration supplies at start.

use indexmap::IndexMap;

use vizstack_types::{
    resource::ResourceIdentity, DisplayDevice, Gpu, Keyboard, Mouse, Resource, ResourceClass, Server, Sli,
};

/// `(class, host, index)` — inventory equality per spec §4.3.
pub type ResourceKey = (ResourceClass, String, u32);

pub fn key_of<T: ResourceIdentity>(host: &str, res: &T) -> Option<ResourceKey> {
    res.index().map(|idx| (res.class(), host.to_string(), idx))
}

/// Every concrete resource configured on one render node.
#[derive(Debug, Default)]
pub struct NodeInventory {
    pub host: String,
    pub gpus: IndexMap<u32, Gpu>,
    pub slis: IndexMap<u32, Sli>,
    pub servers: IndexMap<u32, Server>,
    pub keyboards: IndexMap<u32, Keyboard>,
    pub mice: IndexMap<u32, Mouse>,
}

impl NodeInventory {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into(), ..Default::default() }
    }
}

/// A catalog entry for a named `ResourceGroup` request that specifies no
/// concrete resources (spec §4.6 step 1: "Expand named `ResourceGroup`
/// requests ... into their canonical template resource lists").
#[derive(Clone, Debug)]
pub struct ResourceGroupTemplate {
    pub name: String,
    pub handler: String,
    pub params: IndexMap<String, String>,
    pub resource_lists: Vec<Vec<Resource>>,
}

/// Who holds what: a resource is either free or held by exactly one
/// allocation (spec §3 invariant).
#[derive(Default)]
pub struct HeldTable {
    holders: IndexMap<ResourceKey, u64>,
}

impl HeldTable {
    pub fn is_free(&self, key: &ResourceKey) -> bool {
        !self.holders.contains_key(key)
    }

    pub fn holder(&self, key: &ResourceKey) -> Option<u64> {
        self.holders.get(key).copied()
    }

    pub fn hold(&mut self, key: ResourceKey, alloc_id: u64) {
        self.holders.insert(key, alloc_id);
    }

    pub fn release(&mut self, key: &ResourceKey) {
        self.holders.remove(key);
    }

    pub fn release_all(&mut self, alloc_id: u64) {
        self.holders.retain(|_, holder| *holder != alloc_id);
    }
}

/// The daemon's complete view of the cluster: node inventories in
/// configured order (the deterministic order the allocator walks, spec
/// §4.6 step 4), plus the resource-group and display-device catalogs.
pub struct Inventory {
    pub node_order: Vec<String>,
    pub nodes: IndexMap<String, NodeInventory>,
    pub resource_groups: IndexMap<String, ResourceGroupTemplate>,
    pub display_devices: IndexMap<String, DisplayDevice>,
    pub held: HeldTable,
}

impl Inventory {
    pub fn new() -> Self {
        Self {
            node_order: Vec::new(),
            nodes: IndexMap::new(),
            resource_groups: IndexMap::new(),
            display_devices: IndexMap::new(),
            held: HeldTable::default(),
        }
    }

    pub fn add_node(&mut self, node: NodeInventory) {
        if !self.nodes.contains_key(&node.host) {
            self.node_order.push(node.host.clone());
        }
        self.nodes.insert(node.host.clone(), node);
    }

    /// Nodes in configured order, ties in the allocator's walk broken by
    /// name (spec §4.6 step 4). `node_order` is already the configured
    /// order so this is just a pass-through, kept as a named seam for the
    /// allocator to call.
    pub fn walk_order(&self) -> &[String] {
        &self.node_order
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}
