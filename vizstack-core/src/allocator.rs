//! The allocation algorithm (spec §4.6): Normalize, Rank, candidate nodes,
//! Fit, Reserve, Atomicity, Bind.

use vizstack_types::{
    Allocation, AllocationRequest, Gpu, Keyboard, Mouse, RequestItem, Resource, Server, Sli, VizError, VizResult,
};

use crate::inventory::{key_of, HeldTable, Inventory, NodeInventory, ResourceKey};
use crate::scheduler::{MetaScheduler, Reservation};
use crate::tiled_display;

/// A reservation bound to one allocation. Stored alongside the allocation
/// rather than on the resource structs themselves, since `vizstack-types`
/// carries no dependency on the launcher/scheduler crates.
pub struct AllocationBinding {
    pub allocation: Allocation,
    pub reservation: Reservation,
}

/// One request item, normalized and carrying its original position so
/// ranking ties break on input order and the bound result can be restored
/// to request order after fitting.
struct RankedItem {
    input_order: usize,
    item: RequestItem,
}

fn item_dof(item: &RequestItem) -> u32 {
    match item {
        RequestItem::Single(r) => r.dof() as u32,
        RequestItem::CoLocated(list) => list.iter().map(|r| r.dof() as u32).sum(),
        RequestItem::Node(n) => n.resources.iter().map(|r| r.dof() as u32).sum(),
        RequestItem::Group(g) => g
            .resource_lists
            .iter()
            .map(|list| list.iter().map(|r| r.dof() as u32).sum())
            .min()
            .unwrap_or(0),
    }
}

fn item_count(item: &RequestItem) -> usize {
    match item {
        RequestItem::Single(_) => 1,
        RequestItem::CoLocated(list) => list.len(),
        RequestItem::Node(n) => n.resources.len().max(1),
        RequestItem::Group(g) => g.resource_lists.iter().map(Vec::len).min().unwrap_or(0),
    }
}

/// spec §4.6 step 1: expand named `ResourceGroup` requests with no concrete
/// resource lists into the configured catalog entry. Aggregates nested
/// inside a `CoLocated` list are already unrepresentable, since `CoLocated`
/// only holds bare `Resource`s.
fn normalize(inventory: &Inventory, request: &AllocationRequest) -> VizResult<Vec<RequestItem>> {
    let mut out = Vec::with_capacity(request.items.len());
    for item in &request.items {
        match item {
            RequestItem::Group(group) if group.resource_lists.is_empty() => {
                let name = group.name.as_deref().ok_or_else(|| {
                    VizError::incorrect_value("resource group request has no name and no resource lists")
                })?;
                let template = inventory
                    .resource_groups
                    .get(name)
                    .ok_or_else(|| VizError::bad_resource(format!("no configured resource group named '{name}'")))?;
                let mut expanded = group.clone();
                expanded.handler = Some(template.handler.clone());
                expanded.params = template.params.clone();
                expanded.resource_lists = template.resource_lists.clone();
                out.push(RequestItem::Group(expanded));
            }
            other => out.push(other.clone()),
        }
    }
    Ok(out)
}

/// spec §4.6 step 2: lowest total DOF first, ties by item-count descending,
/// then input order.
fn rank(items: Vec<RequestItem>) -> Vec<RankedItem> {
    let mut ranked: Vec<RankedItem> = items
        .into_iter()
        .enumerate()
        .map(|(input_order, item)| RankedItem { input_order, item })
        .collect();
    ranked.sort_by(|a, b| {
        item_dof(&a.item)
            .cmp(&item_dof(&b.item))
            .then(item_count(&b.item).cmp(&item_count(&a.item)))
            .then(a.input_order.cmp(&b.input_order))
    });
    ranked
}

/// spec §4.6 step 3: the request's `searchNode` restriction, or every
/// configured node in walk order. Owned `String`s so the candidate list
/// doesn't hold a borrow across the later mutable hold-table updates.
fn candidate_nodes(inventory: &Inventory, search_node: &Option<Vec<String>>) -> Vec<String> {
    match search_node {
        Some(hosts) => hosts.iter().filter(|h| inventory.nodes.contains_key(h.as_str())).cloned().collect(),
        None => inventory.walk_order().to_vec(),
    }
}

fn gpu_priority(g: &Gpu) -> u8 {
    u8::from(!g.scanout_caps.is_empty())
}

/// Free, matching candidates for one template on one node, preference-
/// ordered (GPUs with non-empty scanout capability first, spec §4.6 step 4).
fn candidates_for(node: &NodeInventory, held: &HeldTable, template: &Resource) -> Vec<(ResourceKey, Resource)> {
    match template {
        Resource::Gpu(t) => {
            let mut v: Vec<(ResourceKey, Gpu)> = node
                .gpus
                .values()
                .filter(|c| Gpu::search_match(t, c))
                .filter_map(|c| key_of(&node.host, c).map(|k| (k, c.clone())))
                .filter(|(k, _)| held.is_free(k))
                .collect();
            v.sort_by_key(|(_, g)| std::cmp::Reverse(gpu_priority(g)));
            v.into_iter().map(|(k, g)| (k, Resource::Gpu(g))).collect()
        }
        Resource::Sli(t) => node
            .slis
            .values()
            .filter(|c| Sli::search_match(t, c))
            .filter_map(|c| key_of(&node.host, c).map(|k| (k, Resource::Sli(c.clone()))))
            .filter(|(k, _)| held.is_free(k))
            .collect(),
        Resource::Server(t) => node
            .servers
            .values()
            .filter(|c| Server::search_match(t, c))
            .filter_map(|c| key_of(&node.host, c).map(|k| (k, Resource::Server(c.clone()))))
            .filter(|(k, _)| held.is_free(k))
            .collect(),
        Resource::Keyboard(t) => node
            .keyboards
            .values()
            .filter(|c| Keyboard::search_match(t, c))
            .filter_map(|c| key_of(&node.host, c).map(|k| (k, Resource::Keyboard(c.clone()))))
            .filter(|(k, _)| held.is_free(k))
            .collect(),
        Resource::Mouse(t) => node
            .mice
            .values()
            .filter(|c| Mouse::search_match(t, c))
            .filter_map(|c| key_of(&node.host, c).map(|k| (k, Resource::Mouse(c.clone()))))
            .filter(|(k, _)| held.is_free(k))
            .collect(),
    }
}

/// Tries to bind every template in `templates` to distinct free resources
/// on one node, honoring holds already committed plus holds reserved
/// earlier in this same planning pass (`pending`).
fn match_list_on_node(
    node: &NodeInventory,
    held: &HeldTable,
    pending: &[ResourceKey],
    templates: &[Resource],
) -> Option<Vec<(ResourceKey, Resource)>> {
    let mut used: Vec<ResourceKey> = pending.to_vec();
    let mut bound = Vec::with_capacity(templates.len());
    for template in templates {
        let candidates = candidates_for(node, held, template);
        let (key, resource) = candidates.into_iter().find(|(k, _)| !used.contains(k))?;
        used.push(key.clone());
        bound.push((key, resource));
    }
    Some(bound)
}

/// The outcome of fitting one ranked item: which node it landed on, the
/// resource keys it consumed, and the resolved `RequestItem` to bind.
struct FitResult {
    node: String,
    keys: Vec<ResourceKey>,
    resolved: RequestItem,
}

fn fit_item(
    inventory: &Inventory,
    held: &HeldTable,
    pending: &[ResourceKey],
    nodes: &[String],
    item: &RequestItem,
) -> Option<FitResult> {
    match item {
        RequestItem::Single(template) => {
            for host in nodes {
                let node = inventory.nodes.get(host)?;
                if let Some((key, resource)) =
                    match_list_on_node(node, held, pending, std::slice::from_ref(template)).and_then(|mut v| v.pop())
                {
                    return Some(FitResult { node: host.clone(), keys: vec![key], resolved: RequestItem::Single(resource) });
                }
            }
            None
        }
        RequestItem::CoLocated(templates) => {
            for host in nodes {
                let node = inventory.nodes.get(host)?;
                if let Some(bound) = match_list_on_node(node, held, pending, templates) {
                    let keys = bound.iter().map(|(k, _)| k.clone()).collect();
                    let resolved = RequestItem::CoLocated(bound.into_iter().map(|(_, r)| r).collect());
                    return Some(FitResult { node: host.clone(), keys, resolved });
                }
            }
            None
        }
        RequestItem::Node(template) => {
            let hosts: Vec<&String> = match &template.host {
                Some(h) => nodes.iter().filter(|n| *n == h).collect(),
                None => nodes.iter().collect(),
            };
            for host in hosts {
                let node = inventory.nodes.get(host)?;
                if let Some(bound) = match_list_on_node(node, held, pending, &template.resources) {
                    let keys = bound.iter().map(|(k, _)| k.clone()).collect();
                    let mut resolved_node = template.clone();
                    resolved_node.host = Some(host.clone());
                    resolved_node.resources = bound.into_iter().map(|(_, r)| r).collect();
                    return Some(FitResult { node: host.clone(), keys, resolved: RequestItem::Node(resolved_node) });
                }
            }
            None
        }
        RequestItem::Group(group) => {
            for alternative in &group.resource_lists {
                for host in nodes {
                    let node = inventory.nodes.get(host)?;
                    if let Some(bound) = match_list_on_node(node, held, pending, alternative) {
                        let keys = bound.iter().map(|(k, _)| k.clone()).collect();
                        let mut resolved_group = group.clone();
                        resolved_group.host = Some(host.clone());
                        resolved_group.resource_lists = vec![bound.into_iter().map(|(_, r)| r).collect()];
                        return Some(FitResult { node: host.clone(), keys, resolved: RequestItem::Group(resolved_group) });
                    }
                }
            }
            None
        }
    }
}

/// Runs the full allocation algorithm against `inventory`. Holds and a
/// scheduler reservation are only taken once every item has been shown to
/// fit (spec §4.6 step 5 "Atomicity": all-or-nothing, `USER_ERROR` naming
/// the offending item).
pub fn allocate(
    inventory: &mut Inventory,
    scheduler: &MetaScheduler,
    alloc_id: u64,
    owner_session: u64,
    request: &AllocationRequest,
) -> VizResult<AllocationBinding> {
    let normalized = normalize(inventory, request)?;
    let ranked = rank(normalized);
    let nodes = candidate_nodes(inventory, &request.search_node);

    let mut pending: Vec<ResourceKey> = Vec::new();
    let mut fits: Vec<(usize, FitResult)> = Vec::with_capacity(ranked.len());

    for ranked_item in &ranked {
        match fit_item(inventory, &inventory.held, &pending, &nodes, &ranked_item.item) {
            Some(fit) => {
                pending.extend(fit.keys.iter().cloned());
                fits.push((ranked_item.input_order, fit));
            }
            None => {
                return Err(VizError::user_error(format!(
                    "could not satisfy request item: {}",
                    describe_item(&ranked_item.item)
                )));
            }
        }
    }

    let bound_nodes: std::collections::BTreeSet<String> = fits.iter().map(|(_, f)| f.node.clone()).collect();
    let bound_nodes: Vec<String> = bound_nodes.into_iter().collect();
    let reservation = scheduler.reserve(&bound_nodes)?;

    for (_, fit) in &fits {
        for key in &fit.keys {
            inventory.held.hold(key.clone(), alloc_id);
        }
    }

    fits.sort_by_key(|(order, _)| *order);
    let mut items: Vec<RequestItem> = fits.into_iter().map(|(_, f)| f.resolved).collect();

    for item in items.iter_mut() {
        if let RequestItem::Group(group) = item {
            if group.handler.as_deref() == Some("tiled_display") {
                let list = match group.resource_lists.first_mut() {
                    Some(list) => list,
                    None => {
                        roll_back(inventory, alloc_id);
                        return Err(VizError::internal("resolved resource group has no bound alternative"));
                    }
                };
                if let Err(e) = tiled_display::configure_tiled_display(group, list) {
                    roll_back(inventory, alloc_id);
                    return Err(e);
                }
            }
        }
    }

    let allocation = Allocation::new(alloc_id, owner_session, items);
    if !allocation.is_fully_resolved() {
        roll_back(inventory, alloc_id);
        return Err(VizError::internal("allocator produced an unresolved allocation"));
    }

    Ok(AllocationBinding { allocation, reservation })
}

fn roll_back(inventory: &mut Inventory, alloc_id: u64) {
    inventory.held.release_all(alloc_id);
}

fn describe_item(item: &RequestItem) -> String {
    match item {
        RequestItem::Single(r) => r.describe(),
        RequestItem::CoLocated(list) => {
            format!("co-located[{}]", list.iter().map(Resource::describe).collect::<Vec<_>>().join(", "))
        }
        RequestItem::Node(n) => format!("node {}", n.host.as_deref().unwrap_or("<any>")),
        RequestItem::Group(g) => format!("resource group '{}'", g.name.as_deref().unwrap_or("<unnamed>")),
    }
}

/// Releases every resource held by `alloc_id`. Used by deallocate and by
/// session cleanup-on-disconnect (spec §4.7, §4.8).
pub fn deallocate(inventory: &mut Inventory, alloc_id: u64) {
    inventory.held.release_all(alloc_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::NodeInventory;
    use crate::scheduler::LocalSchedulerAdapter;

    fn single_node_inventory() -> Inventory {
        let mut inv = Inventory::new();
        let mut node = NodeInventory::new("n0");
        let mut gpu0 = Gpu::new();
        gpu0.host = Some("n0".into());
        gpu0.index = Some(0);
        let mut gpu1 = Gpu::new();
        gpu1.host = Some("n0".into());
        gpu1.index = Some(1);
        node.gpus.insert(0, gpu0);
        node.gpus.insert(1, gpu1);
        inv.add_node(node);
        inv
    }

    fn local_scheduler() -> MetaScheduler {
        let adapter = Box::new(LocalSchedulerAdapter { nodes: vec!["n0".into()] });
        MetaScheduler::new(vec![adapter], &["n0".to_string()]).unwrap()
    }

    #[test]
    fn allocates_a_single_free_gpu() {
        let mut inv = single_node_inventory();
        let scheduler = local_scheduler();
        let request = AllocationRequest {
            items: vec![RequestItem::Single(Resource::Gpu(Gpu::new()))],
            search_node: None,
        };
        let binding = allocate(&mut inv, &scheduler, 1, 100, &request).unwrap();
        assert!(binding.allocation.is_fully_resolved());
        assert_eq!(binding.allocation.items.len(), 1);
    }

    #[test]
    fn second_allocation_does_not_reuse_a_held_gpu() {
        let mut inv = single_node_inventory();
        let scheduler = local_scheduler();
        let request = AllocationRequest {
            items: vec![RequestItem::Single(Resource::Gpu(Gpu::new()))],
            search_node: None,
        };
        let first = allocate(&mut inv, &scheduler, 1, 100, &request).unwrap();
        let second = allocate(&mut inv, &scheduler, 2, 100, &request).unwrap();
        let RequestItem::Single(Resource::Gpu(first_gpu)) = &first.allocation.items[0] else { panic!() };
        let RequestItem::Single(Resource::Gpu(second_gpu)) = &second.allocation.items[0] else { panic!() };
        assert_ne!(first_gpu.index, second_gpu.index);
    }

    #[test]
    fn exhausting_both_gpus_then_a_third_request_fails_atomically() {
        let mut inv = single_node_inventory();
        let scheduler = local_scheduler();
        let request = AllocationRequest {
            items: vec![RequestItem::Single(Resource::Gpu(Gpu::new()))],
            search_node: None,
        };
        allocate(&mut inv, &scheduler, 1, 100, &request).unwrap();
        allocate(&mut inv, &scheduler, 2, 100, &request).unwrap();
        let err = allocate(&mut inv, &scheduler, 3, 100, &request).unwrap_err();
        assert_eq!(err.kind, vizstack_types::VizErrorKind::UserError);
    }

    #[test]
    fn co_located_pair_lands_on_the_same_node() {
        let mut inv = single_node_inventory();
        let scheduler = local_scheduler();
        let request = AllocationRequest {
            items: vec![RequestItem::CoLocated(vec![Resource::Gpu(Gpu::new()), Resource::Gpu(Gpu::new())])],
            search_node: None,
        };
        let binding = allocate(&mut inv, &scheduler, 1, 100, &request).unwrap();
        let RequestItem::CoLocated(list) = &binding.allocation.items[0] else { panic!("expected co-located item") };
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].host(), list[1].host());
    }

    #[test]
    fn deallocate_frees_held_resources_for_reuse() {
        let mut inv = single_node_inventory();
        let scheduler = local_scheduler();
        let request = AllocationRequest {
            items: vec![RequestItem::CoLocated(vec![Resource::Gpu(Gpu::new()), Resource::Gpu(Gpu::new())])],
            search_node: None,
        };
        allocate(&mut inv, &scheduler, 1, 100, &request).unwrap();
        deallocate(&mut inv, 1);
        let binding = allocate(&mut inv, &scheduler, 2, 100, &request).unwrap();
        assert_eq!(binding.allocation.items.len(), 1);
    }
}
