//! Startup configuration loading (spec §5): the master config (auth scheme,
//! listen addresses), the per-node resource inventory, and the named
//! resource-group catalog. All three are plain XML documents, parsed
//! through the same `vizstack_types::xml` DOM used for the wire protocol.

use vizstack_proto::AuthScheme;
use vizstack_types::xml::{self, Element};
use vizstack_types::{DisplayDevice, ResourceGroup, VizError, VizResult, VizNode};

use crate::inventory::{Inventory, NodeInventory, ResourceGroupTemplate};
use crate::scheduler::{BatchSchedulerAdapter, LocalSchedulerAdapter, MetaScheduler, SchedulerAdapter, SshSchedulerAdapter};

pub struct MasterConfig {
    pub auth_scheme: AuthScheme,
    pub socket_path: String,
    pub tcp_bind: Option<String>,
}

impl MasterConfig {
    pub fn parse(bytes: &[u8]) -> VizResult<Self> {
        let root = xml::parse(bytes)?;
        let auth_scheme = root
            .child("masterAuth")
            .map(|c| AuthScheme::parse(c.text_trim()))
            .transpose()?
            .unwrap_or(AuthScheme::None);
        let socket_path = root
            .child("socketPath")
            .map(|c| c.text_trim().to_string())
            .unwrap_or_else(|| "/tmp/vs-ssm-socket".to_string());
        let tcp_bind = root.child("tcpBind").map(|c| c.text_trim().to_string());
        Ok(MasterConfig { auth_scheme, socket_path, tcp_bind })
    }
}

/// Which scheduler kind owns a configured node, read from its `<properties>`
/// (spec §4.5). Nodes with no `scheduler` property default to `local`.
fn node_scheduler_kind(node: &Element) -> String {
    node.child("properties")
        .and_then(|props| props.children_named("property").find(|p| p.child("key").map(|k| k.text_trim()) == Some("scheduler")))
        .and_then(|p| p.child("value").map(|v| v.text_trim().to_string()))
        .unwrap_or_else(|| "local".to_string())
}

/// Parses the node inventory document (spec §5: one `<node>` per render
/// node, each carrying its concrete GPUs/SLIs/servers/keyboards/mice) and
/// splits nodes by their configured scheduler kind so a `MetaScheduler` can
/// be built alongside the `Inventory`.
pub fn load_node_config(bytes: &[u8]) -> VizResult<(Inventory, MetaScheduler)> {
    let root = xml::parse(bytes)?;
    let mut inventory = Inventory::new();
    let mut local_nodes = Vec::new();
    let mut ssh_nodes = Vec::new();
    let mut batch_nodes = Vec::new();
    let mut all_nodes = Vec::new();

    for node_elem in root.children_named(VizNode::ROOT_NODE_NAME) {
        let viz_node = VizNode::from_xml(node_elem)?;
        let host = viz_node
            .host
            .clone()
            .ok_or_else(|| VizError::bad_configuration("configured node is missing a host"))?;

        let mut node = NodeInventory::new(&host);
        for resource in viz_node.resources {
            match resource {
                vizstack_types::Resource::Gpu(g) => {
                    node.gpus.insert(g.index.ok_or_else(|| missing_index(&host, "gpu"))?, g);
                }
                vizstack_types::Resource::Sli(s) => {
                    node.slis.insert(s.index.ok_or_else(|| missing_index(&host, "sli"))?, s);
                }
                vizstack_types::Resource::Server(s) => {
                    node.servers.insert(s.index.ok_or_else(|| missing_index(&host, "server"))?, s);
                }
                vizstack_types::Resource::Keyboard(k) => {
                    node.keyboards.insert(k.index.ok_or_else(|| missing_index(&host, "keyboard"))?, k);
                }
                vizstack_types::Resource::Mouse(m) => {
                    node.mice.insert(m.index.ok_or_else(|| missing_index(&host, "mouse"))?, m);
                }
            }
        }
        inventory.add_node(node);

        all_nodes.push(host.clone());
        match node_scheduler_kind(node_elem).as_str() {
            "local" => local_nodes.push(host),
            "ssh" => ssh_nodes.push(host),
            "batch" => batch_nodes.push(host),
            other => return Err(VizError::bad_configuration(format!("unknown scheduler kind '{other}' for host"))),
        }
    }

    let mut adapters: Vec<Box<dyn SchedulerAdapter>> = Vec::new();
    if !local_nodes.is_empty() {
        adapters.push(Box::new(LocalSchedulerAdapter { nodes: local_nodes }));
    }
    if !ssh_nodes.is_empty() {
        adapters.push(Box::new(SshSchedulerAdapter { nodes: ssh_nodes }));
    }
    if !batch_nodes.is_empty() {
        adapters.push(Box::new(BatchSchedulerAdapter { nodes: batch_nodes }));
    }
    let scheduler = MetaScheduler::new(adapters, &all_nodes)?;
    Ok((inventory, scheduler))
}

fn missing_index(host: &str, class: &str) -> VizError {
    VizError::bad_configuration(format!("a {class} configured on host '{host}' has no index"))
}

/// Parses the resource-group catalog (spec §3, §4.6 step 1): each entry
/// names a handler and its parameters, plus the alternative resource lists
/// normalization expands named group requests into.
pub fn load_resource_group_config(bytes: &[u8]) -> VizResult<Vec<ResourceGroupTemplate>> {
    let root = xml::parse(bytes)?;
    let mut templates = Vec::new();
    for elem in root.children_named(ResourceGroup::ROOT_NODE_NAME) {
        let group = ResourceGroup::from_xml(elem)?;
        let name = group.name.ok_or_else(|| VizError::bad_configuration("resource group entry has no name"))?;
        let handler = group.handler.ok_or_else(|| {
            VizError::bad_configuration(format!("resource group '{name}' declares no handler"))
        })?;
        templates.push(ResourceGroupTemplate { name, handler, params: group.params, resource_lists: group.resource_lists });
    }
    Ok(templates)
}

/// Parses the display-device catalog (spec §3), served back verbatim by
/// `get_templates`.
pub fn load_display_device_config(bytes: &[u8]) -> VizResult<Vec<DisplayDevice>> {
    let root = xml::parse(bytes)?;
    let mut devices = Vec::new();
    for elem in root.children_named(DisplayDevice::ROOT_NODE_NAME) {
        devices.push(DisplayDevice::from_xml(elem)?);
    }
    Ok(devices)
}

/// Assembles a complete `Inventory` from the three configuration documents,
/// run once at startup before the broker accepts connections.
pub fn build_inventory(
    node_config: &[u8],
    resource_group_config: &[u8],
    display_device_config: &[u8],
) -> VizResult<(Inventory, MetaScheduler)> {
    let (mut inventory, scheduler) = load_node_config(node_config)?;
    for template in load_resource_group_config(resource_group_config)? {
        inventory.resource_groups.insert(template.name.clone(), template);
    }
    for device in load_display_device_config(display_device_config)? {
        inventory.display_devices.insert(device.model.clone(), device);
    }
    Ok((inventory, scheduler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_master_config_defaults() {
        let cfg = MasterConfig::parse(b"<masterconfig/>").unwrap();
        assert_eq!(cfg.auth_scheme, AuthScheme::None);
        assert_eq!(cfg.socket_path, "/tmp/vs-ssm-socket");
    }

    #[test]
    fn parses_munge_master_config() {
        let cfg = MasterConfig::parse(b"<masterconfig><masterAuth>Munge</masterAuth><tcpBind>0.0.0.0:50000</tcpBind></masterconfig>").unwrap();
        assert_eq!(cfg.auth_scheme, AuthScheme::Munge);
        assert_eq!(cfg.tcp_bind.as_deref(), Some("0.0.0.0:50000"));
    }

    #[test]
    fn loads_a_single_local_node_with_two_gpus() {
        let xml = br#"<nodeconfig>
            <node>
                <host>n0</host>
                <gpu><host>n0</host><index>0</index></gpu>
                <gpu><host>n0</host><index>1</index></gpu>
            </node>
        </nodeconfig>"#;
        let (inventory, scheduler) = load_node_config(xml).unwrap();
        assert_eq!(inventory.nodes.get("n0").unwrap().gpus.len(), 2);
        assert_eq!(scheduler.adapter_for("n0").unwrap().kind_name(), "local");
    }

    #[test]
    fn splits_nodes_across_scheduler_kinds() {
        let xml = br#"<nodeconfig>
            <node>
                <host>n0</host>
                <properties><property><key>scheduler</key><value>batch</value></property></properties>
            </node>
            <node>
                <host>n1</host>
            </node>
        </nodeconfig>"#;
        let (_inventory, scheduler) = load_node_config(xml).unwrap();
        assert_eq!(scheduler.adapter_for("n0").unwrap().kind_name(), "batch");
        assert_eq!(scheduler.adapter_for("n1").unwrap().kind_name(), "local");
    }

    #[test]
    fn loads_resource_group_catalog() {
        let xml = br#"<resourcegroups>
            <resourceGroup>
                <name>wall</name>
                <handler>tiled_display</handler>
                <params><param><key>num_blocks</key><value>2,1</value></param></params>
            </resourceGroup>
        </resourcegroups>"#;
        let templates = load_resource_group_config(xml).unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].handler, "tiled_display");
    }
}
