use indexmap::IndexMap;

use crate::error::VizError;
use crate::item::Resource;
use crate::resource::{ResourceClass, ResourceIdentity};
use crate::xml::Element;

/// Aggregates all resources of one host plus host-level properties, e.g.
/// `remote_hostname` (spec §3). Used both as a request aggregate (co-locate
/// everything inside on one node) and as the shape of `query_resource`
/// answers for a whole node.
#[derive(Clone, Debug, Default)]
pub struct VizNode {
    pub host: Option<String>,
    pub properties: IndexMap<String, String>,
    pub resources: Vec<Resource>,
}

impl VizNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resources_of_class(&self, class: ResourceClass) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(move |r| r.class() == class)
    }
}

impl ResourceIdentity for VizNode {
    fn class(&self) -> ResourceClass {
        ResourceClass::VizNode
    }
    fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
    fn index(&self) -> Option<u32> {
        None
    }
    fn type_tag(&self) -> Option<&str> {
        None
    }
}

impl VizNode {
    pub const ROOT_NODE_NAME: &'static str = "node";

    pub fn to_xml(&self) -> Element {
        let mut e = Element::new(Self::ROOT_NODE_NAME);
        e.push_opt("host", self.host.clone());
        if !self.properties.is_empty() {
            let mut props = Element::new("properties");
            for (k, v) in &self.properties {
                let mut prop = Element::new("property");
                prop.push_text("key", k.clone());
                prop.push_text("value", v.clone());
                props.push(prop);
            }
            e.push(props);
        }
        for res in &self.resources {
            e.push(res.to_xml());
        }
        e
    }

    pub fn from_xml(elem: &Element) -> Result<Self, VizError> {
        let mut node = VizNode::new();
        node.host = elem.child("host").map(|c| c.text_trim().to_string());
        if let Some(props) = elem.child("properties") {
            for prop in props.children_named("property") {
                let key = prop.require_child("key")?.text_trim().to_string();
                let value = prop.require_child("value")?.text_trim().to_string();
                node.properties.insert(key, value);
            }
        }
        for child in &elem.children {
            if child.name == "host" || child.name == "properties" {
                continue;
            }
            node.resources.push(Resource::from_xml(child)?);
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::Gpu;

    #[test]
    fn round_trip_with_properties_and_resources() {
        let mut node = VizNode::new();
        node.host = Some("n0".into());
        node.properties.insert("remote_hostname".into(), "n0.cluster.example".into());
        let mut gpu = Gpu::new();
        gpu.index = Some(0);
        gpu.host = Some("n0".into());
        node.resources.push(Resource::Gpu(gpu));

        let parsed = VizNode::from_xml(&node.to_xml()).unwrap();
        assert_eq!(parsed.host.as_deref(), Some("n0"));
        assert_eq!(parsed.properties.get("remote_hostname").map(String::as_str), Some("n0.cluster.example"));
        assert_eq!(parsed.resources.len(), 1);
    }
}
