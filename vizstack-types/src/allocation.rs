use crate::error::VizError;
use crate::item::Resource;
use crate::resource_group::ResourceGroup;
use crate::viznode::VizNode;
use crate::xml::Element;

/// One entry of an allocation request or result (spec §4.6). Each item is
/// either a single resource template, a list of templates that must
/// co-locate on one node, or an aggregate (`VizNode` or `ResourceGroup`)
/// acting as a co-location and handler hint.
#[derive(Clone, Debug)]
pub enum RequestItem {
    Single(Resource),
    CoLocated(Vec<Resource>),
    Node(VizNode),
    Group(ResourceGroup),
}

impl RequestItem {
    /// spec §4.6 step 1: "Reject requests mixing aggregates inside a list" —
    /// a `CoLocated` list may only ever contain bare resources.
    pub fn to_xml(&self) -> Element {
        match self {
            RequestItem::Single(r) => r.to_xml(),
            RequestItem::CoLocated(list) => {
                let mut e = Element::new("coLocated");
                for r in list {
                    e.push(r.to_xml());
                }
                e
            }
            RequestItem::Node(n) => n.to_xml(),
            RequestItem::Group(g) => g.to_xml(),
        }
    }

    pub fn from_xml(elem: &Element) -> Result<Self, VizError> {
        match elem.name.as_str() {
            "coLocated" => {
                let mut list = Vec::new();
                for child in &elem.children {
                    list.push(Resource::from_xml(child)?);
                }
                Ok(RequestItem::CoLocated(list))
            }
            VizNode::ROOT_NODE_NAME => Ok(RequestItem::Node(VizNode::from_xml(elem)?)),
            ResourceGroup::ROOT_NODE_NAME => Ok(RequestItem::Group(ResourceGroup::from_xml(elem)?)),
            _ => Ok(RequestItem::Single(Resource::from_xml(elem)?)),
        }
    }
}

/// An `allocate`/`attach` request (spec §4.6): an ordered item list with an
/// optional node-set restriction.
#[derive(Clone, Debug, Default)]
pub struct AllocationRequest {
    pub items: Vec<RequestItem>,
    pub search_node: Option<Vec<String>>,
}

impl AllocationRequest {
    pub fn to_xml(&self) -> Element {
        let mut e = Element::new("request");
        if let Some(nodes) = &self.search_node {
            let mut sn = Element::new("searchNode");
            for n in nodes {
                sn.push_text("host", n.clone());
            }
            e.push(sn);
        }
        for item in &self.items {
            e.push(item.to_xml());
        }
        e
    }

    pub fn from_xml(elem: &Element) -> Result<Self, VizError> {
        let search_node = elem.child("searchNode").map(|sn| {
            sn.children_named("host").map(|h| h.text_trim().to_string()).collect()
        });
        let mut items = Vec::new();
        for child in &elem.children {
            if child.name == "searchNode" {
                continue;
            }
            items.push(RequestItem::from_xml(child)?);
        }
        Ok(AllocationRequest { items, search_node })
    }
}

/// A satisfied allocation, owned by a session, mirroring the request shape
/// with every resource fully resolved (spec §4.6 step 7).
#[derive(Clone, Debug)]
pub struct Allocation {
    pub id: u64,
    pub owner_session: u64,
    pub items: Vec<RequestItem>,
}

impl Allocation {
    pub fn new(id: u64, owner_session: u64, items: Vec<RequestItem>) -> Self {
        Self { id, owner_session, items }
    }

    /// spec §4.6 step 7 postcondition: every resource in the result is
    /// fully resolved.
    pub fn is_fully_resolved(&self) -> bool {
        self.items.iter().all(|item| match item {
            RequestItem::Single(r) => r.is_fully_resolved(),
            RequestItem::CoLocated(list) => list.iter().all(|r| r.is_fully_resolved()),
            RequestItem::Node(n) => n.resources.iter().all(|r| r.is_fully_resolved()),
            RequestItem::Group(g) => g
                .resource_lists
                .iter()
                .any(|list| list.iter().all(|r| r.is_fully_resolved())),
        })
    }

    pub fn to_xml(&self) -> Element {
        let mut e = Element::new("allocation");
        e.push_text("id", self.id.to_string());
        e.push_text("owner", self.owner_session.to_string());
        for item in &self.items {
            e.push(item.to_xml());
        }
        e
    }

    pub fn from_xml(elem: &Element) -> Result<Self, VizError> {
        let id = elem.require_child("id")?.parse_int()? as u64;
        let owner_session = elem.require_child("owner")?.parse_int()? as u64;
        let mut items = Vec::new();
        for child in &elem.children {
            if child.name == "id" || child.name == "owner" {
                continue;
            }
            items.push(RequestItem::from_xml(child)?);
        }
        Ok(Allocation { id, owner_session, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::Gpu;

    #[test]
    fn round_trip_single_item_allocation() {
        let mut gpu = Gpu::new();
        gpu.index = Some(0);
        gpu.host = Some("n0".into());
        let alloc = Allocation::new(42, 7, vec![RequestItem::Single(Resource::Gpu(gpu))]);
        assert!(alloc.is_fully_resolved());

        let parsed = Allocation::from_xml(&alloc.to_xml()).unwrap();
        assert_eq!(parsed.id, 42);
        assert_eq!(parsed.owner_session, 7);
        assert_eq!(parsed.items.len(), 1);
    }

    #[test]
    fn unresolved_co_located_item_fails_check() {
        let alloc = Allocation::new(1, 1, vec![RequestItem::CoLocated(vec![Resource::Gpu(Gpu::new())])]);
        assert!(!alloc.is_fully_resolved());
    }

    #[test]
    fn request_round_trip_with_search_node() {
        let req = AllocationRequest {
            items: vec![RequestItem::Single(Resource::Gpu(Gpu::new()))],
            search_node: Some(vec!["n0".into(), "n1".into()]),
        };
        let parsed = AllocationRequest::from_xml(&req.to_xml()).unwrap();
        assert_eq!(parsed.search_node, Some(vec!["n0".into(), "n1".into()]));
        assert_eq!(parsed.items.len(), 1);
    }
}
