use indexmap::IndexMap;

use crate::error::VizError;
use crate::item::Resource;
use crate::resource::{ResourceClass, ResourceIdentity};
use crate::xml::Element;

/// A named aggregate plus a handler that shapes the group post-allocation
/// (spec §3). The only defined handler is `tiled_display`; its param
/// parsing and validation live in the broker core, not here — this type
/// only carries the opaque key/value pairs across the wire.
#[derive(Clone, Debug, Default)]
pub struct ResourceGroup {
    pub name: Option<String>,
    pub host: Option<String>,
    pub index: Option<u32>,
    pub handler: Option<String>,
    pub params: IndexMap<String, String>,
    /// Alternatives: the group is satisfied by any one inner `Vec`, each of
    /// which must co-locate as a unit (spec §4.6 step 1, "list-of-lists").
    pub resource_lists: Vec<Vec<Resource>>,
}

impl ResourceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// ResourceGroup overrides the base search rule to match on name and
    /// handler only (spec §4.3).
    pub fn search_match(template: &ResourceGroup, candidate: &ResourceGroup) -> bool {
        if let Some(name) = &template.name {
            if candidate.name.as_deref() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(handler) = &template.handler {
            if candidate.handler.as_deref() != Some(handler.as_str()) {
                return false;
            }
        }
        true
    }
}

impl ResourceIdentity for ResourceGroup {
    fn class(&self) -> ResourceClass {
        ResourceClass::ResourceGroup
    }
    fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
    fn index(&self) -> Option<u32> {
        self.index
    }
    fn type_tag(&self) -> Option<&str> {
        self.handler.as_deref()
    }
}

impl ResourceGroup {
    pub const ROOT_NODE_NAME: &'static str = "resourceGroup";

    pub fn to_xml(&self) -> Element {
        let mut e = Element::new(Self::ROOT_NODE_NAME);
        e.push_opt("name", self.name.clone())
            .push_opt("host", self.host.clone())
            .push_opt("index", self.index.map(|i| i.to_string()))
            .push_opt("handler", self.handler.clone());
        if !self.params.is_empty() {
            let mut params = Element::new("params");
            for (k, v) in &self.params {
                let mut param = Element::new("param");
                param.push_text("key", k.clone());
                param.push_text("value", v.clone());
                params.push(param);
            }
            e.push(params);
        }
        for list in &self.resource_lists {
            let mut alt = Element::new("alternative");
            for res in list {
                alt.push(res.to_xml());
            }
            e.push(alt);
        }
        e
    }

    pub fn from_xml(elem: &Element) -> Result<Self, VizError> {
        let mut group = ResourceGroup::new();
        group.name = elem.child("name").map(|c| c.text_trim().to_string());
        group.host = elem.child("host").map(|c| c.text_trim().to_string());
        group.index = elem.child("index").map(|c| c.parse_int()).transpose()?.map(|v| v as u32);
        group.handler = elem.child("handler").map(|c| c.text_trim().to_string());
        if let Some(params) = elem.child("params") {
            for param in params.children_named("param") {
                let key = param.require_child("key")?.text_trim().to_string();
                let value = param.require_child("value")?.text_trim().to_string();
                group.params.insert(key, value);
            }
        }
        for alt in elem.children_named("alternative") {
            let mut list = Vec::new();
            for child in &alt.children {
                list.push(Resource::from_xml(child)?);
            }
            group.resource_lists.push(list);
        }
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_match_ignores_everything_but_name_and_handler() {
        let mut template = ResourceGroup::new();
        template.name = Some("wall".into());
        template.handler = Some("tiled_display".into());

        let mut candidate = ResourceGroup::new();
        candidate.name = Some("wall".into());
        candidate.handler = Some("tiled_display".into());
        candidate.host = Some("n0".into());
        assert!(ResourceGroup::search_match(&template, &candidate));

        candidate.handler = Some("other".into());
        assert!(!ResourceGroup::search_match(&template, &candidate));
    }

    #[test]
    fn round_trip_with_params_and_alternatives() {
        let mut group = ResourceGroup::new();
        group.name = Some("wall".into());
        group.handler = Some("tiled_display".into());
        group.params.insert("num_blocks".into(), "2,1".into());
        group.resource_lists.push(vec![Resource::Gpu(crate::gpu::Gpu::new())]);

        let parsed = ResourceGroup::from_xml(&group.to_xml()).unwrap();
        assert_eq!(parsed.params.get("num_blocks").map(String::as_str), Some("2,1"));
        assert_eq!(parsed.resource_lists.len(), 1);
    }
}
