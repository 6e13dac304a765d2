//! A sum type over the concrete resource kinds, used wherever the wire
//! protocol or the allocator needs to hold a heterogeneous list of
//! resources without knowing which kind in advance: `ResourceGroup`
//! template lists, allocation request items, and allocation results.

use crate::error::VizError;
use crate::gpu::Gpu;
use crate::keyboard::Keyboard;
use crate::mouse::Mouse;
use crate::resource::{ResourceClass, ResourceIdentity, XmlCodec};
use crate::server::Server;
use crate::sli::Sli;
use crate::xml::Element;

#[derive(Clone, Debug)]
pub enum Resource {
    Gpu(Gpu),
    Sli(Sli),
    Server(Server),
    Keyboard(Keyboard),
    Mouse(Mouse),
}

impl Resource {
    pub fn class(&self) -> ResourceClass {
        match self {
            Resource::Gpu(r) => r.class(),
            Resource::Sli(r) => r.class(),
            Resource::Server(r) => r.class(),
            Resource::Keyboard(r) => r.class(),
            Resource::Mouse(r) => r.class(),
        }
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            Resource::Gpu(r) => r.host(),
            Resource::Sli(r) => r.host(),
            Resource::Server(r) => r.host(),
            Resource::Keyboard(r) => r.host(),
            Resource::Mouse(r) => r.host(),
        }
    }

    pub fn index(&self) -> Option<u32> {
        match self {
            Resource::Gpu(r) => r.index(),
            Resource::Sli(r) => r.index(),
            Resource::Server(r) => r.index(),
            Resource::Keyboard(r) => r.index(),
            Resource::Mouse(r) => r.index(),
        }
    }

    pub fn is_fully_resolved(&self) -> bool {
        match self {
            Resource::Gpu(r) => r.is_fully_resolved(),
            Resource::Sli(r) => r.is_fully_resolved(),
            Resource::Server(r) => r.is_fully_resolved(),
            Resource::Keyboard(r) => r.is_fully_resolved(),
            Resource::Mouse(r) => r.is_fully_resolved(),
        }
    }

    pub fn dof(&self) -> u8 {
        match self {
            Resource::Gpu(r) => r.dof(),
            Resource::Sli(r) => r.dof(),
            Resource::Server(r) => r.dof(),
            Resource::Keyboard(r) => r.dof(),
            Resource::Mouse(r) => r.dof(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Resource::Gpu(r) => r.describe(),
            Resource::Sli(r) => r.describe(),
            Resource::Server(r) => r.describe(),
            Resource::Keyboard(r) => r.describe(),
            Resource::Mouse(r) => r.describe(),
        }
    }

    /// Search-match dispatch (spec §4.3): delegates to each class's own
    /// rule (GPU's tri-state `useScanOut` override, everyone else the
    /// shared default), returning `false` across mismatched classes.
    pub fn search_match(template: &Resource, candidate: &Resource) -> bool {
        match (template, candidate) {
            (Resource::Gpu(t), Resource::Gpu(c)) => Gpu::search_match(t, c),
            (Resource::Sli(t), Resource::Sli(c)) => Sli::search_match(t, c),
            (Resource::Server(t), Resource::Server(c)) => Server::search_match(t, c),
            (Resource::Keyboard(t), Resource::Keyboard(c)) => Keyboard::search_match(t, c),
            (Resource::Mouse(t), Resource::Mouse(c)) => Mouse::search_match(t, c),
            _ => false,
        }
    }

    pub fn to_xml(&self) -> Element {
        match self {
            Resource::Gpu(r) => r.to_xml(),
            Resource::Sli(r) => r.to_xml(),
            Resource::Server(r) => r.to_xml(),
            Resource::Keyboard(r) => r.to_xml(),
            Resource::Mouse(r) => r.to_xml(),
        }
    }

    pub fn from_xml(elem: &Element) -> Result<Self, VizError> {
        match elem.name.as_str() {
            Gpu::ROOT_NODE_NAME => Ok(Resource::Gpu(Gpu::from_xml(elem)?)),
            Sli::ROOT_NODE_NAME => Ok(Resource::Sli(Sli::from_xml(elem)?)),
            Server::ROOT_NODE_NAME => Ok(Resource::Server(Server::from_xml(elem)?)),
            Keyboard::ROOT_NODE_NAME => Ok(Resource::Keyboard(Keyboard::from_xml(elem)?)),
            Mouse::ROOT_NODE_NAME => Ok(Resource::Mouse(Mouse::from_xml(elem)?)),
            other => Err(VizError::bad_protocol(format!("unrecognized resource element <{other}>"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_to_concrete_xml_shape() {
        let mut gpu = Gpu::new();
        gpu.index = Some(0);
        gpu.host = Some("n0".into());
        let elem = Resource::Gpu(gpu).to_xml();
        assert_eq!(elem.name, "gpu");
        let round_tripped = Resource::from_xml(&elem).unwrap();
        assert_eq!(round_tripped.host(), Some("n0"));
    }

    #[test]
    fn search_match_rejects_cross_class() {
        let gpu = Resource::Gpu(Gpu::new());
        let sli = Resource::Sli(Sli::new());
        assert!(!Resource::search_match(&gpu, &sli));
    }
}
