use crate::error::VizError;
use crate::resource::{base_search_match, ResourceClass, ResourceIdentity, XmlCodec};
use crate::xml::Element;

#[derive(Clone, Debug, Default)]
pub struct Mouse {
    pub index: Option<u32>,
    pub host: Option<String>,
    pub mouse_type: Option<String>,
    pub phys_addr: Option<String>,
}

impl Mouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search_match(template: &Mouse, candidate: &Mouse) -> bool {
        base_search_match(template, candidate)
    }
}

impl ResourceIdentity for Mouse {
    fn class(&self) -> ResourceClass {
        ResourceClass::Mouse
    }
    fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
    fn index(&self) -> Option<u32> {
        self.index
    }
    fn type_tag(&self) -> Option<&str> {
        self.mouse_type.as_deref()
    }
}

impl XmlCodec for Mouse {
    const ROOT_NODE_NAME: &'static str = "mouse";

    fn to_xml(&self) -> Element {
        let mut e = Element::new(Self::ROOT_NODE_NAME);
        e.push_opt("host", self.host.clone())
            .push_opt("index", self.index.map(|i| i.to_string()))
            .push_opt("type", self.mouse_type.clone())
            .push_opt("physAddr", self.phys_addr.clone());
        e
    }

    fn from_xml(elem: &Element) -> Result<Self, VizError> {
        Ok(Mouse {
            host: elem.child("host").map(|c| c.text_trim().to_string()),
            index: elem.child("index").map(|c| c.parse_int()).transpose()?.map(|v| v as u32),
            mouse_type: elem.child("type").map(|c| c.text_trim().to_string()),
            phys_addr: elem.child("physAddr").map(|c| c.text_trim().to_string()),
        })
    }
}
