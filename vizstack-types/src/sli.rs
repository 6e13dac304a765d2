use crate::error::VizError;
use crate::resource::{base_search_match, ResourceClass, ResourceIdentity, XmlCodec};
use crate::xml::Element;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliKind {
    Discrete,
    Quadroplex,
}

impl SliKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SliKind::Discrete => "discrete",
            SliKind::Quadroplex => "quadroplex",
        }
    }

    pub fn parse(s: &str) -> Result<Self, VizError> {
        match s {
            "discrete" => Ok(SliKind::Discrete),
            "quadroplex" => Ok(SliKind::Quadroplex),
            other => Err(VizError::incorrect_value(format!("unknown SLI kind '{other}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliMode {
    Auto,
    Sfr,
    Afr,
    Aa,
    Mosaic,
}

impl SliMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SliMode::Auto => "auto",
            SliMode::Sfr => "SFR",
            SliMode::Afr => "AFR",
            SliMode::Aa => "AA",
            SliMode::Mosaic => "mosaic",
        }
    }

    pub fn parse(s: &str) -> Result<Self, VizError> {
        match s {
            "auto" => Ok(SliMode::Auto),
            "SFR" => Ok(SliMode::Sfr),
            "AFR" => Ok(SliMode::Afr),
            "AA" => Ok(SliMode::Aa),
            "mosaic" => Ok(SliMode::Mosaic),
            other => Err(VizError::incorrect_value(format!("unknown SLI mode '{other}'"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Sli {
    pub index: Option<u32>,
    pub host: Option<String>,
    pub gpu_indices: Option<(u32, u32)>,
    pub kind: SliKind,
    pub mode: SliMode,
}

impl Default for Sli {
    fn default() -> Self {
        Self {
            index: None,
            host: None,
            gpu_indices: None,
            kind: SliKind::Discrete,
            mode: SliMode::Auto,
        }
    }
}

impl Sli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invariant from spec §3: `mosaic` mode requires `quadroplex` kind.
    pub fn validate_invariants(&self) -> Result<(), VizError> {
        if self.mode == SliMode::Mosaic && self.kind != SliKind::Quadroplex {
            return Err(VizError::incorrect_value(
                "SLI mode 'mosaic' is only valid for kind 'quadroplex'",
            ));
        }
        Ok(())
    }
}

impl ResourceIdentity for Sli {
    fn class(&self) -> ResourceClass {
        ResourceClass::Sli
    }
    fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
    fn index(&self) -> Option<u32> {
        self.index
    }
    fn type_tag(&self) -> Option<&str> {
        Some(self.kind.as_str())
    }
}

impl Sli {
    pub fn search_match(template: &Sli, candidate: &Sli) -> bool {
        base_search_match(template, candidate)
    }
}

impl XmlCodec for Sli {
    const ROOT_NODE_NAME: &'static str = "sli";

    fn to_xml(&self) -> Element {
        let mut e = Element::new(Self::ROOT_NODE_NAME);
        e.push_opt("host", self.host.clone())
            .push_opt("index", self.index.map(|i| i.to_string()));
        if let Some((a, b)) = self.gpu_indices {
            let mut gpus = Element::new("gpus");
            gpus.push_text("a", a.to_string());
            gpus.push_text("b", b.to_string());
            e.push(gpus);
        }
        e.push_text("kind", self.kind.as_str());
        e.push_text("mode", self.mode.as_str());
        e
    }

    fn from_xml(elem: &Element) -> Result<Self, VizError> {
        let mut sli = Sli::new();
        sli.host = elem.child("host").map(|c| c.text_trim().to_string());
        sli.index = elem.child("index").map(|c| c.parse_int()).transpose()?.map(|v| v as u32);
        if let Some(gpus) = elem.child("gpus") {
            let a = gpus.require_child("a")?.parse_int()? as u32;
            let b = gpus.require_child("b")?.parse_int()? as u32;
            sli.gpu_indices = Some((a, b));
        }
        if let Some(kind) = elem.child("kind") {
            sli.kind = SliKind::parse(kind.text_trim())?;
        }
        if let Some(mode) = elem.child("mode") {
            sli.mode = SliMode::parse(mode.text_trim())?;
        }
        sli.validate_invariants()?;
        Ok(sli)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mosaic_requires_quadroplex() {
        let mut sli = Sli::new();
        sli.mode = SliMode::Mosaic;
        sli.kind = SliKind::Discrete;
        assert!(sli.validate_invariants().is_err());
        sli.kind = SliKind::Quadroplex;
        assert!(sli.validate_invariants().is_ok());
    }

    #[test]
    fn round_trip() {
        let mut sli = Sli::new();
        sli.host = Some("n0".into());
        sli.index = Some(0);
        sli.gpu_indices = Some((0, 1));
        sli.kind = SliKind::Quadroplex;
        sli.mode = SliMode::Mosaic;
        let parsed = Sli::from_xml(&sli.to_xml()).unwrap();
        assert_eq!(parsed.gpu_indices, Some((0, 1)));
        assert_eq!(parsed.mode, SliMode::Mosaic);
    }
}
