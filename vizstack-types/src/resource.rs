use crate::xml::Element;

/// The eight resource classes named in spec §3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Gpu,
    Sli,
    Server,
    Keyboard,
    Mouse,
    ResourceGroup,
    VizNode,
    DisplayDevice,
}

impl ResourceClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceClass::Gpu => "GPU",
            ResourceClass::Sli => "SLI",
            ResourceClass::Server => "Server",
            ResourceClass::Keyboard => "Keyboard",
            ResourceClass::Mouse => "Mouse",
            ResourceClass::ResourceGroup => "ResourceGroup",
            ResourceClass::VizNode => "VizNode",
            ResourceClass::DisplayDevice => "DisplayDevice",
        }
    }
}

/// Degrees of freedom left for the allocator, per spec §4.3: `+1` if host
/// is unspecified, `+2` if index is unspecified, `0` if both are set.
/// Mirrors `VizResource.getAllocationDOF` in the original implementation.
pub fn dof(host_set: bool, index_set: bool) -> u8 {
    let mut ret = 0u8;
    if !index_set {
        ret += 2;
    }
    if !host_set {
        ret += 1;
    }
    ret
}

/// Common identity fields every resource carries (spec §3).
///
/// Implemented by each concrete resource type (`Gpu`, `Sli`, `Server`, ...)
/// so the allocator and inventory can reason about them uniformly without
/// downcasting, the way `VizResource` is the common base the original
/// resource classes inherit from.
pub trait ResourceIdentity {
    fn class(&self) -> ResourceClass;
    fn host(&self) -> Option<&str>;
    fn index(&self) -> Option<u32>;
    fn type_tag(&self) -> Option<&str>;

    /// A resource is "fully resolved" when class (implicit), index, and
    /// host are all set (spec §3).
    fn is_fully_resolved(&self) -> bool {
        self.host().is_some() && self.index().is_some()
    }

    fn dof(&self) -> u8 {
        dof(self.host().is_some(), self.index().is_some())
    }

    /// Human-readable identity, e.g. `<GPU-1 at host n0>`, used in log
    /// lines and in the "offending item" message for allocation failures
    /// (spec §4.6 step 6). Mirrors `VizResource.__repr__`.
    fn describe(&self) -> String {
        format!(
            "<{}-{} at host {}>",
            self.class().as_str(),
            self.index().map(|i| i.to_string()).unwrap_or_else(|| "<location undefined>".into()),
            self.host().unwrap_or("<undefined>"),
        )
    }
}

/// Default search-match rule (spec §4.3): classes agree, and every
/// non-null field of `template` equals the corresponding field of
/// `candidate`. `GPU` and `ResourceGroup` override this (see their
/// modules) with class-specific matching.
pub fn base_search_match<T: ResourceIdentity>(template: &T, candidate: &T) -> bool {
    if template.class() != candidate.class() {
        return false;
    }
    if let Some(idx) = template.index() {
        if candidate.index() != Some(idx) {
            return false;
        }
    }
    if let Some(ty) = template.type_tag() {
        if candidate.type_tag() != Some(ty) {
            return false;
        }
    }
    if let Some(host) = template.host() {
        if candidate.host() != Some(host) {
            return false;
        }
    }
    true
}

/// Inventory equality (spec §3): `(class, host, index)`.
pub fn refers_to_same<T: ResourceIdentity>(a: &T, b: &T) -> bool {
    a.class() == b.class() && a.host() == b.host() && a.index() == b.index()
}

pub trait XmlCodec: Sized {
    /// Root element name used on the wire for this resource class (spec §6).
    const ROOT_NODE_NAME: &'static str;

    fn to_xml(&self) -> Element;
    fn from_xml(elem: &Element) -> Result<Self, crate::error::VizError>;
}
