use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::error::VizError;
use crate::keyboard::Keyboard;
use crate::mouse::Mouse;
use crate::resource::{base_search_match, ResourceClass, ResourceIdentity, XmlCodec};
use crate::xml::Element;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerType {
    Normal,
    Virtual,
}

impl ServerType {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerType::Normal => "normal",
            ServerType::Virtual => "virtual",
        }
    }

    pub fn parse(s: &str) -> Result<Self, VizError> {
        match s {
            "normal" => Ok(ServerType::Normal),
            "virtual" => Ok(ServerType::Virtual),
            other => Err(VizError::incorrect_value(format!("unknown server type '{other}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Rotate {
    #[default]
    None,
    Portrait,
    InvertedPortrait,
    Landscape,
    InvertedLandscape,
}

impl Rotate {
    pub fn as_str(self) -> &'static str {
        match self {
            Rotate::None => "none",
            Rotate::Portrait => "portrait",
            Rotate::InvertedPortrait => "inverted_portrait",
            Rotate::Landscape => "landscape",
            Rotate::InvertedLandscape => "inverted_landscape",
        }
    }

    pub fn parse(s: &str) -> Result<Self, VizError> {
        match s {
            "none" => Ok(Rotate::None),
            "portrait" => Ok(Rotate::Portrait),
            "inverted_portrait" => Ok(Rotate::InvertedPortrait),
            "landscape" => Ok(Rotate::Landscape),
            "inverted_landscape" => Ok(Rotate::InvertedLandscape),
            other => Err(VizError::incorrect_value(format!("unknown rotation '{other}'"))),
        }
    }

    /// `portrait`/`inverted_portrait` swap observed width and height
    /// (spec §3).
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotate::Portrait | Rotate::InvertedPortrait)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const MIN: u32 = 304;
    pub const MAX: u32 = 8192;

    /// spec §8: `304 <= w,h <= 8192` and width divisible by 8.
    pub fn new(width: u32, height: u32) -> Result<Self, VizError> {
        if width < Self::MIN || width > Self::MAX || height < Self::MIN || height > Self::MAX {
            return Err(VizError::incorrect_value(format!(
                "resolution {width}x{height} is out of range [{}, {}]",
                Self::MIN,
                Self::MAX
            )));
        }
        if width % 8 != 0 {
            return Err(VizError::incorrect_value(format!(
                "resolution width {width} must be divisible by 8"
            )));
        }
        Ok(Self { width, height })
    }

    /// Width/height as observed after applying `rotate` (spec §3).
    pub fn observed(&self, rotate: Rotate) -> (u32, u32) {
        if rotate.swaps_dimensions() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// A screen inside a `Server`: the GPU(s) driving it, an optional SLI
/// combiner, and framebuffer properties (spec §3).
#[derive(Clone, Debug)]
pub struct Screen {
    pub gpu_indices: SmallVec<[u32; 2]>,
    pub sli_combiner_index: Option<u32>,
    pub resolution: Resolution,
    pub position: Position,
    pub stereo: bool,
    pub rotate: Rotate,
}

impl Screen {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            gpu_indices: SmallVec::new(),
            sli_combiner_index: None,
            resolution,
            position: Position::default(),
            stereo: false,
            rotate: Rotate::None,
        }
    }

    fn to_xml(&self) -> Element {
        let mut e = Element::new("screen");
        for gpu in &self.gpu_indices {
            e.push_text("gpu", gpu.to_string());
        }
        e.push_opt("sliCombiner", self.sli_combiner_index.map(|v| v.to_string()));
        let mut fb = Element::new("framebuffer");
        let mut res = Element::new("resolution");
        res.push_text("w", self.resolution.width.to_string());
        res.push_text("h", self.resolution.height.to_string());
        fb.push(res);
        let mut pos = Element::new("position");
        pos.push_text("x", self.position.x.to_string());
        pos.push_text("y", self.position.y.to_string());
        fb.push(pos);
        fb.push_bool("stereo", self.stereo);
        fb.push_text("rotate", self.rotate.as_str());
        e.push(fb);
        e
    }

    fn from_xml(elem: &Element) -> Result<Self, VizError> {
        let mut gpu_indices = SmallVec::new();
        for g in elem.children_named("gpu") {
            gpu_indices.push(g.parse_int()? as u32);
        }
        let sli_combiner_index = elem.child("sliCombiner").map(|c| c.parse_int()).transpose()?.map(|v| v as u32);
        let fb = elem.require_child("framebuffer")?;
        let res_elem = fb.require_child("resolution")?;
        let resolution = Resolution::new(
            res_elem.require_child("w")?.parse_int()? as u32,
            res_elem.require_child("h")?.parse_int()? as u32,
        )?;
        let position = if let Some(pos) = fb.child("position") {
            Position {
                x: pos.require_child("x")?.parse_int()? as i32,
                y: pos.require_child("y")?.parse_int()? as i32,
            }
        } else {
            Position::default()
        };
        let stereo = fb.child("stereo").map(|c| c.parse_bool()).transpose()?.unwrap_or(false);
        let rotate = fb
            .child("rotate")
            .map(|c| Rotate::parse(c.text_trim()))
            .transpose()?
            .unwrap_or_default();
        Ok(Screen {
            gpu_indices,
            sli_combiner_index,
            resolution,
            position,
            stereo,
            rotate,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct Server {
    pub index: Option<u32>,
    pub host: Option<String>,
    pub server_type: Option<ServerType>,
    pub owner_uid: Option<u32>,
    pub options: Vec<String>,
    pub extension_options: IndexMap<String, String>,
    pub modules: Vec<String>,
    pub keyboard: Option<Keyboard>,
    pub mouse: Option<Mouse>,
    pub screens: IndexMap<u32, Screen>,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invariant check used before starting an X server: at least one
    /// configured screen, and every screen's GPUs reside on the server's
    /// own host — that cross-reference needs the inventory, so it lives
    /// in `vizstack-core`'s allocator, not here.
    pub fn has_runtime_configuration(&self) -> bool {
        !self.screens.is_empty()
    }

    pub fn search_match(template: &Server, candidate: &Server) -> bool {
        if !base_search_match(template, candidate) {
            return false;
        }
        true
    }
}

impl ResourceIdentity for Server {
    fn class(&self) -> ResourceClass {
        ResourceClass::Server
    }
    fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
    fn index(&self) -> Option<u32> {
        self.index
    }
    fn type_tag(&self) -> Option<&str> {
        self.server_type.map(|t| t.as_str())
    }
}

impl XmlCodec for Server {
    const ROOT_NODE_NAME: &'static str = "serverconfig";

    fn to_xml(&self) -> Element {
        let mut e = Element::new(Self::ROOT_NODE_NAME);
        e.push_opt("host", self.host.clone())
            .push_opt("index", self.index.map(|i| i.to_string()))
            .push_opt("type", self.server_type.map(|t| t.as_str().to_string()))
            .push_opt("owner", self.owner_uid.map(|u| u.to_string()));
        for opt in &self.options {
            e.push_text("option", opt.clone());
        }
        for (k, v) in &self.extension_options {
            let mut ext = Element::new("extensionOption");
            ext.push_text("key", k.clone());
            ext.push_text("value", v.clone());
            e.push(ext);
        }
        for m in &self.modules {
            e.push_text("module", m.clone());
        }
        if let Some(kbd) = &self.keyboard {
            e.push(kbd.to_xml());
        }
        if let Some(mouse) = &self.mouse {
            e.push(mouse.to_xml());
        }
        for (num, screen) in &self.screens {
            let mut s = screen.to_xml();
            s.push_text("number", num.to_string());
            e.push(s);
        }
        e
    }

    fn from_xml(elem: &Element) -> Result<Self, VizError> {
        let mut server = Server::new();
        server.host = elem.child("host").map(|c| c.text_trim().to_string());
        server.index = elem.child("index").map(|c| c.parse_int()).transpose()?.map(|v| v as u32);
        server.server_type = elem.child("type").map(|c| ServerType::parse(c.text_trim())).transpose()?;
        server.owner_uid = elem.child("owner").map(|c| c.parse_int()).transpose()?.map(|v| v as u32);
        for opt in elem.children_named("option") {
            server.options.push(opt.text_trim().to_string());
        }
        for ext in elem.children_named("extensionOption") {
            let key = ext.require_child("key")?.text_trim().to_string();
            let value = ext.require_child("value")?.text_trim().to_string();
            server.extension_options.insert(key, value);
        }
        for m in elem.children_named("module") {
            server.modules.push(m.text_trim().to_string());
        }
        if let Some(kbd) = elem.child(Keyboard::ROOT_NODE_NAME) {
            server.keyboard = Some(Keyboard::from_xml(kbd)?);
        }
        if let Some(mouse) = elem.child(Mouse::ROOT_NODE_NAME) {
            server.mouse = Some(Mouse::from_xml(mouse)?);
        }
        for s in elem.children_named("screen") {
            let number = s.require_child("number")?.parse_int()? as u32;
            server.screens.insert(number, Screen::from_xml(s)?);
        }
        Ok(server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_rejects_out_of_range() {
        assert!(Resolution::new(64, 480).is_err());
        assert!(Resolution::new(10000, 480).is_err());
    }

    #[test]
    fn resolution_rejects_non_multiple_of_8() {
        assert!(Resolution::new(1001, 768).is_err());
        assert!(Resolution::new(1600, 1200).is_ok());
    }

    #[test]
    fn portrait_swaps_observed_dimensions() {
        let res = Resolution::new(1600, 1200).unwrap();
        assert_eq!(res.observed(Rotate::None), (1600, 1200));
        assert_eq!(res.observed(Rotate::Portrait), (1200, 1600));
    }

    #[test]
    fn round_trip_with_screens() {
        let mut server = Server::new();
        server.host = Some("n0".into());
        server.index = Some(0);
        server.server_type = Some(ServerType::Normal);
        server.owner_uid = Some(1000);
        let mut screen = Screen::new(Resolution::new(1600, 1200).unwrap());
        screen.gpu_indices.push(0);
        server.screens.insert(0, screen);

        let parsed = Server::from_xml(&server.to_xml()).unwrap();
        assert_eq!(parsed.host, server.host);
        assert_eq!(parsed.screens.len(), 1);
        assert_eq!(parsed.screens[&0].resolution.width, 1600);
    }
}
