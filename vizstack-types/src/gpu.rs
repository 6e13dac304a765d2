use indexmap::IndexMap;

use crate::error::VizError;
use crate::resource::{base_search_match, dof, ResourceClass, ResourceIdentity, XmlCodec};
use crate::xml::Element;

/// Port scanout capability, spec §3: `DVI` or `VGA`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanType {
    Dvi,
    Vga,
}

impl ScanType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanType::Dvi => "DVI",
            ScanType::Vga => "VGA",
        }
    }

    pub fn parse(s: &str) -> Result<Self, VizError> {
        match s {
            "DVI" => Ok(ScanType::Dvi),
            "VGA" => Ok(ScanType::Vga),
            other => Err(VizError::incorrect_value(format!(
                "unknown scan type '{other}', expected DVI or VGA"
            ))),
        }
    }
}

/// Tri-state preference for whether a GPU should drive a display:
/// required / forbidden / don't care (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UseScanOut {
    Required,
    Forbidden,
    #[default]
    DontCare,
}

impl UseScanOut {
    /// Matches the tri-state search rule of spec §4.3: null (don't care)
    /// on the template side always matches.
    pub fn search_match(template: UseScanOut, candidate: UseScanOut) -> bool {
        match template {
            UseScanOut::DontCare => true,
            other => other == candidate,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            UseScanOut::Required => Some(true),
            UseScanOut::Forbidden => Some(false),
            UseScanOut::DontCare => None,
        }
    }
}

/// Framebuffer area a scanout descriptor drives: `(x, y, w, h)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Area {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// A port's scanout configuration: which display device/mode it drives and
/// what area of the framebuffer it reads from (spec §3).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanoutDescriptor {
    pub port_type: Option<ScanType>,
    pub display_device_ref: Option<String>,
    pub mode_alias: Option<String>,
    pub area: Area,
}

#[derive(Clone, Debug, Default)]
pub struct Gpu {
    pub index: Option<u32>,
    pub host: Option<String>,
    pub model: Option<String>,
    pub bus_id: Option<String>,
    pub vendor: Option<String>,
    pub device_id: Option<String>,
    pub device_type: Option<String>,
    pub scanout_caps: Vec<ScanType>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub use_scan_out: UseScanOut,
    /// Port index -> scanout descriptor. Only ports that are actually
    /// driving a display appear here.
    pub scanout: IndexMap<u32, ScanoutDescriptor>,
}

impl Gpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invariant from spec §3: a GPU with `useScanOut == Forbidden` may not
    /// have any scanout descriptors attached.
    pub fn validate_invariants(&self) -> Result<(), VizError> {
        if self.use_scan_out == UseScanOut::Forbidden && !self.scanout.is_empty() {
            return Err(VizError::incorrect_value(format!(
                "{} has useScanOut=false but carries scanout descriptors",
                self.describe()
            )));
        }
        Ok(())
    }

    /// spec §8: `setScanout` boundary checks.
    pub fn set_scanout(
        &mut self,
        port_index: u32,
        descriptor: ScanoutDescriptor,
        max_ports: u32,
    ) -> Result<(), VizError> {
        if port_index >= max_ports {
            return Err(VizError::incorrect_value(format!(
                "port index {port_index} is out of range (GPU declares {max_ports} ports)"
            )));
        }
        if let Some(scan_type) = descriptor.port_type {
            if !self.scanout_caps.contains(&scan_type) {
                return Err(VizError::incorrect_value(format!(
                    "scan type {} is not in this GPU's declared capability list",
                    scan_type.as_str()
                )));
            }
        }
        let (max_w, max_h) = (
            self.max_width.unwrap_or(u32::MAX),
            self.max_height.unwrap_or(u32::MAX),
        );
        if descriptor.area.x + descriptor.area.w > max_w || descriptor.area.y + descriptor.area.h > max_h {
            return Err(VizError::incorrect_value(
                "scanout area escapes the GPU's maximum framebuffer dimensions",
            ));
        }
        self.scanout.insert(port_index, descriptor);
        Ok(())
    }
}

impl ResourceIdentity for Gpu {
    fn class(&self) -> ResourceClass {
        ResourceClass::Gpu
    }
    fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
    fn index(&self) -> Option<u32> {
        self.index
    }
    fn type_tag(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

impl Gpu {
    /// GPU overrides the base search rule with a tri-state `useScanOut`
    /// match (spec §4.3).
    pub fn search_match(template: &Gpu, candidate: &Gpu) -> bool {
        base_search_match(template, candidate) && UseScanOut::search_match(template.use_scan_out, candidate.use_scan_out)
    }

    pub fn dof(&self) -> u8 {
        dof(self.host.is_some(), self.index.is_some())
    }
}

impl XmlCodec for Gpu {
    const ROOT_NODE_NAME: &'static str = "gpu";

    fn to_xml(&self) -> Element {
        let mut e = Element::new(Self::ROOT_NODE_NAME);
        e.push_opt("host", self.host.clone())
            .push_opt("index", self.index.map(|i| i.to_string()))
            .push_opt("model", self.model.clone())
            .push_opt("busId", self.bus_id.clone())
            .push_opt("vendor", self.vendor.clone())
            .push_opt("deviceId", self.device_id.clone())
            .push_opt("deviceType", self.device_type.clone())
            .push_opt("maxWidth", self.max_width.map(|v| v.to_string()))
            .push_opt("maxHeight", self.max_height.map(|v| v.to_string()));
        if let Some(b) = self.use_scan_out.as_bool() {
            e.push_bool("useScanOut", b);
        }
        for cap in &self.scanout_caps {
            e.push_text("scanoutCap", cap.as_str());
        }
        for (port, desc) in &self.scanout {
            let mut scanout = Element::new("scanout");
            scanout.push_text("port", port.to_string());
            if let Some(pt) = desc.port_type {
                scanout.push_text("portType", pt.as_str());
            }
            scanout.push_opt("displayDevice", desc.display_device_ref.clone());
            scanout.push_opt("modeAlias", desc.mode_alias.clone());
            let mut area = Element::new("area");
            area.push_text("x", desc.area.x.to_string());
            area.push_text("y", desc.area.y.to_string());
            area.push_text("w", desc.area.w.to_string());
            area.push_text("h", desc.area.h.to_string());
            scanout.push(area);
            e.push(scanout);
        }
        e
    }

    fn from_xml(elem: &Element) -> Result<Self, VizError> {
        if elem.name != Self::ROOT_NODE_NAME {
            return Err(VizError::bad_protocol(format!(
                "expected <{}>, got <{}>",
                Self::ROOT_NODE_NAME,
                elem.name
            )));
        }
        let mut gpu = Gpu::new();
        gpu.host = elem.child("host").map(|c| c.text_trim().to_string());
        gpu.index = elem.child("index").map(|c| c.parse_int()).transpose()?.map(|v| v as u32);
        gpu.model = elem.child("model").map(|c| c.text_trim().to_string());
        gpu.bus_id = elem.child("busId").map(|c| c.text_trim().to_string());
        gpu.vendor = elem.child("vendor").map(|c| c.text_trim().to_string());
        gpu.device_id = elem.child("deviceId").map(|c| c.text_trim().to_string());
        gpu.device_type = elem.child("deviceType").map(|c| c.text_trim().to_string());
        gpu.max_width = elem.child("maxWidth").map(|c| c.parse_int()).transpose()?.map(|v| v as u32);
        gpu.max_height = elem.child("maxHeight").map(|c| c.parse_int()).transpose()?.map(|v| v as u32);
        gpu.use_scan_out = match elem.child("useScanOut") {
            Some(c) if c.parse_bool()? => UseScanOut::Required,
            Some(_) => UseScanOut::Forbidden,
            None => UseScanOut::DontCare,
        };
        for cap in elem.children_named("scanoutCap") {
            gpu.scanout_caps.push(ScanType::parse(cap.text_trim())?);
        }
        for scanout in elem.children_named("scanout") {
            let port = scanout.require_child("port")?.parse_int()? as u32;
            let port_type = scanout
                .child("portType")
                .map(|c| ScanType::parse(c.text_trim()))
                .transpose()?;
            let area_elem = scanout.require_child("area")?;
            let area = Area {
                x: area_elem.require_child("x")?.parse_int()? as u32,
                y: area_elem.require_child("y")?.parse_int()? as u32,
                w: area_elem.require_child("w")?.parse_int()? as u32,
                h: area_elem.require_child("h")?.parse_int()? as u32,
            };
            gpu.scanout.insert(
                port,
                ScanoutDescriptor {
                    port_type,
                    display_device_ref: scanout.child("displayDevice").map(|c| c.text_trim().to_string()),
                    mode_alias: scanout.child("modeAlias").map(|c| c.text_trim().to_string()),
                    area,
                },
            );
        }
        gpu.validate_invariants()?;
        Ok(gpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut gpu = Gpu::new();
        gpu.host = Some("n0".into());
        gpu.index = Some(1);
        gpu.model = Some("Quadro FX 5800".into());
        gpu.max_width = Some(1920);
        gpu.max_height = Some(1200);
        gpu.scanout_caps = vec![ScanType::Dvi];
        gpu.use_scan_out = UseScanOut::Required;

        let xml = gpu.to_xml();
        let parsed = Gpu::from_xml(&xml).unwrap();
        assert_eq!(parsed.host, gpu.host);
        assert_eq!(parsed.index, gpu.index);
        assert_eq!(parsed.model, gpu.model);
        assert_eq!(parsed.use_scan_out, UseScanOut::Required);
    }

    #[test]
    fn forbidden_scanout_with_descriptor_is_rejected() {
        let mut gpu = Gpu::new();
        gpu.use_scan_out = UseScanOut::Forbidden;
        gpu.scanout.insert(0, ScanoutDescriptor::default());
        assert!(gpu.validate_invariants().is_err());
    }

    #[test]
    fn set_scanout_rejects_out_of_range_port() {
        let mut gpu = Gpu::new();
        gpu.scanout_caps = vec![ScanType::Dvi];
        gpu.max_width = Some(1920);
        gpu.max_height = Some(1200);
        let desc = ScanoutDescriptor {
            port_type: Some(ScanType::Dvi),
            area: Area { x: 0, y: 0, w: 100, h: 100 },
            ..Default::default()
        };
        assert!(gpu.set_scanout(5, desc, 2).is_err());
    }

    #[test]
    fn set_scanout_rejects_escaping_area() {
        let mut gpu = Gpu::new();
        gpu.scanout_caps = vec![ScanType::Dvi];
        gpu.max_width = Some(100);
        gpu.max_height = Some(100);
        let desc = ScanoutDescriptor {
            port_type: Some(ScanType::Dvi),
            area: Area { x: 50, y: 50, w: 100, h: 100 },
            ..Default::default()
        };
        assert!(gpu.set_scanout(0, desc, 2).is_err());
    }

    #[test]
    fn set_scanout_rejects_undeclared_scan_type() {
        let mut gpu = Gpu::new();
        gpu.scanout_caps = vec![ScanType::Dvi];
        gpu.max_width = Some(100);
        gpu.max_height = Some(100);
        let desc = ScanoutDescriptor {
            port_type: Some(ScanType::Vga),
            area: Area { x: 0, y: 0, w: 10, h: 10 },
            ..Default::default()
        };
        assert!(gpu.set_scanout(0, desc, 2).is_err());
    }
}
