use crate::error::VizError;
use crate::xml::Element;

/// One entry in a `DisplayDevice`'s mode list (spec §3).
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayMode {
    pub mode_type: String,
    pub alias: String,
    pub width: u32,
    pub height: u32,
    pub refresh: f64,
}

impl DisplayMode {
    fn to_xml(&self) -> Element {
        let mut e = Element::new("mode");
        e.push_text("type", self.mode_type.clone());
        e.push_text("alias", self.alias.clone());
        e.push_text("width", self.width.to_string());
        e.push_text("height", self.height.to_string());
        e.push_text("refresh", self.refresh.to_string());
        e
    }

    fn from_xml(elem: &Element) -> Result<Self, VizError> {
        Ok(DisplayMode {
            mode_type: elem.require_child("type")?.text_trim().to_string(),
            alias: elem.require_child("alias")?.text_trim().to_string(),
            width: elem.require_child("width")?.parse_int()? as u32,
            height: elem.require_child("height")?.parse_int()? as u32,
            refresh: elem
                .require_child("refresh")?
                .text_trim()
                .parse::<f64>()
                .map_err(|e| VizError::incorrect_value(format!("bad refresh rate: {e}")))?,
        })
    }
}

/// A display-device template: model/vendor, sync ranges, and supported
/// modes (spec §3). Unlike the schedulable resources, templates have no
/// host/index of their own; they are looked up by model name from the
/// `get_templates` catalog.
#[derive(Clone, Debug, Default)]
pub struct DisplayDevice {
    pub model: String,
    pub vendor: Option<String>,
    pub hsync_min: Option<f64>,
    pub hsync_max: Option<f64>,
    pub vrefresh_min: Option<f64>,
    pub vrefresh_max: Option<f64>,
    pub default_mode_alias: Option<String>,
    pub modes: Vec<DisplayMode>,
}

impl DisplayDevice {
    pub const ROOT_NODE_NAME: &'static str = "displayconfig";

    pub fn mode_by_alias(&self, alias: &str) -> Option<&DisplayMode> {
        self.modes.iter().find(|m| m.alias == alias)
    }

    pub fn to_xml(&self) -> Element {
        let mut e = Element::new(Self::ROOT_NODE_NAME);
        e.push_text("model", self.model.clone());
        e.push_opt("vendor", self.vendor.clone());
        e.push_opt("hsyncMin", self.hsync_min.map(|v| v.to_string()));
        e.push_opt("hsyncMax", self.hsync_max.map(|v| v.to_string()));
        e.push_opt("vrefreshMin", self.vrefresh_min.map(|v| v.to_string()));
        e.push_opt("vrefreshMax", self.vrefresh_max.map(|v| v.to_string()));
        e.push_opt("defaultMode", self.default_mode_alias.clone());
        for mode in &self.modes {
            e.push(mode.to_xml());
        }
        e
    }

    pub fn from_xml(elem: &Element) -> Result<Self, VizError> {
        let mut modes = Vec::new();
        for m in elem.children_named("mode") {
            modes.push(DisplayMode::from_xml(m)?);
        }
        Ok(DisplayDevice {
            model: elem.require_child("model")?.text_trim().to_string(),
            vendor: elem.child("vendor").map(|c| c.text_trim().to_string()),
            hsync_min: parse_opt_f64(elem, "hsyncMin")?,
            hsync_max: parse_opt_f64(elem, "hsyncMax")?,
            vrefresh_min: parse_opt_f64(elem, "vrefreshMin")?,
            vrefresh_max: parse_opt_f64(elem, "vrefreshMax")?,
            default_mode_alias: elem.child("defaultMode").map(|c| c.text_trim().to_string()),
            modes,
        })
    }
}

fn parse_opt_f64(elem: &Element, name: &str) -> Result<Option<f64>, VizError> {
    elem.child(name)
        .map(|c| {
            c.text_trim()
                .parse::<f64>()
                .map_err(|e| VizError::incorrect_value(format!("bad value for {name}: {e}")))
        })
        .transpose()
}
