//! The `tiled_display` resource-group handler (spec §3, §4.6 step 7, §9).
//!
//! The original implementation evaluated handler parameters as Python
//! expressions (an `exec`-based config parser). That design note flags it
//! for replacement: params arrive here as a flat key/value map (already
//! parsed out of `<param><key>/<value></param>` pairs by `vizstack-types`)
//! and are read through a small constrained parser — comma-separated
//! integer pairs and plain strings/bools, nothing executable.

use vizstack_types::server::{Position, Resolution, Rotate, Screen};
use vizstack_types::{Gpu, Resource, ResourceGroup, Server, VizError, VizResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Gpu,
    Quadroplex,
}

/// Parsed, validated `tiled_display` parameters (spec §3).
#[derive(Clone, Debug)]
pub struct TiledDisplayParams {
    pub num_blocks: (u32, u32),
    pub block_type: BlockKind,
    pub block_display_layout: (u32, u32),
    pub display_device: String,
    pub display_mode: Option<String>,
    pub tile_resolution: Resolution,
    pub stereo: bool,
    pub rotate: Rotate,
    pub xinerama: bool,
}

fn parse_u32_pair(value: &str, field: &str) -> VizResult<(u32, u32)> {
    let mut parts = value.split(',').map(str::trim);
    let a = parts
        .next()
        .ok_or_else(|| VizError::incorrect_value(format!("{field} must be 'a,b'")))?;
    let b = parts
        .next()
        .ok_or_else(|| VizError::incorrect_value(format!("{field} must be 'a,b'")))?;
    if parts.next().is_some() {
        return Err(VizError::incorrect_value(format!("{field} must have exactly two components")));
    }
    let a: u32 = a.parse().map_err(|_| VizError::incorrect_value(format!("{field} component '{a}' is not an integer")))?;
    let b: u32 = b.parse().map_err(|_| VizError::incorrect_value(format!("{field} component '{b}' is not an integer")))?;
    Ok((a, b))
}

impl TiledDisplayParams {
    pub fn parse(group: &ResourceGroup) -> VizResult<Self> {
        let get = |key: &str| {
            group
                .params
                .get(key)
                .ok_or_else(|| VizError::incorrect_value(format!("tiled_display requires param '{key}'")))
        };

        let num_blocks = parse_u32_pair(get("num_blocks")?, "num_blocks")?;
        let block_type = match get("block_type")?.as_str() {
            "gpu" => BlockKind::Gpu,
            "quadroplex" => BlockKind::Quadroplex,
            other => return Err(VizError::incorrect_value(format!("block_type must be 'gpu' or 'quadroplex', got '{other}'"))),
        };
        let block_display_layout = parse_u32_pair(get("block_display_layout")?, "block_display_layout")?;
        let display_device = get("display_device")?.clone();
        let display_mode = group.params.get("display_mode").cloned();
        let (tw, th) = parse_u32_pair(get("tile_resolution")?, "tile_resolution")?;
        let tile_resolution = Resolution::new(tw, th)?;
        let stereo = group
            .params
            .get("stereo")
            .map(|v| parse_bool_param(v, "stereo"))
            .transpose()?
            .unwrap_or(false);
        let rotate = group
            .params
            .get("rotation")
            .map(|v| Rotate::parse(v))
            .transpose()?
            .unwrap_or_default();
        let xinerama = group
            .params
            .get("xinerama")
            .map(|v| parse_bool_param(v, "xinerama"))
            .transpose()?
            .unwrap_or(true);

        if num_blocks.0 == 0 || num_blocks.1 == 0 {
            return Err(VizError::incorrect_value("num_blocks components must be positive"));
        }

        Ok(TiledDisplayParams {
            num_blocks,
            block_type,
            block_display_layout,
            display_device,
            display_mode,
            tile_resolution,
            stereo,
            rotate,
            xinerama,
        })
    }

    pub fn block_count(&self) -> u32 {
        self.num_blocks.0 * self.num_blocks.1
    }
}

fn parse_bool_param(value: &str, field: &str) -> VizResult<bool> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(VizError::incorrect_value(format!("{field} must be '0' or '1', got '{other}'"))),
    }
}

/// Post-allocation hook (spec §4.6 step 7): arranges the allocated Server's
/// screens into a `num_blocks.0 x num_blocks.1` grid, one screen per GPU,
/// each at `tile_resolution`, tiled left-to-right then top-to-bottom.
pub fn configure_tiled_display(group: &ResourceGroup, resources: &mut [Resource]) -> VizResult<()> {
    let params = TiledDisplayParams::parse(group)?;

    let server_idx = resources
        .iter()
        .position(|r| matches!(r, Resource::Server(_)))
        .ok_or_else(|| VizError::internal("tiled_display allocation is missing its Server"))?;
    let gpu_indices: Vec<u32> = resources
        .iter()
        .filter_map(|r| match r {
            Resource::Gpu(g) => g.index,
            _ => None,
        })
        .collect();

    if gpu_indices.len() as u32 != params.block_count() {
        return Err(VizError::internal(format!(
            "tiled_display expected {} GPUs, allocation produced {}",
            params.block_count(),
            gpu_indices.len()
        )));
    }

    let Resource::Server(server) = &mut resources[server_idx] else {
        unreachable!("checked above");
    };
    apply_grid(server, &gpu_indices, &params);
    Ok(())
}

fn apply_grid(server: &mut Server, gpu_indices: &[u32], params: &TiledDisplayParams) {
    let (cols, _rows) = params.num_blocks;
    server.screens.clear();
    for (screen_number, &gpu_index) in gpu_indices.iter().enumerate() {
        let col = (screen_number as u32) % cols;
        let row = (screen_number as u32) / cols;
        let mut screen = Screen::new(params.tile_resolution);
        screen.gpu_indices.push(gpu_index);
        screen.position = Position {
            x: (col * params.tile_resolution.width) as i32,
            y: (row * params.tile_resolution.height) as i32,
        };
        screen.stereo = params.stereo;
        screen.rotate = params.rotate;
        server.screens.insert(screen_number as u32, screen);
    }
}

pub fn gpu_matches_block_kind(gpu: &Gpu, kind: BlockKind) -> bool {
    match kind {
        BlockKind::Gpu => true,
        BlockKind::Quadroplex => gpu.device_type.as_deref() == Some("quadroplex"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn group_with(params: &[(&str, &str)]) -> ResourceGroup {
        let mut group = ResourceGroup::new();
        group.handler = Some("tiled_display".into());
        group.params = params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<IndexMap<_, _>>();
        group
    }

    #[test]
    fn parses_scenario_5_params() {
        let group = group_with(&[
            ("num_blocks", "2,1"),
            ("block_type", "gpu"),
            ("block_display_layout", "1,1"),
            ("display_device", "HP_LP2065"),
            ("tile_resolution", "1600,1200"),
        ]);
        let params = TiledDisplayParams::parse(&group).unwrap();
        assert_eq!(params.num_blocks, (2, 1));
        assert_eq!(params.block_count(), 2);
        assert_eq!(params.tile_resolution.width, 1600);
    }

    #[test]
    fn lays_out_two_screens_side_by_side() {
        let group = group_with(&[
            ("num_blocks", "2,1"),
            ("block_type", "gpu"),
            ("block_display_layout", "1,1"),
            ("display_device", "HP_LP2065"),
            ("tile_resolution", "1600,1200"),
        ]);
        let mut server = Server::new();
        server.index = Some(0);
        server.host = Some("n0".into());
        let mut gpu0 = Gpu::new();
        gpu0.index = Some(0);
        gpu0.host = Some("n0".into());
        let mut gpu1 = Gpu::new();
        gpu1.index = Some(1);
        gpu1.host = Some("n0".into());

        let mut resources = vec![Resource::Server(server), Resource::Gpu(gpu0), Resource::Gpu(gpu1)];
        configure_tiled_display(&group, &mut resources).unwrap();

        let Resource::Server(server) = &resources[0] else { panic!() };
        assert_eq!(server.screens.len(), 2);
        assert_eq!(server.screens[&0].position, Position { x: 0, y: 0 });
        assert_eq!(server.screens[&1].position, Position { x: 1600, y: 0 });
    }

    #[test]
    fn rejects_non_numeric_num_blocks() {
        let group = group_with(&[
            ("num_blocks", "two,one"),
            ("block_type", "gpu"),
            ("block_display_layout", "1,1"),
            ("display_device", "HP_LP2065"),
            ("tile_resolution", "1600,1200"),
        ]);
        assert!(TiledDisplayParams::parse(&group).is_err());
    }
}
