//! Resource model and wire-format XML for the VizStack resource broker.
//!
//! This crate is deliberately free of networking and process-launching
//! concerns: it defines the resource classes (spec §3), their XML
//! serialization (spec §6), search-matching rules (spec §4.3), and the
//! request/allocation shapes the allocator in `vizstack-core` operates on.

pub mod allocation;
pub mod displaydevice;
pub mod error;
pub mod gpu;
pub mod item;
pub mod keyboard;
pub mod mouse;
pub mod resource;
pub mod resource_group;
pub mod server;
pub mod sli;
pub mod viznode;
pub mod xml;

pub use allocation::{Allocation, AllocationRequest, RequestItem};
pub use displaydevice::{DisplayDevice, DisplayMode};
pub use error::{VizError, VizErrorKind, VizResult};
pub use gpu::{Area, Gpu, ScanType, ScanoutDescriptor, UseScanOut};
pub use item::Resource;
pub use keyboard::Keyboard;
pub use mouse::Mouse;
pub use resource::{base_search_match, dof, refers_to_same, ResourceClass, ResourceIdentity, XmlCodec};
pub use resource_group::ResourceGroup;
pub use server::{Position, Resolution, Rotate, Screen, Server, ServerType};
pub use sli::{Sli, SliKind, SliMode};
pub use viznode::VizNode;
