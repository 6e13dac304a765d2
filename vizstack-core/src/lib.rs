//! The resource broker's core: the in-memory inventory and allocator, the
//! per-connection session machine, the X-server lifecycle, the `Broker`
//! state object that locks all of it, and the dispatcher that turns decoded
//! wire commands into calls against it.

pub mod allocator;
pub mod broker;
pub mod config;
pub mod dispatcher;
pub mod inventory;
pub mod scheduler;
pub mod session;
pub mod tiled_display;
pub mod x_lifecycle;

pub use broker::{Broker, BrokerState};
pub use config::{build_inventory, load_display_device_config, load_node_config, load_resource_group_config, MasterConfig};
pub use dispatcher::Dispatcher;
pub use inventory::{HeldTable, Inventory, NodeInventory, ResourceGroupTemplate, ResourceKey};
pub use scheduler::{
    BatchSchedulerAdapter, LocalSchedulerAdapter, MetaScheduler, Reservation, SchedulerAdapter, SshSchedulerAdapter,
};
pub use session::{Session, SessionState};
pub use x_lifecycle::{XLifecycle, X_SERVER_DELAY_SECS, X_WAIT_MAX_SECS, X_WAIT_TIMEOUT_SECS};
