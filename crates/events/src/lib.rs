//! Permission mutation events and the pub/sub mechanics that carry them.

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod mutation;

pub use bus::{BusError, FeedItem, MutationBus, MutationFeed};
pub use event::Event;
pub use in_memory_bus::InMemoryMutationBus;
pub use mutation::{
    PermissionMutation, ResourceOverwriteChanged, RoleAssigned, RolePermissionsUpdated,
    RoleRemoved,
};
