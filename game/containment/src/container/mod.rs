pub use self::container::{Container, ContainerHandle, ContainerKind};
pub use error::{ContainmentError, ContainmentViolation};
pub use manager::ContainerManagerComponent;
pub use state::{ContainerData, ContainerManagerState, DeferredContainerStates};
pub use system::{ContainerSystem, RemovalOutcome, RemoveOptions};

#[allow(clippy::module_inception)]
mod container;
mod error;
mod manager;
mod query;
mod state;
mod system;
mod validate;

#[cfg(test)]
pub(crate) mod test_utils;
