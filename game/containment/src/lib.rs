//! Entity containment: containers owned by entities, holding other entities that are removed
//! from normal spatial and physical interaction while inside.

pub use config::{Config, ContainmentConfig};

pub use container::{
    Container, ContainerData, ContainerHandle, ContainerKind, ContainerManagerComponent,
    ContainerManagerState, ContainerSystem, ContainmentError, ContainmentViolation,
    DeferredContainerStates, RemovalOutcome, RemoveOptions,
};
pub use ecs::{ComponentGetError, ComponentWorld, EcsWorld, Entity, NetEntity};
pub use metadata::{MetaFlags, MetadataComponent};
pub use physics::{EcsPhysics, PhysicsComponent, PhysicsParticipation};
pub use transform::{
    Coordinates, EcsTransformHierarchy, ParentChangeQueue, ParentChangedEvent,
    TransformComponent, TransformHierarchy,
};

pub mod ecs;

mod container;
mod metadata;
mod physics;
mod transform;

/// Registers every component and resource used by containment
pub fn register_components(world: &mut EcsWorld) {
    use specs::WorldExt;

    world.register::<MetadataComponent>();
    world.register::<TransformComponent>();
    world.register::<PhysicsComponent>();
    world.register::<ContainerManagerComponent>();
    world.insert(ParentChangeQueue::default());
    world.insert(DeferredContainerStates::default());
}
