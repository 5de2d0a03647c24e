use common::*;
use config::ContainmentConfig;

use crate::container::ContainerSystem;
use crate::ecs::*;
use crate::physics::PhysicsComponent;
use crate::transform::TransformComponent;

pub fn test_world() -> (EcsWorld, ContainerSystem) {
    let world = EcsWorld::test_new();
    let system = ContainerSystem::with_ecs_collaborators(ContainmentConfig::default());
    (world, system)
}

/// Entity with a transform and physics at (1, 2, 3)
pub fn spawn(world: &mut EcsWorld, parent: Option<Entity>) -> Entity {
    spawn_at(world, parent, Vector3::new(1.0, 2.0, 3.0))
}

pub fn spawn_at(world: &mut EcsWorld, parent: Option<Entity>, position: Vector3) -> Entity {
    let transform = match parent {
        Some(parent) => TransformComponent::with_parent(parent, position),
        None => TransformComponent::new(position),
    };

    world
        .create_entity()
        .with(transform)
        .with(PhysicsComponent::default())
        .build()
        .into()
}

pub fn collision_enabled(world: &EcsWorld, entity: Entity) -> bool {
    world
        .component_cloned::<PhysicsComponent>(entity)
        .expect("no physics")
        .collision_enabled
}

pub fn parent_of(world: &EcsWorld, entity: Entity) -> Option<Entity> {
    world
        .component_cloned::<TransformComponent>(entity)
        .expect("no transform")
        .parent()
}
