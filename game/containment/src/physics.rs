use common::*;

use crate::ecs::*;

#[derive(Debug, Clone, Component)]
#[storage(VecStorage)]
pub struct PhysicsComponent {
    /// Takes part in collisions independently of its parent
    pub collision_enabled: bool,
}

/// Suspends and resumes collision participation for entities entering and leaving containers
pub trait PhysicsParticipation {
    fn set_collision_enabled(&self, world: &EcsWorld, entity: Entity, enabled: bool);
}

/// [PhysicsParticipation] over [PhysicsComponent]s. Entities without one are unaffected
#[derive(Default)]
pub struct EcsPhysics;

impl Default for PhysicsComponent {
    fn default() -> Self {
        PhysicsComponent {
            collision_enabled: true,
        }
    }
}

impl PhysicsParticipation for EcsPhysics {
    fn set_collision_enabled(&self, world: &EcsWorld, entity: Entity, enabled: bool) {
        let mut physics = world.write_storage::<PhysicsComponent>();
        if let Some(physics) = physics.get_mut(entity.into()) {
            if physics.collision_enabled != enabled {
                trace!("toggling collision"; "entity" => entity, "enabled" => enabled);
                physics.collision_enabled = enabled;
            }
        }
    }
}
