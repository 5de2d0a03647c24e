use common::*;

use crate::ecs::*;

/// Position and rotation relative to a spatial parent
#[derive(Debug, Clone, Component)]
#[storage(VecStorage)]
pub struct TransformComponent {
    /// None if this entity is a root of the hierarchy
    parent: Option<Entity>,

    pub local_position: Vector3,

    /// 1d rotation around z axis
    pub local_rotation: Rad<F>,
}

/// A position within a parent's space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub parent: Option<Entity>,
    pub position: Vector3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentChangedEvent {
    pub entity: Entity,
    pub old_parent: Option<Entity>,
    pub new_parent: Option<Entity>,
}

/// Parent changes not yet observed by the container system
#[derive(Default)]
pub struct ParentChangeQueue {
    events: Vec<ParentChangedEvent>,
}

/// The spatial parent hierarchy. Implementations must keep it acyclic, which is assumed and
/// not re-verified by the container system beyond a depth limit on walks.
pub trait TransformHierarchy {
    fn parent(&self, world: &EcsWorld, entity: Entity) -> Option<Entity>;

    /// None if the entity has no transform
    fn coordinates(&self, world: &EcsWorld, entity: Entity) -> Option<Coordinates>;

    /// Reparents and positions the entity, emitting a [ParentChangedEvent] if the parent
    /// actually changed
    fn set_coordinates(&self, world: &EcsWorld, entity: Entity, coords: Coordinates);

    fn local_rotation(&self, world: &EcsWorld, entity: Entity) -> Rad<F>;

    fn set_local_rotation(&self, world: &EcsWorld, entity: Entity, rotation: Rad<F>);

    /// Detaches the entity from its parent, keeping its local position
    fn detach_to_root(&self, world: &EcsWorld, entity: Entity) {
        let position = self
            .coordinates(world, entity)
            .map(|c| c.position)
            .unwrap_or_else(Vector3::zero);

        self.set_coordinates(
            world,
            entity,
            Coordinates {
                parent: None,
                position,
            },
        )
    }

    /// Drains all parent changes since the last call
    fn take_parent_changes(&self, world: &EcsWorld) -> Vec<ParentChangedEvent>;
}

/// [TransformHierarchy] over [TransformComponent]s, posting changes to the
/// [ParentChangeQueue] resource
#[derive(Default)]
pub struct EcsTransformHierarchy;

impl TransformComponent {
    pub fn new(position: Vector3) -> Self {
        Self {
            parent: None,
            local_position: position,
            local_rotation: Rad(0.0),
        }
    }

    pub fn with_parent(parent: Entity, position: Vector3) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new(position)
        }
    }

    pub fn parent(&self) -> Option<Entity> {
        self.parent
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            parent: self.parent,
            position: self.local_position,
        }
    }
}

impl Coordinates {
    pub fn new(parent: Option<Entity>, position: Vector3) -> Self {
        Self { parent, position }
    }

    pub fn origin_of(parent: Entity) -> Self {
        Self::new(Some(parent), Vector3::zero())
    }
}

impl ParentChangeQueue {
    pub fn post(&mut self, event: ParentChangedEvent) {
        trace!("parent changed"; "entity" => event.entity,
            "old" => ?event.old_parent, "new" => ?event.new_parent);
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<ParentChangedEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl TransformHierarchy for EcsTransformHierarchy {
    fn parent(&self, world: &EcsWorld, entity: Entity) -> Option<Entity> {
        world
            .read_storage::<TransformComponent>()
            .get(entity.into())
            .and_then(|t| t.parent)
    }

    fn coordinates(&self, world: &EcsWorld, entity: Entity) -> Option<Coordinates> {
        world
            .read_storage::<TransformComponent>()
            .get(entity.into())
            .map(TransformComponent::coordinates)
    }

    fn set_coordinates(&self, world: &EcsWorld, entity: Entity, coords: Coordinates) {
        debug_assert!(
            !would_cycle(self, world, entity, coords.parent),
            "reparenting {} under {:?} creates a cycle",
            entity,
            coords.parent
        );

        let old_parent = {
            let mut transforms = world.write_storage::<TransformComponent>();
            match transforms.get_mut(entity.into()) {
                Some(transform) => {
                    transform.local_position = coords.position;
                    std::mem::replace(&mut transform.parent, coords.parent)
                }
                None => {
                    let mut transform = TransformComponent::new(coords.position);
                    transform.parent = coords.parent;
                    if let Err(e) = transforms.insert(entity.into(), transform) {
                        warn!("cannot add transform to entity"; "entity" => entity, "error" => %e);
                        return;
                    }
                    None
                }
            }
        };

        if old_parent != coords.parent {
            world
                .write_resource::<ParentChangeQueue>()
                .post(ParentChangedEvent {
                    entity,
                    old_parent,
                    new_parent: coords.parent,
                });
        }
    }

    fn local_rotation(&self, world: &EcsWorld, entity: Entity) -> Rad<F> {
        world
            .read_storage::<TransformComponent>()
            .get(entity.into())
            .map(|t| t.local_rotation)
            .unwrap_or_else(|| Rad(0.0))
    }

    fn set_local_rotation(&self, world: &EcsWorld, entity: Entity, rotation: Rad<F>) {
        if let Some(transform) = world
            .write_storage::<TransformComponent>()
            .get_mut(entity.into())
        {
            transform.local_rotation = rotation;
        }
    }

    fn take_parent_changes(&self, world: &EcsWorld) -> Vec<ParentChangedEvent> {
        world.write_resource::<ParentChangeQueue>().drain()
    }
}

/// Only used in debug assertions, bounded by a generous fixed depth
fn would_cycle(
    hierarchy: &impl TransformHierarchy,
    world: &EcsWorld,
    entity: Entity,
    new_parent: Option<Entity>,
) -> bool {
    let mut limit = newtype::StepLimit::new(1 << 16);
    let mut current = new_parent;
    while let Some(e) = current {
        if e == entity || !limit.step() {
            return true;
        }
        current = hierarchy.parent(world, e);
    }

    false
}
