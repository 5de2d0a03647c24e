use specs::prelude::*;
use specs::storage::InsertResult;

use common::*;

use crate::ecs::{Entity, NetEntity};

pub type EcsWorld = World;

#[derive(Debug, Error)]
pub enum ComponentGetError {
    #[error("The entity {0} doesn't exist")]
    NoSuchEntity(Entity),
    #[error("The entity {0} doesn't have the given component '{1}'")]
    NoSuchComponent(Entity, &'static str),
}

/// The entity directory: existence, component attachment and network references
pub trait ComponentWorld {
    #[cfg(test)]
    fn test_new() -> Self;

    fn has_component<T: Component>(&self, entity: Entity) -> bool;

    /// Clones the component out of storage
    fn component_cloned<T: Component + Clone>(&self, entity: Entity)
        -> Result<T, ComponentGetError>;

    fn add_now<T: Component>(&mut self, entity: Entity, component: T) -> InsertResult<T>;
    fn remove_now<T: Component>(&mut self, entity: Entity) -> Option<T>;

    /// Returns false if the entity was already dead
    fn kill_entity(&mut self, entity: Entity) -> bool;
    fn is_entity_alive(&self, entity: Entity) -> bool;

    /// Resolves a network reference to a live entity with the exact same generation
    fn resolve_net_entity(&self, net: NetEntity) -> Option<Entity>;

    // ---
    fn mk_component_error<T: Component>(&self, entity: Entity) -> ComponentGetError {
        if self.is_entity_alive(entity) {
            ComponentGetError::no_such_component::<T>(entity)
        } else {
            ComponentGetError::NoSuchEntity(entity)
        }
    }
}

impl ComponentWorld for EcsWorld {
    #[cfg(test)]
    fn test_new() -> Self {
        logging::for_tests();

        let mut w = Self::new();
        crate::register_components(&mut w);
        w
    }

    fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.read_storage::<T>().contains(entity.into())
    }

    fn component_cloned<T: Component + Clone>(
        &self,
        entity: Entity,
    ) -> Result<T, ComponentGetError> {
        let storage = self.read_storage::<T>();
        storage
            .get(entity.into())
            .cloned()
            .ok_or_else(|| self.mk_component_error::<T>(entity))
    }

    fn add_now<T: Component>(&mut self, entity: Entity, component: T) -> InsertResult<T> {
        let mut storage = self.write_storage::<T>();
        storage.insert(entity.into(), component)
    }

    fn remove_now<T: Component>(&mut self, entity: Entity) -> Option<T> {
        let mut storage = self.write_storage::<T>();
        storage.remove(entity.into())
    }

    fn kill_entity(&mut self, entity: Entity) -> bool {
        if !self.is_entity_alive(entity) {
            return false;
        }

        match self.delete_entity(entity.into()) {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to delete entity"; "entity" => entity, "error" => %e);
                false
            }
        }
    }

    fn is_entity_alive(&self, entity: Entity) -> bool {
        // must check if generation is alive first to avoid panic
        entity.gen().is_alive() && self.is_alive(entity.into())
    }

    fn resolve_net_entity(&self, net: NetEntity) -> Option<Entity> {
        let entities = self.entities();
        let entity = Entity::from(entities.entity(net.index()));

        let matches = entity.gen().id() == net.generation()
            && entity.gen().is_alive()
            && entities.is_alive(entity.into());

        matches.as_some(entity)
    }
}

impl ComponentGetError {
    fn no_such_component<T>(entity: Entity) -> Self {
        Self::NoSuchComponent(entity, std::any::type_name::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetadataComponent;
    use matches::assert_matches;

    #[test]
    fn component_errors() {
        let mut world = EcsWorld::test_new();
        let e = Entity::from(world.create_entity().build());

        assert_matches!(
            world.component_cloned::<MetadataComponent>(e),
            Err(ComponentGetError::NoSuchComponent(_, _))
        );

        assert!(world.kill_entity(e));
        assert!(!world.kill_entity(e));
        assert_matches!(
            world.component_cloned::<MetadataComponent>(e),
            Err(ComponentGetError::NoSuchEntity(_))
        );
    }

    #[test]
    fn resolve_net() {
        let mut world = EcsWorld::test_new();
        let a = Entity::from(world.create_entity().build());
        let net = a.net();

        assert_eq!(world.resolve_net_entity(net), Some(a));

        world.kill_entity(a);
        assert_eq!(world.resolve_net_entity(net), None);

        // index may be recycled with a new generation
        let b = Entity::from(world.create_entity().build());
        assert_eq!(world.resolve_net_entity(net), None);
        assert_eq!(world.resolve_net_entity(b.net()), Some(b));
    }
}
