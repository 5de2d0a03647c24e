//! Read-only walks over the containment and spatial hierarchies. These never fail, anything
//! missing along the way is treated as not contained.

use common::*;

use crate::container::{ContainerHandle, ContainerManagerComponent, ContainerSystem};
use crate::ecs::*;
use crate::metadata::{is_flagged_contained, MetadataComponent};

impl ContainerSystem {
    /// The container directly holding the entity
    pub fn containing_container(&self, world: &EcsWorld, entity: Entity) -> Option<ContainerHandle> {
        if !self.is_entity_in_container(world, entity) {
            return None;
        }

        let found = self
            .transform()
            .parent(world, entity)
            .and_then(|parent| self.container_holding(world, parent, entity))
            .or_else(|| {
                // moved directly and not yet reacted to
                let entities = world.entities();
                let managers = world.read_storage::<ContainerManagerComponent>();
                (&entities, &managers)
                    .join()
                    .find_map(|(_, m)| m.container_of(entity).map(|c| c.handle()))
            });

        if found.is_none() {
            error!("entity is flagged as contained but no container holds it"; "entity" => entity);
            debug_assert!(false, "{} is flagged as contained but is not a member", entity);
        }

        found
    }

    pub(crate) fn container_holding(
        &self,
        world: &EcsWorld,
        owner: Entity,
        entity: Entity,
    ) -> Option<ContainerHandle> {
        world
            .read_storage::<ContainerManagerComponent>()
            .get(owner.into())
            .and_then(|m| m.container_of(entity))
            .map(|c| c.handle())
    }

    /// Is the entity or anything above it in the spatial hierarchy contained
    pub fn is_entity_or_parent_in_container(&self, world: &EcsWorld, entity: Entity) -> bool {
        let metas = world.read_storage::<MetadataComponent>();
        let mut limit = self.step_limit();
        let mut current = Some(entity);
        while let Some(e) = current {
            if !limit.step() {
                self.report_runaway_walk(entity);
                return false;
            }

            if is_flagged_contained(&metas, e) {
                return true;
            }

            current = self.transform().parent(world, e);
        }

        false
    }

    /// The outermost container enclosing the entity, as opposed to the nearest
    pub fn outer_container(&self, world: &EcsWorld, entity: Entity) -> Option<ContainerHandle> {
        let metas = world.read_storage::<MetadataComponent>();
        let mut limit = self.step_limit();
        let mut outermost = None;
        let mut child = entity;
        let mut parent = self.transform().parent(world, entity);

        while let Some(p) = parent {
            if !limit.step() {
                self.report_runaway_walk(entity);
                return None;
            }

            if is_flagged_contained(&metas, child) {
                if let Some(container) = self.container_holding(world, p, child) {
                    outermost = Some(container);
                }
            }

            child = p;
            parent = self.transform().parent(world, p);
        }

        outermost
    }

    /// Neither is contained, or both are in the same container
    pub fn is_in_same_or_no_container(&self, world: &EcsWorld, a: Entity, b: Entity) -> bool {
        self.containing_container(world, a) == self.containing_container(world, b)
    }

    /// As [ContainerSystem::is_in_same_or_no_container], or one directly holds the other
    pub fn is_in_same_or_parent_container(&self, world: &EcsWorld, a: Entity, b: Entity) -> bool {
        let a_container = self.containing_container(world, a);
        let b_container = self.containing_container(world, b);

        a_container == b_container
            || a_container.map(|c| c.owner) == Some(b)
            || b_container.map(|c| c.owner) == Some(a)
    }

    /// Can `user` see `other` through whatever containers separate them. The user can see
    /// whatever holds it, and sees out of containers that show their contents. Unless
    /// `see_inside_self` is set, the user cannot see into itself, so the arguments are not
    /// interchangeable
    pub fn is_in_same_or_transparent_container(
        &self,
        world: &EcsWorld,
        user: Entity,
        other: Entity,
        see_inside_self: bool,
    ) -> bool {
        let original_user = user;
        let (mut user, mut other, mut see_inside_self) = (user, other, see_inside_self);
        let mut user_container = self.containing_container(world, user);
        let mut other_container = self.containing_container(world, other);

        // each step climbs one side, so both sides together are bounded by twice the depth
        let mut limit = self.step_limit();
        let mut limit_other = self.step_limit();

        loop {
            if user_container == other_container {
                return true;
            }

            if user_container.map(|c| c.owner) == Some(other) {
                return true;
            }

            if see_inside_self && other_container.map(|c| c.owner) == Some(user) {
                return true;
            }

            match (user_container, other_container) {
                (Some(c), _) if self.shows_contents(world, c) => {
                    if !limit.step() {
                        self.report_runaway_walk(original_user);
                        return false;
                    }

                    trace!("seeing out of transparent container"; "user" => user, "container" => c);
                    user = c.owner;
                    user_container = self.containing_container(world, user);
                    see_inside_self = false;
                }
                (_, Some(c)) if self.shows_contents(world, c) => {
                    if c.owner == original_user {
                        // would be looking into itself
                        return false;
                    }

                    if !limit_other.step() {
                        self.report_runaway_walk(other);
                        return false;
                    }

                    trace!("seeing into transparent container"; "other" => other, "container" => c);
                    other = c.owner;
                    other_container = self.containing_container(world, other);
                }
                _ => return false,
            }
        }
    }

    fn shows_contents(&self, world: &EcsWorld, container: ContainerHandle) -> bool {
        self.with_container(world, container, |c| c.show_contents)
            .unwrap_or(false)
    }

    /// Walks up through the containers holding the entity, returning the first result of `f`
    /// on a container owner. Stops at the first owner that is not itself contained
    pub fn find_on_container_or_parent<T>(
        &self,
        world: &EcsWorld,
        entity: Entity,
        mut f: impl FnMut(Entity) -> Option<T>,
    ) -> Option<T> {
        let mut found = None;
        self.walk_container_owners(world, entity, |owner| {
            found = f(owner);
            found.is_none()
        });
        found
    }

    /// As [ContainerSystem::find_on_container_or_parent] but collects every result, nearest
    /// first
    pub fn find_all_on_container_or_parent<T>(
        &self,
        world: &EcsWorld,
        entity: Entity,
        mut f: impl FnMut(Entity) -> Option<T>,
    ) -> Vec<T> {
        let mut found = Vec::new();
        self.walk_container_owners(world, entity, |owner| {
            found.extend(f(owner));
            true
        });
        found
    }

    pub fn find_component_on_container_or_parent<C: Component + Clone>(
        &self,
        world: &EcsWorld,
        entity: Entity,
    ) -> Option<C> {
        let storage = world.read_storage::<C>();
        self.find_on_container_or_parent(world, entity, |owner| {
            storage.get(owner.into()).cloned()
        })
    }

    pub fn find_components_on_container_or_parent<C: Component + Clone>(
        &self,
        world: &EcsWorld,
        entity: Entity,
    ) -> Vec<C> {
        let storage = world.read_storage::<C>();
        self.find_all_on_container_or_parent(world, entity, |owner| {
            storage.get(owner.into()).cloned()
        })
    }

    /// Calls `f` on each owner of a container holding the entity or its holders, until `f`
    /// returns false or an owner is not contained
    fn walk_container_owners(
        &self,
        world: &EcsWorld,
        entity: Entity,
        mut f: impl FnMut(Entity) -> bool,
    ) {
        let metas = world.read_storage::<MetadataComponent>();
        let mut limit = self.step_limit();
        let mut current = entity;

        while is_flagged_contained(&metas, current) {
            if !limit.step() {
                self.report_runaway_walk(entity);
                return;
            }

            let owner = match self.transform().parent(world, current) {
                Some(p) => p,
                None => return,
            };

            if !f(owner) {
                return;
            }

            current = owner;
        }
    }
}
