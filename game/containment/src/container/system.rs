use ustr::ustr;

use common::newtype::StepLimit;
use common::*;
use config::ContainmentConfig;

use crate::container::{
    Container, ContainerHandle, ContainerKind, ContainerManagerComponent, ContainmentError,
};
use crate::ecs::*;
use crate::metadata::{is_flagged_contained, set_contained_flag, MetadataComponent};
use crate::physics::{EcsPhysics, PhysicsParticipation};
use crate::transform::{
    Coordinates, EcsTransformHierarchy, ParentChangedEvent, TransformHierarchy,
};

/// Creates, mutates and queries containers, keeping membership, the containment flag, the
/// spatial hierarchy and physics participation in agreement.
///
/// All mutations are expected to happen sequentially on the simulation thread. Direct changes
/// to the spatial hierarchy are reacted to at the start of every mutating operation, or
/// explicitly with [ContainerSystem::process_parent_changes]. Queries made in between see the
/// stale membership.
pub struct ContainerSystem {
    config: ContainmentConfig,
    transform: Box<dyn TransformHierarchy>,
    physics: Box<dyn PhysicsParticipation>,
}

#[derive(Debug, Clone, Copy)]
pub struct RemoveOptions {
    /// Move the entity out of its container owner in the spatial hierarchy
    pub reparent: bool,

    /// Remove dead members too, and log instead of silently ignoring non-members
    pub force: bool,

    /// Defaults to the container owner's coordinates
    pub destination: Option<Coordinates>,

    /// Defaults to the container owner's local rotation
    pub rotation: Option<Rad<F>>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RemovalOutcome {
    NotContained,
    Removed,
    Refused,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self {
            reparent: true,
            force: false,
            destination: None,
            rotation: None,
        }
    }
}

impl RemoveOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    /// Membership only, the spatial hierarchy is left alone
    pub fn logical() -> Self {
        Self {
            reparent: false,
            force: true,
            ..Self::default()
        }
    }

    pub fn with_destination(mut self, destination: Coordinates) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_rotation(mut self, rotation: Rad<F>) -> Self {
        self.rotation = Some(rotation);
        self
    }
}

impl ContainerSystem {
    pub fn new(
        config: ContainmentConfig,
        transform: Box<dyn TransformHierarchy>,
        physics: Box<dyn PhysicsParticipation>,
    ) -> Self {
        Self {
            config,
            transform,
            physics,
        }
    }

    /// Uses the component-backed transform and physics collaborators
    pub fn with_ecs_collaborators(config: ContainmentConfig) -> Self {
        Self::new(
            config,
            Box::new(EcsTransformHierarchy),
            Box::new(EcsPhysics),
        )
    }

    pub fn config(&self) -> &ContainmentConfig {
        &self.config
    }

    pub(crate) fn transform(&self) -> &dyn TransformHierarchy {
        &*self.transform
    }

    pub(crate) fn step_limit(&self) -> StepLimit {
        StepLimit::new(self.config.max_hierarchy_depth)
    }

    // ---- container records

    pub fn make_container(
        &self,
        world: &mut EcsWorld,
        owner: Entity,
        id: &str,
        kind: ContainerKind,
    ) -> Result<ContainerHandle, ContainmentError> {
        if !world.is_entity_alive(owner) {
            return Err(ContainmentError::EntityNotFound(owner));
        }

        let mut managers = world.write_storage::<ContainerManagerComponent>();
        let manager = managers
            .entry(owner.into())
            .map_err(|_| ContainmentError::EntityNotFound(owner))?
            .or_insert_with(Default::default);

        let handle = manager.make_container(owner, ustr(id), kind)?.handle();
        debug!("created container"; "container" => handle, "kind" => kind);
        Ok(handle)
    }

    /// Returns the container and whether it already existed
    pub fn ensure_container(
        &self,
        world: &mut EcsWorld,
        owner: Entity,
        id: &str,
        kind: ContainerKind,
    ) -> Result<(ContainerHandle, bool), ContainmentError> {
        let existing = self
            .try_get_container(world, owner, id)
            .and_then(|handle| self.with_container(world, handle, Container::kind));

        match existing {
            Some(actual) if actual == kind => Ok((
                ContainerHandle {
                    owner,
                    id: ustr(id),
                },
                true,
            )),
            Some(actual) => Err(ContainmentError::ContainerTypeMismatch {
                container: ContainerHandle {
                    owner,
                    id: ustr(id),
                },
                expected: kind,
                actual,
            }),
            None => self
                .make_container(world, owner, id, kind)
                .map(|handle| (handle, false)),
        }
    }

    pub fn get_container(
        &self,
        world: &EcsWorld,
        owner: Entity,
        id: &str,
    ) -> Result<ContainerHandle, ContainmentError> {
        self.try_get_container(world, owner, id)
            .ok_or_else(|| ContainmentError::NoSuchContainer {
                owner,
                id: ustr(id),
            })
    }

    pub fn try_get_container(
        &self,
        world: &EcsWorld,
        owner: Entity,
        id: &str,
    ) -> Option<ContainerHandle> {
        let managers = world.read_storage::<ContainerManagerComponent>();
        managers
            .get(owner.into())
            .and_then(|m| m.get(ustr(id)))
            .map(Container::handle)
    }

    pub fn has_container(&self, world: &EcsWorld, owner: Entity, id: &str) -> bool {
        self.try_get_container(world, owner, id).is_some()
    }

    /// Every container of the owner in creation order, empty if it has none
    pub fn all_containers(&self, world: &EcsWorld, owner: Entity) -> Vec<ContainerHandle> {
        let managers = world.read_storage::<ContainerManagerComponent>();
        managers
            .get(owner.into())
            .map(|m| m.containers().map(Container::handle).collect())
            .unwrap_or_default()
    }

    /// None if the container doesn't exist
    pub fn with_container<R>(
        &self,
        world: &EcsWorld,
        container: ContainerHandle,
        f: impl FnOnce(&Container) -> R,
    ) -> Option<R> {
        let managers = world.read_storage::<ContainerManagerComponent>();
        managers
            .get(container.owner.into())
            .and_then(|m| m.get(container.id))
            .map(f)
    }

    pub fn members(&self, world: &EcsWorld, container: ContainerHandle) -> Vec<Entity> {
        self.with_container(world, container, |c| c.members().to_vec())
            .unwrap_or_default()
    }

    pub fn set_show_contents(
        &self,
        world: &mut EcsWorld,
        container: ContainerHandle,
        show_contents: bool,
    ) -> Result<(), ContainmentError> {
        self.with_container_mut(world, container, |c| c.show_contents = show_contents)
    }

    pub fn set_occludes_light(
        &self,
        world: &mut EcsWorld,
        container: ContainerHandle,
        occludes_light: bool,
    ) -> Result<(), ContainmentError> {
        self.with_container_mut(world, container, |c| c.occludes_light = occludes_light)
    }

    /// Marks the owner's record dirty
    pub(crate) fn with_container_mut<R>(
        &self,
        world: &EcsWorld,
        container: ContainerHandle,
        f: impl FnOnce(&mut Container) -> R,
    ) -> Result<R, ContainmentError> {
        let mut managers = world.write_storage::<ContainerManagerComponent>();
        let manager = managers
            .get_mut(container.owner.into())
            .ok_or_else(|| no_such_container(container))?;

        let result = manager
            .get_mut(container.id)
            .map(f)
            .ok_or_else(|| no_such_container(container))?;
        manager.mark_dirty();
        Ok(result)
    }

    /// Whether any container owned by `owner` holds the entity
    pub fn contains_entity(&self, world: &EcsWorld, owner: Entity, entity: Entity) -> bool {
        world
            .read_storage::<ContainerManagerComponent>()
            .get(owner.into())
            .map(|m| m.contains_entity(entity))
            .unwrap_or(false)
    }

    /// The containment flag alone, without consulting any container
    pub fn is_entity_in_container(&self, world: &EcsWorld, entity: Entity) -> bool {
        is_flagged_contained(&world.read_storage::<MetadataComponent>(), entity)
    }

    /// The nearest entity at or above the given one in the spatial hierarchy that owns
    /// containers
    pub fn try_get_manager(&self, world: &EcsWorld, entity: Entity) -> Option<Entity> {
        let managers = world.read_storage::<ContainerManagerComponent>();
        let mut limit = self.step_limit();
        let mut current = Some(entity);
        while let Some(e) = current {
            if !limit.step() {
                self.report_runaway_walk(entity);
                return None;
            }

            if managers.contains(e.into()) {
                return Some(e);
            }

            current = self.transform.parent(world, e);
        }

        None
    }

    // ---- membership

    /// Ok(false) if the entity is dead, already a member, or rejected by the container. On
    /// success any previous containment is replaced
    pub fn insert(
        &self,
        world: &mut EcsWorld,
        container: ContainerHandle,
        entity: Entity,
    ) -> Result<bool, ContainmentError> {
        self.flush_parent_changes(world);

        if !world.is_entity_alive(entity) {
            debug!("cannot insert dead entity"; "entity" => entity, "container" => container);
            return Ok(false);
        }

        if !self.has_container(world, container.owner, &container.id) {
            return Err(no_such_container(container));
        }

        if self.is_ancestor_or_self(world, entity, container.owner) {
            return Err(ContainmentError::ContainmentCycle { entity, container });
        }

        let accepted = self
            .with_container(world, container, |c| !c.contains(entity) && c.can_insert(entity))
            .ok_or_else(|| no_such_container(container))?;
        if !accepted {
            debug!("container refused entity"; "entity" => entity, "container" => container);
            return Ok(false);
        }

        // leave the old container without touching the hierarchy, the reparent below covers it
        if let Some(previous) = self.containing_container(world, entity) {
            trace!("moving entity between containers"; "entity" => entity,
                "from" => previous, "to" => container);
            self.release(world, previous, entity)?;
        }

        {
            let mut managers = world.write_storage::<ContainerManagerComponent>();
            let manager = managers
                .get_mut(container.owner.into())
                .ok_or_else(|| no_such_container(container))?;
            manager
                .get_mut(container.id)
                .ok_or_else(|| no_such_container(container))?
                .push_member(entity);
            manager.mark_dirty();
        }

        set_contained_flag(world, entity, true);

        let coords = if self.config.neutralize_position_on_insert {
            Coordinates::origin_of(container.owner)
        } else {
            let position = self
                .transform
                .coordinates(world, entity)
                .map(|c| c.position)
                .unwrap_or_else(Vector3::zero);
            Coordinates::new(Some(container.owner), position)
        };
        self.transform.set_coordinates(world, entity, coords);
        self.physics.set_collision_enabled(world, entity, false);

        debug!("inserted entity"; "entity" => entity, "container" => container);
        Ok(true)
    }

    /// Ok(false) if the entity is not a member, or is dead and the removal is not forced
    pub fn remove(
        &self,
        world: &mut EcsWorld,
        container: ContainerHandle,
        entity: Entity,
        options: RemoveOptions,
    ) -> Result<bool, ContainmentError> {
        self.flush_parent_changes(world);

        let is_member = self
            .with_container(world, container, |c| c.contains(entity))
            .ok_or_else(|| no_such_container(container))?;

        if !is_member {
            if options.force {
                warn!("cannot force removal of non-member"; "entity" => entity, "container" => container);
            }
            return Ok(false);
        }

        let alive = world.is_entity_alive(entity);
        if !alive && !options.force {
            debug!("not removing dead member without force"; "entity" => entity, "container" => container);
            return Ok(false);
        }

        self.release(world, container, entity)?;

        if alive {
            if options.reparent {
                let destination = options
                    .destination
                    .unwrap_or_else(|| self.owner_coordinates(world, container.owner));
                let rotation = options
                    .rotation
                    .unwrap_or_else(|| self.transform.local_rotation(world, container.owner));

                self.transform.set_coordinates(world, entity, destination);
                self.transform.set_local_rotation(world, entity, rotation);
            }

            self.physics.set_collision_enabled(world, entity, true);
        }

        debug!("removed entity"; "entity" => entity, "container" => container,
            "reparent" => options.reparent, "alive" => alive);
        Ok(true)
    }

    /// Removes every member, skipping those that refuse. Returns the removed entities in
    /// member order
    pub fn empty_container(
        &self,
        world: &mut EcsWorld,
        container: ContainerHandle,
        options: RemoveOptions,
    ) -> Result<Vec<Entity>, ContainmentError> {
        self.flush_parent_changes(world);

        let members = self
            .with_container(world, container, |c| c.members().to_vec())
            .ok_or_else(|| no_such_container(container))?;

        let mut removed = Vec::with_capacity(members.len());
        for member in members {
            if self.remove(world, container, member, options)? {
                removed.push(member);
            } else {
                debug_assert!(self.contains_entity(world, container.owner, member));
                warn!("member refused removal, skipping"; "entity" => member, "container" => container);
            }
        }

        Ok(removed)
    }

    /// Removes and deletes every member
    pub fn clean_container(
        &self,
        world: &mut EcsWorld,
        container: ContainerHandle,
    ) -> Result<(), ContainmentError> {
        self.flush_parent_changes(world);

        let members = self
            .with_container(world, container, |c| c.members().to_vec())
            .ok_or_else(|| no_such_container(container))?;

        for member in members {
            // may have been deleted along with an earlier member
            if !self.contains_entity(world, container.owner, member) {
                continue;
            }

            self.remove(world, container, member, RemoveOptions::logical())?;
            if world.is_entity_alive(member) {
                self.delete_entity(world, member);
            }
        }

        Ok(())
    }

    /// Shuts down the owner's containers, ejecting all members, and detaches the record.
    /// Returns the ejected entities
    pub fn remove_manager(&self, world: &mut EcsWorld, owner: Entity) -> Vec<Entity> {
        self.flush_parent_changes(world);

        let mut ejected = Vec::new();
        for container in self.all_containers(world, owner) {
            match self.empty_container(world, container, RemoveOptions::forced()) {
                Ok(removed) => ejected.extend(removed),
                Err(err) => {
                    error!("failed to shut down container"; "container" => container, "error" => %err)
                }
            }
        }

        if world
            .remove_now::<ContainerManagerComponent>(owner)
            .is_some()
        {
            debug!("removed container manager"; "owner" => owner, "ejected" => ejected.len());
        }

        ejected
    }

    /// Deletes the entity after shutting down its own containers and removing it from the
    /// container holding it. Returns false if it was already dead
    pub fn delete_entity(&self, world: &mut EcsWorld, entity: Entity) -> bool {
        if !world.is_entity_alive(entity) {
            return false;
        }

        self.flush_parent_changes(world);
        self.remove_manager(world, entity);

        if let Some(container) = self.containing_container(world, entity) {
            if let Err(err) = self.remove(world, container, entity, RemoveOptions::logical()) {
                error!("failed to remove deleted entity from container";
                    "entity" => entity, "container" => container, "error" => %err);
            }
        }

        trace!("deleting entity"; "entity" => entity);
        world.kill_entity(entity)
    }

    pub fn try_remove_from_container(
        &self,
        world: &mut EcsWorld,
        entity: Entity,
        force: bool,
    ) -> Result<RemovalOutcome, ContainmentError> {
        self.flush_parent_changes(world);

        let container = match self.containing_container(world, entity) {
            Some(c) => c,
            None => return Ok(RemovalOutcome::NotContained),
        };

        let options = RemoveOptions {
            force,
            ..RemoveOptions::default()
        };

        Ok(if self.remove(world, container, entity, options)? {
            RemovalOutcome::Removed
        } else {
            RemovalOutcome::Refused
        })
    }

    /// Places an entity that has been dropped by its spatial parent: into the container
    /// holding that parent, or the next one out if it refuses, and so on. If none accept, the
    /// entity is detached to the hierarchy root. Returns the accepting container
    pub fn attach_to_container_or_root(
        &self,
        world: &mut EcsWorld,
        entity: Entity,
    ) -> Result<Option<ContainerHandle>, ContainmentError> {
        self.flush_parent_changes(world);

        let mut next = self
            .transform
            .parent(world, entity)
            .and_then(|parent| self.containing_container(world, parent));

        let mut limit = self.step_limit();
        while let Some(container) = next {
            if !limit.step() {
                self.report_runaway_walk(entity);
                break;
            }

            if self.insert(world, container, entity)? {
                return Ok(Some(container));
            }

            next = self.containing_container(world, container.owner);
        }

        trace!("no container accepted entity, detaching to root"; "entity" => entity);
        self.transform.detach_to_root(world, entity);
        Ok(None)
    }

    // ---- external hierarchy changes

    /// Drains parent change notifications and ejects every contained entity that was moved
    /// out of its container's owner directly, then retries any network states deferred on a
    /// conflict. Returns the number ejected
    pub fn process_parent_changes(&self, world: &mut EcsWorld) -> usize {
        let ejected = self.flush_parent_changes(world);
        self.retry_deferred_states(world);
        ejected
    }

    /// Ejection half of [ContainerSystem::process_parent_changes]
    pub(crate) fn flush_parent_changes(&self, world: &mut EcsWorld) -> usize {
        let events = self.transform.take_parent_changes(world);
        if events.is_empty() {
            return 0;
        }

        let ejected = events
            .iter()
            .filter(|event| self.on_parent_changed(world, event))
            .count();

        trace!("processed parent changes"; "events" => events.len(), "ejected" => ejected);
        ejected
    }

    /// Returns true if the entity was ejected from its container, keeping its new parent
    pub fn on_parent_changed(&self, world: &mut EcsWorld, event: &ParentChangedEvent) -> bool {
        let entity = event.entity;
        if !world.is_entity_alive(entity) || !self.is_entity_in_container(world, entity) {
            return false;
        }

        let old_parent = match event.old_parent {
            Some(p) => p,
            None => return false,
        };

        // moved back again before this was processed
        if self.transform.parent(world, entity) == Some(old_parent) {
            return false;
        }

        let container = match self.container_holding(world, old_parent, entity) {
            Some(c) => c,
            None => return false,
        };

        debug!("entity was moved out of its container directly, ejecting";
            "entity" => entity, "container" => container, "new_parent" => ?event.new_parent);

        match self.remove(world, container, entity, RemoveOptions::logical()) {
            Ok(removed) => removed,
            Err(err) => {
                error!("failed to eject entity"; "entity" => entity, "error" => %err);
                false
            }
        }
    }

    // ---- helpers

    /// Membership and flag only
    fn release(
        &self,
        world: &EcsWorld,
        container: ContainerHandle,
        entity: Entity,
    ) -> Result<(), ContainmentError> {
        world
            .write_storage::<ContainerManagerComponent>()
            .get_mut(container.owner.into())
            .ok_or_else(|| no_such_container(container))?
            .remove_member(container, entity)?;

        set_contained_flag(world, entity, false);
        Ok(())
    }

    fn owner_coordinates(&self, world: &EcsWorld, owner: Entity) -> Coordinates {
        self.transform
            .coordinates(world, owner)
            .unwrap_or_else(|| Coordinates::new(None, Vector3::zero()))
    }

    /// Is `ancestor` the entity itself or anywhere above it in the spatial hierarchy. A
    /// runaway walk counts as true
    fn is_ancestor_or_self(&self, world: &EcsWorld, ancestor: Entity, entity: Entity) -> bool {
        let mut limit = self.step_limit();
        let mut current = Some(entity);
        while let Some(e) = current {
            if e == ancestor {
                return true;
            }

            if !limit.step() {
                self.report_runaway_walk(entity);
                return true;
            }

            current = self.transform.parent(world, e);
        }

        false
    }

    pub(crate) fn report_runaway_walk(&self, entity: Entity) {
        error!("spatial hierarchy walk exceeded max depth, assuming a cycle";
            "entity" => entity, "max_depth" => self.config.max_hierarchy_depth);
        debug_assert!(
            false,
            "hierarchy walk from {} exceeded {} steps",
            entity, self.config.max_hierarchy_depth
        );
    }
}

pub(crate) fn no_such_container(container: ContainerHandle) -> ContainmentError {
    ContainmentError::NoSuchContainer {
        owner: container.owner,
        id: container.id,
    }
}
