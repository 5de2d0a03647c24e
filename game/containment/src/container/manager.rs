use ustr::Ustr;

use crate::container::{Container, ContainerHandle, ContainerKind, ContainmentError};
use crate::ecs::*;

/// Containers owned by a single entity, in creation order
#[derive(Component, Clone, Debug, Default)]
#[storage(DenseVecStorage)]
pub struct ContainerManagerComponent {
    containers: Vec<Container>,

    /// Changed since the last network snapshot
    dirty: bool,
}

impl ContainerManagerComponent {
    pub fn get(&self, id: Ustr) -> Option<&Container> {
        self.containers.iter().find(|c| c.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: Ustr) -> Option<&mut Container> {
        self.containers.iter_mut().find(|c| c.id() == id)
    }

    pub fn has_container(&self, id: Ustr) -> bool {
        self.get(id).is_some()
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> + '_ {
        self.containers.iter()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// The container holding the given entity, if any
    pub fn container_of(&self, entity: Entity) -> Option<&Container> {
        self.containers.iter().find(|c| c.contains(entity))
    }

    pub fn contains_entity(&self, entity: Entity) -> bool {
        self.container_of(entity).is_some()
    }

    pub(crate) fn make_container(
        &mut self,
        owner: Entity,
        id: Ustr,
        kind: ContainerKind,
    ) -> Result<&mut Container, ContainmentError> {
        if self.has_container(id) {
            return Err(ContainmentError::DuplicateContainerId { owner, id });
        }

        self.dirty = true;
        self.containers.push(Container::new(owner, id, kind));
        let idx = self.containers.len() - 1;
        Ok(&mut self.containers[idx])
    }

    /// Removes the container itself, its members are left for the caller to release
    pub(crate) fn remove_container(&mut self, id: Ustr) -> Option<Container> {
        let idx = self.containers.iter().position(|c| c.id() == id)?;
        self.dirty = true;
        Some(self.containers.remove(idx))
    }

    pub(crate) fn remove_member(
        &mut self,
        container: ContainerHandle,
        entity: Entity,
    ) -> Result<(), ContainmentError> {
        let c = self
            .get_mut(container.id)
            .ok_or(ContainmentError::NoSuchContainer {
                owner: container.owner,
                id: container.id,
            })?;

        if !c.remove_member(entity) {
            return Err(ContainmentError::NotAMember { entity, container });
        }

        self.dirty = true;
        Ok(())
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the previous dirty state
    pub(crate) fn clear_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}
