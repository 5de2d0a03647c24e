use ustr::Ustr;

use common::*;

use crate::container::{ContainerHandle, ContainerKind};
use crate::ecs::Entity;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContainmentError {
    #[error("{owner} already has a container with id {id:?}")]
    DuplicateContainerId { owner: Entity, id: Ustr },

    #[error("Container {container} is a {actual} container, not {expected}")]
    ContainerTypeMismatch {
        container: ContainerHandle,
        expected: ContainerKind,
        actual: ContainerKind,
    },

    #[error("Inserting {entity} into {container} would contain it within itself")]
    ContainmentCycle {
        entity: Entity,
        container: ContainerHandle,
    },

    #[error("Entity {0} does not exist")]
    EntityNotFound(Entity),

    #[error("{entity} is not a member of {container}")]
    NotAMember {
        entity: Entity,
        container: ContainerHandle,
    },

    #[error("{owner} has no container with id {id:?}")]
    NoSuchContainer { owner: Entity, id: Ustr },
}

/// A broken global invariant, found by exhaustive validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContainmentViolation {
    #[error("{entity} is a member of both {first} and {second}")]
    MultipleContainers {
        entity: Entity,
        first: ContainerHandle,
        second: ContainerHandle,
    },

    #[error("{entity} appears in {container} more than once")]
    DuplicateMember {
        entity: Entity,
        container: ContainerHandle,
    },

    #[error("{entity} is flagged as contained ({flagged}) but membership is {member}")]
    FlagDisagreement {
        entity: Entity,
        flagged: bool,
        member: bool,
    },

    #[error("{container} contains its own owner, directly or transitively")]
    SelfContainment { container: ContainerHandle },

    #[error("{entity} in {container} has spatial parent {actual:?} instead of its container's owner")]
    ParentMismatch {
        entity: Entity,
        container: ContainerHandle,
        actual: Option<Entity>,
    },

    #[error("{container} is stored under owner {stored_under}")]
    WrongOwner {
        container: ContainerHandle,
        stored_under: Entity,
    },
}
