use bitflags::bitflags;

use common::*;

use crate::ecs::*;

bitflags! {
    pub struct MetaFlags: u8 {
        /// Entity is a member of exactly one container
        const IN_CONTAINER = 0b0000_0001;
    }
}

/// Shared per-entity metadata
#[derive(Component, Clone, Debug, Default)]
#[storage(VecStorage)]
pub struct MetadataComponent {
    pub flags: MetaFlags,
}

impl Default for MetaFlags {
    fn default() -> Self {
        MetaFlags::empty()
    }
}

impl MetadataComponent {
    pub fn in_container(&self) -> bool {
        self.flags.contains(MetaFlags::IN_CONTAINER)
    }
}

/// Reads the containment flag, an entity without metadata is never contained
pub(crate) fn is_flagged_contained(
    metas: &ReadStorage<MetadataComponent>,
    entity: Entity,
) -> bool {
    metas
        .get(entity.into())
        .map(MetadataComponent::in_container)
        .unwrap_or(false)
}

/// Sets or clears the containment flag, attaching metadata if missing
pub(crate) fn set_contained_flag(world: &EcsWorld, entity: Entity, contained: bool) {
    let mut metas = world.write_storage::<MetadataComponent>();
    match metas.get_mut(entity.into()) {
        Some(meta) => meta.flags.set(MetaFlags::IN_CONTAINER, contained),
        None if contained => {
            let meta = MetadataComponent {
                flags: MetaFlags::IN_CONTAINER,
            };
            if let Err(e) = metas.insert(entity.into(), meta) {
                warn!("cannot add metadata to entity"; "entity" => entity, "error" => %e);
            }
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_attaches_metadata() {
        let mut world = EcsWorld::test_new();
        let e: Entity = world.create_entity().build().into();
        assert!(!is_flagged_contained(&world.read_storage(), e));

        // clearing a missing flag adds nothing
        set_contained_flag(&world, e, false);
        assert!(!world.has_component::<MetadataComponent>(e));

        set_contained_flag(&world, e, true);
        assert!(is_flagged_contained(&world.read_storage(), e));

        set_contained_flag(&world, e, false);
        assert!(!is_flagged_contained(&world.read_storage(), e));
    }

    #[test]
    fn flag_on_dead_entity_is_ignored() {
        let mut world = EcsWorld::test_new();
        let e: Entity = world.create_entity().build().into();
        world.kill_entity(e);

        set_contained_flag(&world, e, true);
        assert!(!is_flagged_contained(&world.read_storage(), e));
    }
}
