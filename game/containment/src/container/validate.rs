use ahash::{AHashMap, AHashSet};

use common::*;

use crate::container::{
    ContainerHandle, ContainerManagerComponent, ContainerSystem, ContainmentViolation,
};
use crate::ecs::*;
use crate::metadata::MetadataComponent;

impl ContainerSystem {
    /// Exhaustively checks every container in the world, returning the first broken invariant
    pub fn validate(&self, world: &EcsWorld) -> Result<(), ContainmentViolation> {
        let entities = world.entities();
        let managers = world.read_storage::<ContainerManagerComponent>();
        let metas = world.read_storage::<MetadataComponent>();

        let mut holders = AHashMap::<Entity, ContainerHandle>::new();
        for (owner, manager) in (&entities, &managers).join() {
            let owner = Entity::from(owner);
            for container in manager.containers() {
                let handle = container.handle();
                if container.owner() != owner {
                    return Err(ContainmentViolation::WrongOwner {
                        container: handle,
                        stored_under: owner,
                    });
                }

                let mut seen = AHashSet::with_capacity(container.len());
                for &member in container.members() {
                    if !seen.insert(member) {
                        return Err(ContainmentViolation::DuplicateMember {
                            entity: member,
                            container: handle,
                        });
                    }

                    if let Some(first) = holders.insert(member, handle) {
                        return Err(ContainmentViolation::MultipleContainers {
                            entity: member,
                            first,
                            second: handle,
                        });
                    }

                    if !world.is_entity_alive(member) {
                        continue;
                    }

                    let parent = self.transform().parent(world, member);
                    if parent != Some(owner) {
                        return Err(ContainmentViolation::ParentMismatch {
                            entity: member,
                            container: handle,
                            actual: parent,
                        });
                    }
                }
            }
        }

        for (entity, meta) in (&entities, &metas).join() {
            let entity = Entity::from(entity);
            let flagged = meta.in_container();
            let member = holders.contains_key(&entity);
            if flagged != member {
                return Err(ContainmentViolation::FlagDisagreement {
                    entity,
                    flagged,
                    member,
                });
            }
        }

        for &member in holders.keys() {
            if world.is_entity_alive(member) && !metas.contains(member.into()) {
                return Err(ContainmentViolation::FlagDisagreement {
                    entity: member,
                    flagged: false,
                    member: true,
                });
            }
        }

        // follow each owner outwards through the containers holding it
        for &container in holders.values() {
            let mut visited = AHashSet::new();
            let mut current = container.owner;
            while let Some(&holder) = holders.get(&current) {
                if holder.owner == container.owner || !visited.insert(holder) {
                    return Err(ContainmentViolation::SelfContainment { container: holder });
                }
                current = holder.owner;
            }
        }

        trace!("validated containers"; "members" => holders.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use super::*;
    use crate::container::test_utils::*;
    use crate::container::{ContainerKind, ContainmentError, RemoveOptions};
    use crate::metadata::MetaFlags;
    use matches::assert_matches;

    #[test]
    fn detects_flag_without_membership() {
        let (mut world, system) = test_world();
        let e = spawn(&mut world, None);
        assert!(system.validate(&world).is_ok());

        world
            .add_now(
                e,
                MetadataComponent {
                    flags: MetaFlags::IN_CONTAINER,
                },
            )
            .unwrap();

        assert_matches!(
            system.validate(&world),
            Err(ContainmentViolation::FlagDisagreement {
                flagged: true,
                member: false,
                ..
            })
        );
    }

    #[test]
    fn detects_parent_mismatch() {
        let (mut world, system) = test_world();
        let owner = spawn(&mut world, None);
        let other = spawn(&mut world, None);
        let item = spawn(&mut world, None);

        let bag = system
            .make_container(&mut world, owner, "bag", ContainerKind::List)
            .unwrap();
        system.insert(&mut world, bag, item).unwrap();
        assert!(system.validate(&world).is_ok());

        // moved directly, and not yet reacted to
        system
            .transform()
            .set_coordinates(&world, item, crate::transform::Coordinates::origin_of(other));

        assert_matches!(
            system.validate(&world),
            Err(ContainmentViolation::ParentMismatch { actual: Some(p), .. }) if p == other
        );

        assert_eq!(system.process_parent_changes(&mut world), 1);
        assert!(system.validate(&world).is_ok());
    }

    /// Random operations on a small population, validating after each
    #[test]
    fn random_operations_keep_invariants() {
        let (mut world, system) = test_world();
        let mut rng = SmallRng::seed_from_u64(0xC0FFEE);

        let mut entities = (0..12).map(|_| spawn(&mut world, None)).collect_vec();
        let mut containers = Vec::new();
        for (i, owner) in entities.iter().take(6).enumerate() {
            let kind = if i % 2 == 0 {
                ContainerKind::List
            } else {
                ContainerKind::Slot
            };
            containers.push(system.make_container(&mut world, *owner, "inv", kind).unwrap());
        }

        for step in 0..400 {
            let container = *containers.choose(&mut rng).unwrap();
            let entity = *entities.choose(&mut rng).unwrap();

            match rng.gen_range(0, 10) {
                0..=4 => match system.insert(&mut world, container, entity) {
                    Ok(_) | Err(ContainmentError::ContainmentCycle { .. }) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                },
                5..=6 => {
                    let force = rng.gen();
                    let options = RemoveOptions {
                        force,
                        ..RemoveOptions::default()
                    };
                    system.remove(&mut world, container, entity, options).unwrap();
                }
                7 => {
                    system.try_remove_from_container(&mut world, entity, false).unwrap();
                }
                8 => {
                    system
                        .empty_container(&mut world, container, RemoveOptions::default())
                        .unwrap();
                }
                _ => {
                    // delete a non-owner and replace it
                    if !containers.iter().any(|c| c.owner == entity) {
                        assert!(system.delete_entity(&mut world, entity));
                        entities.retain(|e| *e != entity);
                        entities.push(spawn(&mut world, None));
                    }
                }
            }

            if let Err(violation) = system.validate(&world) {
                panic!("step {}: {}", step, violation);
            }
        }
    }

    #[test]
    fn ownership_cycle_detected() {
        let (mut world, system) = test_world();
        let a = spawn(&mut world, None);
        let b = spawn(&mut world, Some(a));

        let a_bag = system
            .make_container(&mut world, a, "bag", ContainerKind::List)
            .unwrap();
        let b_bag = system
            .make_container(&mut world, b, "bag", ContainerKind::List)
            .unwrap();
        system.insert(&mut world, a_bag, b).unwrap();

        // the normal path refuses this
        assert_matches!(
            system.insert(&mut world, b_bag, a),
            Err(ContainmentError::ContainmentCycle { .. })
        );

        // so corrupt it by hand
        {
            let mut managers = world.write_storage::<ContainerManagerComponent>();
            managers
                .get_mut(b.into())
                .unwrap()
                .get_mut(b_bag.id)
                .unwrap()
                .push_member(a);
        }
        crate::metadata::set_contained_flag(&world, a, true);

        assert!(system.validate(&world).is_err());
    }
}
