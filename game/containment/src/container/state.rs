use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use common::*;

use crate::container::{
    Container, ContainerKind, ContainerManagerComponent, ContainerSystem, ContainmentError,
    RemoveOptions,
};
use crate::ecs::*;

/// Network form of a single container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerData {
    pub kind: String,
    pub show_contents: bool,
    pub occludes_light: bool,
    pub members: Vec<NetEntity>,
}

/// Network form of an entity's containers, keyed by container id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerManagerState {
    pub containers: BTreeMap<String, ContainerData>,
}

impl From<&Container> for ContainerData {
    fn from(container: &Container) -> Self {
        ContainerData {
            kind: container.kind().name().to_owned(),
            show_contents: container.show_contents,
            occludes_light: container.occludes_light,
            members: container.members().iter().map(|e| e.net()).collect(),
        }
    }
}

impl ContainerSystem {
    /// None if the entity owns no containers
    pub fn get_state(&self, world: &EcsWorld, owner: Entity) -> Option<ContainerManagerState> {
        let managers = world.read_storage::<ContainerManagerComponent>();
        let manager = managers.get(owner.into())?;

        let containers = manager
            .containers()
            .map(|c| (c.id().as_str().to_owned(), ContainerData::from(c)))
            .collect();

        Some(ContainerManagerState { containers })
    }

    /// Snapshots every record changed since the last collection, clearing their dirty state
    pub fn collect_dirty_states(
        &self,
        world: &mut EcsWorld,
    ) -> BTreeMap<NetEntity, ContainerManagerState> {
        let dirty = {
            let entities = world.entities();
            let managers = world.read_storage::<ContainerManagerComponent>();
            let dirty = (&entities, &managers)
                .join()
                .filter(|(_, manager)| manager.is_dirty())
                .map(|(e, _)| Entity::from(e))
                .collect_vec();
            dirty
        };

        let mut states = BTreeMap::new();
        for owner in dirty {
            if let Some(state) = self.get_state(world, owner) {
                states.insert(owner.net(), state);
            }

            if let Some(manager) = world
                .write_storage::<ContainerManagerComponent>()
                .get_mut(owner.into())
            {
                manager.clear_dirty();
            }
        }

        trace!("collected dirty container states"; "count" => states.len());
        states
    }

    /// Reconciles the owner's containers with an authoritative state. Containers missing from
    /// the state are torn down and dropped members are released, all without touching the
    /// spatial hierarchy. Members that cannot be resolved locally are skipped.
    ///
    /// Members that would create a containment cycle are skipped too, and the whole state is
    /// kept aside and retried after later states and parent changes until it applies cleanly
    pub fn apply_state(
        &self,
        world: &mut EcsWorld,
        owner: Entity,
        state: &ContainerManagerState,
    ) -> Result<(), ContainmentError> {
        if !world.is_entity_alive(owner) {
            return Err(ContainmentError::EntityNotFound(owner));
        }

        self.flush_parent_changes(world);

        let conflicts = self.reconcile(world, owner, state)?;
        {
            let mut deferred = world.write_resource::<DeferredContainerStates>();
            if conflicts > 0 {
                debug!("deferring container state"; "owner" => owner, "conflicts" => conflicts);
                deferred.states.insert(owner, state.clone());
            } else {
                deferred.states.remove(&owner);
            }
        }

        self.retry_deferred_states(world);
        Ok(())
    }

    /// Whether a state for this owner is waiting to be retried
    pub fn has_deferred_state(&self, world: &EcsWorld, owner: Entity) -> bool {
        world
            .read_resource::<DeferredContainerStates>()
            .states
            .contains_key(&owner)
    }

    /// Reapplies deferred states until none make further progress
    pub(crate) fn retry_deferred_states(&self, world: &mut EcsWorld) {
        loop {
            let pending = std::mem::take(
                &mut world.write_resource::<DeferredContainerStates>().states,
            );
            if pending.is_empty() {
                return;
            }

            let count = pending.len();
            let mut still_pending = BTreeMap::new();
            for (owner, state) in pending {
                if !world.is_entity_alive(owner) {
                    debug!("dropping deferred state of dead owner"; "owner" => owner);
                    continue;
                }

                match self.reconcile(world, owner, &state) {
                    Ok(0) => debug!("applied deferred container state"; "owner" => owner),
                    Ok(_) => {
                        still_pending.insert(owner, state);
                    }
                    Err(err) => {
                        warn!("dropping deferred container state"; "owner" => owner, "error" => %err)
                    }
                }
            }

            let progressed = still_pending.len() < count;
            world
                .write_resource::<DeferredContainerStates>()
                .states
                .extend(still_pending);

            if !progressed {
                return;
            }
        }
    }

    /// Returns the number of members skipped because they would create a cycle
    fn reconcile(
        &self,
        world: &mut EcsWorld,
        owner: Entity,
        state: &ContainerManagerState,
    ) -> Result<usize, ContainmentError> {
        for container in self.all_containers(world, owner) {
            if state.containers.contains_key(container.id.as_str()) {
                continue;
            }

            let released = self.empty_container(world, container, RemoveOptions::logical())?;
            if let Some(manager) = world
                .write_storage::<ContainerManagerComponent>()
                .get_mut(owner.into())
            {
                manager.remove_container(container.id);
            }

            debug!("tore down container absent from state"; "container" => container,
                "released" => released.len());
        }

        let mut conflicts = 0;
        for (id, data) in &state.containers {
            let kind = ContainerKind::from_name_or_base(&data.kind);
            let container = match self.try_get_container(world, owner, id) {
                Some(container) => {
                    let actual = self.with_container(world, container, Container::kind);
                    if actual != Some(kind) {
                        warn!("container kind differs from state, keeping local kind";
                            "container" => container, "state_kind" => &data.kind);
                    }
                    container
                }
                None => self.make_container(world, owner, id, kind)?,
            };

            self.with_container_mut(world, container, |c| {
                c.show_contents = data.show_contents;
                c.occludes_light = data.occludes_light;
            })?;

            let wanted = data
                .members
                .iter()
                .filter_map(|net| {
                    let resolved = world.resolve_net_entity(*net);
                    if resolved.is_none() {
                        warn!("skipping unknown container member"; "member" => *net, "container" => container);
                    }
                    resolved
                })
                .collect_vec();

            for member in self.members(world, container) {
                if wanted.contains(&member) {
                    continue;
                }

                if let Err(err) = self.remove(world, container, member, RemoveOptions::logical()) {
                    warn!("failed to release member dropped from state";
                        "member" => member, "container" => container, "error" => %err);
                }
            }

            for &member in &wanted {
                if self.with_container(world, container, |c| c.contains(member)) == Some(true) {
                    continue;
                }

                match self.insert(world, container, member) {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!("container refused member from state"; "member" => member, "container" => container)
                    }
                    Err(ContainmentError::ContainmentCycle { .. }) => {
                        debug!("member from state would create a cycle, skipping for now";
                            "member" => member, "container" => container);
                        conflicts += 1;
                    }
                    Err(err) => {
                        warn!("failed to insert member from state";
                            "member" => member, "container" => container, "error" => %err)
                    }
                }
            }

            self.with_container_mut(world, container, |c| c.reorder_members(&wanted))?;
        }

        if let Some(manager) = world
            .write_storage::<ContainerManagerComponent>()
            .get_mut(owner.into())
        {
            manager.clear_dirty();
        }

        Ok(conflicts)
    }
}

/// States that could not be fully applied yet, keyed by owner
#[derive(Default)]
pub struct DeferredContainerStates {
    states: BTreeMap<Entity, ContainerManagerState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::test_utils::*;
    use crate::transform::Coordinates;

    #[test]
    fn round_trip_into_fresh_world() {
        let (mut world, system) = test_world();
        let owner = spawn(&mut world, None);
        let items = (0..3).map(|_| spawn(&mut world, None)).collect_vec();

        let bag = system
            .make_container(&mut world, owner, "bag", ContainerKind::List)
            .unwrap();
        let hand = system
            .make_container(&mut world, owner, "hand", ContainerKind::Slot)
            .unwrap();
        system.set_show_contents(&mut world, bag, true).unwrap();
        system.set_occludes_light(&mut world, hand, false).unwrap();

        for item in &items[..2] {
            assert!(system.insert(&mut world, bag, *item).unwrap());
        }
        assert!(system.insert(&mut world, hand, items[2]).unwrap());

        let state = system.get_state(&world, owner).expect("has state");
        let serialized = ron::to_string(&state).expect("serialize");
        let state: ContainerManagerState = ron::from_str(&serialized).expect("deserialize");

        // fresh world with entities allocated in the same order, so net entities match
        let (mut remote, remote_system) = test_world();
        let remote_owner = spawn(&mut remote, None);
        let remote_items = (0..3).map(|_| spawn(&mut remote, None)).collect_vec();
        assert_eq!(remote_owner.net(), owner.net());

        remote_system
            .apply_state(&mut remote, remote_owner, &state)
            .unwrap();

        assert_eq!(remote_system.get_state(&remote, remote_owner), Some(state));

        let remote_bag = remote_system.get_container(&remote, remote_owner, "bag").unwrap();
        assert_eq!(
            remote_system.members(&remote, remote_bag),
            remote_items[..2].to_vec()
        );
        assert!(remote_system.is_entity_in_container(&remote, remote_items[2]));
        assert!(remote_system.validate(&remote).is_ok());
    }

    #[test]
    fn diff_preserves_state_order() {
        let (mut world, system) = test_world();
        let owner = spawn(&mut world, None);
        let e = (0..4).map(|_| spawn(&mut world, None)).collect_vec();

        let bag = system
            .make_container(&mut world, owner, "bag", ContainerKind::List)
            .unwrap();
        for item in &e[..3] {
            system.insert(&mut world, bag, *item).unwrap();
        }

        // drop e[1], add e[3], reorder
        let mut state = system.get_state(&world, owner).unwrap();
        state.containers.get_mut("bag").unwrap().members =
            vec![e[3].net(), e[2].net(), e[0].net()];

        system.apply_state(&mut world, owner, &state).unwrap();

        assert_eq!(system.members(&world, bag), vec![e[3], e[2], e[0]]);
        assert!(!system.is_entity_in_container(&world, e[1]));

        // released without reparenting
        assert_eq!(parent_of(&world, e[1]), Some(owner));
        assert!(system.validate(&world).is_ok());

        let dirty = system.collect_dirty_states(&mut world);
        assert!(dirty.is_empty());
    }

    #[test]
    fn unknown_kind_and_member() {
        let (mut world, system) = test_world();
        let owner = spawn(&mut world, None);
        let item = spawn(&mut world, None);
        let gone = spawn(&mut world, None);
        let gone_net = gone.net();
        system.delete_entity(&mut world, gone);

        let mut state = ContainerManagerState::default();
        state.containers.insert(
            "jar".to_owned(),
            ContainerData {
                kind: "pickle_jar".to_owned(),
                show_contents: true,
                occludes_light: false,
                members: vec![gone_net, item.net()],
            },
        );

        system.apply_state(&mut world, owner, &state).unwrap();

        let jar = system.get_container(&world, owner, "jar").unwrap();
        assert_eq!(
            system.with_container(&world, jar, Container::kind),
            Some(ContainerKind::Base)
        );
        assert_eq!(system.members(&world, jar), vec![item]);
    }

    #[test]
    fn absent_containers_are_torn_down() {
        let (mut world, system) = test_world();
        let owner = spawn(&mut world, None);
        let item = spawn(&mut world, None);

        let bag = system
            .make_container(&mut world, owner, "bag", ContainerKind::List)
            .unwrap();
        system.insert(&mut world, bag, item).unwrap();

        system
            .apply_state(&mut world, owner, &ContainerManagerState::default())
            .unwrap();

        assert!(!system.has_container(&world, owner, "bag"));
        assert!(!system.is_entity_in_container(&world, item));
        assert!(world.is_entity_alive(item));
        assert!(collision_enabled(&world, item));
    }

    #[test]
    fn out_of_order_states_converge() {
        let (mut world, system) = test_world();
        let a = spawn(&mut world, None);
        let b = spawn(&mut world, None);
        let x = spawn(&mut world, None);
        let y = spawn(&mut world, None);

        let a_bag = system
            .make_container(&mut world, a, "bag", ContainerKind::List)
            .unwrap();
        system.insert(&mut world, a_bag, b).unwrap();
        system.collect_dirty_states(&mut world);

        let list = |members: Vec<NetEntity>| ContainerData {
            kind: "list".to_owned(),
            show_contents: false,
            occludes_light: true,
            members,
        };

        // b now holds a, but the state saying a no longer holds b has not arrived
        let mut b_state = ContainerManagerState::default();
        b_state
            .containers
            .insert("bag".to_owned(), list(vec![x.net(), a.net()]));
        b_state
            .containers
            .insert("pouch".to_owned(), list(vec![y.net()]));

        system.apply_state(&mut world, b, &b_state).unwrap();

        // everything else still applied
        let b_bag = system.get_container(&world, b, "bag").unwrap();
        let b_pouch = system.get_container(&world, b, "pouch").unwrap();
        assert_eq!(system.members(&world, b_bag), vec![x]);
        assert_eq!(system.members(&world, b_pouch), vec![y]);
        assert!(system.has_deferred_state(&world, b));
        assert!(!system.collect_dirty_states(&mut world).contains_key(&b.net()));
        assert!(system.validate(&world).is_ok());

        let mut a_state = ContainerManagerState::default();
        a_state.containers.insert("bag".to_owned(), list(vec![]));
        system.apply_state(&mut world, a, &a_state).unwrap();
        assert!(system.members(&world, a_bag).is_empty());

        // b is still spatially under a until its transform is replicated too
        assert!(system.has_deferred_state(&world, b));
        system
            .transform()
            .set_coordinates(&world, b, Coordinates::new(None, Vector3::zero()));
        system.process_parent_changes(&mut world);

        assert!(!system.has_deferred_state(&world, b));
        assert_eq!(system.members(&world, b_bag), vec![x, a]);
        assert_eq!(parent_of(&world, a), Some(b));
        assert!(system.validate(&world).is_ok());
    }

    #[test]
    fn deferred_state_of_deleted_owner_is_dropped() {
        let (mut world, system) = test_world();
        let a = spawn(&mut world, None);
        let b = spawn(&mut world, None);

        let a_bag = system
            .make_container(&mut world, a, "bag", ContainerKind::List)
            .unwrap();
        system.insert(&mut world, a_bag, b).unwrap();

        let mut b_state = ContainerManagerState::default();
        b_state.containers.insert(
            "bag".to_owned(),
            ContainerData {
                kind: "list".to_owned(),
                show_contents: false,
                occludes_light: true,
                members: vec![a.net()],
            },
        );
        system.apply_state(&mut world, b, &b_state).unwrap();
        assert!(system.has_deferred_state(&world, b));

        system.delete_entity(&mut world, b);
        system.process_parent_changes(&mut world);
        assert!(!system.has_deferred_state(&world, b));
        assert!(system.validate(&world).is_ok());
    }

    #[test]
    fn dirty_collection() {
        let (mut world, system) = test_world();
        let a = spawn(&mut world, None);
        let b = spawn(&mut world, None);
        let item = spawn(&mut world, None);

        let bag = system
            .make_container(&mut world, a, "bag", ContainerKind::List)
            .unwrap();
        system
            .make_container(&mut world, b, "bag", ContainerKind::List)
            .unwrap();

        let states = system.collect_dirty_states(&mut world);
        assert_eq!(states.keys().copied().collect_vec(), vec![a.net(), b.net()]);
        assert!(system.collect_dirty_states(&mut world).is_empty());

        system.insert(&mut world, bag, item).unwrap();
        let states = system.collect_dirty_states(&mut world);
        assert_eq!(states.len(), 1);
        assert_eq!(states[&a.net()].containers["bag"].members, vec![item.net()]);
    }
}
