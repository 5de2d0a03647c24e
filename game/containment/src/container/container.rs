use strum::{AsRefStr, EnumString};
use ustr::Ustr;

use common::*;

use crate::ecs::Entity;

/// Insertion policy of a container. Bookkeeping is identical across kinds
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ContainerKind {
    /// Ordered list of any number of entities
    List,
    /// Holds at most a single entity
    Slot,
    /// Fallback for kinds this side doesn't know about, accepts anything
    Base,
}

/// Identifies a container by its owner and id, which is unique per owner
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ContainerHandle {
    pub owner: Entity,
    pub id: Ustr,
}

#[derive(Clone, Debug)]
pub struct Container {
    id: Ustr,
    owner: Entity,
    kind: ContainerKind,

    /// Insertion order, no duplicates
    members: Vec<Entity>,

    /// Contents are visible through this container
    pub show_contents: bool,

    /// Consumed by lighting only
    pub occludes_light: bool,
}

impl ContainerKind {
    pub fn name(self) -> &'static str {
        match self {
            ContainerKind::List => "list",
            ContainerKind::Slot => "slot",
            ContainerKind::Base => "base",
        }
    }

    /// Unknown kinds degrade to [ContainerKind::Base]
    pub fn from_name_or_base(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            warn!("unknown container kind, falling back to base"; "kind" => name);
            ContainerKind::Base
        })
    }
}

impl Container {
    pub(crate) fn new(owner: Entity, id: Ustr, kind: ContainerKind) -> Self {
        Container {
            id,
            owner,
            kind,
            members: Vec::new(),
            show_contents: false,
            occludes_light: true,
        }
    }

    pub fn id(&self) -> Ustr {
        self.id
    }

    pub fn owner(&self) -> Entity {
        self.owner
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn handle(&self) -> ContainerHandle {
        ContainerHandle {
            owner: self.owner,
            id: self.id,
        }
    }

    pub fn members(&self) -> &[Entity] {
        &self.members
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.members.contains(&entity)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Kind-specific insertion policy, assuming the entity is not already a member
    pub fn can_insert(&self, entity: Entity) -> bool {
        debug_assert!(!self.contains(entity));
        match self.kind {
            ContainerKind::List | ContainerKind::Base => true,
            ContainerKind::Slot => self.members.is_empty(),
        }
    }

    pub(crate) fn push_member(&mut self, entity: Entity) {
        debug_assert!(!self.contains(entity), "{} is already in {}", entity, self.handle());
        self.members.push(entity);
    }

    /// Preserves the order of the remaining members
    pub(crate) fn remove_member(&mut self, entity: Entity) -> bool {
        match self.members.iter().position(|e| *e == entity) {
            Some(idx) => {
                self.members.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Reorders members to follow `order`. Members missing from `order` keep their relative
    /// order at the end
    pub(crate) fn reorder_members(&mut self, order: &[Entity]) {
        self.members
            .sort_by_key(|e| order.iter().position(|o| o == e).unwrap_or(usize::MAX));
    }
}

impl Display for ContainerHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{:?}", self.owner, self.id.as_str())
    }
}

impl Display for ContainerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_ref())
    }
}

slog_value_display!(ContainerHandle);
slog_value_display!(ContainerKind);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::*;
    use ustr::ustr;

    fn entities(n: usize) -> (EcsWorld, Vec<Entity>) {
        let mut world = EcsWorld::test_new();
        let entities = (0..n)
            .map(|_| world.create_entity().build().into())
            .collect();
        (world, entities)
    }

    #[test]
    fn kind_names() {
        for kind in [ContainerKind::List, ContainerKind::Slot, ContainerKind::Base] {
            assert_eq!(kind.name(), kind.as_ref());
            assert_eq!(ContainerKind::from_name_or_base(kind.name()), kind);
        }

        assert_eq!(
            ContainerKind::from_name_or_base("matryoshka"),
            ContainerKind::Base
        );
    }

    #[test]
    fn slot_policy() {
        let (_, e) = entities(3);
        let mut slot = Container::new(e[0], ustr("hand"), ContainerKind::Slot);

        assert!(slot.can_insert(e[1]));
        slot.push_member(e[1]);
        assert!(!slot.can_insert(e[2]));

        let mut list = Container::new(e[0], ustr("bag"), ContainerKind::List);
        list.push_member(e[1]);
        assert!(list.can_insert(e[2]));
    }

    #[test]
    fn removal_keeps_order() {
        let (_, e) = entities(5);
        let mut c = Container::new(e[0], ustr("bag"), ContainerKind::List);
        for m in &e[1..] {
            c.push_member(*m);
        }

        assert!(c.remove_member(e[2]));
        assert!(!c.remove_member(e[2]));
        assert_eq!(c.members(), &[e[1], e[3], e[4]]);
    }

    #[test]
    fn reorder() {
        let (_, e) = entities(5);
        let mut c = Container::new(e[0], ustr("bag"), ContainerKind::List);
        for m in &e[1..] {
            c.push_member(*m);
        }

        c.reorder_members(&[e[4], e[2]]);
        assert_eq!(c.members(), &[e[4], e[2], e[1], e[3]]);
    }
}
