use common::*;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Wrapper around specs entity to extend it
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Entity(specs::Entity);

/// Stable reference to an entity that can cross the network boundary. Packs the generation
/// into the high 32 bits and the index into the low 32 bits, so a reference to a since-recycled
/// index never resolves to the new occupant.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetEntity(u64);

impl Deref for Entity {
    type Target = specs::Entity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Entity {
    pub fn net(self) -> NetEntity {
        NetEntity::new(self.0.id(), self.0.gen().id())
    }
}

impl NetEntity {
    pub const fn new(index: specs::world::Index, generation: i32) -> Self {
        Self(((generation as u32 as u64) << 32) | index as u64)
    }

    pub const fn index(self) -> specs::world::Index {
        self.0 as u32
    }

    pub const fn generation(self) -> i32 {
        (self.0 >> 32) as u32 as i32
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}:{}", self.0.gen().id(), self.0.id())
    }
}

impl Debug for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for NetEntity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}:{}", self.generation(), self.index())
    }
}

impl Debug for NetEntity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<specs::Entity> for Entity {
    #[inline(always)]
    fn from(e: specs::Entity) -> Self {
        Self(e)
    }
}

impl From<Entity> for specs::Entity {
    #[inline(always)]
    fn from(e: Entity) -> Self {
        e.0
    }
}

impl slog::KV for Entity {
    fn serialize(&self, _: &Record, serializer: &mut dyn Serializer) -> SlogResult<()> {
        serializer.emit_arguments("entity", &format_args!("{}", self))
    }
}

impl slog::Value for Entity {
    fn serialize(&self, _: &Record, key: Key, serializer: &mut dyn Serializer) -> SlogResult<()> {
        serializer.emit_arguments(key, &format_args!("{}", self))
    }
}

slog_value_display!(NetEntity);

#[cfg(test)]
mod tests {
    use specs::{Builder, WorldExt};

    use super::*;

    #[test]
    fn net_entity_packing() {
        let mut world = specs::World::new();

        for i in 0..50 {
            let e = Entity::from(world.create_entity().build());
            let net = e.net();

            assert_eq!(net.index(), e.id());
            assert_eq!(net.generation(), e.gen().id());

            if i % 2 == 0 {
                // try out some other generations too
                world.delete_entity(e.into()).unwrap();
            }
        }
    }

    #[test]
    fn net_entity_distinguishes_generations() {
        let a = NetEntity::new(4, 1);
        let b = NetEntity::new(4, 2);
        assert_ne!(a, b);
        assert_eq!(a.index(), b.index());
        assert_eq!(format!("{}", b), "N2:4");
    }
}
