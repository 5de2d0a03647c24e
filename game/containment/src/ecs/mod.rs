pub use specs::{
    world::EntitiesRes, Builder, Component, DenseVecStorage, EntityBuilder, HashMapStorage, Join,
    ReadStorage, VecStorage, WorldExt, WriteStorage,
};
pub use specs_derive::Component;

pub use entity::{Entity, NetEntity};
pub use world::{ComponentGetError, ComponentWorld, EcsWorld};

mod entity;
mod world;
