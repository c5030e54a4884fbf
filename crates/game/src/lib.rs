//! Game logic: the quad pool the render engine reads, physics bodies, and
//! the entities that drive them.

mod physics;
mod pool;
mod world;

pub use physics::PhysicsBody;
pub use pool::{QuadHandle, QuadPool};
pub use world::{World, TICK_DURATION};
