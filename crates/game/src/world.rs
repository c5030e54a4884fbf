//! The game world: player, enemies, and the quad pool they write into.

use glam::{DVec2, IVec2};
use tracing::info;

use abrogue_platform::InputState;

use crate::physics::PhysicsBody;
use crate::pool::{QuadHandle, QuadPool};

/// Fixed simulation tick in seconds.
pub const TICK_DURATION: f64 = 1.0 / 120.0;

/// The player's walking speed.
const PLAYER_MAX_SPEED: f64 = 1.0;

struct Player {
    body: PhysicsBody,
    quad: QuadHandle,
}

struct Enemy {
    body: PhysicsBody,
    quad: QuadHandle,
}

impl Enemy {
    /// Spawns an enemy at `position` with randomized handling.
    ///
    /// Mass 10..20, friction 0..1, max speed 0.5..1.5 - each enemy chases
    /// with its own feel.
    fn spawn(pool: &mut QuadPool, position: DVec2) -> Self {
        let mut body = PhysicsBody::new(position);
        body.set_mass(10.0 + fastrand::f64() * 10.0);
        body.set_friction(fastrand::f64());
        body.set_max_speed(0.5 + fastrand::f64());

        let quad = pool.insert(body.quad());
        Self { body, quad }
    }

    /// Steers toward the player, one axis at a time.
    fn steer_toward(&mut self, player: DVec2) {
        let position = self.body.position();
        self.body.set_movement(IVec2::new(
            if player.x > position.x { 1 } else { -1 },
            if player.y > position.y { 1 } else { -1 },
        ));
    }
}

/// Owns every entity and the quad pool the render engine reads.
pub struct World {
    pool: QuadPool,
    player: Player,
    enemies: Vec<Enemy>,
}

impl World {
    /// Creates a world with the player at the origin and `enemy_count`
    /// enemies scattered along the top and bottom edges of the view.
    pub fn new(enemy_count: usize) -> Self {
        let mut pool = QuadPool::new();

        let mut player_body = PhysicsBody::new(DVec2::ZERO);
        player_body.set_max_speed(PLAYER_MAX_SPEED);
        let player_quad = pool.insert(player_body.quad());
        let player = Player {
            body: player_body,
            quad: player_quad,
        };

        let enemies = (0..enemy_count)
            .map(|_| {
                let x = fastrand::f64() * 1.6 - 0.8;
                let y = if fastrand::bool() { -0.8 } else { 0.8 };
                Enemy::spawn(&mut pool, DVec2::new(x, y))
            })
            .collect();

        info!("World created with {} enemies", enemy_count);

        Self {
            pool,
            player,
            enemies,
        }
    }

    /// Advances the world by one fixed tick.
    ///
    /// Player movement comes from the held keys; enemies steer toward the
    /// player's position from the start of the tick. Every body writes its
    /// quad back into the pool afterwards.
    pub fn update(&mut self, input: &InputState) {
        self.player
            .body
            .set_movement(IVec2::new(input.movement_x(), input.movement_y()));
        self.player.body.update(TICK_DURATION);
        self.pool.set(self.player.quad, self.player.body.quad());

        let player_position = self.player.body.position();
        for enemy in &mut self.enemies {
            enemy.steer_toward(player_position);
            enemy.body.update(TICK_DURATION);
            self.pool.set(enemy.quad, enemy.body.quad());
        }
    }

    /// The quad pool the draw loop copies from.
    pub fn pool(&self) -> &QuadPool {
        &self.pool
    }

    /// Current player position.
    pub fn player_position(&self) -> DVec2 {
        self.player.body.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abrogue_platform::{InputState, KeyCode};

    #[test]
    fn world_populates_one_quad_per_entity() {
        let world = World::new(8);
        assert_eq!(world.pool().len(), 9);
    }

    #[test]
    fn player_moves_with_held_keys() {
        let mut world = World::new(0);
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyD);

        for _ in 0..120 {
            world.update(&input);
        }

        let position = world.player_position();
        assert!(position.x > 0.0, "player should have moved right: {position}");
        assert_eq!(position.y, 0.0);

        // The pool sees the same position.
        assert_eq!(world.pool().quads()[0].pos[0], position.x as f32);
    }

    #[test]
    fn enemies_close_in_on_the_player() {
        let mut world = World::new(4);
        let input = InputState::new();

        let total_distance = |world: &World| -> f64 {
            world
                .pool()
                .quads()
                .iter()
                .skip(1)
                .map(|q| DVec2::new(f64::from(q.pos[0]), f64::from(q.pos[1])).length())
                .sum()
        };

        let initial = total_distance(&world);
        for _ in 0..240 {
            world.update(&input);
        }
        let after = total_distance(&world);

        assert!(
            after < initial,
            "total enemy distance should shrink: {initial} -> {after}"
        );
    }
}
