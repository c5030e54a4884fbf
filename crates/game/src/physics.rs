//! Fixed-tick movement integration.

use glam::{DVec2, IVec2};

use abrogue_render::QuadData;

/// Half-extents of every entity quad.
const QUAD_HALF_EXTENTS: [f32; 2] = [0.02, 0.04];

/// Resistance applied against motion; higher values brake harder.
const RESISTANCE: f64 = 20.0;

/// A movable body integrated once per fixed tick.
///
/// Movement is force-driven: the entity sets a movement direction per axis
/// (-1, 0, 1), the body converts it into a walking force scaled so the
/// terminal velocity lands near `max_speed`, and friction decelerates the
/// body toward rest when input stops.
#[derive(Debug, Clone)]
pub struct PhysicsBody {
    position: DVec2,
    velocity: DVec2,
    movement: IVec2,
    mass: f64,
    friction: f64,
    max_speed: f64,
}

impl PhysicsBody {
    /// Creates a body at `position`.
    pub fn new(position: DVec2) -> Self {
        Self {
            position,
            velocity: DVec2::ZERO,
            movement: IVec2::ZERO,
            mass: 10.0,
            friction: 1.0,
            max_speed: 1.0,
        }
    }

    /// Current position.
    pub fn position(&self) -> DVec2 {
        self.position
    }

    /// Sets the movement direction; each component is clamped to -1..=1.
    pub fn set_movement(&mut self, direction: IVec2) {
        self.movement = direction.signum();
    }

    /// Sets the body's mass.
    pub fn set_mass(&mut self, mass: f64) {
        self.mass = mass;
    }

    /// Sets the friction coefficient scaling deceleration.
    pub fn set_friction(&mut self, friction: f64) {
        self.friction = friction;
    }

    /// Sets the target walking speed.
    pub fn set_max_speed(&mut self, max_speed: f64) {
        self.max_speed = max_speed;
    }

    /// Advances the body by one tick of `dt` seconds.
    ///
    /// Order matters: the position integrates the previous tick's velocity,
    /// then friction decays it, then the walking force accelerates it.
    /// Diagonal input is normalized by 1/sqrt(2) so it is no faster than
    /// moving along an axis.
    pub fn update(&mut self, dt: f64) {
        self.position += self.velocity * dt;

        self.velocity.x = self.apply_friction(self.velocity.x, dt);
        self.velocity.y = self.apply_friction(self.velocity.y, dt);

        let walking_force = self.max_speed * RESISTANCE;
        let diagonal = self.movement.x != 0 && self.movement.y != 0;
        let normalization = if diagonal {
            std::f64::consts::FRAC_1_SQRT_2
        } else {
            1.0
        };

        let force = self.movement.as_dvec2() * walking_force * normalization;
        self.velocity += force / self.mass * dt;
    }

    /// Decays one velocity component toward zero without overshooting.
    ///
    /// The braking speed never drops below 20% of `max_speed`, so slow
    /// bodies still come to rest in bounded time. A sign flip clamps to
    /// zero: friction never reverses motion.
    fn apply_friction(&self, velocity: f64, dt: f64) -> f64 {
        if velocity == 0.0 {
            return 0.0;
        }

        let moving_backward = velocity.is_sign_negative();
        let braking_speed = (0.2 * self.max_speed).max(velocity.abs());
        let decelerated = velocity
            - braking_speed.copysign(velocity) * self.friction * RESISTANCE / self.mass * dt;

        if decelerated.is_sign_negative() != moving_backward {
            0.0
        } else {
            decelerated
        }
    }

    /// The body's current quad record.
    pub fn quad(&self) -> QuadData {
        QuadData::new(
            [self.position.x as f32, self.position.y as f32],
            QUAD_HALF_EXTENTS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 120.0;

    #[test]
    fn walking_accelerates_along_the_input_axis() {
        let mut body = PhysicsBody::new(DVec2::ZERO);
        body.set_movement(IVec2::X);

        for _ in 0..60 {
            body.update(DT);
        }

        let position = body.position();
        assert!(position.x > 0.0, "body should have moved right: {position}");
        assert_eq!(position.y, 0.0);
    }

    #[test]
    fn friction_never_reverses_velocity() {
        let mut body = PhysicsBody::new(DVec2::ZERO);
        body.set_movement(IVec2::X);
        for _ in 0..30 {
            body.update(DT);
        }

        // Release the input and let friction drain the velocity.
        body.set_movement(IVec2::ZERO);
        let mut previous_x = body.position().x;
        for _ in 0..600 {
            body.update(DT);
            let x = body.position().x;
            assert!(x >= previous_x, "friction pushed the body backward");
            previous_x = x;
        }

        // Fully at rest: position stops changing.
        let resting_x = body.position().x;
        body.update(DT);
        assert_eq!(body.position().x, resting_x);
    }

    #[test]
    fn diagonal_movement_is_normalized() {
        let mut straight = PhysicsBody::new(DVec2::ZERO);
        straight.set_movement(IVec2::X);

        let mut diagonal = PhysicsBody::new(DVec2::ZERO);
        diagonal.set_movement(IVec2::ONE);

        for _ in 0..120 {
            straight.update(DT);
            diagonal.update(DT);
        }

        let straight_distance = straight.position().length();
        let diagonal_distance = diagonal.position().length();

        // Within a couple percent: same walking force, split across axes.
        let ratio = diagonal_distance / straight_distance;
        assert!((0.95..=1.05).contains(&ratio), "ratio = {ratio}");
    }

    #[test]
    fn heavier_bodies_accelerate_slower() {
        let mut light = PhysicsBody::new(DVec2::ZERO);
        light.set_mass(5.0);
        light.set_movement(IVec2::X);

        let mut heavy = PhysicsBody::new(DVec2::ZERO);
        heavy.set_mass(20.0);
        heavy.set_movement(IVec2::X);

        for _ in 0..10 {
            light.update(DT);
            heavy.update(DT);
        }

        assert!(light.position().x > heavy.position().x);
    }

    #[test]
    fn movement_direction_is_clamped_to_unit_steps() {
        let mut body = PhysicsBody::new(DVec2::ZERO);
        body.set_movement(IVec2::new(7, -3));

        let mut unit = PhysicsBody::new(DVec2::ZERO);
        unit.set_movement(IVec2::new(1, -1));

        for _ in 0..60 {
            body.update(DT);
            unit.update(DT);
        }

        assert_eq!(body.position(), unit.position());
    }

    #[test]
    fn quad_tracks_the_body_position() {
        let mut body = PhysicsBody::new(DVec2::new(0.25, -0.5));
        assert_eq!(body.quad().pos, [0.25, -0.5]);
        assert_eq!(body.quad().size, QUAD_HALF_EXTENTS);

        body.set_movement(IVec2::Y);
        for _ in 0..30 {
            body.update(DT);
        }
        assert!(body.quad().pos[1] > -0.5);
    }
}
