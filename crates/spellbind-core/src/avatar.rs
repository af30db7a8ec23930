//! The physical and visual side of a character
//!
//! Movement, collision and animation live in the host engine. The runtime
//! only calls out through this trait during the death sequence.

/// Host-side body of a character
pub trait Avatar {
    /// Stop movement and turn off collision
    fn disable_movement_and_collision(&mut self);

    /// Start the named death animation
    ///
    /// Return `false` if it cannot be played; the character is then destroyed
    /// immediately.
    fn play_death_animation(&mut self, animation: &str) -> bool;

    /// Polled every tick while dying
    fn death_animation_finished(&self) -> bool {
        false
    }

    /// Remove the body from the world
    fn destroy(&mut self);
}

/// Avatar with no body (headless servers, tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAvatar;

impl Avatar for NullAvatar {
    fn disable_movement_and_collision(&mut self) {}

    fn play_death_animation(&mut self, _animation: &str) -> bool {
        false
    }

    fn destroy(&mut self) {}
}
