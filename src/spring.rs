//! Spring-damped scalar signals
//!
//! Raw pointer and scroll samples are never applied to the star field
//! directly. They become the *target* of a damped spring, and the renderer
//! reads the spring's current value once per frame.

use serde::{Deserialize, Deserializer};

/// Integration step upper bound in seconds. Larger frame deltas are split
/// into sub-steps so stiff springs stay stable.
const MAX_SUBSTEP: f32 = 1.0 / 240.0;

/// Physical parameters of a spring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringConfig {
    /// Restoring force per unit of displacement
    pub stiffness: f32,

    /// Opposing force per unit of velocity
    pub damping: f32,

    pub mass: f32,

    /// Displacement and speed below which the spring snaps onto its target
    pub rest_delta: f32,
}

impl SpringConfig {
    /// Light, quick spring used for pointer parallax
    pub fn pointer() -> Self {
        Self {
            stiffness: 100.0,
            damping: 30.0,
            mass: 0.5,
            rest_delta: 0.001,
        }
    }

    /// Heavier, softer spring used for scroll parallax
    pub fn scroll() -> Self {
        Self {
            stiffness: 80.0,
            damping: 25.0,
            mass: 1.0,
            ..Self::pointer()
        }
    }
}

/// A spring table as written in the config file. Missing fields are taken
/// from whichever spring the table configures.
#[derive(Debug, Default, Deserialize)]
struct SpringTable {
    stiffness: Option<f32>,
    damping: Option<f32>,
    mass: Option<f32>,
    rest_delta: Option<f32>,
}

impl SpringTable {
    fn over(self, base: SpringConfig) -> SpringConfig {
        SpringConfig {
            stiffness: self.stiffness.unwrap_or(base.stiffness),
            damping: self.damping.unwrap_or(base.damping),
            mass: self.mass.unwrap_or(base.mass),
            rest_delta: self.rest_delta.unwrap_or(base.rest_delta),
        }
    }
}

/// `deserialize_with` hook for a pointer spring table
pub fn pointer_spring<'de, D>(deserializer: D) -> Result<SpringConfig, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(SpringTable::deserialize(deserializer)?.over(SpringConfig::pointer()))
}

/// `deserialize_with` hook for a scroll spring table
pub fn scroll_spring<'de, D>(deserializer: D) -> Result<SpringConfig, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(SpringTable::deserialize(deserializer)?.over(SpringConfig::scroll()))
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self::pointer()
    }
}

/// A scalar that eases toward its target instead of jumping to it
#[derive(Debug, Clone)]
pub struct SmoothedSignal {
    config: SpringConfig,
    value: f32,
    velocity: f32,
    target: f32,
}

impl SmoothedSignal {
    pub fn new(config: SpringConfig) -> Self {
        Self {
            config,
            value: 0.0,
            velocity: 0.0,
            target: 0.0,
        }
    }

    /// Current eased value
    pub fn get(&self) -> f32 {
        self.value
    }

    #[cfg(test)]
    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn set_target(&mut self, target: f32) {
        if target.is_finite() {
            self.target = target;
        }
    }

    /// Snap back to neutral: value, velocity and target all become 0
    pub fn reset(&mut self) {
        self.value = 0.0;
        self.velocity = 0.0;
        self.target = 0.0;
    }

    /// Move straight to `value` with no easing, e.g. for the first sample
    pub fn jump(&mut self, value: f32) {
        if value.is_finite() {
            self.value = value;
            self.target = value;
            self.velocity = 0.0;
        }
    }

    pub fn is_at_rest(&self) -> bool {
        self.value == self.target && self.velocity == 0.0
    }

    /// Advance the spring by `dt` seconds. Returns true once settled.
    pub fn step(&mut self, dt: f32) -> bool {
        if self.is_at_rest() {
            return true;
        }
        if dt.is_nan() || dt <= 0.0 {
            return false;
        }

        let mass = self.config.mass.max(f32::EPSILON);
        let steps = (dt / MAX_SUBSTEP).ceil().max(1.0) as u32;
        let h = dt / steps as f32;

        for _ in 0..steps {
            let displacement = self.value - self.target;
            let force = -self.config.stiffness * displacement - self.config.damping * self.velocity;
            // Semi-implicit Euler: velocity first, then position with the new velocity
            self.velocity += force / mass * h;
            self.value += self.velocity * h;
        }

        let settled = (self.value - self.target).abs() < self.config.rest_delta
            && self.velocity.abs() < self.config.rest_delta;
        if settled {
            self.value = self.target;
            self.velocity = 0.0;
        }
        settled
    }
}
