//! Velocity-Verlet reference integrator.
//!
//! Independent of the elliptic machinery; used to cross-check the closed form.

use serde::Serialize;

use crate::error::{PedalError, Result};
use crate::trajectory::effective_torque;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub tau: f64,
    pub x: f64,
    pub velocity: f64,
}

/// Streams samples of `x'' = |cos(x − c)|` from rest, one per step, starting
/// with the initial state at τ = 0. The last step is shortened to land on
/// `tau_max` exactly.
#[derive(Clone, Debug)]
pub struct Verlet {
    phase: f64,
    step: f64,
    tau_max: f64,
    state: Sample,
    acceleration: f64,
    started: bool,
}

impl Verlet {
    pub fn new(c: f64, step: f64, tau_max: f64) -> Result<Self> {
        if !c.is_finite() || !step.is_finite() || !tau_max.is_finite() {
            return Err(PedalError::InvalidInput(format!(
                "non-finite integrator input: c = {c}, step = {step}, tau_max = {tau_max}"
            )));
        }
        if step <= 0.0 {
            return Err(PedalError::InvalidInput(format!(
                "step = {step} must be positive"
            )));
        }
        if tau_max < 0.0 {
            return Err(PedalError::InvalidInput(format!(
                "tau_max = {tau_max} must be non-negative"
            )));
        }
        Ok(Self {
            phase: c,
            step,
            tau_max,
            state: Sample {
                tau: 0.0,
                x: 0.0,
                velocity: 0.0,
            },
            acceleration: effective_torque(&-c),
            started: false,
        })
    }

    fn advance(&mut self) {
        let Sample { tau, x, velocity } = self.state;
        // Snap to the horizon when the remainder is below rounding noise.
        let remaining = self.tau_max - tau;
        let h = if remaining <= self.step * (1.0 + 1e-9) {
            remaining
        } else {
            self.step
        };
        let x_next = x + velocity * h + 0.5 * self.acceleration * h * h;
        let a_next = effective_torque(&(x_next - self.phase));
        let v_next = velocity + 0.5 * (self.acceleration + a_next) * h;
        let tau_next = if h == remaining { self.tau_max } else { tau + h };
        self.state = Sample {
            tau: tau_next,
            x: x_next,
            velocity: v_next,
        };
        self.acceleration = a_next;
    }
}

impl Iterator for Verlet {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if !self.started {
            self.started = true;
            return Some(self.state);
        }
        if self.state.tau >= self.tau_max {
            return None;
        }
        self.advance();
        Some(self.state)
    }
}

/// All samples from τ = 0 to `tau_max`.
pub fn integrate(c: f64, step: f64, tau_max: f64) -> Result<Vec<Sample>> {
    Ok(Verlet::new(c, step, tau_max)?.collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lands_on_horizon() {
        let samples = integrate(0.0, 0.3, 1.0).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0].tau, 0.0);
        assert_eq!(samples.last().unwrap().tau, 1.0);
    }

    #[test]
    fn test_exact_multiple_has_no_extra_step() {
        let samples = integrate(0.0, 0.25, 1.0).unwrap();
        assert_eq!(samples.len(), 5);
    }

    #[test]
    fn test_zero_horizon_is_initial_state() {
        let samples = integrate(0.4, 0.1, 0.0).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].x, 0.0);
    }

    #[test]
    fn test_constant_torque_at_vertical_phase() {
        // c = π/2: |cos(x − π/2)| = |sin x| starts at 0 and x stays 0.
        let samples = integrate(std::f64::consts::FRAC_PI_2, 0.01, 2.0).unwrap();
        let last = samples.last().unwrap();
        assert!(last.x.abs() < 1e-12);
    }

    #[test]
    fn test_early_motion_is_parabolic() {
        let samples = integrate(0.0, 1e-4, 0.01).unwrap();
        let last = samples.last().unwrap();
        assert_relative_eq!(last.x, 0.5 * 0.01 * 0.01, max_relative = 1e-4);
        assert_relative_eq!(last.velocity, 0.01, max_relative = 1e-4);
    }

    #[test]
    fn test_rejects_bad_step() {
        assert!(integrate(0.0, 0.0, 1.0).is_err());
        assert!(integrate(0.0, -0.1, 1.0).is_err());
        assert!(integrate(0.0, 0.1, -1.0).is_err());
        assert!(integrate(f64::NAN, 0.1, 1.0).is_err());
    }
}
