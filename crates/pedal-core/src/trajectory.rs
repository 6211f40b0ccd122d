use serde::Serialize;

use crate::constants::DEGENERACY_EPSILONS;
use crate::elliptic::jacobi_sn;
use crate::error::{PedalError, Result};
use crate::real::Real;
use crate::segment::SegmentTable;

/// Torque delivered by whichever pedal is forward at crank angle θ.
pub fn effective_torque<R: Real>(theta: &R) -> R {
    theta.cos().abs()
}

/// β(c) = (1 + sin c) / 2.
pub fn beta<R: Real>(c: &R) -> R {
    (c.one() + c.sin()).scale2(-1)
}

/// Position, velocity and active segment at one instant.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrajectoryPoint<R> {
    pub x: R,
    pub velocity: R,
    pub segment: usize,
}

#[derive(Clone, Debug)]
enum Motion<R> {
    /// |c| = π/2 to working precision: the bicycle never moves.
    Degenerate,
    Rolling(SegmentTable<R>),
}

/// Closed-form solution of `x'' = |cos(x − c)|`, `x(0) = x'(0) = 0`, for one
/// phase `c`.
///
/// Keeps its segment table between queries, so sampling many τ for the same
/// phase costs one table build.
#[derive(Clone, Debug)]
pub struct Trajectory<R> {
    phase: R,
    motion: Motion<R>,
}

impl<R: Real> Trajectory<R> {
    pub fn new(c: &R) -> Result<Self> {
        if !c.is_finite() {
            return Err(PedalError::InvalidInput(format!(
                "phase c = {} is not finite",
                c.to_f64()
            )));
        }
        let slack = c.integer(DEGENERACY_EPSILONS) * c.epsilon();
        if c.abs() > c.pi().scale2(-1) + slack.clone() {
            return Err(PedalError::InvalidInput(format!(
                "phase c = {} outside [-pi/2, pi/2]",
                c.to_f64()
            )));
        }

        let beta = beta(c);
        let motion = if beta <= slack || beta >= c.one() - slack {
            Motion::Degenerate
        } else {
            Motion::Rolling(SegmentTable::new(beta)?)
        };
        Ok(Self {
            phase: c.clone(),
            motion,
        })
    }

    pub fn phase(&self) -> &R {
        &self.phase
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self.motion, Motion::Degenerate)
    }

    /// The segment table built so far (`None` for a degenerate phase).
    pub fn segments(&self) -> Option<&SegmentTable<R>> {
        match &self.motion {
            Motion::Degenerate => None,
            Motion::Rolling(table) => Some(table),
        }
    }

    /// x(τ), x'(τ) and the segment containing τ.
    ///
    /// Within segment k the motion is a pendulum swing with parameter
    /// `m_k = 1/(k+β)`; with `s` the Jacobi sine below,
    /// `u = kπ + π/2 − 2·asin(s)`, `x = u + c` and the energy integral gives
    /// `x' = 2·√(k + β − s²)`.
    pub fn evaluate(&mut self, tau: &R) -> Result<TrajectoryPoint<R>> {
        if !tau.is_finite() || *tau < tau.zero() {
            return Err(PedalError::InvalidInput(format!(
                "tau = {} must be finite and non-negative",
                tau.to_f64()
            )));
        }
        let table = match &mut self.motion {
            Motion::Degenerate => {
                return Ok(TrajectoryPoint {
                    x: tau.zero(),
                    velocity: tau.zero(),
                    segment: 0,
                });
            }
            Motion::Rolling(table) => table,
        };

        let k = table.locate(tau)?;
        let beta = table.beta().clone();
        let quarter = quarter_period(table, k);
        let s = if k == 0 {
            let sn = jacobi_sn(&(quarter - tau.clone()), &beta)?;
            beta.sqrt() * sn
        } else {
            let shifted = table.shifted_index(k);
            let start = table.boundary(k - 1).cloned().unwrap_or_else(|| tau.zero());
            let rho = tau.clone() - start;
            let m = shifted.one() / shifted.clone();
            jacobi_sn(&(quarter - shifted.sqrt() * rho), &m)?
        };
        let s = clamp_unit(s);

        let pi = tau.pi();
        let u = pi.integer(k as i64) * pi.clone() + pi.scale2(-1) - s.asin().scale2(1);
        let energy = table.shifted_index(k) - s.clone() * s;
        Ok(TrajectoryPoint {
            x: u + self.phase.clone(),
            velocity: energy.sqrt().scale2(1),
            segment: k,
        })
    }
}

fn quarter_period<R: Real>(table: &SegmentTable<R>, k: usize) -> R {
    // `locate` always builds segment k before returning it.
    table
        .quarter_period(k)
        .cloned()
        .unwrap_or_else(|| table.beta().zero())
}

fn clamp_unit<R: Real>(s: R) -> R {
    let one = s.one();
    if s > one {
        one
    } else if s < -one.clone() {
        -one
    } else {
        s
    }
}

/// One-shot evaluation of x(τ; c). Use [`Trajectory`] to sample many τ for
/// the same phase.
pub fn trajectory<R: Real>(c: &R, tau: &R) -> Result<TrajectoryPoint<R>> {
    Trajectory::new(c)?.evaluate(tau)
}
