use std::f64::consts::FRAC_PI_2;

use argmin::core::{
    CostFunction, Error as ArgminError, Executor, State, TerminationReason, TerminationStatus,
};
use argmin::solver::brent::BrentOpt;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    BRENT_MAX_ITERS, DEFAULT_SEED, GRID_RESOLUTION, MULTI_START, SEED_STRIDE,
    SWEEP_BUDGET_SECONDS, SWEEP_MAX_POINTS, SWEEP_MIN_POINTS, WINDOW_STEPS, XATOL,
};
use crate::error::{PedalError, Result};
use crate::trajectory::trajectory;

/// Horizons this short are indistinguishable from τ = 0.
const MIN_HORIZON: f64 = 1e-14;

/// Windows narrower than this are skipped.
const MIN_WINDOW: f64 = 1e-12;

/// Settings for the grid-plus-multistart search for c*(τ).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FiniteHorizonOptions {
    pub grid_resolution: usize,
    pub multi_start: usize,
    pub xatol: f64,
    pub seed: u64,
    pub max_iters: u64,
}

impl Default for FiniteHorizonOptions {
    fn default() -> Self {
        Self {
            grid_resolution: GRID_RESOLUTION,
            multi_start: MULTI_START,
            xatol: XATOL,
            seed: DEFAULT_SEED,
            max_iters: BRENT_MAX_ITERS,
        }
    }
}

impl FiniteHorizonOptions {
    fn validate(&self) -> Result<()> {
        if self.grid_resolution < 3 {
            return Err(PedalError::InvalidInput(format!(
                "grid_resolution = {} must be at least 3",
                self.grid_resolution
            )));
        }
        if !(self.xatol.is_finite() && self.xatol > 0.0) {
            return Err(PedalError::InvalidInput(format!(
                "xatol = {} must be positive",
                self.xatol
            )));
        }
        if self.max_iters == 0 {
            return Err(PedalError::InvalidInput("max_iters must be positive".into()));
        }
        Ok(())
    }
}

/// Best phase found for one horizon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiniteHorizonOptimum {
    pub tau: f64,
    pub c_star: f64,
    pub x_star: f64,
    /// Intervals handed to the bounded refinement.
    pub candidates: usize,
    /// Refinements that met the tolerance before the iteration cap.
    pub converged: usize,
}

/// −x(τ; c) as an argmin cost in c.
struct NegativeDistance {
    tau: f64,
}

impl CostFunction for NegativeDistance {
    type Param = f64;
    type Output = f64;

    fn cost(&self, c: &f64) -> std::result::Result<f64, ArgminError> {
        Ok(-trajectory(c, &self.tau)?.x)
    }
}

struct Refinement {
    c: f64,
    x: f64,
    converged: bool,
}

fn refine(tau: f64, lo: f64, hi: f64, options: &FiniteHorizonOptions) -> Result<Refinement> {
    let solver = BrentOpt::new(lo, hi).set_tolerance(f64::EPSILON, options.xatol);
    let outcome = Executor::new(NegativeDistance { tau }, solver)
        .configure(|state| state.max_iters(options.max_iters))
        .run()
        .map_err(|e| PedalError::ConvergenceFailure(format!("Brent on [{lo}, {hi}]: {e}")))?;
    let state = outcome.state();
    let c = *state.get_best_param().ok_or_else(|| {
        PedalError::ConvergenceFailure(format!("Brent on [{lo}, {hi}] returned no parameter"))
    })?;
    let converged = !matches!(
        state.get_termination_status(),
        TerminationStatus::Terminated(TerminationReason::MaxItersReached)
    );
    let x = trajectory(&c, &tau)?.x;
    Ok(Refinement { c, x, converged })
}

/// Grid points over [−π/2, π/2] with the endpoints hit exactly.
fn phase_grid(n: usize) -> Vec<f64> {
    let step = 2.0 * FRAC_PI_2 / (n - 1) as f64;
    (0..n)
        .map(|i| match i {
            0 => -FRAC_PI_2,
            _ if i == n - 1 => FRAC_PI_2,
            _ => -FRAC_PI_2 + i as f64 * step,
        })
        .collect()
}

/// Brackets around every grid point at least as high as both neighbours,
/// plus the two boundary cells.
fn grid_brackets(cs: &[f64], fs: &[f64]) -> Vec<(f64, f64)> {
    let n = cs.len();
    let mut brackets = vec![(cs[0], cs[1]), (cs[n - 2], cs[n - 1])];
    for i in 1..n - 1 {
        if fs[i] >= fs[i - 1] && fs[i] >= fs[i + 1] {
            brackets.push((cs[i - 1], cs[i + 1]));
        }
    }
    brackets
}

/// c*(τ) = argmax over c ∈ [−π/2, π/2] of x(τ; c).
///
/// Scans a uniform grid in parallel, brackets the grid maxima and both
/// boundary cells, adds `multi_start` random windows of half-width 2.5 grid
/// steps (x is only C⁰ in c where the active segment changes, so a kink can
/// hide a maximum between grid points), then refines every interval with
/// Brent's bounded method and keeps the best.
pub fn finite_horizon_optimal_phase(
    tau: f64,
    options: &FiniteHorizonOptions,
) -> Result<FiniteHorizonOptimum> {
    if !tau.is_finite() || tau < 0.0 {
        return Err(PedalError::InvalidInput(format!(
            "tau = {tau} must be finite and non-negative"
        )));
    }
    options.validate()?;
    if tau <= MIN_HORIZON {
        return Ok(FiniteHorizonOptimum {
            tau,
            c_star: 0.0,
            x_star: 0.0,
            candidates: 0,
            converged: 0,
        });
    }

    let cs = phase_grid(options.grid_resolution);
    let fs = cs
        .par_iter()
        .map(|c| trajectory(c, &tau).map(|p| p.x))
        .collect::<Result<Vec<f64>>>()?;

    let mut brackets = grid_brackets(&cs, &fs);
    let grid_maxima = brackets.len() - 2;
    let half_width = WINDOW_STEPS * (cs[1] - cs[0]);
    let mut rng = SmallRng::seed_from_u64(options.seed);
    for _ in 0..options.multi_start {
        let center: f64 = rng.random_range(-FRAC_PI_2..FRAC_PI_2);
        let lo = (center - half_width).max(-FRAC_PI_2);
        let hi = (center + half_width).min(FRAC_PI_2);
        if hi - lo > MIN_WINDOW {
            brackets.push((lo, hi));
        }
    }
    debug!(tau, grid_maxima, total = brackets.len(), "finite-horizon brackets");

    let refined = brackets
        .par_iter()
        .map(|&(lo, hi)| refine(tau, lo, hi, options))
        .collect::<Result<Vec<Refinement>>>()?;

    let converged = refined.iter().filter(|r| r.converged).count();
    let best = refined
        .iter()
        .filter(|r| r.converged)
        .max_by(|a, b| a.x.total_cmp(&b.x))
        .ok_or_else(|| {
            PedalError::ConvergenceFailure(format!(
                "none of {} refinements at tau = {tau} converged within {} iterations",
                refined.len(),
                options.max_iters
            ))
        })?;
    debug!(tau, c_star = best.c, x_star = best.x, converged, "finite-horizon optimum");

    Ok(FiniteHorizonOptimum {
        tau,
        c_star: best.c,
        x_star: best.x,
        candidates: brackets.len(),
        converged,
    })
}

/// How horizons are spread over `[0, t_max]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spacing {
    /// `t_max·(i/(n−1))²`: dense near 0 where c*(τ) moves fastest.
    #[default]
    Quadratic,
    Linear,
}

/// `points` horizons from 0 to `t_max` inclusive.
pub fn tau_schedule(t_max: f64, points: usize, spacing: Spacing) -> Result<Vec<f64>> {
    if !t_max.is_finite() || t_max < 0.0 {
        return Err(PedalError::InvalidInput(format!(
            "t_max = {t_max} must be finite and non-negative"
        )));
    }
    if points < 2 {
        return Err(PedalError::InvalidInput(format!(
            "a schedule needs at least 2 points, got {points}"
        )));
    }
    let last = (points - 1) as f64;
    let mut taus: Vec<f64> = (0..points)
        .map(|i| {
            let u = i as f64 / last;
            match spacing {
                Spacing::Quadratic => t_max * u * u,
                Spacing::Linear => t_max * u,
            }
        })
        .collect();
    taus[0] = 0.0;
    taus[points - 1] = t_max;
    Ok(taus)
}

/// Sizing of a sweep from a wall-clock budget.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepBudget {
    pub seconds: f64,
    pub min_points: usize,
    pub max_points: usize,
}

impl Default for SweepBudget {
    fn default() -> Self {
        Self {
            seconds: SWEEP_BUDGET_SECONDS,
            min_points: SWEEP_MIN_POINTS,
            max_points: SWEEP_MAX_POINTS,
        }
    }
}

impl SweepBudget {
    /// `⌊seconds / solve_seconds⌋` horizons, clamped to
    /// `[min_points, max_points]`. `solve_seconds` is the measured cost of one
    /// solve at the largest horizon.
    pub fn points(&self, solve_seconds: f64) -> Result<usize> {
        if !(self.seconds.is_finite() && self.seconds > 0.0) {
            return Err(PedalError::InvalidInput(format!(
                "time budget {} s must be positive",
                self.seconds
            )));
        }
        if self.min_points < 2 || self.min_points > self.max_points {
            return Err(PedalError::InvalidInput(format!(
                "point range [{}, {}] must satisfy 2 <= min <= max",
                self.min_points, self.max_points
            )));
        }
        let estimate = self.seconds / solve_seconds.max(1e-6);
        let points = if estimate >= self.max_points as f64 {
            self.max_points
        } else {
            (estimate as usize).max(self.min_points)
        };
        Ok(points)
    }
}

/// c*(τ) for every horizon, each solved with its own seed
/// `options.seed + i·10007` so results do not depend on evaluation order.
pub fn optimal_phase_curve(
    taus: &[f64],
    options: &FiniteHorizonOptions,
) -> Result<Vec<FiniteHorizonOptimum>> {
    taus.iter()
        .enumerate()
        .map(|(i, &tau)| {
            let per_tau = FiniteHorizonOptions {
                seed: options.seed.wrapping_add(i as u64 * SEED_STRIDE),
                ..options.clone()
            };
            let optimum = finite_horizon_optimal_phase(tau, &per_tau)?;
            debug!(i, tau, c_star = optimum.c_star, "sweep point");
            Ok(optimum)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quick() -> FiniteHorizonOptions {
        FiniteHorizonOptions {
            grid_resolution: 61,
            multi_start: 6,
            ..FiniteHorizonOptions::default()
        }
    }

    #[test]
    fn test_defaults() {
        let o = FiniteHorizonOptions::default();
        assert_eq!(o.grid_resolution, 300);
        assert_eq!(o.multi_start, 100);
        assert_relative_eq!(o.xatol, 1e-9);
    }

    #[test]
    fn test_grid_hits_endpoints() {
        let g = phase_grid(5);
        assert_eq!(g[0], -FRAC_PI_2);
        assert_eq!(g[4], FRAC_PI_2);
        assert_relative_eq!(g[2], 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_brackets_include_boundaries_and_peaks() {
        let cs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let fs = [0.0, 2.0, 1.0, 3.0, 0.5];
        let b = grid_brackets(&cs, &fs);
        assert_eq!(b.len(), 4);
        assert!(b.contains(&(0.0, 2.0)));
        assert!(b.contains(&(2.0, 4.0)));
    }

    #[test]
    fn test_short_horizon_prefers_zero_phase() {
        // x ≈ ½·cos(c)·τ² for small τ, maximized at c = 0.
        let opt = finite_horizon_optimal_phase(0.05, &quick()).unwrap();
        assert!(opt.c_star.abs() < 1e-3, "c* = {}", opt.c_star);
        assert!(opt.converged > 0);
    }

    #[test]
    fn test_known_horizon() {
        let opt = finite_horizon_optimal_phase(5.0, &quick()).unwrap();
        assert!((opt.c_star - 0.474).abs() < 2e-3, "c*(5) = {}", opt.c_star);
        let x = trajectory(&opt.c_star, &5.0).unwrap().x;
        assert_relative_eq!(x, opt.x_star);
    }

    #[test]
    fn test_zero_horizon() {
        let opt = finite_horizon_optimal_phase(0.0, &quick()).unwrap();
        assert_eq!(opt.c_star, 0.0);
        assert_eq!(opt.x_star, 0.0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(finite_horizon_optimal_phase(-1.0, &quick()).is_err());
        let tiny = FiniteHorizonOptions {
            grid_resolution: 2,
            ..quick()
        };
        assert!(matches!(
            finite_horizon_optimal_phase(1.0, &tiny),
            Err(PedalError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_deterministic_for_seed() {
        let a = finite_horizon_optimal_phase(3.0, &quick()).unwrap();
        let b = finite_horizon_optimal_phase(3.0, &quick()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_tau_schedule() {
        let q = tau_schedule(100.0, 5, Spacing::Quadratic).unwrap();
        assert_eq!(q, vec![0.0, 6.25, 25.0, 56.25, 100.0]);
        let l = tau_schedule(10.0, 3, Spacing::Linear).unwrap();
        assert_eq!(l, vec![0.0, 5.0, 10.0]);
        assert!(tau_schedule(10.0, 1, Spacing::Linear).is_err());
    }

    #[test]
    fn test_budget_sizes_sweep() {
        let budget = SweepBudget {
            seconds: 10.0,
            min_points: 5,
            max_points: 40,
        };
        assert_eq!(budget.points(0.5).unwrap(), 20);
        assert_eq!(budget.points(100.0).unwrap(), 5);
        assert_eq!(budget.points(0.0).unwrap(), 40);
        let defaults = SweepBudget::default();
        assert_eq!(defaults.points(1.0).unwrap(), 120);

        let inverted = SweepBudget {
            min_points: 50,
            ..budget.clone()
        };
        assert!(matches!(inverted.points(1.0), Err(PedalError::InvalidInput(_))));
        let empty = SweepBudget {
            seconds: 0.0,
            ..budget
        };
        assert!(empty.points(1.0).is_err());
    }

    #[test]
    fn test_curve_uses_per_horizon_seeds() {
        let taus = [0.0, 1.0];
        let curve = optimal_phase_curve(&taus, &quick()).unwrap();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[0].c_star, 0.0);
        assert!(curve[1].c_star > 0.0);
    }

    #[test]
    fn test_options_fill_missing_fields() {
        let o: FiniteHorizonOptions = serde_json::from_str(r#"{"multi_start": 4}"#).unwrap();
        assert_eq!(o.multi_start, 4);
        assert_eq!(o.grid_resolution, 300);
        assert!(serde_json::from_str::<FiniteHorizonOptions>(r#"{"grid": 10}"#).is_err());
    }

    #[test]
    fn test_iteration_cap_is_convergence_failure() {
        let capped = FiniteHorizonOptions {
            max_iters: 1,
            ..quick()
        };
        assert!(matches!(
            finite_horizon_optimal_phase(10.0, &capped),
            Err(PedalError::ConvergenceFailure(_))
        ));
    }
}
